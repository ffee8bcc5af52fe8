// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP snapshot source.
//!
//! [`SnapshotSource`] abstracts over where snapshots come from so the
//! scheduler can be driven by the real API or by a test double.
//! [`OpenSkyClient`] fetches `/states/all` through a pooled `reqwest::Client`.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use thiserror::Error;

use crate::protocol::{ParseError, Protocol, StateVectorParser, StatesResponse};

/// Public OpenSky state vector endpoint.
pub const DEFAULT_STATES_URL: &str = "https://opensky-network.org/api/states/all";

/// Default HTTP timeout. A full snapshot is several megabytes.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Errors that can occur while fetching a snapshot.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, TLS, timeout, connection reset).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Server answered with a non-2xx status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// Body was not a states response.
    #[error("failed to parse response: {0}")]
    Parse(#[from] ParseError),

    #[error("empty response body")]
    EmptyBody,
}

/// Trait for anything that can produce a state vector snapshot.
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current snapshot.
    fn fetch_snapshot(&self) -> impl Future<Output = Result<StatesResponse, FetchError>> + Send;
}

impl<S: SnapshotSource> SnapshotSource for Arc<S> {
    fn fetch_snapshot(&self) -> impl Future<Output = Result<StatesResponse, FetchError>> + Send {
        (**self).fetch_snapshot()
    }
}

/// Geographic filter for `/states/all`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub min_longitude: f64,
    pub max_latitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Create a bounding box, rejecting inverted or out-of-range corners.
    pub fn new(
        min_latitude: f64,
        min_longitude: f64,
        max_latitude: f64,
        max_longitude: f64,
    ) -> Result<Self, String> {
        if !(-90.0..=90.0).contains(&min_latitude) || !(-90.0..=90.0).contains(&max_latitude) {
            return Err("latitude must be within -90..=90".to_string());
        }
        if !(-180.0..=180.0).contains(&min_longitude) || !(-180.0..=180.0).contains(&max_longitude)
        {
            return Err("longitude must be within -180..=180".to_string());
        }
        if min_latitude > max_latitude || min_longitude > max_longitude {
            return Err("minimum corner must not exceed maximum corner".to_string());
        }

        Ok(Self {
            min_latitude,
            min_longitude,
            max_latitude,
            max_longitude,
        })
    }

    /// Query parameters understood by the API.
    #[must_use]
    pub fn query(&self) -> [(&'static str, f64); 4] {
        [
            ("lamin", self.min_latitude),
            ("lomin", self.min_longitude),
            ("lamax", self.max_latitude),
            ("lomax", self.max_longitude),
        ]
    }

    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&latitude)
            && (self.min_longitude..=self.max_longitude).contains(&longitude)
    }
}

/// Parses `lamin,lomin,lamax,lomax`.
impl FromStr for BoundingBox {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f64>()
                    .map_err(|e| format!("invalid coordinate '{}': {e}", part.trim()))
            })
            .collect::<Result<Vec<f64>, String>>()?;

        match values.as_slice() {
            [lamin, lomin, lamax, lomax] => Self::new(*lamin, *lomin, *lamax, *lomax),
            _ => Err(format!("expected 4 comma-separated values, got {}", values.len())),
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_latitude, self.min_longitude, self.max_latitude, self.max_longitude
        )
    }
}

/// Configuration for [`OpenSkyClient`].
#[derive(Debug, Clone)]
pub struct OpenSkyConfig {
    /// URL of the `/states/all` endpoint.
    pub states_url: String,
    /// Optional geographic filter applied to every fetch.
    pub bounding_box: Option<BoundingBox>,
    /// Request the extended format that carries the aircraft category.
    pub extended: bool,
    pub timeout: Duration,
}

impl Default for OpenSkyConfig {
    fn default() -> Self {
        Self {
            states_url: DEFAULT_STATES_URL.to_string(),
            bounding_box: None,
            extended: false,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// OpenSky Network client.
#[derive(Debug, Clone)]
pub struct OpenSkyClient {
    http: reqwest::Client,
    config: OpenSkyConfig,
}

impl OpenSkyClient {
    pub fn new(config: OpenSkyConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        Ok(Self { http, config })
    }

    #[must_use]
    pub fn config(&self) -> &OpenSkyConfig {
        &self.config
    }

    /// Fetch the snapshot restricted to `bounding_box`, ignoring the configured one.
    pub async fn fetch_in_bounding_box(
        &self,
        bounding_box: BoundingBox,
    ) -> Result<StatesResponse, FetchError> {
        self.fetch(Some(bounding_box)).await
    }

    async fn fetch(&self, bounding_box: Option<BoundingBox>) -> Result<StatesResponse, FetchError> {
        let mut request = self.http.get(&self.config.states_url);
        if let Some(bbox) = bounding_box {
            request = request.query(&bbox.query());
        }
        if self.config.extended {
            request = request.query(&[("extended", 1)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let snapshot = StateVectorParser::new()
            .parse(&bytes)?
            .ok_or(FetchError::EmptyBody)?;

        debug!(
            "Fetched {} state vectors ({} bytes)",
            snapshot.states.len(),
            bytes.len()
        );

        Ok(snapshot)
    }
}

impl SnapshotSource for OpenSkyClient {
    async fn fetch_snapshot(&self) -> Result<StatesResponse, FetchError> {
        self.fetch(self.config.bounding_box).await
    }
}
