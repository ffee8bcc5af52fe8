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

//! OpenSky Network client library for polling live state vector snapshots.
//!
//! The library is split into layers that can be used independently or
//! composed together:
//!
//! - **Protocol layer**: Decoding of the loosely typed `/states/all` wire format
//! - **HTTP layer**: Snapshot fetching behind the [`SnapshotSource`] trait
//! - **Live layer**: Observable latest-snapshot container with stale-response rejection
//! - **Scheduler layer**: Timer-driven refresh with hot reconfiguration
//!
//! # Quick Start
//!
//! Use the [`Client`] type for full-stack operation:
//!
//! ```no_run
//! use opensky_client::{Client, ClientConfig, RefreshConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut client = Client::spawn(ClientConfig {
//!         refresh: RefreshConfig {
//!             enabled: true,
//!             interval: Duration::from_secs(10),
//!         },
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//!     let mut updates = client.subscribe();
//!     while updates.changed().await.is_ok() {
//!         let snapshot = updates.borrow_and_update().clone();
//!         println!("{} aircraft", snapshot.len());
//!     }
//!     client.shutdown();
//! }
//! ```
//!
//! # Using Individual Layers
//!
//! ## Protocol Layer Only
//!
//! ```
//! use opensky_client::protocol::{Protocol, StateVectorParser};
//!
//! let body = br#"{"time": 1700000000, "states": [["abc123", "AF123 ", "France",
//!     null, 1700000000, 2.35, 48.85, null, false, null, null, null, null,
//!     null, null, false, 0]]}"#;
//! let mut parser = StateVectorParser::new();
//! if let Ok(Some(response)) = parser.parse(body) {
//!     println!("Got {} aircraft", response.states.len());
//! }
//! ```

pub mod http;
pub mod live;
pub mod protocol;
pub mod scheduler;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use http::{BoundingBox, FetchError, OpenSkyClient, OpenSkyConfig, SnapshotSource};
pub use live::{LiveState, RequestTicket, Snapshot};
pub use protocol::{
    EmergencyCode, ParseError, PositionSource, Protocol, StateVector, StateVectorParser,
    StatesResponse,
};
pub use scheduler::{FetchReport, RefreshConfig, RefreshScheduler, SchedulerState, Trigger};

/// Configuration for the full-stack client.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// HTTP configuration.
    pub http: OpenSkyConfig,
    /// Auto-refresh settings applied at spawn.
    pub refresh: RefreshConfig,
}

/// Full-stack OpenSky client that wires all layers together.
///
/// The client owns an HTTP source, the live snapshot container, and the
/// refresh scheduler that feeds one into the other.
#[derive(Debug)]
pub struct Client {
    live: Arc<LiveState>,
    scheduler: RefreshScheduler<OpenSkyClient>,
}

impl Client {
    /// Spawn a new client with the given configuration.
    ///
    /// Must be called from within a Tokio runtime when auto-refresh is enabled.
    pub fn spawn(config: ClientConfig) -> Result<Self, FetchError> {
        let source = OpenSkyClient::new(config.http)?;
        Ok(Self::with_source(source, config.refresh))
    }

    /// Build a client around an existing HTTP source.
    #[must_use]
    pub fn with_source(source: OpenSkyClient, refresh: RefreshConfig) -> Self {
        let live = Arc::new(LiveState::new());
        let mut scheduler = RefreshScheduler::new(source, Arc::clone(&live));
        scheduler.configure(refresh);

        Self { live, scheduler }
    }

    /// Fetch immediately, independent of the timer.
    pub fn refresh_now(&self) -> JoinHandle<FetchReport> {
        self.scheduler.refresh_now()
    }

    /// Apply new auto-refresh settings.
    pub fn configure(&mut self, refresh: RefreshConfig) {
        self.scheduler.configure(refresh);
    }

    /// The latest accepted snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.live.current()
    }

    /// Get a specific aircraft from the latest snapshot.
    #[must_use]
    pub fn get_by_icao(&self, icao24: &str) -> Option<StateVector> {
        self.live.current().get_by_icao(icao24).cloned()
    }

    /// Subscribe to snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.live.subscribe()
    }

    #[must_use]
    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    #[must_use]
    pub fn refresh_config(&self) -> RefreshConfig {
        self.scheduler.config()
    }

    #[must_use]
    pub fn live(&self) -> &Arc<LiveState> {
        &self.live
    }

    /// Stop the auto-refresh timer.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_starts_with_empty_snapshot() {
        let client = Client::spawn(ClientConfig::default()).unwrap();
        assert!(client.snapshot().is_empty());
        assert_eq!(client.snapshot().sequence, 0);
        assert_eq!(client.scheduler_state(), SchedulerState::Disabled);
    }

    #[tokio::test]
    async fn test_client_applies_refresh_config() {
        let mut client = Client::spawn(ClientConfig {
            refresh: RefreshConfig {
                enabled: true,
                interval: std::time::Duration::from_secs(30),
            },
            ..Default::default()
        })
        .unwrap();

        assert_eq!(client.scheduler_state(), SchedulerState::Idle);
        assert!(client.refresh_config().enabled);

        client.shutdown();
        assert_eq!(client.scheduler_state(), SchedulerState::Disabled);
    }
}
