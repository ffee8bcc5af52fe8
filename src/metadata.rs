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

//! Favorite enrichment: aircraft metadata and photos.
//!
//! Metadata comes from the OpenSky aircraft database, photos from jetapi.
//! Every lookup is best effort: any failure (transport, non-2xx, bad body)
//! is logged and reported as "not found".

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::photo_cache::PhotoCache;

pub const DEFAULT_METADATA_URL: &str = "https://opensky-network.org/api/metadata/aircraft/icao";
pub const DEFAULT_PHOTO_URL: &str = "https://www.jetapi.dev/api";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const CACHE_TTL: Duration = Duration::from_secs(3600 * 24);

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("invalid response body: {0}")]
    Body(String),

    #[error("download already in progress: {0}")]
    AlreadyPending(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A jetphotos picture as returned by jetapi.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "Link", default)]
    pub link: String,
    #[serde(rename = "Thumbnail", default)]
    pub thumbnail: String,
    #[serde(rename = "DateTaken", default)]
    pub date_taken: String,
    #[serde(rename = "DateUploaded", default)]
    pub date_uploaded: String,
    #[serde(rename = "Location", default)]
    pub location: String,
    #[serde(rename = "Photographer", default)]
    pub photographer: String,
    #[serde(rename = "Aircraft", default)]
    pub aircraft: String,
    #[serde(rename = "Serial", default)]
    pub serial: String,
    #[serde(rename = "Airline", default)]
    pub airline: String,
    /// Local path of the downloaded image.
    #[serde(rename = "offlineImage", default, skip_serializing_if = "Option::is_none")]
    pub offline_image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PhotoResponse {
    #[serde(rename = "Reg", default)]
    reg: String,
    #[serde(rename = "Images", default)]
    images: Vec<Photo>,
}

/// OpenSky aircraft database record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AircraftMetadata {
    pub icao24: Option<String>,
    pub registration: Option<String>,
    pub manufacturer_icao: Option<String>,
    pub manufacturer_name: Option<String>,
    pub model: Option<String>,
    pub typecode: Option<String>,
    pub serial_number: Option<String>,
    pub line_number: Option<String>,
    pub icao_aircraft_class: Option<String>,
    pub sel_cal: Option<String>,
    pub operator: Option<String>,
    pub operator_callsign: Option<String>,
    pub operator_icao: Option<String>,
    pub operator_iata: Option<String>,
    pub owner: Option<String>,
    pub category_description: Option<String>,
    pub engines: Option<String>,
    pub country: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
    pub timestamp: Option<i64>,
    pub acars: Option<bool>,
    pub adsb: Option<bool>,
    pub modes: Option<bool>,
    pub vdl: Option<bool>,
}

impl AircraftMetadata {
    /// Registration, if present and not blank.
    #[must_use]
    pub fn registration(&self) -> Option<&str> {
        self.registration
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

/// Result of enriching one favorite.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub metadata: Option<AircraftMetadata>,
    pub photo: Option<Photo>,
}

/// Source of enrichment data for a newly added favorite.
pub trait Enricher: Send + Sync {
    /// Look up metadata, then a photo by registration falling back to `callsign`.
    fn enrich(
        &self,
        icao24: &str,
        callsign: Option<&str>,
    ) -> impl Future<Output = Enrichment> + Send;
}

impl<E: Enricher> Enricher for Arc<E> {
    fn enrich(
        &self,
        icao24: &str,
        callsign: Option<&str>,
    ) -> impl Future<Output = Enrichment> + Send {
        (**self).enrich(icao24, callsign)
    }
}

struct CacheEntry<T> {
    value: Option<T>,
    timestamp: Instant,
}

/// Lookup cache that also remembers misses.
struct TtlCache<T> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn get(&self, key: &str) -> Option<Option<T>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| entry.timestamp.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    fn insert(&self, key: &str, value: Option<T>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.to_string(),
                CacheEntry {
                    value,
                    timestamp: Instant::now(),
                },
            );
    }

    fn cleanup(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, entry| entry.timestamp.elapsed() < self.ttl);
    }
}

/// HTTP enrichment client.
pub struct MetadataService {
    http: reqwest::Client,
    metadata_url: String,
    photo_url: String,
    photo_cache: Option<PhotoCache>,
    metadata_cache: TtlCache<AircraftMetadata>,
    photo_lookup_cache: TtlCache<Photo>,
}

impl std::fmt::Debug for MetadataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataService")
            .field("metadata_url", &self.metadata_url)
            .field("photo_url", &self.photo_url)
            .field("photo_cache", &self.photo_cache)
            .finish_non_exhaustive()
    }
}

impl MetadataService {
    pub fn new(photo_cache: Option<PhotoCache>) -> Result<Self, EnrichError> {
        Self::with_urls(DEFAULT_METADATA_URL, DEFAULT_PHOTO_URL, photo_cache)
    }

    pub fn with_urls(
        metadata_url: &str,
        photo_url: &str,
        photo_cache: Option<PhotoCache>,
    ) -> Result<Self, EnrichError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| EnrichError::Http(e.to_string()))?;

        Ok(Self {
            http,
            metadata_url: metadata_url.trim_end_matches('/').to_string(),
            photo_url: photo_url.to_string(),
            photo_cache,
            metadata_cache: TtlCache::new(CACHE_TTL),
            photo_lookup_cache: TtlCache::new(CACHE_TTL),
        })
    }

    /// Fetch the OpenSky metadata record for an ICAO address.
    pub async fn fetch_metadata(&self, icao24: &str) -> Option<AircraftMetadata> {
        let key = icao24.trim().to_lowercase();
        if let Some(cached) = self.metadata_cache.get(&key) {
            return cached;
        }

        let url = format!("{}/{}", self.metadata_url, key);
        let result = match self.get_json::<AircraftMetadata>(&url, &[]).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("Failed to fetch metadata for {}: {}", key, e);
                None
            }
        };

        self.metadata_cache.insert(&key, result.clone());
        result
    }

    /// Fetch the best matching photo for a registration (or callsign).
    pub async fn fetch_photo(&self, registration: &str) -> Option<Photo> {
        let key = registration.trim();
        if key.is_empty() {
            return None;
        }
        if let Some(cached) = self.photo_lookup_cache.get(key) {
            return cached;
        }

        let query = [("reg", key), ("photos", "1"), ("only_jp", "true")];
        let result = match self.get_json::<PhotoResponse>(&self.photo_url, &query).await {
            Ok(response) => {
                debug!("Photo lookup for {}: {} images", response.reg, response.images.len());
                response.images.into_iter().next()
            }
            Err(e) => {
                warn!("Failed to fetch photo for {}: {}", key, e);
                None
            }
        };

        self.photo_lookup_cache.insert(key, result.clone());
        result
    }

    /// Download the photo image into the disk cache and record its path.
    pub async fn cache_photo(&self, mut photo: Photo) -> Photo {
        let Some(cache) = &self.photo_cache else {
            return photo;
        };

        match cache.download_and_cache(&self.http, &photo.image).await {
            Ok(path) => photo.offline_image = Some(path.to_string_lossy().into_owned()),
            Err(e) => warn!("Failed to cache photo {}: {}", photo.image, e),
        }
        photo
    }

    /// Drop expired lookup results.
    pub fn cleanup_cache(&self) {
        self.metadata_cache.cleanup();
        self.photo_lookup_cache.cleanup();
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, EnrichError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| EnrichError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EnrichError::Status(response.status().as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EnrichError::Http(e.to_string()))?;

        serde_json::from_slice(&bytes).map_err(|e| EnrichError::Body(e.to_string()))
    }
}

impl Enricher for MetadataService {
    async fn enrich(&self, icao24: &str, callsign: Option<&str>) -> Enrichment {
        self.cleanup_cache();
        let metadata = self.fetch_metadata(icao24).await;

        let mut photo = None;
        if let Some(registration) = metadata.as_ref().and_then(AircraftMetadata::registration) {
            photo = self.fetch_photo(registration).await;
        }
        if photo.is_none() {
            if let Some(callsign) = callsign {
                photo = self.fetch_photo(callsign).await;
            }
        }

        let photo = match photo {
            Some(photo) => Some(self.cache_photo(photo).await),
            None => None,
        };

        Enrichment { metadata, photo }
    }
}
