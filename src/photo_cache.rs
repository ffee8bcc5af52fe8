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

//! Aircraft photo disk cache.
//!
//! Photos of favorited aircraft are downloaded once and kept on disk under
//! SHA256-based filenames so they stay viewable offline. Concurrent requests
//! for the same URL are collapsed.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use sha2::{Digest, Sha256};

use crate::config::APP_NAME;
use crate::metadata::EnrichError;

/// Photo cache manager for favorite aircraft
#[derive(Debug, Clone)]
pub struct PhotoCache {
    cache_dir: PathBuf,
    pending_downloads: Arc<Mutex<HashSet<String>>>, // Track ongoing downloads
}

impl PhotoCache {
    /// Open (and create if needed) a cache rooted at `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;

        Ok(Self {
            cache_dir,
            pending_downloads: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Platform cache directory for photos.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join(APP_NAME).join("aircraft_photos"))
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get cache file path for a given URL
    #[must_use]
    pub fn cache_path(&self, url: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        self.cache_dir.join(format!("{}.{}", hash, extension(url)))
    }

    #[must_use]
    pub fn is_cached(&self, url: &str) -> bool {
        self.cache_path(url).exists()
    }

    /// Get cached image bytes
    #[must_use]
    pub fn get_cached_bytes(&self, url: &str) -> Option<Vec<u8>> {
        fs::read(self.cache_path(url)).ok()
    }

    /// Download `url` unless it is already cached, returning the local path.
    pub async fn download_and_cache(
        &self,
        http: &reqwest::Client,
        url: &str,
    ) -> Result<PathBuf, EnrichError> {
        let path = self.cache_path(url);
        if path.exists() {
            return Ok(path);
        }

        let Some(_pending) = self.begin_download(url) else {
            return Err(EnrichError::AlreadyPending(url.to_string()));
        };

        self.download_image(http, url, &path).await?;
        Ok(path)
    }

    async fn download_image(
        &self,
        http: &reqwest::Client,
        url: &str,
        path: &Path,
    ) -> Result<(), EnrichError> {
        let response = http
            .get(url)
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

        self.store(path, &bytes)?;
        debug!("Cached {} bytes for {}", bytes.len(), url);
        Ok(())
    }

    fn store(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir)?;
        fs::write(path, bytes)
    }

    /// Delete the cached copy of `url`, if any.
    pub fn evict(&self, url: &str) -> io::Result<()> {
        match fs::remove_file(self.cache_path(url)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Check if download is pending
    #[must_use]
    pub fn is_pending(&self, url: &str) -> bool {
        self.pending().contains(url)
    }

    /// Mark `url` as downloading. The mark is cleared when the guard drops.
    fn begin_download(&self, url: &str) -> Option<PendingDownload<'_>> {
        self.pending().insert(url.to_string()).then(|| PendingDownload {
            cache: self,
            url: url.to_string(),
        })
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.pending_downloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the pending mark when a download ends, including when it is cancelled.
struct PendingDownload<'a> {
    cache: &'a PhotoCache,
    url: String,
}

impl Drop for PendingDownload<'_> {
    fn drop(&mut self) {
        self.cache.pending().remove(&self.url);
    }
}

/// File extension taken from the URL path, `jpg` when absent or odd-looking.
fn extension(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last_segment = path.rsplit('/').next().unwrap_or(path);

    match last_segment.rsplit_once('.') {
        Some((_, ext))
            if (1..=4).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext
        }
        _ => "jpg",
    }
}
