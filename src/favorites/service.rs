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

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use opensky_client::{Snapshot, StateVector};
use tokio::sync::watch;

use super::store::{FavoritesStore, StoreError};
use super::{
    favorite_views, is_valid_icao, normalize_icao, FavoriteRecord, FavoriteView, NewFavorite,
};
use crate::metadata::{Enricher, Enrichment};

/// Upper bound on metadata + photo lookup for one favorite.
const ENRICH_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of adding a favorite.
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// A new record was stored (with whatever enrichment succeeded).
    Added(FavoriteRecord),
    /// The aircraft was already a favorite; the existing record is unchanged.
    AlreadyPresent(FavoriteRecord),
}

impl AddOutcome {
    #[must_use]
    pub fn record(&self) -> &FavoriteRecord {
        match self {
            Self::Added(record) | Self::AlreadyPresent(record) => record,
        }
    }
}

/// Favorites with change notification and post-insert enrichment.
pub struct FavoritesService<E> {
    store: Arc<FavoritesStore>,
    enricher: E,
    enrich_timeout: Duration,
    tx: watch::Sender<Arc<Vec<FavoriteRecord>>>,
}

impl<E> std::fmt::Debug for FavoritesService<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FavoritesService")
            .field("store", &self.store)
            .field("count", &self.tx.borrow().len())
            .finish_non_exhaustive()
    }
}

impl<E: Enricher> FavoritesService<E> {
    /// Wrap `store` and load the current favorites.
    pub async fn new(store: FavoritesStore, enricher: E) -> Result<Self, StoreError> {
        let (tx, _) = watch::channel(Arc::new(Vec::new()));
        let service = Self {
            store: Arc::new(store),
            enricher,
            enrich_timeout: ENRICH_TIMEOUT,
            tx,
        };
        service.reload().await?;
        Ok(service)
    }

    #[must_use]
    pub fn with_enrich_timeout(mut self, timeout: Duration) -> Self {
        self.enrich_timeout = timeout;
        self
    }

    /// Current favorites.
    #[must_use]
    pub fn favorites(&self) -> Arc<Vec<FavoriteRecord>> {
        Arc::clone(&self.tx.borrow())
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<FavoriteRecord>>> {
        self.tx.subscribe()
    }

    /// ICAO addresses of all favorites.
    #[must_use]
    pub fn icao_set(&self) -> HashSet<String> {
        self.tx
            .borrow()
            .iter()
            .map(|record| record.icao24.clone())
            .collect()
    }

    #[must_use]
    pub fn is_favorite(&self, icao24: &str) -> bool {
        let icao24 = normalize_icao(icao24);
        self.tx.borrow().iter().any(|record| record.icao24 == icao24)
    }

    /// Favorites joined with the live snapshot.
    #[must_use]
    pub fn favorite_views(&self, snapshot: &Snapshot) -> Vec<FavoriteView> {
        favorite_views(&self.tx.borrow(), snapshot)
    }

    /// Re-read all favorites from the store and publish them.
    pub async fn reload(&self) -> Result<Arc<Vec<FavoriteRecord>>, StoreError> {
        let records = Arc::new(self.blocking(FavoritesStore::list).await?);
        self.tx.send_replace(Arc::clone(&records));
        Ok(records)
    }

    /// Add the aircraft behind a live state vector.
    pub async fn add(&self, state: &StateVector) -> Result<AddOutcome, StoreError> {
        self.add_new(NewFavorite::from(state)).await
    }

    /// Add a favorite. Enrichment runs after the insert and never undoes it.
    pub async fn add_new(&self, favorite: NewFavorite) -> Result<AddOutcome, StoreError> {
        if !is_valid_icao(&favorite.icao24) {
            return Err(StoreError::InvalidIcao(favorite.icao24));
        }
        let icao24 = favorite.icao24.clone();
        let callsign = favorite.name.clone();

        let inserted = self
            .blocking(move |store| store.insert(&favorite))
            .await?;

        let Some(id) = inserted else {
            let existing = {
                let icao24 = icao24.clone();
                self.blocking(move |store| store.get_by_icao(&icao24)).await?
            };
            info!("{} is already a favorite", icao24);
            return match existing {
                Some(record) => Ok(AddOutcome::AlreadyPresent(record)),
                None => Err(StoreError::Task(format!("favorite {icao24} vanished"))),
            };
        };

        info!("Added favorite {} (id {})", icao24, id);
        self.reload().await?;

        let enrichment = self.enrich(&icao24, callsign.as_deref()).await;
        if enrichment != Enrichment::default() {
            if let Err(e) = self
                .blocking(move |store| store.set_enrichment(id, &enrichment))
                .await
            {
                warn!("Failed to store enrichment for favorite {}: {}", id, e);
            }
        }

        self.reload().await?;
        let record = self.blocking(move |store| store.get(id)).await?;
        record
            .map(AddOutcome::Added)
            .ok_or_else(|| StoreError::Task(format!("favorite {id} removed during enrichment")))
    }

    /// Delete by record id. Returns `false` if nothing matched.
    pub async fn remove(&self, id: i64) -> Result<bool, StoreError> {
        let removed = self.blocking(move |store| store.delete(id)).await?;
        if removed {
            info!("Removed favorite {}", id);
            self.reload().await?;
        }
        Ok(removed)
    }

    /// Delete all favorites.
    pub async fn clear(&self) -> Result<usize, StoreError> {
        let removed = self.blocking(FavoritesStore::clear).await?;
        info!("Cleared {} favorites", removed);
        self.reload().await?;
        Ok(removed)
    }

    async fn enrich(&self, icao24: &str, callsign: Option<&str>) -> Enrichment {
        match tokio::time::timeout(self.enrich_timeout, self.enricher.enrich(icao24, callsign))
            .await
        {
            Ok(enrichment) => enrichment,
            Err(_elapsed) => {
                warn!("Enrichment for {} timed out", icao24);
                Enrichment::default()
            }
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&FavoritesStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}
