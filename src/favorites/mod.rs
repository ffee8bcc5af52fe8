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

//! Locally persisted favorite aircraft.
//!
//! Favorites are keyed by `icao24` and survive restarts. They correlate with
//! live data only through that identifier: a favorite whose aircraft is not
//! in the current snapshot is still listed, just not shown as live.

mod service;
mod store;

pub use service::{AddOutcome, FavoritesService};
pub use store::{FavoritesStore, StoreError};

use chrono::{DateTime, Utc};
use opensky_client::{Snapshot, StateVector};

use crate::metadata::{AircraftMetadata, Photo};

/// A stored favorite.
#[derive(Debug, Clone, PartialEq)]
pub struct FavoriteRecord {
    pub id: i64,
    pub icao24: String,
    /// Callsign at the time the favorite was added.
    pub name: Option<String>,
    pub origin_country: Option<String>,
    pub photo: Option<Photo>,
    pub metadata: Option<AircraftMetadata>,
    pub added_at: DateTime<Utc>,
}

impl FavoriteRecord {
    /// Best label for display: callsign, then registration, then the ICAO address.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or_else(|| self.metadata.as_ref().and_then(AircraftMetadata::registration))
            .unwrap_or(&self.icao24)
    }
}

/// Fields captured when a favorite is added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFavorite {
    pub icao24: String,
    pub name: Option<String>,
    pub origin_country: Option<String>,
}

impl NewFavorite {
    /// A favorite with nothing but its identifier.
    #[must_use]
    pub fn from_icao(icao24: &str) -> Self {
        Self {
            icao24: normalize_icao(icao24),
            name: None,
            origin_country: None,
        }
    }
}

impl From<&StateVector> for NewFavorite {
    fn from(state: &StateVector) -> Self {
        Self {
            icao24: normalize_icao(&state.icao24),
            name: state.callsign.clone(),
            origin_country: Some(state.origin_country.clone()),
        }
    }
}

/// Lowercase, trimmed ICAO address as stored and compared.
#[must_use]
pub fn normalize_icao(icao24: &str) -> String {
    icao24.trim().to_ascii_lowercase()
}

/// Whether `icao24` is a 24-bit transponder address: six hex digits after normalization.
#[must_use]
pub fn is_valid_icao(icao24: &str) -> bool {
    let icao24 = normalize_icao(icao24);
    icao24.len() == 6 && icao24.chars().all(|c| c.is_ascii_hexdigit())
}

/// A favorite joined with its live state vector, if the aircraft is in the snapshot.
#[derive(Debug, Clone)]
pub struct FavoriteView {
    pub record: FavoriteRecord,
    pub live: Option<StateVector>,
}

impl FavoriteView {
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }
}

/// Join `records` with `snapshot` by `icao24`.
#[must_use]
pub fn favorite_views(records: &[FavoriteRecord], snapshot: &Snapshot) -> Vec<FavoriteView> {
    records
        .iter()
        .map(|record| FavoriteView {
            record: record.clone(),
            live: snapshot
                .states
                .iter()
                .find(|state| normalize_icao(&state.icao24) == record.icao24)
                .cloned(),
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use opensky_client::{LiveState, PositionSource, StatesResponse};

    pub(crate) fn state(icao24: &str, callsign: Option<&str>) -> StateVector {
        StateVector {
            icao24: icao24.to_string(),
            callsign: callsign.map(str::to_string),
            origin_country: "France".to_string(),
            time_position: Some(1_700_000_000),
            last_contact: 1_700_000_000,
            longitude: Some(2.35),
            latitude: Some(48.85),
            baro_altitude: Some(10_000.0),
            on_ground: false,
            velocity: Some(230.0),
            true_track: Some(180.0),
            vertical_rate: Some(0.0),
            sensors: None,
            geo_altitude: None,
            squawk: None,
            spi: false,
            position_source: PositionSource::AdsB,
            category: None,
        }
    }

    fn record(id: i64, icao24: &str) -> FavoriteRecord {
        FavoriteRecord {
            id,
            icao24: icao24.to_string(),
            name: None,
            origin_country: None,
            photo: None,
            metadata: None,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_favorite_from_state() {
        let favorite = NewFavorite::from(&state(" ABC123", Some("AF123")));
        assert_eq!(favorite.icao24, "abc123");
        assert_eq!(favorite.name.as_deref(), Some("AF123"));
        assert_eq!(favorite.origin_country.as_deref(), Some("France"));
    }

    #[test]
    fn test_icao_validation() {
        assert!(is_valid_icao("abc123"));
        assert!(is_valid_icao(" 3C6444 "));
        assert!(!is_valid_icao(""));
        assert!(!is_valid_icao("abc12"));
        assert!(!is_valid_icao("abc1234"));
        assert!(!is_valid_icao("xyz123"));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut favorite = record(1, "abc123");
        assert_eq!(favorite.display_name(), "abc123");

        favorite.metadata = Some(AircraftMetadata {
            registration: Some("F-GKXA".to_string()),
            ..Default::default()
        });
        assert_eq!(favorite.display_name(), "F-GKXA");

        favorite.name = Some("AF123".to_string());
        assert_eq!(favorite.display_name(), "AF123");
    }

    #[test]
    fn test_favorite_views_mark_live_aircraft() {
        let live = LiveState::new();
        live.publish(
            live.begin_request(),
            StatesResponse {
                time: None,
                states: vec![state("abc123", None), state("fff000", None)],
            },
        );

        let records = vec![record(1, "abc123"), record(2, "def456")];
        let views = favorite_views(&records, &live.current());

        assert_eq!(views.len(), 2);
        assert!(views[0].is_live());
        assert!(!views[1].is_live());
        assert_eq!(views[1].record.icao24, "def456");
    }
}
