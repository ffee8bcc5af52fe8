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

//! User preferences.
//!
//! Preferences are stored as TOML through `confy`. Every field has its own
//! serde default so a partial or older file still loads; values outside
//! their valid range are clamped on load and on every update.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::{info, warn};
use opensky_client::RefreshConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

/// Application name used for config and data directories.
pub const APP_NAME: &str = "flightfinder";

const CONFIG_NAME: &str = "preferences";

const ICON_SCALE_RANGE: (f32, f32) = (0.5, 2.0);
const ZOOM_RANGE: (f32, f32) = (3.0, 18.0);
const REFRESH_RANGE: (u64, u64) = (5, 60);

/// Preference keys accepted by [`UserPreferences::set`].
pub const KEYS: [&str; 10] = [
    "dark_theme",
    "aircraft_icon_scale",
    "default_map_zoom",
    "default_map_latitude",
    "default_map_longitude",
    "show_flight_trails",
    "refresh_interval_seconds",
    "hide_grounded_aircraft",
    "show_aircraft_labels",
    "auto_refresh_enabled",
];

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("config file error: {0}")]
    Confy(#[from] confy::ConfyError),

    #[error("unknown preference '{0}'")]
    UnknownKey(String),

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

/// User preferences stored in TOML format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Dark map and icon theme
    #[serde(default)]
    pub dark_theme: bool,

    /// Aircraft icon scale factor (0.5 - 2.0)
    #[serde(default = "default_icon_scale")]
    pub aircraft_icon_scale: f32,

    /// Initial map zoom level (3 - 18)
    #[serde(default = "default_zoom")]
    pub default_map_zoom: f32,

    #[serde(default = "default_latitude")]
    pub default_map_latitude: f64,

    #[serde(default = "default_longitude")]
    pub default_map_longitude: f64,

    #[serde(default)]
    pub show_flight_trails: bool,

    /// Auto-refresh period in seconds (5 - 60)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,

    /// Only show airborne aircraft on the map
    #[serde(default)]
    pub hide_grounded_aircraft: bool,

    /// Draw callsign labels next to markers
    #[serde(default)]
    pub show_aircraft_labels: bool,

    #[serde(default = "default_true")]
    pub auto_refresh_enabled: bool,
}

// Default value functions for serde
fn default_icon_scale() -> f32 {
    1.0
}

fn default_zoom() -> f32 {
    5.0
}

fn default_latitude() -> f64 {
    48.8566
}

fn default_longitude() -> f64 {
    2.3522
}

fn default_refresh_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            dark_theme: false,
            aircraft_icon_scale: default_icon_scale(),
            default_map_zoom: default_zoom(),
            default_map_latitude: default_latitude(),
            default_map_longitude: default_longitude(),
            show_flight_trails: false,
            refresh_interval_seconds: default_refresh_interval(),
            hide_grounded_aircraft: false,
            show_aircraft_labels: false,
            auto_refresh_enabled: true,
        }
    }
}

fn clamp_f32(value: f32, (min, max): (f32, f32), fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

impl UserPreferences {
    /// Clamp every ranged value into its valid range.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.aircraft_icon_scale =
            clamp_f32(self.aircraft_icon_scale, ICON_SCALE_RANGE, default_icon_scale());
        self.default_map_zoom = clamp_f32(self.default_map_zoom, ZOOM_RANGE, default_zoom());
        self.refresh_interval_seconds = self
            .refresh_interval_seconds
            .clamp(REFRESH_RANGE.0, REFRESH_RANGE.1);
        if !(-90.0..=90.0).contains(&self.default_map_latitude) {
            self.default_map_latitude = default_latitude();
        }
        if !(-180.0..=180.0).contains(&self.default_map_longitude) {
            self.default_map_longitude = default_longitude();
        }
        self
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    /// Scheduler settings derived from these preferences.
    #[must_use]
    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            enabled: self.auto_refresh_enabled,
            interval: self.refresh_interval(),
        }
    }

    /// Set a preference by key from its textual form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), PreferencesError> {
        let invalid = || PreferencesError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let value = value.trim();

        match key {
            "dark_theme" => self.dark_theme = value.parse().map_err(|_e| invalid())?,
            "aircraft_icon_scale" => {
                self.aircraft_icon_scale = value.parse().map_err(|_e| invalid())?;
            }
            "default_map_zoom" => self.default_map_zoom = value.parse().map_err(|_e| invalid())?,
            "default_map_latitude" => {
                self.default_map_latitude = value.parse().map_err(|_e| invalid())?;
            }
            "default_map_longitude" => {
                self.default_map_longitude = value.parse().map_err(|_e| invalid())?;
            }
            "show_flight_trails" => {
                self.show_flight_trails = value.parse().map_err(|_e| invalid())?;
            }
            "refresh_interval_seconds" => {
                self.refresh_interval_seconds = value.parse().map_err(|_e| invalid())?;
            }
            "hide_grounded_aircraft" => {
                self.hide_grounded_aircraft = value.parse().map_err(|_e| invalid())?;
            }
            "show_aircraft_labels" => {
                self.show_aircraft_labels = value.parse().map_err(|_e| invalid())?;
            }
            "auto_refresh_enabled" => {
                self.auto_refresh_enabled = value.parse().map_err(|_e| invalid())?;
            }
            other => return Err(PreferencesError::UnknownKey(other.to_string())),
        }

        Ok(())
    }

    /// `(key, value)` pairs in display order.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (KEYS[0], self.dark_theme.to_string()),
            (KEYS[1], self.aircraft_icon_scale.to_string()),
            (KEYS[2], self.default_map_zoom.to_string()),
            (KEYS[3], self.default_map_latitude.to_string()),
            (KEYS[4], self.default_map_longitude.to_string()),
            (KEYS[5], self.show_flight_trails.to_string()),
            (KEYS[6], self.refresh_interval_seconds.to_string()),
            (KEYS[7], self.hide_grounded_aircraft.to_string()),
            (KEYS[8], self.show_aircraft_labels.to_string()),
            (KEYS[9], self.auto_refresh_enabled.to_string()),
        ]
    }
}

/// Backing storage for preferences.
pub trait PreferencesStore: Send + Sync {
    fn load(&self) -> Result<UserPreferences, PreferencesError>;
    fn save(&self, preferences: &UserPreferences) -> Result<(), PreferencesError>;
}

/// TOML file in the platform config directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfyStore;

impl ConfyStore {
    /// Get the config file path for display to user
    pub fn path() -> Result<PathBuf, PreferencesError> {
        Ok(confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)?)
    }
}

impl PreferencesStore for ConfyStore {
    fn load(&self) -> Result<UserPreferences, PreferencesError> {
        Ok(confy::load(APP_NAME, CONFIG_NAME)?)
    }

    fn save(&self, preferences: &UserPreferences) -> Result<(), PreferencesError> {
        Ok(confy::store(APP_NAME, CONFIG_NAME, preferences)?)
    }
}

/// Non-persistent store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<UserPreferences>>,
}

impl MemoryStore {
    #[must_use]
    pub fn with(preferences: UserPreferences) -> Self {
        Self {
            saved: Mutex::new(Some(preferences)),
        }
    }

    /// Last saved value, if any.
    #[must_use]
    pub fn saved(&self) -> Option<UserPreferences> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PreferencesStore for MemoryStore {
    fn load(&self) -> Result<UserPreferences, PreferencesError> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, preferences: &UserPreferences) -> Result<(), PreferencesError> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(preferences.clone());
        Ok(())
    }
}

/// Observable preferences backed by a store.
pub struct PreferencesService {
    store: Box<dyn PreferencesStore>,
    tx: watch::Sender<UserPreferences>,
}

impl std::fmt::Debug for PreferencesService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferencesService")
            .field("current", &*self.tx.borrow())
            .finish_non_exhaustive()
    }
}

impl PreferencesService {
    /// Load preferences from `store`, falling back to defaults if the file is unreadable.
    pub fn new(store: impl PreferencesStore + 'static) -> Self {
        let preferences = match store.load() {
            Ok(preferences) => preferences.normalized(),
            Err(e) => {
                warn!("Failed to load preferences, using defaults: {}", e);
                UserPreferences::default()
            }
        };
        let (tx, _) = watch::channel(preferences);

        Self {
            store: Box::new(store),
            tx,
        }
    }

    #[must_use]
    pub fn current(&self) -> UserPreferences {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<UserPreferences> {
        self.tx.subscribe()
    }

    /// Apply `change`, clamp, persist, and notify subscribers if anything changed.
    pub fn update(
        &self,
        change: impl FnOnce(&mut UserPreferences),
    ) -> Result<UserPreferences, PreferencesError> {
        let mut next = self.current();
        change(&mut next);
        let next = next.normalized();

        if next == *self.tx.borrow() {
            return Ok(next);
        }

        self.store.save(&next)?;
        self.tx.send_replace(next.clone());
        Ok(next)
    }

    /// Set one preference by key.
    pub fn set(&self, key: &str, value: &str) -> Result<UserPreferences, PreferencesError> {
        let mut parsed = self.current();
        parsed.set(key, value)?;
        let next = self.update(|preferences| *preferences = parsed)?;
        info!("Preference {} set to {}", key, value);
        Ok(next)
    }

    /// Restore and persist the defaults.
    pub fn reset(&self) -> Result<UserPreferences, PreferencesError> {
        let defaults = UserPreferences::default();
        self.store.save(&defaults)?;
        self.tx.send_replace(defaults.clone());
        Ok(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    impl PreferencesStore for Arc<MemoryStore> {
        fn load(&self) -> Result<UserPreferences, PreferencesError> {
            (**self).load()
        }

        fn save(&self, preferences: &UserPreferences) -> Result<(), PreferencesError> {
            (**self).save(preferences)
        }
    }

    #[test]
    fn test_defaults() {
        let prefs = UserPreferences::default();
        assert!(!prefs.dark_theme);
        assert_eq!(prefs.aircraft_icon_scale, 1.0);
        assert_eq!(prefs.default_map_zoom, 5.0);
        assert_eq!(prefs.default_map_latitude, 48.8566);
        assert_eq!(prefs.default_map_longitude, 2.3522);
        assert_eq!(prefs.refresh_interval_seconds, 10);
        assert!(prefs.auto_refresh_enabled);
        assert!(!prefs.show_aircraft_labels);
    }

    #[test]
    fn test_partial_file_uses_field_defaults() {
        let prefs: UserPreferences =
            serde_json::from_str(r#"{"dark_theme": true, "refresh_interval_seconds": 30}"#)
                .unwrap();
        assert!(prefs.dark_theme);
        assert_eq!(prefs.refresh_interval_seconds, 30);
        assert_eq!(prefs.default_map_zoom, 5.0);
        assert!(prefs.auto_refresh_enabled);
    }

    #[test]
    fn test_normalized_clamps_ranges() {
        let prefs = UserPreferences {
            aircraft_icon_scale: 9.0,
            default_map_zoom: 1.0,
            refresh_interval_seconds: 1,
            default_map_latitude: 123.0,
            ..Default::default()
        }
        .normalized();

        assert_eq!(prefs.aircraft_icon_scale, 2.0);
        assert_eq!(prefs.default_map_zoom, 3.0);
        assert_eq!(prefs.refresh_interval_seconds, 5);
        assert_eq!(prefs.default_map_latitude, 48.8566);

        let prefs = UserPreferences {
            aircraft_icon_scale: f32::NAN,
            refresh_interval_seconds: 600,
            ..Default::default()
        }
        .normalized();
        assert_eq!(prefs.aircraft_icon_scale, 1.0);
        assert_eq!(prefs.refresh_interval_seconds, 60);
    }

    #[test]
    fn test_set_by_key() {
        let mut prefs = UserPreferences::default();
        prefs.set("dark_theme", "true").unwrap();
        prefs.set("refresh_interval_seconds", " 20 ").unwrap();
        assert!(prefs.dark_theme);
        assert_eq!(prefs.refresh_interval(), Duration::from_secs(20));

        assert!(matches!(
            prefs.set("volume", "11"),
            Err(PreferencesError::UnknownKey(_))
        ));
        assert!(matches!(
            prefs.set("dark_theme", "maybe"),
            Err(PreferencesError::InvalidValue { .. })
        ));
        assert_eq!(prefs.entries().len(), KEYS.len());
    }

    #[test]
    fn test_service_persists_and_notifies() {
        let store = Arc::new(MemoryStore::default());
        let service = PreferencesService::new(Arc::clone(&store));
        let mut rx = service.subscribe();

        service.set("auto_refresh_enabled", "false").unwrap();

        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().auto_refresh_enabled);
        assert_eq!(store.saved().map(|p| p.auto_refresh_enabled), Some(false));
    }

    #[test]
    fn test_unchanged_update_does_not_notify() {
        let service = PreferencesService::new(MemoryStore::default());
        let rx = service.subscribe();

        service.update(|p| p.refresh_interval_seconds = 10).unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_service_clamps_loaded_values() {
        let service = PreferencesService::new(MemoryStore::with(UserPreferences {
            default_map_zoom: 40.0,
            ..Default::default()
        }));
        assert_eq!(service.current().default_map_zoom, 18.0);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let service = PreferencesService::new(MemoryStore::default());
        service.set("show_aircraft_labels", "true").unwrap();
        let prefs = service.reset().unwrap();
        assert_eq!(prefs, UserPreferences::default());
        assert_eq!(service.current(), UserPreferences::default());
    }

    #[test]
    fn test_refresh_config_from_preferences() {
        let prefs = UserPreferences::default();
        let config = prefs.refresh_config();
        assert!(config.enabled);
        assert_eq!(config.interval, Duration::from_secs(10));
    }
}
