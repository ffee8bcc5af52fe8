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

use std::sync::Arc;

use opensky_client::StateVector;

use super::icons::{IconBitmap, IconStyle};
use crate::config::UserPreferences;

/// Label used when an aircraft has no callsign.
pub const UNKNOWN_FLIGHT: &str = "Unknown flight";

/// Preference subset that affects marker rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub dark_theme: bool,
    pub icon_scale: f32,
    pub hide_grounded: bool,
    pub show_labels: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from(&UserPreferences::default())
    }
}

impl From<&UserPreferences> for RenderOptions {
    fn from(preferences: &UserPreferences) -> Self {
        Self {
            dark_theme: preferences.dark_theme,
            icon_scale: preferences.aircraft_icon_scale,
            hide_grounded: preferences.hide_grounded_aircraft,
            show_labels: preferences.show_aircraft_labels,
        }
    }
}

/// One aircraft as the map should draw it.
#[derive(Debug, Clone)]
pub struct Marker {
    pub icao24: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Icon rotation in degrees clockwise. 0 when the track is unknown.
    pub rotation: f32,
    /// Text drawn next to the icon, only when labels are enabled.
    pub label: Option<String>,
    /// Popup title.
    pub title: String,
    pub style: IconStyle,
    pub icon: Arc<IconBitmap>,
    pub popup_open: bool,
    pub is_favorite: bool,
    /// Data shown in the popup.
    pub state: StateVector,
}

/// Whether a state vector gets a marker at all.
#[must_use]
pub fn is_visible(state: &StateVector, options: &RenderOptions) -> bool {
    state.has_valid_position() && !(options.hide_grounded && state.on_ground)
}

/// Icon rotation for a track angle.
#[must_use]
#[allow(clippy::cast_possible_truncation, reason = "angles fit in f32")]
pub fn rotation(true_track: Option<f64>) -> f32 {
    true_track.map_or(0.0, |track| (track - 90.0) as f32)
}

/// Popup title: trimmed callsign or a placeholder.
#[must_use]
pub fn title(state: &StateVector) -> String {
    state
        .callsign
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(UNKNOWN_FLIGHT)
        .to_string()
}

/// Choose the icon style for an aircraft.
#[must_use]
pub fn style_for(selected: bool, favorite: bool, dark_theme: bool) -> IconStyle {
    if selected {
        IconStyle::Selected
    } else if favorite {
        IconStyle::Favorite
    } else {
        IconStyle::default_for(dark_theme)
    }
}
