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

use crate::favorites::normalize_icao;

/// Minimum zoom when centering on the selected aircraft.
pub const FOCUS_MIN_ZOOM: f32 = 8.0;

/// Where the selection stands after a reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStatus {
    /// Nothing is selected.
    None,
    /// The selected aircraft has a marker.
    Visible,
    /// The selected aircraft is missing from the latest snapshot. The
    /// selection is kept and re-attaches when it reappears.
    Stale,
}

/// Camera move requested for the selected aircraft.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Focus {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f32,
}

/// At most one selected aircraft.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    icao24: Option<String>,
}

impl Selection {
    pub fn select(&mut self, icao24: &str) {
        self.icao24 = Some(normalize_icao(icao24));
    }

    pub fn clear(&mut self) {
        self.icao24 = None;
    }

    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.icao24.as_deref()
    }

    #[must_use]
    pub fn is_selected(&self, icao24: &str) -> bool {
        self.icao24
            .as_deref()
            .is_some_and(|selected| selected == normalize_icao(icao24))
    }

    /// Focus on `(latitude, longitude)`, zooming in to at least [`FOCUS_MIN_ZOOM`].
    #[must_use]
    pub fn focus(latitude: f64, longitude: f64, current_zoom: f32) -> Focus {
        Focus {
            latitude,
            longitude,
            zoom: current_zoom.max(FOCUS_MIN_ZOOM),
        }
    }
}
