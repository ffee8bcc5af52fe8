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

//! Marker reconciliation.
//!
//! Every refresh throws away the previous markers and rebuilds them from
//! the latest snapshot. Identity across refreshes comes only from `icao24`:
//! the selected aircraft keeps its highlighted icon and open popup, and
//! favorites keep their icon, as long as the aircraft is in the snapshot.

mod icons;
mod markers;
mod selection;

pub use icons::{icon_size, IconBitmap, IconCache, IconError, IconStyle};
pub use markers::{is_visible, Marker, RenderOptions, UNKNOWN_FLIGHT};
pub use selection::{Focus, Selection, SelectionStatus, FOCUS_MIN_ZOOM};

use std::collections::HashSet;

use log::{debug, warn};
use opensky_client::Snapshot;

use crate::favorites::normalize_icao;

/// Output of one reconcile pass.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    /// Sequence of the snapshot the markers were built from.
    pub sequence: u64,
    pub markers: Vec<Marker>,
    /// Camera move for the selected aircraft, when it is visible.
    pub focus: Option<Focus>,
    pub selection: SelectionStatus,
}

impl RenderPlan {
    #[must_use]
    pub fn marker(&self, icao24: &str) -> Option<&Marker> {
        let icao24 = normalize_icao(icao24);
        self.markers.iter().find(|m| m.icao24 == icao24)
    }
}

/// Map overlay state: current markers, selection and icon cache.
#[derive(Debug)]
pub struct Radar {
    icons: IconCache,
    selection: Selection,
    markers: Vec<Marker>,
    zoom: f32,
}

impl Radar {
    #[must_use]
    pub fn new(initial_zoom: f32) -> Self {
        Self {
            icons: IconCache::new(),
            selection: Selection::default(),
            markers: Vec::new(),
            zoom: initial_zoom,
        }
    }

    /// Rebuild all markers from `snapshot`.
    pub fn reconcile(
        &mut self,
        snapshot: &Snapshot,
        favorites: &HashSet<String>,
        options: &RenderOptions,
    ) -> Result<RenderPlan, IconError> {
        let size = icon_size(options.icon_scale);
        let mut placed = Vec::with_capacity(snapshot.len());
        let mut focus = None;

        for state in &snapshot.states {
            if !is_visible(state, options) {
                continue;
            }
            let Some((latitude, longitude)) = state.position() else {
                continue;
            };

            let icao24 = normalize_icao(&state.icao24);
            let selected = self.selection.is_selected(&icao24);
            let is_favorite = favorites.contains(&icao24);
            let style = markers::style_for(selected, is_favorite, options.dark_theme);
            let title = markers::title(state);

            if selected {
                focus = Some(Selection::focus(latitude, longitude, self.zoom));
            }

            placed.push(Marker {
                icao24,
                latitude,
                longitude,
                rotation: markers::rotation(state.true_track),
                label: options.show_labels.then(|| title.clone()),
                title,
                style,
                icon: self.icons.get(size, style)?,
                popup_open: selected,
                is_favorite,
                state: state.clone(),
            });
        }

        let selection = match (self.selection.selected(), focus) {
            (None, _) => SelectionStatus::None,
            (Some(_), Some(_)) => SelectionStatus::Visible,
            (Some(_), None) => SelectionStatus::Stale,
        };

        if let Some(focus) = focus {
            self.zoom = focus.zoom;
        }

        debug!(
            "Reconciled snapshot #{}: {} markers from {} states, selection {:?}",
            snapshot.sequence,
            placed.len(),
            snapshot.len(),
            selection
        );

        self.markers.clone_from(&placed);

        Ok(RenderPlan {
            sequence: snapshot.sequence,
            markers: placed,
            focus,
            selection,
        })
    }

    /// Select an aircraft. Takes effect on the current markers immediately.
    ///
    /// Returns the focus if the aircraft currently has a marker.
    pub fn select(
        &mut self,
        icao24: &str,
        favorites: &HashSet<String>,
        dark_theme: bool,
    ) -> Option<Focus> {
        self.selection.select(icao24);
        self.restyle(favorites, dark_theme)
    }

    /// Map tap or drag: drop the selection and close every popup.
    pub fn clear_on_map_interaction(&mut self, favorites: &HashSet<String>, dark_theme: bool) {
        if self.selection.selected().is_some() {
            debug!("Map interaction cleared the selection");
        }
        self.selection.clear();
        self.restyle(favorites, dark_theme);
    }

    fn restyle(&mut self, favorites: &HashSet<String>, dark_theme: bool) -> Option<Focus> {
        let mut focus = None;

        for marker in &mut self.markers {
            let selected = self.selection.is_selected(&marker.icao24);
            let favorite = favorites.contains(&marker.icao24);
            let style = markers::style_for(selected, favorite, dark_theme);
            if style != marker.style {
                match self.icons.get(marker.icon.size, style) {
                    Ok(icon) => {
                        marker.icon = icon;
                        marker.style = style;
                    }
                    Err(e) => warn!("Failed to restyle marker {}: {}", marker.icao24, e),
                }
            }
            marker.popup_open = selected;
            if selected {
                focus = Some(Selection::focus(marker.latitude, marker.longitude, self.zoom));
            }
        }

        if let Some(focus) = focus {
            self.zoom = focus.zoom;
        }
        focus
    }

    /// The map's zoom changed.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom;
    }

    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    #[must_use]
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    #[must_use]
    pub fn icons(&self) -> &IconCache {
        &self.icons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::favorites::tests::state;
    use opensky_client::{LiveState, StateVector, StatesResponse};
    use std::sync::Arc;

    fn snapshot(live: &LiveState, states: Vec<StateVector>) -> Arc<Snapshot> {
        live.publish(live.begin_request(), StatesResponse { time: None, states });
        live.current()
    }

    fn favorites(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| (*id).to_string()).collect()
    }

    #[test]
    fn test_markers_exclude_missing_positions() {
        let live = LiveState::new();
        let mut no_position = state("def456", None);
        no_position.latitude = None;

        let mut radar = Radar::new(5.0);
        let plan = radar
            .reconcile(
                &snapshot(&live, vec![state("abc123", None), no_position]),
                &HashSet::new(),
                &RenderOptions::default(),
            )
            .unwrap();

        assert_eq!(plan.markers.len(), 1);
        assert!(plan.marker("def456").is_none());
        assert_eq!(plan.selection, SelectionStatus::None);
    }

    #[test]
    fn test_icon_styles_and_labels() {
        let live = LiveState::new();
        let mut radar = Radar::new(5.0);
        radar.select("abc123", &HashSet::new(), false);

        let options = RenderOptions {
            show_labels: true,
            dark_theme: true,
            ..Default::default()
        };
        let plan = radar
            .reconcile(
                &snapshot(
                    &live,
                    vec![
                        state("abc123", Some("AF123")),
                        state("def456", None),
                        state("fff000", None),
                    ],
                ),
                &favorites(&["abc123", "def456"]),
                &options,
            )
            .unwrap();

        let selected = plan.marker("abc123").unwrap();
        assert_eq!(selected.style, IconStyle::Selected);
        assert!(selected.popup_open);
        assert_eq!(selected.label.as_deref(), Some("AF123"));
        assert_eq!(selected.rotation, 90.0);

        let favorite = plan.marker("def456").unwrap();
        assert_eq!(favorite.style, IconStyle::Favorite);
        assert!(favorite.is_favorite);
        assert_eq!(favorite.label.as_deref(), Some(UNKNOWN_FLIGHT));

        assert_eq!(plan.marker("fff000").unwrap().style, IconStyle::DefaultDark);
    }

    #[test]
    fn test_labels_off_by_default() {
        let live = LiveState::new();
        let mut radar = Radar::new(5.0);
        let plan = radar
            .reconcile(
                &snapshot(&live, vec![state("abc123", Some("AF123"))]),
                &HashSet::new(),
                &RenderOptions::default(),
            )
            .unwrap();
        assert_eq!(plan.markers[0].label, None);
        assert_eq!(plan.markers[0].title, "AF123");
    }

    #[test]
    fn test_selection_is_retained_while_absent_and_refocused_on_return() {
        let live = LiveState::new();
        let options = RenderOptions::default();
        let mut radar = Radar::new(5.0);
        radar.select("abc123", &HashSet::new(), false);

        let plan = radar
            .reconcile(
                &snapshot(&live, vec![state("abc123", None)]),
                &HashSet::new(),
                &options,
            )
            .unwrap();
        assert_eq!(plan.selection, SelectionStatus::Visible);
        let focus = plan.focus.unwrap();
        assert_eq!(focus.zoom, FOCUS_MIN_ZOOM);
        assert_eq!((focus.latitude, focus.longitude), (48.85, 2.35));

        let plan = radar
            .reconcile(
                &snapshot(&live, vec![state("def456", None)]),
                &HashSet::new(),
                &options,
            )
            .unwrap();
        assert_eq!(plan.selection, SelectionStatus::Stale);
        assert!(plan.focus.is_none());
        assert_eq!(radar.selection().selected(), Some("abc123"));

        let plan = radar
            .reconcile(
                &snapshot(&live, vec![state("abc123", None)]),
                &HashSet::new(),
                &options,
            )
            .unwrap();
        assert_eq!(plan.selection, SelectionStatus::Visible);
        assert!(plan.marker("abc123").unwrap().popup_open);
        assert!(plan.focus.is_some());
    }

    #[test]
    fn test_focus_keeps_deeper_zoom() {
        let live = LiveState::new();
        let mut radar = Radar::new(5.0);
        radar.set_zoom(14.0);
        radar.select("abc123", &HashSet::new(), false);

        let plan = radar
            .reconcile(
                &snapshot(&live, vec![state("abc123", None)]),
                &HashSet::new(),
                &RenderOptions::default(),
            )
            .unwrap();
        assert_eq!(plan.focus.map(|f| f.zoom), Some(14.0));
    }

    #[test]
    fn test_map_interaction_clears_selection_and_popups() {
        let live = LiveState::new();
        let favs = favorites(&["abc123"]);
        let mut radar = Radar::new(5.0);
        radar.select("abc123", &favs, false);
        radar
            .reconcile(
                &snapshot(&live, vec![state("abc123", None)]),
                &favs,
                &RenderOptions::default(),
            )
            .unwrap();

        radar.clear_on_map_interaction(&favs, false);

        assert_eq!(radar.selection().selected(), None);
        let marker = &radar.markers()[0];
        assert!(!marker.popup_open);
        assert_eq!(marker.style, IconStyle::Favorite);
    }

    #[test]
    fn test_select_restyles_current_markers() {
        let live = LiveState::new();
        let mut radar = Radar::new(5.0);
        radar
            .reconcile(
                &snapshot(&live, vec![state("abc123", None), state("def456", None)]),
                &HashSet::new(),
                &RenderOptions::default(),
            )
            .unwrap();

        let focus = radar.select("def456", &HashSet::new(), false);
        assert!(focus.is_some());
        assert_eq!(radar.markers()[1].style, IconStyle::Selected);
        assert!(radar.markers()[1].popup_open);
        assert!(!radar.markers()[0].popup_open);

        assert!(radar.select("zzz999", &HashSet::new(), false).is_none());
        assert_eq!(radar.markers()[1].style, IconStyle::DefaultLight);
    }

    #[test]
    fn test_restyle_keeps_icon_style_and_popup_in_step() {
        let live = LiveState::new();
        let mut radar = Radar::new(5.0);
        let favorites = favorites(&["abc123"]);
        radar
            .reconcile(
                &snapshot(&live, vec![state("abc123", None), state("def456", None)]),
                &favorites,
                &RenderOptions::default(),
            )
            .unwrap();

        for target in ["abc123", "def456"] {
            radar.select(target, &favorites, true);
            for marker in radar.markers() {
                assert_eq!(marker.icon.style, marker.style, "{}", marker.icao24);
                assert_eq!(marker.popup_open, marker.style == IconStyle::Selected);
            }
        }

        radar.clear_on_map_interaction(&favorites, true);
        let styles: Vec<IconStyle> = radar.markers().iter().map(|m| m.style).collect();
        assert_eq!(styles, vec![IconStyle::Favorite, IconStyle::DefaultDark]);
        assert!(radar.markers().iter().all(|m| m.icon.style == m.style));
    }

    #[test]
    fn test_icons_are_shared_across_refreshes() {
        let live = LiveState::new();
        let mut radar = Radar::new(5.0);
        let options = RenderOptions::default();

        for _ in 0..3 {
            radar
                .reconcile(
                    &snapshot(&live, vec![state("abc123", None), state("def456", None)]),
                    &HashSet::new(),
                    &options,
                )
                .unwrap();
        }
        assert_eq!(radar.icons().rasterized(), 1);
    }

    #[test]
    fn test_failed_refresh_empties_markers_but_keeps_selection() {
        let live = LiveState::new();
        let mut radar = Radar::new(5.0);
        radar.select("abc123", &HashSet::new(), false);
        radar
            .reconcile(
                &snapshot(&live, vec![state("abc123", None)]),
                &HashSet::new(),
                &RenderOptions::default(),
            )
            .unwrap();

        live.publish_failure(live.begin_request());
        let plan = radar
            .reconcile(&live.current(), &HashSet::new(), &RenderOptions::default())
            .unwrap();

        assert!(plan.markers.is_empty());
        assert_eq!(plan.selection, SelectionStatus::Stale);
    }
}
