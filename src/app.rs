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

//! Radar session: preferences, favorites and the live feed wired together.

use log::{debug, info, warn};
use opensky_client::{Client, FetchReport};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PreferencesService;
use crate::favorites::{
    normalize_icao, AddOutcome, FavoriteView, FavoritesService, NewFavorite, StoreError,
};
use crate::metadata::Enricher;
use crate::radar::{Focus, IconError, Radar, RenderOptions, RenderPlan};

/// One running radar view.
pub struct RadarSession<E> {
    preferences: PreferencesService,
    favorites: FavoritesService<E>,
    client: Client,
    radar: Radar,
}

impl<E> std::fmt::Debug for RadarSession<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadarSession")
            .field("client", &self.client)
            .field("radar", &self.radar)
            .finish_non_exhaustive()
    }
}

impl<E: Enricher> RadarSession<E> {
    /// Build a session and apply the stored refresh settings to `client`.
    pub fn new(
        preferences: PreferencesService,
        favorites: FavoritesService<E>,
        client: Client,
    ) -> Self {
        let zoom = preferences.current().default_map_zoom;
        let mut session = Self {
            preferences,
            favorites,
            client,
            radar: Radar::new(zoom),
        };
        session.apply_preferences();
        session
    }

    /// Push the current refresh preferences into the scheduler.
    pub fn apply_preferences(&mut self) {
        let refresh = self.preferences.current().refresh_config();
        if refresh != self.client.refresh_config() {
            info!(
                "Auto-refresh {} every {}s",
                if refresh.enabled { "on" } else { "off" },
                refresh.interval.as_secs()
            );
        }
        self.client.configure(refresh);
    }

    /// Rebuild markers from the latest snapshot.
    pub fn render(&mut self) -> Result<RenderPlan, IconError> {
        let snapshot = self.client.snapshot();
        let options = RenderOptions::from(&self.preferences.current());
        self.radar
            .reconcile(&snapshot, &self.favorites.icao_set(), &options)
    }

    /// Select an aircraft on the map.
    pub fn select(&mut self, icao24: &str) -> Option<Focus> {
        let dark_theme = self.preferences.current().dark_theme;
        self.radar
            .select(icao24, &self.favorites.icao_set(), dark_theme)
    }

    /// The map was tapped or dragged.
    pub fn clear_on_map_interaction(&mut self) {
        let dark_theme = self.preferences.current().dark_theme;
        self.radar
            .clear_on_map_interaction(&self.favorites.icao_set(), dark_theme);
    }

    /// Fetch now, alongside the timer.
    pub fn refresh_now(&self) -> JoinHandle<FetchReport> {
        self.client.refresh_now()
    }

    /// Favorite an aircraft, using its live state vector when it is in view.
    pub async fn add_favorite(&self, icao24: &str) -> Result<AddOutcome, StoreError> {
        let icao24 = normalize_icao(icao24);
        match self.client.get_by_icao(&icao24) {
            Some(state) => self.favorites.add(&state).await,
            None => self.favorites.add_new(NewFavorite::from_icao(&icao24)).await,
        }
    }

    #[must_use]
    pub fn favorite_views(&self) -> Vec<FavoriteView> {
        self.favorites.favorite_views(&self.client.snapshot())
    }

    #[must_use]
    pub fn radar(&self) -> &Radar {
        &self.radar
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn preferences(&self) -> &PreferencesService {
        &self.preferences
    }

    /// Reconcile on every snapshot, favorites or preferences change until `cancel` fires.
    ///
    /// `on_plan` receives each plan, starting with one for the current state.
    pub async fn run(&mut self, cancel: CancellationToken, mut on_plan: impl FnMut(&RenderPlan)) {
        let mut snapshots = self.client.subscribe();
        let mut favorites = self.favorites.subscribe();
        let mut preferences = self.preferences.subscribe();

        self.render_into(&mut on_plan);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let sequence = snapshots.borrow_and_update().sequence;
                    debug!("Snapshot #{} received", sequence);
                }
                changed = favorites.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    favorites.borrow_and_update();
                }
                changed = preferences.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    preferences.borrow_and_update();
                    self.apply_preferences();
                }
            }

            self.render_into(&mut on_plan);
        }

        info!("Radar session stopped");
        self.client.shutdown();
    }

    fn render_into(&mut self, on_plan: &mut impl FnMut(&RenderPlan)) {
        match self.render() {
            Ok(plan) => on_plan(&plan),
            Err(e) => warn!("Failed to render markers: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryStore, UserPreferences};
    use crate::favorites::tests::state;
    use crate::favorites::FavoritesStore;
    use crate::metadata::Enrichment;
    use crate::radar::{IconStyle, SelectionStatus};
    use opensky_client::{
        OpenSkyClient, OpenSkyConfig, RefreshConfig, StateVector, StatesResponse,
    };
    use std::sync::Arc;
    use std::time::Duration;

    struct NoEnrichment;

    impl Enricher for NoEnrichment {
        async fn enrich(&self, _icao24: &str, _callsign: Option<&str>) -> Enrichment {
            Enrichment::default()
        }
    }

    async fn session() -> RadarSession<NoEnrichment> {
        let preferences = PreferencesService::new(MemoryStore::with(UserPreferences {
            auto_refresh_enabled: false,
            ..Default::default()
        }));
        let favorites =
            FavoritesService::new(FavoritesStore::open_in_memory().unwrap(), NoEnrichment)
                .await
                .unwrap();
        let source = OpenSkyClient::new(OpenSkyConfig {
            states_url: "http://127.0.0.1:9/api/states/all".to_string(),
            ..Default::default()
        })
        .unwrap();
        let client = Client::with_source(source, RefreshConfig::default());
        RadarSession::new(preferences, favorites, client)
    }

    fn publish(session: &RadarSession<NoEnrichment>, states: Vec<StateVector>) {
        let live = session.client().live();
        live.publish(live.begin_request(), StatesResponse { time: None, states });
    }

    #[tokio::test]
    async fn test_preferences_drive_the_scheduler() {
        let mut session = session().await;
        assert!(!session.client().refresh_config().enabled);

        session
            .preferences()
            .update(|p| {
                p.auto_refresh_enabled = true;
                p.refresh_interval_seconds = 30;
            })
            .unwrap();
        session.apply_preferences();

        let refresh = session.client().refresh_config();
        assert!(refresh.enabled);
        assert_eq!(refresh.interval, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_favorite_added_from_live_state_is_styled() {
        let mut session = session().await;
        publish(&session, vec![state("abc123", Some("AF123")), state("def456", None)]);

        let outcome = session.add_favorite("ABC123").await.unwrap();
        assert_eq!(outcome.record().name.as_deref(), Some("AF123"));
        assert_eq!(outcome.record().origin_country.as_deref(), Some("France"));

        let plan = session.render().unwrap();
        assert_eq!(plan.marker("abc123").unwrap().style, IconStyle::Favorite);
        assert_eq!(plan.marker("def456").unwrap().style, IconStyle::DefaultLight);

        let views = session.favorite_views();
        assert_eq!(views.len(), 1);
        assert!(views[0].is_live());
    }

    #[tokio::test]
    async fn test_favorite_of_absent_aircraft_is_not_live() {
        let session = session().await;
        let outcome = session.add_favorite("4b1816").await.unwrap();
        assert_eq!(outcome.record().name, None);
        assert!(!session.favorite_views()[0].is_live());
    }

    #[tokio::test]
    async fn test_hide_grounded_preference_applies_on_next_render() {
        let mut session = session().await;
        let mut grounded = state("def456", None);
        grounded.on_ground = true;
        publish(&session, vec![state("abc123", None), grounded]);

        assert_eq!(session.render().unwrap().markers.len(), 2);
        session
            .preferences()
            .update(|p| p.hide_grounded_aircraft = true)
            .unwrap();
        assert_eq!(session.render().unwrap().markers.len(), 1);
    }

    #[tokio::test]
    async fn test_selection_and_map_interaction() {
        let mut session = session().await;
        publish(&session, vec![state("abc123", None)]);
        session.render().unwrap();

        let focus = session.select("abc123").unwrap();
        assert_eq!(focus.latitude, 48.85);
        assert!(session.radar().markers()[0].popup_open);

        session.clear_on_map_interaction();
        assert!(!session.radar().markers()[0].popup_open);
        assert_eq!(session.render().unwrap().selection, SelectionStatus::None);
    }

    #[tokio::test]
    async fn test_run_reconciles_each_snapshot_until_cancelled() {
        let mut session = session().await;
        let live = Arc::clone(session.client().live());
        let cancel = CancellationToken::new();

        let publisher = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                live.publish(
                    live.begin_request(),
                    StatesResponse {
                        time: None,
                        states: vec![state("abc123", None)],
                    },
                );
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            }
        });

        let mut counts = Vec::new();
        session
            .run(cancel, |plan| counts.push((plan.sequence, plan.markers.len())))
            .await;
        publisher.await.unwrap();

        assert_eq!(counts.first(), Some(&(0, 0)));
        assert_eq!(counts.last(), Some(&(1, 1)));
    }
}
