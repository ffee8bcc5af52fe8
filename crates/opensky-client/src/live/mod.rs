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

//! Observable live-state container.
//!
//! Holds the last accepted snapshot and notifies subscribers through a
//! `watch` channel. Every fetch takes a [`RequestTicket`] before it starts;
//! a result is only accepted if its ticket is newer than the one behind the
//! current snapshot, so a slow response can never overwrite a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::watch;

use crate::protocol::{StateVector, StatesResponse};

/// Monotonic request sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestTicket(u64);

impl RequestTicket {
    #[must_use]
    pub fn sequence(self) -> u64 {
        self.0
    }
}

/// The full batch of state vectors produced by one fetch.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Server time reported by the API.
    pub time: Option<i64>,
    pub states: Vec<StateVector>,
    /// Ticket of the request that produced this snapshot. 0 before the first fetch.
    pub sequence: u64,
    pub fetched_at: DateTime<Utc>,
    /// The fetch failed and this snapshot is the empty fallback.
    pub failed: bool,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            time: None,
            states: Vec::new(),
            sequence: 0,
            fetched_at: Utc::now(),
            failed: false,
        }
    }

    /// Look up an aircraft by ICAO address, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn get_by_icao(&self, icao24: &str) -> Option<&StateVector> {
        let icao24 = icao24.trim();
        self.states
            .iter()
            .find(|s| s.icao24.trim().eq_ignore_ascii_case(icao24))
    }

    #[must_use]
    pub fn contains(&self, icao24: &str) -> bool {
        self.get_by_icao(icao24).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Shared container for the latest snapshot.
pub struct LiveState {
    last_ticket: AtomicU64,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
}

impl std::fmt::Debug for LiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.snapshot_tx.borrow();
        f.debug_struct("LiveState")
            .field("last_ticket", &self.last_ticket.load(Ordering::Relaxed))
            .field("sequence", &current.sequence)
            .field("aircraft_count", &current.len())
            .finish()
    }
}

impl Default for LiveState {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveState {
    #[must_use]
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::empty()));
        Self {
            last_ticket: AtomicU64::new(0),
            snapshot_tx,
        }
    }

    /// Reserve the next request ticket. Call before the request is sent.
    pub fn begin_request(&self) -> RequestTicket {
        RequestTicket(self.last_ticket.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Publish a successful response. Returns `false` if a newer ticket already landed.
    pub fn publish(&self, ticket: RequestTicket, response: StatesResponse) -> bool {
        self.replace(ticket, response.time, response.states, false)
    }

    /// Publish the empty fallback for a failed fetch.
    pub fn publish_failure(&self, ticket: RequestTicket) -> bool {
        self.replace(ticket, None, Vec::new(), true)
    }

    fn replace(
        &self,
        ticket: RequestTicket,
        time: Option<i64>,
        states: Vec<StateVector>,
        failed: bool,
    ) -> bool {
        self.snapshot_tx.send_if_modified(|current| {
            if ticket.0 <= current.sequence {
                debug!(
                    "Dropping stale response #{} (current snapshot is #{})",
                    ticket.0, current.sequence
                );
                return false;
            }

            *current = Arc::new(Snapshot {
                time,
                states,
                sequence: ticket.0,
                fetched_at: Utc::now(),
                failed,
            });
            true
        })
    }

    /// The latest accepted snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot_tx.borrow())
    }

    /// Subscribe to snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PositionSource;

    fn state(icao24: &str) -> StateVector {
        StateVector {
            icao24: icao24.to_string(),
            callsign: None,
            origin_country: "France".to_string(),
            time_position: None,
            last_contact: 0,
            longitude: Some(2.35),
            latitude: Some(48.85),
            baro_altitude: None,
            on_ground: false,
            velocity: None,
            true_track: None,
            vertical_rate: None,
            sensors: None,
            geo_altitude: None,
            squawk: None,
            spi: false,
            position_source: PositionSource::AdsB,
            category: None,
        }
    }

    fn response(ids: &[&str]) -> StatesResponse {
        StatesResponse {
            time: Some(1),
            states: ids.iter().map(|id| state(id)).collect(),
        }
    }

    #[test]
    fn test_get_by_icao_ignores_case() {
        let live = LiveState::new();
        live.publish(live.begin_request(), response(&["abc123", "3C6444"]));
        let snapshot = live.current();

        assert_eq!(snapshot.get_by_icao("ABC123").map(|s| s.icao24.as_str()), Some("abc123"));
        assert!(snapshot.contains(" 3c6444 "));
        assert!(!snapshot.contains("def456"));
    }

    #[test]
    fn test_tickets_are_monotonic() {
        let live = LiveState::new();
        let first = live.begin_request();
        let second = live.begin_request();
        assert!(second > first);
        assert_eq!(first.sequence(), 1);
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let live = LiveState::new();
        assert!(live.current().is_empty());

        let ticket = live.begin_request();
        assert!(live.publish(ticket, response(&["abc123", "def456"])));

        let current = live.current();
        assert_eq!(current.len(), 2);
        assert_eq!(current.sequence, 1);
        assert!(current.contains("def456"));
        assert!(!current.failed);
    }

    #[test]
    fn test_stale_response_does_not_overwrite_newer() {
        let live = LiveState::new();
        let older = live.begin_request();
        let newer = live.begin_request();

        assert!(live.publish(newer, response(&["new"])));
        assert!(!live.publish(older, response(&["old"])));

        let current = live.current();
        assert!(current.contains("new"));
        assert!(!current.contains("old"));
    }

    #[test]
    fn test_failure_publishes_empty_snapshot() {
        let live = LiveState::new();
        live.publish(live.begin_request(), response(&["abc123"]));
        assert!(live.publish_failure(live.begin_request()));

        let current = live.current();
        assert!(current.is_empty());
        assert!(current.failed);
    }

    #[tokio::test]
    async fn test_subscribers_are_notified() {
        let live = LiveState::new();
        let mut rx = live.subscribe();

        live.publish(live.begin_request(), response(&["abc123"]));

        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().contains("abc123"));
    }
}
