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

//! Periodic snapshot refresh.
//!
//! The scheduler owns at most one timer task. When enabled the task waits
//! for the configured interval, fetches, publishes into the [`LiveState`],
//! and starts waiting again. Reconfiguring cancels the old timer before a
//! new one is spawned. Manual refreshes run as independent one-off tasks and
//! never move the timer's schedule.
//!
//! Cancellation only stops the wait. A fetch that is already in flight runs
//! to completion and publishes; the live state's request tickets decide
//! whether its result is still the newest.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::http::SnapshotSource;
use crate::live::{LiveState, RequestTicket};

/// Shortest interval the timer accepts.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Auto-refresh is off and nothing is being fetched.
    Disabled,
    /// Waiting for the next tick.
    Idle,
    /// At least one fetch is in flight.
    Fetching,
}

/// Auto-refresh settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshConfig {
    pub enabled: bool,
    pub interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(10),
        }
    }
}

/// What started a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Automatic,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => write!(f, "automatic"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Result of one fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchReport {
    pub ticket: RequestTicket,
    pub trigger: Trigger,
    /// Aircraft in the response (0 on failure).
    pub aircraft: usize,
    pub failed: bool,
    /// The result became the current snapshot.
    pub accepted: bool,
}

struct Shared<S> {
    source: S,
    live: Arc<LiveState>,
    state_tx: watch::Sender<SchedulerState>,
    in_flight: AtomicUsize,
    timer_enabled: AtomicBool,
    active_timers: AtomicUsize,
}

impl<S: SnapshotSource> Shared<S> {
    async fn fetch_once(&self, trigger: Trigger) -> FetchReport {
        let ticket = self.live.begin_request();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.update_state();

        debug!("Starting {} refresh #{}", trigger, ticket.sequence());

        let report = match self.source.fetch_snapshot().await {
            Ok(response) => {
                let aircraft = response.states.len();
                let accepted = self.live.publish(ticket, response);
                info!(
                    "{} refresh #{}: {} aircraft{}",
                    trigger,
                    ticket.sequence(),
                    aircraft,
                    if accepted { "" } else { " (superseded)" }
                );
                FetchReport {
                    ticket,
                    trigger,
                    aircraft,
                    failed: false,
                    accepted,
                }
            }
            Err(e) => {
                warn!("{} refresh #{} failed: {}", trigger, ticket.sequence(), e);
                FetchReport {
                    ticket,
                    trigger,
                    aircraft: 0,
                    failed: true,
                    accepted: self.live.publish_failure(ticket),
                }
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.update_state();

        report
    }

    fn update_state(&self) {
        let next = if self.in_flight.load(Ordering::SeqCst) > 0 {
            SchedulerState::Fetching
        } else if self.timer_enabled.load(Ordering::SeqCst) {
            SchedulerState::Idle
        } else {
            SchedulerState::Disabled
        };

        self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Decrements the active timer count when the timer task ends, however it ends.
struct TimerGuard<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Drop for TimerGuard<S> {
    fn drop(&mut self) {
        self.shared.active_timers.fetch_sub(1, Ordering::SeqCst);
    }
}

struct TimerHandle {
    cancel_token: CancellationToken,
    _task: JoinHandle<()>,
}

/// Timer-driven snapshot refresh.
pub struct RefreshScheduler<S> {
    shared: Arc<Shared<S>>,
    config: RefreshConfig,
    timer: Option<TimerHandle>,
}

impl<S> fmt::Debug for RefreshScheduler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("config", &self.config)
            .field("state", &*self.shared.state_tx.borrow())
            .field("timer_running", &self.timer.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: SnapshotSource + 'static> RefreshScheduler<S> {
    /// Create a scheduler in the disabled state.
    #[must_use]
    pub fn new(source: S, live: Arc<LiveState>) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Disabled);

        Self {
            shared: Arc::new(Shared {
                source,
                live,
                state_tx,
                in_flight: AtomicUsize::new(0),
                timer_enabled: AtomicBool::new(false),
                active_timers: AtomicUsize::new(0),
            }),
            config: RefreshConfig::default(),
            timer: None,
        }
    }

    /// Apply auto-refresh settings.
    ///
    /// Unchanged settings leave the running timer and its schedule alone.
    /// Otherwise the old timer is cancelled first and, if enabled, a new one
    /// starts a full interval from now.
    pub fn configure(&mut self, config: RefreshConfig) {
        let config = RefreshConfig {
            interval: config.interval.max(MIN_INTERVAL),
            ..config
        };

        if config == self.config && self.timer.is_some() == config.enabled {
            return;
        }

        self.config = config;
        self.stop_timer();

        if config.enabled {
            self.start_timer();
        }

        self.shared.update_state();
    }

    /// Turn auto-refresh on or off, keeping the interval.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.configure(RefreshConfig {
            enabled,
            ..self.config
        });
    }

    /// Change the interval, keeping the enabled flag.
    pub fn set_interval(&mut self, interval: Duration) {
        self.configure(RefreshConfig {
            interval,
            ..self.config
        });
    }

    /// Run a one-off fetch now, concurrently with the timer.
    pub fn refresh_now(&self) -> JoinHandle<FetchReport> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.fetch_once(Trigger::Manual).await })
    }

    /// Stop the timer. In-flight fetches still complete.
    pub fn shutdown(&mut self) {
        self.stop_timer();
        self.shared.update_state();
    }

    #[must_use]
    pub fn config(&self) -> RefreshConfig {
        self.config
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.shared.state_tx.borrow()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.shared.state_tx.subscribe()
    }

    /// Timer tasks that have been spawned and not yet exited.
    #[must_use]
    pub fn active_timers(&self) -> usize {
        self.shared.active_timers.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn live(&self) -> &Arc<LiveState> {
        &self.shared.live
    }

    fn start_timer(&mut self) {
        let cancel_token = CancellationToken::new();
        let interval = self.config.interval;

        self.shared.timer_enabled.store(true, Ordering::SeqCst);
        self.shared.active_timers.fetch_add(1, Ordering::SeqCst);

        let guard = TimerGuard {
            shared: Arc::clone(&self.shared),
        };
        let task_cancel = cancel_token.clone();
        let task = tokio::spawn(async move {
            timer_loop(guard, interval, task_cancel).await;
        });

        self.timer = Some(TimerHandle {
            cancel_token,
            _task: task,
        });
    }

    fn stop_timer(&mut self) {
        self.shared.timer_enabled.store(false, Ordering::SeqCst);
        if let Some(timer) = self.timer.take() {
            timer.cancel_token.cancel();
        }
    }
}

impl<S> Drop for RefreshScheduler<S> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel_token.cancel();
        }
    }
}

async fn timer_loop<S: SnapshotSource>(
    guard: TimerGuard<S>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!("Auto-refresh started (every {}s)", interval.as_secs());

    loop {
        if cancel_token.is_cancelled() {
            break;
        }

        tokio::select! {
            () = sleep(interval) => {}
            () = cancel_token.cancelled() => break,
        }

        guard.shared.fetch_once(Trigger::Automatic).await;
    }

    info!("Auto-refresh timer stopped");
}
