//! Heartbeat watchdog
//!
//! A heartbeat expects a strictly increasing ping counter from its source.
//! A one-second clock counts the time since the last fresh ping; every
//! `time_limit` seconds without one costs a retry, and exceeding
//! `retry_limit` retries times the heartbeat out. A timed-out heartbeat
//! ignores pings until it is explicitly reset.
//!
//! [`HeartbeatState`] is the pure state machine. [`Heartbeat`] drives it with
//! a tokio interval task and publishes [`HeartbeatEvent`]s.

use crate::config::HeartbeatConfig;
use crate::events::{EventBus, HeartbeatEvent};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Clock resolution
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Lifecycle phase of a heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeartbeatStatus {
    /// Clock stopped (never started, stopped, or reset)
    Idle,
    /// Clock running
    Running,
    /// Retry budget exhausted; terminal until reset
    TimedOut,
}

/// Result of advancing the clock by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Clock is not running; nothing happened
    Stopped,
    /// Normal tick carrying the elapsed seconds
    Tick { elapsed: u32 },
    /// This tick exhausted the retry budget
    TimedOut { elapsed: u32 },
}

/// Heartbeat counters and phase, without any clock attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeartbeatState {
    retry_limit: u32,
    time_limit: u32,
    retry_attempt: u32,
    elapsed: u32,
    last_ping: i64,
    status: HeartbeatStatus,
}

impl HeartbeatState {
    pub fn new(retry_limit: u32, time_limit: u32) -> Self {
        Self {
            retry_limit,
            time_limit,
            retry_attempt: 0,
            elapsed: 0,
            last_ping: -1,
            status: HeartbeatStatus::Idle,
        }
    }

    /// Start the clock. Returns true if it was not already running.
    ///
    /// A timed-out heartbeat stays timed out.
    pub fn start(&mut self) -> bool {
        match self.status {
            HeartbeatStatus::Idle => {
                self.status = HeartbeatStatus::Running;
                true
            }
            HeartbeatStatus::Running | HeartbeatStatus::TimedOut => false,
        }
    }

    /// Stop the clock, keeping the counters. Returns true if it was running.
    pub fn stop(&mut self) -> bool {
        if self.status == HeartbeatStatus::Running {
            self.status = HeartbeatStatus::Idle;
            true
        } else {
            false
        }
    }

    /// Advance the clock by one second
    pub fn tick(&mut self) -> TickOutcome {
        if self.status != HeartbeatStatus::Running {
            return TickOutcome::Stopped;
        }

        self.elapsed += 1;
        let elapsed = self.elapsed;

        if self.elapsed >= self.time_limit {
            self.retry_attempt += 1;
            self.elapsed = 0;
        }

        if self.retry_attempt > self.retry_limit {
            self.status = HeartbeatStatus::TimedOut;
            return TickOutcome::TimedOut { elapsed };
        }

        TickOutcome::Tick { elapsed }
    }

    /// Feed a ping. Returns true if it was fresh and restarted the clock.
    ///
    /// Pings equal to or below the last accepted one are stale and ignored.
    pub fn process(&mut self, ping: i64) -> bool {
        if self.status == HeartbeatStatus::TimedOut || ping <= self.last_ping {
            return false;
        }

        self.last_ping = ping;
        self.elapsed = 0;
        self.status = HeartbeatStatus::Running;
        true
    }

    /// Clear all counters and stop the clock
    pub fn reset(&mut self) {
        self.retry_attempt = 0;
        self.elapsed = 0;
        self.last_ping = -1;
        self.status = HeartbeatStatus::Idle;
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    pub fn time_limit(&self) -> u32 {
        self.time_limit
    }

    pub fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }

    pub fn elapsed(&self) -> u32 {
        self.elapsed
    }

    pub fn last_ping(&self) -> i64 {
        self.last_ping
    }

    pub fn status(&self) -> HeartbeatStatus {
        self.status
    }

    pub fn is_timed_out(&self) -> bool {
        self.status == HeartbeatStatus::TimedOut
    }
}

/// Point-in-time view of a heartbeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeartbeatSnapshot {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub state: HeartbeatState,
}

/// A heartbeat with its own one-second clock task
///
/// Methods that start the clock spawn onto the current tokio runtime.
#[derive(Debug)]
pub struct Heartbeat {
    id: String,
    name: String,
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<HeartbeatState>,
    clock: Mutex<Option<JoinHandle<()>>>,
    events: EventBus<HeartbeatEvent>,
}

impl Heartbeat {
    pub fn new(id: impl Into<String>, config: &HeartbeatConfig, events: EventBus<HeartbeatEvent>) -> Self {
        Self {
            id: id.into(),
            name: config.name.clone(),
            inner: Arc::new(Inner {
                state: Mutex::new(HeartbeatState::new(config.retry_limit, config.time_limit)),
                clock: Mutex::new(None),
                events,
            }),
        }
    }

    /// Start the clock; no-op if already running or timed out
    pub fn start(&self) {
        if self.inner.state.lock().start() {
            log::debug!("Heartbeat '{}' started", self.id);
            self.spawn_clock();
        }
    }

    /// Stop the clock, keeping the counters
    pub fn stop(&self) {
        self.inner.state.lock().stop();
        self.abort_clock();
    }

    /// Feed a ping value; a fresh ping restarts the clock from zero
    pub fn process(&self, ping: i64) -> bool {
        let accepted = self.inner.state.lock().process(ping);
        if accepted {
            log::trace!("Heartbeat '{}' ping {}", self.id, ping);
            self.spawn_clock();
        } else {
            log::debug!("Heartbeat '{}' ignored ping {}", self.id, ping);
        }
        accepted
    }

    /// Clear all counters and stop the clock
    pub fn reset(&self) {
        self.inner.state.lock().reset();
        self.abort_clock();
        log::debug!("Heartbeat '{}' reset", self.id);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> HeartbeatState {
        self.inner.state.lock().clone()
    }

    pub fn snapshot(&self) -> HeartbeatSnapshot {
        HeartbeatSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            state: self.state(),
        }
    }

    /// Replace any running clock task with a fresh one counting from zero
    fn spawn_clock(&self) {
        let mut clock = self.inner.clock.lock();
        if let Some(previous) = clock.take() {
            previous.abort();
        }
        *clock = Some(tokio::spawn(run_clock(Arc::clone(&self.inner), self.id.clone())));
    }

    fn abort_clock(&self) {
        if let Some(handle) = self.inner.clock.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.abort_clock();
    }
}

async fn run_clock(inner: Arc<Inner>, id: String) {
    let mut interval = time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let outcome = inner.state.lock().tick();
        match outcome {
            TickOutcome::Stopped => break,
            TickOutcome::Tick { elapsed } => {
                inner.events.emit(HeartbeatEvent::Tick {
                    heartbeat: id.clone(),
                    elapsed,
                });
            }
            TickOutcome::TimedOut { elapsed } => {
                inner.events.emit(HeartbeatEvent::Tick {
                    heartbeat: id.clone(),
                    elapsed,
                });
                log::error!("Heartbeat '{}' timed out", id);
                inner.events.emit(HeartbeatEvent::Timeout { heartbeat: id });
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_n(state: &mut HeartbeatState, n: usize) -> Vec<TickOutcome> {
        (0..n).map(|_| state.tick()).collect()
    }

    #[test]
    fn test_ticks_ignored_until_started() {
        let mut state = HeartbeatState::new(2, 5);
        assert_eq!(state.tick(), TickOutcome::Stopped);
        assert_eq!(state.elapsed(), 0);
    }

    #[test]
    fn test_time_limit_counts_a_retry() {
        let mut state = HeartbeatState::new(2, 5);
        state.start();

        let outcomes = tick_n(&mut state, 5);
        assert_eq!(outcomes[4], TickOutcome::Tick { elapsed: 5 });
        assert_eq!(state.retry_attempt(), 1);
        assert_eq!(state.elapsed(), 0);
    }

    #[test]
    fn test_times_out_after_retry_budget() {
        let mut state = HeartbeatState::new(2, 5);
        state.start();

        let outcomes = tick_n(&mut state, 15);
        let timeouts = outcomes
            .iter()
            .filter(|o| matches!(o, TickOutcome::TimedOut { .. }))
            .count();
        assert_eq!(timeouts, 1);
        assert_eq!(outcomes[14], TickOutcome::TimedOut { elapsed: 5 });
        assert_eq!(state.retry_attempt(), 3);
        assert!(state.is_timed_out());

        assert_eq!(state.tick(), TickOutcome::Stopped);
    }

    #[test]
    fn test_stale_ping_is_ignored() {
        let mut state = HeartbeatState::new(2, 5);
        assert!(state.process(5));
        tick_n(&mut state, 3);

        assert!(!state.process(3));
        assert!(!state.process(5));
        assert_eq!(state.elapsed(), 3);
        assert_eq!(state.last_ping(), 5);

        assert!(state.process(6));
        assert_eq!(state.elapsed(), 0);
    }

    #[test]
    fn test_ping_keeps_retry_count() {
        let mut state = HeartbeatState::new(2, 2);
        state.start();
        tick_n(&mut state, 2);
        assert_eq!(state.retry_attempt(), 1);

        assert!(state.process(0));
        assert_eq!(state.retry_attempt(), 1);
    }

    #[test]
    fn test_timed_out_ignores_pings_until_reset() {
        let mut state = HeartbeatState::new(0, 1);
        state.start();
        assert_eq!(state.tick(), TickOutcome::TimedOut { elapsed: 1 });

        assert!(!state.process(100));
        assert!(!state.start());

        state.reset();
        assert_eq!(state.status(), HeartbeatStatus::Idle);
        assert_eq!(state.last_ping(), -1);
        assert_eq!(state.retry_attempt(), 0);
        assert!(state.process(0));
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let mut state = HeartbeatState::new(1, 1);
        assert!(state.start());
        assert!(!state.start());
        assert!(state.stop());
        assert!(!state.stop());
    }
}
