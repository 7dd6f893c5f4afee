use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::platform::Platform;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Paused,
}

/// The stopwatch for the platform currently in use.
///
/// Invariants kept by every method:
///  - `Running` has a start instant, `Idle` and `Paused` don't.
///  - `Idle` has no platform and an empty buffer.
#[derive(Debug, Clone, Default)]
pub struct Session {
    platform: Option<Platform>,
    phase: Phase,
    /// Beginning of the current running interval.
    started: Option<Instant>,
    /// Time banked from earlier running intervals of this session.
    buffered: Duration,
}

impl Session {
    pub fn platform(&self) -> Option<Platform> {
        self.platform
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn buffered(&self) -> Duration {
        self.buffered
    }

    /// Starts a fresh session. Any previous session must already be ended.
    pub fn begin(&mut self, platform: Platform, now: Instant) {
        *self = Self {
            platform: Some(platform),
            phase: Phase::Running,
            started: Some(now),
            buffered: Duration::ZERO,
        };
    }

    /// Length of the running interval so far, zero when not running.
    pub fn running_delta(&self, now: Instant) -> Duration {
        match (self.phase, self.started) {
            (Phase::Running, Some(started)) => now.saturating_duration_since(started),
            _ => Duration::ZERO,
        }
    }

    pub fn current_elapsed(&self, now: Instant) -> Duration {
        self.buffered.saturating_add(self.running_delta(now))
    }

    /// Closes the running interval. Returns the platform and the length of the closed interval,
    /// or `None` when the session wasn't running.
    pub fn pause(&mut self, now: Instant) -> Option<(Platform, Duration)> {
        let delta = self.bank(now)?;
        self.phase = Phase::Paused;
        self.started = None;
        self.platform.map(|platform| (platform, delta))
    }

    /// Moves the running interval into the buffer and starts a new interval at `now`. The phase
    /// doesn't change. Returns the banked time, `None` when not running.
    pub fn bank(&mut self, now: Instant) -> Option<Duration> {
        if self.phase != Phase::Running {
            return None;
        }
        let delta = self.running_delta(now);
        self.buffered = self.buffered.saturating_add(delta);
        self.started = Some(now);
        Some(delta)
    }

    pub fn resume(&mut self, now: Instant) -> Option<Platform> {
        if self.phase != Phase::Paused {
            return None;
        }
        self.phase = Phase::Running;
        self.started = Some(now);
        self.platform
    }

    /// Ends a paused session. A running session has to be paused first so that its time is
    /// accounted.
    pub fn end(&mut self) -> Option<Platform> {
        if self.phase != Phase::Paused {
            return None;
        }
        let platform = self.platform;
        *self = Self::default();
        platform
    }
}
