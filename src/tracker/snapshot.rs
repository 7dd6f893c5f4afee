use std::{collections::BTreeMap, time::Duration};

use serde::Serialize;

use crate::{platform::Platform, utils::format::format_duration};

use super::session::Phase;

/// What the live display shows: the platform label and the session time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub label: String,
    pub elapsed: Duration,
}

impl Snapshot {
    pub fn new(platform: Platform, elapsed: Duration) -> Self {
        Self {
            label: platform.name().to_owned(),
            elapsed,
        }
    }

    pub fn formatted(&self) -> String {
        format!("{} {}", self.label, format_duration(self.elapsed))
    }
}

/// Live display of the running session, such as a status line or a lock-screen widget.
///
/// `begin` is called when a session starts, `update` at most once per activity tick and on
/// pause/resume, `end` once with the final session time.
#[cfg_attr(test, mockall::automock)]
pub trait LiveActivity: Send + 'static {
    fn begin(&mut self, snapshot: &Snapshot);

    fn update(&mut self, snapshot: &Snapshot);

    fn end(&mut self, snapshot: &Snapshot);
}

/// Live activity that shows nothing.
pub struct NoLiveActivity;

impl LiveActivity for NoLiveActivity {
    fn begin(&mut self, _: &Snapshot) {}

    fn update(&mut self, _: &Snapshot) {}

    fn end(&mut self, _: &Snapshot) {}
}

/// Read model published to the UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerView {
    pub active_platform: Option<Platform>,
    pub phase: Phase,
    pub current_elapsed: Duration,
    /// Totals for today, including the running interval of the active platform.
    pub daily_totals: BTreeMap<Platform, Duration>,
    pub redirect_problem: Option<String>,
}

impl TrackerView {
    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn daily_total(&self, platform: Platform) -> Duration {
        self.daily_totals
            .get(&platform)
            .copied()
            .unwrap_or_default()
    }
}
