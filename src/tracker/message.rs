use tokio::sync::{mpsc, oneshot};

use crate::{opener::OpenOutcome, platform::Platform};

use super::snapshot::TrackerView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    /// Fast cadence refreshing the published view.
    Display,
    /// Slow cadence pushing snapshots to the live activity.
    Activity,
}

/// Everything that reaches the tracker goes through its queue as one of these, so all mutations
/// happen one after another.
#[derive(Debug)]
pub enum TrackerMessage {
    Start(Platform),
    Pause,
    Resume,
    End,
    /// The user came back to the application from the external platform.
    Foreground,
    ClearRedirectProblem,
    Query(oneshot::Sender<TrackerView>),
    Tick { kind: TickKind, ticker: u64 },
    OpenFinished {
        platform: Platform,
        outcome: OpenOutcome,
    },
    DailyBoundary { ticker: u64 },
    Shutdown,
}

impl TrackerMessage {
    /// Messages coming from the user, as opposed to timers and background work.
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            TrackerMessage::Start(_)
                | TrackerMessage::Pause
                | TrackerMessage::Resume
                | TrackerMessage::End
                | TrackerMessage::Foreground
                | TrackerMessage::Query(_)
        )
    }
}

pub type TrackerQueue = mpsc::UnboundedSender<TrackerMessage>;
