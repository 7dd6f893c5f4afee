use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    opener::PlatformOpener,
    platform::Platform,
    storage::UsageStore,
    utils::clock::Clock,
};

use super::{
    machine::{SessionTracker, TrackerConfig},
    message::{TrackerMessage, TrackerQueue},
    snapshot::{LiveActivity, TrackerView},
};

/// The single control context. Drains the queue and hands every message to the tracker, one at a
/// time.
pub struct TrackerService<S> {
    tracker: SessionTracker<S>,
    receiver: mpsc::UnboundedReceiver<TrackerMessage>,
    shutdown: CancellationToken,
}

impl<S: UsageStore> TrackerService<S> {
    pub fn new(
        tracker: SessionTracker<S>,
        receiver: mpsc::UnboundedReceiver<TrackerMessage>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            tracker,
            receiver,
            shutdown,
        }
    }

    /// Executes the tracker event loop until shutdown is requested.
    pub async fn run(mut self) -> Result<()> {
        self.tracker.startup().await;
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                message = self.receiver.recv() => match message {
                    Some(TrackerMessage::Shutdown) | None => break,
                    Some(message) => self.tracker.handle(message).await,
                }
            }
        }

        self.tracker.shutdown().await;
        self.receiver.close();
        Ok(())
    }
}

/// Cheap, cloneable access to a running tracker. Commands are queued and return immediately.
#[derive(Clone)]
pub struct TrackerHandle {
    queue: TrackerQueue,
    view: watch::Receiver<TrackerView>,
}

impl TrackerHandle {
    fn send(&self, message: TrackerMessage) -> Result<()> {
        self.queue
            .send(message)
            .map_err(|_| anyhow!("Tracker is no longer running"))
    }

    pub fn start_session(&self, platform: Platform) -> Result<()> {
        self.send(TrackerMessage::Start(platform))
    }

    pub fn pause_session(&self) -> Result<()> {
        self.send(TrackerMessage::Pause)
    }

    pub fn resume_session(&self) -> Result<()> {
        self.send(TrackerMessage::Resume)
    }

    pub fn end_current_session(&self) -> Result<()> {
        self.send(TrackerMessage::End)
    }

    pub fn app_foregrounded(&self) -> Result<()> {
        self.send(TrackerMessage::Foreground)
    }

    /// Starts the session a launch shortcut points to.
    pub fn launch_shortcut(&self, shortcut: &str) -> Result<Platform> {
        let platform = Platform::from_shortcut(shortcut)
            .ok_or_else(|| anyhow!("Unknown shortcut {shortcut}"))?;
        self.start_session(platform)?;
        Ok(platform)
    }

    pub fn clear_redirect_problem(&self) -> Result<()> {
        self.send(TrackerMessage::ClearRedirectProblem)
    }

    /// View computed at the moment the tracker handles the request, after every command queued
    /// before it.
    pub async fn view(&self) -> Result<TrackerView> {
        let (reply, response) = oneshot::channel();
        self.send(TrackerMessage::Query(reply))?;
        response
            .await
            .map_err(|_| anyhow!("Tracker stopped before answering"))
    }

    /// Latest published view, refreshed on every change and display tick.
    pub fn subscribe(&self) -> watch::Receiver<TrackerView> {
        self.view.clone()
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(TrackerMessage::Shutdown)
    }
}

/// Loads the tracker from `store` and runs it on its own task.
pub async fn spawn_tracker<S: UsageStore>(
    store: S,
    clock: Arc<dyn Clock>,
    opener: Arc<dyn PlatformOpener>,
    live: Box<dyn LiveActivity>,
    config: TrackerConfig,
    shutdown: CancellationToken,
) -> (TrackerHandle, JoinHandle<Result<()>>) {
    let (queue, receiver) = mpsc::unbounded_channel();
    let tracker = SessionTracker::load(store, clock, opener, live, queue.clone(), config).await;
    let handle = TrackerHandle {
        queue,
        view: tracker.subscribe(),
    };

    let service = TrackerService::new(tracker, receiver, shutdown);
    let task = tokio::spawn(async move {
        info!("Tracker service started");
        let result = service.run().await;
        debug!("Tracker service finished");
        result
    });
    (handle, task)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    use crate::{
        opener::NoopOpener,
        platform::Platform,
        storage::{json_store::JsonFileStore, memory::MemoryStore, StoreValue, UsageStore},
        tracker::{
            machine::TrackerConfig,
            session::Phase,
            snapshot::{MockLiveActivity, NoLiveActivity},
        },
        utils::{clock::test_clock::TestClock, logging::TEST_LOGGING},
    };

    use super::spawn_tracker;

    fn clock() -> Arc<TestClock> {
        Arc::new(TestClock::starting_at(
            Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_are_serialized() -> Result<()> {
        *TEST_LOGGING;
        let store = MemoryStore::new();
        let (handle, task) = spawn_tracker(
            store.clone(),
            clock(),
            Arc::new(NoopOpener),
            Box::new(NoLiveActivity),
            TrackerConfig::default(),
            CancellationToken::new(),
        )
        .await;

        handle.start_session(Platform::Instagram)?;
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.pause_session()?;
        let view = handle.view().await?;
        assert_eq!(view.phase, Phase::Paused);
        assert_eq!(view.daily_total(Platform::Instagram), Duration::from_secs(5));

        handle.resume_session()?;
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.end_current_session()?;
        let view = handle.view().await?;
        assert_eq!(view.phase, Phase::Idle);
        assert_eq!(view.current_elapsed, Duration::ZERO);
        assert_eq!(view.daily_total(Platform::Instagram), Duration::from_secs(10));

        handle.shutdown()?;
        task.await??;
        assert_eq!(
            store.get("dailyUsage_instagram").await?,
            Some(StoreValue::Number(10.))
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_shortcut_and_foreground() -> Result<()> {
        *TEST_LOGGING;
        let (handle, task) = spawn_tracker(
            MemoryStore::new(),
            clock(),
            Arc::new(NoopOpener),
            Box::new(NoLiveActivity),
            TrackerConfig::default(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(
            handle.launch_shortcut("com.usagewatch.startYouTube")?,
            Platform::Youtube
        );
        assert!(handle.launch_shortcut("com.usagewatch.startFriendster").is_err());
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.app_foregrounded()?;

        let view = handle.view().await?;
        assert_eq!(view.active_platform, Some(Platform::Youtube));
        assert_eq!(view.phase, Phase::Paused);
        assert_eq!(view.current_elapsed, Duration::from_secs(2));

        handle.shutdown()?;
        task.await??;
        assert!(handle.view().await.is_err());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_ends_session_and_dismisses_activity() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let path = dir.path().join("usage.json");
        let store = JsonFileStore::open(path.clone()).await?;

        let mut live = MockLiveActivity::new();
        live.expect_begin().times(1).return_const(());
        live.expect_update().return_const(());
        live.expect_end()
            .withf(|snapshot| {
                snapshot.label == "X" && snapshot.elapsed == Duration::from_secs(3)
            })
            .times(1)
            .return_const(());

        let shutdown = CancellationToken::new();
        let (handle, task) = spawn_tracker(
            store,
            clock(),
            Arc::new(NoopOpener),
            Box::new(live),
            TrackerConfig::default(),
            shutdown.clone(),
        )
        .await;

        handle.start_session(Platform::Twitter)?;
        // File writes of the startup reset are done once the start is answered
        handle.view().await?;
        tokio::time::sleep(Duration::from_secs(3)).await;
        shutdown.cancel();
        task.await??;

        let reopened = JsonFileStore::open(path).await?;
        assert_eq!(
            reopened.get("dailyUsage_twitter").await?,
            Some(StoreValue::Number(3.))
        );
        Ok(())
    }
}
