//! Repeating and one-shot timers. Callbacks are expected to be cheap: in this crate they only post
//! a message onto the tracker queue, so the real work still happens on the single control context.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::clock::Clock;

static NEXT_TICKER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a running ticker. Cancelling is immediate and idempotent, dropping the handle cancels
/// as well.
#[derive(Debug)]
pub struct TickerHandle {
    id: u64,
    token: CancellationToken,
}

impl TickerHandle {
    fn new() -> Self {
        Self {
            id: NEXT_TICKER_ID.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Invokes `on_tick` every `interval`, with the ticker id, until the handle is cancelled or the
/// callback fails. Tick points are computed from the start so small delays don't accumulate.
/// Tick points missed while the runtime was stalled are skipped, never replayed.
pub fn start_ticker<F>(clock: Arc<dyn Clock>, interval: Duration, mut on_tick: F) -> TickerHandle
where
    F: FnMut(u64) -> Result<()> + Send + 'static,
{
    let handle = TickerHandle::new();
    let id = handle.id;
    let token = handle.token.clone();

    tokio::spawn(async move {
        let mut tick_point = clock.instant() + interval;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = clock.sleep_until(tick_point) => (),
            }
            if let Err(e) = on_tick(id) {
                debug!("Stopping ticker {id}: {e}");
                return;
            }

            tick_point += interval;
            let now = clock.instant();
            if tick_point <= now {
                debug!("Ticker {id} fell behind, skipping missed ticks");
                tick_point = now + interval;
            }
        }
    });

    handle
}

/// Invokes `on_fire` once after `delay` unless cancelled first.
pub fn schedule_once<F>(clock: Arc<dyn Clock>, delay: Duration, on_fire: F) -> TickerHandle
where
    F: FnOnce(u64) -> Result<()> + Send + 'static,
{
    let handle = TickerHandle::new();
    let id = handle.id;
    let token = handle.token.clone();

    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = token.cancelled() => (),
            _ = clock.sleep(delay) => {
                if let Err(e) = on_fire(id) {
                    debug!("Scheduled callback {id} failed: {e}");
                }
            },
        }
    });

    handle
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use anyhow::anyhow;
    use chrono::Utc;

    use crate::utils::clock::{test_clock::TestClock, DefaultClock};

    use super::{schedule_once, start_ticker};

    #[tokio::test(start_paused = true)]
    async fn test_ticker_fires_until_cancelled() {
        let clock = Arc::new(TestClock::starting_at(Utc::now()));
        let counter = Arc::new(AtomicUsize::new(0));
        let ticks = counter.clone();
        let handle = start_ticker(clock, Duration::from_millis(100), move |_| {
            ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        tokio::time::sleep(Duration::from_millis(550)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);

        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_stalled_runtime_does_not_replay_ticks() {
        let ticks = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = ticks.clone();
        let handle = start_ticker(Arc::new(DefaultClock), Duration::from_millis(100), move |_| {
            recorded.lock().unwrap().push(std::time::Instant::now());
            Ok(())
        });

        tokio::task::yield_now().await;
        // Blocks the only runtime thread across several tick points
        std::thread::sleep(Duration::from_millis(450));
        tokio::time::sleep(Duration::from_millis(350)).await;
        handle.cancel();

        let ticks = ticks.lock().unwrap().clone();
        assert!(ticks.len() >= 2, "got {} ticks", ticks.len());
        for pair in ticks.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_millis(50), "ticks {gap:?} apart");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_when_callback_fails() {
        let clock = Arc::new(TestClock::starting_at(Utc::now()));
        let counter = Arc::new(AtomicUsize::new(0));
        let ticks = counter.clone();
        let _handle = start_ticker(clock, Duration::from_secs(1), move |_| {
            if ticks.fetch_add(1, Ordering::SeqCst) == 1 {
                Err(anyhow!("receiver is gone"))
            } else {
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels() {
        let clock = Arc::new(TestClock::starting_at(Utc::now()));
        let counter = Arc::new(AtomicUsize::new(0));
        let ticks = counter.clone();
        let handle = start_ticker(clock, Duration::from_secs(1), move |_| {
            ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        drop(handle);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_once() {
        let clock = Arc::new(TestClock::starting_at(Utc::now()));
        let fired = Arc::new(AtomicUsize::new(0));

        let first = fired.clone();
        let _kept = schedule_once(clock.clone(), Duration::from_secs(3), move |_| {
            first.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let second = fired.clone();
        let cancelled = schedule_once(clock, Duration::from_secs(3), move |_| {
            second.fetch_add(10, Ordering::SeqCst);
            Ok(())
        });
        cancelled.cancel();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
