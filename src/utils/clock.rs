use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use tokio::time::Instant;

/// Represents an entity responsible for providing time across application. Wall-clock reads are
/// used for calendar decisions, [Instant] reads for measuring elapsed time. Tests substitute their
/// own clock.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Utc>;

    fn instant(&self) -> Instant;

    async fn sleep(&self, duration: Duration);

    async fn sleep_until(&self, instant: Instant);

    /// Wall clock in the user's timezone. Day boundaries are local midnights.
    fn local_time(&self) -> DateTime<Local> {
        self.time().with_timezone(&Local)
    }

    /// Time passed since `start`. Saturates to zero instead of going negative.
    fn elapsed_since(&self, start: Instant) -> Duration {
        self.instant().saturating_duration_since(start)
    }
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}
