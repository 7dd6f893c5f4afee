use std::{collections::BTreeMap, time::Duration};

use tracing::warn;

use crate::{
    platform::Platform,
    storage::{keys::daily_usage_key, StoreValue, UsageStore},
};

/// Time used on each platform during the current day. Holds exactly one entry per platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    totals: BTreeMap<Platform, Duration>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            totals: Platform::ALL
                .into_iter()
                .map(|platform| (platform, Duration::ZERO))
                .collect(),
        }
    }
}

impl Ledger {
    /// Reads every entry from the store. Missing or unreadable entries count as zero.
    pub async fn load(store: &impl UsageStore) -> Self {
        let mut ledger = Ledger::default();
        for platform in Platform::ALL {
            let key = daily_usage_key(platform);
            let seconds = match store.get(&key).await {
                Ok(Some(value)) => value.as_number().unwrap_or_else(|| {
                    warn!("Entry {key} is not a number: {value:?}");
                    0.
                }),
                Ok(None) => 0.,
                Err(e) => {
                    warn!("Failed to read {key}: {e:?}");
                    0.
                }
            };
            ledger.set(platform, seconds_to_duration(seconds));
        }
        ledger
    }

    pub fn get(&self, platform: Platform) -> Duration {
        self.totals.get(&platform).copied().unwrap_or_default()
    }

    pub fn add(&mut self, platform: Platform, delta: Duration) {
        let total = self.get(platform).saturating_add(delta);
        self.set(platform, total);
    }

    fn set(&mut self, platform: Platform, value: Duration) {
        self.totals.insert(platform, value);
    }

    pub fn clear(&mut self) {
        for total in self.totals.values_mut() {
            *total = Duration::ZERO;
        }
    }

    pub fn totals(&self) -> &BTreeMap<Platform, Duration> {
        &self.totals
    }

    /// Writes one entry. Failures are only logged, the in-memory value stays authoritative.
    pub async fn persist(&self, store: &mut impl UsageStore, platform: Platform) {
        let key = daily_usage_key(platform);
        let value = StoreValue::Number(self.get(platform).as_secs_f64());
        if let Err(e) = store.set(&key, value).await {
            warn!("Failed to persist {key}: {e:?}");
        }
    }

    pub async fn persist_all(&self, store: &mut impl UsageStore) {
        for platform in Platform::ALL {
            self.persist(store, platform).await;
        }
    }
}

/// No single day holds more than this, even with a clock change.
const MAX_DAILY_USAGE: Duration = Duration::from_secs(25 * 60 * 60);

/// Negative, NaN or implausibly large values found in the store are treated as zero.
fn seconds_to_duration(seconds: f64) -> Duration {
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) if duration <= MAX_DAILY_USAGE => duration,
        _ => {
            warn!("Discarding invalid usage value {seconds}");
            Duration::ZERO
        }
    }
}
