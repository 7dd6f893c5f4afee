use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};

use super::{StoreValue, UsageStore};

/// Store kept in memory only. Clones share the same map, which lets tests inspect what the tracker
/// wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<BTreeMap<String, StoreValue>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: impl IntoIterator<Item = (String, StoreValue)>) -> Self {
        Self {
            values: Arc::new(Mutex::new(values.into_iter().collect())),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, StoreValue> {
        self.values
            .lock()
            .map(|values| values.clone())
            .unwrap_or_default()
    }
}

impl UsageStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoreValue>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow!("Memory store lock is poisoned"))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&mut self, key: &str, value: StoreValue) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("Memory store lock is poisoned"))?;
        values.insert(key.to_owned(), value);
        Ok(())
    }
}
