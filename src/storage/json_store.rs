use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, warn};

use super::{StoreValue, UsageStore};

/// The main realization of [UsageStore]. All values live in a single JSON object on disk; reads
/// are served from memory and every write rewrites the file under an exclusive lock.
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, StoreValue>,
}

impl JsonFileStore {
    pub async fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create store directory {parent:?}"))?;
        }
        let values = Self::read_all(&path).await?;
        debug!("Opened store {path:?} with {} values", values.len());
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(path: &Path) -> Result<BTreeMap<String, StoreValue>> {
        async fn extract(path: &Path) -> std::result::Result<String, std::io::Error> {
            let mut file = File::open(path).await?;
            file.lock_shared()?;
            let mut contents = String::new();
            let result = file.read_to_string(&mut contents).await;
            file.unlock_async().await?;
            result?;
            Ok(contents)
        }

        match extract(path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(values) => Ok(values),
                Err(e) => {
                    // A write cut short by a shutdown. Starting empty only loses today's totals.
                    warn!("Store {path:?} is corrupted, starting empty: {e}");
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read store {path:?}")),
        }
    }

    async fn write_all(&self) -> Result<()> {
        let buffer = serde_json::to_vec_pretty(&self.values)?;

        let mut file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await?;

        // Truncation happens only after the lock is held
        file.lock_exclusive()?;
        let result = Self::write_with_file(&mut file, &buffer).await;
        file.unlock_async().await?;
        result
    }

    async fn write_with_file(file: &mut File, buffer: &[u8]) -> Result<()> {
        file.set_len(0).await?;
        file.rewind().await?;
        file.write_all(buffer).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

impl UsageStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<StoreValue>> {
        Ok(self.values.get(key).cloned())
    }

    async fn set(&mut self, key: &str, value: StoreValue) -> Result<()> {
        self.values.insert(key.to_owned(), value);
        self.write_all()
            .await
            .with_context(|| format!("Failed to persist {key} into {:?}", self.path))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use crate::storage::{StoreValue, UsageStore};

    use super::JsonFileStore;

    #[tokio::test]
    async fn test_values_survive_reopen() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("usage.json");

        let mut store = JsonFileStore::open(path.clone()).await?;
        assert_eq!(store.get("dailyUsage_instagram").await?, None);
        store
            .set("dailyUsage_instagram", StoreValue::Number(12.5))
            .await?;
        store
            .set("lastResetDate", StoreValue::Text("2018-07-04".into()))
            .await?;
        store
            .set("dailyUsage_instagram", StoreValue::Number(20.))
            .await?;

        let reopened = JsonFileStore::open(path).await?;
        assert_eq!(
            reopened.get("dailyUsage_instagram").await?,
            Some(StoreValue::Number(20.))
        );
        assert_eq!(
            reopened.get("lastResetDate").await?,
            Some(StoreValue::Text("2018-07-04".into()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_shorter_rewrite_leaves_valid_json() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("usage.json");

        let mut store = JsonFileStore::open(path.clone()).await?;
        store
            .set("lastResetDate", StoreValue::Text("a very long marker value".into()))
            .await?;
        store.set("lastResetDate", StoreValue::Text("x".into())).await?;

        let contents = std::fs::read_to_string(&path)?;
        let parsed: serde_json::Value = serde_json::from_str(&contents)?;
        assert_eq!(parsed["lastResetDate"], "x");
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_store_starts_empty() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("usage.json");
        std::fs::write(&path, "{\"dailyUsage_instagram\": 12")?;

        let mut store = JsonFileStore::open(path.clone()).await?;
        assert_eq!(store.get("dailyUsage_instagram").await?, None);

        store
            .set("dailyUsage_youtube", StoreValue::Number(3.))
            .await?;
        let reopened = JsonFileStore::open(path).await?;
        assert_eq!(
            reopened.get("dailyUsage_youtube").await?,
            Some(StoreValue::Number(3.))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_creates_missing_directories() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("state").join("usage.json");
        let mut store = JsonFileStore::open(path.clone()).await?;
        store.set("dailyUsage_twitter", StoreValue::Number(1.)).await?;
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
        Ok(())
    }
}
