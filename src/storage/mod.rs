//! Key-value persistence for the usage ledger.
//!  - Values are either numbers (seconds of usage) or strings (the reset marker date).
//!  - [json_store::JsonFileStore] keeps the whole map in one JSON file.
//!  - [memory::MemoryStore] is used for ephemeral runs and tests.

pub mod json_store;
pub mod keys;
pub mod memory;

use std::future::Future;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    Number(f64),
    Text(String),
}

impl StoreValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            StoreValue::Number(v) => Some(*v),
            StoreValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StoreValue::Text(v) => Some(v),
            StoreValue::Number(_) => None,
        }
    }
}

/// Interface for abstracting the persistent store. The tracker is its only writer.
pub trait UsageStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<StoreValue>>> + Send;

    fn set(&mut self, key: &str, value: StoreValue) -> impl Future<Output = Result<()>> + Send;
}

