//! Keyed storage interface.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

/// Minimal keyed store of JSON values.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Value under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Remove `key`. Returns whether it was present.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Whether `key` is present.
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Typed access on top of any [`Storage`].
#[async_trait]
pub trait StorageExt: Storage {
    /// Deserialize the value under `key`.
    async fn get_as<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Serialize `value` under `key`.
    async fn set_as<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.set(key, value).await
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}
