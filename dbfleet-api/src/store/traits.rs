//! Store trait definitions.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::error::{Result, StoreError};
use super::event::Event;
use crate::meta::{ObjectKey, Resource};

/// A record as the store sees it: a JSON document with a `meta` object.
pub type RawObject = serde_json::Value;

/// Untyped store backend.
///
/// Writes are optimistic: `update_raw` fails with
/// [`StoreError::VersionMismatch`] unless the incoming resource version equals
/// the stored one. `delete_raw` only marks a record with a deletion timestamp
/// while it still carries finalizers; the record is removed by the update that
/// clears the last one.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_raw(&self, kind: &str, key: &ObjectKey) -> Result<Option<RawObject>>;

    /// Lists records of a kind, optionally restricted to one namespace, in key order.
    async fn list_raw(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<RawObject>>;

    async fn create_raw(&self, kind: &str, object: RawObject) -> Result<RawObject>;

    async fn update_raw(&self, kind: &str, object: RawObject) -> Result<RawObject>;

    async fn delete_raw(&self, kind: &str, key: &ObjectKey) -> Result<()>;

    /// Subscribe to committed changes.
    fn subscribe(&self) -> broadcast::Receiver<Event>;
}

/// Typed access over any [`Store`].
#[async_trait]
pub trait StoreExt {
    async fn get<R: Resource>(&self, key: &ObjectKey) -> Result<Option<R>>;

    /// Like [`StoreExt::get`] but a missing record is an error.
    async fn fetch<R: Resource>(&self, key: &ObjectKey) -> Result<R>;

    async fn list<R: Resource>(&self, namespace: Option<&str>) -> Result<Vec<R>>;

    async fn create<R: Resource>(&self, object: &R) -> Result<R>;

    async fn update<R: Resource>(&self, object: &R) -> Result<R>;

    async fn delete<R: Resource>(&self, key: &ObjectKey) -> Result<()>;
}

#[async_trait]
impl<S: Store + ?Sized> StoreExt for S {
    async fn get<R: Resource>(&self, key: &ObjectKey) -> Result<Option<R>> {
        match self.get_raw(R::KIND, key).await? {
            Some(raw) => Ok(Some(serde_json::from_value(raw)?)),
            None => Ok(None),
        }
    }

    async fn fetch<R: Resource>(&self, key: &ObjectKey) -> Result<R> {
        self.get::<R>(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", R::KIND, key)))
    }

    async fn list<R: Resource>(&self, namespace: Option<&str>) -> Result<Vec<R>> {
        self.list_raw(R::KIND, namespace)
            .await?
            .into_iter()
            .map(|raw| serde_json::from_value(raw).map_err(StoreError::from))
            .collect()
    }

    async fn create<R: Resource>(&self, object: &R) -> Result<R> {
        let raw = self.create_raw(R::KIND, serde_json::to_value(object)?).await?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn update<R: Resource>(&self, object: &R) -> Result<R> {
        let raw = self.update_raw(R::KIND, serde_json::to_value(object)?).await?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn delete<R: Resource>(&self, key: &ObjectKey) -> Result<()> {
        self.delete_raw(R::KIND, key).await
    }
}
