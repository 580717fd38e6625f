//! Storage capabilities used by the bundled providers.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;

use crate::error::StoreResult;

/// Bucket/key object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> StoreResult<Bytes>;

    /// Overwrites any existing object, so repeated writes are idempotent.
    async fn put(&self, bucket: &str, key: &str, body: Bytes, content_type: &str)
        -> StoreResult<()>;
}

/// Produces time-limited links to stored objects.
#[async_trait]
pub trait LinkSigner: Send + Sync {
    async fn sign(&self, bucket: &str, key: &str, expires_in: Duration) -> StoreResult<String>;
}
