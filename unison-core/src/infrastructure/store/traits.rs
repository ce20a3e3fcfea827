use crate::foundation::{ContentId, UnisonError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

pub type Result<T> = std::result::Result<T, UnisonError>;

/// Content-addressed object store with a mutable-name service.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn add(&self, bytes: Bytes) -> Result<ContentId>;
    async fn fetch(&self, content_id: &ContentId) -> Result<Bytes>;
    async fn pin(&self, content_id: &ContentId) -> Result<()>;
    async fn unpin(&self, content_id: &ContentId) -> Result<()>;
    /// Points `key`'s mutable name at `content_id`. Returns the published name.
    async fn publish_name(&self, key: &str, content_id: &ContentId, ttl: &str, lifetime: &str, allow_offline: bool) -> Result<String>;
    async fn resolve_name(&self, name: &str) -> Result<ContentId>;
    async fn gc(&self) -> Result<()>;
}

pub struct TopicSubscription {
    inner: BoxStream<'static, Result<Vec<u8>>>,
}

impl TopicSubscription {
    pub fn new(inner: BoxStream<'static, Result<Vec<u8>>>) -> Self {
        Self { inner }
    }

    pub async fn next(&mut self) -> Option<Result<Vec<u8>>> {
        self.inner.next().await
    }

    pub fn into_inner(self) -> BoxStream<'static, Result<Vec<u8>>> {
        self.inner
    }
}

/// Best-effort broadcast channel per topic string.
#[async_trait]
pub trait TopicBus: Send + Sync {
    async fn publish_topic(&self, topic: &str, bytes: Vec<u8>) -> Result<()>;
    async fn subscribe_topic(&self, topic: &str) -> Result<TopicSubscription>;
}
