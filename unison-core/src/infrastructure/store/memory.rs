use crate::foundation::{ContentId, UnisonError};
use crate::infrastructure::store::traits::{ContentStore, Result, TopicBus, TopicSubscription};
use crate::store_err;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

/// Failure switches for exercising error paths.
#[derive(Clone, Debug, Default)]
pub struct StoreFaults {
    pub fail_pins: HashSet<ContentId>,
    pub fail_unpins: HashSet<ContentId>,
    pub fail_all_pins: bool,
    pub fail_publish: bool,
    /// Applied to every pin before it completes.
    pub pin_delay: Option<Duration>,
}

#[derive(Default)]
struct StoreInner {
    objects: HashMap<ContentId, Bytes>,
    pinned: HashSet<ContentId>,
    names: HashMap<String, ContentId>,
    faults: StoreFaults,
    publish_count: usize,
    gc_count: usize,
}

/// Content store held in process memory. Content ids are `mem-` plus the blake3 hex of the bytes.
#[derive(Default)]
pub struct MemoryContentStore {
    inner: Mutex<StoreInner>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, StoreInner>> {
        self.inner.lock().map_err(|_| store_err!("memory store lock", "poisoned"))
    }

    pub fn content_id_for(bytes: &[u8]) -> ContentId {
        ContentId::new(format!("mem-{}", blake3::hash(bytes).to_hex()))
    }

    /// Makes `content_id` fetchable without pinning it.
    pub fn insert(&self, content_id: ContentId, bytes: impl Into<Bytes>) {
        if let Ok(mut inner) = self.lock_inner() {
            inner.objects.insert(content_id, bytes.into());
        }
    }

    pub fn set_faults(&self, faults: StoreFaults) {
        if let Ok(mut inner) = self.lock_inner() {
            inner.faults = faults;
        }
    }

    pub fn is_pinned(&self, content_id: &ContentId) -> bool {
        self.lock_inner().map(|inner| inner.pinned.contains(content_id)).unwrap_or(false)
    }

    pub fn pinned(&self) -> HashSet<ContentId> {
        self.lock_inner().map(|inner| inner.pinned.clone()).unwrap_or_default()
    }

    pub fn publish_count(&self) -> usize {
        self.lock_inner().map(|inner| inner.publish_count).unwrap_or_default()
    }

    pub fn gc_count(&self) -> usize {
        self.lock_inner().map(|inner| inner.gc_count).unwrap_or_default()
    }

    pub fn published(&self, key: &str) -> Option<ContentId> {
        self.lock_inner().ok().and_then(|inner| inner.names.get(key).cloned())
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn add(&self, bytes: Bytes) -> Result<ContentId> {
        let content_id = Self::content_id_for(&bytes);
        let mut inner = self.lock_inner()?;
        inner.objects.insert(content_id.clone(), bytes);
        inner.pinned.insert(content_id.clone());
        Ok(content_id)
    }

    async fn fetch(&self, content_id: &ContentId) -> Result<Bytes> {
        self.lock_inner()?.objects.get(content_id).cloned().ok_or_else(|| store_err!("cat", format!("content not found: {content_id}")))
    }

    async fn pin(&self, content_id: &ContentId) -> Result<()> {
        let delay = self.lock_inner()?.faults.pin_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.lock_inner()?;
        if inner.faults.fail_all_pins || inner.faults.fail_pins.contains(content_id) {
            return Err(store_err!("pin/add", format!("injected failure for {content_id}")));
        }
        if !inner.objects.contains_key(content_id) {
            return Err(store_err!("pin/add", format!("content not found: {content_id}")));
        }
        inner.pinned.insert(content_id.clone());
        Ok(())
    }

    async fn unpin(&self, content_id: &ContentId) -> Result<()> {
        let mut inner = self.lock_inner()?;
        if inner.faults.fail_unpins.contains(content_id) {
            return Err(store_err!("pin/rm", format!("injected failure for {content_id}")));
        }
        inner.pinned.remove(content_id);
        Ok(())
    }

    async fn publish_name(&self, key: &str, content_id: &ContentId, _ttl: &str, _lifetime: &str, _allow_offline: bool) -> Result<String> {
        let mut inner = self.lock_inner()?;
        if inner.faults.fail_publish {
            return Err(store_err!("name/publish", "injected failure"));
        }
        inner.names.insert(key.to_string(), content_id.clone());
        inner.publish_count += 1;
        Ok(format!("mem-name-{key}"))
    }

    async fn resolve_name(&self, name: &str) -> Result<ContentId> {
        let key = name.trim_start_matches("/ipns/").trim_start_matches("mem-name-");
        self.lock_inner()?.names.get(key).cloned().ok_or_else(|| store_err!("name/resolve", format!("name not found: {name}")))
    }

    async fn gc(&self) -> Result<()> {
        let mut inner = self.lock_inner()?;
        let pinned = inner.pinned.clone();
        inner.objects.retain(|content_id, _| pinned.contains(content_id));
        inner.gc_count += 1;
        Ok(())
    }
}

/// Topic fan-out shared by every node of an in-process network.
pub struct MemoryTopicHub {
    topics: tokio::sync::Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl MemoryTopicHub {
    pub fn new() -> Self {
        Self { topics: tokio::sync::Mutex::new(HashMap::new()) }
    }

    async fn topic(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        let mut guard = self.topics.lock().await;
        guard.entry(topic.to_string()).or_insert_with(|| broadcast::channel(1024).0).clone()
    }
}

impl Default for MemoryTopicHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicBus for MemoryTopicHub {
    async fn publish_topic(&self, topic: &str, bytes: Vec<u8>) -> Result<()> {
        let sender = self.topic(topic).await;
        // No receivers is not an error for a pubsub publish.
        let _ = sender.send(bytes);
        Ok(())
    }

    async fn subscribe_topic(&self, topic: &str) -> Result<TopicSubscription> {
        let mut receiver = self.topic(topic).await.subscribe();
        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(bytes) => yield Ok(bytes),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        yield Err(UnisonError::TransportError { operation: "memory_hub".to_string(), details: format!("lagged by {skipped}") });
                    }
                }
            }
        };
        Ok(TopicSubscription::new(Box::pin(stream)))
    }
}
