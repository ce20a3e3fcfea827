//! Adapters for the content-addressed store and its pubsub primitive.

pub mod kubo;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod traits;

pub use kubo::KuboClient;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::{MemoryContentStore, MemoryTopicHub, StoreFaults};
pub use traits::*;
