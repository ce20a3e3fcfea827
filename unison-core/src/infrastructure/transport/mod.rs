//! Signed gossip between peers.

pub mod encoding;
pub mod filtering;
pub mod identity;
pub mod messages;
pub mod pubsub;
pub mod traits;

pub use identity::load_or_create_seed;
pub use pubsub::{discovery_topic, divergence_topic, round_topic, PubsubTransport};
pub use traits::*;
