//! Domain layer: pure state machines and data types. No I/O.

pub mod catalog;
pub mod coordination;
pub mod divergence;
pub mod hashes;
pub mod retention;
pub mod stream;

pub use catalog::{Catalog, SegmentRef, Track};
pub use divergence::{DivergenceConfig, DivergenceTracker, ExclusionChange, PeerSyncSnapshot, PeerSyncState, PlaybackReport};
pub use retention::{CleanupPlan, PinLedger, PinLedgerSnapshot, PinRecord};
