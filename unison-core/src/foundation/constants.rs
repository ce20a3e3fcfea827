//! System-wide constants for unison peers.

/// Nanoseconds per millisecond (10^6).
pub const NANOS_PER_MILLI: u64 = 1_000_000;

/// Nanoseconds per second (10^9).
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Environment variable that pins `now_nanos()` in tests.
pub const TEST_NOW_NANOS_ENV_VAR: &str = "UNISON_TEST_NOW_NANOS";

/// Default lookahead queue depth (rounds).
///
/// Dimensioned so that peers whose round transitions are skewed by up to one full round
/// still agree on the content of the head entry.
pub const DEFAULT_QUEUE_DEPTH: usize = 5;

/// Default number of resolved rounds whose content stays pinned.
pub const DEFAULT_RETAINED_ROUNDS: usize = 3;

/// Default live manifest window length (segments).
pub const DEFAULT_WINDOW_SEGMENTS: usize = 40;

/// Default divergence streak after which a peer is excluded (10 minutes).
pub const DEFAULT_DIVERGENCE_THRESHOLD_NS: u64 = 600 * NANOS_PER_SECOND;

/// Maximum size of an encoded gossip envelope (4 MiB).
///
/// A proposal for a long track list carries one content id per segment; 4 MiB leaves
/// room for several hours of 6-second segments.
pub const MAX_MESSAGE_SIZE_BYTES: usize = 4 * 1024 * 1024;

/// How long a `(sender, seq_no)` pair is remembered for replay suppression.
pub const SEEN_MESSAGE_TTL_NANOS: u64 = 15 * 60 * NANOS_PER_SECOND;

/// Replay-suppression cache is pruned every N accepted messages.
pub const SEEN_MESSAGE_CLEANUP_INTERVAL_MESSAGES: u64 = 256;

/// Blake3 hash size in bytes (32 bytes).
pub const HASH_SIZE: usize = 32;
