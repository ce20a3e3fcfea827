/// Main log file, rolled by size.
pub const LOG_FILE_NAME: &str = "unison.log";
/// Warn and above only.
pub const ERR_LOG_FILE_NAME: &str = "unison_err.log";

/// `timestamp [LEVEL] message [module] [thread-id]`
pub const LOG_LINE_PATTERN_COLORED: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{h({l:5})}] {m} [{M}] [{I}]{n}";
pub const LOG_LINE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l:5}] {m} [{M}] [{I}]{n}";

pub const LOG_FILE_MAX_SIZE: u64 = 50_000_000;
pub const LOG_FILE_MAX_ROLLS: u32 = 5;

/// Crates logged at the app level by default; everything else is off unless named in the filter.
pub const WHITELISTED_CRATES: &[&str] = &["unison_core", "unison_service"];
