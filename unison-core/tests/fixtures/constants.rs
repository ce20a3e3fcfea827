#![allow(dead_code)]

use unison_core::foundation::NANOS_PER_SECOND;

pub const S: u64 = NANOS_PER_SECOND;
pub const TEST_ROUND_SECS: u64 = 60;
pub const TEST_QUEUE_DEPTH: usize = 5;
pub const TEST_SEGMENT_MS: u64 = 6_000;
pub const TEST_NAMESPACE: &str = "unison-test";
