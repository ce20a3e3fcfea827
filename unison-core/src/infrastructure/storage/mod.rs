pub mod json;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod traits;

pub use json::{write_atomic, JsonStateStore};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryStateStore;
pub use traits::*;
