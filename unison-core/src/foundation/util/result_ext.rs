//! Helpers for `Result<Option<T>>` values returned by the state store.

use crate::foundation::UnisonError;

pub trait ResultExt<T> {
    /// `Ok(None)` becomes `T::default()`; a missing file means a fresh node.
    fn or_default(self) -> Result<T, UnisonError>
    where
        T: Default;
}

impl<T> ResultExt<T> for Result<Option<T>, UnisonError> {
    fn or_default(self) -> Result<T, UnisonError>
    where
        T: Default,
    {
        Ok(self?.unwrap_or_default())
    }
}
