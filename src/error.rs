use thiserror::Error;

/// Returned by checked lookups (`at`, `at_mut`) when the key is absent.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("key not found")]
pub struct KeyNotFound;
