//! Policy error types.

use thiserror::Error;

/// Policy errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A tool filter pattern is malformed.
    #[error("invalid tool pattern: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, Error>;
