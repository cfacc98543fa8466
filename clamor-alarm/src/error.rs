//! Errors returned to callers of the alarm service.
//!
//! Each concern defines its own error enum next to the code that raises
//! it. Device and storage failures are logged where they happen and never
//! reach a caller; [`Error`] carries only what a command can be refused
//! for.

use crate::alarm::AlarmId;
use crate::ring::SilenceError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Silence rejected: {0}")]
    Silence(#[from] SilenceError),

    #[error("No alarm with id {0}")]
    AlarmNotFound(AlarmId),
}
