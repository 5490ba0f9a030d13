//! Bus error types

use hub_core::MessageError;
use thiserror::Error;

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Errors that can occur when posting to or polling a bus
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker connection or its request queue is unavailable
    #[error("transport error: {0}")]
    Transport(String),

    /// A message could not be encoded
    #[error(transparent)]
    Message(#[from] MessageError),

    /// Another dispatch loop is already polling this bus
    #[error("bus is already being polled")]
    AlreadyPolling,

    /// The underlying channel has been closed
    #[error("bus channel closed")]
    Closed,
}
