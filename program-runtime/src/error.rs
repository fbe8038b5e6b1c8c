//! Error types for the TOS host runtime

use crate::async_call::CorrelationId;
use thiserror::Error;

/// Result type for TOS host operations
pub type Result<T> = std::result::Result<T, TosVmError>;

/// Errors that can occur while the host drives contract execution
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TosVmError {
    /// Not enough gas left to register a call, build a call input or pay a callback
    #[error("Not enough gas")]
    NotEnoughGas,

    /// The execution engine returned neither an output nor an error
    #[error("Destination execution returned no output")]
    NilDestinationOutput,

    /// A synchronous callback produced no output
    #[error("Async callback returned no output")]
    NoOutputFromCallback,

    /// A completion referenced a call that is not pending in this context
    #[error("Unknown correlation id {0}")]
    UnknownCorrelationId(CorrelationId),

    /// Malformed call payload
    #[error("Failed to parse call data: {0}")]
    ParseError(String),

    /// The maximum nesting depth of frames was reached
    #[error("Call stack overflow at depth {depth}")]
    CallStackOverflow {
        /// Depth of the frame that could not be pushed
        depth: usize,
    },

    /// A frame operation was attempted with an empty frame stack
    #[error("No active execution frame")]
    NoActiveFrame,

    /// Group identifiers must be non-empty
    #[error("Invalid async call group identifier")]
    InvalidGroupId,

    /// A group callback was set on a group that holds no calls
    #[error("Async call group '{0}' does not exist")]
    AsyncCallGroupNotFound(String),

    /// Calls cannot be added to a group whose callback already fired
    #[error("Async call group '{0}' is already complete")]
    GroupAlreadyComplete(String),

    /// No persisted async context exists for the requested transaction
    #[error("Async context not found")]
    AsyncContextNotFound,

    /// Storage provider failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Async context (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TosVmError {
    /// Whether the error aborts the whole host invocation.
    ///
    /// Gas, parse and depth failures only reject the async step being built;
    /// every other error is a protocol violation and fails the transaction.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            TosVmError::NotEnoughGas | TosVmError::ParseError(_) | TosVmError::CallStackOverflow { .. }
        )
    }
}

impl From<bincode::Error> for TosVmError {
    fn from(err: bincode::Error) -> Self {
        TosVmError::Serialization(err.to_string())
    }
}
