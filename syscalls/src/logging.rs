//! Logging syscalls for TOS contracts
//!
//! This module provides the tos_log syscall that allows contracts to
//! output debug messages during execution.

use thiserror::Error as ThisError;
use tos_program_runtime::{events::short_address, InvokeContext, TosVmError};

/// Syscall error types
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum SyscallError {
    /// Invalid UTF-8 string in message
    #[error("Invalid UTF-8 string")]
    InvalidString,
    /// Message exceeds maximum length
    #[error("Message too long: {0} bytes (max {1})")]
    MessageTooLong(u64, u64),
    /// Insufficient compute units remaining
    #[error("Out of compute units")]
    OutOfComputeUnits,
    /// Host state could not be accessed
    #[error(transparent)]
    Host(#[from] TosVmError),
}

contract_error_from_syscall!();

/// Maximum length of a log message
pub const MAX_LOG_LENGTH: u64 = 10_000;

/// Compute units charged per byte of log message
pub const LOG_COST_PER_BYTE: u64 = 1;

/// Log a UTF-8 encoded message from a contract
///
/// Messages are only displayed when the InvokeContext is in debug mode,
/// but they are charged either way.
///
/// # Arguments
/// * `invoke_context` - Host of the calling contract
/// * `msg` - Message bytes
///
/// # Returns
/// 0 on success
///
/// # Errors
/// - `MessageTooLong` - If the message exceeds MAX_LOG_LENGTH
/// - `OutOfComputeUnits` - If not enough compute units remain
/// - `InvalidString` - If the message is not valid UTF-8
///
/// # Compute Cost
/// `gas_schedule.log` + msg_len * LOG_COST_PER_BYTE
pub fn tos_log(invoke_context: &mut InvokeContext, msg: &[u8]) -> Result<u64, SyscallError> {
    let msg_len = msg.len() as u64;
    if msg_len > MAX_LOG_LENGTH {
        return Err(SyscallError::MessageTooLong(msg_len, MAX_LOG_LENGTH));
    }

    let total_cost = invoke_context
        .gas_schedule()
        .log
        .saturating_add(msg_len.saturating_mul(LOG_COST_PER_BYTE));
    invoke_context
        .consume_checked(total_cost)
        .map_err(|_| SyscallError::OutOfComputeUnits)?;

    let msg = std::str::from_utf8(msg).map_err(|_| SyscallError::InvalidString)?;

    if invoke_context.debug_mode {
        let contract = invoke_context.contract_address()?;
        log::info!("[Contract {}]: {}", short_address(&contract), msg);
    }

    Ok(0)
}
