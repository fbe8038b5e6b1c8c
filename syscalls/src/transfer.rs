//! Value transfer syscalls for TOS contracts
//!
//! Transfers are not applied immediately: they are recorded in the
//! caller's frame output and settled by the chain once the transaction's
//! output is accepted.

use thiserror::Error as ThisError;
use tos_program_runtime::{Address, InvokeContext, TosVmError};

/// Syscall error types
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum SyscallError {
    /// Recipient is not a 32-byte address
    #[error("Invalid address length: {0} bytes")]
    InvalidAddress(usize),
    /// Transfer of nothing
    #[error("Invalid transfer amount")]
    InvalidAmount,
    /// Insufficient compute units remaining
    #[error("Out of compute units")]
    OutOfComputeUnits,
    /// Host state could not be accessed
    #[error(transparent)]
    Host(#[from] TosVmError),
}

contract_error_from_syscall!();

/// Parse a 32-byte address passed by a contract
pub fn read_address(bytes: &[u8]) -> Option<Address> {
    Address::try_from(bytes).ok()
}

/// Transfer value from the calling contract to `recipient`
///
/// # Arguments
/// * `invoke_context` - Host of the calling contract
/// * `recipient` - 32-byte destination address
/// * `amount` - Value to send
/// * `data` - Payload attached to the transfer, may be empty
///
/// # Returns
/// 0 on success
///
/// # Errors
/// - `InvalidAddress` - If `recipient` is not 32 bytes long
/// - `InvalidAmount` - If both the amount and the payload are empty
/// - `OutOfComputeUnits` - If not enough compute units remain
///
/// # Compute Cost
/// `gas_schedule.transfer_value` + data_len * `gas_schedule.data_copy_per_byte`
pub fn tos_transfer_value(
    invoke_context: &mut InvokeContext,
    recipient: &[u8],
    amount: u128,
    data: &[u8],
) -> Result<u64, SyscallError> {
    let recipient = read_address(recipient).ok_or(SyscallError::InvalidAddress(recipient.len()))?;
    if amount == 0 && data.is_empty() {
        return Err(SyscallError::InvalidAmount);
    }

    let schedule = invoke_context.gas_schedule();
    let cost = schedule
        .transfer_value
        .saturating_add((data.len() as u64).saturating_mul(schedule.data_copy_per_byte));
    invoke_context
        .consume_checked(cost)
        .map_err(|_| SyscallError::OutOfComputeUnits)?;

    let sender = invoke_context.contract_address()?;
    invoke_context
        .output_mut()?
        .transfer(recipient, sender, amount, data.to_vec(), 0, 0, None);
    Ok(0)
}
