//! Storage syscalls for TOS contracts
//!
//! This module provides syscalls for contract persistent storage operations:
//! reading, writing, and deleting key-value pairs. Keys under the prefix the
//! host uses for pending async call records are off limits to contracts.

use thiserror::Error as ThisError;
use tos_program_runtime::{async_context::ASYNC_CONTEXT_KEY_PREFIX, InvokeContext, TosVmError};

/// Syscall error types
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum SyscallError {
    /// Storage key is too large
    #[error("Key too large: {0} bytes (max {1})")]
    KeyTooLarge(u64, u64),
    /// Storage value is too large
    #[error("Value too large: {0} bytes (max {1})")]
    ValueTooLarge(u64, u64),
    /// Key lies in the host's reserved namespace
    #[error("Key is reserved by the host")]
    ReservedKey,
    /// Output buffer too small
    #[error("Buffer too small: need {0} bytes, got {1}")]
    BufferTooSmall(usize, u64),
    /// Insufficient compute units remaining
    #[error("Out of compute units")]
    OutOfComputeUnits,
    /// Host state could not be accessed
    #[error(transparent)]
    Host(#[from] TosVmError),
}

contract_error_from_syscall!();

/// Maximum storage key size (256 bytes)
pub const MAX_KEY_SIZE: u64 = 256;

/// Maximum storage value size (64 KB)
pub const MAX_VALUE_SIZE: u64 = 65_536;

/// Per-byte cost for storage operations
pub const STORAGE_READ_BYTE_COST: u64 = 1;
/// Per-byte cost of a storage write
pub const STORAGE_WRITE_BYTE_COST: u64 = 2;

fn check_key(key: &[u8]) -> Result<(), SyscallError> {
    let key_len = key.len() as u64;
    if key_len > MAX_KEY_SIZE {
        return Err(SyscallError::KeyTooLarge(key_len, MAX_KEY_SIZE));
    }
    if key.starts_with(ASYNC_CONTEXT_KEY_PREFIX) {
        return Err(SyscallError::ReservedKey);
    }
    Ok(())
}

/// Read a value from contract storage
///
/// # Arguments
/// * `invoke_context` - Host of the calling contract
/// * `key` - Storage key
/// * `output` - Buffer to receive the value
///
/// # Returns
/// The actual size of the value in bytes (0 if key not found)
///
/// # Errors
/// - `KeyTooLarge` - If key exceeds MAX_KEY_SIZE
/// - `ReservedKey` - If key starts with the async call record prefix
/// - `OutOfComputeUnits` - If not enough compute units remain
/// - `BufferTooSmall` - If output buffer is too small for the value
pub fn tos_storage_read(
    invoke_context: &mut InvokeContext,
    key: &[u8],
    output: &mut [u8],
) -> Result<u64, SyscallError> {
    check_key(key)?;
    let base_cost = invoke_context.gas_schedule().storage_load;

    match invoke_context.get_storage(key)? {
        Some(data) => {
            let value_len = data.len() as u64;
            let cost = base_cost.saturating_add(value_len.saturating_mul(STORAGE_READ_BYTE_COST));
            invoke_context
                .consume_checked(cost)
                .map_err(|_| SyscallError::OutOfComputeUnits)?;

            let output_len = output.len() as u64;
            let target = output
                .get_mut(..data.len())
                .ok_or(SyscallError::BufferTooSmall(data.len(), output_len))?;
            target.copy_from_slice(&data);
            Ok(value_len)
        }
        None => {
            // Key not found - charge minimal cost
            invoke_context
                .consume_checked(base_cost)
                .map_err(|_| SyscallError::OutOfComputeUnits)?;
            Ok(0)
        }
    }
}

/// Write a value to contract storage
///
/// # Returns
/// 0 on success
///
/// # Errors
/// - `KeyTooLarge` - If key exceeds MAX_KEY_SIZE
/// - `ValueTooLarge` - If value exceeds MAX_VALUE_SIZE
/// - `ReservedKey` - If key starts with the async call record prefix
/// - `OutOfComputeUnits` - If not enough compute units remain
pub fn tos_storage_write(
    invoke_context: &mut InvokeContext,
    key: &[u8],
    value: &[u8],
) -> Result<u64, SyscallError> {
    check_key(key)?;
    let value_len = value.len() as u64;
    if value_len > MAX_VALUE_SIZE {
        return Err(SyscallError::ValueTooLarge(value_len, MAX_VALUE_SIZE));
    }

    let cost = invoke_context
        .gas_schedule()
        .storage_store
        .saturating_add(value_len.saturating_mul(STORAGE_WRITE_BYTE_COST));
    invoke_context
        .consume_checked(cost)
        .map_err(|_| SyscallError::OutOfComputeUnits)?;

    invoke_context.set_storage(key, value)?;
    Ok(0)
}

/// Delete a key from contract storage
///
/// Freeing a value records a refund of `storage_release_per_byte` for each
/// byte released.
///
/// # Returns
/// 1 if the key was deleted, 0 if the key didn't exist
pub fn tos_storage_delete(invoke_context: &mut InvokeContext, key: &[u8]) -> Result<u64, SyscallError> {
    check_key(key)?;
    let cost = invoke_context.gas_schedule().storage_delete;
    invoke_context
        .consume_checked(cost)
        .map_err(|_| SyscallError::OutOfComputeUnits)?;

    let released = invoke_context
        .get_storage(key)?
        .map_or(0, |value| value.len() as u64);
    let existed = invoke_context.delete_storage(key)?;
    if existed {
        let refund = released.saturating_mul(invoke_context.gas_schedule().storage_release_per_byte);
        invoke_context.metering_mut().free_gas(refund);
    }
    Ok(u64::from(existed))
}
