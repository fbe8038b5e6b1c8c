//! Asynchronous call syscalls for TOS contracts
//!
//! A contract registers calls into named groups while it runs. Nothing is
//! dispatched until the contract returns: the host then executes local
//! calls, forwards cross-shard ones, and fires the callbacks.

use crate::transfer::read_address;
use thiserror::Error as ThisError;
use tos_program_runtime::{AsyncCallRequest, CorrelationId, InvokeContext, TosVmError};

/// Syscall error types
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum SyscallError {
    /// Destination is not a 32-byte address
    #[error("Invalid address length: {0} bytes")]
    InvalidAddress(usize),
    /// Group id or callback name is not valid UTF-8
    #[error("Invalid UTF-8 string")]
    InvalidString,
    /// Call data exceeds the maximum size
    #[error("Call data too large: {0} bytes (max {1})")]
    DataTooLarge(u64, u64),
    /// Insufficient compute units remaining
    #[error("Out of compute units")]
    OutOfComputeUnits,
    /// The host refused the request
    #[error(transparent)]
    Host(#[from] TosVmError),
}

contract_error_from_syscall!();

/// Maximum size of the encoded call data (64 KB)
pub const MAX_CALL_DATA: u64 = 65_536;

fn read_str(bytes: &[u8]) -> Result<&str, SyscallError> {
    std::str::from_utf8(bytes).map_err(|_| SyscallError::InvalidString)
}

fn charge(invoke_context: &mut InvokeContext, base_cost: u64, data_len: usize) -> Result<(), SyscallError> {
    let cost = base_cost.saturating_add(
        (data_len as u64).saturating_mul(invoke_context.gas_schedule().data_copy_per_byte),
    );
    invoke_context
        .consume_checked(cost)
        .map_err(|_| SyscallError::OutOfComputeUnits)
}

fn host_error(err: TosVmError) -> SyscallError {
    match err {
        TosVmError::NotEnoughGas => SyscallError::OutOfComputeUnits,
        other => SyscallError::Host(other),
    }
}

/// Register an asynchronous call in `group_id`
///
/// The gas limit is capped to the gas left in the frame. `gas_limit` and
/// `gas_locked` are deducted from the caller at once; whatever the
/// destination and the callback leave unused flows back once the call
/// completes.
///
/// # Arguments
/// * `invoke_context` - Host of the calling contract
/// * `group_id` - Group the call joins, created on first use
/// * `destination` - 32-byte destination address
/// * `value` - Value sent with the call
/// * `data` - Encoded function and arguments
/// * `success_callback` - Callback on success, may be empty
/// * `error_callback` - Callback on failure, may be empty
/// * `gas_limit` - Gas for the destination
/// * `gas_locked` - Gas reserved for the callback
///
/// # Returns
/// The correlation id of the registered call
///
/// # Errors
/// - `InvalidAddress` - If `destination` is not 32 bytes long
/// - `InvalidString` - If a name is not valid UTF-8
/// - `DataTooLarge` - If data exceeds MAX_CALL_DATA
/// - `OutOfComputeUnits` - If the charge or the reservation does not fit
/// - `Host` - If the group is empty-named or already complete
///
/// # Compute Cost
/// `gas_schedule.create_async_call` + data_len * `gas_schedule.data_copy_per_byte`
#[allow(clippy::too_many_arguments)]
pub fn tos_create_async_call(
    invoke_context: &mut InvokeContext,
    group_id: &[u8],
    destination: &[u8],
    value: u128,
    data: &[u8],
    success_callback: &[u8],
    error_callback: &[u8],
    gas_limit: u64,
    gas_locked: u64,
) -> Result<CorrelationId, SyscallError> {
    let destination = read_address(destination).ok_or(SyscallError::InvalidAddress(destination.len()))?;
    let group_id = read_str(group_id)?;
    let success_callback = read_str(success_callback)?;
    let error_callback = read_str(error_callback)?;
    let data_len = data.len() as u64;
    if data_len > MAX_CALL_DATA {
        return Err(SyscallError::DataTooLarge(data_len, MAX_CALL_DATA));
    }

    let base_cost = invoke_context.gas_schedule().create_async_call;
    charge(invoke_context, base_cost, data.len())?;

    let gas_limit = invoke_context.metering().bound_gas_limit(gas_limit);
    let request = AsyncCallRequest {
        destination,
        data: data.to_vec(),
        value,
        gas_limit,
        gas_locked,
        success_callback: success_callback.to_string(),
        error_callback: error_callback.to_string(),
    };
    let correlation_id = invoke_context
        .register_async_call(group_id, request)
        .map_err(host_error)?;

    log::debug!(
        "registered async call {} in group {} (gas limit {}, locked {})",
        correlation_id,
        group_id,
        gas_limit,
        gas_locked
    );
    Ok(correlation_id)
}

/// Set the callback fired once every call of `group_id` completed
///
/// `gas_locked` is reserved for the callback on top of the gas its calls
/// hand back. Replacing a callback releases the previous reservation.
///
/// # Returns
/// 0 on success
///
/// # Errors
/// - `InvalidString` - If a name is not valid UTF-8
/// - `OutOfComputeUnits` - If the charge or the reservation does not fit
/// - `Host` - If the group does not exist or is already complete
pub fn tos_set_async_group_callback(
    invoke_context: &mut InvokeContext,
    group_id: &[u8],
    callback: &[u8],
    data: &[u8],
    gas_locked: u64,
) -> Result<u64, SyscallError> {
    let group_id = read_str(group_id)?;
    let callback = read_str(callback)?;

    let base_cost = invoke_context.gas_schedule().set_async_callback;
    charge(invoke_context, base_cost, data.len())?;

    invoke_context
        .set_async_group_callback(group_id, callback, data.to_vec(), gas_locked)
        .map_err(host_error)?;
    Ok(0)
}

/// Set the callback fired once every group of the calling frame completed
///
/// The callback runs on the gas gathered from the completed groups.
pub fn tos_set_async_context_callback(
    invoke_context: &mut InvokeContext,
    callback: &[u8],
    data: &[u8],
) -> Result<u64, SyscallError> {
    let callback = read_str(callback)?;

    let base_cost = invoke_context.gas_schedule().set_async_callback;
    charge(invoke_context, base_cost, data.len())?;

    invoke_context
        .set_async_context_callback(callback, data.to_vec())
        .map_err(host_error)?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tos_program_runtime::{Config, ContractCallInput};

    const OWNER: [u8; 32] = [1u8; 32];
    const DEST: [u8; 32] = [2u8; 32];

    fn context(gas: u64) -> InvokeContext {
        let mut context = InvokeContext::new(Config::test());
        context.push_frame(ContractCallInput::direct([0u8; 32], OWNER, "main", gas));
        context
    }

    #[test]
    fn test_create_async_call() {
        let mut context = context(10_000);
        let id = tos_create_async_call(&mut context, b"g", &DEST, 0, b"ping", b"cb", b"", 1_000, 500).unwrap();

        // 4 bytes copied + limit + lock
        assert_eq!(context.get_compute_units_consumed(), 4 + 1_500);
        let async_context = context.async_context().unwrap();
        let call = async_context.call(&id).unwrap();
        assert_eq!(call.gas_limit(), 1_000);
        assert_eq!(call.gas_locked(), 500);
        assert_eq!(async_context.pending_calls(), 1);
    }

    #[test]
    fn test_create_async_call_caps_gas_limit() {
        let mut context = context(2_000);
        let id = tos_create_async_call(&mut context, b"g", &DEST, 0, b"", b"", b"", u64::MAX, 0).unwrap();
        assert_eq!(context.async_context().unwrap().call(&id).unwrap().gas_limit(), 2_000);
        assert_eq!(context.get_remaining(), 0);
    }

    #[test]
    fn test_create_async_call_not_enough_gas() {
        let mut context = context(1_000);
        assert_eq!(
            tos_create_async_call(&mut context, b"g", &DEST, 0, b"", b"", b"", 800, 500),
            Err(SyscallError::OutOfComputeUnits)
        );
        assert_eq!(context.get_compute_units_consumed(), 0);
    }

    #[test]
    fn test_create_async_call_rejects_bad_input() {
        let mut context = context(10_000);
        assert_eq!(
            tos_create_async_call(&mut context, b"g", &DEST[..4], 0, b"", b"", b"", 1, 0),
            Err(SyscallError::InvalidAddress(4))
        );
        assert_eq!(
            tos_create_async_call(&mut context, &[0xff], &DEST, 0, b"", b"", b"", 1, 0),
            Err(SyscallError::InvalidString)
        );
        assert_eq!(
            tos_create_async_call(&mut context, b"", &DEST, 0, b"", b"", b"", 1, 0),
            Err(SyscallError::Host(TosVmError::InvalidGroupId))
        );
    }

    #[test]
    fn test_group_callback_needs_existing_group() {
        let mut context = context(10_000);
        assert_eq!(
            tos_set_async_group_callback(&mut context, b"missing", b"done", b"", 100),
            Err(SyscallError::Host(TosVmError::AsyncCallGroupNotFound("missing".to_string())))
        );

        tos_create_async_call(&mut context, b"g", &DEST, 0, b"", b"", b"", 1_000, 0).unwrap();
        assert_eq!(tos_set_async_group_callback(&mut context, b"g", b"done", b"xy", 100), Ok(0));
        assert_eq!(context.get_compute_units_consumed(), 1_000 + 2 + 100);

        // Replacing the callback releases the first reservation
        assert_eq!(tos_set_async_group_callback(&mut context, b"g", b"done", b"", 300), Ok(0));
        assert_eq!(context.get_compute_units_consumed(), 1_000 + 2 + 300);
        assert_eq!(context.async_context().unwrap().group("g").unwrap().gas_locked(), 300);
    }

    #[test]
    fn test_context_callback() {
        let mut context = context(10_000);
        assert_eq!(tos_set_async_context_callback(&mut context, b"allDone", b"abc"), Ok(0));
        assert_eq!(context.get_compute_units_consumed(), 3);
        assert_eq!(context.async_context().unwrap().callback(), "allDone");
    }
}
