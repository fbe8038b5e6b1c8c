//! Return data syscalls for TOS contracts
//!
//! Contracts publish results by appending to the finish buffer of their
//! frame. Results of finished child frames are merged into the parent's
//! buffer, so a caller reads them back through the same buffer.

use thiserror::Error as ThisError;
use tos_program_runtime::{InvokeContext, TosVmError};

/// Syscall error types
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum SyscallError {
    /// Return data exceeds maximum size
    #[error("Return data too large: {0} bytes (max {1})")]
    ReturnDataTooLarge(u64, u64),
    /// No return data at the requested index
    #[error("No return data at index {0}")]
    IndexOutOfBounds(u64),
    /// Insufficient compute units remaining
    #[error("Out of compute units")]
    OutOfComputeUnits,
    /// Host state could not be accessed
    #[error(transparent)]
    Host(#[from] TosVmError),
}

contract_error_from_syscall!();

/// Maximum size of a single return data entry (1 KB)
pub const MAX_RETURN_DATA: u64 = 1024;

/// Append a value to the caller's finish buffer
///
/// # Arguments
/// * `invoke_context` - Host of the calling contract
/// * `data` - Value to append
///
/// # Returns
/// 0 on success
///
/// # Errors
/// - `ReturnDataTooLarge` - If data exceeds MAX_RETURN_DATA
/// - `OutOfComputeUnits` - If not enough compute units remain
///
/// # Compute Cost
/// `gas_schedule.finish` + data_len * `gas_schedule.data_copy_per_byte`
pub fn tos_finish(invoke_context: &mut InvokeContext, data: &[u8]) -> Result<u64, SyscallError> {
    let data_len = data.len() as u64;
    if data_len > MAX_RETURN_DATA {
        return Err(SyscallError::ReturnDataTooLarge(data_len, MAX_RETURN_DATA));
    }

    let schedule = invoke_context.gas_schedule();
    let cost = schedule
        .finish
        .saturating_add(data_len.saturating_mul(schedule.data_copy_per_byte));
    invoke_context
        .consume_checked(cost)
        .map_err(|_| SyscallError::OutOfComputeUnits)?;

    invoke_context.output_mut()?.finish(data.to_vec());
    Ok(0)
}

/// Number of entries in the current frame's finish buffer
pub fn tos_get_num_return_data(invoke_context: &mut InvokeContext) -> Result<u64, SyscallError> {
    let cost = invoke_context.gas_schedule().get_return_data;
    invoke_context
        .consume_checked(cost)
        .map_err(|_| SyscallError::OutOfComputeUnits)?;
    Ok(invoke_context.output()?.return_data().len() as u64)
}

/// Copy one finish buffer entry into `buffer`
///
/// Data longer than the buffer is truncated rather than rejected; the
/// caller compares the returned length with its buffer size.
///
/// # Arguments
/// * `invoke_context` - Host of the calling contract
/// * `index` - Position in the finish buffer
/// * `buffer` - Destination of the copy
///
/// # Returns
/// The actual length of the entry, not the copied length
///
/// # Errors
/// - `IndexOutOfBounds` - If the buffer has no entry at `index`
/// - `OutOfComputeUnits` - If not enough compute units remain
///
/// # Compute Cost
/// `gas_schedule.get_return_data` + copied_len * `gas_schedule.data_copy_per_byte`
pub fn tos_get_return_data(
    invoke_context: &mut InvokeContext,
    index: u64,
    buffer: &mut [u8],
) -> Result<u64, SyscallError> {
    let data = usize::try_from(index)
        .ok()
        .and_then(|index| invoke_context.output().ok()?.return_data().get(index).cloned())
        .ok_or(SyscallError::IndexOutOfBounds(index))?;

    let length_to_copy = buffer.len().min(data.len());
    let schedule = invoke_context.gas_schedule();
    let cost = schedule
        .get_return_data
        .saturating_add((length_to_copy as u64).saturating_mul(schedule.data_copy_per_byte));
    invoke_context
        .consume_checked(cost)
        .map_err(|_| SyscallError::OutOfComputeUnits)?;

    if let (Some(target), Some(source)) = (buffer.get_mut(..length_to_copy), data.get(..length_to_copy)) {
        target.copy_from_slice(source);
    }
    Ok(data.len() as u64)
}

/// Empty the current frame's finish buffer
pub fn tos_clean_return_data(invoke_context: &mut InvokeContext) -> Result<u64, SyscallError> {
    let cost = invoke_context.gas_schedule().get_return_data;
    invoke_context
        .consume_checked(cost)
        .map_err(|_| SyscallError::OutOfComputeUnits)?;
    invoke_context.output_mut()?.clear_return_data();
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tos_program_runtime::{Config, ContractCallInput};

    fn context(gas: u64) -> InvokeContext {
        let mut context = InvokeContext::new(Config::test());
        context.push_frame(ContractCallInput::direct([0u8; 32], [1u8; 32], "main", gas));
        context
    }

    #[test]
    fn test_return_data_constants() {
        assert_eq!(MAX_RETURN_DATA, 1024);
    }

    #[test]
    fn test_finish_and_read_back() {
        let mut context = context(10_000);
        tos_finish(&mut context, &[1, 2, 3, 4, 5]).unwrap();
        tos_finish(&mut context, b"second").unwrap();
        // 2 * finish + 11 bytes copied
        assert_eq!(context.get_compute_units_consumed(), 13);

        assert_eq!(tos_get_num_return_data(&mut context), Ok(2));

        let mut buffer = [0u8; 8];
        assert_eq!(tos_get_return_data(&mut context, 1, &mut buffer), Ok(6));
        assert_eq!(&buffer[..6], b"second");
    }

    #[test]
    fn test_get_return_data_truncates() {
        let mut context = context(10_000);
        tos_finish(&mut context, &[7u8; 10]).unwrap();

        let mut buffer = [0u8; 4];
        assert_eq!(tos_get_return_data(&mut context, 0, &mut buffer), Ok(10));
        assert_eq!(buffer, [7u8; 4]);
    }

    #[test]
    fn test_get_return_data_out_of_bounds() {
        let mut context = context(10_000);
        let mut buffer = [0u8; 4];
        assert_eq!(
            tos_get_return_data(&mut context, 3, &mut buffer),
            Err(SyscallError::IndexOutOfBounds(3))
        );
    }

    #[test]
    fn test_return_data_max_size() {
        let mut context = context(10_000);
        assert!(tos_finish(&mut context, &[0u8; 1024]).is_ok());
        assert_eq!(
            tos_finish(&mut context, &[0u8; 2000]),
            Err(SyscallError::ReturnDataTooLarge(2000, MAX_RETURN_DATA))
        );
    }

    #[test]
    fn test_clean_return_data() {
        let mut context = context(10_000);
        tos_finish(&mut context, b"x").unwrap();
        tos_clean_return_data(&mut context).unwrap();
        assert!(context.output().unwrap().return_data().is_empty());
    }
}
