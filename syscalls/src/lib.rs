//! TOS Syscalls
//!
//! This crate provides the host functions contracts call while they run.
//! They let a contract log, publish results, access its storage, transfer
//! value, and issue asynchronous calls to other contracts.
//!
//! # Architecture
//!
//! Every syscall is a plain function that:
//!
//! 1. Takes `InvokeContext` as first parameter for host state access
//! 2. Takes its inputs as byte slices or integers already copied out of
//!    contract memory by the interpreter
//! 3. Charges the gas schedule before touching any state
//! 4. Returns `Result<_, SyscallError>` with a per-module error type
//!
//! # Available Syscalls
//!
//! ## Logging
//! - `tos_log` - Output a debug message (only in debug mode)
//!
//! ## Return Data
//! - `tos_finish` - Append to the finish buffer
//! - `tos_get_num_return_data` - Count finish buffer entries
//! - `tos_get_return_data` - Copy one finish buffer entry
//! - `tos_clean_return_data` - Empty the finish buffer
//!
//! ## Storage
//! - `tos_storage_read` - Read from contract storage
//! - `tos_storage_write` - Write to contract storage
//! - `tos_storage_delete` - Delete from contract storage
//!
//! ## Transfers
//! - `tos_transfer_value` - Send value to an account
//!
//! ## Async Calls
//! - `tos_create_async_call` - Register a call in a group
//! - `tos_set_async_group_callback` - Callback for a whole group
//! - `tos_set_async_context_callback` - Callback once every group completed
//!
//! # Usage
//!
//! ```rust,ignore
//! use tos_program_runtime::InvokeContext;
//! use tos_syscalls::{async_call, return_data};
//!
//! fn swap(host: &mut InvokeContext) -> Result<(), Box<dyn std::error::Error>> {
//!     async_call::tos_create_async_call(
//!         host, b"swap", &pool, 0, b"swap@01", b"onSwap", b"onSwapFailed", 50_000, 10_000,
//!     )?;
//!     return_data::tos_finish(host, b"pending")?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(clippy::arithmetic_side_effects)]

/// Lets contract code propagate a module's `SyscallError` with `?`
macro_rules! contract_error_from_syscall {
    () => {
        impl From<SyscallError> for tos_program_runtime::ContractError {
            fn from(err: SyscallError) -> Self {
                let code = match err {
                    SyscallError::OutOfComputeUnits => tos_program_runtime::ReturnCode::OutOfGas,
                    _ => tos_program_runtime::ReturnCode::ExecutionFailed,
                };
                tos_program_runtime::ContractError::new(code, err.to_string())
            }
        }
    };
}

pub mod async_call;
pub mod logging;
pub mod return_data;
pub mod storage;
pub mod transfer;

pub use async_call::{tos_create_async_call, tos_set_async_context_callback, tos_set_async_group_callback};
pub use logging::tos_log;
pub use return_data::{tos_clean_return_data, tos_finish, tos_get_num_return_data, tos_get_return_data};
pub use storage::{tos_storage_delete, tos_storage_read, tos_storage_write};
pub use transfer::tos_transfer_value;
