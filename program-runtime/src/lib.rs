//! TOS Program Runtime
//!
//! This crate provides the host side of contract execution on the TOS
//! blockchain: the frame stack, gas accounting, and the asynchronous
//! cross-contract call engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          TOS Blockchain                 │
//! │  (transaction verification/execution)   │
//! └────────────────┬────────────────────────┘
//!                  │
//!                  │ create InvokeContext
//!                  │ execute_transaction
//!                  ▼
//! ┌─────────────────────────────────────────┐
//! │    tos-program-runtime (this crate)     │
//! │  ┌─────────────────────────────────┐    │
//! │  │    InvokeContext                │    │
//! │  │  - Frame stack and outputs      │    │
//! │  │  - Gas metering                 │    │
//! │  │  - Storage access               │    │
//! │  └─────────────────────────────────┘    │
//! │  ┌─────────────────────────────────┐    │
//! │  │    AsyncContext                 │    │
//! │  │  - Call groups and callbacks    │    │
//! │  │  - Gas locking protocol         │    │
//! │  │  - Cross-shard persistence      │    │
//! │  └─────────────────────────────────┘    │
//! │  ┌─────────────────────────────────┐    │
//! │  │    HostEngine                   │    │
//! │  │  - Enters and leaves frames     │    │
//! │  │  - Drives frame async calls     │    │
//! │  └─────────────────────────────────┘    │
//! └─────────────────────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │         tos-syscalls (separate)         │
//! │  - tos_log, tos_create_async_call, ...  │
//! └─────────────────────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │      ContractExecutor (interpreter)     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use tos_program_runtime::{Config, ContractCallInput, HostEngine, InvokeContext};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1. Create the host
//!     let mut host = InvokeContext::new(Config::default())
//!         .with_storage(Box::new(chain_storage));
//!
//!     // 2. Wrap the contract interpreter
//!     let mut engine = HostEngine::new(interpreter);
//!
//!     // 3. Execute; async calls issued by the contract are resolved before
//!     //    the output is returned
//!     let input = ContractCallInput::direct(sender, contract, "swap", 5_000_000);
//!     let output = engine.execute_transaction(&mut host, input)?;
//!     println!("gas left: {}", output.gas_remaining);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(clippy::arithmetic_side_effects)]

pub mod async_call;
pub mod async_context;
pub mod async_group;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod invoke_context;
pub mod metering;
pub mod output;
pub mod shard;
pub mod storage;
pub mod transfer;
pub mod types;

// Re-export main types
pub use async_call::{AsyncCall, AsyncCallExecutionMode, AsyncCallRequest, AsyncCallStatus, CorrelationId};
pub use async_context::AsyncContext;
pub use async_group::AsyncCallGroup;
pub use codec::{CallArgsParser, CallDataCodec};
pub use config::{Config, GasSchedule};
pub use engine::{ContractExecutor, DestinationEngine, DestinationResult, HostEngine};
pub use error::{Result, TosVmError};
pub use events::{AsyncEvent, AsyncObserver, LogObserver, RecordingObserver};
pub use invoke_context::InvokeContext;
pub use shard::{ShardCoordinator, ShardMask, SingleShard};
pub use storage::{InMemoryStorage, NoOpStorage, StorageProvider};
pub use transfer::{BuiltinTransferParser, TransferRecognizer};
pub use types::{Address, CallType, ContractCallInput, ContractError, ReturnCode, VmOutput};
