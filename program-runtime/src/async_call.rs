//! Asynchronous call records

use crate::types::{Address, ReturnCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifier matching an async call with its completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId([u8; 32]);

impl CorrelationId {
    /// Derives the id of the `counter`-th call registered by `owner` in transaction `tx_hash`
    pub fn derive(owner: &Address, tx_hash: &[u8; 32], counter: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(owner);
        hasher.update(tx_hash);
        hasher.update(counter.to_be_bytes());
        Self(hasher.finalize().into())
    }

    /// Raw bytes of the id
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for CorrelationId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for CorrelationId {
    type Error = std::array::TryFromSliceError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(bytes.try_into()?))
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

/// Resolution state of an async call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsyncCallStatus {
    /// Not resolved yet
    Pending,
    /// Destination returned successfully
    Resolved,
    /// Destination failed or the call could not be dispatched
    Rejected,
}

/// How an async call gets resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsyncCallExecutionMode {
    /// Destination is in this partition; executed synchronously
    Local,
    /// Destination is in another partition; resolved by a later transaction
    CrossShard,
    /// Plain token transfer whose result nobody waits for
    TokenTransferNoCallback,
}

/// Parameters of a call a contract wants to issue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsyncCallRequest {
    /// Destination contract
    pub destination: Address,
    /// Encoded function and arguments
    pub data: Vec<u8>,
    /// Value sent with the call
    pub value: u128,
    /// Gas reserved for the destination
    pub gas_limit: u64,
    /// Gas reserved for the callback
    pub gas_locked: u64,
    /// Callback run when the destination succeeds
    pub success_callback: String,
    /// Callback run when the destination fails
    pub error_callback: String,
}

/// One outbound call and its resolution state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncCall {
    pub(crate) correlation_id: CorrelationId,
    pub(crate) status: AsyncCallStatus,
    pub(crate) execution_mode: AsyncCallExecutionMode,
    pub(crate) destination: Address,
    pub(crate) data: Vec<u8>,
    pub(crate) value: u128,
    pub(crate) gas_limit: u64,
    pub(crate) gas_locked: u64,
    pub(crate) success_callback: String,
    pub(crate) error_callback: String,
}

impl AsyncCall {
    pub(crate) fn new(
        request: AsyncCallRequest,
        correlation_id: CorrelationId,
        execution_mode: AsyncCallExecutionMode,
    ) -> Self {
        Self {
            correlation_id,
            status: AsyncCallStatus::Pending,
            execution_mode,
            destination: request.destination,
            data: request.data,
            value: request.value,
            gas_limit: request.gas_limit,
            gas_locked: request.gas_locked,
            success_callback: request.success_callback,
            error_callback: request.error_callback,
        }
    }

    /// Id matching the call with its completion
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Resolution state
    pub fn status(&self) -> AsyncCallStatus {
        self.status
    }

    /// How the call is resolved
    pub fn execution_mode(&self) -> AsyncCallExecutionMode {
        self.execution_mode
    }

    /// Destination contract
    pub fn destination(&self) -> &Address {
        &self.destination
    }

    /// Encoded function and arguments
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Value sent with the call
    pub fn value(&self) -> u128 {
        self.value
    }

    /// Gas reserved for the destination
    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// Gas reserved for the callback
    pub fn gas_locked(&self) -> u64 {
        self.gas_locked
    }

    /// Whether the call is resolved within the current transaction
    pub fn is_local(&self) -> bool {
        matches!(
            self.execution_mode,
            AsyncCallExecutionMode::Local | AsyncCallExecutionMode::TokenTransferNoCallback
        )
    }

    /// Whether the call still waits for its destination
    pub fn is_pending(&self) -> bool {
        self.status == AsyncCallStatus::Pending
    }

    /// Callback matching the current status
    pub fn callback_name(&self) -> &str {
        match self.status {
            AsyncCallStatus::Rejected => &self.error_callback,
            _ => &self.success_callback,
        }
    }

    /// Whether a callback must run for the current status
    pub fn has_callback(&self) -> bool {
        !self.callback_name().is_empty()
    }

    /// Whether any callback was requested at all
    pub fn wants_callback(&self) -> bool {
        !self.success_callback.is_empty() || !self.error_callback.is_empty()
    }

    /// Sets the status from a destination return code
    pub fn update_status(&mut self, return_code: ReturnCode) {
        self.status = if return_code.is_ok() {
            AsyncCallStatus::Resolved
        } else {
            AsyncCallStatus::Rejected
        };
    }

    /// Marks the call rejected without a destination result
    pub fn reject(&mut self) {
        self.status = AsyncCallStatus::Rejected;
    }
}
