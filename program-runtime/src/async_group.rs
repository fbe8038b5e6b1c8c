//! Groups of async calls sharing one completion callback

use crate::async_call::AsyncCall;
use serde::{Deserialize, Serialize};

/// Calls that complete together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncCallGroup {
    pub(crate) identifier: String,
    pub(crate) calls: Vec<AsyncCall>,
    pub(crate) callback: String,
    pub(crate) callback_data: Vec<u8>,
    pub(crate) gas_locked: u64,
    pub(crate) pending: usize,
    pub(crate) carried_gas: u64,
    pub(crate) completed: bool,
}

impl AsyncCallGroup {
    pub(crate) fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            calls: Vec::new(),
            callback: String::new(),
            callback_data: Vec::new(),
            gas_locked: 0,
            pending: 0,
            carried_gas: 0,
            completed: false,
        }
    }

    /// Name the group was registered under
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Calls in registration order
    pub fn calls(&self) -> &[AsyncCall] {
        &self.calls
    }

    /// Group callback; empty if none
    pub fn callback(&self) -> &str {
        &self.callback
    }

    /// Argument handed to the group callback
    pub fn callback_data(&self) -> &[u8] {
        &self.callback_data
    }

    /// Whether a group callback was set
    pub fn has_callback(&self) -> bool {
        !self.callback.is_empty()
    }

    /// Gas reserved for the group callback
    pub fn gas_locked(&self) -> u64 {
        self.gas_locked
    }

    /// Calls not completed yet
    pub fn pending_count(&self) -> usize {
        self.pending
    }

    /// Leftover gas carried in from completed calls
    pub fn carried_gas(&self) -> u64 {
        self.carried_gas
    }

    /// Whether the group has finished and fired its callback
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub(crate) fn add_call(&mut self, call: AsyncCall) -> usize {
        self.calls.push(call);
        self.pending = self.pending.saturating_add(1);
        self.calls.len().saturating_sub(1)
    }

    /// Marks one call complete; returns the number of calls still pending
    pub(crate) fn complete_call(&mut self, leftover_gas: u64) -> usize {
        self.pending = self.pending.saturating_sub(1);
        self.carried_gas = self.carried_gas.saturating_add(leftover_gas);
        self.pending
    }
}
