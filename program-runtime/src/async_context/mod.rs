//! Async call orchestration for one frame
//!
//! A frame that issues async calls owns an [`AsyncContext`]. Calls are
//! registered into named groups while the contract runs. Once the contract
//! body returns, the host drives the context:
//!
//! ```text
//!   register_call ──► groups ──► execute
//!                                  │
//!                 ┌────────────────┼──────────────────┐
//!                 ▼                ▼                  ▼
//!        transfer-only      local call +       cross-shard call
//!        (resolved in       callback           (sent, context
//!         place)            (same tx)           persisted)
//!                 │                │                  │
//!                 └───────► complete_child ◄──────────┘
//!                                  │      (resume_cross_shard_call)
//!                     group done ──┤
//!                                  ▼
//!                      group callback, then context
//!                      callback once every group is done
//! ```

mod callback;
mod completion;
mod cross_shard;
mod local;

pub use callback::{callback_arguments, compute_call_value, compute_gas_limit_for_callback};

use crate::{
    async_call::{AsyncCall, AsyncCallExecutionMode, AsyncCallRequest, CorrelationId},
    async_group::AsyncCallGroup,
    engine::DestinationEngine,
    error::{Result, TosVmError},
    events::AsyncEvent,
    invoke_context::InvokeContext,
    types::Address,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Storage key prefix of persisted contexts
pub const ASYNC_CONTEXT_KEY_PREFIX: &[u8] = b"asyncCalls";

/// Position of a pending call inside its context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Continuation {
    group: String,
    index: usize,
}

/// Async calls issued by one frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncContext {
    caller: Address,
    owner: Address,
    call_value: u128,
    origin_tx_hash: [u8; 32],
    groups: IndexMap<String, AsyncCallGroup>,
    callback: String,
    callback_data: Vec<u8>,
    gas_accumulated: u64,
    continuations: BTreeMap<CorrelationId, Continuation>,
    call_counter: u64,
    finalized: bool,
}

impl AsyncContext {
    /// Creates an empty context
    ///
    /// # Arguments
    /// * `caller` - Caller of the frame owning the context
    /// * `owner` - Contract executing in that frame
    /// * `call_value` - Value the frame was called with
    /// * `origin_tx_hash` - Transaction in which the context was created
    pub fn new(caller: Address, owner: Address, call_value: u128, origin_tx_hash: [u8; 32]) -> Self {
        Self {
            caller,
            owner,
            call_value,
            origin_tx_hash,
            groups: IndexMap::new(),
            callback: String::new(),
            callback_data: Vec::new(),
            gas_accumulated: 0,
            continuations: BTreeMap::new(),
            call_counter: 0,
            finalized: false,
        }
    }

    /// Caller of the owning frame
    pub fn caller(&self) -> &Address {
        &self.caller
    }

    /// Contract owning the context
    pub fn owner(&self) -> &Address {
        &self.owner
    }

    /// Transaction in which the context was created
    pub fn origin_tx_hash(&self) -> &[u8; 32] {
        &self.origin_tx_hash
    }

    /// Groups in creation order
    pub fn groups(&self) -> impl Iterator<Item = &AsyncCallGroup> {
        self.groups.values()
    }

    /// Group by identifier
    pub fn group(&self, identifier: &str) -> Option<&AsyncCallGroup> {
        self.groups.get(identifier)
    }

    /// Context callback; empty if none
    pub fn callback(&self) -> &str {
        &self.callback
    }

    /// Gas gathered from completed groups and not yet handed back
    pub fn gas_accumulated(&self) -> u64 {
        self.gas_accumulated
    }

    /// Whether the context callback stage ran
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Whether every group completed
    pub fn is_complete(&self) -> bool {
        self.groups.values().all(AsyncCallGroup::is_complete)
    }

    /// Number of calls still waiting for completion
    pub fn pending_calls(&self) -> usize {
        self.continuations.len()
    }

    /// Call by correlation id
    pub fn call(&self, correlation_id: &CorrelationId) -> Result<&AsyncCall> {
        let continuation = self
            .continuations
            .get(correlation_id)
            .ok_or(TosVmError::UnknownCorrelationId(*correlation_id))?;
        self.groups
            .get(&continuation.group)
            .and_then(|group| group.calls.get(continuation.index))
            .ok_or(TosVmError::UnknownCorrelationId(*correlation_id))
    }

    fn call_mut(&mut self, correlation_id: &CorrelationId) -> Result<&mut AsyncCall> {
        let continuation = self
            .continuations
            .get(correlation_id)
            .ok_or(TosVmError::UnknownCorrelationId(*correlation_id))?;
        self.groups
            .get_mut(&continuation.group)
            .and_then(|group| group.calls.get_mut(continuation.index))
            .ok_or(TosVmError::UnknownCorrelationId(*correlation_id))
    }

    fn classify(&self, host: &InvokeContext, request: &AsyncCallRequest) -> AsyncCallExecutionMode {
        let wants_callback = !request.success_callback.is_empty() || !request.error_callback.is_empty();
        if !wants_callback {
            let transfer = host
                .codec()
                .parse_data(&request.data)
                .ok()
                .and_then(|(function, args)| {
                    host.transfer_recognizer()
                        .parse_transfer(&self.owner, &request.destination, &function, &args)
                });
            if transfer.is_some_and(|transfer| !transfer.has_chained_call()) {
                return AsyncCallExecutionMode::TokenTransferNoCallback;
            }
        }

        if host.shard_coordinator().same_shard(&self.owner, &request.destination) {
            AsyncCallExecutionMode::Local
        } else {
            AsyncCallExecutionMode::CrossShard
        }
    }

    /// Adds a call to `group_id`, creating the group on first use
    ///
    /// Deducts `gas_limit + gas_locked` from the current frame.
    pub fn register_call(
        &mut self,
        host: &mut InvokeContext,
        group_id: &str,
        request: AsyncCallRequest,
    ) -> Result<CorrelationId> {
        if group_id.is_empty() {
            return Err(TosVmError::InvalidGroupId);
        }
        if self.finalized || self.groups.get(group_id).is_some_and(AsyncCallGroup::is_complete) {
            return Err(TosVmError::GroupAlreadyComplete(group_id.to_string()));
        }

        let mode = self.classify(host, &request);
        host.metering_mut()
            .use_gas_for_async_call(request.gas_limit, request.gas_locked)?;

        let tx_hash = host.tx_hashes()?.current;
        let correlation_id = CorrelationId::derive(&self.owner, &tx_hash, self.call_counter);
        self.call_counter = self.call_counter.saturating_add(1);

        let event = AsyncEvent::CallRegistered {
            group: group_id.to_string(),
            correlation_id,
            destination: request.destination,
            mode,
            gas_limit: request.gas_limit,
            gas_locked: request.gas_locked,
        };

        let group = self
            .groups
            .entry(group_id.to_string())
            .or_insert_with(|| AsyncCallGroup::new(group_id));
        let index = group.add_call(AsyncCall::new(request, correlation_id, mode));
        self.continuations.insert(
            correlation_id,
            Continuation {
                group: group_id.to_string(),
                index,
            },
        );

        host.emit(event);
        Ok(correlation_id)
    }

    /// Sets the callback of an existing group, locking `gas_locked` for it
    ///
    /// Setting a callback again replaces the previous one and releases its
    /// reserve.
    pub fn set_group_callback(
        &mut self,
        host: &mut InvokeContext,
        group_id: &str,
        callback: &str,
        data: Vec<u8>,
        gas_locked: u64,
    ) -> Result<()> {
        let group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| TosVmError::AsyncCallGroupNotFound(group_id.to_string()))?;
        if group.completed {
            return Err(TosVmError::GroupAlreadyComplete(group_id.to_string()));
        }

        host.metering_mut().use_gas_for_async_call(0, gas_locked)?;
        host.metering_mut().restore_gas(group.gas_locked);

        group.callback = callback.to_string();
        group.callback_data = data;
        group.gas_locked = gas_locked;
        Ok(())
    }

    /// Sets the callback fired once every group completed
    pub fn set_context_callback(&mut self, callback: &str, data: Vec<u8>) {
        self.callback = callback.to_string();
        self.callback_data = data;
    }

    /// Resolves the calls registered by the owning frame
    ///
    /// Local and transfer-only calls run to completion here. Cross-shard
    /// calls are emitted as outbound transfers and the context is persisted
    /// until their results come back.
    pub fn execute(&mut self, host: &mut InvokeContext, engine: &mut dyn DestinationEngine) -> Result<()> {
        self.execute_async_local_calls(host, engine)?;
        if self.finalized {
            return Ok(());
        }
        if self.is_complete() {
            return self.finalize(host, engine);
        }
        self.send_cross_shard_calls(host, engine)
    }

    /// Storage key under which a context created in `tx_hash` is persisted
    pub fn storage_key(tx_hash: &[u8; 32]) -> Vec<u8> {
        [ASYNC_CONTEXT_KEY_PREFIX, tx_hash.as_slice()].concat()
    }

    /// Persists the context in the owner's storage
    pub fn save(&self, host: &mut InvokeContext) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        let cost = (bytes.len() as u64).saturating_mul(host.gas_schedule().persist_per_byte);
        host.metering_mut().use_gas(cost)?;
        host.storage_mut()
            .set(&self.owner, &Self::storage_key(&self.origin_tx_hash), &bytes)
    }

    /// Loads the context `owner` persisted in transaction `tx_hash`
    pub fn load(host: &InvokeContext, owner: &Address, tx_hash: &[u8; 32]) -> Result<Self> {
        let bytes = host
            .storage()
            .get(owner, &Self::storage_key(tx_hash))?
            .ok_or(TosVmError::AsyncContextNotFound)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    /// Removes the persisted copy of the context
    pub fn delete(&self, host: &mut InvokeContext) -> Result<bool> {
        host.storage_mut()
            .delete(&self.owner, &Self::storage_key(&self.origin_tx_hash))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::{
        config::Config,
        engine::DestinationResult,
        types::{ContractCallInput, VmOutput},
    };
    use std::collections::VecDeque;

    pub const OWNER: Address = [1u8; 32];
    pub const CALLER: Address = [9u8; 32];
    pub const DEST: Address = [2u8; 32];

    /// Engine replaying canned outputs and recording every input it gets
    #[derive(Default)]
    pub struct ScriptedEngine {
        pub inputs: Vec<ContractCallInput>,
        pub outputs: VecDeque<DestinationResult>,
    }

    impl ScriptedEngine {
        pub fn returning(outputs: Vec<DestinationResult>) -> Self {
            Self {
                inputs: Vec::new(),
                outputs: outputs.into(),
            }
        }
    }

    impl DestinationEngine for ScriptedEngine {
        fn execute_on_dest_context(&mut self, host: &mut InvokeContext, input: ContractCallInput) -> DestinationResult {
            host.metering_mut().use_gas(input.gas_provided).unwrap();
            self.inputs.push(input);
            let result = self
                .outputs
                .pop_front()
                .unwrap_or_else(|| DestinationResult::finished(VmOutput::ok(Vec::new(), 0), true));
            if let Some(output) = &result.output {
                host.metering_mut().restore_gas(output.gas_remaining);
            }
            result
        }
    }

    pub fn host(gas: u64) -> InvokeContext {
        let mut host = InvokeContext::new(Config::test());
        host.push_frame(ContractCallInput::direct(CALLER, OWNER, "main", gas));
        host
    }

    pub fn request(data: &[u8], gas_limit: u64, gas_locked: u64, callback: &str) -> AsyncCallRequest {
        AsyncCallRequest {
            destination: DEST,
            data: data.to_vec(),
            gas_limit,
            gas_locked,
            success_callback: callback.to_string(),
            error_callback: callback.to_string(),
            ..Default::default()
        }
    }

    pub fn context() -> AsyncContext {
        AsyncContext::new(CALLER, OWNER, 0, [0u8; 32])
    }
}
