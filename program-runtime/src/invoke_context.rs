//! Program invocation context for TOS VM
//!
//! This module provides the host state shared by every frame of one
//! transaction: the frame stack with each frame's input, output and async
//! context, the gas ledger, and the pluggable collaborators (storage, shard
//! placement, call data codec, transfer recognizer, event observer).

use crate::{
    async_call::{AsyncCallRequest, CorrelationId},
    async_context::AsyncContext,
    codec::{CallArgsParser, CallDataCodec},
    config::{Config, GasSchedule},
    error::{Result, TosVmError},
    events::{AsyncEvent, AsyncObserver, LogObserver},
    metering::Metering,
    output::OutputContext,
    shard::{ShardCoordinator, SingleShard},
    storage::{NoOpStorage, StorageProvider},
    transfer::{BuiltinTransferParser, TransferRecognizer},
    types::{Address, CallType, ContractCallInput, TxHashChain},
};

/// One entry of the frame stack
#[derive(Debug)]
pub struct Frame {
    input: ContractCallInput,
    output: OutputContext,
    async_context: Option<AsyncContext>,
}

impl Frame {
    fn new(input: ContractCallInput) -> Self {
        Self {
            input,
            output: OutputContext::new(),
            async_context: None,
        }
    }

    /// Input the frame was entered with
    pub fn input(&self) -> &ContractCallInput {
        &self.input
    }

    /// Output accumulated by the frame
    pub fn output(&self) -> &OutputContext {
        &self.output
    }

    /// Consumes the frame into its output
    pub fn into_output(self) -> OutputContext {
        self.output
    }
}

/// Program invocation context
///
/// This is the main execution context for TOS contracts. Host functions
/// reach the current frame through it, and the async call orchestrator uses
/// it to move gas and outputs between frames.
pub struct InvokeContext {
    // === Configuration ===
    config: Config,

    // === Compute Budget Tracking ===
    metering: Metering,

    // === Frames ===
    frames: Vec<Frame>,

    // === Collaborators ===
    storage: Box<dyn StorageProvider>,
    shard_coordinator: Box<dyn ShardCoordinator>,
    codec: Box<dyn CallDataCodec>,
    transfer_recognizer: Box<dyn TransferRecognizer>,
    observer: Box<dyn AsyncObserver>,

    // === Debug and Logging ===
    /// Debug mode (enables tos_log syscall output)
    pub debug_mode: bool,
}

impl InvokeContext {
    /// Creates a new invocation context
    ///
    /// # Arguments
    /// * `config` - Gas schedule and host limits
    ///
    /// # Returns
    /// A context with no frames, no-op storage, a single shard and the
    /// built-in codec, transfer recognizer and log observer
    pub fn new(config: Config) -> Self {
        let metering = Metering::new(config.gas_schedule.clone());
        Self {
            config,
            metering,
            frames: Vec::new(),
            storage: Box::new(NoOpStorage),
            shard_coordinator: Box::new(SingleShard),
            codec: Box::new(CallArgsParser::new()),
            transfer_recognizer: Box::new(BuiltinTransferParser),
            observer: Box::new(LogObserver),
            debug_mode: false,
        }
    }

    /// Replaces the storage provider
    pub fn with_storage(mut self, storage: Box<dyn StorageProvider>) -> Self {
        self.storage = storage;
        self
    }

    /// Replaces the shard coordinator
    pub fn with_shard_coordinator(mut self, shard_coordinator: Box<dyn ShardCoordinator>) -> Self {
        self.shard_coordinator = shard_coordinator;
        self
    }

    /// Replaces the call data codec
    pub fn with_codec(mut self, codec: Box<dyn CallDataCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replaces the transfer recognizer
    pub fn with_transfer_recognizer(mut self, transfer_recognizer: Box<dyn TransferRecognizer>) -> Self {
        self.transfer_recognizer = transfer_recognizer;
        self
    }

    /// Replaces the event observer
    pub fn with_observer(mut self, observer: Box<dyn AsyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Enable debug mode (allows tos_log syscall to produce output)
    pub fn enable_debug(&mut self) {
        self.debug_mode = true;
    }

    /// Host configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Gas schedule in force
    pub fn gas_schedule(&self) -> &GasSchedule {
        &self.config.gas_schedule
    }

    /// Gas ledger
    pub fn metering(&self) -> &Metering {
        &self.metering
    }

    /// Mutable gas ledger
    pub fn metering_mut(&mut self) -> &mut Metering {
        &mut self.metering
    }

    /// Storage provider
    pub fn storage(&self) -> &dyn StorageProvider {
        self.storage.as_ref()
    }

    /// Mutable storage provider
    pub fn storage_mut(&mut self) -> &mut dyn StorageProvider {
        self.storage.as_mut()
    }

    /// Shard coordinator
    pub fn shard_coordinator(&self) -> &dyn ShardCoordinator {
        self.shard_coordinator.as_ref()
    }

    /// Call data codec
    pub fn codec(&self) -> &dyn CallDataCodec {
        self.codec.as_ref()
    }

    /// Transfer recognizer
    pub fn transfer_recognizer(&self) -> &dyn TransferRecognizer {
        self.transfer_recognizer.as_ref()
    }

    /// Forwards an event to the observer
    pub fn emit(&mut self, event: AsyncEvent) {
        self.observer.on_event(&event);
    }

    // === Frame Stack ===

    /// Number of active frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Enters a frame for `input`, provided with `input.gas_provided`
    pub fn push_frame(&mut self, input: ContractCallInput) {
        self.metering.push_frame(input.gas_provided);
        self.frames.push(Frame::new(input));
    }

    /// Leaves the current frame
    ///
    /// # Returns
    /// The frame and the gas it hands back to its caller
    pub fn pop_frame(&mut self) -> Result<(Frame, u64)> {
        let frame = self.frames.pop().ok_or(TosVmError::NoActiveFrame)?;
        let gas_remaining = self.metering.pop_frame()?;
        Ok((frame, gas_remaining))
    }

    /// Current frame
    pub fn current_frame(&self) -> Result<&Frame> {
        self.frames.last().ok_or(TosVmError::NoActiveFrame)
    }

    fn current_frame_mut(&mut self) -> Result<&mut Frame> {
        self.frames.last_mut().ok_or(TosVmError::NoActiveFrame)
    }

    /// Input of the current frame
    pub fn input(&self) -> Result<&ContractCallInput> {
        Ok(&self.current_frame()?.input)
    }

    /// Address of the contract executing in the current frame
    pub fn contract_address(&self) -> Result<Address> {
        Ok(self.input()?.recipient)
    }

    /// Caller of record of the current frame
    pub fn caller(&self) -> Result<Address> {
        Ok(self.input()?.caller)
    }

    /// Value sent with the current frame
    pub fn call_value(&self) -> Result<u128> {
        Ok(self.input()?.call_value)
    }

    /// Kind of call that entered the current frame
    pub fn call_type(&self) -> Result<CallType> {
        Ok(self.input()?.call_type)
    }

    /// Transaction hashes of the current frame
    pub fn tx_hashes(&self) -> Result<&TxHashChain> {
        Ok(&self.input()?.tx_hashes)
    }

    /// Output of the current frame
    pub fn output(&self) -> Result<&OutputContext> {
        Ok(&self.current_frame()?.output)
    }

    /// Mutable output of the current frame
    pub fn output_mut(&mut self) -> Result<&mut OutputContext> {
        Ok(&mut self.current_frame_mut()?.output)
    }

    // === Async Calls ===

    /// Async context of the current frame, if the frame issued any call
    pub fn async_context(&self) -> Option<&AsyncContext> {
        self.frames.last().and_then(|frame| frame.async_context.as_ref())
    }

    /// Detaches the current frame's async context
    ///
    /// The orchestrator needs the host and the context mutably at the same
    /// time, so the context is taken out while it runs and put back with
    /// [`InvokeContext::restore_async_context`].
    pub fn take_async_context(&mut self) -> Result<Option<AsyncContext>> {
        Ok(self.current_frame_mut()?.async_context.take())
    }

    /// Reattaches an async context to the current frame
    pub fn restore_async_context(&mut self, context: AsyncContext) -> Result<()> {
        self.current_frame_mut()?.async_context = Some(context);
        Ok(())
    }

    fn take_or_create_async_context(&mut self) -> Result<AsyncContext> {
        match self.take_async_context()? {
            Some(context) => Ok(context),
            None => {
                let input = self.input()?;
                Ok(AsyncContext::new(
                    input.caller,
                    input.recipient,
                    input.call_value,
                    input.tx_hashes.current,
                ))
            }
        }
    }

    fn with_async_context<T>(
        &mut self,
        f: impl FnOnce(&mut AsyncContext, &mut Self) -> Result<T>,
    ) -> Result<T> {
        let mut context = self.take_or_create_async_context()?;
        let result = f(&mut context, self);
        self.restore_async_context(context)?;
        result
    }

    /// Registers an async call from the current frame
    ///
    /// # Arguments
    /// * `group_id` - Group the call joins (created on first use)
    /// * `request` - Destination, payload, gas and callbacks of the call
    ///
    /// # Returns
    /// The correlation id assigned to the call
    pub fn register_async_call(&mut self, group_id: &str, request: AsyncCallRequest) -> Result<CorrelationId> {
        self.with_async_context(|context, host| context.register_call(host, group_id, request))
    }

    /// Sets the callback fired once every call of `group_id` completed
    pub fn set_async_group_callback(
        &mut self,
        group_id: &str,
        callback: &str,
        data: Vec<u8>,
        gas_locked: u64,
    ) -> Result<()> {
        self.with_async_context(|context, host| {
            context.set_group_callback(host, group_id, callback, data, gas_locked)
        })
    }

    /// Sets the callback fired once every group of the current frame completed
    pub fn set_async_context_callback(&mut self, callback: &str, data: Vec<u8>) -> Result<()> {
        self.with_async_context(|context, _| {
            context.set_context_callback(callback, data);
            Ok(())
        })
    }

    // === Compute Budget ===

    /// Get the compute budget of the current frame
    pub fn get_compute_budget(&self) -> u64 {
        self.metering.gas_provided()
    }

    /// Get compute units consumed so far by the current frame
    pub fn get_compute_units_consumed(&self) -> u64 {
        self.metering.gas_used()
    }

    /// Get remaining compute units of the current frame
    pub fn get_remaining(&self) -> u64 {
        self.metering.gas_left()
    }

    /// Consume compute units with checked arithmetic
    ///
    /// Returns an error if not enough compute units remain.
    pub fn consume_checked(&mut self, amount: u64) -> Result<()> {
        self.metering.use_gas(amount)
    }

    /// Consume compute units, saturating at the frame's budget
    pub fn consume(&mut self, amount: u64) {
        self.metering.consume(amount);
    }

    // === Storage Methods ===

    /// Load data from the current contract's storage
    ///
    /// # Arguments
    /// * `key` - Storage key
    ///
    /// # Returns
    /// Storage value if exists, None otherwise
    pub fn get_storage(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let contract = self.contract_address()?;
        self.storage.get(&contract, key)
    }

    /// Store data to the current contract's storage
    ///
    /// # Arguments
    /// * `key` - Storage key
    /// * `value` - Storage value
    pub fn set_storage(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let contract = self.contract_address()?;
        self.storage.set(&contract, key, value)
    }

    /// Delete a key from the current contract's storage
    pub fn delete_storage(&mut self, key: &[u8]) -> Result<bool> {
        let contract = self.contract_address()?;
        self.storage.delete(&contract, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{events::RecordingObserver, storage::InMemoryStorage};

    fn context_with_frame(gas: u64) -> InvokeContext {
        let mut context = InvokeContext::new(Config::test());
        context.push_frame(ContractCallInput::direct([9u8; 32], [1u8; 32], "main", gas));
        context
    }

    #[test]
    fn test_invoke_context_creation() {
        let context = context_with_frame(100_000);
        assert_eq!(context.get_compute_budget(), 100_000);
        assert_eq!(context.get_remaining(), 100_000);
        assert_eq!(context.get_compute_units_consumed(), 0);
        assert_eq!(context.contract_address().unwrap(), [1u8; 32]);
        assert_eq!(context.caller().unwrap(), [9u8; 32]);
        assert_eq!(context.depth(), 1);
    }

    #[test]
    fn test_compute_consumption() {
        let mut context = context_with_frame(100_000);

        // Consume some units
        context.consume(30_000);
        assert_eq!(context.get_remaining(), 70_000);
        assert_eq!(context.get_compute_units_consumed(), 30_000);

        // Consume more
        context.consume(20_000);
        assert_eq!(context.get_remaining(), 50_000);
        assert_eq!(context.get_compute_units_consumed(), 50_000);
    }

    #[test]
    fn test_consume_checked() {
        let mut context = context_with_frame(100);

        // Should succeed
        assert!(context.consume_checked(50).is_ok());
        assert_eq!(context.get_remaining(), 50);

        // Should fail - not enough units
        assert_eq!(context.consume_checked(100), Err(TosVmError::NotEnoughGas));
        assert_eq!(context.get_remaining(), 50); // Unchanged

        // Should succeed with exact remaining amount
        assert!(context.consume_checked(50).is_ok());
        assert_eq!(context.get_remaining(), 0);
    }

    #[test]
    fn test_debug_mode() {
        let mut context = InvokeContext::new(Config::test());
        assert!(!context.debug_mode);

        context.enable_debug();
        assert!(context.debug_mode);
    }

    #[test]
    fn test_no_frame() {
        let mut context = InvokeContext::new(Config::test());
        assert_eq!(context.contract_address(), Err(TosVmError::NoActiveFrame));
        assert!(context.output_mut().is_err());
        assert!(context.pop_frame().is_err());
        assert!(context.async_context().is_none());
    }

    #[test]
    fn test_pop_frame_returns_remaining_gas() {
        let mut context = context_with_frame(1_000);
        context.output_mut().unwrap().finish(b"done".to_vec());
        context.consume(400);

        let (frame, gas_remaining) = context.pop_frame().unwrap();
        assert_eq!(gas_remaining, 600);
        assert_eq!(frame.output().return_data(), &[b"done".to_vec()]);
        assert_eq!(context.depth(), 0);
    }

    #[test]
    fn test_storage_scoped_to_current_contract() {
        let mut context = InvokeContext::new(Config::test()).with_storage(Box::new(InMemoryStorage::new()));
        context.push_frame(ContractCallInput::direct([9u8; 32], [1u8; 32], "main", 10));
        context.set_storage(b"k", b"v").unwrap();
        assert_eq!(context.get_storage(b"k").unwrap(), Some(b"v".to_vec()));

        context.push_frame(ContractCallInput::direct([1u8; 32], [2u8; 32], "other", 10));
        assert_eq!(context.get_storage(b"k").unwrap(), None);
        context.pop_frame().unwrap();

        assert!(context.delete_storage(b"k").unwrap());
        assert_eq!(context.storage().get(&[1u8; 32], b"k").unwrap(), None);
    }

    #[test]
    fn test_register_creates_async_context_once() {
        let recorder = RecordingObserver::new();
        let mut context = InvokeContext::new(Config::test()).with_observer(Box::new(recorder.clone()));
        context.push_frame(ContractCallInput::direct([9u8; 32], [1u8; 32], "main", 10_000));

        let request = AsyncCallRequest {
            destination: [2u8; 32],
            data: b"ping".to_vec(),
            gas_limit: 1_000,
            gas_locked: 200,
            success_callback: "onPing".into(),
            ..Default::default()
        };
        let first = context.register_async_call("g", request.clone()).unwrap();
        let second = context.register_async_call("g", request).unwrap();
        assert_ne!(first, second);
        assert_eq!(context.get_remaining(), 10_000 - 2 * 1_200);

        let async_context = context.async_context().unwrap();
        assert_eq!(async_context.owner(), &[1u8; 32]);
        assert_eq!(async_context.group("g").unwrap().calls().len(), 2);
        assert_eq!(recorder.events().len(), 2);
    }

    #[test]
    fn test_group_callback_requires_group() {
        let mut context = context_with_frame(10_000);
        assert_eq!(
            context.set_async_group_callback("missing", "done", Vec::new(), 0),
            Err(TosVmError::AsyncCallGroupNotFound("missing".into()))
        );
        // The context was still created and kept for the frame
        assert!(context.async_context().is_some());

        context.set_async_context_callback("allDone", b"x".to_vec()).unwrap();
        assert_eq!(context.async_context().unwrap().callback(), "allDone");
    }
}
