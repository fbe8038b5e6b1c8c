//! Scripted contract worlds
//!
//! [`MockWorld`] stands in for the contract interpreter: each deployed
//! contract is a table of Rust closures that call the TOS syscalls on the
//! host they are given. Every input the world runs is recorded so tests can
//! check what the async engine dispatched, in which order and with how much
//! gas.

use std::collections::HashMap;
use tos_program_runtime::{
    Address, Config, ContractCallInput, ContractError, ContractExecutor, HostEngine, InMemoryStorage,
    InvokeContext, RecordingObserver, ReturnCode, ShardMask,
};

/// Function body of a scripted contract
pub type Handler = Box<dyn FnMut(&mut InvokeContext, &ContractCallInput) -> Result<(), ContractError>>;

#[derive(Default)]
struct MockContract {
    code_size: usize,
    functions: HashMap<String, Handler>,
}

/// Contracts made of closures
#[derive(Default)]
pub struct MockWorld {
    contracts: HashMap<Address, MockContract>,
    calls: Vec<ContractCallInput>,
}

impl MockWorld {
    /// Creates an empty world
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploys an empty contract with `code_size` bytes of code
    pub fn deploy(mut self, address: Address, code_size: usize) -> Self {
        self.contracts.entry(address).or_default().code_size = code_size;
        self
    }

    /// Adds `function` to the contract at `address`, deploying it if needed
    pub fn function<F>(mut self, address: Address, function: &str, handler: F) -> Self
    where
        F: FnMut(&mut InvokeContext, &ContractCallInput) -> Result<(), ContractError> + 'static,
    {
        self.contracts
            .entry(address)
            .or_default()
            .functions
            .insert(function.to_string(), Box::new(handler));
        self
    }

    /// Adds a function that does nothing
    pub fn noop(self, address: Address, function: &str) -> Self {
        self.function(address, function, |_, _| Ok(()))
    }

    /// Every input run so far, in execution order
    pub fn calls(&self) -> &[ContractCallInput] {
        &self.calls
    }

    /// Inputs that invoked `function`
    pub fn calls_to(&self, function: &str) -> Vec<&ContractCallInput> {
        self.calls.iter().filter(|input| input.function == function).collect()
    }
}

impl ContractExecutor for MockWorld {
    fn code_size(&self, address: &Address) -> Option<usize> {
        self.contracts.get(address).map(|contract| contract.code_size)
    }

    fn run(&mut self, host: &mut InvokeContext, input: &ContractCallInput) -> Result<(), ContractError> {
        self.calls.push(input.clone());
        log::trace!("running {} with {} arguments", input.function, input.arguments.len());

        let handler = self
            .contracts
            .get_mut(&input.recipient)
            .and_then(|contract| contract.functions.get_mut(&input.function))
            .ok_or_else(|| ContractError::new(ReturnCode::FunctionNotFound, input.function.clone()))?;
        handler(host, input)
    }
}

/// Host wired for tests: in-memory storage, `num_shards` partitions and a
/// recorder for async events
pub fn test_host(config: Config, num_shards: u32) -> (InvokeContext, RecordingObserver) {
    let recorder = RecordingObserver::new();
    let host = InvokeContext::new(config)
        .with_storage(Box::new(InMemoryStorage::new()))
        .with_shard_coordinator(Box::new(ShardMask::new(num_shards)))
        .with_observer(Box::new(recorder.clone()));
    (host, recorder)
}

/// Engine running `world`
pub fn engine(world: MockWorld) -> HostEngine<MockWorld> {
    HostEngine::new(world)
}

/// Routes `log` output to the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
