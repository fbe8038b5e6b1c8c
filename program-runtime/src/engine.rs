//! Frame execution
//!
//! The async orchestrator never runs contract code itself. It hands prepared
//! inputs to a [`DestinationEngine`], which enters a new frame, runs the
//! contract, drives the frame's own async calls, and folds the result back
//! into the caller.
//!
//! [`HostEngine`] is the engine used by the host. Contract code is supplied
//! through the [`ContractExecutor`] seam, so the interpreter stays outside
//! this crate.

use crate::{
    error::{Result, TosVmError},
    invoke_context::InvokeContext,
    types::{Address, ContractCallInput, ContractError, ReturnCode, VmOutput},
};

/// Outcome of executing one input in a new frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationResult {
    /// Frame output; `None` only on protocol failures
    pub output: Option<VmOutput>,
    /// Whether the frame resolved all of its own async calls
    pub complete: bool,
    /// Error raised while entering or driving the frame
    pub error: Option<TosVmError>,
}

impl DestinationResult {
    /// Finished frame
    pub fn finished(output: VmOutput, complete: bool) -> Self {
        Self {
            output: Some(output),
            complete,
            error: None,
        }
    }

    /// Frame that failed with `error` but still produced an output
    pub fn rejected(output: VmOutput, error: TosVmError) -> Self {
        Self {
            output: Some(output),
            complete: true,
            error: Some(error),
        }
    }

    /// Frame aborted by a protocol failure
    pub fn aborted(error: TosVmError) -> Self {
        Self {
            output: None,
            complete: true,
            error: Some(error),
        }
    }

    /// The fatal error carried by the result, if any
    pub fn fatal_error(&self) -> Option<&TosVmError> {
        self.error.as_ref().filter(|err| err.is_fatal())
    }
}

/// Executes prepared inputs in new frames
pub trait DestinationEngine {
    /// Runs `input` in a new frame on top of the current one
    fn execute_on_dest_context(&mut self, host: &mut InvokeContext, input: ContractCallInput) -> DestinationResult;
}

/// Runs contract code
pub trait ContractExecutor {
    /// Size of the code deployed at `address`; `None` if no contract lives there
    fn code_size(&self, address: &Address) -> Option<usize>;

    /// Runs `input.function` of the contract at `input.recipient`
    ///
    /// The executor charges gas, finishes return data and issues async calls
    /// through `host`.
    fn run(&mut self, host: &mut InvokeContext, input: &ContractCallInput) -> std::result::Result<(), ContractError>;
}

enum FrameFailure {
    Contract(ContractError),
    Fatal(TosVmError),
}

impl From<TosVmError> for FrameFailure {
    fn from(err: TosVmError) -> Self {
        if err.is_fatal() {
            FrameFailure::Fatal(err)
        } else {
            FrameFailure::Contract(ContractError::new(ReturnCode::ExecutionFailed, err.to_string()))
        }
    }
}

/// Engine running contracts through a [`ContractExecutor`]
pub struct HostEngine<E> {
    executor: E,
}

impl<E: ContractExecutor> HostEngine<E> {
    /// Creates an engine over `executor`
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    /// Contract executor
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Mutable contract executor
    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Runs a call that is not nested in another frame
    ///
    /// # Returns
    /// The output of the call; protocol failures are returned as errors
    pub fn execute_transaction(&mut self, host: &mut InvokeContext, input: ContractCallInput) -> Result<VmOutput> {
        let result = self.execute_on_dest_context(host, input);
        if let Some(err) = result.fatal_error() {
            return Err(err.clone());
        }
        result.output.ok_or(TosVmError::NilDestinationOutput)
    }

    fn run_frame(&mut self, host: &mut InvokeContext, input: &ContractCallInput) -> std::result::Result<bool, FrameFailure> {
        let code_size = self.executor.code_size(&input.recipient).ok_or_else(|| {
            FrameFailure::Contract(ContractError::new(ReturnCode::ContractNotFound, "no contract at recipient"))
        })?;

        if let Err(err) = host
            .metering_mut()
            .deduct_initial_gas_for_execution(code_size, input.call_type)
        {
            return Err(match err {
                TosVmError::NotEnoughGas => {
                    FrameFailure::Contract(ContractError::new(ReturnCode::OutOfGas, err.to_string()))
                }
                other => FrameFailure::from(other),
            });
        }

        if let Err(err) = self.executor.run(host, input) {
            host.metering_mut().unlock_gas_if_async_step();
            return Err(FrameFailure::Contract(err));
        }

        match host.take_async_context()? {
            None => Ok(true),
            Some(mut context) => {
                context.execute(host, self)?;
                Ok(context.is_finalized())
            }
        }
    }
}

impl<E: ContractExecutor> DestinationEngine for HostEngine<E> {
    fn execute_on_dest_context(&mut self, host: &mut InvokeContext, input: ContractCallInput) -> DestinationResult {
        let depth = host.depth();
        let nested = depth > 0;

        if nested {
            if let Err(err) = host.metering_mut().use_gas(input.gas_provided) {
                return DestinationResult::rejected(VmOutput::failed(ReturnCode::OutOfGas, err.to_string()), err);
            }
        }

        if depth >= host.config().max_call_depth {
            let err = TosVmError::CallStackOverflow { depth };
            log::debug!("refusing to enter frame for {}: {}", input.function, err);
            return DestinationResult::rejected(VmOutput::failed(ReturnCode::CallStackOverFlow, err.to_string()), err);
        }

        log::trace!(
            "entering frame {} for function {} (gas {}, {:?})",
            depth,
            input.function,
            input.gas_provided,
            input.call_type
        );
        host.push_frame(input.clone());
        let outcome = self.run_frame(host, &input);

        let (frame, gas_remaining) = match host.pop_frame() {
            Ok(popped) => popped,
            Err(err) => return DestinationResult::aborted(err),
        };

        let (output, complete) = match outcome {
            Ok(complete) => {
                let (return_data, output_accounts) = frame.into_output().into_parts();
                let output = VmOutput {
                    return_data,
                    output_accounts,
                    ..VmOutput::ok(Vec::new(), gas_remaining)
                };
                (output, complete)
            }
            Err(FrameFailure::Contract(err)) => {
                log::debug!("frame {} for function {} failed: {}", depth, input.function, err);
                (VmOutput::failed(err.code, err.message), true)
            }
            Err(FrameFailure::Fatal(err)) => return DestinationResult::aborted(err),
        };

        if nested {
            if output.return_code.is_ok() {
                match host.output_mut() {
                    Ok(parent) => parent.merge(&output),
                    Err(err) => return DestinationResult::aborted(err),
                }
            }
            host.metering_mut().restore_gas(output.gas_remaining);
        }

        DestinationResult::finished(output, complete)
    }
}
