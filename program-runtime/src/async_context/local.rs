//! Same-partition async calls

use super::AsyncContext;
use crate::{
    async_call::{AsyncCall, AsyncCallExecutionMode, CorrelationId},
    engine::{DestinationEngine, DestinationResult},
    error::{Result, TosVmError},
    events::AsyncEvent,
    invoke_context::InvokeContext,
    types::{CallType, ContractCallInput, ReturnCode, VmOutput},
};

impl AsyncContext {
    /// Runs every pending local call, in group then registration order
    pub fn execute_async_local_calls(
        &mut self,
        host: &mut InvokeContext,
        engine: &mut dyn DestinationEngine,
    ) -> Result<()> {
        let local_calls: Vec<CorrelationId> = self
            .groups
            .values()
            .flat_map(|group| group.calls.iter())
            .filter(|call| call.is_local() && call.is_pending())
            .map(AsyncCall::correlation_id)
            .collect();

        for correlation_id in local_calls {
            self.execute_async_local_call(host, engine, &correlation_id)?;
        }
        Ok(())
    }

    /// Runs one local call and, if the destination finished, its callback
    pub fn execute_async_local_call(
        &mut self,
        host: &mut InvokeContext,
        engine: &mut dyn DestinationEngine,
        correlation_id: &CorrelationId,
    ) -> Result<()> {
        let call = self.call(correlation_id)?.clone();
        if call.execution_mode == AsyncCallExecutionMode::TokenTransferNoCallback {
            return self.execute_transfer_without_callback(host, engine, &call);
        }

        let input = match self.create_contract_call_input(host, &call) {
            Ok(input) => input,
            Err(err) if !err.is_fatal() => return self.reject_undispatched_call(host, engine, &call, err),
            Err(err) => return Err(err),
        };

        host.emit(AsyncEvent::LocalCallStarted {
            correlation_id: call.correlation_id,
            caller: input.caller,
            destination: input.recipient,
            function: input.function.clone(),
            gas_provided: input.gas_provided,
            gas_locked: input.gas_locked,
        });

        host.metering_mut().restore_gas(call.gas_limit);
        let result = engine.execute_on_dest_context(host, input);
        if let Some(err) = result.fatal_error() {
            return Err(err.clone());
        }
        let DestinationResult { output, complete, error } = result;
        let output = output.ok_or(TosVmError::NilDestinationOutput)?;

        host.emit(AsyncEvent::LocalCallFinished {
            correlation_id: call.correlation_id,
            return_code: output.return_code,
            gas_remaining: output.gas_remaining,
            complete,
        });

        // The call stays pending until its destination resolved every call
        // of its own
        if !complete {
            log::debug!(
                "local call {} is waiting on calls of its own, deferring its callback",
                correlation_id
            );
            return Ok(());
        }

        let call = {
            let call = self.call_mut(correlation_id)?;
            call.update_status(output.return_code);
            call.clone()
        };

        self.resolve_with_callback(host, engine, &call, &output, error.as_ref(), true)
    }

    /// Builds the destination input of a local call
    ///
    /// The correlation id is prepended to the arguments and the destination
    /// gets `gas_limit` minus one async step.
    pub fn create_contract_call_input(&self, host: &InvokeContext, call: &AsyncCall) -> Result<ContractCallInput> {
        let (function, args) = host.codec().parse_data(&call.data)?;

        let step = host.gas_schedule().async_call_step;
        if call.gas_limit <= step {
            return Err(TosVmError::NotEnoughGas);
        }
        let gas_limit = call.gas_limit.saturating_sub(step);

        let mut arguments = Vec::with_capacity(args.len().saturating_add(1));
        arguments.push(call.correlation_id.as_bytes().to_vec());
        arguments.extend(args);

        Ok(ContractCallInput {
            caller: self.owner,
            recipient: call.destination,
            function,
            arguments,
            call_value: call.value,
            gas_provided: gas_limit,
            gas_locked: call.gas_locked,
            call_type: CallType::AsynchronousCall,
            return_call_after_error: false,
            tx_hashes: host.tx_hashes()?.clone(),
        })
    }

    fn execute_transfer_without_callback(
        &mut self,
        host: &mut InvokeContext,
        engine: &mut dyn DestinationEngine,
        call: &AsyncCall,
    ) -> Result<()> {
        host.output_mut()?.prepend_finish(call.data.clone());
        host.metering_mut()
            .restore_gas(call.gas_limit.saturating_add(call.gas_locked));
        self.call_mut(&call.correlation_id)?
            .update_status(ReturnCode::Ok);
        host.emit(AsyncEvent::TransferResolved {
            correlation_id: call.correlation_id,
        });
        self.complete_child(host, engine, &call.correlation_id, 0)
    }

    /// Rejects a call whose input could not be built
    ///
    /// The call's gas limit goes back to the frame. If an error callback is
    /// configured it runs with the failure; otherwise the call completes with
    /// no extra gas.
    pub(super) fn reject_undispatched_call(
        &mut self,
        host: &mut InvokeContext,
        engine: &mut dyn DestinationEngine,
        call: &AsyncCall,
        err: TosVmError,
    ) -> Result<()> {
        host.emit(AsyncEvent::CallRejected {
            correlation_id: call.correlation_id,
            reason: err.to_string(),
        });
        host.metering_mut().restore_gas(call.gas_limit);

        let call = {
            let call = self.call_mut(&call.correlation_id)?;
            call.reject();
            call.clone()
        };

        let code = match err {
            TosVmError::NotEnoughGas => ReturnCode::OutOfGas,
            _ => ReturnCode::ExecutionFailed,
        };
        let output = VmOutput::failed(code, err.to_string());
        self.resolve_with_callback(host, engine, &call, &output, Some(&err), true)
    }

    /// Runs the callback of a resolved call, then completes the call
    ///
    /// `restore_locked` returns the call's callback reserve to the current
    /// frame first; it is unset when the reserve arrives as the gas of a
    /// new transaction instead.
    pub(crate) fn resolve_with_callback(
        &mut self,
        host: &mut InvokeContext,
        engine: &mut dyn DestinationEngine,
        call: &AsyncCall,
        destination_output: &VmOutput,
        destination_error: Option<&TosVmError>,
        restore_locked: bool,
    ) -> Result<()> {
        if !call.has_callback() {
            if restore_locked {
                host.metering_mut().restore_gas(call.gas_locked);
            }
            return self.complete_child(host, engine, &call.correlation_id, 0);
        }

        let input = match self.create_callback_input(host, call, destination_output, destination_error) {
            Ok(input) => input,
            Err(err) if !err.is_fatal() => {
                host.emit(AsyncEvent::CallRejected {
                    correlation_id: call.correlation_id,
                    reason: format!("callback not run: {}", err),
                });
                if restore_locked {
                    host.metering_mut().restore_gas(call.gas_locked);
                }
                return self.complete_child(host, engine, &call.correlation_id, 0);
            }
            Err(err) => return Err(err),
        };

        let result = self.execute_sync_callback(host, engine, call, input, restore_locked)?;
        let mut callback_output = result.output.ok_or(TosVmError::NoOutputFromCallback)?;
        if !result.complete {
            log::debug!(
                "callback of call {} is waiting on calls of its own",
                call.correlation_id
            );
            return Ok(());
        }

        let leftover = self.finish_async_local_callback_execution(host, &mut callback_output)?;
        self.complete_child(host, engine, &call.correlation_id, leftover)
    }
}
