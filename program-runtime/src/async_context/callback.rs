//! Callback construction and execution for resolved calls

use super::AsyncContext;
use crate::{
    async_call::AsyncCall,
    codec::encoded_data_length,
    config::GasSchedule,
    engine::{DestinationEngine, DestinationResult},
    error::{Result, TosVmError},
    events::AsyncEvent,
    invoke_context::InvokeContext,
    transfer::MULTI_TOKEN_TRANSFER,
    types::{encode_uint, Address, CallType, ContractCallInput, VmOutput},
};

/// Arguments handed to a callback
///
/// On success: `[return code, return data...]`. On failure:
/// `[return code, return message]`.
pub fn callback_arguments(output: &VmOutput, destination_error: Option<&TosVmError>) -> Vec<Vec<u8>> {
    let mut arguments = vec![encode_uint(u128::from(output.return_code.as_u64()))];
    if destination_error.is_none() && output.return_code.is_ok() {
        arguments.extend(output.return_data.iter().cloned());
    } else {
        arguments.push(output.return_message.as_bytes().to_vec());
    }
    arguments
}

/// Gas given to a callback
///
/// The destination's unused gas plus the callback reserve, minus one async
/// step and the cost of copying `data_length` bytes of callback data.
pub fn compute_gas_limit_for_callback(
    schedule: &GasSchedule,
    gas_remaining: u64,
    gas_locked: u64,
    data_length: usize,
) -> Result<u64> {
    let gas_limit = gas_remaining.saturating_add(gas_locked);
    let cost = schedule
        .async_call_step
        .saturating_add(schedule.data_copy_per_byte.saturating_mul(data_length as u64));
    if gas_limit <= cost {
        return Err(TosVmError::NotEnoughGas);
    }
    Ok(gas_limit.saturating_sub(cost))
}

/// Value the callback is credited with
///
/// Zero if the destination returned data; otherwise the value of the last
/// transfer back to `owner`, provided that transfer carries no call data.
pub fn compute_call_value(owner: &Address, output: &VmOutput) -> u128 {
    if !output.return_data.is_empty() {
        return 0;
    }
    output
        .last_transfer_to(owner)
        .filter(|transfer| transfer.data.is_empty())
        .map_or(0, |transfer| transfer.value)
}

impl AsyncContext {
    /// Caller of record for the callback of `call`
    ///
    /// A relay transfer the owner sends to itself really comes from the
    /// receiver encoded in its arguments.
    pub fn determine_destination_for_async_call(&self, host: &InvokeContext, call: &AsyncCall) -> Address {
        if call.destination != self.owner {
            return call.destination;
        }
        let Ok((function, args)) = host.codec().parse_data(&call.data) else {
            return call.destination;
        };
        if !host.transfer_recognizer().is_relay(&function) {
            return call.destination;
        }
        host.transfer_recognizer()
            .parse_transfer(&call.destination, &call.destination, &function, &args)
            .map_or(call.destination, |transfer| transfer.recipient)
    }

    /// Transfer function and arguments if the destination's first return
    /// value is a token transfer to the owner with nothing chained after it
    ///
    /// A relay runs on the sender's own account, so it is read as a call the
    /// sender makes to itself, carrying the owner as its receiver.
    fn transfer_on_return_data(
        &self,
        host: &InvokeContext,
        sender: &Address,
        output: &VmOutput,
    ) -> Option<(String, Vec<Vec<u8>>)> {
        let first = output.return_data.first()?;
        let (function, args) = host.codec().parse_data(first).ok()?;
        if !host.config().multi_transfer_callback_enabled && function == MULTI_TOKEN_TRANSFER {
            return None;
        }
        let recognizer = host.transfer_recognizer();
        let account = if recognizer.is_relay(&function) { sender } else { &self.owner };
        let transfer = recognizer.parse_transfer(sender, account, &function, &args)?;
        if transfer.recipient != self.owner || transfer.has_chained_call() {
            return None;
        }
        Some((function, args))
    }

    /// Builds the callback input for a resolved call
    ///
    /// When the destination returned a bare token transfer as its first
    /// value, the callback is folded into that transfer: the transfer is
    /// invoked with the callback name, return code and remaining return data
    /// appended, and the transfer is dropped from the finish buffer.
    pub fn create_callback_input(
        &self,
        host: &mut InvokeContext,
        call: &AsyncCall,
        destination_output: &VmOutput,
        destination_error: Option<&TosVmError>,
    ) -> Result<ContractCallInput> {
        let caller = if host.config().multi_transfer_callback_enabled {
            self.determine_destination_for_async_call(host, call)
        } else {
            call.destination
        };

        let arguments = callback_arguments(destination_output, destination_error);
        let returned_with_error = destination_error.is_some() || !destination_output.return_code.is_ok();
        let function = call.callback_name().to_string();

        let data_length = encoded_data_length(&function, &arguments);
        let gas_limit = compute_gas_limit_for_callback(
            host.gas_schedule(),
            destination_output.gas_remaining,
            call.gas_locked,
            data_length,
        )?;

        let mut input = ContractCallInput {
            caller,
            recipient: self.owner,
            function,
            arguments,
            call_value: compute_call_value(&self.owner, destination_output),
            gas_provided: gas_limit,
            gas_locked: 0,
            call_type: CallType::AsynchronousCallBack,
            return_call_after_error: returned_with_error,
            tx_hashes: host.tx_hashes()?.clone(),
        };

        if returned_with_error {
            return Ok(input);
        }

        if let Some((transfer_function, transfer_args)) =
            self.transfer_on_return_data(host, &caller, destination_output)
        {
            let callback_function = std::mem::replace(&mut input.function, transfer_function);
            let mut arguments = transfer_args;
            arguments.push(callback_function.into_bytes());
            arguments.push(encode_uint(u128::from(destination_output.return_code.as_u64())));
            arguments.extend(destination_output.return_data.iter().skip(1).cloned());
            input.arguments = arguments;

            if host.transfer_recognizer().is_relay(&input.function)
                && host.shard_coordinator().same_shard(&input.caller, &input.recipient)
            {
                input.recipient = input.caller;
            }
            host.output_mut()?.delete_first_return_data();
        }

        Ok(input)
    }

    /// Runs a callback in a new frame
    ///
    /// With `restore_locked` the call's callback reserve is first returned to
    /// the current frame, which then pays the callback's gas.
    pub fn execute_sync_callback(
        &self,
        host: &mut InvokeContext,
        engine: &mut dyn DestinationEngine,
        call: &AsyncCall,
        input: ContractCallInput,
        restore_locked: bool,
    ) -> Result<DestinationResult> {
        host.emit(AsyncEvent::CallbackStarted {
            correlation_id: call.correlation_id,
            caller: input.caller,
            function: input.function.clone(),
            gas_provided: input.gas_provided,
        });

        if restore_locked {
            host.metering_mut().restore_gas(call.gas_locked);
        }
        let result = engine.execute_on_dest_context(host, input);
        if let Some(err) = result.fatal_error() {
            return Err(err.clone());
        }

        if let Some(output) = &result.output {
            host.emit(AsyncEvent::CallbackFinished {
                correlation_id: call.correlation_id,
                return_code: output.return_code,
                gas_remaining: output.gas_remaining,
            });
        }
        Ok(result)
    }

    /// Settles a finished callback
    ///
    /// The callback's unused gas was handed back to the current frame by the
    /// engine. It is withdrawn again and returned so that completion can
    /// carry it into the group. The callback's return code and finish buffer
    /// are not propagated further.
    pub fn finish_async_local_callback_execution(
        &self,
        host: &mut InvokeContext,
        callback_output: &mut VmOutput,
    ) -> Result<u64> {
        let leftover = std::mem::take(&mut callback_output.gas_remaining);
        host.metering_mut().use_gas(leftover)?;
        Ok(leftover)
    }
}
