//! Completion bookkeeping: calls, then groups, then the context

use super::AsyncContext;
use crate::{
    async_call::CorrelationId,
    engine::DestinationEngine,
    error::{Result, TosVmError},
    events::AsyncEvent,
    invoke_context::InvokeContext,
    types::{CallType, ContractCallInput},
};

impl AsyncContext {
    /// Marks a call complete and carries `leftover_gas` into its group
    ///
    /// Completing the last pending call of a group fires the group callback;
    /// completing the last group fires the context callback.
    pub fn complete_child(
        &mut self,
        host: &mut InvokeContext,
        engine: &mut dyn DestinationEngine,
        correlation_id: &CorrelationId,
        leftover_gas: u64,
    ) -> Result<()> {
        let continuation = self
            .continuations
            .remove(correlation_id)
            .ok_or(TosVmError::UnknownCorrelationId(*correlation_id))?;
        let group = self
            .groups
            .get_mut(&continuation.group)
            .ok_or(TosVmError::UnknownCorrelationId(*correlation_id))?;

        let pending = group.complete_call(leftover_gas);
        host.emit(AsyncEvent::ChildCompleted {
            correlation_id: *correlation_id,
            group: continuation.group.clone(),
            leftover_gas,
            pending,
        });

        if pending == 0 {
            self.finish_group(host, engine, &continuation.group)?;
        }
        if self.is_complete() {
            self.finalize(host, engine)?;
        }
        Ok(())
    }

    fn finish_group(
        &mut self,
        host: &mut InvokeContext,
        engine: &mut dyn DestinationEngine,
        group_id: &str,
    ) -> Result<()> {
        let group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| TosVmError::AsyncCallGroupNotFound(group_id.to_string()))?;
        if group.completed {
            return Err(TosVmError::GroupAlreadyComplete(group_id.to_string()));
        }
        group.completed = true;

        let gas = group.gas_locked.saturating_add(group.carried_gas);
        if !group.has_callback() {
            self.gas_accumulated = self.gas_accumulated.saturating_add(gas);
            host.emit(AsyncEvent::GroupCompleted {
                group: group_id.to_string(),
                gas_forwarded: gas,
            });
            return Ok(());
        }

        let input = ContractCallInput {
            caller: self.caller,
            recipient: self.owner,
            function: group.callback.clone(),
            arguments: vec![group.callback_data.clone()],
            call_value: 0,
            gas_provided: gas,
            gas_locked: 0,
            call_type: CallType::AsynchronousCallBack,
            return_call_after_error: false,
            tx_hashes: host.tx_hashes()?.clone(),
        };
        host.emit(AsyncEvent::GroupCallbackStarted {
            group: group_id.to_string(),
            function: input.function.clone(),
            gas_provided: gas,
        });

        host.metering_mut().restore_gas(gas);
        let result = engine.execute_on_dest_context(host, input);
        if let Some(err) = result.fatal_error() {
            return Err(err.clone());
        }
        let mut output = result.output.ok_or(TosVmError::NoOutputFromCallback)?;
        let leftover = self.finish_async_local_callback_execution(host, &mut output)?;

        self.gas_accumulated = self.gas_accumulated.saturating_add(leftover);
        host.emit(AsyncEvent::GroupCompleted {
            group: group_id.to_string(),
            gas_forwarded: leftover,
        });
        Ok(())
    }

    /// Runs the context callback once every group completed
    ///
    /// The gas gathered from the groups funds the callback; without a
    /// callback it goes straight back to the owning frame.
    pub(crate) fn finalize(&mut self, host: &mut InvokeContext, engine: &mut dyn DestinationEngine) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        host.metering_mut().restore_gas(self.gas_accumulated);
        if !self.callback.is_empty() {
            let input = ContractCallInput {
                caller: self.caller,
                recipient: self.owner,
                function: self.callback.clone(),
                arguments: vec![self.callback_data.clone()],
                call_value: self.call_value,
                gas_provided: self.gas_accumulated,
                gas_locked: 0,
                call_type: CallType::AsynchronousCallBack,
                return_call_after_error: false,
                tx_hashes: host.tx_hashes()?.clone(),
            };
            host.emit(AsyncEvent::ContextCallbackStarted {
                function: input.function.clone(),
                gas_provided: input.gas_provided,
            });

            let result = engine.execute_on_dest_context(host, input);
            if let Some(err) = result.fatal_error() {
                return Err(err.clone());
            }
            if result.output.is_none() {
                return Err(TosVmError::NoOutputFromCallback);
            }
        }

        host.emit(AsyncEvent::ContextFinalized {
            owner: self.owner,
            gas_accumulated: self.gas_accumulated,
        });
        Ok(())
    }
}
