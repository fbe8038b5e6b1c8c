//! Calls resolved in another partition

use super::AsyncContext;
use crate::{
    async_call::{AsyncCall, AsyncCallExecutionMode, CorrelationId},
    engine::DestinationEngine,
    error::Result,
    events::AsyncEvent,
    invoke_context::InvokeContext,
    types::{CallType, VmOutput},
};

impl AsyncContext {
    /// Emits every pending cross-shard call as an outbound transfer, then
    /// persists the context if calls remain unresolved
    ///
    /// The call's gas limit and callback reserve travel with the transfer.
    pub fn send_cross_shard_calls(
        &mut self,
        host: &mut InvokeContext,
        engine: &mut dyn DestinationEngine,
    ) -> Result<()> {
        let calls: Vec<AsyncCall> = self
            .groups
            .values()
            .flat_map(|group| group.calls.iter())
            .filter(|call| call.execution_mode == AsyncCallExecutionMode::CrossShard && call.is_pending())
            .cloned()
            .collect();

        for call in calls {
            let (function, args) = match host.codec().parse_data(&call.data) {
                Ok(parsed) => parsed,
                Err(err) => {
                    self.reject_undispatched_call(host, engine, &call, err)?;
                    continue;
                }
            };

            let mut arguments = Vec::with_capacity(args.len().saturating_add(1));
            arguments.push(call.correlation_id.as_bytes().to_vec());
            arguments.extend(args);
            let data = host.codec().encode_data(&function, &arguments);

            host.output_mut()?.transfer(
                call.destination,
                self.owner,
                call.value,
                data,
                call.gas_limit,
                call.gas_locked,
                Some(CallType::AsynchronousCall),
            );
            host.emit(AsyncEvent::CrossShardCallSent {
                correlation_id: call.correlation_id,
                destination: call.destination,
                gas_limit: call.gas_limit,
            });
        }

        if self.finalized || self.pending_calls() == 0 {
            return Ok(());
        }
        self.persist(host)
    }

    /// Hands the gas gathered from completed groups back to the current
    /// frame, then saves the context
    ///
    /// That gas was withdrawn from this frame and must leave with it. The
    /// frame that finally resumes the context funds the context callback
    /// out of the gas its own groups gather.
    fn persist(&mut self, host: &mut InvokeContext) -> Result<()> {
        let released = std::mem::take(&mut self.gas_accumulated);
        if released != 0 {
            host.metering_mut().restore_gas(released);
            host.emit(AsyncEvent::AccumulatedGasReleased {
                owner: self.owner,
                gas: released,
            });
        }
        self.save(host)
    }

    /// Delivers the result of a call resolved outside the current transaction
    ///
    /// Runs the call's callback in the current frame, which is funded by the
    /// returning transaction, then completes the call. The persisted copy of
    /// the context is updated, or removed once the context finalized.
    pub fn resume_cross_shard_call(
        &mut self,
        host: &mut InvokeContext,
        engine: &mut dyn DestinationEngine,
        correlation_id: &CorrelationId,
        destination_output: VmOutput,
    ) -> Result<()> {
        let call = {
            let call = self.call_mut(correlation_id)?;
            call.update_status(destination_output.return_code);
            call.clone()
        };

        self.resolve_with_callback(host, engine, &call, &destination_output, None, false)?;

        if self.finalized {
            self.delete(host)?;
        } else {
            self.persist(host)?;
        }
        Ok(())
    }

    /// Loads the context the current contract persisted in `origin_tx_hash`
    /// and delivers one result to it
    pub fn resume_persisted(
        host: &mut InvokeContext,
        engine: &mut dyn DestinationEngine,
        origin_tx_hash: &[u8; 32],
        correlation_id: &CorrelationId,
        destination_output: VmOutput,
    ) -> Result<Self> {
        let owner = host.contract_address()?;
        let mut context = Self::load(host, &owner, origin_tx_hash)?;
        context.resume_cross_shard_call(host, engine, correlation_id, destination_output)?;
        Ok(context)
    }
}
