//! Structured events emitted by the async call orchestrator

use crate::{
    async_call::{AsyncCallExecutionMode, CorrelationId},
    types::{Address, ReturnCode},
};
use std::{cell::RefCell, fmt, rc::Rc};

/// Log target used by [`LogObserver`]
pub const LOG_TARGET: &str = "tos::async";

/// Something that happened while resolving async calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncEvent {
    /// A call was added to a group
    CallRegistered {
        /// Group the call joined
        group: String,
        /// Id assigned to the call
        correlation_id: CorrelationId,
        /// Destination of the call
        destination: Address,
        /// Classified execution mode
        mode: AsyncCallExecutionMode,
        /// Gas reserved for the destination
        gas_limit: u64,
        /// Gas reserved for the callback
        gas_locked: u64,
    },
    /// A local call is about to be dispatched
    LocalCallStarted {
        /// Call id
        correlation_id: CorrelationId,
        /// Caller of record
        caller: Address,
        /// Destination contract
        destination: Address,
        /// Function called
        function: String,
        /// Gas given to the destination
        gas_provided: u64,
        /// Gas locked for the callback
        gas_locked: u64,
    },
    /// A local call returned from the destination
    LocalCallFinished {
        /// Call id
        correlation_id: CorrelationId,
        /// Destination return code
        return_code: ReturnCode,
        /// Destination gas left unused
        gas_remaining: u64,
        /// Whether the destination resolved all of its own calls
        complete: bool,
    },
    /// A call was rejected before reaching its destination
    CallRejected {
        /// Call id
        correlation_id: CorrelationId,
        /// Why the call could not be built
        reason: String,
    },
    /// A transfer-only call was resolved without dispatching
    TransferResolved {
        /// Call id
        correlation_id: CorrelationId,
    },
    /// A per-call callback is about to run
    CallbackStarted {
        /// Call id
        correlation_id: CorrelationId,
        /// Caller of record for the callback
        caller: Address,
        /// Callback function
        function: String,
        /// Gas given to the callback
        gas_provided: u64,
    },
    /// A per-call callback returned
    CallbackFinished {
        /// Call id
        correlation_id: CorrelationId,
        /// Callback return code
        return_code: ReturnCode,
        /// Callback gas left unused
        gas_remaining: u64,
    },
    /// A call was marked complete in its group
    ChildCompleted {
        /// Call id
        correlation_id: CorrelationId,
        /// Owning group
        group: String,
        /// Extra gas carried into the group
        leftover_gas: u64,
        /// Calls of the group still pending
        pending: usize,
    },
    /// A group callback is about to run
    GroupCallbackStarted {
        /// Group id
        group: String,
        /// Callback function
        function: String,
        /// Gas given to the callback
        gas_provided: u64,
    },
    /// All calls of a group completed
    GroupCompleted {
        /// Group id
        group: String,
        /// Gas forwarded to the context
        gas_forwarded: u64,
    },
    /// The context callback is about to run
    ContextCallbackStarted {
        /// Callback function
        function: String,
        /// Gas given to the callback
        gas_provided: u64,
    },
    /// Every group completed and the context was closed
    ContextFinalized {
        /// Contract owning the context
        owner: Address,
        /// Gas accumulated from completed groups
        gas_accumulated: u64,
    },
    /// Gas gathered from completed groups went back to the owning frame
    /// before the context was persisted
    AccumulatedGasReleased {
        /// Contract owning the context
        owner: Address,
        /// Gas handed back
        gas: u64,
    },
    /// A call was emitted for resolution in another partition
    CrossShardCallSent {
        /// Call id
        correlation_id: CorrelationId,
        /// Destination contract
        destination: Address,
        /// Gas forwarded with the call
        gas_limit: u64,
    },
}

/// Receives [`AsyncEvent`]s
pub trait AsyncObserver {
    /// Called once per event, in emission order
    fn on_event(&mut self, event: &AsyncEvent);
}

/// Short hex prefix of an address for log lines
pub fn short_address(address: &Address) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}...",
        address[0], address[1], address[2], address[3]
    )
}

impl fmt::Display for AsyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsyncEvent::CallRegistered { group, correlation_id, destination, mode, gas_limit, gas_locked } => write!(
                f,
                "registered call {} in group '{}' to {} ({:?}, limit {}, locked {})",
                correlation_id, group, short_address(destination), mode, gas_limit, gas_locked
            ),
            AsyncEvent::LocalCallStarted { correlation_id, caller, destination, function, gas_provided, gas_locked } => write!(
                f,
                "executing local call {}: {} -> {}::{} (gas {}, locked {})",
                correlation_id, short_address(caller), short_address(destination), function, gas_provided, gas_locked
            ),
            AsyncEvent::LocalCallFinished { correlation_id, return_code, gas_remaining, complete } => write!(
                f,
                "local call {} returned '{}' (gas remaining {}, complete {})",
                correlation_id, return_code, gas_remaining, complete
            ),
            AsyncEvent::CallRejected { correlation_id, reason } => {
                write!(f, "call {} rejected: {}", correlation_id, reason)
            }
            AsyncEvent::TransferResolved { correlation_id } => {
                write!(f, "transfer-only call {} resolved in place", correlation_id)
            }
            AsyncEvent::CallbackStarted { correlation_id, caller, function, gas_provided } => write!(
                f,
                "executing callback {} of call {} from {} (gas {})",
                function, correlation_id, short_address(caller), gas_provided
            ),
            AsyncEvent::CallbackFinished { correlation_id, return_code, gas_remaining } => write!(
                f,
                "callback of call {} returned '{}' (gas remaining {})",
                correlation_id, return_code, gas_remaining
            ),
            AsyncEvent::ChildCompleted { correlation_id, group, leftover_gas, pending } => write!(
                f,
                "call {} completed in group '{}' (leftover {}, pending {})",
                correlation_id, group, leftover_gas, pending
            ),
            AsyncEvent::GroupCallbackStarted { group, function, gas_provided } => write!(
                f,
                "executing group callback {} of '{}' (gas {})",
                function, group, gas_provided
            ),
            AsyncEvent::GroupCompleted { group, gas_forwarded } => {
                write!(f, "group '{}' complete, forwarding {} gas", group, gas_forwarded)
            }
            AsyncEvent::ContextCallbackStarted { function, gas_provided } => {
                write!(f, "executing context callback {} (gas {})", function, gas_provided)
            }
            AsyncEvent::ContextFinalized { owner, gas_accumulated } => write!(
                f,
                "async context of {} finalized (accumulated {})",
                short_address(owner), gas_accumulated
            ),
            AsyncEvent::AccumulatedGasReleased { owner, gas } => write!(
                f,
                "released {} accumulated gas to {} before persisting",
                gas, short_address(owner)
            ),
            AsyncEvent::CrossShardCallSent { correlation_id, destination, gas_limit } => write!(
                f,
                "cross-shard call {} sent to {} (gas {})",
                correlation_id, short_address(destination), gas_limit
            ),
        }
    }
}

/// Default observer forwarding events to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl AsyncObserver for LogObserver {
    fn on_event(&mut self, event: &AsyncEvent) {
        match event {
            AsyncEvent::CallRejected { .. } | AsyncEvent::ContextFinalized { .. } => {
                log::debug!(target: LOG_TARGET, "{}", event)
            }
            _ => log::trace!(target: LOG_TARGET, "{}", event),
        }
    }
}

/// Observer keeping every event in a shared buffer
///
/// Clones share the same buffer, so one clone can be handed to the host
/// while another is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Rc<RefCell<Vec<AsyncEvent>>>,
}

impl RecordingObserver {
    /// Creates an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<AsyncEvent> {
        self.events.borrow().clone()
    }
}

impl AsyncObserver for RecordingObserver {
    fn on_event(&mut self, event: &AsyncEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
