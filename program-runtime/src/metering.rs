//! Gas ledger
//!
//! Every active frame owns a [`GasFrame`]. Gas moves between frames with a
//! strict ordering: the caller deducts gas before invoking, restores it right
//! before the callee frame is entered, and the callee consumes it again as its
//! own provided gas. At any moment a unit of gas is live in exactly one frame.
//!
//! Frames entered as asynchronous calls split their provided gas at entry into
//! a consumed step cost, a locked callback reserve and the remainder that the
//! contract may spend.

use crate::{
    config::GasSchedule,
    error::{Result, TosVmError},
    types::CallType,
};

/// Gas state of a single frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GasFrame {
    gas_provided: u64,
    gas_used: u64,
    gas_locked: u64,
    issued_calls: bool,
}

impl GasFrame {
    fn new(gas_provided: u64) -> Self {
        Self {
            gas_provided,
            ..Self::default()
        }
    }

    fn gas_left(&self) -> u64 {
        self.gas_provided
            .saturating_sub(self.gas_used)
            .saturating_sub(self.gas_locked)
    }

    /// Gas handed back to the caller when the frame ends; an unspent
    /// reserve travels back with it to pay for this frame's own callback.
    fn gas_remaining(&self) -> u64 {
        self.gas_provided.saturating_sub(self.gas_used)
    }
}

/// Gas ledger for all frames of one transaction
#[derive(Debug, Clone)]
pub struct Metering {
    schedule: GasSchedule,
    frames: Vec<GasFrame>,
    refund: u64,
}

impl Metering {
    /// Creates an empty ledger
    pub fn new(schedule: GasSchedule) -> Self {
        Self {
            schedule,
            frames: Vec::new(),
            refund: 0,
        }
    }

    /// Gas schedule in force
    pub fn gas_schedule(&self) -> &GasSchedule {
        &self.schedule
    }

    /// Number of frames on the ledger
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Enters a new frame with `gas_provided`
    pub fn push_frame(&mut self, gas_provided: u64) {
        self.frames.push(GasFrame::new(gas_provided));
    }

    /// Leaves the current frame, returning the gas it hands back
    pub fn pop_frame(&mut self) -> Result<u64> {
        self.frames
            .pop()
            .map(|frame| frame.gas_remaining())
            .ok_or(TosVmError::NoActiveFrame)
    }

    fn current(&self) -> Option<&GasFrame> {
        self.frames.last()
    }

    fn current_mut(&mut self) -> Result<&mut GasFrame> {
        self.frames.last_mut().ok_or(TosVmError::NoActiveFrame)
    }

    /// Gas provided to the current frame
    pub fn gas_provided(&self) -> u64 {
        self.current().map_or(0, |frame| frame.gas_provided)
    }

    /// Gas used so far by the current frame
    pub fn gas_used(&self) -> u64 {
        self.current().map_or(0, |frame| frame.gas_used)
    }

    /// Gas the current frame may still spend
    pub fn gas_left(&self) -> u64 {
        self.current().map_or(0, GasFrame::gas_left)
    }

    /// Callback reserve currently locked in the current frame
    pub fn gas_locked(&self) -> u64 {
        self.current().map_or(0, |frame| frame.gas_locked)
    }

    /// Total refund accumulated through [`Metering::free_gas`]
    pub fn refund(&self) -> u64 {
        self.refund
    }

    /// Consumes gas with checked arithmetic
    ///
    /// Returns `NotEnoughGas` and leaves the frame unchanged if not enough gas remains.
    pub fn use_gas(&mut self, gas: u64) -> Result<()> {
        let frame = self.current_mut()?;
        if frame.gas_left() < gas {
            return Err(TosVmError::NotEnoughGas);
        }
        frame.gas_used = frame.gas_used.saturating_add(gas);
        Ok(())
    }

    /// Consumes gas, saturating at the frame's provided gas
    pub fn consume(&mut self, gas: u64) {
        if let Ok(frame) = self.current_mut() {
            let left = frame.gas_left();
            frame.gas_used = frame.gas_used.saturating_add(gas.min(left));
        }
    }

    /// Gives back gas previously used by the current frame
    ///
    /// Restoring more than the frame has used is ignored.
    pub fn restore_gas(&mut self, gas: u64) {
        if let Ok(frame) = self.current_mut() {
            if gas <= frame.gas_used {
                frame.gas_used = frame.gas_used.saturating_sub(gas);
            } else {
                log::warn!(
                    "ignoring restore of {} gas, frame has only used {}",
                    gas,
                    frame.gas_used
                );
            }
        }
    }

    /// Records a storage refund
    pub fn free_gas(&mut self, gas: u64) {
        self.refund = self.refund.saturating_add(gas);
    }

    /// Caps a requested gas limit to the gas left in the current frame
    pub fn bound_gas_limit(&self, value: u64) -> u64 {
        value.min(self.gas_left())
    }

    /// Charges compilation of `code_len` bytes, then applies the async-step
    /// lock if the frame was entered as an asynchronous call
    pub fn deduct_initial_gas_for_execution(&mut self, code_len: usize, call_type: CallType) -> Result<()> {
        let code_cost = (code_len as u64).saturating_mul(self.schedule.compile_per_byte);
        self.use_gas(code_cost)?;
        self.deduct_and_lock_gas_if_async_step(call_type)
    }

    /// Consumes the async step cost and locks the callback reserve when the
    /// current frame is the destination of an asynchronous call
    pub fn deduct_and_lock_gas_if_async_step(&mut self, call_type: CallType) -> Result<()> {
        let gas_to_consume = self.schedule.async_call_step;
        let gas_to_lock = self
            .schedule
            .async_call_step
            .saturating_add(self.schedule.async_callback_gas_lock);

        let frame = self.current_mut()?;
        if call_type != CallType::AsynchronousCall {
            frame.gas_locked = 0;
            return Ok(());
        }

        if frame.gas_left() <= gas_to_consume.saturating_add(gas_to_lock) {
            return Err(TosVmError::NotEnoughGas);
        }
        frame.gas_used = frame.gas_used.saturating_add(gas_to_consume);
        frame.gas_locked = gas_to_lock;
        Ok(())
    }

    /// Releases the callback reserve back to the frame
    ///
    /// Only a frame that aborted before issuing any call of its own gets the
    /// reserve back; otherwise the reserve has already been promised.
    pub fn unlock_gas_if_async_step(&mut self) {
        if let Ok(frame) = self.current_mut() {
            if !frame.issued_calls && frame.gas_locked != 0 {
                frame.gas_locked = 0;
            }
        }
    }

    /// Deducts `gas_limit + gas_locked` for a newly registered call
    ///
    /// The frame's own callback reserve is folded into `gas_locked` first, so
    /// the reserve ends up paying for exactly one callback.
    pub fn use_gas_for_async_call(&mut self, gas_limit: u64, gas_locked: u64) -> Result<()> {
        let frame = self.current_mut()?;
        let total = gas_limit.checked_add(gas_locked).ok_or(TosVmError::NotEnoughGas)?;
        let from_reserve = frame.gas_locked.min(gas_locked);
        let from_available = total.saturating_sub(from_reserve);
        if frame.gas_left() < from_available {
            return Err(TosVmError::NotEnoughGas);
        }
        frame.gas_used = frame.gas_used.saturating_add(total);
        frame.gas_locked = frame.gas_locked.saturating_sub(from_reserve);
        frame.issued_calls = true;
        Ok(())
    }
}
