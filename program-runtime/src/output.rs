//! Per-frame output: finish buffer and outbound transfers

use crate::types::{Address, CallType, OutputAccount, OutputTransfer, VmOutput};
use indexmap::IndexMap;

/// Output accumulated by one frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputContext {
    return_data: Vec<Vec<u8>>,
    output_accounts: IndexMap<Address, OutputAccount>,
}

impl OutputContext {
    /// Creates an empty output
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value to the finish buffer
    pub fn finish(&mut self, data: Vec<u8>) {
        self.return_data.push(data);
    }

    /// Inserts a value at the front of the finish buffer
    pub fn prepend_finish(&mut self, data: Vec<u8>) {
        self.return_data.insert(0, data);
    }

    /// Drops the first entry of the finish buffer, if any
    pub fn delete_first_return_data(&mut self) {
        if !self.return_data.is_empty() {
            self.return_data.remove(0);
        }
    }

    /// Current finish buffer
    pub fn return_data(&self) -> &[Vec<u8>] {
        &self.return_data
    }

    /// Empties the finish buffer
    pub fn clear_return_data(&mut self) {
        self.return_data.clear();
    }

    /// Outbound transfers recorded so far
    pub fn output_accounts(&self) -> &IndexMap<Address, OutputAccount> {
        &self.output_accounts
    }

    /// Records an outbound transfer from `sender` to `destination`
    #[allow(clippy::too_many_arguments)]
    pub fn transfer(
        &mut self,
        destination: Address,
        sender: Address,
        value: u128,
        data: Vec<u8>,
        gas_limit: u64,
        gas_locked: u64,
        call_type: Option<CallType>,
    ) {
        let account = self
            .output_accounts
            .entry(destination)
            .or_insert_with(|| OutputAccount {
                address: destination,
                transfers: Vec::new(),
            });
        account.transfers.push(OutputTransfer {
            value,
            data,
            gas_limit,
            gas_locked,
            sender,
            call_type,
        });
    }

    /// Folds a finished child frame's output into this one
    pub fn merge(&mut self, child: &VmOutput) {
        self.return_data.extend(child.return_data.iter().cloned());
        for (address, account) in &child.output_accounts {
            let target = self
                .output_accounts
                .entry(*address)
                .or_insert_with(|| OutputAccount {
                    address: *address,
                    transfers: Vec::new(),
                });
            target.transfers.extend(account.transfers.iter().cloned());
        }
    }

    /// Consumes the context into the pieces of a [`VmOutput`]
    pub fn into_parts(self) -> (Vec<Vec<u8>>, IndexMap<Address, OutputAccount>) {
        (self.return_data, self.output_accounts)
    }
}
