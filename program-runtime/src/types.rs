//! Contract call inputs and outputs exchanged between the host and the execution engine

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte account or contract address
pub type Address = [u8; 32];

/// How a frame was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallType {
    /// Transaction or synchronous contract-to-contract call
    DirectCall,
    /// Destination side of an asynchronous call
    AsynchronousCall,
    /// Callback delivering the outcome of an asynchronous call
    AsynchronousCallBack,
}

/// Return codes reported by a finished frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReturnCode {
    /// Execution succeeded
    Ok = 0,
    /// The requested function does not exist
    FunctionNotFound = 1,
    /// Arguments did not match the function signature
    FunctionWrongSignature = 2,
    /// No contract at the recipient address
    ContractNotFound = 3,
    /// The contract signalled an error
    UserError = 4,
    /// Gas ran out
    OutOfGas = 5,
    /// Address collision on deployment
    AccountCollision = 6,
    /// Insufficient balance for a transfer
    OutOfFunds = 7,
    /// Maximum frame depth exceeded
    CallStackOverFlow = 8,
    /// Contract code is invalid
    ContractInvalid = 9,
    /// Any other execution failure
    ExecutionFailed = 10,
}

impl ReturnCode {
    /// Numeric value of the code
    pub fn as_u64(self) -> u64 {
        self as u64
    }

    /// Whether the code denotes success
    pub fn is_ok(self) -> bool {
        self == ReturnCode::Ok
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReturnCode::Ok => "ok",
            ReturnCode::FunctionNotFound => "function not found",
            ReturnCode::FunctionWrongSignature => "wrong signature for function",
            ReturnCode::ContractNotFound => "contract not found",
            ReturnCode::UserError => "user error",
            ReturnCode::OutOfGas => "out of gas",
            ReturnCode::AccountCollision => "account collision",
            ReturnCode::OutOfFunds => "out of funds",
            ReturnCode::CallStackOverFlow => "call stack overflow",
            ReturnCode::ContractInvalid => "contract invalid",
            ReturnCode::ExecutionFailed => "execution failed",
        };
        f.write_str(name)
    }
}

/// Transaction hashes carried along every call of a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHashChain {
    /// Hash of the transaction currently executing
    pub current: [u8; 32],
    /// Hash of the transaction that started the call chain
    pub original: [u8; 32],
    /// Hash of the transaction that produced the current one
    pub previous: [u8; 32],
}

/// Input of one contract call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCallInput {
    /// Caller of record
    pub caller: Address,
    /// Contract being called
    pub recipient: Address,
    /// Function name
    pub function: String,
    /// Raw arguments
    pub arguments: Vec<Vec<u8>>,
    /// Value transferred with the call
    pub call_value: u128,
    /// Gas made available to the recipient frame
    pub gas_provided: u64,
    /// Gas locked by the caller for this call's callback
    pub gas_locked: u64,
    /// Call kind
    pub call_type: CallType,
    /// Set on callbacks that deliver an error outcome
    pub return_call_after_error: bool,
    /// Transaction hashes
    pub tx_hashes: TxHashChain,
}

impl ContractCallInput {
    /// Direct call with no value, no lock and empty hashes
    pub fn direct(caller: Address, recipient: Address, function: &str, gas_provided: u64) -> Self {
        Self {
            caller,
            recipient,
            function: function.to_string(),
            arguments: Vec::new(),
            call_value: 0,
            gas_provided,
            gas_locked: 0,
            call_type: CallType::DirectCall,
            return_call_after_error: false,
            tx_hashes: TxHashChain::default(),
        }
    }
}

/// One outbound transfer recorded by a frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTransfer {
    /// Value moved
    pub value: u128,
    /// Attached call data; empty for plain value transfers
    pub data: Vec<u8>,
    /// Gas forwarded with the transfer
    pub gas_limit: u64,
    /// Gas locked for the callback of an async transfer
    pub gas_locked: u64,
    /// Sender of the transfer
    pub sender: Address,
    /// Kind of call the transfer will trigger at the destination
    pub call_type: Option<CallType>,
}

/// Transfers addressed to a single account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputAccount {
    /// Receiving address
    pub address: Address,
    /// Transfers in the order they were made
    pub transfers: Vec<OutputTransfer>,
}

/// Result of executing one contract call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmOutput {
    /// Final return code
    pub return_code: ReturnCode,
    /// Human readable failure message
    pub return_message: String,
    /// Values finished by the contract, in order
    pub return_data: Vec<Vec<u8>>,
    /// Unused gas handed back to the caller
    pub gas_remaining: u64,
    /// Outbound transfers keyed by receiver, in first-seen order
    pub output_accounts: IndexMap<Address, OutputAccount>,
}

impl VmOutput {
    /// Successful output with the given return data
    pub fn ok(return_data: Vec<Vec<u8>>, gas_remaining: u64) -> Self {
        Self {
            return_code: ReturnCode::Ok,
            return_message: String::new(),
            return_data,
            gas_remaining,
            output_accounts: IndexMap::new(),
        }
    }

    /// Failed output; a failed frame forfeits its gas
    pub fn failed(return_code: ReturnCode, message: impl Into<String>) -> Self {
        Self {
            return_code,
            return_message: message.into(),
            return_data: Vec::new(),
            gas_remaining: 0,
            output_accounts: IndexMap::new(),
        }
    }

    /// Last transfer made towards `receiver`, if any
    pub fn last_transfer_to(&self, receiver: &Address) -> Option<&OutputTransfer> {
        self.output_accounts
            .get(receiver)
            .and_then(|account| account.transfers.last())
    }
}

/// Failure raised by contract code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    /// Code reported in the frame output
    pub code: ReturnCode,
    /// Message reported in the frame output
    pub message: String,
}

impl ContractError {
    /// Error signalled by the contract itself
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            code: ReturnCode::UserError,
            message: message.into(),
        }
    }

    /// Error with an explicit code
    pub fn new(code: ReturnCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ContractError {}

/// Minimal big-endian encoding of an unsigned integer; zero encodes as no bytes
pub fn encode_uint(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

/// Inverse of [`encode_uint`]; returns `None` for inputs wider than 16 bytes
pub fn decode_uint(bytes: &[u8]) -> Option<u128> {
    if bytes.len() > 16 {
        return None;
    }
    Some(bytes.iter().fold(0u128, |acc, b| acc.wrapping_shl(8) | u128::from(*b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uint_encoding() {
        assert!(encode_uint(0).is_empty());
        assert_eq!(encode_uint(4), vec![4]);
        assert_eq!(encode_uint(0x0102), vec![1, 2]);
        assert_eq!(decode_uint(&[]), Some(0));
        assert_eq!(decode_uint(&[1, 2]), Some(0x0102));
        assert_eq!(decode_uint(&[0u8; 17]), None);
    }

    #[test]
    fn test_last_transfer_to() {
        let receiver = [9u8; 32];
        let mut output = VmOutput::ok(Vec::new(), 0);
        assert!(output.last_transfer_to(&receiver).is_none());

        output.output_accounts.insert(
            receiver,
            OutputAccount {
                address: receiver,
                transfers: vec![
                    OutputTransfer { value: 1, ..Default::default() },
                    OutputTransfer { value: 2, ..Default::default() },
                ],
            },
        );
        assert_eq!(output.last_transfer_to(&receiver).map(|t| t.value), Some(2));
    }

    #[test]
    fn test_failed_output_forfeits_gas() {
        let output = VmOutput::failed(ReturnCode::UserError, "boom");
        assert_eq!(output.gas_remaining, 0);
        assert_eq!(output.return_message, "boom");
        assert!(!output.return_code.is_ok());
    }
}
