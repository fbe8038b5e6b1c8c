//! Call data codec
//!
//! Async calls carry their target function and arguments as one opaque byte
//! buffer. The default format is `function@hexarg@hexarg...`.

use crate::error::{Result, TosVmError};

/// Separator between the function name and each hex argument
pub const ARGUMENT_SEPARATOR: u8 = b'@';

/// Decodes and encodes opaque call payloads
pub trait CallDataCodec {
    /// Splits a payload into function name and raw arguments
    fn parse_data(&self, data: &[u8]) -> Result<(String, Vec<Vec<u8>>)>;

    /// Builds a payload from a function name and raw arguments
    fn encode_data(&self, function: &str, arguments: &[Vec<u8>]) -> Vec<u8>;
}

/// Parser for the `function@hexarg@hexarg` format
#[derive(Debug, Clone, Copy, Default)]
pub struct CallArgsParser;

impl CallArgsParser {
    /// Creates a parser
    pub fn new() -> Self {
        Self
    }
}

impl CallDataCodec for CallArgsParser {
    fn parse_data(&self, data: &[u8]) -> Result<(String, Vec<Vec<u8>>)> {
        if data.is_empty() {
            return Err(TosVmError::ParseError("empty call data".to_string()));
        }

        let mut tokens = data.split(|b| *b == ARGUMENT_SEPARATOR);
        let function = tokens
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| TosVmError::ParseError("missing function name".to_string()))?;
        let function = std::str::from_utf8(function)
            .map_err(|_| TosVmError::ParseError("function name is not valid UTF-8".to_string()))?;

        let arguments = tokens
            .map(|token| {
                hex::decode(token).map_err(|err| TosVmError::ParseError(err.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((function.to_string(), arguments))
    }

    fn encode_data(&self, function: &str, arguments: &[Vec<u8>]) -> Vec<u8> {
        let mut data = function.as_bytes().to_vec();
        for argument in arguments {
            data.push(ARGUMENT_SEPARATOR);
            data.extend_from_slice(hex::encode(argument).as_bytes());
        }
        data
    }
}

/// Length of `function` and `arguments` once encoded as call data
pub fn encoded_data_length(function: &str, arguments: &[Vec<u8>]) -> usize {
    arguments.iter().fold(function.len(), |len, argument| {
        len.saturating_add(1).saturating_add(argument.len().saturating_mul(2))
    })
}
