//! Recognition of built-in token transfer calls
//!
//! `TokenTransfer` is sent straight to the receiver. `NftTransfer` and
//! `MultiTokenTransfer` are relays: they are called on the sender itself and
//! carry the real receiver inside their arguments.

use crate::types::{decode_uint, Address};

/// Fungible token transfer: `TokenTransfer@token@amount[@function@args...]`
pub const TOKEN_TRANSFER: &str = "TokenTransfer";

/// Single NFT relay: `NftTransfer@token@nonce@amount@receiver[@function@args...]`
pub const NFT_TRANSFER: &str = "NftTransfer";

/// Multi-token relay: `MultiTokenTransfer@receiver@count(@token@nonce@amount)*[@function@args...]`
pub const MULTI_TOKEN_TRANSFER: &str = "MultiTokenTransfer";

/// One token moved by a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayment {
    /// Token identifier
    pub token_id: Vec<u8>,
    /// Token nonce; zero for fungible tokens
    pub nonce: u64,
    /// Amount moved
    pub amount: u128,
}

/// A recognized transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTransfer {
    /// Account sending the tokens
    pub sender: Address,
    /// Account receiving the tokens
    pub recipient: Address,
    /// Tokens moved
    pub payments: Vec<TokenPayment>,
    /// Function called on the receiver after the transfer, if any
    pub call_function: Option<String>,
    /// Arguments of the chained call
    pub call_args: Vec<Vec<u8>>,
}

impl ParsedTransfer {
    /// Whether a contract call is chained after the transfer
    pub fn has_chained_call(&self) -> bool {
        self.call_function.is_some()
    }
}

/// Recognizes token-transfer-shaped calls
pub trait TransferRecognizer {
    /// Parses `function(args)` sent from `sender` to `recipient`; `None` if
    /// the call is not a recognized transfer
    fn parse_transfer(
        &self,
        sender: &Address,
        recipient: &Address,
        function: &str,
        args: &[Vec<u8>],
    ) -> Option<ParsedTransfer>;

    /// Whether `function` is a relay carrying its receiver in the arguments
    fn is_relay(&self, function: &str) -> bool {
        function == NFT_TRANSFER || function == MULTI_TOKEN_TRANSFER
    }
}

/// Recognizer for the built-in transfer functions
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTransferParser;

fn to_address(bytes: &[u8]) -> Option<Address> {
    bytes.try_into().ok()
}

fn to_u64(bytes: &[u8]) -> Option<u64> {
    decode_uint(bytes).and_then(|value| u64::try_from(value).ok())
}

fn chained_call(rest: &[Vec<u8>]) -> Option<(Option<String>, Vec<Vec<u8>>)> {
    match rest.split_first() {
        None => Some((None, Vec::new())),
        Some((function, args)) if function.is_empty() => Some((None, args.to_vec())),
        Some((function, args)) => {
            let function = String::from_utf8(function.clone()).ok()?;
            Some((Some(function), args.to_vec()))
        }
    }
}

impl BuiltinTransferParser {
    fn parse_token_transfer(sender: &Address, recipient: &Address, args: &[Vec<u8>]) -> Option<ParsedTransfer> {
        if args.len() < 2 {
            return None;
        }
        let (call_function, call_args) = chained_call(&args[2..])?;
        Some(ParsedTransfer {
            sender: *sender,
            recipient: *recipient,
            payments: vec![TokenPayment {
                token_id: args[0].clone(),
                nonce: 0,
                amount: decode_uint(&args[1])?,
            }],
            call_function,
            call_args,
        })
    }

    fn parse_nft_transfer(sender: &Address, recipient: &Address, args: &[Vec<u8>]) -> Option<ParsedTransfer> {
        if args.len() < 4 || sender != recipient {
            return None;
        }
        let (call_function, call_args) = chained_call(&args[4..])?;
        Some(ParsedTransfer {
            sender: *sender,
            recipient: to_address(&args[3])?,
            payments: vec![TokenPayment {
                token_id: args[0].clone(),
                nonce: to_u64(&args[1])?,
                amount: decode_uint(&args[2])?,
            }],
            call_function,
            call_args,
        })
    }

    fn parse_multi_transfer(sender: &Address, recipient: &Address, args: &[Vec<u8>]) -> Option<ParsedTransfer> {
        if args.len() < 2 || sender != recipient {
            return None;
        }
        let count = usize::try_from(to_u64(&args[1])?).ok()?;
        let end = count.checked_mul(3)?.checked_add(2)?;
        if count == 0 || args.len() < end {
            return None;
        }
        let payments = args[2..end]
            .chunks(3)
            .map(|chunk| {
                Some(TokenPayment {
                    token_id: chunk[0].clone(),
                    nonce: to_u64(&chunk[1])?,
                    amount: decode_uint(&chunk[2])?,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        let (call_function, call_args) = chained_call(&args[end..])?;
        Some(ParsedTransfer {
            sender: *sender,
            recipient: to_address(&args[0])?,
            payments,
            call_function,
            call_args,
        })
    }
}

impl TransferRecognizer for BuiltinTransferParser {
    fn parse_transfer(
        &self,
        sender: &Address,
        recipient: &Address,
        function: &str,
        args: &[Vec<u8>],
    ) -> Option<ParsedTransfer> {
        match function {
            TOKEN_TRANSFER => Self::parse_token_transfer(sender, recipient, args),
            NFT_TRANSFER => Self::parse_nft_transfer(sender, recipient, args),
            MULTI_TOKEN_TRANSFER => Self::parse_multi_transfer(sender, recipient, args),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = [1u8; 32];
    const BOB: Address = [2u8; 32];

    #[test]
    fn test_token_transfer_without_call() {
        let parser = BuiltinTransferParser;
        let args = vec![b"TKN-01".to_vec(), vec![0x03, 0xe8]];
        let parsed = parser.parse_transfer(&ALICE, &BOB, TOKEN_TRANSFER, &args).unwrap();
        assert_eq!(parsed.recipient, BOB);
        assert_eq!(parsed.payments[0].amount, 1000);
        assert!(!parsed.has_chained_call());
    }

    #[test]
    fn test_token_transfer_with_call() {
        let parser = BuiltinTransferParser;
        let args = vec![b"TKN-01".to_vec(), vec![1], b"deposit".to_vec(), vec![9]];
        let parsed = parser.parse_transfer(&ALICE, &BOB, TOKEN_TRANSFER, &args).unwrap();
        assert_eq!(parsed.call_function.as_deref(), Some("deposit"));
        assert_eq!(parsed.call_args, vec![vec![9]]);
    }

    #[test]
    fn test_nft_relay_requires_self_call() {
        let parser = BuiltinTransferParser;
        let args = vec![b"NFT-01".to_vec(), vec![5], vec![1], BOB.to_vec()];
        assert!(parser.parse_transfer(&ALICE, &BOB, NFT_TRANSFER, &args).is_none());

        let parsed = parser.parse_transfer(&ALICE, &ALICE, NFT_TRANSFER, &args).unwrap();
        assert_eq!(parsed.recipient, BOB);
        assert_eq!(parsed.payments[0].nonce, 5);
        assert!(parser.is_relay(NFT_TRANSFER));
        assert!(!parser.is_relay(TOKEN_TRANSFER));
    }

    #[test]
    fn test_multi_transfer() {
        let parser = BuiltinTransferParser;
        let args = vec![
            BOB.to_vec(),
            vec![2],
            b"A".to_vec(), vec![], vec![10],
            b"B".to_vec(), vec![3], vec![20],
        ];
        let parsed = parser.parse_transfer(&ALICE, &ALICE, MULTI_TOKEN_TRANSFER, &args).unwrap();
        assert_eq!(parsed.recipient, BOB);
        assert_eq!(parsed.payments.len(), 2);
        assert_eq!(parsed.payments[1].nonce, 3);
        assert!(!parsed.has_chained_call());

        // Count larger than the payload
        let short = vec![BOB.to_vec(), vec![3], b"A".to_vec(), vec![], vec![10]];
        assert!(parser.parse_transfer(&ALICE, &ALICE, MULTI_TOKEN_TRANSFER, &short).is_none());
    }

    #[test]
    fn test_unknown_function() {
        let parser = BuiltinTransferParser;
        assert!(parser.parse_transfer(&ALICE, &BOB, "swap", &[]).is_none());
        assert!(parser.parse_transfer(&ALICE, &BOB, TOKEN_TRANSFER, &[b"T".to_vec()]).is_none());
    }
}
