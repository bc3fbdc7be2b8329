//! ERC-20 transfer calldata decoding and token amounts
//!
//! A `transfer(address,uint256)` call is encoded as a 4-byte selector followed by
//! two 32-byte ABI words: the recipient (left-padded address) and the raw amount.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use thiserror::Error;

/// Solidity signature of the ERC-20 transfer function.
pub const TRANSFER_SIGNATURE: &str = "transfer(address,uint256)";

/// Hex length of selector plus two ABI words.
const TRANSFER_INPUT_HEX_LEN: usize = 8 + 64 + 64;

/// Largest decimals value whose scale fits in u128.
const MAX_DECIMALS: u8 = 38;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("calldata is not a transfer call (selector 0x{selector})")]
    NotATransfer { selector: String },
    #[error("transfer calldata too short: {len} hex chars")]
    TooShort { len: usize },
    #[error("calldata is not valid hex: {0}")]
    InvalidHex(String),
    #[error("transfer amount does not fit in 128 bits")]
    AmountOverflow,
    #[error("invalid token amount '{0}'")]
    InvalidAmount(String),
    #[error("unsupported token decimals {0}")]
    UnsupportedDecimals(u8),
}

/// Recipient and raw amount of a decoded transfer call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransfer {
    /// Recipient address, lowercase with `0x` prefix
    pub recipient: String,
    /// Amount in the token's smallest unit
    pub raw_amount: u128,
}

/// Returns the 4-byte selector of `transfer(address,uint256)` (0xa9059cbb).
pub fn transfer_selector() -> [u8; 4] {
    let hash = Keccak256::digest(TRANSFER_SIGNATURE.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash[..4]);
    selector
}

/// Decodes the calldata of an ERC-20 transfer transaction.
///
/// # Arguments
///
/// * `input` - Transaction input as hex, with or without `0x`
///
/// # Returns
///
/// * `Ok(DecodedTransfer)` - Recipient and raw amount
/// * `Err(DecodeError)` - Wrong selector, truncated data, bad hex or an amount above u128
pub fn decode_transfer_input(input: &str) -> Result<DecodedTransfer, DecodeError> {
    let data = input.strip_prefix("0x").unwrap_or(input).to_ascii_lowercase();
    if !data.is_ascii() {
        return Err(DecodeError::InvalidHex("non-ASCII characters in calldata".to_string()));
    }

    if data.len() < 8 {
        return Err(DecodeError::TooShort { len: data.len() });
    }
    let selector = &data[..8];
    if selector != hex::encode(transfer_selector()) {
        return Err(DecodeError::NotATransfer {
            selector: selector.to_string(),
        });
    }
    if data.len() < TRANSFER_INPUT_HEX_LEN {
        return Err(DecodeError::TooShort { len: data.len() });
    }

    let address_word = &data[8..72];
    let amount_word = hex::decode(&data[72..136]).map_err(|e| DecodeError::InvalidHex(e.to_string()))?;
    hex::decode(address_word).map_err(|e| DecodeError::InvalidHex(e.to_string()))?;

    // Upper 16 bytes of the uint256 must be zero for the amount to fit in u128
    if amount_word[..16].iter().any(|b| *b != 0) {
        return Err(DecodeError::AmountOverflow);
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&amount_word[16..]);

    Ok(DecodedTransfer {
        recipient: format!("0x{}", &address_word[24..]),
        raw_amount: u128::from_be_bytes(low),
    })
}

// ============================================================================
// TOKEN AMOUNT
// ============================================================================

/// A token amount with its decimals, kept exact.
///
/// `Display` renders the scaled value without trailing zeros, e.g. `5.0` or `12.345`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    raw: u128,
    decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: u128, decimals: u8) -> Result<Self, DecodeError> {
        if decimals > MAX_DECIMALS {
            return Err(DecodeError::UnsupportedDecimals(decimals));
        }
        Ok(Self { raw, decimals })
    }

    /// Parses a decimal string of smallest units, as explorers report them.
    pub fn from_decimal_str(raw: &str, decimals: u8) -> Result<Self, DecodeError> {
        let raw_value = raw
            .trim()
            .parse::<u128>()
            .map_err(|_| DecodeError::InvalidAmount(raw.to_string()))?;
        Self::new(raw_value, decimals)
    }

    pub fn raw(&self) -> u128 {
        self.raw
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Scaled value as a float, for display and comparisons that tolerate rounding.
    pub fn as_f64(&self) -> f64 {
        self.raw as f64 / 10f64.powi(self.decimals as i32)
    }

    fn scale(&self) -> u128 {
        10u128.pow(self.decimals as u32)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = self.scale();
        let whole = self.raw / scale;
        if self.decimals == 0 {
            return write!(f, "{}.0", whole);
        }
        let fraction = format!("{:0width$}", self.raw % scale, width = self.decimals as usize);
        let fraction = fraction.trim_end_matches('0');
        if fraction.is_empty() {
            write!(f, "{}.0", whole)
        } else {
            write!(f, "{}.{}", whole, fraction)
        }
    }
}
