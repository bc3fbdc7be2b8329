//! Transaction hash intake
//!
//! Users paste either a bare hash or an explorer link. This module pulls the
//! hash out of either form and checks it against the chain's hash format.

use thiserror::Error;
use url::Url;

use crate::validator::Chain;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxHashError {
    #[error("no transaction hash found in input")]
    NotFound,
    #[error("'{hash}' is not a valid {chain} transaction hash")]
    WrongFormat { hash: String, chain: Chain },
}

/// Extracts a transaction hash from user input.
///
/// Accepts a bare hash (`0x` + 64 hex or 64 hex) or an explorer link whose
/// path or fragment contains `/tx/<hash>` or `/transaction/<hash>`, such as
/// `https://etherscan.io/tx/0x...` and `https://tronscan.org/#/transaction/...`.
pub fn extract_tx_hash(input: &str) -> Option<String> {
    let input = input.trim();
    if is_hash_token(input) {
        return Some(input.to_string());
    }

    let url = Url::parse(input).ok()?;
    let parts = [url.path(), url.fragment().unwrap_or_default()];
    let found = parts.into_iter().find_map(hash_after_marker).map(str::to_string);
    found
}

/// Returns whether `hash` has the exact format `chain` uses.
///
/// ERC-20 hashes carry a `0x` prefix, TRC-20 hashes are bare hex.
pub fn is_valid_for_chain(hash: &str, chain: Chain) -> bool {
    match chain {
        Chain::Erc20 => hash.strip_prefix("0x").map(is_hex64).unwrap_or(false),
        Chain::Trc20 => is_hex64(hash),
    }
}

/// Extracts, validates and lowercases a hash for `chain`.
///
/// Lowercasing keeps store keys stable regardless of how the user typed the hash.
pub fn parse_tx_hash(input: &str, chain: Chain) -> Result<String, TxHashError> {
    let hash = extract_tx_hash(input).ok_or(TxHashError::NotFound)?;
    if !is_valid_for_chain(&hash, chain) {
        return Err(TxHashError::WrongFormat { hash, chain });
    }
    Ok(normalize(&hash))
}

/// Canonical form of a hash, as used in store keys.
pub fn normalize(hash: &str) -> String {
    hash.trim().to_ascii_lowercase()
}

fn hash_after_marker(part: &str) -> Option<&str> {
    let mut segments = part.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment == "tx" || segment == "transaction" {
            if let Some(candidate) = segments.next() {
                if is_hash_token(candidate) {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

fn is_hash_token(s: &str) -> bool {
    is_hex64(s.strip_prefix("0x").unwrap_or(s))
}

fn is_hex64(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
