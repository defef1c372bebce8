//! Transaction hash recovery from send errors.
//!
//! Some providers raise on the client side after the node already accepted
//! the transaction. When the error still carries the hash, the submission
//! counts as broadcast and must not be resent. Extraction runs an ordered
//! list of strategies and stops at the first valid 32-byte hash.

use crate::traits::SendError;
use alloy::primitives::B256;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::str::FromStr;

static TX_HASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"0x[0-9a-fA-F]{64}\b").expect("static regex"));

static NONCE_CONFLICT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)nonce|replacement").expect("static regex")
});

const HASH_FIELDS: [&str; 4] = ["hash", "transactionHash", "txHash", "tx_hash"];

/// Where a hash may be hiding in a send error, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashExtraction {
    TopLevelField,
    NestedData,
    NestedCause,
    MessagePattern,
}

impl HashExtraction {
    pub const ORDER: [HashExtraction; 4] = [
        HashExtraction::TopLevelField,
        HashExtraction::NestedData,
        HashExtraction::NestedCause,
        HashExtraction::MessagePattern,
    ];

    pub fn extract(self, error: &SendError) -> Option<B256> {
        match self {
            HashExtraction::TopLevelField => error.payload.as_ref().and_then(hash_field),
            HashExtraction::NestedData => error
                .payload
                .as_ref()
                .and_then(|p| p.get("data"))
                .and_then(hash_in_value),
            HashExtraction::NestedCause => error
                .payload
                .as_ref()
                .and_then(|p| p.get("cause"))
                .and_then(hash_in_value),
            HashExtraction::MessagePattern => hash_in_text(&error.message),
        }
    }
}

/// Returns the first hash found by the strategies in [`HashExtraction::ORDER`].
pub fn recover_tx_hash(error: &SendError) -> Option<(B256, HashExtraction)> {
    HashExtraction::ORDER
        .iter()
        .find_map(|strategy| strategy.extract(error).map(|hash| (hash, *strategy)))
}

/// True when the error is a nonce or replacement rejection.
pub fn is_nonce_conflict(message: &str) -> bool {
    NONCE_CONFLICT_RE.is_match(message)
}

fn parse_hash(s: &str) -> Option<B256> {
    let s = s.trim();
    if s.len() != 66 || !TX_HASH_RE.is_match(s) {
        return None;
    }
    B256::from_str(s).ok()
}

fn hash_field(value: &Value) -> Option<B256> {
    HASH_FIELDS
        .iter()
        .filter_map(|field| value.get(field).and_then(Value::as_str))
        .find_map(parse_hash)
}

/// A nested value is either the hash itself, an object holding one of the
/// known hash fields, or a further `data`/`cause` wrapper.
fn hash_in_value(value: &Value) -> Option<B256> {
    match value {
        Value::String(s) => parse_hash(s),
        Value::Object(_) => hash_field(value)
            .or_else(|| value.get("data").and_then(hash_in_value))
            .or_else(|| value.get("cause").and_then(hash_in_value)),
        _ => None,
    }
}

fn hash_in_text(text: &str) -> Option<B256> {
    TX_HASH_RE
        .find(text)
        .and_then(|m| B256::from_str(m.as_str()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hash_str() -> String {
        format!("0x{}", "ab".repeat(32))
    }

    #[test]
    fn test_top_level_field() {
        let err = SendError::new("boom").with_payload(json!({ "transactionHash": hash_str() }));
        let (hash, strategy) = recover_tx_hash(&err).unwrap();
        assert_eq!(hash, B256::repeat_byte(0xab));
        assert_eq!(strategy, HashExtraction::TopLevelField);
    }

    #[test]
    fn test_nested_data_object_and_string() {
        let obj = SendError::new("boom").with_payload(json!({ "data": { "hash": hash_str() } }));
        assert_eq!(recover_tx_hash(&obj).unwrap().1, HashExtraction::NestedData);

        let string = SendError::new("boom").with_payload(json!({ "data": hash_str() }));
        assert_eq!(recover_tx_hash(&string).unwrap().1, HashExtraction::NestedData);
    }

    #[test]
    fn test_nested_cause_chain() {
        let err = SendError::new("boom")
            .with_payload(json!({ "cause": { "cause": { "txHash": hash_str() } } }));
        assert_eq!(recover_tx_hash(&err).unwrap().1, HashExtraction::NestedCause);
    }

    #[test]
    fn test_message_pattern_is_last_resort() {
        let err = SendError::new(format!("request timed out, tx {} may be pending", hash_str()));
        let (hash, strategy) = recover_tx_hash(&err).unwrap();
        assert_eq!(hash, B256::repeat_byte(0xab));
        assert_eq!(strategy, HashExtraction::MessagePattern);
    }

    #[test]
    fn test_rejects_short_or_malformed_hashes() {
        let err = SendError::new("execution reverted: 0xdeadbeef")
            .with_payload(json!({ "hash": "0x1234", "data": { "hash": 42 } }));
        assert!(recover_tx_hash(&err).is_none());
    }

    #[test]
    fn test_nonce_conflict_patterns() {
        assert!(is_nonce_conflict("nonce too low: next nonce 8, tx nonce 7"));
        assert!(is_nonce_conflict("replacement transaction underpriced"));
        // The node already holds this exact transaction; hash recovery handles it
        assert!(!is_nonce_conflict("Known transaction: already known"));
        assert!(!is_nonce_conflict("insufficient funds for gas * price + value"));
    }
}
