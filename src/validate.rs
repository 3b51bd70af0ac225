//! Shape checks for addresses and chain ids. No chain semantics beyond that.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address regex"));
static CHAIN_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-f]+$").expect("chain id regex"));

const CHAIN_ID_MIN_LEN: usize = 3;
const CHAIN_ID_MAX_LEN: usize = 64;

pub fn is_valid_address(address: &str) -> bool {
    ADDRESS.is_match(address)
}

/// `0x`-prefixed lowercase hex, non-zero, 3..=64 characters including the prefix.
pub fn is_valid_chain_id(chain_id: &str) -> bool {
    (CHAIN_ID_MIN_LEN..=CHAIN_ID_MAX_LEN).contains(&chain_id.len())
        && CHAIN_ID.is_match(chain_id)
        && chain_id[2..].bytes().any(|b| b != b'0')
}

/// Keep valid addresses in endpoint order.
pub fn filter_addresses<I, S>(accounts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    accounts
        .into_iter()
        .filter(|a| is_valid_address(a.as_ref()))
        .map(|a| a.as_ref().to_string())
        .collect()
}

/// Coerce an endpoint chain id (hex string or JSON number) into canonical form.
///
/// Returns the candidate even when it fails validation; callers decide.
pub fn normalize_chain_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_ascii_lowercase()),
        Value::Number(n) => n.as_u64().map(|n| format!("0x{:x}", n)),
        Value::Object(obj) => obj.get("chainId").and_then(normalize_chain_id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn addresses() {
        assert!(is_valid_address("0x52908400098527886E0F7030069857D2E4169EE7"));
        assert!(is_valid_address("0xde709f2102306220921060314715629080e2fb77"));
        assert!(!is_valid_address("52908400098527886E0F7030069857D2E4169EE7"));
        assert!(!is_valid_address("0x52908400098527886E0F7030069857D2E4169EE"));
        assert!(!is_valid_address("0x52908400098527886E0F7030069857D2E4169EE77"));
        assert!(!is_valid_address("0xZZ908400098527886E0F7030069857D2E4169EE7"));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn chain_ids() {
        assert!(is_valid_chain_id("0x1"));
        assert!(is_valid_chain_id("0x89"));
        assert!(!is_valid_chain_id("0x0"));
        assert!(!is_valid_chain_id("0x000"));
        assert!(!is_valid_chain_id("0x"));
        assert!(!is_valid_chain_id("not-hex"));
        assert!(!is_valid_chain_id("0xAB"));

        let widest = format!("0x{}", "f".repeat(62));
        assert!(is_valid_chain_id(&widest));
        let too_long = format!("0x{}", "f".repeat(65));
        assert!(!is_valid_chain_id(&too_long));
    }

    #[test]
    fn filter_keeps_order() {
        let a = "0x1111111111111111111111111111111111111111";
        let b = "0x2222222222222222222222222222222222222222";
        assert_eq!(filter_addresses([b, "junk", a]), vec![b.to_string(), a.to_string()]);
    }

    #[test]
    fn chain_id_normalization() {
        assert_eq!(normalize_chain_id(&json!(" 0xA ")), Some("0xa".into()));
        assert_eq!(normalize_chain_id(&json!(137)), Some("0x89".into()));
        assert_eq!(normalize_chain_id(&json!({"chainId": "0x1"})), Some("0x1".into()));
        assert_eq!(normalize_chain_id(&json!(null)), None);
    }
}
