//! Cache key derivation.
//!
//! Keys are `source + ":" + stable_hash(normalized params)`. Normalization
//! sorts parameters by name, lowercases names and trims values, so callers
//! can pass parameters in any order.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Hex characters of the digest kept in the key.
const HASH_LEN: usize = 16;

/// Build the cache key for a source query.
pub fn cache_key<I, K, V>(source: &str, params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    format!("{}:{}", source, params_hash(params))
}

fn params_hash<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let normalized: BTreeMap<String, String> = params
        .into_iter()
        .map(|(k, v)| (k.as_ref().trim().to_lowercase(), v.as_ref().trim().to_string()))
        .collect();

    // Length-prefixed so no value can spell out another parameter.
    let mut hasher = Sha256::new();
    for (k, v) in &normalized {
        hasher.update((k.len() as u64).to_le_bytes());
        hasher.update(k.as_bytes());
        hasher.update((v.len() as u64).to_le_bytes());
        hasher.update(v.as_bytes());
    }
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(HASH_LEN);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_independent() {
        let a = cache_key("worldbank", [("country", "UA"), ("indicator", "NY.GDP")]);
        let b = cache_key("worldbank", [("Indicator ", "NY.GDP"), ("country", " UA")]);
        assert_eq!(a, b);
        assert!(a.starts_with("worldbank:"));
        assert_eq!(a.len(), "worldbank:".len() + HASH_LEN);
    }

    #[test]
    fn test_values_distinguish_keys() {
        let a = cache_key("nvd", [("cve", "CVE-2024-0001")]);
        let b = cache_key("nvd", [("cve", "CVE-2024-0002")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_separators_in_values_do_not_collide() {
        let smuggled = cache_key("worldbank", [("country", "UA&indicator=NY.GDP")]);
        let split = cache_key("worldbank", [("country", "UA"), ("indicator", "NY.GDP")]);
        assert_ne!(smuggled, split);

        let a = cache_key("fred", [("a", "b=c")]);
        let b = cache_key("fred", [("a=b", "c")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_params_are_stable() {
        let empty: [(&str, &str); 0] = [];
        assert_eq!(cache_key("ofac", empty), cache_key("ofac", Vec::<(String, String)>::new()));
    }
}
