//! Flattened key/value parsing
//!
//! The provider cannot return embedded instances. Fields such as `SpaceInfo`
//! or `OperationalStatus` arrive as a one-element string array holding
//! `Key=Value,Key=Value`. Keys and values containing `,` or `=` cannot be
//! represented and will shift the pairing; the provider never emits them.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

/// Decode the first string of `encoded` into a key/value map.
///
/// The string is split on every `,` and `=`; even tokens are keys, odd tokens
/// values. A trailing key without value is dropped and later duplicates win.
pub fn parse_flattened(encoded: &[String]) -> Result<BTreeMap<String, String>> {
    let first = encoded
        .first()
        .ok_or_else(|| anyhow!("flattened property holds no string"))?;

    Ok(pair_tokens(first))
}

fn pair_tokens(flat: &str) -> BTreeMap<String, String> {
    let tokens: Vec<&str> = flat.split(|c: char| c == ',' || c == '=').collect();

    tokens
        .chunks_exact(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect()
}
