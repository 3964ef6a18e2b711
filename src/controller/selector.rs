//! Equality-based label selectors
//!
//! Produces the canonical string form the API server uses for
//! `matchLabels` selectors: requirements sorted by key, `key=value`,
//! comma separated. Keys and values are validated against the Kubernetes
//! label syntax so a malformed selector is never published.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

/// Build the canonical selector string for `labels`.
///
/// Fails if there are no labels at all or any key or value is not a valid
/// Kubernetes label.
pub fn selector_from_labels(labels: &BTreeMap<String, String>) -> Result<String> {
    if labels.is_empty() {
        return Err(Error::InvalidSelector(
            "refusing to build a selector that matches everything".to_string(),
        ));
    }

    let mut requirements = Vec::with_capacity(labels.len());
    for (key, value) in labels {
        validate_label_key(key).map_err(|e| Error::InvalidSelector(format!("key {key:?}: {e}")))?;
        validate_label_value(value)
            .map_err(|e| Error::InvalidSelector(format!("value {value:?} for key {key}: {e}")))?;
        requirements.push(format!("{key}={value}"));
    }

    Ok(requirements.join(","))
}

fn validate_label_key(key: &str) -> std::result::Result<(), String> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN {
            return Err(format!("prefix must be 1-{MAX_PREFIX_LEN} characters"));
        }
        if !prefix.split('.').all(is_dns_label) {
            return Err("prefix must be a DNS subdomain".to_string());
        }
    }

    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    validate_name_part(name)
}

fn validate_label_value(value: &str) -> std::result::Result<(), String> {
    if value.is_empty() {
        return Ok(());
    }
    validate_name_part(value)
}

// [A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?, at most 63 characters
fn validate_name_part(part: &str) -> std::result::Result<(), String> {
    if part.len() > MAX_NAME_LEN {
        return Err(format!("must be at most {MAX_NAME_LEN} characters"));
    }
    let bytes = part.as_bytes();
    let alnum = |b: &u8| b.is_ascii_alphanumeric();
    if !bytes.first().is_some_and(alnum) || !bytes.last().is_some_and(alnum) {
        return Err("must start and end with an alphanumeric character".to_string());
    }
    if !bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
    {
        return Err("may only contain alphanumerics, '-', '_' or '.'".to_string());
    }
    Ok(())
}

fn is_dns_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= MAX_NAME_LEN
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes[0] != b'-'
        && bytes[bytes.len() - 1] != b'-'
}
