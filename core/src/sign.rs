//! Request signing for the CMDB API.
//!
//! # Design
//! Every outgoing request carries a `_secret` field: a SHA-1 hex digest the
//! server recomputes from the received parameters to verify the caller holds
//! the shared secret. The digest input is the URL path, the secret, and the
//! parameter values concatenated in ascending key order with no separators.
//! `sign` is pure — it reads the mapping and returns a string, nothing else.

use std::collections::BTreeMap;

use serde_json::Value;
use sha1::{Digest, Sha1};

/// Parameter mapping for a single request.
///
/// `BTreeMap` gives the two properties the protocol needs: iteration in
/// ascending byte order of the keys (the signing order), and last-write-wins
/// on `insert` when fixed fields overwrite caller-supplied attributes.
pub type Params = BTreeMap<String, Value>;

/// Compute the `_secret` signature for a request.
///
/// Concatenates the URL path (host and query string excluded), the secret,
/// and the stringified parameter values in ascending key order, then returns
/// the lowercase hex SHA-1 of the result. Keys starting with `-` take part
/// in the ordering but contribute an empty string instead of their value.
///
/// Call this *before* inserting `_secret` and `_key` into the mapping; the
/// server verifies against the received parameters minus those two fields.
pub fn sign(url: &str, secret: &str, params: &Params) -> String {
    let mut input = String::new();
    input.push_str(url_path(url));
    input.push_str(secret);
    for (key, value) in params {
        if !key.starts_with('-') {
            input.push_str(&stringify(value));
        }
    }
    hex::encode(Sha1::digest(input.as_bytes()))
}

/// Extract the path component of a URL, dropping scheme, authority, query
/// string and fragment. A bare path is returned as-is (minus query/fragment).
fn url_path(url: &str) -> &str {
    let rest = match url.find("://") {
        Some(i) => {
            let after = &url[i + 3..];
            match after.find('/') {
                Some(j) => &after[j..],
                None => "",
            }
        }
        None => url,
    };
    let rest = rest.split('?').next().unwrap_or("");
    rest.split('#').next().unwrap_or("")
}

/// Canonical string form of a scalar parameter value.
///
/// Integers render as plain decimal, strings verbatim (no quoting), booleans
/// as their literal text, null as empty. Matches what the server feeds its
/// own digest, so any deviation here breaks verification.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
