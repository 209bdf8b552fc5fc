//! Wire types for the CMDB API.
//!
//! # Design
//! Result records mirror the server's JSON verbatim. Every field defaults so
//! a response missing a field decodes to its zero value instead of failing.
//! Search results keep `numfound` and `total` as separate fields even though
//! the server currently reports them equal — they are distinct wire fields
//! and may diverge under future pagination semantics.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Which attribute of each matched CI the server should key results by.
///
/// Sent verbatim; the client performs no validation. `Default` sends the
/// empty string and lets the server pick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetKey {
    #[default]
    Default,
    Id,
    Alias,
    Name,
}

impl RetKey {
    pub fn as_str(self) -> &'static str {
        match self {
            RetKey::Default => "",
            RetKey::Id => "id",
            RetKey::Alias => "alias",
            RetKey::Name => "name",
        }
    }
}

/// Server behavior when an attribute in the payload does not exist on the
/// CI type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NoAttrPolicy {
    #[default]
    Default,
    Reject,
}

impl NoAttrPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            NoAttrPolicy::Default => "",
            NoAttrPolicy::Reject => "reject",
        }
    }
}

/// Server behavior when a CI with the same unique value already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExistPolicy {
    #[default]
    Default,
    Need,
    Reject,
    Replace,
}

impl ExistPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ExistPolicy::Default => "",
            ExistPolicy::Need => "need",
            ExistPolicy::Reject => "reject",
            ExistPolicy::Replace => "replace",
        }
    }
}

/// Parameters for a CI search (`GET /ci/s`).
///
/// `page` and `count` are always sent, zero included; the server applies its
/// own defaults.
#[derive(Debug, Clone, Default)]
pub struct CiQuery {
    /// Search expression, e.g. `_type:server`.
    pub q: String,
    /// Comma-separated list of fields to return.
    pub fl: String,
    pub sort: String,
    pub page: i64,
    pub count: i64,
    pub ret_key: RetKey,
}

/// Parameters for a relation search (`GET /ci_relations/s`).
#[derive(Debug, Clone, Default)]
pub struct RelationQuery {
    /// CI id to walk relations from.
    pub root_id: i64,
    /// Traversal depth, as the server expects it (e.g. `"1"`).
    pub level: String,
    /// Walk incoming edges instead of outgoing when nonzero.
    pub reverse: i64,
    pub q: String,
    pub fl: String,
    pub sort: String,
    pub page: i64,
    pub count: i64,
    pub ret_key: RetKey,
}

/// Error body the server attaches to non-200 responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AddCiResult {
    #[serde(default)]
    pub ci_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct UpdateCiResult {
    #[serde(default)]
    pub ci_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DeleteCiResult {
    #[serde(default)]
    pub message: String,
}

/// One page of CI search results.
///
/// Each `result` entry is the CI's attributes exactly as the server sent
/// them — arbitrary keys, values untouched.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GetCiResult {
    /// Match counts per CI type.
    #[serde(default)]
    pub counter: BTreeMap<String, i64>,
    /// Server-computed facet breakdowns, free-form.
    #[serde(default)]
    pub facet: Map<String, Value>,
    #[serde(default)]
    pub numfound: i64,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub result: Vec<Map<String, Value>>,
    #[serde(default)]
    pub total: i64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AddRelationResult {
    #[serde(default)]
    pub cr_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DeleteRelationResult {
    #[serde(default)]
    pub message: String,
}

/// One page of relation search results; same shape as [`GetCiResult`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GetRelationResult {
    #[serde(default)]
    pub counter: BTreeMap<String, i64>,
    #[serde(default)]
    pub facet: Map<String, Value>,
    #[serde(default)]
    pub numfound: i64,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub result: Vec<Map<String, Value>>,
    #[serde(default)]
    pub total: i64,
}
