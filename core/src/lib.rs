//! Blocking client library for a CMDB (Configuration Management Database)
//! HTTP API.
//!
//! # Overview
//! Create, update, delete and query Configuration Items (CIs) and the
//! relations between them. Every request is authenticated with a derived
//! SHA-1 signature (`_secret`) plus the plain API key (`_key`); the server
//! recomputes the signature from the received parameters to verify the
//! caller holds the shared secret.
//!
//! # Design
//! - `CmdbClient` is immutable after construction and safe to share; each
//!   operation is one stateless HTTP round trip.
//! - Every operation is split into `build_*` (assemble and sign a request as
//!   plain data) and `parse_*` (interpret a response), with a blocking
//!   method of the operation's name doing the round trip. The split keeps
//!   the signing contract fully testable without a network.
//! - The signature is computed over business parameters only: `_secret` and
//!   `_key` are inserted after signing, on every endpoint.
//!
//! ```no_run
//! use cmdb_core::{CmdbClient, ExistPolicy, NoAttrPolicy, Params};
//! use serde_json::json;
//!
//! let client = CmdbClient::new("https://cmdb.example.com/api/v0.1", "key", "secret");
//! let mut attrs = Params::new();
//! attrs.insert("server_name".to_string(), json!("test-1"));
//! attrs.insert("ip".to_string(), json!("192.168.0.1"));
//! let res = client
//!     .add_ci("server", NoAttrPolicy::Default, ExistPolicy::Reject, &attrs)
//!     .unwrap();
//! println!("created ci {}", res.ci_id);
//! ```

pub mod client;
pub mod error;
pub mod http;
pub mod sign;
pub mod types;

pub use client::CmdbClient;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use sign::{sign, Params};
pub use types::{
    AddCiResult, AddRelationResult, CiQuery, DeleteCiResult, DeleteRelationResult, ExistPolicy,
    GetCiResult, GetRelationResult, NoAttrPolicy, RelationQuery, ResponseError, RetKey,
    UpdateCiResult,
};
