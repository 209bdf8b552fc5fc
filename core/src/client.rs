//! The CMDB client: request builders, response parsers, and the blocking
//! methods that tie them together.
//!
//! # Design
//! `CmdbClient` is immutable after construction — base URL, key, secret and
//! a shared `ureq::Agent`. Each operation is split three ways: `build_*`
//! assembles and signs an `HttpRequest` without touching the network,
//! `parse_*` interprets an `HttpResponse`, and the method named after the
//! operation does build → send → parse in one blocking call. The split keeps
//! the signing contract testable offline while the named methods give the
//! one-call-per-round-trip surface callers actually use.
//!
//! Signing order is a strict contract on every endpoint: the signature is
//! computed over the business parameters only, *then* `_secret` and `_key`
//! are inserted into the outgoing payload. The server strips those two
//! fields and recomputes; adding them in any other order changes the digest.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::sign::{sign, stringify, Params};
use crate::types::{
    AddCiResult, AddRelationResult, CiQuery, DeleteCiResult, DeleteRelationResult, ExistPolicy,
    GetCiResult, GetRelationResult, NoAttrPolicy, RelationQuery, ResponseError, UpdateCiResult,
};

/// Blocking client for a CMDB HTTP API.
///
/// Holds the base URL (trailing slash stripped), the API key sent with every
/// request, the secret used only to derive signatures, and a shared HTTP
/// agent. The agent is internally reference-counted, so the client can be
/// cloned and used from multiple threads; every call is an independent
/// stateless round trip.
#[derive(Clone)]
pub struct CmdbClient {
    base_url: String,
    key: String,
    secret: String,
    agent: ureq::Agent,
}

impl std::fmt::Debug for CmdbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The secret never leaves the process, not even through Debug.
        f.debug_struct("CmdbClient")
            .field("base_url", &self.base_url)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl CmdbClient {
    /// Create a client for the API rooted at `base_url`, e.g.
    /// `https://cmdb.example.com/api/v0.1`.
    pub fn new(base_url: &str, key: &str, secret: &str) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            secret: secret.to_string(),
            agent,
        }
    }

    /// Sign `params` for `url`, then insert `_secret` and `_key`.
    ///
    /// The insertion order relative to signing is the contract: neither
    /// field contributes to the digest.
    fn authed(&self, url: &str, mut params: Params) -> Params {
        let secret = sign(url, &self.secret, &params);
        params.insert("_secret".to_string(), Value::String(secret));
        params.insert("_key".to_string(), Value::String(self.key.clone()));
        params
    }

    // --- CI operations ---

    pub fn build_add_ci(
        &self,
        ci_type: &str,
        no_attr_policy: NoAttrPolicy,
        exist_policy: ExistPolicy,
        attrs: &Params,
    ) -> HttpRequest {
        let url = format!("{}/ci", self.base_url);
        let mut params = attrs.clone();
        params.insert("ci_type".to_string(), Value::String(ci_type.to_string()));
        // Field name spelled exactly as the wire protocol expects it.
        params.insert(
            "no_attrbute_policy".to_string(),
            Value::String(no_attr_policy.as_str().to_string()),
        );
        params.insert(
            "exist_policy".to_string(),
            Value::String(exist_policy.as_str().to_string()),
        );
        let params = self.authed(&url, params);
        HttpRequest::with_body(HttpMethod::Post, url, params)
    }

    pub fn parse_add_ci(&self, response: HttpResponse) -> Result<AddCiResult, ApiError> {
        parse_body(response)
    }

    /// Create a CI of `ci_type` with the given attributes. The CI type must
    /// already exist on the server.
    pub fn add_ci(
        &self,
        ci_type: &str,
        no_attr_policy: NoAttrPolicy,
        exist_policy: ExistPolicy,
        attrs: &Params,
    ) -> Result<AddCiResult, ApiError> {
        let req = self.build_add_ci(ci_type, no_attr_policy, exist_policy, attrs);
        let response = self.send(&req)?;
        self.parse_add_ci(response)
    }

    pub fn build_delete_ci(&self, ci_id: i64) -> HttpRequest {
        let url = format!("{}/ci/{ci_id}", self.base_url);
        let params = self.authed(&url, Params::new());
        HttpRequest::with_body(HttpMethod::Delete, url, params)
    }

    pub fn parse_delete_ci(&self, response: HttpResponse) -> Result<DeleteCiResult, ApiError> {
        parse_body(response)
    }

    /// Delete a CI by id.
    pub fn delete_ci(&self, ci_id: i64) -> Result<DeleteCiResult, ApiError> {
        let req = self.build_delete_ci(ci_id);
        let response = self.send(&req)?;
        self.parse_delete_ci(response)
    }

    pub fn build_update_ci(&self, ci_id: i64, ci_type: &str, attrs: &Params) -> HttpRequest {
        let url = format!("{}/ci/{ci_id}", self.base_url);
        let mut params = attrs.clone();
        params.insert("ci_type".to_string(), Value::String(ci_type.to_string()));
        let params = self.authed(&url, params);
        HttpRequest::with_body(HttpMethod::Put, url, params)
    }

    pub fn parse_update_ci(&self, response: HttpResponse) -> Result<UpdateCiResult, ApiError> {
        parse_body(response)
    }

    /// Update attributes of an existing CI.
    pub fn update_ci(
        &self,
        ci_id: i64,
        ci_type: &str,
        attrs: &Params,
    ) -> Result<UpdateCiResult, ApiError> {
        let req = self.build_update_ci(ci_id, ci_type, attrs);
        let response = self.send(&req)?;
        self.parse_update_ci(response)
    }

    pub fn build_get_ci(&self, query: &CiQuery) -> HttpRequest {
        let url = format!("{}/ci/s", self.base_url);
        let mut params = Params::new();
        params.insert("q".to_string(), Value::String(query.q.clone()));
        params.insert("fl".to_string(), Value::String(query.fl.clone()));
        params.insert("sort".to_string(), Value::String(query.sort.clone()));
        params.insert("page".to_string(), Value::from(query.page));
        params.insert("count".to_string(), Value::from(query.count));
        params.insert(
            "ret_key".to_string(),
            Value::String(query.ret_key.as_str().to_string()),
        );
        let params = self.authed(&url, params);
        HttpRequest::with_query(url, query_pairs(&params))
    }

    pub fn parse_get_ci(&self, response: HttpResponse) -> Result<GetCiResult, ApiError> {
        parse_body(response)
    }

    /// Search CIs.
    pub fn get_ci(&self, query: &CiQuery) -> Result<GetCiResult, ApiError> {
        let req = self.build_get_ci(query);
        let response = self.send(&req)?;
        self.parse_get_ci(response)
    }

    // --- relation operations ---

    pub fn build_add_relation(&self, src_ci_id: i64, dst_ci_id: i64) -> HttpRequest {
        let url = format!("{}/ci_relations/{src_ci_id}/{dst_ci_id}", self.base_url);
        let params = self.authed(&url, Params::new());
        HttpRequest::with_body(HttpMethod::Post, url, params)
    }

    pub fn parse_add_relation(&self, response: HttpResponse) -> Result<AddRelationResult, ApiError> {
        parse_body(response)
    }

    /// Create a directed relation from `src_ci_id` to `dst_ci_id`. The
    /// relation type between the two CI types must already exist.
    pub fn add_relation(&self, src_ci_id: i64, dst_ci_id: i64) -> Result<AddRelationResult, ApiError> {
        let req = self.build_add_relation(src_ci_id, dst_ci_id);
        let response = self.send(&req)?;
        self.parse_add_relation(response)
    }

    pub fn build_delete_relation(
        &self,
        relation_id: i64,
        first_ci_id: i64,
        second_ci_id: i64,
    ) -> HttpRequest {
        // Nonzero relation id wins; zero falls back to addressing the edge
        // by its two endpoint CIs.
        let url = if relation_id != 0 {
            format!("{}/ci_relations/{relation_id}", self.base_url)
        } else {
            format!("{}/ci_relations/{first_ci_id}/{second_ci_id}", self.base_url)
        };
        let params = self.authed(&url, Params::new());
        HttpRequest::with_body(HttpMethod::Delete, url, params)
    }

    pub fn parse_delete_relation(
        &self,
        response: HttpResponse,
    ) -> Result<DeleteRelationResult, ApiError> {
        parse_body(response)
    }

    /// Delete a relation, either by its own id (`relation_id` nonzero) or by
    /// the pair of CIs it connects (`relation_id` zero).
    pub fn delete_relation(
        &self,
        relation_id: i64,
        first_ci_id: i64,
        second_ci_id: i64,
    ) -> Result<DeleteRelationResult, ApiError> {
        let req = self.build_delete_relation(relation_id, first_ci_id, second_ci_id);
        let response = self.send(&req)?;
        self.parse_delete_relation(response)
    }

    pub fn build_get_relation(&self, query: &RelationQuery) -> HttpRequest {
        let url = format!("{}/ci_relations/s", self.base_url);
        let mut params = Params::new();
        params.insert("root_id".to_string(), Value::from(query.root_id));
        params.insert("level".to_string(), Value::String(query.level.clone()));
        params.insert("reverse".to_string(), Value::from(query.reverse));
        params.insert("q".to_string(), Value::String(query.q.clone()));
        params.insert("fl".to_string(), Value::String(query.fl.clone()));
        params.insert("sort".to_string(), Value::String(query.sort.clone()));
        params.insert("page".to_string(), Value::from(query.page));
        params.insert("count".to_string(), Value::from(query.count));
        params.insert(
            "ret_key".to_string(),
            Value::String(query.ret_key.as_str().to_string()),
        );
        let params = self.authed(&url, params);
        HttpRequest::with_query(url, query_pairs(&params))
    }

    pub fn parse_get_relation(&self, response: HttpResponse) -> Result<GetRelationResult, ApiError> {
        parse_body(response)
    }

    /// Search relations reachable from a root CI.
    pub fn get_relation(&self, query: &RelationQuery) -> Result<GetRelationResult, ApiError> {
        let req = self.build_get_relation(query);
        let response = self.send(&req)?;
        self.parse_get_relation(response)
    }

    // --- transport ---

    /// Execute a built request and return the raw response.
    ///
    /// Status interpretation is left to the parsers: the agent is configured
    /// so non-2xx statuses come back as data, and only network-level
    /// failures surface as `Transport`.
    pub fn send(&self, req: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let result = match req.method {
            HttpMethod::Get => {
                let mut call = self.agent.get(&req.url);
                for (k, v) in &req.query {
                    call = call.query(k, v);
                }
                call.call()
            }
            HttpMethod::Post => self
                .agent
                .post(&req.url)
                .content_type("application/json")
                .send(encode_body(&req.body)?.as_bytes()),
            HttpMethod::Put => self
                .agent
                .put(&req.url)
                .content_type("application/json")
                .send(encode_body(&req.body)?.as_bytes()),
            HttpMethod::Delete => self
                .agent
                .delete(&req.url)
                .force_send_body()
                .content_type("application/json")
                .send(encode_body(&req.body)?.as_bytes()),
        };

        let mut response = result.map_err(|e| ApiError::Transport(Box::new(e)))?;
        let status = response.status().as_u16();
        // A body that dies mid-read is a network failure, not a decode one.
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ApiError::Transport(Box::new(e)))?;
        Ok(HttpResponse { status, body })
    }
}

/// Serialize a request body; a missing body becomes an empty JSON object.
fn encode_body(body: &Option<Params>) -> Result<String, ApiError> {
    match body {
        Some(params) => serde_json::to_string(params).map_err(|e| ApiError::Encode(e.to_string())),
        None => Ok("{}".to_string()),
    }
}

/// Render signed parameters as query string pairs.
fn query_pairs(params: &Params) -> Vec<(String, String)> {
    params.iter().map(|(k, v)| (k.clone(), stringify(v))).collect()
}

/// Decode a response: 200 bodies into `T`, anything else into `Server`.
fn parse_body<T: DeserializeOwned>(response: HttpResponse) -> Result<T, ApiError> {
    if response.status != 200 {
        let message = serde_json::from_str::<ResponseError>(&response.body)
            .map(|e| e.message)
            .unwrap_or_default();
        return Err(ApiError::Server {
            status: response.status,
            message,
        });
    }
    serde_json::from_str(&response.body).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE_URL: &str = "http://localhost:3000/api/v0.1";
    const KEY: &str = "YOUR KEY";
    const SECRET: &str = "YOUR SECRET";

    fn client() -> CmdbClient {
        CmdbClient::new(BASE_URL, KEY, SECRET)
    }

    fn attrs(pairs: &[(&str, Value)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    /// The signature in the payload must equal a fresh signature over the
    /// payload minus `_secret` and `_key`.
    fn assert_signed(req: &HttpRequest) {
        let body = req.body.as_ref().expect("body");
        let mut business = body.clone();
        let got = business.remove("_secret").expect("_secret present");
        business.remove("_key").expect("_key present");
        assert_eq!(got, json!(sign(&req.url, SECRET, &business)));
    }

    #[test]
    fn add_ci_builds_signed_post() {
        let attrs = attrs(&[
            ("server_name", json!("test-1")),
            ("ip", json!("192.168.0.1")),
            ("custom_attr", json!(123)),
        ]);
        let req = client().build_add_ci(
            "mycitype",
            NoAttrPolicy::Default,
            ExistPolicy::Reject,
            &attrs,
        );

        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, format!("{BASE_URL}/ci"));
        let body = req.body.as_ref().unwrap();
        assert_eq!(body["ci_type"], json!("mycitype"));
        assert_eq!(body["no_attrbute_policy"], json!(""));
        assert_eq!(body["exist_policy"], json!("reject"));
        assert_eq!(body["server_name"], json!("test-1"));
        assert_eq!(body["ip"], json!("192.168.0.1"));
        assert_eq!(body["custom_attr"], json!(123));
        assert_eq!(body["_key"], json!(KEY));
        assert_signed(&req);
    }

    #[test]
    fn add_ci_fixed_fields_overwrite_caller_attrs() {
        let attrs = attrs(&[("ci_type", json!("spoofed")), ("a", json!(1))]);
        let req = client().build_add_ci(
            "mycitype",
            NoAttrPolicy::Reject,
            ExistPolicy::Default,
            &attrs,
        );
        let body = req.body.as_ref().unwrap();
        assert_eq!(body["ci_type"], json!("mycitype"));
        assert_eq!(body["no_attrbute_policy"], json!("reject"));
    }

    #[test]
    fn delete_ci_builds_signed_delete() {
        let req = client().build_delete_ci(9723);
        assert_eq!(req.method, HttpMethod::Delete);
        assert_eq!(req.url, format!("{BASE_URL}/ci/9723"));
        // Auth fields only.
        assert_eq!(req.body.as_ref().unwrap().len(), 2);
        assert_signed(&req);
    }

    #[test]
    fn update_ci_builds_signed_put_without_policy_fields() {
        let attrs = attrs(&[("ip", json!("192.168.0.1")), ("custom_attr", json!(123))]);
        let req = client().build_update_ci(9723, "mycitype", &attrs);
        assert_eq!(req.method, HttpMethod::Put);
        assert_eq!(req.url, format!("{BASE_URL}/ci/9723"));
        let body = req.body.as_ref().unwrap();
        assert_eq!(body["ci_type"], json!("mycitype"));
        assert!(!body.contains_key("no_attrbute_policy"));
        assert!(!body.contains_key("exist_policy"));
        assert_signed(&req);
    }

    #[test]
    fn get_ci_builds_signed_query() {
        let query = CiQuery {
            q: "_type:mycitype".to_string(),
            ..CiQuery::default()
        };
        let req = client().build_get_ci(&query);
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, format!("{BASE_URL}/ci/s"));
        assert!(req.body.is_none());

        let pairs: std::collections::BTreeMap<_, _> = req.query.iter().cloned().collect();
        assert_eq!(pairs["q"], "_type:mycitype");
        assert_eq!(pairs["fl"], "");
        assert_eq!(pairs["sort"], "");
        assert_eq!(pairs["page"], "0");
        assert_eq!(pairs["count"], "0");
        assert_eq!(pairs["ret_key"], "");
        assert_eq!(pairs["_key"], KEY);

        // Signature covers the stringified business parameters only.
        let business: Params = pairs
            .iter()
            .filter(|(k, _)| *k != "_key" && *k != "_secret")
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        assert_eq!(pairs["_secret"], sign(&req.url, SECRET, &business));
    }

    #[test]
    fn get_ci_signature_is_independent_of_numeric_vs_string_page() {
        // "page": 3 and "page": "3" stringify identically, so both sign the
        // same — the wire always carries the decimal text.
        let a = sign("/ci/s", SECRET, &attrs(&[("page", json!(3))]));
        let b = sign("/ci/s", SECRET, &attrs(&[("page", json!("3"))]));
        assert_eq!(a, b);
    }

    #[test]
    fn add_relation_builds_signed_post() {
        let req = client().build_add_relation(9723, 9727);
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, format!("{BASE_URL}/ci_relations/9723/9727"));
        assert_signed(&req);
    }

    #[test]
    fn delete_relation_by_id_targets_id_path() {
        let req = client().build_delete_relation(979, 0, 0);
        assert_eq!(req.method, HttpMethod::Delete);
        assert_eq!(req.url, format!("{BASE_URL}/ci_relations/979"));
        assert_signed(&req);
    }

    #[test]
    fn delete_relation_without_id_targets_pair_path() {
        let req = client().build_delete_relation(0, 9723, 9727);
        assert_eq!(req.url, format!("{BASE_URL}/ci_relations/9723/9727"));
        assert_signed(&req);
    }

    #[test]
    fn get_relation_builds_signed_query() {
        let query = RelationQuery {
            root_id: 9723,
            level: "1".to_string(),
            ..RelationQuery::default()
        };
        let req = client().build_get_relation(&query);
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, format!("{BASE_URL}/ci_relations/s"));

        let pairs: std::collections::BTreeMap<_, _> = req.query.iter().cloned().collect();
        assert_eq!(pairs["root_id"], "9723");
        assert_eq!(pairs["level"], "1");
        assert_eq!(pairs["reverse"], "0");
        assert_eq!(pairs["page"], "0");
        assert!(pairs.contains_key("_secret"));
        assert_eq!(pairs["_key"], KEY);
    }

    #[test]
    fn parse_add_ci_success() {
        let response = HttpResponse {
            status: 200,
            body: r#"{"ci_id": 9723}"#.to_string(),
        };
        let res = client().parse_add_ci(response).unwrap();
        assert_eq!(res.ci_id, 9723);
    }

    #[test]
    fn parse_non_200_carries_status_and_message() {
        let response = HttpResponse {
            status: 404,
            body: r#"{"message":"not found"}"#.to_string(),
        };
        let err = client().parse_add_ci(response).unwrap_err();
        match &err {
            ApiError::Server { status, message } => {
                assert_eq!(*status, 404);
                assert_eq!(message, "not found");
            }
            other => panic!("expected Server, got {other:?}"),
        }
        let text = err.to_string();
        assert!(text.contains("404"));
        assert!(text.contains("not found"));
    }

    #[test]
    fn parse_non_200_with_undecodable_body_has_empty_message() {
        let response = HttpResponse {
            status: 500,
            body: "<html>oops</html>".to_string(),
        };
        let err = client().parse_delete_ci(response).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Server { status: 500, ref message } if message.is_empty()
        ));
    }

    #[test]
    fn parse_malformed_200_is_a_decode_error() {
        let response = HttpResponse {
            status: 200,
            body: "not json".to_string(),
        };
        let err = client().parse_get_ci(response).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn get_ci_result_preserves_arbitrary_attributes() {
        let response = HttpResponse {
            status: 200,
            body: r#"{
                "counter": {"mycitype": 1},
                "facet": {},
                "numfound": 1,
                "page": 1,
                "result": [{"_id": 9723, "server_name": "test-1", "custom_attr": 123}],
                "total": 1
            }"#
            .to_string(),
        };
        let res = client().parse_get_ci(response).unwrap();
        assert_eq!(res.numfound, 1);
        assert_eq!(res.total, 1);
        let record = &res.result[0];
        assert_eq!(record.len(), 3);
        assert_eq!(record["_id"], json!(9723));
        assert_eq!(record["server_name"], json!("test-1"));
        assert_eq!(record["custom_attr"], json!(123));
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let client = CmdbClient::new("http://localhost:3000/api/v0.1/", KEY, SECRET);
        let req = client.build_delete_ci(1);
        assert_eq!(req.url, "http://localhost:3000/api/v0.1/ci/1");
    }

    #[test]
    fn same_arguments_sign_identically_across_builds() {
        let c = client();
        let a = c.build_delete_ci(42);
        let b = c.build_delete_ci(42);
        assert_eq!(a.body.as_ref().unwrap()["_secret"], b.body.as_ref().unwrap()["_secret"]);
    }

    #[test]
    fn debug_output_hides_secret() {
        let text = format!("{:?}", client());
        assert!(text.contains("YOUR KEY"));
        assert!(!text.contains("YOUR SECRET"));
    }
}
