//! In-memory CMDB used by integration tests.
//!
//! # Design
//! Implements the six endpoints the client targets, backed by a `HashMap`
//! behind an `RwLock`. Crucially it re-verifies the `_secret` signature of
//! every request with its own independent implementation (strip `_key` and
//! `_secret`, sort the remaining keys, concatenate path + secret + values,
//! SHA-1), so end-to-end tests exercise the real signing contract instead
//! of trusting the client's own math.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use sha1::{Digest, Sha1};
use tokio::{net::TcpListener, sync::RwLock};

#[derive(Clone, Debug)]
pub struct Ci {
    pub id: i64,
    pub ci_type: String,
    pub attrs: Map<String, Value>,
}

#[derive(Clone, Copy, Debug)]
pub struct Relation {
    pub id: i64,
    pub src: i64,
    pub dst: i64,
}

#[derive(Default)]
pub struct Store {
    cis: HashMap<i64, Ci>,
    relations: HashMap<i64, Relation>,
    next_ci_id: i64,
    next_cr_id: i64,
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
struct AppState {
    key: String,
    secret: String,
    db: Db,
}

type Reply = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn app(key: &str, secret: &str) -> Router {
    let state = AppState {
        key: key.to_string(),
        secret: secret.to_string(),
        db: Db::default(),
    };
    Router::new()
        .route("/ci", post(add_ci))
        .route("/ci/s", get(get_ci))
        .route("/ci/{id}", axum::routing::put(update_ci).delete(delete_ci))
        .route("/ci_relations/s", get(get_relation))
        .route("/ci_relations/{id}", delete(delete_relation_by_id))
        .route(
            "/ci_relations/{src}/{dst}",
            post(add_relation).delete(delete_relation_by_pair),
        )
        .with_state(state)
}

pub async fn run(listener: TcpListener, key: &str, secret: &str) -> Result<(), std::io::Error> {
    axum::serve(listener, app(key, secret)).await
}

fn fail(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "message": message })))
}

/// Scalar-to-text rule shared with the client: decimal numbers, literal
/// booleans, strings verbatim.
fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Check `_key` and recompute `_secret` from the received parameters.
fn verify(
    state: &AppState,
    path: &str,
    params: &Map<String, Value>,
) -> Result<(), (StatusCode, Json<Value>)> {
    let key = params.get("_key").and_then(Value::as_str).unwrap_or_default();
    if key != state.key {
        return Err(fail(StatusCode::UNAUTHORIZED, "invalid key"));
    }
    let claimed = params
        .get("_secret")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut names: Vec<&String> = params
        .keys()
        .filter(|k| *k != "_key" && *k != "_secret")
        .collect();
    names.sort();

    let mut input = String::new();
    input.push_str(path);
    input.push_str(&state.secret);
    for name in names {
        if !name.starts_with('-') {
            input.push_str(&text(&params[name.as_str()]));
        }
    }
    let expected = hex::encode(Sha1::digest(input.as_bytes()));
    if claimed != expected {
        return Err(fail(StatusCode::UNAUTHORIZED, "invalid signature"));
    }
    Ok(())
}

/// Query pairs arrive as strings; lift them into the same shape body
/// parameters use so `verify` has a single code path.
fn query_params(pairs: &BTreeMap<String, String>) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

const RESERVED: [&str; 5] = ["_key", "_secret", "ci_type", "no_attrbute_policy", "exist_policy"];

fn attr_fields(payload: &Map<String, Value>) -> Map<String, Value> {
    payload
        .iter()
        .filter(|(k, _)| !RESERVED.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

// --- CI handlers ---

async fn add_ci(State(state): State<AppState>, Json(payload): Json<Map<String, Value>>) -> Reply {
    verify(&state, "/ci", &payload)?;
    let ci_type = payload
        .get("ci_type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if ci_type.is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "ci_type required"));
    }

    let mut store = state.db.write().await;
    store.next_ci_id += 1;
    let id = store.next_ci_id;
    store.cis.insert(
        id,
        Ci {
            id,
            ci_type,
            attrs: attr_fields(&payload),
        },
    );
    Ok(Json(json!({ "ci_id": id })))
}

async fn update_ci(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<Map<String, Value>>,
) -> Reply {
    verify(&state, &format!("/ci/{id}"), &payload)?;
    let mut store = state.db.write().await;
    let ci = store
        .cis
        .get_mut(&id)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "ci not found"))?;
    if let Some(ci_type) = payload.get("ci_type").and_then(Value::as_str) {
        if !ci_type.is_empty() {
            ci.ci_type = ci_type.to_string();
        }
    }
    for (k, v) in attr_fields(&payload) {
        ci.attrs.insert(k, v);
    }
    Ok(Json(json!({ "ci_id": id })))
}

async fn delete_ci(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<Map<String, Value>>,
) -> Reply {
    verify(&state, &format!("/ci/{id}"), &payload)?;
    let mut store = state.db.write().await;
    if store.cis.remove(&id).is_none() {
        return Err(fail(StatusCode::NOT_FOUND, "ci not found"));
    }
    store.relations.retain(|_, r| r.src != id && r.dst != id);
    Ok(Json(json!({ "message": "ok" })))
}

/// Render a stored CI the way the real server does: attributes plus the
/// `_id` and `ci_type` bookkeeping fields.
fn record(ci: &Ci) -> Map<String, Value> {
    let mut rec = ci.attrs.clone();
    rec.insert("_id".to_string(), json!(ci.id));
    rec.insert("ci_type".to_string(), json!(ci.ci_type));
    rec
}

fn search_reply(matched: Vec<&Ci>, page: i64) -> Json<Value> {
    let mut counter: BTreeMap<String, i64> = BTreeMap::new();
    for ci in &matched {
        *counter.entry(ci.ci_type.clone()).or_default() += 1;
    }
    let result: Vec<Map<String, Value>> = matched.iter().map(|ci| record(ci)).collect();
    let numfound = result.len() as i64;
    Json(json!({
        "counter": counter,
        "facet": {},
        "numfound": numfound,
        "page": page.max(1),
        "result": result,
        "total": numfound,
    }))
}

async fn get_ci(
    State(state): State<AppState>,
    Query(pairs): Query<BTreeMap<String, String>>,
) -> Reply {
    let params = query_params(&pairs);
    verify(&state, "/ci/s", &params)?;

    let q = pairs.get("q").map(String::as_str).unwrap_or_default();
    let wanted_type = q.strip_prefix("_type:");
    let page: i64 = pairs.get("page").and_then(|p| p.parse().ok()).unwrap_or(0);

    let store = state.db.read().await;
    let mut matched: Vec<&Ci> = store
        .cis
        .values()
        .filter(|ci| wanted_type.map_or(true, |t| ci.ci_type == t))
        .collect();
    matched.sort_by_key(|ci| ci.id);
    Ok(search_reply(matched, page))
}

// --- relation handlers ---

async fn add_relation(
    State(state): State<AppState>,
    Path((src, dst)): Path<(i64, i64)>,
    Json(payload): Json<Map<String, Value>>,
) -> Reply {
    verify(&state, &format!("/ci_relations/{src}/{dst}"), &payload)?;
    let mut store = state.db.write().await;
    if !store.cis.contains_key(&src) || !store.cis.contains_key(&dst) {
        return Err(fail(StatusCode::NOT_FOUND, "ci not found"));
    }
    store.next_cr_id += 1;
    let id = store.next_cr_id;
    store.relations.insert(id, Relation { id, src, dst });
    Ok(Json(json!({ "cr_id": id })))
}

async fn delete_relation_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<Map<String, Value>>,
) -> Reply {
    verify(&state, &format!("/ci_relations/{id}"), &payload)?;
    let mut store = state.db.write().await;
    if store.relations.remove(&id).is_none() {
        return Err(fail(StatusCode::NOT_FOUND, "relation not found"));
    }
    Ok(Json(json!({ "message": "CIType relation deleted" })))
}

async fn delete_relation_by_pair(
    State(state): State<AppState>,
    Path((first, second)): Path<(i64, i64)>,
    Json(payload): Json<Map<String, Value>>,
) -> Reply {
    verify(&state, &format!("/ci_relations/{first}/{second}"), &payload)?;
    let mut store = state.db.write().await;
    let found = store
        .relations
        .values()
        .find(|r| {
            (r.src == first && r.dst == second) || (r.src == second && r.dst == first)
        })
        .map(|r| r.id);
    match found {
        Some(id) => {
            store.relations.remove(&id);
            Ok(Json(json!({ "message": "CIType relation deleted" })))
        }
        None => Err(fail(StatusCode::NOT_FOUND, "relation not found")),
    }
}

async fn get_relation(
    State(state): State<AppState>,
    Query(pairs): Query<BTreeMap<String, String>>,
) -> Reply {
    let params = query_params(&pairs);
    verify(&state, "/ci_relations/s", &params)?;

    let root_id: i64 = pairs
        .get("root_id")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let reverse = pairs.get("reverse").map(String::as_str).unwrap_or("0") != "0";
    let page: i64 = pairs.get("page").and_then(|p| p.parse().ok()).unwrap_or(0);

    let store = state.db.read().await;
    let mut targets: Vec<i64> = store
        .relations
        .values()
        .filter_map(|r| {
            if reverse {
                (r.dst == root_id).then_some(r.src)
            } else {
                (r.src == root_id).then_some(r.dst)
            }
        })
        .collect();
    targets.sort_unstable();
    targets.dedup();

    let matched: Vec<&Ci> = targets.iter().filter_map(|id| store.cis.get(id)).collect();
    Ok(search_reply(matched, page))
}
