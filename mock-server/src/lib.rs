//! In-memory JSON tree served over HTTP for exercising the client.
//!
//! Every path addresses a node in one JSON document. GET reads (with
//! `shallow=true` collapsing objects to `{key: true}`), PUT replaces, PATCH
//! merges, POST appends under a fresh key and DELETE removes. Each request's
//! method, path and raw query string is recorded so tests can check exactly
//! what the client sent. An optional delay holds every response before its
//! headers go out.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// One request as the server saw it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
}

#[derive(Clone, Default)]
pub struct AppState {
    tree: Arc<RwLock<Value>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    header_delay: Option<Duration>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every response for `delay` before sending headers.
    pub fn with_header_delay(mut self, delay: Duration) -> Self {
        self.header_delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Query string of the most recent request, `None` if nothing arrived.
    pub fn last_query(&self) -> Option<String> {
        self.requests().last().map(|r| r.query.clone())
    }

    fn record(&self, request: RecordedRequest) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid data; couldn't parse JSON object.")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid data; PATCH requires a JSON object.")]
    NotAnObject,

    #[error("Method not allowed.")]
    MethodNotAllowed,
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match self {
            StoreError::InvalidJson(_) | StoreError::NotAnObject => StatusCode::BAD_REQUEST,
            StoreError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
struct PushReply {
    name: String,
}

pub fn app(state: AppState) -> Router {
    Router::new().fallback(handle).with_state(state)
}

pub async fn run(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

async fn handle(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Response, StoreError> {
    let query = query.unwrap_or_default();
    tracing::debug!(%method, path = uri.path(), %query, "request");
    state.record(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: query.clone(),
    });

    if let Some(delay) = state.header_delay {
        tokio::time::sleep(delay).await;
    }

    let segments = segments(uri.path());
    match method {
        Method::GET => {
            let tree = state.tree.read().await;
            let node = node(&tree, &segments).cloned().unwrap_or(Value::Null);
            let shallow = query.split('&').any(|pair| pair == "shallow=true");
            Ok(Json(if shallow { collapse(node) } else { node }).into_response())
        }
        Method::PUT => {
            let value: Value = serde_json::from_slice(&body)?;
            set_node(&mut *state.tree.write().await, &segments, value.clone());
            Ok(Json(value).into_response())
        }
        Method::PATCH => {
            let value: Value = serde_json::from_slice(&body)?;
            let Value::Object(fields) = value else {
                return Err(StoreError::NotAnObject);
            };
            let mut tree = state.tree.write().await;
            for (key, value) in &fields {
                let mut path = segments.clone();
                path.extend(key.split('/').filter(|s| !s.is_empty()).map(str::to_string));
                set_node(&mut tree, &path, value.clone());
            }
            Ok(Json(Value::Object(fields)).into_response())
        }
        Method::POST => {
            let value: Value = serde_json::from_slice(&body)?;
            let name = Uuid::new_v4().simple().to_string();
            let mut path = segments;
            path.push(name.clone());
            set_node(&mut *state.tree.write().await, &path, value);
            Ok(Json(PushReply { name }).into_response())
        }
        Method::DELETE => {
            set_node(&mut *state.tree.write().await, &segments, Value::Null);
            Ok(Json(Value::Null).into_response())
        }
        _ => Err(StoreError::MethodNotAllowed),
    }
}

fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
        .collect()
}

fn node<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |current, key| current.as_object()?.get(key))
}

/// Write `value` at `segments`, creating objects on the way down. Writing
/// `null` deletes, and objects left empty are pruned.
fn set_node(root: &mut Value, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *root = value;
        return;
    };
    if !root.is_object() {
        if value.is_null() {
            return;
        }
        *root = Value::Object(Map::new());
    }
    let emptied = match root {
        Value::Object(map) => {
            let child = map.entry(first.clone()).or_insert(Value::Null);
            set_node(child, rest, value);
            if child.is_null() {
                map.remove(first);
            }
            map.is_empty()
        }
        _ => false,
    };
    if emptied {
        *root = Value::Null;
    }
}

fn collapse(node: Value) -> Value {
    match node {
        Value::Object(map) => map.into_iter().map(|(k, _)| (k, Value::Bool(true))).collect(),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Vec<String> {
        segments(p)
    }

    #[test]
    fn set_then_read_nested_node() {
        let mut tree = Value::Null;
        set_node(&mut tree, &path("/users/ada/age"), json!(36));
        assert_eq!(tree, json!({"users": {"ada": {"age": 36}}}));
        assert_eq!(node(&tree, &path("/users/ada")), Some(&json!({"age": 36})));
        assert_eq!(node(&tree, &path("/users/bob")), None);
    }

    #[test]
    fn writing_null_prunes_empty_parents() {
        let mut tree = json!({"a": {"b": 1}, "c": 2});
        set_node(&mut tree, &path("/a/b"), Value::Null);
        assert_eq!(tree, json!({"c": 2}));
        set_node(&mut tree, &path("/c"), Value::Null);
        assert_eq!(tree, Value::Null);
    }

    #[test]
    fn deleting_missing_node_is_noop() {
        let mut tree = json!({"a": 1});
        set_node(&mut tree, &path("/x/y"), Value::Null);
        assert_eq!(tree, json!({"a": 1}));
    }

    #[test]
    fn segments_are_percent_decoded() {
        assert_eq!(path("/a%20b//c/"), vec!["a b".to_string(), "c".to_string()]);
    }

    #[test]
    fn collapse_keeps_only_keys() {
        assert_eq!(collapse(json!({"a": {"deep": 1}, "b": 2})), json!({"a": true, "b": true}));
        assert_eq!(collapse(json!(5)), json!(5));
    }
}
