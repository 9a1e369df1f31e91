//! Locations in the remote tree and the operations performed on them.
//!
//! # Design
//! A `Reference` is an endpoint, a path and its own `QueryParams`. Endpoint
//! and path never change after construction; the params are mutated in place
//! by the fluent setters. `child` hands out a new reference with an empty
//! `QueryParams` of its own, so neither earlier nor later mutations of the
//! parent can leak into it. The `Client` is the only shared part.
//!
//! Query modifiers apply to reads. Writes address the bare location.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::client::Client;
use crate::config::Config;
use crate::error::Error;
use crate::executor::{compose_url, send};
use crate::http::{HttpMethod, HttpRequest};
use crate::params::QueryParams;

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'[')
    .add(b']')
    .add(b'\\')
    .add(b'^')
    .add(b'|');

/// Reply to a push: the key the server generated.
#[derive(Deserialize)]
struct PushReply {
    name: String,
}

/// A location in the remote tree plus its own query parameters.
///
/// Setters take `&mut self`, so one reference is mutated by one owner at a
/// time. Separate references, including a parent and its children, can be
/// used from different threads independently.
#[derive(Debug, Clone)]
pub struct Reference {
    endpoint: String,
    path: String,
    params: QueryParams,
    client: Client,
}

impl Reference {
    /// Build a root reference from a URL string.
    ///
    /// A missing scheme defaults to `https://`; a trailing `/` is dropped.
    /// Without a `client`, one is built from `Config::default()`, which reads
    /// the process-wide default timeout.
    pub fn new(url: &str, client: Option<Client>) -> Result<Self, Error> {
        let raw = url.trim();
        let with_scheme = if has_scheme(raw) {
            raw.to_string()
        } else {
            format!("https://{raw}")
        };
        let parsed = Url::parse(&with_scheme).map_err(|e| Error::construction(url, e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::construction(url, format!("unsupported scheme {other:?}")));
            }
        }
        if parsed.host().is_none() {
            return Err(Error::construction(url, "missing host"));
        }
        if parsed.query().is_some() || parsed.fragment().is_some() {
            tracing::debug!(url, "ignoring query and fragment of root URL");
        }

        // Host text is kept as the caller wrote it; parsing would lower-case it.
        let (_, rest) = with_scheme
            .split_once("://")
            .ok_or_else(|| Error::construction(url, "missing scheme separator"))?;
        let authority = rest
            .split(|c| matches!(c, '/' | '?' | '#'))
            .next()
            .unwrap_or_default();

        let client = match client {
            Some(client) => client,
            None => Client::new(&Config::default())?,
        };

        Ok(Self {
            endpoint: format!("{}://{authority}", parsed.scheme()),
            path: parsed.path().trim_end_matches('/').to_string(),
            params: QueryParams::default(),
            client,
        })
    }

    /// A reference one or more segments below this one, with empty params.
    pub fn child(&self, segment: &str) -> Reference {
        Reference {
            endpoint: self.endpoint.clone(),
            path: join(&self.path, segment),
            params: QueryParams::default(),
            client: self.client.clone(),
        }
    }

    /// Endpoint and path, without the query string.
    pub fn url(&self) -> String {
        format!("{}{}", self.endpoint, self.path)
    }

    /// Leaf key of this location; `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.path.rsplit('/').next().filter(|key| !key.is_empty())
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    pub fn shallow(&mut self, shallow: bool) -> &mut Self {
        self.params.set_shallow(shallow);
        self
    }

    /// Value is sent as given; JSON-quote child keys yourself (`"\"age\""`).
    pub fn order_by(&mut self, value: &str) -> &mut Self {
        self.params.set_order_by(value);
        self
    }

    pub fn start_at(&mut self, value: &str) -> &mut Self {
        self.params.set_start_at(value);
        self
    }

    pub fn end_at(&mut self, value: &str) -> &mut Self {
        self.params.set_end_at(value);
        self
    }

    pub fn equal_to(&mut self, value: &str) -> &mut Self {
        self.params.set_equal_to(value);
        self
    }

    pub fn limit_to_first(&mut self, limit: u32) -> &mut Self {
        self.params.set_limit_to_first(limit);
        self
    }

    pub fn limit_to_last(&mut self, limit: u32) -> &mut Self {
        self.params.set_limit_to_last(limit);
        self
    }

    pub fn include_priority(&mut self, include: bool) -> &mut Self {
        self.params.set_include_priority(include);
        self
    }

    /// GET the value at `path` below this reference (`""` for this
    /// location) with the current query parameters.
    pub fn value(&self, path: &str) -> Result<Value, Error> {
        let url = compose_url(&self.url_at(path), &self.params);
        send(&self.client, HttpRequest::new(HttpMethod::Get, url))
    }

    /// Like `value`, decoded into `T`.
    pub fn value_as<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        Ok(serde_json::from_value(self.value(path)?)?)
    }

    /// Replace the data at this location.
    pub fn set<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), Error> {
        self.write(HttpMethod::Put, value).map(drop)
    }

    /// Merge the fields of `value` into the data at this location.
    pub fn update<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), Error> {
        self.write(HttpMethod::Patch, value).map(drop)
    }

    /// Append `value` under a server-generated key and return its reference.
    pub fn push<T: Serialize + ?Sized>(&self, value: &T) -> Result<Reference, Error> {
        let reply: PushReply = serde_json::from_value(self.write(HttpMethod::Post, value)?)?;
        Ok(self.child(&reply.name))
    }

    /// Delete the data at this location.
    pub fn remove(&self) -> Result<(), Error> {
        send(&self.client, HttpRequest::new(HttpMethod::Delete, self.url())).map(drop)
    }

    fn write<T: Serialize + ?Sized>(&self, method: HttpMethod, value: &T) -> Result<Value, Error> {
        let body = serde_json::to_string(value)?;
        send(
            &self.client,
            HttpRequest::new(method, self.url()).with_json_body(body),
        )
    }

    fn url_at(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, join(&self.path, path))
    }
}

/// Two references are equal when they address the same effective URL.
impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint && self.path == other.path && self.params == other.params
    }
}

impl Eq for Reference {}

/// Whether `raw` starts with `scheme://`, ignoring any `://` that only shows
/// up later in the path or query.
fn has_scheme(raw: &str) -> bool {
    raw.find("://")
        .is_some_and(|at| !raw[..at].contains(|c| matches!(c, '/' | '?' | '#')))
}

/// Append `/`-separated segments to `base`, escaping each one. Segments go
/// out verbatim otherwise, `.` and `..` included.
fn join(base: &str, segments: &str) -> String {
    let mut path = base.to_string();
    for segment in segments.split('/').filter(|s| !s.is_empty()) {
        path.push('/');
        path.extend(utf8_percent_encode(segment, SEGMENT));
    }
    path
}
