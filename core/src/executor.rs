//! URL assembly, request dispatch and status mapping.

use serde_json::Value;

use crate::client::Client;
use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse};
use crate::params::QueryParams;

/// Append the encoded query to `base`, leaving out `?` when nothing is set.
pub(crate) fn compose_url(base: &str, params: &QueryParams) -> String {
    let query = params.encode();
    if query.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{query}")
    }
}

/// Run `request` through the client and decode the JSON reply.
///
/// An empty or `null` body on success yields `Value::Null`.
pub(crate) fn send(client: &Client, request: HttpRequest) -> Result<Value, Error> {
    tracing::debug!(method = %request.method, url = %request.url, "sending request");
    let response = client.execute(&request)?;
    tracing::debug!(method = %request.method, url = %request.url, status = response.status, "received response");
    check_status(&response)?;
    parse_body(&response.body)
}

/// Map non-success status codes to `Error::Response`.
fn check_status(response: &HttpResponse) -> Result<(), Error> {
    if response.is_success() {
        return Ok(());
    }
    Err(Error::Response {
        status: response.status,
        body: response.body.clone(),
    })
}

fn parse_body(body: &str) -> Result<Value, Error> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(body)?)
}
