//! Transport seam and the dual-budget HTTP transport.
//!
//! # Design
//! `TimedTransport` splits one configured duration `D` across two phases.
//! Dialing (resolve, TCP connect and, for `https`, the TLS handshake) gets a
//! hard deadline of `D`. Once connected, the wait for response headers gets
//! whatever is left, `D - t_dial`. When nothing is left the call fails with
//! `Error::Timeout` without sending the request. Worst-case time to first
//! header byte is therefore bounded by `D`, and the error says which phase
//! ran out.
//!
//! The response body is read after headers arrive and is not bound by the
//! header budget.
//!
//! Each call dials a fresh connection; nothing is pooled. The transport owns
//! a current-thread tokio runtime and drives every call with `block_on`, so
//! `execute` must not be called from inside another async runtime.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::{pin, Pin};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use url::{Host, Position, Url};

use crate::config::Config;
use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse};

/// Executes one HTTP exchange.
///
/// Implementations are shared between a reference and every reference
/// derived from it, possibly across threads.
pub trait Transport: Send + Sync + fmt::Debug {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error>;
}

/// Where a call stood when it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Dialing,
    Connected,
    AwaitingHeaders,
    HeadersReceived,
    TimedOut,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Dialing => "dial",
            Phase::Connected => "connected",
            Phase::AwaitingHeaders => "header",
            Phase::HeadersReceived => "headers received",
            Phase::TimedOut => "timed out",
        };
        f.write_str(name)
    }
}

/// Header-phase budget derived from the total budget and the dial time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderDeadline {
    /// Strictly positive time left to wait for headers.
    Remaining(Duration),
    /// Dialing used the whole budget; holds how far past it went (may be zero).
    Exhausted(Duration),
}

impl HeaderDeadline {
    pub fn after_dial(budget: Duration, dial_elapsed: Duration) -> Self {
        match budget.checked_sub(dial_elapsed) {
            Some(left) if !left.is_zero() => HeaderDeadline::Remaining(left),
            _ => HeaderDeadline::Exhausted(dial_elapsed.saturating_sub(budget)),
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self {
            HeaderDeadline::Remaining(left) => Some(*left),
            HeaderDeadline::Exhausted(_) => None,
        }
    }
}

/// Outcome of the most recent call through a `TimedTransport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// Final phase: `HeadersReceived`, `TimedOut`, or the phase a
    /// non-timeout failure happened in.
    pub phase: Phase,
    pub dial_elapsed: Duration,
    pub header_deadline: HeaderDeadline,
}

/// HTTP/1.1 transport with separate dial and header deadlines.
pub struct TimedTransport {
    timeout: Duration,
    runtime: Runtime,
    tls: TlsConnector,
    last_attempt: Mutex<Option<Attempt>>,
}

impl fmt::Debug for TimedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedTransport")
            .field("timeout", &self.timeout)
            .field("last_attempt", &self.last_attempt())
            .finish_non_exhaustive()
    }
}

struct Target {
    host: String,
    port: u16,
    tls: bool,
    authority: String,
    request_target: String,
}

impl Target {
    /// Host, port and scheme come from the parsed URL. The request target is
    /// taken from `raw` unchanged so dot segments are sent as written.
    fn parse(raw: &str) -> Result<Self, Error> {
        let url = Url::parse(raw).map_err(Error::transport)?;
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(Error::transport(format!("no host in {raw:?}"))),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::transport(format!("no port for {raw:?}")))?;
        Ok(Self {
            host,
            port,
            tls: url.scheme() == "https",
            authority: url[Position::BeforeHost..Position::AfterPort].to_string(),
            request_target: request_target(raw),
        })
    }
}

/// Path and query of `raw`, with `/` standing in for an empty path.
fn request_target(raw: &str) -> String {
    let after_scheme = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    let target = after_scheme
        .find(|c| matches!(c, '/' | '?'))
        .map_or("", |at| &after_scheme[at..]);
    let target = target.split('#').next().unwrap_or_default();
    if target.starts_with('/') {
        target.to_string()
    } else {
        format!("/{target}")
    }
}

/// How an exchange on an open connection ended early.
enum Failure {
    /// Failed before response headers arrived.
    BeforeHeaders(Error),
    /// The header budget ran out.
    HeaderTimeout,
    /// Headers arrived but reading the body failed.
    Body(Error),
}

enum Connection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl TimedTransport {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::transport)?;

        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(Error::transport)?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self {
            timeout: config.timeout,
            runtime,
            tls: TlsConnector::from(Arc::new(tls)),
            last_attempt: Mutex::new(None),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The most recent call's outcome. Concurrent callers overwrite each
    /// other; the last one to finish wins.
    pub fn last_attempt(&self) -> Option<Attempt> {
        *self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, phase: Phase, dial_elapsed: Duration, header_deadline: HeaderDeadline) {
        let attempt = Attempt {
            phase,
            dial_elapsed,
            header_deadline,
        };
        *self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(attempt);
    }

    async fn round_trip(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        let target = Target::parse(&request.url)?;
        let started = Instant::now();

        let dialed = tokio::time::timeout(self.timeout, self.dial(&target)).await;
        let dial_elapsed = started.elapsed();
        let header_deadline = HeaderDeadline::after_dial(self.timeout, dial_elapsed);

        // A dial error reported after the budget ran out counts as a timeout.
        let connection = match dialed {
            Ok(Ok(connection)) => connection,
            Ok(Err(err)) if header_deadline.remaining().is_some() => {
                self.record(Phase::Dialing, dial_elapsed, header_deadline);
                return Err(err);
            }
            _ => {
                self.record(Phase::TimedOut, dial_elapsed, header_deadline);
                tracing::warn!(url = %request.url, elapsed = ?dial_elapsed, "dial timed out");
                return Err(Error::Timeout {
                    phase: Phase::Dialing,
                    elapsed: dial_elapsed,
                });
            }
        };
        tracing::debug!(url = %request.url, elapsed = ?dial_elapsed, phase = %Phase::Connected, "dialed");

        let Some(header_budget) = header_deadline.remaining() else {
            self.record(Phase::TimedOut, dial_elapsed, header_deadline);
            tracing::warn!(url = %request.url, elapsed = ?dial_elapsed, "no budget left for headers");
            return Err(Error::Timeout {
                phase: Phase::AwaitingHeaders,
                elapsed: dial_elapsed,
            });
        };

        let exchanged = match connection {
            Connection::Plain(stream) => exchange(stream, request, &target, header_budget).await,
            Connection::Tls(stream) => exchange(*stream, request, &target, header_budget).await,
        };

        match exchanged {
            Ok(response) => {
                self.record(Phase::HeadersReceived, dial_elapsed, header_deadline);
                tracing::debug!(url = %request.url, status = response.status, "response received");
                Ok(response)
            }
            Err(Failure::BeforeHeaders(err)) => {
                self.record(Phase::AwaitingHeaders, dial_elapsed, header_deadline);
                Err(err)
            }
            Err(Failure::HeaderTimeout) => {
                let elapsed = started.elapsed();
                self.record(Phase::TimedOut, dial_elapsed, header_deadline);
                tracing::warn!(url = %request.url, ?elapsed, budget = ?header_budget, "header wait timed out");
                Err(Error::Timeout {
                    phase: Phase::AwaitingHeaders,
                    elapsed,
                })
            }
            Err(Failure::Body(err)) => {
                self.record(Phase::HeadersReceived, dial_elapsed, header_deadline);
                Err(err)
            }
        }
    }

    async fn dial(&self, target: &Target) -> Result<Connection, Error> {
        let tcp = TcpStream::connect((target.host.as_str(), target.port))
            .await
            .map_err(Error::transport)?;
        if !target.tls {
            return Ok(Connection::Plain(tcp));
        }
        let name = ServerName::try_from(target.host.clone()).map_err(Error::transport)?;
        let stream = self
            .tls
            .connect(name, tcp)
            .await
            .map_err(Error::transport)?;
        Ok(Connection::Tls(Box::new(stream)))
    }
}

/// Send the request on an open connection, wait up to `header_budget` for
/// response headers, then read the body.
///
/// The connection is driven inside this future rather than on a spawned
/// task, so it is closed as soon as the exchange finishes or is cut short.
async fn exchange<S>(
    stream: S,
    request: &HttpRequest,
    target: &Target,
    header_budget: Duration,
) -> Result<HttpResponse, Failure>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let outgoing = outgoing(request, target).map_err(Failure::BeforeHeaders)?;
    let (mut sender, connection) =
        hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
            .await
            .map_err(|e| Failure::BeforeHeaders(Error::transport(e)))?;
    let mut connection = pin!(drive(connection));

    let awaiting = alongside(connection.as_mut(), sender.send_request(outgoing));
    let response = match tokio::time::timeout(header_budget, awaiting).await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => return Err(Failure::BeforeHeaders(Error::transport(err))),
        Err(_) => return Err(Failure::HeaderTimeout),
    };

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = alongside(connection.as_mut(), response.into_body().collect())
        .await
        .map_err(|e| Failure::Body(Error::transport(e)))?
        .to_bytes();

    Ok(HttpResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn outgoing(request: &HttpRequest, target: &Target) -> Result<::http::Request<Full<Bytes>>, Error> {
    let mut builder = ::http::Request::builder()
        .method(::http::Method::from(request.method))
        .uri(target.request_target.as_str())
        .header(::http::header::HOST, target.authority.as_str());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let body = Full::new(Bytes::from(request.body.clone().unwrap_or_default()));
    builder.body(body).map_err(Error::transport)
}

/// Run a hyper connection to completion, then stay pending forever so it can
/// be polled again without resolving twice.
async fn drive<C>(connection: C) -> Infallible
where
    C: Future<Output = hyper::Result<()>>,
{
    if let Err(err) = connection.await {
        tracing::debug!(error = %err, "connection closed with error");
    }
    std::future::pending().await
}

/// Await `work` while the connection makes progress alongside it.
async fn alongside<C, F>(connection: Pin<&mut C>, work: F) -> F::Output
where
    C: Future<Output = Infallible>,
    F: Future,
{
    tokio::select! {
        output = work => output,
        never = connection => match never {},
    }
}

impl Transport for TimedTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        self.runtime.block_on(self.round_trip(request))
    }
}
