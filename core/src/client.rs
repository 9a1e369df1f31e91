//! Shared handle to the transport used by a reference tree.

use std::sync::Arc;

use crate::config::Config;
use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{TimedTransport, Transport};

/// Cheaply cloneable handle shared by a root reference and everything
/// derived from it. Set once when the root is built.
#[derive(Debug, Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
}

impl Client {
    /// Build a client around a fresh `TimedTransport` using `config`.
    pub fn new(config: &Config) -> Result<Self, Error> {
        Ok(Self::with_transport(Arc::new(TimedTransport::new(config)?)))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub(crate) fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        self.transport.execute(request)
    }
}
