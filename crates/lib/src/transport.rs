//! Per-call transport handles
//!
//! A [`Connector`] hands out a fresh [`Channel`] for every remote call; the
//! channel is dropped as soon as the call returns, on success and failure
//! alike. Nothing is pooled across calls.

use std::io;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::protocol::{self, Call, Envelope, ProtocolError, Reply};

/// Transport-level failures, including remote faults
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {url} failed: {message}")]
    Connection { url: String, message: String },
    #[error("http status {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("remote fault {code}: {message}")]
    Fault { code: String, message: String },
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Source of per-call channels
pub trait Connector {
    fn connect(&self) -> Result<Box<dyn Channel>, TransportError>;
}

/// One open handle to the remote endpoint
pub trait Channel {
    fn invoke(&mut self, call: &Call) -> Result<Reply, TransportError>;
}

/// HTTP basic credentials sent alongside every request
#[derive(Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: Option<String>,
}

impl BasicAuth {
    fn header(&self) -> String {
        let pair = format!(
            "{}:{}",
            self.username,
            self.password.as_deref().unwrap_or_default()
        );
        format!("Basic {}", STANDARD.encode(pair))
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// SOAP-over-HTTP connector
#[derive(Debug, Clone)]
pub struct HttpConnector {
    endpoint: Url,
    namespace: String,
    auth: Option<BasicAuth>,
    timeout: Option<Duration>,
}

impl HttpConnector {
    pub fn new(endpoint: Url, namespace: impl Into<String>) -> Self {
        Self {
            endpoint,
            namespace: namespace.into(),
            auth: None,
            timeout: None,
        }
    }

    /// Send HTTP basic credentials with every request
    pub fn with_basic_auth(mut self, auth: BasicAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Overall per-request timeout; unset leaves ureq's defaults in place
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Connector for HttpConnector {
    fn connect(&self) -> Result<Box<dyn Channel>, TransportError> {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        debug!(endpoint = %self.endpoint, "Opening channel");
        Ok(Box::new(HttpChannel {
            agent: builder.build(),
            endpoint: self.endpoint.clone(),
            namespace: self.namespace.clone(),
            auth: self.auth.clone(),
        }))
    }
}

struct HttpChannel {
    agent: ureq::Agent,
    endpoint: Url,
    namespace: String,
    auth: Option<BasicAuth>,
}

impl Channel for HttpChannel {
    fn invoke(&mut self, call: &Call) -> Result<Reply, TransportError> {
        let body = call.encode(&self.namespace)?;
        let url = self.endpoint.as_str();

        let mut request = self
            .agent
            .post(url)
            .set("Content-Type", "text/xml; charset=utf-8")
            .set(
                "SOAPAction",
                &format!("\"{}#{}\"", self.namespace, call.method()),
            );
        if let Some(auth) = &self.auth {
            request = request.set("Authorization", &auth.header());
        }

        let text = match request.send_string(&body) {
            Ok(response) => response.into_string()?,
            // Faults arrive with status 500 and an envelope body
            Err(ureq::Error::Status(status, response)) => {
                let text = response.into_string().unwrap_or_default();
                return match protocol::decode_envelope(&text) {
                    Ok(Envelope::Fault(fault)) => Err(TransportError::Fault {
                        code: fault.code,
                        message: fault.message,
                    }),
                    _ => Err(TransportError::Status {
                        url: url.to_string(),
                        status,
                    }),
                };
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(TransportError::Connection {
                    url: url.to_string(),
                    message: transport.to_string(),
                });
            }
        };

        match protocol::decode_envelope(&text)? {
            Envelope::Reply(reply) => Ok(reply),
            Envelope::Fault(fault) => Err(TransportError::Fault {
                code: fault.code,
                message: fault.message,
            }),
        }
    }
}

impl Drop for HttpChannel {
    fn drop(&mut self) {
        debug!(endpoint = %self.endpoint, "Closing channel");
    }
}
