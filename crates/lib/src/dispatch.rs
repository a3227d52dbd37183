//! Remote call dispatch in one of the two wire dialects
//!
//! The dialect is fixed when the client is built; this is the only place
//! that looks at it. Everything above works with [`ParameterSet`]s and
//! [`Value`]s regardless of how they travel.

use tracing::{debug, instrument, warn};

use crate::client::ClientError;
use crate::codec;
use crate::protocol::Call;
use crate::transport::Connector;
use crate::value::{ParameterSet, Value};

/// Entry point of the legacy interface that every positional call goes through
pub const LEGACY_ENTRY_POINT: &str = "Dispatch";

/// Named parameter carrying the password in the generic interface
pub const PASSWORD_FIELD: &str = "Password";

/// Request/response convention used for every call of a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireDialect {
    /// `Dispatch(user, password, object, method, key, value, ...)`; replies are
    /// flat key/value sequences
    PositionalFlat { object: String },

    /// `method(login_field => user, Password => password, key => value, ...)`;
    /// replies are nested records
    NamedParameters { login_field: String },
}

impl WireDialect {
    fn name(&self) -> &'static str {
        match self {
            WireDialect::PositionalFlat { .. } => "positional",
            WireDialect::NamedParameters { .. } => "named",
        }
    }
}

/// Login name and optional password, sent with every call
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Issues remote calls and normalizes their outcome
pub struct Dispatcher<C> {
    connector: C,
    dialect: WireDialect,
    credentials: Credentials,
}

impl<C: Connector> Dispatcher<C> {
    pub fn new(connector: C, dialect: WireDialect, credentials: Credentials) -> Self {
        Self {
            connector,
            dialect,
            credentials,
        }
    }

    pub fn dialect(&self) -> &WireDialect {
        &self.dialect
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Wire request for `operation` with `params` in this dispatcher's dialect
    pub fn build_call(&self, operation: &str, params: &ParameterSet) -> Call {
        match &self.dialect {
            WireDialect::PositionalFlat { object } => {
                let mut args = Vec::with_capacity(4 + params.len() * 2);
                args.push(Value::from(&self.credentials.username));
                args.push(Value::from(self.credentials.password.clone()));
                args.push(Value::from(object));
                args.push(Value::from(operation));
                args.extend(codec::flatten(params));
                Call::Positional {
                    method: LEGACY_ENTRY_POINT.to_string(),
                    args,
                }
            }
            WireDialect::NamedParameters { login_field } => {
                let mut named = Vec::with_capacity(2 + params.len());
                named.push((login_field.clone(), Value::from(&self.credentials.username)));
                // Passwordless login types (e.g. session tokens) must not send the field at all
                if let Some(password) = &self.credentials.password {
                    named.push((PASSWORD_FIELD.to_string(), Value::from(password)));
                }
                named.extend(codec::named_parameters(params));
                Call::Named {
                    method: operation.to_string(),
                    params: named,
                }
            }
        }
    }

    /// Issue the call and decode the reply; transport faults are returned as errors.
    ///
    /// Parameter names that cannot go on the wire are rejected with
    /// [`ClientError::InvalidRequest`] before any channel is opened.
    pub fn try_dispatch(&self, operation: &str, params: &ParameterSet) -> Result<Value, ClientError> {
        let call = self.build_call(operation, params);
        call.validate().map_err(ClientError::InvalidRequest)?;
        debug!(operation, method = call.method(), "Dispatching call");

        let reply = {
            let mut channel = self.connector.connect()?;
            channel.invoke(&call)?
        };

        let value = match &self.dialect {
            WireDialect::PositionalFlat { .. } => codec::positional_reply(reply)?,
            WireDialect::NamedParameters { .. } => codec::object_to_hash(reply),
        };
        Ok(value)
    }

    /// Issue the call; `None` is the "no result" outcome.
    ///
    /// Transport failures and remote faults never propagate from here: they
    /// are logged and collapse to `None`, in both dialects. A reply that
    /// arrives but cannot be decoded is still an error.
    #[instrument(level = "debug", skip(self, params), fields(dialect = self.dialect.name()))]
    pub fn dispatch(&self, operation: &str, params: &ParameterSet) -> Result<Option<Value>, ClientError> {
        match self.try_dispatch(operation, params) {
            Ok(value) if value.is_null() => {
                debug!("Call returned no result");
                Ok(None)
            }
            Ok(value) => Ok(Some(value)),
            Err(ClientError::Transport(e)) => {
                warn!(operation, "Remote call failed: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
