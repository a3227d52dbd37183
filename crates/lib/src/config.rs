//! Client configuration
//!
//! Everything a client needs is fixed here at construction time: endpoint,
//! credentials, wire dialect, defaults and the operation table. Loaded from
//! `~/.config/otrsrpc/config.toml` unless a path is given.
//!
//! ```toml
//! base_url = "https://helpdesk.example.com/otrs"
//! username = "agent"
//! password = "secret"
//!
//! [dialect]
//! kind = "named"
//! webservice = "GenericTicketConnector"
//!
//! [defaults]
//! queue_id = 2
//! priority_id = 3
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::dispatch::{Credentials, WireDialect};
use crate::merge::MergePolicy;
use crate::params;
use crate::value::ParameterSet;

/// Environment variable that overrides the configured password
pub const PASSWORD_ENV: &str = "OTRSRPC_PASSWORD";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("no config path given and no config directory available")]
    NotFound,
}

/// Wire dialect selection with its dialect-specific settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DialectConfig {
    /// Legacy `rpc.pl` endpoint
    Positional {
        #[serde(default = "default_object")]
        object: String,
        #[serde(default = "default_legacy_namespace")]
        namespace: String,
    },

    /// GenericInterface web service
    Named {
        webservice: String,
        #[serde(default = "default_namespace")]
        namespace: String,
        /// `UserLogin` for agents, `CustomerUserLogin` for customers
        #[serde(default = "default_login_field")]
        login_field: String,
    },
}

fn default_object() -> String {
    "TicketObject".to_string()
}

fn default_legacy_namespace() -> String {
    "Core".to_string()
}

fn default_namespace() -> String {
    "http://www.otrs.org/TicketConnector/".to_string()
}

fn default_login_field() -> String {
    "UserLogin".to_string()
}

impl DialectConfig {
    pub fn positional() -> Self {
        DialectConfig::Positional {
            object: default_object(),
            namespace: default_legacy_namespace(),
        }
    }

    pub fn named(webservice: impl Into<String>) -> Self {
        DialectConfig::Named {
            webservice: webservice.into(),
            namespace: default_namespace(),
            login_field: default_login_field(),
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            DialectConfig::Positional { namespace, .. } | DialectConfig::Named { namespace, .. } => {
                namespace
            }
        }
    }

    pub fn wire_dialect(&self) -> WireDialect {
        match self {
            DialectConfig::Positional { object, .. } => WireDialect::PositionalFlat {
                object: object.clone(),
            },
            DialectConfig::Named { login_field, .. } => WireDialect::NamedParameters {
                login_field: login_field.clone(),
            },
        }
    }

    /// The legacy endpoint sits behind web server authentication; the
    /// generic interface authenticates in the request body only.
    pub fn uses_http_auth(&self) -> bool {
        matches!(self, DialectConfig::Positional { .. })
    }

    /// Operation table matching the service generation behind this dialect
    pub fn operation_table(&self) -> OperationTable {
        match self {
            DialectConfig::Positional { .. } => OperationTable::legacy(),
            DialectConfig::Named { .. } => OperationTable::generic_interface(),
        }
    }
}

/// Per-deployment identifiers used to fill in requests
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Requesting user for searches
    pub user_id: i64,
    pub queue_id: i64,
    pub type_id: Option<i64>,
    pub priority_id: i64,
    pub lock_id: i64,
    pub state: String,
    pub content_type: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            user_id: 1,
            queue_id: 1,
            type_id: None,
            priority_id: 3,
            lock_id: 1,
            state: "new".to_string(),
            content_type: "text/plain; charset=UTF-8".to_string(),
        }
    }
}

/// Immutable per-operation defaults, built once per client
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultsTables {
    pub ticket_search: ParameterSet,
    pub ticket_create: ParameterSet,
    pub article_create: ParameterSet,
}

impl From<&Defaults> for DefaultsTables {
    fn from(defaults: &Defaults) -> Self {
        let mut ticket_create = params! {
            "QueueID" => defaults.queue_id,
            "LockID" => defaults.lock_id,
            "PriorityID" => defaults.priority_id,
            "State" => defaults.state.as_str(),
        };
        if let Some(type_id) = defaults.type_id {
            ticket_create.insert("TypeID".to_string(), type_id.into());
        }

        Self {
            ticket_search: params! { "UserID" => defaults.user_id },
            ticket_create,
            article_create: params! { "ContentType" => defaults.content_type.as_str() },
        }
    }
}

/// Remote method and merge policy of one facade operation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OperationSpec {
    pub method: String,
    #[serde(default)]
    pub merge: MergePolicy,
}

impl OperationSpec {
    fn new(method: &str, merge: MergePolicy) -> Self {
        Self {
            method: method.to_string(),
            merge,
        }
    }
}

/// Remote methods backing each facade operation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OperationTable {
    pub ticket_search: OperationSpec,
    pub ticket_get: OperationSpec,
    pub ticket_number_lookup: OperationSpec,
    pub ticket_create: OperationSpec,
    pub ticket_article_add: OperationSpec,
    pub ticket_update: OperationSpec,
}

impl OperationTable {
    /// `TicketObject` methods reached through the `rpc.pl` Dispatch entry point
    pub fn legacy() -> Self {
        use MergePolicy::Shallow;
        Self {
            ticket_search: OperationSpec::new("TicketSearch", Shallow),
            ticket_get: OperationSpec::new("TicketGet", Shallow),
            ticket_number_lookup: OperationSpec::new("TicketNumberLookup", Shallow),
            ticket_create: OperationSpec::new("TicketCreate", Shallow),
            ticket_article_add: OperationSpec::new("ArticleCreate", Shallow),
            ticket_update: OperationSpec::new("TicketUpdate", Shallow),
        }
    }

    /// Operations of the GenericTicketConnector web service
    pub fn generic_interface() -> Self {
        use MergePolicy::{PerSubObject, Shallow};
        Self {
            ticket_search: OperationSpec::new("TicketSearch", Shallow),
            ticket_get: OperationSpec::new("TicketGet", Shallow),
            ticket_number_lookup: OperationSpec::new("TicketNumberLookup", Shallow),
            ticket_create: OperationSpec::new("TicketCreate", PerSubObject),
            ticket_article_add: OperationSpec::new("TicketUpdate", PerSubObject),
            ticket_update: OperationSpec::new("TicketUpdate", Shallow),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the installation, e.g. `https://host/otrs`
    pub base_url: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    pub dialect: DialectConfig,
    #[serde(default)]
    pub defaults: Defaults,
    /// Replaces the dialect's operation table when set
    #[serde(default)]
    pub operations: Option<OperationTable>,
    /// Per-request timeout in seconds; unset keeps the transport default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ClientConfig {
    /// Legacy `rpc.pl` client with default settings
    pub fn legacy(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        Self::with_dialect(base_url, username, password, DialectConfig::positional())
    }

    /// GenericInterface client for `webservice` with default settings
    pub fn generic_interface(
        base_url: impl Into<String>,
        webservice: impl Into<String>,
        username: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        Self::with_dialect(base_url, username, password, DialectConfig::named(webservice))
    }

    fn with_dialect(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: Option<String>,
        dialect: DialectConfig,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password,
            dialect,
            defaults: Defaults::default(),
            operations: None,
            timeout_secs: None,
        }
    }

    /// Load from `path`, or from the default location when `None`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path().ok_or(ConfigError::NotFound)?,
        };
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            config.password = Some(password);
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Get config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("otrsrpc/config.toml"))
    }

    /// RPC endpoint for the configured dialect
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let base = self.base_url.trim_end_matches('/');
        let url = match &self.dialect {
            DialectConfig::Positional { .. } => format!("{base}/rpc.pl"),
            DialectConfig::Named { webservice, .. } => {
                format!("{base}/nph-genericinterface.pl/Webservice/{webservice}")
            }
        };
        Ok(Url::parse(&url)?)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn operation_table(&self) -> OperationTable {
        self.operations
            .clone()
            .unwrap_or_else(|| self.dialect.operation_table())
    }
}
