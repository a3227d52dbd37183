use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::codec::ReplyError;
use crate::config::{ClientConfig, ConfigError, DefaultsTables, OperationTable};
use crate::dispatch::Dispatcher;
use crate::merge::{self, MergePolicy};
use crate::params;
use crate::protocol::ProtocolError;
use crate::transport::{BasicAuth, Connector, HttpConnector, TransportError};
use crate::value::{ParameterSet, Value};

const TICKET: &str = "Ticket";
const ARTICLE: &str = "Article";
const TICKET_ID: &str = "TicketID";
const TICKET_NUMBER: &str = "TicketNumber";
const ARTICLE_ID: &str = "ArticleID";

/// Errors from the ticket client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid request: {0}")]
    InvalidRequest(#[source] ProtocolError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("malformed reply: {0}")]
    MalformedReply(#[from] ReplyError),
}

/// Identifiers returned when a ticket is created
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedTicket {
    pub ticket_id: Value,
    pub ticket_number: Option<Value>,
    pub article_id: Option<Value>,
}

/// Ticket and article operations over one configured endpoint.
///
/// Every operation returns `Ok(None)` when the service gave no result (this
/// includes transport failures and remote faults) or when the ticket ID
/// argument is not an identifier. `Err` is reserved for replies that
/// arrived but could not be reshaped.
pub struct TicketClient<C = HttpConnector> {
    dispatcher: Dispatcher<C>,
    defaults: DefaultsTables,
    operations: OperationTable,
}

impl TicketClient {
    /// Create a client talking SOAP over HTTP to the configured endpoint
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut connector = HttpConnector::new(config.endpoint()?, config.dialect.namespace());
        if config.dialect.uses_http_auth() {
            connector = connector.with_basic_auth(BasicAuth {
                username: config.username.clone(),
                password: config.password.clone(),
            });
        }
        if let Some(secs) = config.timeout_secs {
            connector = connector.with_timeout(Duration::from_secs(secs));
        }
        Ok(Self::with_connector(config, connector))
    }
}

impl<C: Connector> TicketClient<C> {
    /// Create a client over a custom connector
    pub fn with_connector(config: &ClientConfig, connector: C) -> Self {
        Self {
            dispatcher: Dispatcher::new(
                connector,
                config.dialect.wire_dialect(),
                config.credentials(),
            ),
            defaults: DefaultsTables::from(&config.defaults),
            operations: config.operation_table(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    pub fn defaults(&self) -> &DefaultsTables {
        &self.defaults
    }

    /// IDs of tickets matching `params`, merged over the search defaults
    pub fn ticket_search(&self, params: &ParameterSet) -> Result<Option<Vec<Value>>, ClientError> {
        let request = merge::merge(&self.defaults.ticket_search, params);
        let result = self
            .dispatcher
            .dispatch(&self.operations.ticket_search.method, &request)?;
        Ok(result.and_then(ticket_ids))
    }

    /// IDs of all tickets visible to the requesting user
    pub fn ticket_list_ids(&self, params: &ParameterSet) -> Result<Option<Vec<Value>>, ClientError> {
        self.ticket_search(params)
    }

    /// Fetch one ticket
    pub fn ticket_get(
        &self,
        id: &Value,
        params: &ParameterSet,
    ) -> Result<Option<ParameterSet>, ClientError> {
        if !id.is_ticket_id() {
            debug!(?id, "Not a ticket id, skipping get");
            return Ok(None);
        }
        let request = with_ticket_id(id, params);
        let result = self
            .dispatcher
            .dispatch(&self.operations.ticket_get.method, &request)?;
        Ok(result.and_then(Value::into_map))
    }

    /// Fetch every matching ticket, one call per ID in search order
    pub fn ticket_list(
        &self,
        params: &ParameterSet,
    ) -> Result<Option<Vec<Option<ParameterSet>>>, ClientError> {
        let Some(ids) = self.ticket_list_ids(params)? else {
            return Ok(None);
        };

        let extra = ParameterSet::new();
        let mut tickets = Vec::with_capacity(ids.len());
        for id in &ids {
            tickets.push(self.ticket_get(id, &extra)?);
        }
        Ok(Some(tickets))
    }

    /// Ticket number for a ticket ID, as a plain decimal string
    pub fn ticket_number_lookup(&self, id: &Value) -> Result<Option<String>, ClientError> {
        if !id.is_ticket_id() {
            return Ok(None);
        }
        let request = params! { TICKET_ID => id.clone() };
        match self
            .dispatcher
            .dispatch(&self.operations.ticket_number_lookup.method, &request)?
        {
            Some(number) => Ok(Some(format_number(number)?)),
            None => Ok(None),
        }
    }

    /// Create a ticket.
    ///
    /// Under [`MergePolicy::PerSubObject`] `params` carries `Ticket` and
    /// `Article` sub-objects, each merged against its own defaults; under
    /// [`MergePolicy::Shallow`] `params` holds the ticket fields directly.
    pub fn ticket_create(&self, params: &ParameterSet) -> Result<Option<CreatedTicket>, ClientError> {
        let spec = &self.operations.ticket_create;
        let request = match spec.merge {
            MergePolicy::Shallow => merge::merge(&self.defaults.ticket_create, params),
            MergePolicy::PerSubObject => {
                let mut request = params.clone();
                merge::merge_sub_object(&mut request, TICKET, &self.defaults.ticket_create);
                merge::merge_sub_object(&mut request, ARTICLE, &self.defaults.article_create);
                request
            }
        };
        let result = self.dispatcher.dispatch(&spec.method, &request)?;
        Ok(result.map(created_ticket).transpose()?)
    }

    /// Create a ticket together with its first article.
    ///
    /// When the creation reply does not already carry an article ID the
    /// article is added in a second call.
    pub fn ticket_article_create(
        &self,
        ticket: &ParameterSet,
        article: &ParameterSet,
    ) -> Result<Option<CreatedTicket>, ClientError> {
        let request = match self.operations.ticket_create.merge {
            MergePolicy::PerSubObject => params! {
                TICKET => ticket.clone(),
                ARTICLE => article.clone(),
            },
            MergePolicy::Shallow => ticket.clone(),
        };

        let Some(mut created) = self.ticket_create(&request)? else {
            return Ok(None);
        };
        if created.article_id.is_none() {
            created.article_id = self.ticket_article_add(&created.ticket_id, article)?;
        }
        Ok(Some(created))
    }

    /// Add an article to an existing ticket, returning the new article's ID
    pub fn ticket_article_add(
        &self,
        id: &Value,
        params: &ParameterSet,
    ) -> Result<Option<Value>, ClientError> {
        if !id.is_ticket_id() {
            return Ok(None);
        }
        let spec = &self.operations.ticket_article_add;
        let article = merge::merge(&self.defaults.article_create, params);
        let request = match spec.merge {
            MergePolicy::Shallow => with_ticket_id(id, &article),
            MergePolicy::PerSubObject => params! {
                TICKET_ID => id.clone(),
                ARTICLE => article,
            },
        };

        match self.dispatcher.dispatch(&spec.method, &request)? {
            Some(Value::Map(mut reply)) => reply
                .shift_remove(ARTICLE_ID)
                .map(Some)
                .ok_or_else(|| ReplyError::MissingField(ARTICLE_ID).into()),
            // The legacy interface answers with the bare article ID
            Some(article_id) if article_id.is_ticket_id() => Ok(Some(article_id)),
            _ => Ok(None),
        }
    }

    /// Update ticket fields; the reply is returned as the service sent it
    pub fn ticket_update(&self, id: &Value, params: &ParameterSet) -> Result<Option<Value>, ClientError> {
        if !id.is_ticket_id() {
            return Ok(None);
        }
        let request = params! {
            TICKET_ID => id.clone(),
            TICKET => params.clone(),
        };
        self.dispatcher
            .dispatch(&self.operations.ticket_update.method, &request)
    }
}

/// `TicketID` first, then the caller's parameters; the explicit ID wins.
fn with_ticket_id(id: &Value, params: &ParameterSet) -> ParameterSet {
    let mut request = params! { TICKET_ID => id.clone() };
    for (key, value) in params {
        if key != TICKET_ID {
            request.insert(key.clone(), value.clone());
        }
    }
    request
}

/// Search results come back either keyed by ticket ID (legacy) or as a
/// `TicketID` field holding one or many IDs.
fn ticket_ids(result: Value) -> Option<Vec<Value>> {
    match result {
        Value::Map(mut map) => match map.shift_remove(TICKET_ID) {
            Some(Value::List(ids)) => Some(ids),
            Some(id) => Some(vec![id]),
            None => Some(map.into_keys().map(Value::Str).collect()),
        },
        Value::List(ids) => Some(ids),
        _ => None,
    }
}

fn created_ticket(result: Value) -> Result<CreatedTicket, ReplyError> {
    match result {
        Value::Map(mut map) => Ok(CreatedTicket {
            ticket_id: map
                .shift_remove(TICKET_ID)
                .ok_or(ReplyError::MissingField(TICKET_ID))?,
            ticket_number: map.shift_remove(TICKET_NUMBER),
            article_id: map.shift_remove(ARTICLE_ID),
        }),
        id if id.is_ticket_id() => Ok(CreatedTicket {
            ticket_id: id,
            ticket_number: None,
            article_id: None,
        }),
        _ => Err(ReplyError::MissingField(TICKET_ID)),
    }
}

/// Render a numeric reply as a plain decimal string: no separators, no
/// fraction, no exponent.
pub fn format_number(value: Value) -> Result<String, ReplyError> {
    match value {
        Value::Int(n) => Ok(n.to_string()),
        Value::Float(f) if f.is_finite() => Ok(format!("{:.0}", f.round())),
        Value::Str(ref s) => {
            let trimmed = s.trim();
            if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
                let digits = trimmed.trim_start_matches('0');
                return Ok(if digits.is_empty() { "0" } else { digits }.to_string());
            }
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(format!("{:.0}", f.round())),
                _ => Err(ReplyError::NotNumeric(value)),
            }
        }
        other => Err(ReplyError::NotNumeric(other)),
    }
}
