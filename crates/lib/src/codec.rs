//! Conversion between [`ParameterSet`]s and the two wire shapes
//!
//! The legacy interface takes and returns flat alternating key/value
//! sequences; the generic interface takes named parameters and returns
//! nested records.

use std::collections::HashSet;

use thiserror::Error;

use crate::protocol::Reply;
use crate::value::{ParameterSet, Value};

/// A reply that cannot be reshaped into the expected structure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplyError {
    #[error("flat sequence has odd length {0}")]
    OddLength(usize),
    #[error("flat sequence key is not a string: {0:?}")]
    InvalidKey(Value),
    #[error("reply is missing the {0} field")]
    MissingField(&'static str),
    #[error("reply value is not numeric: {0:?}")]
    NotNumeric(Value),
}

/// Flatten the top level of a set into `key, value, key, value, ...`.
///
/// Nested sets are passed through as single values. Keys are unique by
/// construction, which is what makes [`inflate`] the inverse.
pub fn flatten(params: &ParameterSet) -> Vec<Value> {
    let mut out = Vec::with_capacity(params.len() * 2);
    for (key, value) in params {
        out.push(Value::Str(key.clone()));
        out.push(value.clone());
    }
    out
}

/// Rebuild a set from a flat `key, value, ...` sequence.
///
/// Values that are themselves lists are inflated recursively. Integer keys
/// are accepted and rendered in decimal.
pub fn inflate(flat: Vec<Value>) -> Result<ParameterSet, ReplyError> {
    if flat.len() % 2 != 0 {
        return Err(ReplyError::OddLength(flat.len()));
    }

    let mut out = ParameterSet::with_capacity(flat.len() / 2);
    let mut items = flat.into_iter();
    while let (Some(key), Some(value)) = (items.next(), items.next()) {
        let key = match key {
            Value::Str(s) => s,
            Value::Int(n) => n.to_string(),
            other => return Err(ReplyError::InvalidKey(other)),
        };
        let value = match value {
            Value::List(nested) => Value::Map(inflate(nested)?),
            other => other,
        };
        out.insert(key, value);
    }
    Ok(out)
}

/// One named wire parameter per entry, in order
pub fn named_parameters(params: &ParameterSet) -> Vec<(String, Value)> {
    params
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Convert a record-shaped reply into nested sets.
///
/// Services emit one element per list item, so a field name repeated within
/// a record collects into a list in document order.
pub fn object_to_hash(reply: Reply) -> Value {
    match reply {
        Reply::Scalar(value) => value,
        Reply::Sequence(items) => Value::List(items.into_iter().map(object_to_hash).collect()),
        Reply::Record(fields) => {
            let mut out = ParameterSet::with_capacity(fields.len());
            let mut aggregated = HashSet::new();
            for (name, field) in fields {
                let value = object_to_hash(field);
                match out.get_mut(&name) {
                    Some(Value::List(existing)) if aggregated.contains(&name) => existing.push(value),
                    Some(existing) => {
                        let first = std::mem::take(existing);
                        *existing = Value::List(vec![first, value]);
                        aggregated.insert(name);
                    }
                    None => {
                        out.insert(name, value);
                    }
                }
            }
            Value::Map(out)
        }
    }
}

/// Interpret a legacy `Dispatch` reply.
///
/// The response's return parts are read in order: no parts means null, a
/// lone scalar passes through, a lone array is inflated, and several parts
/// are themselves the flat sequence.
pub fn positional_reply(reply: Reply) -> Result<Value, ReplyError> {
    let mut parts = match reply {
        Reply::Record(fields) => fields.into_iter().map(|(_, part)| part).collect(),
        Reply::Sequence(items) => items,
        scalar @ Reply::Scalar(_) => vec![scalar],
    };

    match parts.len() {
        0 => Ok(Value::Null),
        1 => match parts.remove(0) {
            Reply::Scalar(value) => Ok(value),
            Reply::Sequence(items) => Ok(Value::Map(inflate(flat_values(items))?)),
            record @ Reply::Record(_) => Ok(object_to_hash(record)),
        },
        _ => Ok(Value::Map(inflate(flat_values(parts))?)),
    }
}

fn flat_values(parts: Vec<Reply>) -> Vec<Value> {
    parts
        .into_iter()
        .map(|part| match part {
            Reply::Scalar(value) => value,
            Reply::Sequence(items) => Value::List(flat_values(items)),
            record @ Reply::Record(_) => object_to_hash(record),
        })
        .collect()
}
