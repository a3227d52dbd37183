//! Loosely-typed values exchanged with the ticketing service
//!
//! Requests and decoded replies are both expressed as [`Value`]s. A
//! [`ParameterSet`] is an insertion-ordered map: the order in which keys are
//! inserted is the order in which they are flattened onto the wire.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeSeq, Serializer};

/// Ordered key-value structure used for both requests and decoded replies
pub type ParameterSet = IndexMap<String, Value>;

/// A single request or reply value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(ParameterSet),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_map(&self) -> Option<&ParameterSet> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<ParameterSet> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Whether this value can stand in for a ticket or article identifier.
    ///
    /// Identifiers arrive either as integers or as all-digit strings (the
    /// legacy interface keys its search results by stringified IDs).
    pub fn is_ticket_id(&self) -> bool {
        match self {
            Value::Int(_) => true,
            Value::Str(s) => !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<ParameterSet> for Value {
    fn from(map: ParameterSet) -> Self {
        Value::Map(map)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => map.serialize(serializer),
        }
    }
}

/// Build a [`ParameterSet`] in the given key order
///
/// ```
/// use libotrsrpc::{params, Value};
///
/// let set = params! { "TicketID" => 42, "Title" => "Printer on fire" };
/// assert_eq!(set.get_index(0), Some((&"TicketID".to_string(), &Value::Int(42))));
/// ```
#[macro_export]
macro_rules! params {
    () => { $crate::ParameterSet::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut set = $crate::ParameterSet::new();
        $( set.insert(::std::string::String::from($key), $crate::Value::from($value)); )+
        set
    }};
}
