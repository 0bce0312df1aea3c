// used for persistence
use rusqlite::types::{ToSql, ToSqlOutput};

// used for transaction instants
use chrono::{DateTime, Utc};

// fixture values arrive as JSON
use serde_json::Value as Json;

// used to print out readable forms of a value
use std::fmt;

use crate::construct::Thing;

// ------------- Value Types --------------
#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug)]
pub enum ValueType {
    String,
    Keyword,
    Long,
    Boolean,
    Ref,
    Instant,
}

impl ValueType {
    pub const ALL: [ValueType; 6] = [
        ValueType::String,
        ValueType::Keyword,
        ValueType::Long,
        ValueType::Boolean,
        ValueType::Ref,
        ValueType::Instant,
    ];
    pub fn ident(&self) -> &'static str {
        match self {
            ValueType::String => "db.type/string",
            ValueType::Keyword => "db.type/keyword",
            ValueType::Long => "db.type/long",
            ValueType::Boolean => "db.type/boolean",
            ValueType::Ref => "db.type/ref",
            ValueType::Instant => "db.type/instant",
        }
    }
    pub fn from_ident(ident: &str) -> Option<ValueType> {
        let ident = ident.strip_prefix(':').unwrap_or(ident);
        Self::ALL.into_iter().find(|t| t.ident() == ident)
    }
}
impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.ident())
    }
}

#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug)]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    pub fn ident(&self) -> &'static str {
        match self {
            Cardinality::One => "db.cardinality/one",
            Cardinality::Many => "db.cardinality/many",
        }
    }
    pub fn from_ident(ident: &str) -> Option<Cardinality> {
        match ident.strip_prefix(':').unwrap_or(ident) {
            "db.cardinality/one" => Some(Cardinality::One),
            "db.cardinality/many" => Some(Cardinality::Many),
            _ => None,
        }
    }
}
impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.ident())
    }
}

// ------------- Values --------------
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug)]
pub enum Value {
    String(String),
    Keyword(String),
    Long(i64),
    Boolean(bool),
    Ref(Thing),
    Instant(DateTime<Utc>),
}

impl Value {
    /// Converts a fixture value into a value of the given type.
    ///
    /// Refs are not handled here since resolving them needs the tempids
    /// of the surrounding transaction. Returns `None` when the JSON does
    /// not fit the type.
    pub fn from_json(json: &Json, value_type: ValueType) -> Option<Value> {
        match value_type {
            ValueType::String => json.as_str().map(|s| Value::String(s.to_string())),
            ValueType::Keyword => json
                .as_str()
                .map(|s| Value::Keyword(s.strip_prefix(':').unwrap_or(s).to_string())),
            ValueType::Long => json.as_i64().map(Value::Long),
            ValueType::Boolean => json.as_bool().map(Value::Boolean),
            ValueType::Instant => json
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| Value::Instant(d.with_timezone(&Utc))),
            ValueType::Ref => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Keyword(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }
}
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Keyword(k) => write!(f, ":{}", k),
            Value::Long(l) => write!(f, "{}", l),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Ref(t) => write!(f, "#{}", t),
            Value::Instant(i) => write!(f, "#inst \"{}\"", i.to_rfc3339()),
        }
    }
}
impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::String(s) | Value::Keyword(s) => ToSqlOutput::from(s.as_str()),
            Value::Long(l) => ToSqlOutput::from(*l),
            Value::Boolean(b) => ToSqlOutput::from(*b),
            Value::Ref(t) => ToSqlOutput::from(*t as i64),
            Value::Instant(i) => ToSqlOutput::from(i.to_rfc3339()),
        })
    }
}
