//! Read access to the document store holding raw occupancy events.

use crate::error::FetchError;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub mod couchdb;
pub mod mock;

/// One document as returned by the store. The body shape depends on the
/// schema version that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Builds a document from a JSON value, returning `None` unless it is an object.
    pub fn from_value(id: impl Into<String>, value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self::new(id, fields)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|value| !value.is_null())
    }
}

/// A source of raw documents. Implementations perform a single read per
/// call and never retry; the poller owns retry-by-next-tick.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<RawDocument>, FetchError>;
}
