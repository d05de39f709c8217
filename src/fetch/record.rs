//! Records and pages returned by a fetcher

use crate::fetch::FetchError;
use crate::storage::{AttributeMap, Scalar};
use serde_json::Value;

/// Field carrying the external identifier of an entity
pub const ID_FIELD: &str = "id";

/// Field wrapping the entity when the relation carries its own attributes
pub const NODE_FIELD: &str = "node";

/// One related entity, optionally with attributes of the connecting edge
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Stable external identifier, becomes the node `uri`
    pub uri: String,

    /// Entity attributes; nulls are kept as `None`
    pub attributes: AttributeMap,

    /// Attributes of the relation (e.g. `starredAt`)
    pub edge_attributes: AttributeMap,
}

impl Record {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Scalar>) -> Self {
        self.attributes.insert(key.to_string(), Some(value.into()));
        self
    }

    pub fn with_null(mut self, key: &str) -> Self {
        self.attributes.insert(key.to_string(), None);
        self
    }

    pub fn with_edge_attribute(mut self, key: &str, value: impl Into<Scalar>) -> Self {
        self.edge_attributes
            .insert(key.to_string(), Some(value.into()));
        self
    }

    /// Parses an API item
    ///
    /// Accepts either a plain entity object with an `id`, or a wrapper
    /// `{node: entity, ...edge attributes}`.
    pub fn from_json(value: &Value) -> Result<Self, FetchError> {
        let object = value
            .as_object()
            .ok_or_else(|| FetchError::Malformed(format!("expected an object, got {}", value)))?;

        let (entity, edge_attributes) = match object.get(NODE_FIELD) {
            Some(node) if node.is_object() => {
                let edge = object
                    .iter()
                    .filter(|(key, _)| key.as_str() != NODE_FIELD)
                    .map(|(key, value)| (key.clone(), Scalar::from_json(value)))
                    .collect();
                (node, edge)
            }
            _ => (value, AttributeMap::new()),
        };

        let uri = entity
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                FetchError::Malformed(format!("record without '{}': {}", ID_FIELD, entity))
            })?
            .to_string();

        let attributes = entity
            .as_object()
            .into_iter()
            .flatten()
            .filter(|(key, _)| key.as_str() != ID_FIELD && !key.starts_with("__"))
            .map(|(key, value)| (key.clone(), Scalar::from_json(value)))
            .collect();

        Ok(Self {
            uri,
            attributes,
            edge_attributes,
        })
    }
}

/// One page of a paginated connection
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Record>,

    /// Size of the whole connection as declared by the API
    pub total_count: u64,

    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}
