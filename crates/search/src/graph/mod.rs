//! Knowledge graph path
//!
//! Questions are mapped to parameterized Cypher, executed against the graph
//! store and the returned records are rendered as short sentences.

mod mapper;
mod neo4j;
mod normalizer;

pub use mapper::{GraphQuery, GraphQueryMapper, GraphRule, FALLBACK_FRAGMENT_CHARS};
pub use neo4j::Neo4jStore;
pub use normalizer::{GraphResultNormalizer, PERSON_LABEL, UNKNOWN_NAME};

use async_trait::async_trait;
use hybridqa_common::errors::Result;
use serde_json::{Map, Value};

/// A typed element bound to one column of a graph result row
#[derive(Debug, Clone, PartialEq)]
pub enum GraphElement {
    Node {
        labels: Vec<String>,
        properties: Map<String, Value>,
    },
    Relationship {
        rel_type: String,
        properties: Map<String, Value>,
    },
    /// Scalars, lists and maps returned by projections
    Value(Value),
}

impl GraphElement {
    /// First label of a node, or the type of a relationship
    pub fn primary_label(&self) -> Option<&str> {
        match self {
            GraphElement::Node { labels, .. } => labels.first().map(String::as_str),
            GraphElement::Relationship { rel_type, .. } if !rel_type.is_empty() => {
                Some(rel_type.as_str())
            }
            _ => None,
        }
    }

    pub fn properties(&self) -> Option<&Map<String, Value>> {
        match self {
            GraphElement::Node { properties, .. }
            | GraphElement::Relationship { properties, .. } => Some(properties),
            GraphElement::Value(_) => None,
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        match self {
            GraphElement::Node { labels, .. } => labels.iter().any(|l| l == label),
            GraphElement::Relationship { rel_type, .. } => rel_type == label,
            GraphElement::Value(_) => false,
        }
    }
}

/// One result row: column name to element, in column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphRecord {
    pub fields: Vec<(String, GraphElement)>,
}

impl GraphRecord {
    pub fn new(fields: Vec<(String, GraphElement)>) -> Self {
        Self { fields }
    }

    /// Single-column record, mostly for tests
    pub fn single(key: impl Into<String>, element: GraphElement) -> Self {
        Self { fields: vec![(key.into(), element)] }
    }

    /// First element carrying a label, in column order
    pub fn first_labeled(&self) -> Option<&GraphElement> {
        self.fields
            .iter()
            .map(|(_, element)| element)
            .find(|element| element.primary_label().is_some())
    }
}

/// Graph store collaborator
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Execute a query and return its rows
    async fn execute(&self, query: &GraphQuery) -> Result<Vec<GraphRecord>>;

    /// Whether the store answered its last connectivity probe
    fn is_available(&self) -> bool;

    /// Availability for the coming turn; stores that can reconnect probe here
    async fn ensure_available(&self) -> bool {
        self.is_available()
    }
}
