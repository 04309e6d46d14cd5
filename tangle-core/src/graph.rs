use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tangle_net::{AttributeSpec, AttributeType};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum GraphError {
    #[error("attribute '{0}' is already defined")]
    AttributeRedefined(String),

    #[error("attribute '{0}' was never defined")]
    UnknownAttribute(String),

    #[error("vertex '{0}' was never registered")]
    UnregisteredVertex(String),

    #[error("edge endpoint '{0}' was never registered")]
    UnregisteredEndpoint(String),
}

/// A typed attribute value in the exported document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexRecord {
    pub id: String,
    pub attributes: BTreeMap<String, AttributeValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
}

/// The portable directed-graph document handed to rendering, export
/// and storage collaborators. Vertices appear in first-seen order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub crawled_at: DateTime<Utc>,
    pub schema: Vec<AttributeSpec>,
    pub vertices: Vec<VertexRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl GraphDocument {
    pub fn vertex(&self, key: &str) -> Option<&VertexRecord> {
        self.vertices.iter().find(|v| v.id == key)
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.source == source && e.target == target)
    }
}

struct Vertex {
    key: String,
    attributes: HashMap<String, Value>,
}

/// Dedup vertex registry, typed attribute schema and edge list for one
/// crawl. Owned by exactly one engine instance; never shared across
/// concurrent crawls.
#[derive(Default)]
pub struct GraphAccumulator {
    vertices: Vec<Vertex>,
    index: HashMap<String, usize>,
    edges: Vec<EdgeRecord>,
    schema: Vec<AttributeSpec>,
}

impl GraphAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an attribute. Must precede any value append under the
    /// same id; redefinition is an error.
    pub fn define_attribute(&mut self, spec: AttributeSpec) -> Result<(), GraphError> {
        if self.schema.iter().any(|s| s.id == spec.id) {
            return Err(GraphError::AttributeRedefined(spec.id));
        }
        self.schema.push(spec);
        Ok(())
    }

    /// Idempotent registration; returns whether the key was newly
    /// added. The first registration wins.
    pub fn register_vertex(&mut self, key: &str) -> bool {
        if self.index.contains_key(key) {
            return false;
        }
        self.index.insert(key.to_string(), self.vertices.len());
        self.vertices.push(Vertex {
            key: key.to_string(),
            attributes: HashMap::new(),
        });
        true
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Appends a directed edge. Both endpoints must have been
    /// registered at some point; duplicate edges are kept.
    pub fn append_edge(&mut self, source: &str, target: &str) -> Result<(), GraphError> {
        for endpoint in [source, target] {
            if !self.index.contains_key(endpoint) {
                return Err(GraphError::UnregisteredEndpoint(endpoint.to_string()));
            }
        }
        self.edges.push(EdgeRecord {
            source: source.to_string(),
            target: target.to_string(),
        });
        Ok(())
    }

    /// Stores a raw attribute value; coercion to the declared type
    /// happens at export time.
    pub fn append_attribute_value(
        &mut self,
        key: &str,
        attribute_id: &str,
        value: Value,
    ) -> Result<(), GraphError> {
        if !self.schema.iter().any(|s| s.id == attribute_id) {
            return Err(GraphError::UnknownAttribute(attribute_id.to_string()));
        }
        let slot = self
            .index
            .get(key)
            .copied()
            .ok_or_else(|| GraphError::UnregisteredVertex(key.to_string()))?;
        self.vertices[slot]
            .attributes
            .insert(attribute_id.to_string(), value);
        Ok(())
    }

    /// Keys registered without any attribute values, in first-seen
    /// order. These are the backfill candidates.
    pub fn keys_without_attributes(&self) -> Vec<String> {
        self.vertices
            .iter()
            .filter(|v| v.attributes.is_empty())
            .map(|v| v.key.clone())
            .collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Produces the immutable portable document. Stored values are
    /// coerced to their declared types; values that cannot be coerced
    /// are dropped from the document.
    pub fn export(&self) -> GraphDocument {
        let vertices = self
            .vertices
            .iter()
            .map(|vertex| {
                let mut attributes = BTreeMap::new();
                for spec in &self.schema {
                    if let Some(raw) = vertex.attributes.get(&spec.id)
                        && let Some(coerced) = coerce(raw, spec.value_type)
                    {
                        attributes.insert(spec.id.clone(), coerced);
                    }
                }
                VertexRecord {
                    id: vertex.key.clone(),
                    attributes,
                }
            })
            .collect();

        GraphDocument {
            crawled_at: Utc::now(),
            schema: self.schema.clone(),
            vertices,
            edges: self.edges.clone(),
        }
    }
}

fn coerce(raw: &Value, declared: AttributeType) -> Option<AttributeValue> {
    match declared {
        AttributeType::Text => Some(AttributeValue::Text(match raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        AttributeType::Number => match raw {
            Value::Number(n) => n.as_f64().map(AttributeValue::Number),
            Value::String(s) => s.trim().parse::<f64>().ok().map(AttributeValue::Number),
            Value::Bool(b) => Some(AttributeValue::Number(if *b { 1.0 } else { 0.0 })),
            _ => None,
        },
        AttributeType::Flag => match raw {
            Value::Bool(b) => Some(AttributeValue::Flag(*b)),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(AttributeValue::Flag(true)),
                "false" | "no" | "0" => Some(AttributeValue::Flag(false)),
                _ => None,
            },
            Value::Number(n) => n.as_f64().map(|n| AttributeValue::Flag(n != 0.0)),
            _ => None,
        },
    }
}
