use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which of the two complementary relations a pass queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outgoing => "outgoing",
            Direction::Incoming => "incoming",
        }
    }
}

/// Declared type of a vertex attribute. Stored values are coerced to
/// this type when the graph document is exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Text,
    Number,
    Flag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub id: String,
    pub display_name: String,
    pub value_type: AttributeType,
}

/// Attribute id -> raw (uncoerced) value.
pub type AttributeBag = HashMap<String, serde_json::Value>;

/// One entry from a relation endpoint: the related entity's key plus
/// whatever attribute values the endpoint carried inline.
#[derive(Debug, Clone)]
pub struct RelatedItem {
    pub key: String,
    pub attributes: AttributeBag,
}

impl RelatedItem {
    pub fn bare(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            attributes: AttributeBag::new(),
        }
    }
}

/// One page of a relation endpoint. `has_more` is false on the last
/// page (the endpoint returned fewer items than its page-size
/// constant), which lets the enumerator skip the known-empty next
/// request.
#[derive(Debug, Clone)]
pub struct RelatedPage {
    pub items: Vec<RelatedItem>,
    pub has_more: bool,
}

/// Attribute specs a source can describe vertices with. `base` specs
/// are always declared on the graph; `extra` specs only when the crawl
/// asks for the extended attribute set.
#[derive(Debug, Clone, Default)]
pub struct SourceSchema {
    pub base: Vec<AttributeSpec>,
    pub extra: Vec<AttributeSpec>,
}

/// The capability a concrete remote API must expose to the crawl
/// engine. One implementation per remote API; the engine never sees
/// wire formats.
#[async_trait]
pub trait RelationSource: Send + Sync {
    /// Fetch one 1-based page of entities related to `key` in the
    /// given direction.
    async fn related(&self, key: &str, direction: Direction, page: u32) -> Result<RelatedPage>;

    /// Fetch the attribute bag for a single entity. Used only for the
    /// backfill sub-pass.
    async fn attributes(&self, key: &str) -> Result<AttributeBag>;

    /// The attribute schema this source can populate.
    fn schema(&self) -> SourceSchema;
}
