use crate::error::{FetchError, Result};
use crate::fetcher::{HttpFetcher, StatusCheck};
use crate::source::{
    AttributeBag, AttributeSpec, AttributeType, Direction, RelatedItem, RelatedPage,
    RelationSource, SourceSchema,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Maps one vertex attribute onto a JSON pointer within a wire item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub id: String,
    pub display_name: String,
    pub value_type: AttributeType,
    /// JSON pointer to the value, relative to one item (relation
    /// pages) or to the attribute document root (backfill lookups).
    pub pointer: String,
}

impl AttributeMapping {
    fn spec(&self) -> AttributeSpec {
        AttributeSpec {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            value_type: self.value_type,
        }
    }
}

/// Data-driven description of a JSON-over-HTTP relation API. URL
/// templates take `{key}` and `{page}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub outgoing_url: String,
    pub incoming_url: String,
    pub attributes_url: String,
    /// JSON pointer to the item array within a relation page.
    pub items_pointer: String,
    /// JSON pointer to the entity key within one item.
    pub key_pointer: String,
    /// Page-size constant of the relation endpoints. A page shorter
    /// than this is the last one.
    pub page_size: usize,
    /// JSON pointer to the entity record within a backfill document.
    /// Empty means the document root.
    #[serde(default)]
    pub attributes_root_pointer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_check: Option<StatusCheck>,
    #[serde(default)]
    pub base_attributes: Vec<AttributeMapping>,
    #[serde(default)]
    pub extra_attributes: Vec<AttributeMapping>,
}

impl EndpointConfig {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(FetchError::InvalidUrl(
                "page_size must be greater than zero".to_string(),
            ));
        }

        for (name, template) in [
            ("outgoing_url", &self.outgoing_url),
            ("incoming_url", &self.incoming_url),
            ("attributes_url", &self.attributes_url),
        ] {
            if !template.contains("{key}") {
                return Err(FetchError::InvalidUrl(format!(
                    "{} template is missing the {{key}} placeholder",
                    name
                )));
            }
            let sample = expand_template(template, "probe", 1);
            if Url::parse(&sample).is_err() {
                return Err(FetchError::InvalidUrl(format!(
                    "{} template does not expand to a valid URL: {}",
                    name, template
                )));
            }
        }

        Ok(())
    }
}

fn expand_template(template: &str, key: &str, page: u32) -> String {
    let encoded_key: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
    template
        .replace("{key}", &encoded_key)
        .replace("{page}", &page.to_string())
}

/// The one concrete adapter shipped with the crate: a generic
/// JSON-over-HTTP relation source configured entirely by
/// [`EndpointConfig`].
pub struct JsonRelationSource {
    fetcher: HttpFetcher,
    config: EndpointConfig,
}

impl JsonRelationSource {
    pub fn new(fetcher: HttpFetcher, config: EndpointConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = match &config.status_check {
            Some(check) => fetcher.with_status_check(check.clone()),
            None => fetcher,
        };
        Ok(Self { fetcher, config })
    }

    fn collect_attributes(&self, record: &Value) -> AttributeBag {
        let mut bag = AttributeBag::new();
        for mapping in self
            .config
            .base_attributes
            .iter()
            .chain(&self.config.extra_attributes)
        {
            if let Some(value) = record.pointer(&mapping.pointer)
                && !value.is_null()
            {
                bag.insert(mapping.id.clone(), value.clone());
            }
        }
        bag
    }

    fn parse_item(&self, raw: &Value) -> Option<RelatedItem> {
        let key = match raw.pointer(&self.config.key_pointer) {
            Some(Value::String(key)) if !key.is_empty() => key.clone(),
            Some(Value::Number(key)) => key.to_string(),
            _ => {
                // Malformed entries are a policy matter, not an error.
                debug!("related item has no usable key, skipping: {}", raw);
                return None;
            }
        };

        Some(RelatedItem {
            key,
            attributes: self.collect_attributes(raw),
        })
    }
}

#[async_trait]
impl RelationSource for JsonRelationSource {
    async fn related(&self, key: &str, direction: Direction, page: u32) -> Result<RelatedPage> {
        let template = match direction {
            Direction::Outgoing => &self.config.outgoing_url,
            Direction::Incoming => &self.config.incoming_url,
        };
        let url = expand_template(template, key, page);
        let document = self.fetcher.fetch_json(&url).await?;

        let raw_items = match document.pointer(&self.config.items_pointer) {
            Some(Value::Array(items)) => items.as_slice(),
            _ => {
                debug!("no item array at {} in {}", self.config.items_pointer, url);
                &[]
            }
        };

        let has_more = raw_items.len() >= self.config.page_size;
        let items = raw_items
            .iter()
            .filter_map(|raw| self.parse_item(raw))
            .collect();

        Ok(RelatedPage { items, has_more })
    }

    async fn attributes(&self, key: &str) -> Result<AttributeBag> {
        let url = expand_template(&self.config.attributes_url, key, 1);
        let document = self.fetcher.fetch_json(&url).await?;

        let record = if self.config.attributes_root_pointer.is_empty() {
            Some(&document)
        } else {
            document.pointer(&self.config.attributes_root_pointer)
        };

        Ok(record
            .map(|record| self.collect_attributes(record))
            .unwrap_or_default())
    }

    fn schema(&self) -> SourceSchema {
        SourceSchema {
            base: self.config.base_attributes.iter().map(|m| m.spec()).collect(),
            extra: self.config.extra_attributes.iter().map(|m| m.spec()).collect(),
        }
    }
}
