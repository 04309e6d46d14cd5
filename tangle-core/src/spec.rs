use crate::policy::CrawlLevel;
use crate::result::CrawlError;
use std::time::Duration;
use tangle_net::{Credentials, Direction};

/// Inbound description of one crawl.
#[derive(Debug, Clone)]
pub struct CrawlSpec {
    pub seed_key: String,
    pub directions: Vec<Direction>,
    pub level: CrawlLevel,
    pub include_extra_attributes: bool,
    /// Per-enumeration item budget; `None` means unbounded.
    pub max_items_per_direction: Option<usize>,
    pub credentials: Option<Credentials>,
    pub http_timeout: Duration,
    pub http_retries: u32,
}

impl CrawlSpec {
    pub fn new(seed_key: impl Into<String>) -> Self {
        Self {
            seed_key: seed_key.into(),
            directions: vec![Direction::Outgoing],
            level: CrawlLevel::One,
            include_extra_attributes: false,
            max_items_per_direction: None,
            credentials: None,
            http_timeout: Duration::from_secs(10),
            http_retries: 3,
        }
    }

    pub fn with_level(mut self, level: CrawlLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_directions(mut self, directions: Vec<Direction>) -> Self {
        self.directions = directions;
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items_per_direction = Some(max_items);
        self
    }

    pub fn with_extra_attributes(mut self) -> Self {
        self.include_extra_attributes = true;
        self
    }

    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.seed_key.trim().is_empty() {
            return Err(CrawlError::InvalidSpec("seed key is empty".to_string()));
        }
        if self.directions.is_empty() {
            return Err(CrawlError::InvalidSpec(
                "at least one relation direction is required".to_string(),
            ));
        }
        let mut seen = Vec::new();
        for direction in &self.directions {
            if seen.contains(direction) {
                return Err(CrawlError::InvalidSpec(format!(
                    "direction '{}' requested twice",
                    direction.as_str()
                )));
            }
            seen.push(*direction);
        }
        if self.max_items_per_direction == Some(0) {
            return Err(CrawlError::InvalidSpec(
                "max items per direction must be positive".to_string(),
            ));
        }
        if self.http_timeout.is_zero() {
            return Err(CrawlError::InvalidSpec(
                "http timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
