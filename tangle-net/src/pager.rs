use crate::error::Result;
use crate::source::{Direction, RelatedItem, RelationSource};
use std::collections::VecDeque;
use tracing::debug;

/// Lazy, bounded cursor over a paginated relation endpoint.
///
/// Requests 1-based pages through the source and yields items one at a
/// time until the budget is reached or the source signals the last
/// page, in which case no further page is requested. The sequence is
/// finite and consumed exactly once; it is not restartable.
pub struct PageEnumerator<'a> {
    source: &'a dyn RelationSource,
    key: String,
    direction: Direction,
    max_items: Option<usize>,
    next_page: u32,
    buffer: VecDeque<RelatedItem>,
    exhausted: bool,
    yielded: usize,
    pages_fetched: usize,
}

impl<'a> PageEnumerator<'a> {
    pub fn new(
        source: &'a dyn RelationSource,
        key: &str,
        direction: Direction,
        max_items: Option<usize>,
    ) -> Self {
        Self {
            source,
            key: key.to_string(),
            direction,
            max_items,
            next_page: 1,
            buffer: VecDeque::new(),
            exhausted: false,
            yielded: 0,
            pages_fetched: 0,
        }
    }

    /// Number of pages actually requested so far. The crawl engine
    /// turns this into request statistics.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    fn budget_spent(&self) -> bool {
        self.max_items.is_some_and(|max| self.yielded >= max)
    }

    pub async fn next(&mut self) -> Result<Option<RelatedItem>> {
        if self.budget_spent() {
            return Ok(None);
        }

        if self.buffer.is_empty() {
            if self.exhausted {
                return Ok(None);
            }

            let page = self
                .source
                .related(&self.key, self.direction, self.next_page)
                .await?;
            self.pages_fetched += 1;
            debug!(
                "fetched page {} for {} ({}): {} items, has_more={}",
                self.next_page,
                self.key,
                self.direction.as_str(),
                page.items.len(),
                page.has_more
            );
            self.next_page += 1;

            // A short page is the last-page signal; an empty page ends
            // the sequence regardless of what the source claims.
            if !page.has_more || page.items.is_empty() {
                self.exhausted = true;
            }
            self.buffer.extend(page.items);

            if self.buffer.is_empty() {
                return Ok(None);
            }
        }

        let item = self.buffer.pop_front();
        if item.is_some() {
            self.yielded += 1;
        }
        Ok(item)
    }
}
