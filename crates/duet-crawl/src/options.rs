use serde::{Deserialize, Serialize};

/// Knobs for one crawl. Ceilings are inclusive stop conditions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlOptions {
    /// Page size requested from the server (`limit`).
    pub page_limit: Option<u32>,
    pub max_pages: Option<usize>,
    pub max_items: Option<usize>,
    /// Retries with the same cursor after a server-reported error.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Keep only ledger objects whose type tag matches (case-insensitive).
    pub type_filter: Option<String>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            page_limit: None,
            max_pages: None,
            max_items: None,
            max_retries: 3,
            retry_delay_ms: 0,
            type_filter: None,
        }
    }
}

impl CrawlOptions {
    pub fn page_limit(mut self, limit: u32) -> Self {
        self.page_limit = Some(limit);
        self
    }

    pub fn max_pages(mut self, pages: usize) -> Self {
        self.max_pages = Some(pages);
        self
    }

    pub fn max_items(mut self, items: usize) -> Self {
        self.max_items = Some(items);
        self
    }

    pub fn type_filter(mut self, tag: impl Into<String>) -> Self {
        self.type_filter = Some(tag.into());
        self
    }
}
