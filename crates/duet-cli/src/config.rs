use std::path::Path;

use anyhow::Context;
use duet_crawl::CrawlOptions;
use duet_diff::ReportOptions;
use duet_load::LoadOptions;
use duet_stream::StreamOptions;
use duet_transport::{ServerAddress, WebSocketOptions};
use serde::{Deserialize, Serialize};

/// Everything a run can be configured with. Any section may be omitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuetConfig {
    pub candidate: ServerAddress,
    pub reference: ServerAddress,
    pub websocket: WebSocketOptions,
    pub crawl: CrawlOptions,
    pub stream: StreamOptions,
    pub load: LoadOptions,
    pub report: ReportOptions,
}

impl Default for DuetConfig {
    fn default() -> Self {
        Self {
            candidate: ServerAddress::new("127.0.0.1", 8080),
            reference: ServerAddress::new("127.0.0.1", 6006),
            websocket: WebSocketOptions::default(),
            crawl: CrawlOptions::default(),
            stream: StreamOptions::default(),
            load: LoadOptions::default(),
            report: ReportOptions::default(),
        }
    }
}

impl DuetConfig {
    /// Defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
