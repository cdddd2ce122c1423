use std::collections::{HashMap, HashSet};
use std::time::Duration;

use duet_protocol::{normalize, Envelope, RequestBuilder};
use duet_transport::{ShutdownSignal, Transport};
use duet_types::{AggregateBuilder, AggregateResult, Cursor, Item, RecordKind};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{CrawlError, CrawlResult};
use crate::options::CrawlOptions;

/// Result of one crawl: everything gathered, plus why it stopped early.
#[derive(Clone, Debug, PartialEq)]
pub struct CrawlOutcome {
    pub result: AggregateResult,
    pub pages_fetched: usize,
    pub requests_sent: usize,
    pub error: Option<CrawlError>,
}

impl CrawlOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// The result when the crawl finished cleanly, the error otherwise.
    pub fn into_result(self) -> CrawlResult<AggregateResult> {
        match self.error {
            None => Ok(self.result),
            Some(e) => Err(e),
        }
    }
}

enum CrawlState {
    Init,
    Fetch {
        cursor: Option<Cursor>,
        attempt: u32,
    },
    Accumulate {
        payload: Value,
        cursor: Option<Cursor>,
        attempt: u32,
    },
    Check {
        next: Option<Cursor>,
    },
    Done,
    Error(CrawlError),
}

/// Drives FETCH → ACCUMULATE → CHECK over one exclusively borrowed session.
pub struct Crawler<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    options: CrawlOptions,
    shutdown: ShutdownSignal,
}

impl<'a, T: Transport + ?Sized> Crawler<'a, T> {
    pub fn new(transport: &'a mut T, options: CrawlOptions) -> Self {
        Self {
            transport,
            options,
            shutdown: ShutdownSignal::never(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Walk `request`'s endpoint until the server stops returning a cursor,
    /// a ceiling is reached, or something fails.
    ///
    /// Work gathered before a failure is kept in the outcome. Cancellation
    /// discards it.
    pub async fn run(&mut self, request: &RequestBuilder) -> CrawlOutcome {
        let descriptor = request.descriptor();
        let Some(record_kind) = descriptor.record else {
            return CrawlOutcome {
                result: AggregateResult::default(),
                pages_fetched: 0,
                requests_sent: 0,
                error: Some(CrawlError::NotItemized(descriptor.kind)),
            };
        };
        let inherited = request.pinned_ledger();
        let mut aggregate = AggregateBuilder::new();
        let mut seen: HashSet<Cursor> = HashSet::new();
        let mut object_keys: HashMap<String, String> = HashMap::new();
        let mut pages_fetched = 0usize;
        let mut requests_sent = 0usize;
        let mut state = CrawlState::Init;

        let error = loop {
            state = match state {
                CrawlState::Init => CrawlState::Fetch {
                    cursor: None,
                    attempt: 0,
                },

                CrawlState::Fetch { cursor, attempt } => {
                    match request.build(cursor.as_ref(), self.options.page_limit) {
                        Err(e) => CrawlState::Error(e.into()),
                        Ok(req) => {
                            requests_sent += 1;
                            match self.exchange(&req).await {
                                Ok(payload) => CrawlState::Accumulate {
                                    payload,
                                    cursor,
                                    attempt,
                                },
                                Err(e) => CrawlState::Error(e),
                            }
                        }
                    }
                }

                CrawlState::Accumulate {
                    payload,
                    cursor,
                    attempt,
                } => match normalize(descriptor, &payload) {
                    Err(e) => CrawlState::Error(e.into()),
                    Ok(Envelope {
                        error: Some(fault), ..
                    }) => {
                        if attempt >= self.options.max_retries {
                            CrawlState::Error(CrawlError::ServerError {
                                attempts: attempt + 1,
                                fault,
                            })
                        } else {
                            warn!(
                                endpoint = %descriptor.kind,
                                attempt = attempt + 1,
                                %fault,
                                "server error, retrying with same cursor"
                            );
                            match self.pause().await {
                                Ok(()) => CrawlState::Fetch {
                                    cursor,
                                    attempt: attempt + 1,
                                },
                                Err(e) => CrawlState::Error(e),
                            }
                        }
                    }
                    Ok(envelope) => {
                        pages_fetched += 1;
                        let received = envelope.items.len();
                        match self.ingest(&mut aggregate, &mut object_keys, record_kind, &envelope.items, inherited) {
                            Ok(()) => {
                                debug!(
                                    endpoint = %descriptor.kind,
                                    page = pages_fetched,
                                    received,
                                    total = aggregate.len(),
                                    "page accumulated"
                                );
                                CrawlState::Check {
                                    next: envelope.continuation,
                                }
                            }
                            Err(e) => CrawlState::Error(e),
                        }
                    }
                },

                CrawlState::Check { next } => {
                    let pages_reached = self.options.max_pages.is_some_and(|max| pages_fetched >= max);
                    let items_reached = self.options.max_items.is_some_and(|max| aggregate.len() >= max);
                    match next {
                        None => CrawlState::Done,
                        Some(_) if pages_reached || items_reached => {
                            debug!(endpoint = %descriptor.kind, pages_fetched, "ceiling reached");
                            CrawlState::Done
                        }
                        Some(next) if !seen.insert(next.clone()) => {
                            CrawlState::Error(CrawlError::LoopDetected {
                                cursor: next,
                                page: pages_fetched,
                            })
                        }
                        Some(next) => CrawlState::Fetch {
                            cursor: Some(next),
                            attempt: 0,
                        },
                    }
                }

                CrawlState::Done => break None,
                CrawlState::Error(e) => break Some(e),
            };
        };

        let result = match &error {
            Some(e) if e.is_cancelled() => {
                let _ = self.transport.close().await;
                AggregateResult::default()
            }
            _ => aggregate.freeze(),
        };

        match &error {
            None => info!(
                endpoint = %descriptor.kind,
                pages = pages_fetched,
                items = result.len(),
                "crawl done"
            ),
            Some(e) => warn!(
                endpoint = %descriptor.kind,
                pages = pages_fetched,
                items = result.len(),
                error = %e,
                "crawl stopped"
            ),
        }

        CrawlOutcome {
            result,
            pages_fetched,
            requests_sent,
            error,
        }
    }

    /// Issue one non-paginated request, retrying server errors like a crawl
    /// page, and return the normalized items.
    pub async fn fetch(&mut self, request: &RequestBuilder) -> CrawlResult<Vec<Value>> {
        let descriptor = request.descriptor();
        let req = request.build(None, self.options.page_limit)?;
        let mut attempt = 0;
        loop {
            let payload = self.exchange(&req).await?;
            let envelope = normalize(descriptor, &payload)?;
            match envelope.error {
                None => return Ok(envelope.items),
                Some(fault) if attempt >= self.options.max_retries => {
                    return Err(CrawlError::ServerError {
                        attempts: attempt + 1,
                        fault,
                    })
                }
                Some(fault) => {
                    warn!(endpoint = %descriptor.kind, attempt = attempt + 1, %fault, "server error, retrying");
                    attempt += 1;
                    self.pause().await?;
                }
            }
        }
    }

    async fn exchange(&mut self, request: &Value) -> CrawlResult<Value> {
        tokio::select! {
            biased;
            _ = self.shutdown.triggered() => Err(CrawlError::Cancelled),
            response = self.transport.request(request) => response.map_err(CrawlError::from),
        }
    }

    async fn pause(&self) -> CrawlResult<()> {
        if self.options.retry_delay_ms == 0 {
            return if self.shutdown.is_triggered() {
                Err(CrawlError::Cancelled)
            } else {
                Ok(())
            };
        }
        tokio::select! {
            biased;
            _ = self.shutdown.triggered() => Err(CrawlError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(self.options.retry_delay_ms)) => Ok(()),
        }
    }

    /// Decode and append one page. A ledger object whose key was already
    /// gathered is dropped; scans that overlap pages return some twice.
    fn ingest(
        &self,
        aggregate: &mut AggregateBuilder,
        object_keys: &mut HashMap<String, String>,
        kind: RecordKind,
        records: &[Value],
        inherited: Option<u32>,
    ) -> CrawlResult<()> {
        for record in records {
            let item = Item::from_record_at(kind, record, inherited)?;
            if let Some(filter) = &self.options.type_filter {
                if matches!(item, Item::LedgerObject(_))
                    && !item.type_tag().is_some_and(|tag| tag.eq_ignore_ascii_case(filter))
                {
                    continue;
                }
            }
            if let Item::LedgerObject(object) = &item {
                if !object.has_valid_key() {
                    warn!(key = %object.key, len = object.key.len(), "ledger object key is not 64 hex characters");
                }
                match object_keys.get(&object.key) {
                    Some(value) if *value == object.value_blob => {
                        debug!(key = %object.key, "duplicate ledger object dropped");
                        continue;
                    }
                    Some(_) => {
                        warn!(key = %object.key, "ledger object returned twice with different values, keeping the first");
                        continue;
                    }
                    None => {
                        object_keys.insert(object.key.clone(), object.value_blob.clone());
                    }
                }
            }
            aggregate.push(item);
        }
        Ok(())
    }
}
