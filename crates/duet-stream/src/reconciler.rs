use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use duet_diff::{compare_documents, compare_structural, IdentityKey, ReconciliationReport, ReportOptions, Side};
use duet_protocol::{normalize, unwrap_result, EndpointKind};
use duet_transport::{Connector, Shutdown, ShutdownSignal, Transport, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::batch::{EventClass, EventFilter, LiveBatch};
use crate::error::{StreamError, StreamResult};
use crate::options::StreamOptions;

/// Sealed batches a receive loop may run ahead by.
const PENDING_BATCHES: usize = 4;

/// Widest ledger gap closed by dropping batches from the side behind.
const MAX_REALIGN_LEDGERS: u32 = 8;

type BatchFeed = mpsc::Receiver<Result<LiveBatch, TransportError>>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Matched batch pairs.
    pub batches: usize,
    /// Events seen on the candidate side across matched batches.
    pub events_compared: usize,
}

/// One matched batch pair, handed to the caller as it is reconciled.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchOutcome {
    pub index: usize,
    pub ledger: Option<u32>,
    pub source_events: usize,
    pub target_events: usize,
    pub report: ReconciliationReport,
}

/// Runs a candidate and a reference subscription side by side.
pub struct StreamReconciler<C: Connector> {
    candidate: C,
    reference: C,
    options: StreamOptions,
    report: ReportOptions,
    shutdown: ShutdownSignal,
}

impl<C: Connector> StreamReconciler<C> {
    pub fn new(candidate: C, reference: C, options: StreamOptions) -> Self {
        Self {
            candidate,
            reference,
            options,
            report: ReportOptions::default(),
            shutdown: ShutdownSignal::never(),
        }
    }

    pub fn with_report_options(mut self, report: ReportOptions) -> Self {
        self.report = report;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub async fn run(&self) -> StreamResult<StreamSummary> {
        self.run_with(|_| {}).await
    }

    /// Run until `max_batches` pairs matched, a batch diverges, a side fails,
    /// or the run is cancelled. `on_batch` sees every matched pair.
    pub async fn run_with<F>(&self, mut on_batch: F) -> StreamResult<StreamSummary>
    where
        F: FnMut(&BatchOutcome),
    {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        info!(
            %run_id,
            candidate = %self.candidate.describe(),
            reference = %self.reference.describe(),
            "subscribing"
        );

        let (mut source, mut target) = self
            .guard(async {
                tokio::try_join!(
                    async { self.candidate.connect().await.map_err(StreamError::transport(Side::Source)) },
                    async { self.reference.connect().await.map_err(StreamError::transport(Side::Target)) },
                )
            })
            .await?;

        if let Err(e) = self.handshake(&mut source, &mut target).await {
            let _ = source.close().await;
            let _ = target.close().await;
            return Err(e);
        }

        self.steady(run_id, started_at, source, target, &mut on_batch).await
    }

    async fn guard<T>(&self, work: impl Future<Output = StreamResult<T>>) -> StreamResult<T> {
        tokio::select! {
            biased;
            _ = self.shutdown.triggered() => Err(StreamError::Cancelled),
            result = work => result,
        }
    }

    /// SUBSCRIBE and AWAIT_ACK, then align both sides on their first boundary.
    async fn handshake(&self, source: &mut C::Session, target: &mut C::Session) -> StreamResult<()> {
        let request = self.options.subscription().build(None, None)?;
        self.guard(async {
            tokio::try_join!(
                async { source.send(&request).await.map_err(StreamError::transport(Side::Source)) },
                async { target.send(&request).await.map_err(StreamError::transport(Side::Target)) },
            )
        })
        .await?;

        let ack_ms = self.options.ack_timeout_ms;
        let (source_ack, target_ack) = self
            .guard(async {
                tokio::try_join!(
                    await_ack(Side::Source, &mut *source, ack_ms),
                    await_ack(Side::Target, &mut *target, ack_ms),
                )
            })
            .await?;
        let ack_options = ReportOptions {
            volatile_fields: [self.report.volatile_fields.clone(), self.options.ack_volatile_fields.clone()].concat(),
            ..self.report.clone()
        };
        let report = compare_documents(&source_ack, &target_ack, &ack_options);
        if !report.is_match() {
            warn!(summary = %report.summary(), "subscription acknowledgements differ");
            return Err(StreamError::AckMismatch(Box::new(report)));
        }
        info!("subscription acknowledged by both sides");

        let filter = EventFilter::new(&self.options);
        let wait_ms = self.options.batch_timeout_ms;
        let (source_skipped, target_skipped) = self
            .guard(async {
                tokio::try_join!(
                    drain_to_boundary(Side::Source, &mut *source, &filter, wait_ms),
                    drain_to_boundary(Side::Target, &mut *target, &filter, wait_ms),
                )
            })
            .await?;
        debug!(source_skipped, target_skipped, "aligned on first boundary");
        Ok(())
    }

    /// STEADY: one receive loop per side, batches compared pairwise here.
    async fn steady<F>(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        source: C::Session,
        target: C::Session,
        on_batch: &mut F,
    ) -> StreamResult<StreamSummary>
    where
        F: FnMut(&BatchOutcome),
    {
        let stop = Shutdown::new();
        let filter = EventFilter::new(&self.options);
        let (source_tx, mut source_rx) = mpsc::channel(PENDING_BATCHES);
        let (target_tx, mut target_rx) = mpsc::channel(PENDING_BATCHES);
        let pumps = [
            tokio::spawn(pump(source, filter.clone(), source_tx, stop.signal())),
            tokio::spawn(pump(target, filter, target_tx, stop.signal())),
        ];

        let result = self.compare_batches(&mut source_rx, &mut target_rx, on_batch).await;

        drop(source_rx);
        drop(target_rx);
        stop.trigger();
        for pump in pumps {
            let _ = pump.await;
        }

        let (batches, events_compared) = result?;
        info!(%run_id, batches, events_compared, "stream reconciliation finished");
        Ok(StreamSummary {
            run_id,
            started_at,
            batches,
            events_compared,
        })
    }

    async fn compare_batches<F>(
        &self,
        source_rx: &mut BatchFeed,
        target_rx: &mut BatchFeed,
        on_batch: &mut F,
    ) -> StreamResult<(usize, usize)>
    where
        F: FnMut(&BatchOutcome),
    {
        let key = IdentityKey::pointer(self.options.identity_pointer.clone());
        let options = ReportOptions {
            volatile_fields: [self.report.volatile_fields.clone(), self.options.event_volatile_fields.clone()].concat(),
            ..self.report.clone()
        };
        let wait_ms = self.options.batch_timeout_ms;
        let mut batches = 0usize;
        let mut events = 0usize;

        while !self.options.max_batches.is_some_and(|max| batches >= max) {
            let deadline = Instant::now() + Duration::from_millis(wait_ms);
            let (mut left, mut right) = self
                .guard(async {
                    tokio::try_join!(
                        next_batch(Side::Source, &mut *source_rx, deadline, wait_ms),
                        next_batch(Side::Target, &mut *target_rx, deadline, wait_ms),
                    )
                })
                .await?;
            let index = batches + 1;

            // One side usually starts a ledger or two ahead; drop batches from
            // the side behind until both close the same ledger.
            while let (Some(a), Some(b)) = (left.ledger_index(), right.ledger_index()) {
                if a == b {
                    break;
                }
                let skew = StreamError::BoundarySkew {
                    source_ledger: a,
                    target_ledger: b,
                };
                if a.abs_diff(b) > MAX_REALIGN_LEDGERS {
                    return Err(skew);
                }
                let (side, feed, dropped) = if a < b {
                    (Side::Source, &mut *source_rx, &mut left)
                } else {
                    (Side::Target, &mut *target_rx, &mut right)
                };
                debug!(%side, ledger = a.min(b), ahead = a.max(b), "dropping batch behind the other side");
                *dropped = match self.guard(next_batch(side, feed, deadline, wait_ms)).await {
                    Ok(batch) => batch,
                    Err(StreamError::BoundaryTimeout { .. }) => return Err(skew),
                    Err(e) => return Err(e),
                };
            }
            let ledger = left.ledger_index().or(right.ledger_index());

            let report = compare_structural(&left.events, &right.events, &key, &options);
            if !report.is_match() {
                warn!(batch = index, ?ledger, summary = %report.summary(), "live divergence");
                return Err(StreamError::LiveDivergence {
                    batch: index,
                    ledger,
                    report: Box::new(report),
                });
            }

            info!(batch = index, ?ledger, events = left.len(), "batch matched");
            batches = index;
            events += left.len();
            on_batch(&BatchOutcome {
                index,
                ledger,
                source_events: left.len(),
                target_events: right.len(),
                report,
            });
        }
        Ok((batches, events))
    }
}

fn is_response(message: &Value) -> bool {
    message.get("type").and_then(Value::as_str) == Some("response")
        || message.get("result").is_some()
        || message.get("error").is_some()
}

async fn await_ack<T: Transport + ?Sized>(side: Side, session: &mut T, limit_ms: u64) -> StreamResult<Value> {
    let descriptor = EndpointKind::LedgerClosedSubscription.descriptor();
    let deadline = Instant::now() + Duration::from_millis(limit_ms);
    loop {
        let message = timeout_at(deadline, session.receive())
            .await
            .map_err(|_| StreamError::AckTimeout { side })?
            .map_err(StreamError::transport(side))?;
        if !is_response(&message) {
            debug!(%side, "skipping event ahead of acknowledgement");
            continue;
        }
        if let Some(fault) = normalize(descriptor, &message)?.error {
            return Err(StreamError::AckRejected { side, fault });
        }
        return Ok(unwrap_result(&message).clone());
    }
}

/// Discard the partial ledger in progress when the subscription started.
async fn drain_to_boundary<T: Transport + ?Sized>(
    side: Side,
    session: &mut T,
    filter: &EventFilter,
    wait_ms: u64,
) -> StreamResult<usize> {
    let deadline = Instant::now() + Duration::from_millis(wait_ms);
    let mut skipped = 0;
    loop {
        let message = timeout_at(deadline, session.receive())
            .await
            .map_err(|_| StreamError::BoundaryTimeout { side, waited_ms: wait_ms })?
            .map_err(StreamError::transport(side))?;
        match filter.classify(&message) {
            EventClass::Boundary => return Ok(skipped),
            EventClass::Item => skipped += 1,
            EventClass::Ignored => {}
        }
    }
}

async fn next_batch(side: Side, feed: &mut BatchFeed, deadline: Instant, waited_ms: u64) -> StreamResult<LiveBatch> {
    match timeout_at(deadline, feed.recv()).await {
        Err(_) => Err(StreamError::BoundaryTimeout { side, waited_ms }),
        Ok(None) => Err(StreamError::Transport {
            side,
            source: TransportError::ConnectionClosed,
        }),
        Ok(Some(Err(source))) => Err(StreamError::Transport { side, source }),
        Ok(Some(Ok(batch))) => Ok(batch),
    }
}

/// Receive loop for one side. A failure discards the batch in progress.
async fn pump<T: Transport>(
    mut session: T,
    filter: EventFilter,
    feed: mpsc::Sender<Result<LiveBatch, TransportError>>,
    stop: ShutdownSignal,
) {
    let mut batch = LiveBatch::default();
    loop {
        let message = tokio::select! {
            biased;
            _ = stop.triggered() => break,
            message = session.receive() => message,
        };
        match message {
            Err(e) => {
                let _ = feed.send(Err(e)).await;
                break;
            }
            Ok(event) => match filter.classify(&event) {
                EventClass::Item => batch.push(event),
                EventClass::Boundary => {
                    if feed.send(Ok(batch.seal(event))).await.is_err() {
                        break;
                    }
                }
                EventClass::Ignored => {}
            },
        }
    }
    let _ = session.close().await;
}
