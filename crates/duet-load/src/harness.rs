use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use duet_protocol::{normalize, EndpointDescriptor};
use duet_transport::{Connector, ShutdownSignal, Transport, TransportError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::corpus::{Corpus, RequestTemplate};
use crate::error::{LoadError, LoadResult};
use crate::options::LoadOptions;
use crate::report::{CallFailure, CallSample, LoadReport};

/// Drives concurrent sampled load against one server.
pub struct LoadHarness<C: Connector> {
    connector: Arc<C>,
    template: RequestTemplate,
    corpus: Corpus,
    options: LoadOptions,
    shutdown: ShutdownSignal,
}

impl<C: Connector + 'static> LoadHarness<C> {
    pub fn new(connector: C, template: RequestTemplate, corpus: Corpus, options: LoadOptions) -> Self {
        Self {
            connector: Arc::new(connector),
            template,
            corpus,
            options,
            shutdown: ShutdownSignal::never(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Run every worker to completion. Individual call failures are recorded
    /// in the report; only a run where no worker could connect, or a
    /// cancelled run, is an error.
    pub async fn run(&self) -> LoadResult<LoadReport> {
        self.options.validate()?;
        if self.corpus.is_empty() {
            return Err(LoadError::EmptyCorpus);
        }
        let requests = Arc::new(Corpus::new(self.template.render(&self.corpus)?));
        let mut report = LoadReport::new(
            self.template.kind(),
            self.options.workers,
            self.options.calls_per_worker,
            self.options.slow_threshold(),
        );
        info!(
            run_id = %report.run_id,
            target = %self.connector.describe(),
            endpoint = %self.template.kind(),
            workers = self.options.workers,
            calls_per_worker = self.options.calls_per_worker,
            corpus = self.corpus.len(),
            "load run starting"
        );

        let started = Instant::now();
        let handles: Vec<_> = (0..self.options.workers)
            .map(|index| {
                let worker = Worker {
                    index,
                    connector: Arc::clone(&self.connector),
                    descriptor: self.template.kind().descriptor(),
                    requests: Arc::clone(&requests),
                    calls: self.options.calls_per_worker,
                    slow_threshold: self.options.slow_threshold(),
                    rng: worker_rng(self.options.seed, index),
                    shutdown: self.shutdown.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        let mut first_connect_error = None;
        let mut connected = 0usize;
        let mut cancelled = false;
        for (index, handle) in handles.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(worker = index, error = %e, "load worker did not finish");
                    continue;
                }
            };
            cancelled |= outcome.cancelled;
            match outcome.connect_error {
                Some(e) => {
                    first_connect_error.get_or_insert(e);
                }
                None => connected += 1,
            }
            report.samples.extend(outcome.samples);
            report.failures.extend(outcome.failures);
        }
        report.elapsed = started.elapsed();

        if cancelled || self.shutdown.is_triggered() {
            return Err(LoadError::Cancelled);
        }
        if connected == 0 {
            if let Some(source) = first_connect_error {
                return Err(LoadError::Connect {
                    target: self.connector.describe(),
                    source,
                });
            }
        }

        info!(run_id = %report.run_id, summary = %report.summary(), "load run finished");
        Ok(report)
    }
}

fn worker_rng(seed: Option<u64>, worker: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker as u64)),
        None => StdRng::from_entropy(),
    }
}

#[derive(Debug, Default)]
struct WorkerOutcome {
    samples: Vec<CallSample>,
    failures: Vec<CallFailure>,
    connect_error: Option<TransportError>,
    cancelled: bool,
}

impl WorkerOutcome {
    fn fail(&mut self, worker: usize, call: usize, reason: impl Into<String>) {
        self.failures.push(CallFailure {
            worker,
            call,
            reason: reason.into(),
        });
    }

    fn fail_rest(&mut self, worker: usize, calls: std::ops::Range<usize>, reason: &str) {
        for call in calls {
            self.fail(worker, call, reason);
        }
    }
}

struct Worker<C: Connector> {
    index: usize,
    connector: Arc<C>,
    descriptor: &'static EndpointDescriptor,
    requests: Arc<Corpus>,
    calls: usize,
    slow_threshold: Duration,
    rng: StdRng,
    shutdown: ShutdownSignal,
}

impl<C: Connector> Worker<C> {
    /// `None` when the run was cancelled first.
    async fn guarded<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.shutdown.triggered() => None,
            output = work => Some(output),
        }
    }

    async fn run(mut self) -> WorkerOutcome {
        let mut outcome = WorkerOutcome::default();
        let worker = self.index;

        let mut session = match self.guarded(self.connector.connect()).await {
            None => {
                outcome.cancelled = true;
                return outcome;
            }
            Some(Ok(session)) => session,
            Some(Err(e)) => {
                warn!(worker, error = %e, "load worker could not connect");
                outcome.fail_rest(worker, 0..self.calls, "not connected");
                outcome.connect_error = Some(e);
                return outcome;
            }
        };

        let requests = Arc::clone(&self.requests);
        for call in 0..self.calls {
            let Some(request) = requests.sample(&mut self.rng) else {
                break;
            };
            let began = Instant::now();
            let Some(result) = self.guarded(session.request(request)).await else {
                outcome.cancelled = true;
                break;
            };
            let latency = began.elapsed();

            match result {
                Ok(response) => match normalize(self.descriptor, &response) {
                    Ok(envelope) => match envelope.error {
                        None => {
                            let slow = latency > self.slow_threshold;
                            if slow {
                                warn!(worker, call, latency_ms = latency.as_millis() as u64, "slow call");
                            }
                            outcome.samples.push(CallSample {
                                worker,
                                call,
                                latency,
                                slow,
                            });
                        }
                        Some(fault) => {
                            debug!(worker, call, %fault, "server rejected call");
                            outcome.fail(worker, call, format!("server error: {fault}"));
                        }
                    },
                    Err(e) => outcome.fail(worker, call, e.to_string()),
                },
                Err(e) => {
                    warn!(worker, call, error = %e, "call failed, reconnecting");
                    outcome.fail(worker, call, e.to_string());
                    let _ = session.close().await;
                    match self.guarded(self.connector.connect()).await {
                        None => {
                            outcome.cancelled = true;
                            return outcome;
                        }
                        Some(Ok(fresh)) => session = fresh,
                        Some(Err(e)) => {
                            warn!(worker, error = %e, remaining = self.calls - call - 1, "reconnect failed, abandoning worker");
                            outcome.fail_rest(worker, call + 1..self.calls, "reconnect failed");
                            return outcome;
                        }
                    }
                }
            }
        }

        let _ = session.close().await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_protocol::EndpointKind;
    use duet_transport::{MemoryConnector, MemoryTransport, RequestLog, Shutdown};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn hashes(n: usize) -> Corpus {
        Corpus::new((0..n).map(|i| json!({"transaction": format!("{i:064X}")})).collect())
    }

    fn tx_template() -> RequestTemplate {
        RequestTemplate::new(EndpointKind::TransactionByHash)
    }

    fn echo(req: &Value) -> Value {
        json!({"result": {"hash": req["transaction"], "validated": true}})
    }

    fn fixed_latency(ms: u64) -> MemoryConnector {
        MemoryConnector::new("fixed", move || {
            Ok(MemoryTransport::responder(echo).with_latency(Duration::from_millis(ms)))
        })
    }

    async fn throughput_run(latency_ms: u64) -> LoadReport {
        LoadHarness::new(
            fixed_latency(latency_ms),
            tx_template(),
            hashes(50),
            LoadOptions::new(4, 100).seed(1),
        )
        .run()
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn throughput_matches_fixed_latency_below_threshold() {
        let report = throughput_run(10).await;
        assert_eq!(report.samples.len(), 400);
        assert!(report.failures.is_empty());
        let expected = 400.0 / (100.0 * 0.010);
        assert!((report.throughput() - expected).abs() / expected < 0.02, "{}", report.throughput());
        assert_eq!(report.slow_calls(), 0);
        let stats = report.stats().unwrap();
        assert_eq!(stats.p50, Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn every_call_slow_above_threshold() {
        let report = throughput_run(150).await;
        let expected = 400.0 / (100.0 * 0.150);
        assert!((report.throughput() - expected).abs() / expected < 0.02, "{}", report.throughput());
        assert_eq!(report.slow_calls(), 400);
    }

    #[tokio::test]
    async fn same_seed_same_request_sequence() {
        let logged = |seed| async move {
            let log = RequestLog::new();
            let sink = log.clone();
            let connector = MemoryConnector::new("logged", move || {
                Ok(MemoryTransport::responder(echo).with_log(sink.clone()))
            });
            LoadHarness::new(connector, tx_template(), hashes(100), LoadOptions::new(1, 25).seed(seed))
                .run()
                .await
                .unwrap();
            log.snapshot()
        };
        let a = logged(9).await;
        assert_eq!(a.len(), 25);
        assert_eq!(a, logged(9).await);
        assert_ne!(a, logged(10).await);
    }

    #[tokio::test]
    async fn ledger_entries_from_keys_only_corpus() {
        let keys: Vec<String> = (0..8).map(|i| format!("{i:064X}")).collect();
        let corpus = Corpus::from_lines(&keys.join("\n"), "index").unwrap();
        let log = RequestLog::new();
        let sink = log.clone();
        let connector = MemoryConnector::new("objects", move || {
            Ok(MemoryTransport::responder(|req| {
                json!({"result": {"index": req["index"], "node_binary": "1100612200000000", "ledger_index": 40}})
            })
            .with_log(sink.clone()))
        });
        let template = RequestTemplate::new(EndpointKind::LedgerEntry).param("ledger_index", 40);
        let report = LoadHarness::new(connector, template, corpus, LoadOptions::new(2, 15).seed(5))
            .run()
            .await
            .unwrap();
        assert_eq!(report.samples.len(), 30);
        assert!(report.failures.is_empty());
        let sent = log.snapshot();
        assert_eq!(sent.len(), 30);
        for request in sent {
            assert_eq!(request["command"], "ledger_entry");
            assert_eq!(request["ledger_index"], 40);
            assert!(keys.iter().any(|k| request["index"] == k.as_str()), "{request}");
        }
    }

    #[tokio::test]
    async fn failed_call_is_excluded_and_worker_reconnects() {
        let sessions = Arc::new(AtomicUsize::new(0));
        let opened = Arc::clone(&sessions);
        let connector = MemoryConnector::new("flaky", move || {
            let first = opened.fetch_add(1, Ordering::SeqCst) == 0;
            let mut calls = 0;
            Ok(MemoryTransport::new(move |req| {
                calls += 1;
                if first && calls == 3 {
                    return Err(TransportError::ConnectionClosed);
                }
                Ok(vec![echo(req)])
            }))
        });
        let report = LoadHarness::new(connector, tx_template(), hashes(5), LoadOptions::new(1, 10).seed(3))
            .run()
            .await
            .unwrap();
        assert_eq!(report.samples.len(), 9);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].call, 2);
        assert_eq!(sessions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_reconnect_abandons_remaining_calls() {
        let sessions = Arc::new(AtomicUsize::new(0));
        let connector = MemoryConnector::new("dying", move || {
            if sessions.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(TransportError::Unreachable {
                    address: "memory://dying".into(),
                    reason: "refused".into(),
                });
            }
            let mut calls = 0;
            Ok(MemoryTransport::new(move |req| {
                calls += 1;
                if calls == 2 {
                    return Err(TransportError::ConnectionClosed);
                }
                Ok(vec![echo(req)])
            }))
        });
        let report = LoadHarness::new(connector, tx_template(), hashes(5), LoadOptions::new(1, 5))
            .run()
            .await
            .unwrap();
        assert_eq!(report.samples.len(), 1);
        assert_eq!(report.failures.len(), 4);
        assert_eq!(report.failures[3].reason, "reconnect failed");
    }

    #[tokio::test]
    async fn server_errors_are_failures_not_samples() {
        let connector = MemoryConnector::new("strict", || {
            Ok(MemoryTransport::responder(|_| json!({"result": {"error": "txnNotFound", "status": "error"}})))
        });
        let report = LoadHarness::new(connector, tx_template(), hashes(3), LoadOptions::new(2, 3))
            .run()
            .await
            .unwrap();
        assert!(report.samples.is_empty());
        assert_eq!(report.failures.len(), 6);
        assert!(report.failures[0].reason.contains("txnNotFound"));
        assert_eq!(report.throughput(), 0.0);
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let connector = MemoryConnector::new("down", || Err(TransportError::ConnectionClosed));
        let err = LoadHarness::new(connector, tx_template(), hashes(3), LoadOptions::new(3, 3))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Connect { .. }), "{err}");
    }

    #[tokio::test]
    async fn empty_corpus_and_bad_options_rejected() {
        let harness = LoadHarness::new(fixed_latency(0), tx_template(), Corpus::default(), LoadOptions::new(1, 1));
        assert!(matches!(harness.run().await, Err(LoadError::EmptyCorpus)));
        let harness = LoadHarness::new(fixed_latency(0), tx_template(), hashes(1), LoadOptions::new(0, 1));
        assert!(matches!(harness.run().await, Err(LoadError::InvalidOptions(_))));
    }

    #[tokio::test]
    async fn cancellation_stops_the_run() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let err = LoadHarness::new(fixed_latency(5), tx_template(), hashes(3), LoadOptions::new(2, 10))
            .with_shutdown(shutdown.signal())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Cancelled));
    }
}
