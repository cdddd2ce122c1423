use std::process::ExitCode;

use anyhow::{bail, Context};
use duet_crawl::{find_gaps, ledger_range, CrawlOptions, CrawlOutcome, Crawler};
use duet_diff::{compare_ledgers, compare_subset, compare_tuples, ReconciliationReport, ReportOptions};
use duet_load::{Corpus, LoadHarness, RequestTemplate};
use duet_protocol::{normalize, unwrap_result, EndpointKind, RequestBuilder};
use duet_stream::{StreamError, StreamReconciler};
use duet_transport::{Connector, Shutdown, Transport, WebSocketConnector, WebSocketTransport};
use duet_types::{AggregateResult, Item, LedgerRange};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::cli::*;
use crate::config::DuetConfig;
use crate::output;

struct RunContext {
    config: DuetConfig,
    format: OutputFormat,
    shutdown: Shutdown,
}

impl RunContext {
    fn connector(&self, target: Target) -> WebSocketConnector {
        let address = match target {
            Target::Candidate => self.config.candidate.clone(),
            Target::Reference => self.config.reference.clone(),
        };
        WebSocketConnector::new(address, self.config.websocket.clone())
    }

    async fn connect(&self, connector: &WebSocketConnector) -> anyhow::Result<WebSocketTransport> {
        let signal = self.shutdown.signal();
        tokio::select! {
            biased;
            _ = signal.triggered() => bail!("cancelled"),
            session = connector.connect() => {
                session.with_context(|| format!("connecting to {}", connector.describe()))
            }
        }
    }
}

pub async fn run_command(cli: Cli, shutdown: Shutdown) -> anyhow::Result<ExitCode> {
    let mut config = DuetConfig::load(cli.config.as_deref())?;
    if let Some(candidate) = cli.candidate {
        config.candidate = candidate;
    }
    if let Some(reference) = cli.reference {
        config.reference = reference;
    }
    let ctx = RunContext {
        config,
        format: cli.format,
        shutdown,
    };

    match cli.command {
        Command::Crawl(args) => cmd_crawl(&ctx, args).await,
        Command::Verify(args) => cmd_verify(&ctx, args).await,
        Command::VerifySubscribe(args) => cmd_verify_subscribe(&ctx, args).await,
        Command::Load(args) => cmd_load(&ctx, args).await,
        Command::Range(args) => cmd_range(&ctx, args).await,
        Command::Gaps(args) => cmd_gaps(&ctx, args).await,
    }
}

fn crawl_options(config: &DuetConfig, paging: &PagingArgs) -> CrawlOptions {
    let mut options = config.crawl.clone();
    if paging.limit.is_some() {
        options.page_limit = paging.limit;
    }
    if paging.max_pages.is_some() {
        options.max_pages = paging.max_pages;
    }
    if paging.max_items.is_some() {
        options.max_items = paging.max_items;
    }
    if let Some(retries) = paging.max_retries {
        options.max_retries = retries;
    }
    if paging.type_filter.is_some() {
        options.type_filter = paging.type_filter.clone();
    }
    options
}

/// Build the request, pinning endpoints that need a ledger to the newest
/// ledger `probe` holds when none was given.
async fn build_request(
    ctx: &RunContext,
    kind: EndpointKind,
    query: &QueryArgs,
    probe: &WebSocketConnector,
) -> anyhow::Result<RequestBuilder> {
    let mut params = query.to_params()?;
    let ledger_scoped = kind.descriptor().required.contains(&"ledger_index") || kind == EndpointKind::LedgerEntry;
    if ledger_scoped && !params.contains_key("ledger_index") {
        let range = probe_range(ctx, probe).await?;
        info!(endpoint = %kind, ledger = range.max, server = %probe.describe(), "pinning newest ledger");
        params.insert("ledger_index".into(), Value::from(range.max));
    }
    match kind {
        EndpointKind::Ledger => {
            params.entry("transactions").or_insert(Value::Bool(true));
            params.entry("expand").or_insert(Value::Bool(true));
        }
        EndpointKind::LedgerObjectScan => {
            params.entry("out_of_order").or_insert(Value::Bool(true));
        }
        _ => {}
    }
    Ok(RequestBuilder::new(kind).params(&Value::Object(params)))
}

async fn probe_range(ctx: &RunContext, connector: &WebSocketConnector) -> anyhow::Result<LedgerRange> {
    let mut session = ctx.connect(connector).await?;
    let range = ledger_range(&mut session).await;
    let _ = session.close().await;
    range?.with_context(|| format!("{} holds no ledgers", connector.describe()))
}

async fn crawl(
    ctx: &RunContext,
    connector: &WebSocketConnector,
    request: &RequestBuilder,
    options: CrawlOptions,
) -> anyhow::Result<CrawlOutcome> {
    let mut session = ctx.connect(connector).await?;
    let outcome = Crawler::new(&mut session, options)
        .with_shutdown(ctx.shutdown.signal())
        .run(request)
        .await;
    let _ = session.close().await;
    Ok(outcome)
}

/// Non-paginated query: the normalized payload objects.
async fn fetch(
    ctx: &RunContext,
    connector: &WebSocketConnector,
    request: &RequestBuilder,
    options: CrawlOptions,
) -> anyhow::Result<Vec<Value>> {
    let mut session = ctx.connect(connector).await?;
    let items = Crawler::new(&mut session, options)
        .with_shutdown(ctx.shutdown.signal())
        .fetch(request)
        .await;
    let _ = session.close().await;
    items.with_context(|| format!("{} on {}", request.descriptor().kind, connector.describe()))
}

async fn fetch_one(
    ctx: &RunContext,
    connector: &WebSocketConnector,
    request: &RequestBuilder,
    options: CrawlOptions,
) -> anyhow::Result<Value> {
    fetch(ctx, connector, request, options)
        .await?
        .into_iter()
        .next()
        .with_context(|| format!("{} returned an empty payload", connector.describe()))
}

/// One request, the unwrapped response as-is.
async fn raw_query(ctx: &RunContext, connector: &WebSocketConnector, request: &RequestBuilder) -> anyhow::Result<Value> {
    let wire = request.build(None, None)?;
    let mut session = ctx.connect(connector).await?;
    let response = session.request(&wire).await;
    let _ = session.close().await;
    let response = response.with_context(|| format!("querying {}", connector.describe()))?;
    if let Some(fault) = normalize(request.descriptor(), &response)?.error {
        bail!("{} reported {fault}", connector.describe());
    }
    Ok(unwrap_result(&response).clone())
}

/// Single-record payloads (`tx`, `ledger_entry`) decoded into one
/// representation, so the two servers' dialects compare like with like.
fn compare_records(
    kind: EndpointKind,
    source: &Value,
    target: &Value,
    options: &ReportOptions,
) -> anyhow::Result<ReconciliationReport> {
    let record = kind
        .descriptor()
        .record
        .with_context(|| format!("{kind} does not return records"))?;
    let decode = |side: &str, payload: &Value| -> anyhow::Result<AggregateResult> {
        let item = Item::from_record(record, payload).with_context(|| format!("decoding {side} {kind} payload"))?;
        Ok(AggregateResult::from_items([item]))
    };
    Ok(compare_tuples(&decode("candidate", source)?, &decode("reference", target)?, options))
}

fn verdict_code(report: &ReconciliationReport) -> ExitCode {
    if report.is_match() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn cmd_crawl(ctx: &RunContext, args: CrawlArgs) -> anyhow::Result<ExitCode> {
    let connector = ctx.connector(args.server);
    let request = build_request(ctx, args.endpoint, &args.query, &connector).await?;
    let options = crawl_options(&ctx.config, &args.paging);
    let target = connector.describe();

    if args.endpoint.descriptor().record.is_none() {
        let payload = fetch(ctx, &connector, &request, options).await?;
        output::document(ctx.format, &target, args.endpoint.as_str(), &payload)?;
        return Ok(ExitCode::SUCCESS);
    }

    let outcome = crawl(ctx, &connector, &request, options).await?;
    output::crawl(ctx.format, &target, args.endpoint.as_str(), &outcome, args.items)?;
    Ok(if outcome.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_verify(ctx: &RunContext, args: VerifyArgs) -> anyhow::Result<ExitCode> {
    let kind = args.endpoint;
    let candidate = ctx.connector(Target::Candidate);
    let reference = ctx.connector(Target::Reference);
    let single_record = !kind.descriptor().paginated && kind.descriptor().record.is_some();
    let mut query = args.query.clone();
    if single_record && kind != EndpointKind::Ledger {
        // Both dialects agree on the binary form.
        query.binary = true;
    }
    let request = build_request(ctx, kind, &query, &reference).await?;
    let options = crawl_options(&ctx.config, &args.paging);
    let mut report_options: ReportOptions = ctx.config.report.clone();
    if let Some(limit) = args.diagnostic_limit {
        report_options.diagnostic_limit = limit;
    }
    report_options.volatile_fields.extend(args.ignore.iter().cloned());

    let report = match kind {
        EndpointKind::LedgerClosedSubscription => {
            bail!("live subscriptions are reconciled with `duet verify-subscribe`")
        }
        EndpointKind::Ledger => {
            let (source, target) = tokio::try_join!(
                raw_query(ctx, &candidate, &request),
                raw_query(ctx, &reference, &request),
            )?;
            compare_ledgers(&source, &target, &report_options)?
        }
        kind if kind.descriptor().paginated => {
            let (source, target) = tokio::try_join!(
                crawl(ctx, &candidate, &request, options.clone()),
                crawl(ctx, &reference, &request, options),
            )?;
            for (side, outcome) in [("candidate", &source), ("reference", &target)] {
                if let Some(e) = &outcome.error {
                    warn!(side, items = outcome.result.len(), error = %e, "crawl incomplete");
                    bail!("{side} crawl stopped after {} items: {e}", outcome.result.len());
                }
            }
            info!(
                candidate = source.result.len(),
                reference = target.result.len(),
                "both crawls complete"
            );
            compare_tuples(&source.result, &target.result, &report_options)
        }
        kind if single_record => {
            let (source, target) = tokio::try_join!(
                fetch_one(ctx, &candidate, &request, options.clone()),
                fetch_one(ctx, &reference, &request, options),
            )?;
            compare_records(kind, &source, &target, &report_options)?
        }
        _ => {
            let (source, target) = tokio::try_join!(
                fetch_one(ctx, &candidate, &request, options.clone()),
                fetch_one(ctx, &reference, &request, options),
            )?;
            compare_subset(&source, &target, &report_options)
        }
    };

    output::report(ctx.format, kind.as_str(), &report, args.diff)?;
    Ok(verdict_code(&report))
}

async fn cmd_verify_subscribe(ctx: &RunContext, args: SubscribeArgs) -> anyhow::Result<ExitCode> {
    let books = args.book_values()?;
    let mut options = ctx.config.stream.clone();
    if !args.streams.is_empty() {
        options.streams = args.streams;
    }
    if !args.accounts.is_empty() {
        options.accounts = args.accounts;
    }
    if !books.is_empty() {
        options.books = books;
    }
    if args.max_batches.is_some() {
        options.max_batches = args.max_batches;
    }
    if let Some(ms) = args.batch_timeout_ms {
        options.batch_timeout_ms = ms;
    }

    let reconciler = StreamReconciler::new(
        ctx.connector(Target::Candidate),
        ctx.connector(Target::Reference),
        options,
    )
    .with_report_options(ctx.config.report.clone())
    .with_shutdown(ctx.shutdown.signal());

    let format = ctx.format;
    let mut matched = 0usize;
    let result = reconciler
        .run_with(|batch| {
            matched += 1;
            output::batch(format, batch);
        })
        .await;

    match result {
        Ok(summary) => {
            output::stream_summary(format, &summary)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(StreamError::Cancelled) => {
            info!(batches = matched, "stream reconciliation stopped");
            Ok(ExitCode::SUCCESS)
        }
        Err(StreamError::LiveDivergence { batch, ledger, report }) => {
            let title = match ledger {
                Some(ledger) => format!("ledger {ledger} (batch {batch})"),
                None => format!("batch {batch}"),
            };
            output::report(format, &title, &report, true)?;
            Ok(ExitCode::FAILURE)
        }
        Err(StreamError::AckMismatch(report)) => {
            output::report(format, "subscription acknowledgement", &report, false)?;
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

async fn cmd_load(ctx: &RunContext, args: LoadArgs) -> anyhow::Result<ExitCode> {
    let kind = args.endpoint;
    let connector = ctx.connector(args.server);
    let target = connector.describe();

    let mut options = ctx.config.load.clone();
    if let Some(workers) = args.workers {
        options.workers = workers;
    }
    if let Some(calls) = args.calls {
        options.calls_per_worker = calls;
    }
    if let Some(ms) = args.slow_ms {
        options.slow_threshold_ms = ms;
    }
    if args.seed.is_some() {
        options.seed = args.seed;
    }

    let mut query = args.query.clone();
    let sample_keys = kind == EndpointKind::LedgerEntry && args.corpus.is_none();
    if sample_keys && query.ledger.is_none() {
        query.ledger = Some(probe_range(ctx, &connector).await?.max.to_string());
    }

    let mut template = RequestTemplate::new(kind);
    for (key, value) in query.to_params()? {
        template = template.param(key, value);
    }
    if let Some(limit) = args.limit {
        template = template.limit(limit);
    }

    let required = kind.descriptor().required;
    let corpus = match &args.corpus {
        Some(path) => {
            let field = args
                .field
                .clone()
                .or_else(|| required.first().map(|f| f.to_string()))
                .with_context(|| format!("--field is required for {kind}"))?;
            Corpus::from_file(path, &field)
                .with_context(|| format!("loading corpus {}", path.display()))?
        }
        None if sample_keys => sample_object_keys(ctx, &connector, &query, args.sample_keys).await?,
        None if required.contains(&"ledger_index") => Corpus::ledgers(probe_range(ctx, &connector).await?),
        None if required.is_empty() => Corpus::new(vec![Value::Object(Map::new())]),
        None => bail!("--corpus is required for {kind}"),
    };

    let report = LoadHarness::new(connector, template, corpus, options)
        .with_shutdown(ctx.shutdown.signal())
        .run()
        .await?;
    output::load(ctx.format, &target, &report)?;
    Ok(if report.samples.is_empty() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Keys gathered by a bounded scan of the ledger `query` names.
async fn sample_object_keys(
    ctx: &RunContext,
    connector: &WebSocketConnector,
    query: &QueryArgs,
    keys: usize,
) -> anyhow::Result<Corpus> {
    let request = build_request(ctx, EndpointKind::LedgerObjectScan, query, connector).await?;
    let paging = PagingArgs {
        max_items: Some(keys),
        ..PagingArgs::default()
    };
    let outcome = crawl(ctx, connector, &request, crawl_options(&ctx.config, &paging)).await?;
    if let Some(e) = &outcome.error {
        if outcome.result.is_empty() {
            bail!("sampling object keys from {}: {e}", connector.describe());
        }
        warn!(keys = outcome.result.len(), error = %e, "key scan stopped early, sampling what was gathered");
    }
    info!(keys = outcome.result.len(), ledger = ?query.ledger, "object keys sampled");
    Ok(Corpus::object_keys(&outcome.result))
}

async fn cmd_range(ctx: &RunContext, args: RangeArgs) -> anyhow::Result<ExitCode> {
    let connector = ctx.connector(args.server);
    let mut session = ctx.connect(&connector).await?;
    let range = ledger_range(&mut session).await;
    let _ = session.close().await;
    output::range(ctx.format, &connector.describe(), range?)?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_gaps(ctx: &RunContext, args: GapsArgs) -> anyhow::Result<ExitCode> {
    let connector = ctx.connector(args.server);
    let range = match (args.min, args.max) {
        (Some(min), Some(max)) => LedgerRange::new(min, max)?,
        (min, max) => {
            let held = probe_range(ctx, &connector).await?;
            LedgerRange::new(min.unwrap_or(held.min), max.unwrap_or(held.max))?
        }
    };

    let mut session = ctx.connect(&connector).await?;
    let signal = ctx.shutdown.signal();
    let missing = tokio::select! {
        biased;
        _ = signal.triggered() => None,
        missing = find_gaps(&mut session, range) => Some(missing),
    };
    let _ = session.close().await;
    let Some(missing) = missing else {
        bail!("cancelled");
    };
    output::gaps(ctx.format, &connector.describe(), range, &missing?)?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RunContext {
        RunContext {
            config: DuetConfig::default(),
            format: OutputFormat::Text,
            shutdown: Shutdown::new(),
        }
    }

    #[test]
    fn flags_override_config_ceilings() {
        let mut config = DuetConfig::default();
        config.crawl.page_limit = Some(100);
        config.crawl.max_retries = 7;
        let paging = PagingArgs {
            limit: Some(25),
            max_items: Some(1000),
            ..PagingArgs::default()
        };
        let options = crawl_options(&config, &paging);
        assert_eq!(options.page_limit, Some(25));
        assert_eq!(options.max_items, Some(1000));
        assert_eq!(options.max_retries, 7);
        assert_eq!(options.max_pages, None);
    }

    #[test]
    fn connector_targets() {
        let ctx = ctx();
        assert_eq!(ctx.connector(Target::Candidate).describe(), "ws://127.0.0.1:8080");
        assert_eq!(ctx.connector(Target::Reference).describe(), "ws://127.0.0.1:6006");
    }

    #[tokio::test]
    async fn explicit_ledger_skips_range_lookup() {
        let ctx = ctx();
        let query = QueryArgs { ledger: Some("500".into()), ..QueryArgs::default() };
        let request = build_request(&ctx, EndpointKind::Ledger, &query, &ctx.connector(Target::Reference))
            .await
            .unwrap();
        let wire = request.build(None, None).unwrap();
        assert_eq!(wire, json!({"command": "ledger", "ledger_index": 500, "transactions": true, "expand": true}));
    }

    #[tokio::test]
    async fn object_scans_ask_for_out_of_order_pages() {
        let ctx = ctx();
        let query = QueryArgs { ledger: Some("500".into()), ..QueryArgs::default() };
        let request = build_request(&ctx, EndpointKind::LedgerObjectScan, &query, &ctx.connector(Target::Reference))
            .await
            .unwrap();
        let wire = request.build(None, Some(200)).unwrap();
        assert_eq!(wire["out_of_order"], json!(true));

        let ordered = QueryArgs { params: vec!["out_of_order=false".into()], ..query };
        let request = build_request(&ctx, EndpointKind::LedgerObjectScan, &ordered, &ctx.connector(Target::Reference))
            .await
            .unwrap();
        assert_eq!(request.build(None, None).unwrap()["out_of_order"], json!(false));
    }

    #[test]
    fn transaction_dialects_reconcile() {
        let candidate = json!({
            "transaction": "120000228000000024000000",
            "metadata": "201C00000000F8E5110061",
            "ledger_sequence": 73000100,
            "validated": true,
        });
        let reference = json!({
            "tx": "120000228000000024000000",
            "meta": "201C00000000F8E5110061",
            "ledger_index": 73000100,
            "hash": "ABCD",
            "validated": true,
        });
        let options = ReportOptions::default();
        assert!(!compare_subset(&candidate, &reference, &options).is_match());

        let report = compare_records(EndpointKind::TransactionByHash, &candidate, &reference, &options).unwrap();
        assert!(report.is_match(), "{:?}", report.mismatches);
        assert_eq!(report.matched_count, 1);

        let mut altered = reference.clone();
        altered["meta"] = json!("201C00000001F8E5110061");
        let report = compare_records(EndpointKind::TransactionByHash, &candidate, &altered, &options).unwrap();
        assert!(!report.is_match());
        assert_eq!((report.left_only_count, report.right_only_count), (1, 1));
    }

    #[test]
    fn ledger_entry_dialects_reconcile() {
        let key = "C".repeat(64);
        let candidate = json!({"index": key, "node_binary": "1100612200000000", "ledger_index": 90});
        let reference = json!({"index": key, "node_binary": "1100612200000000", "ledger_index": 90, "validated": true});
        let report = compare_records(EndpointKind::LedgerEntry, &candidate, &reference, &ReportOptions::default()).unwrap();
        assert!(report.is_match(), "{:?}", report.mismatches);
    }

    #[test]
    fn undecodable_record_is_an_error() {
        let err = compare_records(
            EndpointKind::TransactionByHash,
            &json!({"error": "txnNotFound"}),
            &json!({"tx": "AB", "meta": "CD", "ledger_index": 1}),
            &ReportOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("candidate"), "{err}");
        assert!(compare_records(EndpointKind::ServerInfo, &json!({}), &json!({}), &ReportOptions::default()).is_err());
    }

    #[tokio::test]
    async fn cancelled_connect_returns_promptly() {
        let ctx = ctx();
        ctx.shutdown.trigger();
        match ctx.connect(&ctx.connector(Target::Candidate)).await {
            Err(e) => assert_eq!(e.to_string(), "cancelled"),
            Ok(_) => panic!("connected after cancellation"),
        }
    }
}
