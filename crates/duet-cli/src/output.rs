//! Human and JSON renderings of run results. Everything goes to stdout;
//! logs go to stderr.

use colored::Colorize;
use duet_crawl::CrawlOutcome;
use duet_diff::{detail_line, value_diff, ReconciliationReport};
use duet_load::LoadReport;
use duet_stream::{BatchOutcome, StreamSummary};
use duet_types::LedgerRange;
use serde_json::{json, Value};

use crate::cli::OutputFormat;

fn emit(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn coverage(range: Option<LedgerRange>) -> String {
    range.map(|r| r.to_string()).unwrap_or_else(|| "-".into())
}

pub fn crawl(format: OutputFormat, target: &str, endpoint: &str, outcome: &CrawlOutcome, items: bool) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let mut value = json!({
            "server": target,
            "endpoint": endpoint,
            "pages": outcome.pages_fetched,
            "requests": outcome.requests_sent,
            "items": outcome.result.len(),
            "coverage": outcome.result.coverage(),
            "error": outcome.error.as_ref().map(|e| e.to_string()),
        });
        if items {
            value["records"] = serde_json::to_value(outcome.result.items())?;
        }
        return emit(&value);
    }

    println!(
        "{} on {}: {} items in {} pages (ledgers {})",
        endpoint.bold(),
        target,
        outcome.result.len().to_string().bold(),
        outcome.pages_fetched,
        coverage(outcome.result.coverage()),
    );
    if let Some(e) = &outcome.error {
        println!("  {} stopped early: {e}", "✗".red().bold());
    }
    if items {
        for item in outcome.result.items() {
            println!("  {} {}", item.kind().to_string().dimmed(), item.identity());
        }
    }
    Ok(())
}

pub fn document(format: OutputFormat, target: &str, endpoint: &str, payload: &[Value]) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return emit(&json!({"server": target, "endpoint": endpoint, "payload": payload}));
    }
    println!("{} on {}:", endpoint.bold(), target);
    for value in payload {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

pub fn report(format: OutputFormat, title: &str, report: &ReconciliationReport, diff: bool) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return emit(&json!({"endpoint": title, "report": report}));
    }
    let verdict = if report.is_match() {
        "✓ match".green().bold()
    } else {
        "✗ mismatch".red().bold()
    };
    println!("{}: {verdict} ({})", title.bold(), report.summary());
    for detail in &report.mismatches {
        println!("  {}", detail_line(detail));
        if let (true, Some(source), Some(target)) = (diff, &detail.source_value, &detail.target_value) {
            for line in value_diff(source, target).lines() {
                println!("      {line}");
            }
        }
    }
    if report.suppressed > 0 {
        println!("  ... {} more findings not listed", report.suppressed);
    }
    Ok(())
}

pub fn batch(format: OutputFormat, outcome: &BatchOutcome) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "batch": outcome.index,
                "ledger": outcome.ledger,
                "source_events": outcome.source_events,
                "target_events": outcome.target_events,
                "verdict": outcome.report.verdict,
            })
        ),
        OutputFormat::Text => println!(
            "  {} ledger {} ({} / {} events)",
            "✓".green(),
            outcome.ledger.map(|l| l.to_string()).unwrap_or_else(|| "?".into()).yellow(),
            outcome.source_events,
            outcome.target_events,
        ),
    }
}

pub fn stream_summary(format: OutputFormat, summary: &StreamSummary) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return emit(&serde_json::to_value(summary)?);
    }
    println!(
        "{} {} ledgers reconciled, {} events compared (run {})",
        "✓".green().bold(),
        summary.batches,
        summary.events_compared,
        summary.run_id.to_string().dimmed(),
    );
    Ok(())
}

pub fn load(format: OutputFormat, target: &str, report: &LoadReport) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return emit(&json!({
            "server": target,
            "run_id": report.run_id,
            "endpoint": report.endpoint,
            "attempted": report.attempted(),
            "failed": report.failures.len(),
            "elapsed_ms": report.elapsed.as_millis() as u64,
            "throughput": report.throughput(),
            "slow_calls": report.slow_calls(),
            "stats": report.stats(),
        }));
    }
    println!("{} on {}: {}", report.endpoint.bold(), target, report.summary());
    if let Some(stats) = report.stats() {
        println!(
            "  latency min {:?}  mean {:?}  p50 {:?}  p90 {:?}  p99 {:?}  max {:?}",
            stats.min, stats.mean, stats.p50, stats.p90, stats.p99, stats.max
        );
    }
    for failure in report.failures.iter().take(10) {
        println!("  {} worker {} call {}: {}", "✗".red(), failure.worker, failure.call, failure.reason);
    }
    if report.failures.len() > 10 {
        println!("  ... {} more failures", report.failures.len() - 10);
    }
    Ok(())
}

pub fn range(format: OutputFormat, target: &str, range: Option<LedgerRange>) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return emit(&json!({"server": target, "range": range}));
    }
    match range {
        Some(r) => println!("{target}: ledgers {} ({} ledgers)", r.to_string().bold(), r.ledger_count()),
        None => println!("{target}: {}", "empty".yellow()),
    }
    Ok(())
}

pub fn gaps(format: OutputFormat, target: &str, range: LedgerRange, missing: &[u32]) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return emit(&json!({"server": target, "range": range, "missing": missing}));
    }
    if missing.is_empty() {
        println!("{} {target}: no gaps in {range}", "✓".green().bold());
    } else {
        println!("{} {target}: {} ledgers missing in {range}", "✗".red().bold(), missing.len());
        for seq in missing {
            println!("  {seq}");
        }
    }
    Ok(())
}
