use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use duet_protocol::EndpointKind;
use duet_transport::ServerAddress;
use serde_json::{Map, Value};

#[derive(Parser, Debug)]
#[command(
    name = "duet",
    about = "Differential verification and load harness for paired ledger query servers",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Candidate server (`host:port` or `ws[s]://host:port`)
    #[arg(long, global = true)]
    pub candidate: Option<ServerAddress>,

    /// Reference server (`host:port` or `ws[s]://host:port`)
    #[arg(long, global = true)]
    pub reference: Option<ServerAddress>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Target {
    Candidate,
    Reference,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk one endpoint on one server and summarize the result
    Crawl(CrawlArgs),
    /// Query the same endpoint on both servers and reconcile the answers
    Verify(VerifyArgs),
    /// Reconcile live subscriptions on both servers ledger by ledger
    VerifySubscribe(SubscribeArgs),
    /// Drive concurrent sampled load against one endpoint
    Load(LoadArgs),
    /// Show the ledger range a server holds
    Range(RangeArgs),
    /// List ledgers a server is missing inside a range
    Gaps(GapsArgs),
}

/// Request parameters shared by every query command.
#[derive(Args, Debug, Default, Clone)]
pub struct QueryArgs {
    #[arg(long)]
    pub account: Option<String>,
    /// Transaction hash
    #[arg(long)]
    pub hash: Option<String>,
    /// Ledger sequence, or `validated`/`current`
    #[arg(long)]
    pub ledger: Option<String>,
    /// Book side paid by the taker, as JSON (`{"currency":"XRP"}`)
    #[arg(long)]
    pub taker_pays: Option<String>,
    /// Book side received by the taker, as JSON
    #[arg(long)]
    pub taker_gets: Option<String>,
    #[arg(long)]
    pub binary: bool,
    /// Extra request parameter `key=value`; the value is parsed as JSON when it can be
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
}

impl QueryArgs {
    pub fn to_params(&self) -> anyhow::Result<Map<String, Value>> {
        let mut params = Map::new();
        if let Some(account) = &self.account {
            params.insert("account".into(), Value::String(account.clone()));
        }
        if let Some(hash) = &self.hash {
            params.insert("transaction".into(), Value::String(hash.clone()));
        }
        if let Some(ledger) = &self.ledger {
            params.insert("ledger_index".into(), ledger_value(ledger));
        }
        for (key, raw) in [("taker_pays", &self.taker_pays), ("taker_gets", &self.taker_gets)] {
            if let Some(raw) = raw {
                let side: Value = serde_json::from_str(raw)
                    .map_err(|e| anyhow::anyhow!("--{} is not JSON: {e}", key.replace('_', "-")))?;
                params.insert(key.into(), side);
            }
        }
        if self.binary {
            params.insert("binary".into(), Value::Bool(true));
        }
        for pair in &self.params {
            let (key, raw) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("--param `{pair}` is not KEY=VALUE"))?;
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
            params.insert(key.to_owned(), value);
        }
        Ok(params)
    }
}

fn ledger_value(ledger: &str) -> Value {
    ledger
        .parse::<u32>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(ledger.to_owned()))
}

/// Crawl ceilings and retry bound; unset flags fall back to the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct PagingArgs {
    /// Page size requested from the server
    #[arg(long)]
    pub limit: Option<u32>,
    #[arg(long)]
    pub max_pages: Option<usize>,
    /// Stop once this many items have been gathered
    #[arg(long)]
    pub max_items: Option<usize>,
    #[arg(long)]
    pub max_retries: Option<u32>,
    /// Keep only ledger objects with this type tag
    #[arg(long = "type")]
    pub type_filter: Option<String>,
}

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Endpoint name (`transaction_history`) or command (`account_tx`)
    pub endpoint: EndpointKind,
    #[arg(long, default_value = "candidate")]
    pub server: Target,
    #[command(flatten)]
    pub query: QueryArgs,
    #[command(flatten)]
    pub paging: PagingArgs,
    /// Print every item, not just the summary
    #[arg(long)]
    pub items: bool,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    pub endpoint: EndpointKind,
    #[command(flatten)]
    pub query: QueryArgs,
    #[command(flatten)]
    pub paging: PagingArgs,
    /// Maximum findings listed in the report
    #[arg(long)]
    pub diagnostic_limit: Option<usize>,
    /// Additional field to ignore when comparing
    #[arg(long = "ignore", value_name = "FIELD")]
    pub ignore: Vec<String>,
    /// Show a line diff for each differing field
    #[arg(long)]
    pub diff: bool,
}

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    /// Comma-separated stream names
    #[arg(long, value_delimiter = ',')]
    pub streams: Vec<String>,
    /// Comma-separated accounts to follow
    #[arg(long, value_delimiter = ',')]
    pub accounts: Vec<String>,
    /// Order book to follow, as JSON (`{"taker_pays":{"currency":"XRP"},"taker_gets":{...}}`); repeatable
    #[arg(long = "book", value_name = "JSON")]
    pub books: Vec<String>,
    /// Stop after this many matched ledgers
    #[arg(long)]
    pub max_batches: Option<usize>,
    #[arg(long)]
    pub batch_timeout_ms: Option<u64>,
}

impl SubscribeArgs {
    pub fn book_values(&self) -> anyhow::Result<Vec<Value>> {
        self.books
            .iter()
            .map(|raw| match serde_json::from_str(raw) {
                Ok(book @ Value::Object(_)) => Ok(book),
                Ok(_) => Err(anyhow::anyhow!("--book `{raw}` is not a JSON object")),
                Err(e) => Err(anyhow::anyhow!("--book is not JSON: {e}")),
            })
            .collect()
    }
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    pub endpoint: EndpointKind,
    #[arg(long, default_value = "candidate")]
    pub server: Target,
    /// File of request parameters, one per line (bare token or JSON object)
    #[arg(long)]
    pub corpus: Option<PathBuf>,
    /// Request field a bare corpus token fills; defaults to the endpoint's first required parameter
    #[arg(long)]
    pub field: Option<String>,
    #[arg(long)]
    pub workers: Option<usize>,
    #[arg(long)]
    pub calls: Option<usize>,
    #[arg(long)]
    pub slow_ms: Option<u64>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Fixed parameters added to every request
    #[command(flatten)]
    pub query: QueryArgs,
    #[arg(long)]
    pub limit: Option<u32>,
    /// Object keys to sample from a ledger scan when `ledger_entry` has no corpus file
    #[arg(long, default_value_t = 1000)]
    pub sample_keys: usize,
}

#[derive(Args, Debug)]
pub struct RangeArgs {
    #[arg(long, default_value = "candidate")]
    pub server: Target,
}

#[derive(Args, Debug)]
pub struct GapsArgs {
    #[arg(long, default_value = "candidate")]
    pub server: Target,
    /// First ledger to check; defaults to the server's advertised minimum
    #[arg(long)]
    pub min: Option<u32>,
    #[arg(long)]
    pub max: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn verify_parses_endpoint_by_command() {
        let cli = Cli::try_parse_from([
            "duet", "verify", "account_tx", "--account", "rA", "--limit", "50",
            "--candidate", "127.0.0.1:51233", "--reference", "wss://ref.example:443",
        ])
        .unwrap();
        assert!(cli.reference.as_ref().is_some_and(|r| r.secure));
        match cli.command {
            Command::Verify(args) => {
                assert_eq!(args.endpoint, EndpointKind::TransactionHistory);
                assert_eq!(args.paging.limit, Some(50));
                assert_eq!(args.query.account.as_deref(), Some("rA"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_endpoint_rejected() {
        assert!(Cli::try_parse_from(["duet", "crawl", "account_lines"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["duet", "range", "--server", "reference", "--format", "json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Command::Range(RangeArgs { server: Target::Reference })));
    }

    #[test]
    fn subscribe_lists_split_on_commas() {
        let cli = Cli::try_parse_from(["duet", "verify-subscribe", "--streams", "ledger,transactions", "--max-batches", "5"]).unwrap();
        match cli.command {
            Command::VerifySubscribe(args) => {
                assert_eq!(args.streams, vec!["ledger", "transactions"]);
                assert_eq!(args.max_batches, Some(5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn books_are_repeatable_json_objects() {
        let cli = Cli::try_parse_from([
            "duet", "verify-subscribe", "--streams", "transactions",
            "--book", r#"{"taker_pays":{"currency":"XRP"},"taker_gets":{"currency":"USD","issuer":"rI"}}"#,
            "--book", r#"{"taker_pays":{"currency":"EUR","issuer":"rE"},"taker_gets":{"currency":"XRP"},"both":true}"#,
        ])
        .unwrap();
        let Command::VerifySubscribe(args) = cli.command else {
            panic!("not verify-subscribe");
        };
        let books = args.book_values().unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0]["taker_gets"]["issuer"], json!("rI"));
        assert_eq!(books[1]["both"], json!(true));

        let bad = SubscribeArgs { books: vec!["[1]".into()], ..args };
        assert!(bad.book_values().is_err());
    }

    #[test]
    fn ledger_entry_load_defaults() {
        let cli = Cli::try_parse_from(["duet", "load", "ledger_entry", "--workers", "4"]).unwrap();
        match cli.command {
            Command::Load(args) => {
                assert_eq!(args.endpoint, EndpointKind::LedgerEntry);
                assert_eq!(args.sample_keys, 1000);
                assert!(args.corpus.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn query_params() {
        let query = QueryArgs {
            ledger: Some("70000".into()),
            taker_pays: Some(r#"{"currency":"XRP"}"#.into()),
            binary: true,
            params: vec!["forward=true".into(), "marker_hint=abc".into()],
            ..QueryArgs::default()
        };
        let params = query.to_params().unwrap();
        assert_eq!(params["ledger_index"], json!(70000));
        assert_eq!(params["taker_pays"], json!({"currency": "XRP"}));
        assert_eq!(params["binary"], json!(true));
        assert_eq!(params["forward"], json!(true));
        assert_eq!(params["marker_hint"], json!("abc"));

        let validated = QueryArgs { ledger: Some("validated".into()), ..QueryArgs::default() };
        assert_eq!(validated.to_params().unwrap()["ledger_index"], json!("validated"));
    }

    #[test]
    fn bad_param_pair_rejected() {
        let query = QueryArgs { params: vec!["novalue".into()], ..QueryArgs::default() };
        assert!(query.to_params().is_err());
        let query = QueryArgs { taker_gets: Some("{".into()), ..QueryArgs::default() };
        assert!(query.to_params().is_err());
    }
}
