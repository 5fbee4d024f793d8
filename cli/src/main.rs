//! lingopipe CLI — batch-translate NDJSON records from the terminal.
//!
//! Usage:
//! ```bash
//! # Translate records from a file to Latin American Spanish
//! lingopipe translate --input records.ndjson --output out.ndjson \
//!     --to es-419 --model gpt-4o-mini --api-key sk-...
//!
//! # Read from stdin, write to stdout, key from the environment
//! LINGOPIPE_API_KEY=sk-... lingopipe translate --to fr --model gpt-4o-mini
//! ```
//!
//! Input and output are NDJSON: one `{"idx":N,"text":"..."}` object per
//! line. Records that could not be translated keep their original text.

use std::env;
use std::io::Read;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use lingopipe_core::policy::RetryConfig;
use lingopipe_core::record::serialize_item;
use lingopipe_core::{apply_translations, build_batches, Dispatcher, DispatcherConfig, Record, WireItem};
use lingopipe_openai::{mask_keys, OpenAiClient, OpenAiConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "translate" => cmd_translate(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("lingopipe {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("lingopipe {}", env!("CARGO_PKG_VERSION"));
    println!("Batch-translate NDJSON text records through an LLM\n");
    println!("USAGE:");
    println!("    lingopipe <COMMAND>\n");
    println!("COMMANDS:");
    println!("    translate  Translate NDJSON records");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("TRANSLATE FLAGS:");
    println!("    --to <LANG>           Target language tag, e.g. es-419  [required]");
    println!("    --from <LANG>         Source language tag (optional)");
    println!("    --model <MODEL>       Model name  [env: LINGOPIPE_MODEL]");
    println!("    --api-key <KEY>       API key, or comma-separated keys  [env: LINGOPIPE_API_KEY]");
    println!("    --base-url <URL>      Endpoint base URL  [env: LINGOPIPE_BASE_URL]");
    println!("    --input <FILE>        Input NDJSON file  [default: stdin]");
    println!("    --output <FILE>       Output NDJSON file  [default: stdout]");
    println!("    --batch-chars <N>     Max serialized chars per batch  [default: 7000]");
    println!("    --workers <N>         Concurrent batches  [default: 2]");
    println!("    --rps <N>             Request starts per second  [default: 4]");
    println!("    --timeout-secs <N>    Per-request timeout  [default: 150]");
}

async fn cmd_translate(args: &[String]) -> Result<(), String> {
    let target = parse_flag(args, "--to").ok_or("--to is required")?;
    let source = parse_flag(args, "--from").unwrap_or_default();
    let model = flag_or_env(args, "--model", "LINGOPIPE_MODEL").ok_or("--model is required")?;
    let api_key = flag_or_env(args, "--api-key", "LINGOPIPE_API_KEY").unwrap_or_default();
    let base_url = flag_or_env(args, "--base-url", "LINGOPIPE_BASE_URL");

    let batch_chars = parse_numeric_flag(args, "--batch-chars", 7000usize)?;
    let workers = parse_numeric_flag(args, "--workers", 2usize)?;
    let rps = parse_numeric_flag(args, "--rps", 4.0f64)?;
    let timeout_secs = parse_numeric_flag(args, "--timeout-secs", 150u64)?;

    let records = read_records(parse_flag(args, "--input").as_deref())?;
    if records.is_empty() {
        tracing::info!("no records to translate");
        write_records(parse_flag(args, "--output").as_deref(), &records)?;
        return Ok(());
    }

    let batches = build_batches(&records, batch_chars).map_err(|e| e.to_string())?;
    tracing::info!(
        records = records.len(),
        batches = batches.len(),
        model = %model,
        api_keys = %mask_keys(&api_key, ","),
        "starting translation"
    );

    let client = OpenAiClient::new(OpenAiConfig {
        base_url,
        api_key,
        model,
        request_timeout: Duration::from_secs(timeout_secs),
        retry: RetryConfig::default(),
    })
    .map_err(|e| e.to_string())?;

    let dispatcher = Dispatcher::new(
        Arc::new(client),
        DispatcherConfig {
            concurrency: workers,
            rps,
            batch_retry: RetryConfig::batch_defaults(),
        },
    );

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; canceling translation");
            token.cancel();
        }
    });

    let translated = dispatcher
        .run(&source, &target, batches, &cancel)
        .await
        .map_err(|e| e.to_string())?;

    let output = apply_translations(&records, &translated);
    write_records(parse_flag(args, "--output").as_deref(), &output)?;
    tracing::info!(translated = translated.len(), "translation finished");
    Ok(())
}

/// Read NDJSON records from a file, or stdin when `path` is `None` or `-`.
fn read_records(path: Option<&str>) -> Result<Vec<Record>, String> {
    let content = match path {
        Some(path) if path != "-" => std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {path}: {e}"))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("cannot read stdin: {e}"))?;
            buf
        }
    };

    let mut records = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let item: WireItem = serde_json::from_str(line)
            .map_err(|e| format!("invalid record on line {}: {e}", i + 1))?;
        let idx = u32::try_from(item.idx)
            .ok()
            .filter(|&idx| idx > 0)
            .ok_or_else(|| format!("invalid idx on line {}: {}", i + 1, item.idx))?;
        records.push(Record::new(idx, item.text));
    }
    Ok(records)
}

/// Write records as NDJSON to a file, or stdout when `path` is `None` or `-`.
fn write_records(path: Option<&str>, records: &[Record]) -> Result<(), String> {
    let mut out = String::new();
    for record in records {
        let line = serialize_item(record.id, &record.text).map_err(|e| e.to_string())?;
        out.push_str(&line);
        out.push('\n');
    }

    match path {
        Some(path) if path != "-" => {
            std::fs::write(path, out).map_err(|e| format!("cannot write {path}: {e}"))
        }
        _ => {
            print!("{out}");
            Ok(())
        }
    }
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn flag_or_env(args: &[String], flag: &str, var: &str) -> Option<String> {
    parse_flag(args, flag).or_else(|| env::var(var).ok().filter(|v| !v.trim().is_empty()))
}

fn parse_numeric_flag<T: std::str::FromStr>(
    args: &[String],
    flag: &str,
    default: T,
) -> Result<T, String> {
    match parse_flag(args, flag) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("invalid value for {flag}: {raw}")),
    }
}
