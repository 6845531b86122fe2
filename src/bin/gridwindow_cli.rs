//! CLI tool for gridwindow - serves a JSON dataset through a windowed data
//! source and prints one window as JSON once it has loaded.
//!
//! Usage:
//!   gridwindow_cli <rows.json>                          # rows 0..50
//!   gridwindow_cli <rows.json> --start 200 --end 260    # any window
//!   gridwindow_cli <rows.json> --sort age:desc --filter city:equals:Oslo
//!   gridwindow_cli <rows.json> --block-size 25 --latency-ms 40
//!
//! Set `RUST_LOG=gridwindow=debug` to watch blocks being queued and loaded.

#![allow(clippy::exit)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]

use std::env;
use std::fs;
use std::io::{self, Write};
use std::time::Duration;

use gridwindow::{
    is_placeholder, DataSourceConfig, FilterCondition, FilterSpec, MemoryFetcher, SortDirection,
    SortKey, SourceEvent, WindowedDataSource,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: gridwindow_cli <rows.json> [--start N] [--end N] \
[--sort field[:asc|desc]]... [--filter field:type:value]... [--block-size N] [--latency-ms N]";

struct Args {
    input: String,
    start: u64,
    end: u64,
    sort: Vec<SortKey>,
    filter: FilterSpec,
    block_size: u64,
    latency: Duration,
}

fn fail(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn parse_number(flag: &str, value: Option<&String>) -> u64 {
    value
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| fail(&format!("{flag} expects a non-negative integer")))
}

fn parse_sort(value: &str) -> SortKey {
    match value.split_once(':') {
        None => SortKey::asc(value),
        Some((field, "asc")) => SortKey::asc(field),
        Some((field, "desc")) => SortKey {
            field: field.to_string(),
            direction: SortDirection::Desc,
        },
        Some((_, other)) => fail(&format!("unknown sort direction `{other}`")),
    }
}

/// `field:type:value`; the value is read as JSON when it parses, else as a string.
fn parse_filter(value: &str) -> (String, FilterCondition) {
    let mut parts = value.splitn(3, ':');
    let (Some(field), Some(kind), Some(raw)) = (parts.next(), parts.next(), parts.next()) else {
        fail(&format!("--filter expects field:type:value, got `{value}`"));
    };
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    (field.to_string(), FilterCondition::new(kind, value))
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        fail(USAGE);
    }

    let mut parsed = Args {
        input: args[1].clone(),
        start: 0,
        end: 50,
        sort: Vec::new(),
        filter: FilterSpec::new(),
        block_size: DataSourceConfig::default().block_size,
        latency: Duration::ZERO,
    };
    let mut i = 2;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--start" => parsed.start = parse_number("--start", value),
            "--end" => parsed.end = parse_number("--end", value),
            "--block-size" => parsed.block_size = parse_number("--block-size", value),
            "--latency-ms" => {
                parsed.latency = Duration::from_millis(parse_number("--latency-ms", value));
            }
            "--sort" => parsed.sort.push(parse_sort(
                value.unwrap_or_else(|| fail("--sort expects a field")),
            )),
            "--filter" => {
                let (field, condition) =
                    parse_filter(value.unwrap_or_else(|| fail("--filter expects a value")));
                parsed.filter.insert(field, condition);
            }
            other => fail(&format!("unknown argument `{other}`\n{USAGE}")),
        }
        i += 2;
    }
    if parsed.end < parsed.start {
        fail("--end must not be before --start");
    }
    parsed
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gridwindow=info,warn")),
        )
        .init();

    let args = parse_args();

    // Read input file
    let data = match fs::read_to_string(&args.input) {
        Ok(d) => d,
        Err(e) => fail(&format!("Error reading {}: {}", args.input, e)),
    };
    let fetcher = match MemoryFetcher::from_json(&data) {
        Ok(f) => f.with_latency(args.latency),
        Err(e) => fail(&format!("Error parsing rows: {e}")),
    };

    let config = DataSourceConfig::default().with_block_size(args.block_size);
    let source = match WindowedDataSource::new(fetcher, config) {
        Ok(s) => s,
        Err(e) => fail(&format!("Error creating data source: {e}")),
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = source.subscribe(move |event: &SourceEvent| {
        let _ = tx.send(event.clone());
    });

    if !args.sort.is_empty() {
        source.set_sort_spec(args.sort);
    }
    if !args.filter.is_empty() {
        source.set_filter_spec(args.filter);
    }

    // First read queues the window; re-read after each event until it lands.
    source.get_rows(args.start, args.end);
    while !source.is_range_loaded(args.start, args.end) {
        match rx.recv().await {
            Some(SourceEvent::BlockFailed { block, error }) => {
                fail(&format!("Block {block} failed: {error}"));
            }
            Some(_) => {
                source.get_rows(args.start, args.end);
            }
            None => break,
        }
    }
    let rows = source.get_rows(args.start, args.end);

    // Rows past the end of the data stay placeholders; leave them out.
    let loaded: Vec<_> = rows.into_iter().filter(|row| !is_placeholder(row)).collect();
    let output = serde_json::json!({
        "start": args.start,
        "totalRows": source.total_row_count(),
        "rows": loaded,
    });
    let json = match serde_json::to_string_pretty(&output) {
        Ok(j) => j,
        Err(e) => fail(&format!("Error serializing JSON: {e}")),
    };
    io::stdout().write_all(json.as_bytes()).unwrap();
    println!();

    source.destroy();
}
