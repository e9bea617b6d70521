//! airspace - operator CLI for chunked datasets stored in a directory.
//!
//! Writes, reads and deletes datasets through the same code path as library
//! users, and exposes the on-disk chunk layout for inspection.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

use airspace_core::store::Store;
use airspace_core::{DirClient, Options, Reader};

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Chunked paged dataset storage.
#[derive(Parser)]
#[command(name = "airspace", about = "Store and inspect chunked paged datasets", version)]
struct Cli {
    /// Directory holding the key files.
    #[arg(long, global = true, env = "AIRSPACE_DIR", default_value = "./airspace-data")]
    dir: PathBuf,

    /// Key namespace.
    #[arg(long, global = true, env = "AIRSPACE_PREFIX", default_value = "")]
    prefix: String,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a dataset from a JSON file: {"data": ..., "pages": [[row, ...], ...]}
    Set {
        /// Dataset id (random UUID when omitted).
        #[arg(long)]
        id: Option<String>,

        /// Pages per chunk (default 5).
        #[arg(long)]
        pages_per_chunk: Option<usize>,

        /// Expire every key after this many seconds.
        #[arg(long, value_name = "SECS")]
        expires_in: Option<u64>,

        /// Input file.
        file: PathBuf,
    },

    /// Print a dataset summary, one page, or every page.
    Get {
        id: String,

        /// 1-based page number.
        #[arg(long, conflicts_with = "all")]
        page: Option<usize>,

        /// Print all pages.
        #[arg(long)]
        all: bool,
    },

    /// Delete a dataset. Exits with status 1 when nothing was deleted.
    Del { id: String },

    /// Show how a dataset is laid out in chunks.
    Inspect {
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List every key in the directory.
    Keys {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove expired keys.
    Purge,
}

/// Input file for `set`.
#[derive(Deserialize)]
struct DatasetFile {
    #[serde(default)]
    data: Value,
    #[serde(default)]
    pages: Vec<Vec<Value>>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Logs go to stderr so that stdout carries only command output.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["airspace", "airspace_core"] {
        if let Ok(directive) = format!("{target}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> CliResult<ExitCode> {
    let client = DirClient::open(&cli.dir)?;
    debug!(dir = %client.base_path().display(), prefix = %cli.prefix, "opened store");
    let options = Options::<Value, Value>::default().prefix(cli.prefix.as_str());

    match &cli.command {
        Commands::Set {
            id,
            pages_per_chunk,
            expires_in,
            file,
        } => {
            let input = read_input(file)?;
            let mut options = options;
            if let Some(n) = *pages_per_chunk {
                options = options.pages_per_chunk(n);
            }
            if let Some(secs) = *expires_in {
                options = options.expires_in_seconds(secs);
            }

            let page_count = input.pages.len();
            let id = airspace_core::set(&client, id.as_deref(), input.data, input.pages, &options)?;
            info!(id = %id, pages = page_count, "saved dataset");
            println!("{id}");
        }
        Commands::Get { id, page, all } => {
            let Some(reader) = airspace_core::get(&client, id, &options)? else {
                eprintln!("Dataset not found: {id}");
                return Ok(ExitCode::FAILURE);
            };
            if let Some(number) = *page {
                print_json(&reader.page(number)?)?;
            } else if *all {
                print_json(&reader.pages()?)?;
            } else {
                print_json(&Summary::of(&reader))?;
            }
        }
        Commands::Del { id } => {
            let deleted = airspace_core::del(&client, id, &options)?;
            println!("{deleted}");
            if !deleted {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Inspect { id, json } => {
            let Some(reader) = airspace_core::get(&client, id, &options)? else {
                eprintln!("Dataset not found: {id}");
                return Ok(ExitCode::FAILURE);
            };
            let layout = inspect(&client, &reader)?;
            if *json {
                print_json(&layout)?;
            } else {
                print_layout(&layout);
            }
        }
        Commands::Keys { json } => {
            let keys: Vec<KeyJson> = client
                .entries()?
                .into_iter()
                .map(|e| KeyJson {
                    key: e.key,
                    file_size: e.file_size,
                    value_len: e.value_len,
                    expires_at: e.expires_at.map(|at| at.timestamp()),
                })
                .collect();
            if *json {
                print_json(&keys)?;
            } else {
                print_keys(&keys);
            }
        }
        Commands::Purge => {
            let removed = client.purge_expired()?;
            info!(removed, "purged expired keys");
            println!("{removed}");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn read_input(path: &Path) -> CliResult<DatasetFile> {
    let raw = fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let input = serde_json::from_slice(&raw)
        .map_err(|e| format!("invalid dataset file {}: {e}", path.display()))?;
    Ok(input)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── Output types ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Summary<'r> {
    id: &'r str,
    data: Option<&'r Value>,
    page_count: usize,
    pages_per_chunk: usize,
    chunk_count: usize,
    expires_in_seconds: Option<u64>,
}

impl<'r> Summary<'r> {
    fn of(reader: &'r Reader<'_, Value, Value>) -> Self {
        Self {
            id: reader.id(),
            data: reader.data(),
            page_count: reader.page_count(),
            pages_per_chunk: reader.pages_per_chunk(),
            chunk_count: reader.chunk_count(),
            expires_in_seconds: reader.expires_in_seconds(),
        }
    }
}

#[derive(Serialize)]
struct LayoutJson {
    root_key: String,
    root_file_size: u64,
    page_count: usize,
    pages_per_chunk: usize,
    expires_in_seconds: Option<u64>,
    chunks: Vec<ChunkJson>,
}

#[derive(Serialize)]
struct ChunkJson {
    index: usize,
    key: String,
    /// Nominal page range, 0-based and inclusive.
    first_page: usize,
    last_page: usize,
    stored_pages: usize,
    file_size: u64,
}

#[derive(Serialize)]
struct KeyJson {
    key: String,
    file_size: u64,
    value_len: usize,
    expires_at: Option<i64>,
}

// ── Inspection ───────────────────────────────────────────────────────────────

fn inspect(client: &DirClient, reader: &Reader<'_, Value, Value>) -> CliResult<LayoutJson> {
    let store = Store::new(client);
    let key = reader.key();

    let mut chunks = Vec::with_capacity(reader.chunk_count());
    for chunk in reader.chunker().chunks(reader.page_count()) {
        let chunk_key = key.chunk(chunk.chunk_index);
        let stored_pages = store.chunk(key, chunk.chunk_index)?.len();
        chunks.push(ChunkJson {
            index: chunk.chunk_index,
            file_size: file_size(client, &chunk_key),
            key: chunk_key,
            first_page: chunk.page_index_start,
            last_page: chunk.page_index_end,
            stored_pages,
        });
    }

    Ok(LayoutJson {
        root_file_size: file_size(client, &key.root()),
        root_key: key.root(),
        page_count: reader.page_count(),
        pages_per_chunk: reader.pages_per_chunk(),
        expires_in_seconds: reader.expires_in_seconds(),
        chunks,
    })
}

fn file_size(client: &DirClient, key: &str) -> u64 {
    fs::metadata(client.path_for(key))
        .map(|m| m.len())
        .unwrap_or(0)
}

fn print_layout(layout: &LayoutJson) {
    println!(
        "{}  ({}, {} pages, {} per chunk, expires: {})",
        layout.root_key,
        human_bytes(layout.root_file_size),
        layout.page_count,
        layout.pages_per_chunk,
        layout
            .expires_in_seconds
            .map_or_else(|| "never".to_string(), |s| format!("{s}s")),
    );
    if layout.chunks.is_empty() {
        println!("  (no chunks)");
        return;
    }

    println!(
        "  {:>5}  {:<40}  {:>11}  {:>6}  {:>10}",
        "chunk", "key", "pages", "stored", "size"
    );
    for c in &layout.chunks {
        println!(
            "  {:>5}  {:<40}  {:>11}  {:>6}  {:>10}",
            c.index,
            c.key,
            format!("{}-{}", c.first_page, c.last_page),
            c.stored_pages,
            human_bytes(c.file_size),
        );
    }
}

fn print_keys(keys: &[KeyJson]) {
    if keys.is_empty() {
        println!("(no keys)");
        return;
    }
    let total: u64 = keys.iter().map(|k| k.file_size).sum();
    for k in keys {
        let expires = k.expires_at.map_or_else(|| "-".to_string(), fmt_ts);
        println!(
            "{:<48}  {:>10}  {:>10}  {}",
            k.key,
            human_bytes(k.file_size),
            human_bytes(k.value_len as u64),
            expires
        );
    }
    println!("{} keys, {}", keys.len(), human_bytes(total));
}

// ── Formatting helpers ───────────────────────────────────────────────────────

fn human_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= MIB {
        format!("{:.1} MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn fmt_ts(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}
