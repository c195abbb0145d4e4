use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use lantern_data::{DataClient, Poller, QuerySpec, QueryState};
use lantern_document::build_from_source;
use lantern_preview::server::{self, ServeOptions};
use lantern_preview::{init_tracing, LanternConfig, TracingSink};

#[derive(Parser, Debug)]
#[command(name = "lantern-preview", about = "Live preview engine for single-file React programs")]
struct Args {
    /// Path to lantern.json (default: ./lantern.json if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the bootstrap document for a source file
    Build {
        file: PathBuf,
        /// Output path (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print the configuration constants extracted from a source file
    Extract { file: PathBuf },
    /// Run the preview server
    Serve {
        #[arg(long, default_value_t = 4100)]
        port: u16,
        /// Feed edits of this file into the `default` session
        #[arg(long)]
        watch: Option<PathBuf>,
    },
    /// Read a table through the data API
    Query {
        table: String,
        #[arg(long)]
        select: Option<String>,
        /// Raw filter, e.g. status=eq.open
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        order: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        /// Keep polling at the configured interval
        #[arg(long)]
        watch: bool,
    },
    /// Products at a location, filtered by minimum quantity
    LocationProducts {
        #[arg(long)]
        location: Option<String>,
        /// Take LOCATION_ID from this source file when --location is absent
        #[arg(long)]
        from: Option<PathBuf>,
        #[arg(long)]
        watch: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = LanternConfig::load(args.config.as_deref()).context("load config")?;

    match args.command {
        Command::Build { file, out } => {
            let source = read_source(&file)?;
            let doc = build_from_source(&source, &config.document_options());
            match out {
                Some(path) => {
                    std::fs::write(&path, doc.as_str()).with_context(|| format!("write {}", path.display()))?;
                    tracing::info!("[preview] wrote {} ({} bytes, hash {:016x})", path.display(), doc.len(), doc.hash());
                }
                None => print!("{}", doc.as_str()),
            }
        }
        Command::Extract { file } => {
            let vars = lantern_source::extract(&read_source(&file)?);
            let map: serde_json::Map<String, serde_json::Value> =
                vars.iter().map(|(k, v)| (k.to_string(), serde_json::Value::from(v))).collect();
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        Command::Serve { port, watch } => {
            let rt = tokio::runtime::Runtime::new().context("start tokio runtime")?;
            rt.block_on(server::serve(config, Arc::new(TracingSink), ServeOptions { port, watch }))?;
        }
        Command::Query { table, select, filter, order, limit, watch } => {
            let spec = QuerySpec { table, select, filter, order, limit };
            let client = DataClient::new(&config.data_api);
            if watch {
                let label = spec.table.clone();
                let interval = client.config().poll_interval();
                run_poller(Poller::start(&label, interval, move || client.fetch(&spec), print_state))?;
            } else {
                let mut state = QueryState::new();
                state.apply(client.fetch(&spec));
                print_state(&state);
            }
        }
        Command::LocationProducts { location, from, watch } => {
            let location = match (location, from) {
                (Some(id), _) => Some(id),
                (None, Some(file)) => lantern_source::extract(&read_source(&file)?).get("LOCATION_ID").map(String::from),
                (None, None) => None,
            };
            if location.is_none() {
                tracing::info!("[data] no location id, reading products unfiltered");
            }
            let client = DataClient::new(&config.data_api);
            if watch {
                let interval = client.config().poll_interval();
                let tick = move || client.location_products(location.as_deref());
                run_poller(Poller::start("location-products", interval, tick, print_state))?;
            } else {
                let mut state = QueryState::new();
                state.apply(client.location_products(location.as_deref()));
                print_state(&state);
            }
        }
    }
    Ok(())
}

fn read_source(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(anyhow!("path not found: {}", path.display()));
    }
    std::fs::read_to_string(path).with_context(|| format!("read failed: {}", path.display()))
}

fn print_state(state: &QueryState) {
    match serde_json::to_string(state) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!("[data] encode state: {}", e),
    }
}

/// Block until Ctrl-C, then stop the poller.
fn run_poller(poller: Poller) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;
    rt.block_on(tokio::signal::ctrl_c()).context("wait for ctrl-c")?;
    poller.stop();
    Ok(())
}
