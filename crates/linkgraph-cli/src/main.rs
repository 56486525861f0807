//! linkgraph CLI: shard boundaries and a crawler-simulation benchmark
//! against a configured link graph backend.

mod bench;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use linkgraph_core::{BackendConfig, Extent, Graph, IdRange, LinkId, StoreConfig};
use linkgraph_memory::InMemoryGraph;
use linkgraph_sqlite::SqliteGraph;

#[derive(Parser)]
#[command(name = "linkgraph")]
#[command(version)]
#[command(about = "Link graph store for crawler workers")]
struct Cli {
    /// Store configuration file (TOML). Defaults to the in-memory backend.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Print shard boundaries for partitioned scans as JSON
    Partitions {
        /// Number of shards
        #[arg(long)]
        count: usize,
        /// Range start (inclusive)
        #[arg(long, default_value_t = LinkId::MIN)]
        from: LinkId,
        /// Range end (exclusive)
        #[arg(long, default_value_t = LinkId::MAX)]
        to: LinkId,
    },
    /// Simulate crawler workers against the configured backend
    Bench {
        /// Links to upsert
        #[arg(long, default_value_t = 1_000)]
        links: usize,
        /// Outgoing edges per link
        #[arg(long, default_value_t = 5)]
        fanout: usize,
        /// Concurrent workers (and scan partitions)
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
}

#[derive(Serialize)]
struct PartitionsOutput {
    partitions: usize,
    extents: Vec<Extent>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Partitions { count, from, to } => {
            let range = IdRange::new(from, to, count)?;
            let output = PartitionsOutput {
                partitions: range.partitions(),
                extents: range.extents(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Bench {
            links,
            fanout,
            workers,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let graph = open_graph(&config)?;
            let report = bench::run(
                graph.as_ref(),
                backend_name(&config),
                bench::Options {
                    links,
                    fanout,
                    workers,
                },
            )?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<StoreConfig> {
    match path {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(StoreConfig::default()),
    }
}

/// Open the backend named by the configuration.
fn open_graph(config: &StoreConfig) -> Result<Arc<dyn Graph>> {
    match &config.backend {
        BackendConfig::Memory => Ok(Arc::new(InMemoryGraph::new())),
        BackendConfig::Sqlite {
            path,
            busy_timeout_ms,
        } => {
            let graph = SqliteGraph::open_with(path, Duration::from_millis(*busy_timeout_ms))
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(Arc::new(graph))
        }
    }
}

fn backend_name(config: &StoreConfig) -> &'static str {
    match config.backend {
        BackendConfig::Memory => "memory",
        BackendConfig::Sqlite { .. } => "sqlite",
    }
}
