use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seriesdb::client::{ClientConfig, SeriesDbClient};
use seriesdb::config::Config;
use seriesdb::server::SeriesDbServer;

#[derive(Parser)]
#[command(
    name = "seriesdb",
    version,
    about = "Time-series ingestion with per-series ordered storage and replica bootstrap",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pool member
    Serve {
        /// TOML configuration file; environment variables are used otherwise
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the bind address
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Override the member id
        #[arg(long)]
        member_id: Option<String>,
    },

    /// Insert points from a JSON file into a running member
    Insert {
        /// Member base URL
        #[arg(short, long, default_value = "http://127.0.0.1:9020")]
        url: String,

        /// JSON file with the insert request
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Add a member to the pool of a running member
    AddMember {
        /// Base URL of the member whose pool is extended
        #[arg(short, long, default_value = "http://127.0.0.1:9020")]
        url: String,

        /// Id of the new member
        #[arg(long)]
        id: String,

        /// Base URL of the new member
        #[arg(long)]
        member_url: String,
    },

    /// Show pool status of a running member
    Status {
        /// Member base URL
        #[arg(short, long, default_value = "http://127.0.0.1:9020")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    setup_tracing(&cli.log_format, cli.verbose)?;

    match cli.command {
        Commands::Serve {
            config,
            bind,
            member_id,
        } => {
            tracing::info!(config = ?config, "Starting serve command");
            serve(config.as_deref(), bind, member_id).await?;
        }

        Commands::Insert { url, file } => {
            tracing::info!(url = %url, file = %file.display(), "Starting insert command");
            insert(&url, &file).await?;
        }

        Commands::AddMember {
            url,
            id,
            member_url,
        } => {
            tracing::info!(url = %url, member = %id, "Starting add-member command");
            add_member(&url, &id, &member_url).await?;
        }

        Commands::Status { url } => {
            status(&url).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("seriesdb=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("seriesdb=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn serve(
    config_path: Option<&Path>,
    bind: Option<SocketAddr>,
    member_id: Option<String>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    if let Some(id) = member_id {
        config.server.member_id = id;
    }

    if let Err(e) = seriesdb::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let bind_address = config.server.bind_address;
    let member = config.server.member_id.clone();
    let server = SeriesDbServer::new(config).context("Failed to create server")?;

    println!("seriesdb member '{member}' listening on http://{bind_address}");
    println!();
    println!("API Endpoints:");
    println!("  POST   /insert                    - Insert points");
    println!("  GET    /series                    - List series (?filter=)");
    println!("  GET    /series/{{name}}             - Read a series (?start=&end=)");
    println!("  POST   /pool/members              - Add a pool member");
    println!("  DELETE /pool/members/{{id}}         - Remove a pool member");
    println!("  POST   /pool/members/{{id}}/resume  - Resume a failed bootstrap");
    println!("  GET    /pool/status               - Pool status");
    println!("  POST   /replication/apply         - Apply a replicated batch");
    println!("  GET    /health                    - Health check");
    println!("  GET    /metrics                   - Prometheus metrics");
    println!();
    println!("Press Ctrl+C to stop.\n");

    server
        .start_with_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                }
                Err(e) => {
                    tracing::error!("Failed to wait for Ctrl+C: {}", e);
                }
            }
        })
        .await?;

    println!("seriesdb member stopped.");
    Ok(())
}

fn client(url: &str) -> Result<SeriesDbClient> {
    SeriesDbClient::new(ClientConfig::new(url)).context("Failed to create client")
}

async fn insert(url: &str, file: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let body: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let response = client(url)?.insert(&body).await?;
    println!("{}", response.success_msg);
    Ok(())
}

async fn add_member(url: &str, id: &str, member_url: &str) -> Result<()> {
    let info = client(url)?.add_member(id, member_url).await?;
    println!("Added member '{}' ({})", info.id, info.state);
    Ok(())
}

async fn status(url: &str) -> Result<()> {
    let report = client(url)?.pool_status().await?;

    println!("Member: {}", report.member);
    println!("Pool status: {}", report.status);
    println!();

    if report.members.is_empty() {
        println!("No other members.");
        return Ok(());
    }

    println!(
        "{:<20} {:<14} {:>12} {:>10} {:>9}",
        "MEMBER", "STATE", "TRANSFERRED", "FORWARDED", "FAILURES"
    );
    for member in &report.members {
        println!(
            "{:<20} {:<14} {:>12} {:>10} {:>9}",
            member.id,
            member.state.as_str(),
            format!("{}/{}", member.series_transferred, member.series_total),
            member.batches_forwarded,
            member.failures
        );
        if let Some(ref error) = member.last_error {
            println!("  last error: {error}");
        }
    }

    Ok(())
}
