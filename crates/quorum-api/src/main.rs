//! Quorum server entry point.
//!
//! Binary name: `quorum`
//!
//! Parses CLI arguments, registers the project roots, and serves the REST
//! API with graceful shutdown.

mod http;
mod project;
mod state;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use state::AppState;

#[derive(Parser)]
#[command(name = "quorum", about = "Multi-project AI workflow orchestration server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server.
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on.
        #[arg(long, short, default_value_t = 8844, env = "QUORUM_PORT")]
        port: u16,

        /// Project to serve, as `id=path` (repeatable). The first entry is
        /// the default project. Defaults to `default=<current directory>`.
        #[arg(long = "project")]
        projects: Vec<String>,

        /// Export spans via OpenTelemetry (stdout exporter).
        #[arg(long)]
        otel: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG always wins; the verbosity flags only set the fallback.
    let default_filter = match cli.verbose {
        0 => "info",
        1 => "info,quorum=debug",
        _ => "trace",
    };

    match cli.command {
        Commands::Serve {
            host,
            port,
            projects,
            otel,
        } => {
            let _tracing = quorum_observe::tracing_setup::init_tracing(default_filter, otel)
                .map_err(|e| anyhow::anyhow!(e))?;

            let projects = parse_projects(projects)?;
            for (id, root) in &projects {
                println!(
                    "  {} project {} -> {}",
                    console::style("•").dim(),
                    console::style(id).cyan(),
                    root.display()
                );
            }
            let state = AppState::new(projects)?;

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            println!(
                "  {} Quorum API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let shutdown = state.shutdown_token().clone();
            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal(shutdown))
                .await?;

            println!("\n  Server stopped.");
        }
    }

    Ok(())
}

/// Parse repeatable `--project id=path` flags; default to the current
/// directory when none are given.
fn parse_projects(raw: Vec<String>) -> anyhow::Result<Vec<(String, PathBuf)>> {
    if raw.is_empty() {
        let cwd = std::env::current_dir()?;
        return Ok(vec![("default".to_string(), cwd)]);
    }
    raw.into_iter()
        .map(|entry| match entry.split_once('=') {
            Some((id, path)) if !id.is_empty() && !path.is_empty() => {
                Ok((id.to_string(), PathBuf::from(path)))
            }
            _ => {
                // A bare path gets its directory name as the project ID.
                let path = PathBuf::from(&entry);
                let id = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.to_string())
                    .ok_or_else(|| anyhow::anyhow!("invalid project spec: '{entry}'"))?;
                Ok((id, path))
            }
        })
        .collect()
}

/// Resolve on Ctrl+C or SIGTERM, then stop the per-project zombie sweepers
/// so the serve future drains in-flight requests without new background
/// writes landing underneath them.
async fn shutdown_signal(sweepers: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::error!(error = %err, "failed to listen for Ctrl+C");
            }
        }
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, stopping sweepers");
    sweepers.cancel();
}
