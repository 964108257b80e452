//! Tangle server binary: load configuration, open the store, run the
//! hub until a shutdown signal arrives.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tangle_server::{ServerConfig, TangleServer, sweeper};
use tangle_store::{ConnectionConfig, Store};

#[derive(Debug, Parser)]
#[command(name = "tangle", version, about = "Realtime notification and chat hub")]
struct Cli {
    /// Host to bind, overriding configuration.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding configuration.
    #[arg(long)]
    port: Option<u16>,

    /// Path of the SQLite database file, overriding configuration.
    #[arg(long)]
    database: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = ServerConfig::load().context("loading configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    let store = Store::open(
        &config.database_path,
        &ConnectionConfig {
            pool_size: config.pool_size,
            ..ConnectionConfig::default()
        },
    )
    .with_context(|| format!("opening database at {}", config.database_path))?;
    info!(
        database = %config.database_path,
        schema_version = store.schema_version()?,
        "store opened"
    );

    let sweep_interval = Duration::from_secs(config.sweep_interval_secs);
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);

    let server = TangleServer::new(config, store.clone());
    let state = server.state().clone();

    let sweeper_handle = tokio::spawn(sweeper::run_sweeper(
        store,
        sweep_interval,
        state.shutdown.token(),
    ));

    let signal_state = state.clone();
    let _ = tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        signal_state.shutdown.shutdown();
    });

    let result = server.listen().await;
    if let Err(err) = &result {
        error!(error = %err, "server exited with error");
    }

    state
        .shutdown
        .graceful_shutdown(&state.hub, vec![sweeper_handle], Some(shutdown_timeout))
        .await;
    info!("shutdown complete");

    result.map_err(Into::into)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                let _ = stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
