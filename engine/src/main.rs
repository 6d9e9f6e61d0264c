use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pulz_core::{now_iso, EngineConfig};
use pulz_execution::CancellationRegistry;
use pulz_orchestrator::{Broadcaster, MissionEngine, MissionEngineHandle, MissionStateHandle};
use pulz_server::{app_router, AlwaysDenyAuth, AppState, NoAuth, UserVerifier};
use pulz_store::Store;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pulz-engine")]
#[command(about = "PulZ opportunity-ingestion and fulfilment engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the `/api/pulz` HTTP + SSE surface (default).
    Serve {
        #[arg(long, alias = "host", default_value = "127.0.0.1")]
        hostname: String,
        #[arg(long, default_value_t = 8787)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json_format = std::env::var("PULZ_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve {
        hostname: "127.0.0.1".to_string(),
        port: 8787,
    });

    match command {
        Command::Serve { hostname, port } => {
            let config = EngineConfig::from_env();
            let addr: SocketAddr = format!("{hostname}:{port}")
                .parse()
                .context("invalid hostname or port")?;
            let state = build_state(config).await?;
            info!("starting pulz-engine on http://{addr}");
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app_router(state)).await?;
        }
    }

    Ok(())
}

async fn build_state(config: EngineConfig) -> anyhow::Result<AppState> {
    let store = Store::open(config.database_path())
        .await
        .context("failed to open store")?;

    // Executions left `running` across a process restart are considered
    // failed, never resumed (`SPEC_FULL.md` §1 Non-goals).
    let stale = store.fail_stale_running_executions(now_iso()).await?;
    if stale > 0 {
        tracing::warn!("marked {stale} stale running execution(s) as failed on startup");
    }

    let broadcaster = Broadcaster::new();
    let cancellations = CancellationRegistry::new();
    let mission_state = MissionStateHandle::new();
    let auth_enabled = config.auth_enabled;

    let engine = MissionEngine::new(store, broadcaster, config, cancellations, mission_state);
    let handle = MissionEngineHandle::new(engine);

    let verifier: Arc<dyn UserVerifier> = if auth_enabled {
        Arc::new(AlwaysDenyAuth)
    } else {
        Arc::new(NoAuth)
    };

    Ok(AppState::new(handle, verifier))
}
