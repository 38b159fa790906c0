//! # Taskvault Server
//!
//! Zero-knowledge multi-device sync server for the Taskvault task manager.
//!
//! ## Overview
//!
//! Clients hold the only decryption keys; this server stores opaque
//! ciphertext envelopes and the causality metadata (vector clocks,
//! tombstones) needed to detect concurrent edits across devices. It
//! provides:
//!
//! - **Authentication**: OAuth 2.0 / OIDC Authorization Code with PKCE
//!   against Google and Apple, with a single-use result mailbox and signed
//!   HS256 sessions with revocation
//! - **Sync**: vector-clock-based push/pull/resolve over encrypted task
//!   blobs, with delete tombstones and conflict detection
//! - **Service skin**: origin-aware CORS, per-identity rate limiting with
//!   brute-force escalation, scheduled retention cleanup
//!
//! ## Architecture
//!
//! Built on Axum; PostgreSQL owns persistent state, Redis owns everything
//! time-bounded (OAuth transients, sessions, rate counters).

pub mod cleanup;
pub mod handlers;
pub mod infra;
pub mod middleware;
pub mod oidc;
pub mod routes;

use clap::Parser;
use std::net::SocketAddr;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use infra::{app_state::AppState, config::Config};
use taskvault_core::{Database, KvStore};

/// Command line arguments for the Taskvault sync server
#[derive(Parser, Debug)]
#[command(name = "taskvault-server")]
#[command(about = "Zero-knowledge multi-device sync server for Taskvault")]
struct Args {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Run the retention cleanup once and exit (for external schedulers)
    #[arg(long)]
    cleanup: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "taskvault_server=info,taskvault_core=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env().map_err(|e| {
        error!("configuration error: {e}");
        anyhow::anyhow!("configuration error: {e}")
    })?;
    if let Some(port) = args.port {
        config.server_port = port;
    }
    if let Some(host) = args.host {
        config.server_host = host;
    }

    info!(
        environment = ?config.environment,
        origins = config.allowed_origins.len(),
        "configuration loaded"
    );

    let db = Database::new(&config.database_url).await?;
    db.migrate().await?;

    if args.cleanup {
        // Scheduled-trigger mode: no HTTP, one retention pass.
        let report = cleanup::run_once(&db, &config.retention).await;
        if !report.fully_succeeded() {
            anyhow::bail!("retention cleanup finished with failed passes");
        }
        return Ok(());
    }

    let kv = KvStore::new(&config.redis_url).await?;
    let state = AppState::new(db, kv, config)?;

    cleanup::spawn_retention_loop(state.clone());

    let app = routes::create_router(state.clone());

    let addr: SocketAddr = format!(
        "{}:{}",
        state.config.server_host, state.config.server_port
    )
    .parse()?;
    info!("starting Taskvault sync server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("shutdown: ctrl-c"),
        () = terminate => info!("shutdown: SIGTERM"),
    }
}
