//! Autosave UI server - HTTP surface for configuring and triggering autosave.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use autosave::io::settings::{DEFAULT_SETTINGS_FILE, load_settings};
use autosave::orchestrator::DynAutosave;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "autosave-ui")]
#[command(about = "HTTP API for git autosave configuration and manual runs")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "3199")]
    port: u16,

    /// Process settings (TOML). Missing file means defaults.
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Directory containing UI static files (defaults to <project_root>/ui/dist)
    #[arg(long)]
    ui_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("autosave_ui=info".parse()?)
                .add_directive("autosave=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let settings = load_settings(&args.settings)
        .with_context(|| format!("load settings {}", args.settings.display()))?;
    info!(
        project_root = %settings.project_root.display(),
        data_path = %settings.data_path().display(),
        "starting autosave-ui"
    );

    let state = AppState::new(DynAutosave::from_settings(&settings));
    match state.autosave.start() {
        Ok(config) => info!(enabled = config.enabled, "autosave loaded"),
        Err(err) => warn!(err = %format!("{err:#}"), "autosave start failed; timer left disarmed"),
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .with_state(state.clone());

    let ui_dir = args
        .ui_dir
        .unwrap_or_else(|| settings.project_root.join("ui").join("dist"));

    if ui_dir.exists() {
        info!(ui_dir = %ui_dir.display(), "serving static UI files");
        app = app.fallback_service(ServeDir::new(ui_dir).append_index_html_on_directories(true));
    } else {
        info!(ui_dir = %ui_dir.display(), "UI directory not found, API-only mode");
    }

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.autosave.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(err = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
