use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use pulsetrack_server::{alerting, config::Config, state::AppState};

/// `pulsetrack health`: liveness probe for Docker HEALTHCHECK.
///
/// Exits 0 when `GET http://localhost:$PULSETRACK_PORT/health` answers 200.
fn run_health_check() -> ! {
    let port = std::env::var("PULSETRACK_PORT").unwrap_or_else(|_| "8001".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pulsetrack=info".parse()?),
        )
        .json()
        .init();

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db = pulsetrack_duckdb::DuckDbBackend::open(&cfg.db_path(), &cfg.duckdb_memory_limit)?;

    if cfg.smtp.is_none() {
        info!("SMTP not configured; alert e-mails disabled");
    }

    let state = Arc::new(AppState::new(db, cfg.clone()));

    tokio::spawn(alerting::run_alert_worker(Arc::clone(&state)));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = pulsetrack_server::app::build_app(Arc::clone(&state));

    info!(port = cfg.port, "PulseTrack listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    info!("PulseTrack stopped");
    Ok(())
}
