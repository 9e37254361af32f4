use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use pulsetrack_core::{config::Config, event::Event};
use pulsetrack_duckdb::DuckDbBackend;

use crate::alerting::{notifier::Notifier, AlertJob};
use crate::geo::GeoLookup;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// Event log and alert store. Internally `Arc<tokio::sync::Mutex<Connection>>`.
    pub db: Arc<DuckDbBackend>,

    /// Parsed configuration, loaded once at startup.
    pub config: Arc<Config>,

    pub geo: GeoLookup,

    pub notifier: Arc<Notifier>,

    /// Bounded hand-off from ingestion to the alert worker.
    alert_tx: mpsc::Sender<AlertJob>,
    alert_rx: Mutex<Option<mpsc::Receiver<AlertJob>>>,
}

impl AppState {
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let geo = GeoLookup::open(&config.geoip_path);
        let notifier = Notifier::new(config.smtp.clone());
        Self::with_parts(db, config, geo, notifier)
    }

    /// Construct with explicit enrichment and notification backends.
    pub fn with_parts(db: DuckDbBackend, config: Config, geo: GeoLookup, notifier: Notifier) -> Self {
        let (alert_tx, alert_rx) = mpsc::channel(config.alert_queue_size.max(1));
        Self {
            db: Arc::new(db),
            config: Arc::new(config),
            geo,
            notifier: Arc::new(notifier),
            alert_tx,
            alert_rx: Mutex::new(Some(alert_rx)),
        }
    }

    /// Queue `event` for rule evaluation without waiting. A full queue drops
    /// the job; ingestion must not block on alerting. Returns whether the job
    /// was queued.
    pub fn enqueue_alert_job(&self, event: Event) -> bool {
        match self.alert_tx.try_send(AlertJob::new(event)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(site_id = %job.site_id, "alert queue full; dropping evaluation job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(site_id = %job.site_id, "alert queue closed; dropping evaluation job");
                false
            }
        }
    }

    /// Hand the queue receiver to the worker. Only the first caller gets it.
    pub async fn take_alert_receiver(&self) -> Option<mpsc::Receiver<AlertJob>> {
        self.alert_rx.lock().await.take()
    }
}
