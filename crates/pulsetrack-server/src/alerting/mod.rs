//! Background alert evaluation, decoupled from the ingestion response.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use pulsetrack_core::event::Event;

use crate::state::AppState;

pub mod evaluator;
pub mod notifier;

/// One ingested event waiting for rule evaluation.
#[derive(Debug, Clone)]
pub struct AlertJob {
    pub site_id: String,
    pub event: Event,
}

impl AlertJob {
    pub fn new(event: Event) -> Self {
        Self {
            site_id: event.site_id.clone(),
            event,
        }
    }
}

/// Drain the alert queue, evaluating each job on its own task so a slow
/// site never holds up the others.
pub async fn run_alert_worker(state: Arc<AppState>) {
    let Some(mut rx) = state.take_alert_receiver().await else {
        warn!("alert worker already running");
        return;
    };
    info!(
        queue_size = state.config.alert_queue_size,
        dedup = state.config.alert_dedup,
        "Alert worker started"
    );
    while let Some(job) = rx.recv().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let fired = evaluator::evaluate_event(
                state.db.as_ref(),
                state.db.as_ref(),
                &state.notifier,
                state.config.alert_dedup,
                &job.event,
                Utc::now(),
            )
            .await;
            if fired > 0 {
                info!(site_id = %job.site_id, fired, "alert evaluation finished");
            }
        });
    }
}
