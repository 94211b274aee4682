use crate::metrics::*;
use wavesexchange_log::info;
use wavesexchange_warp::endpoints::StatsWarpBuilder;

pub struct Config {
    pub port: u16,
}

/// Serves liveness and metrics while an ingestion run is in progress.
pub async fn start(port: u16) {
    info!("Starting stats server at 0.0.0.0:{}", port);
    StatsWarpBuilder::no_main_instance()
        .add_metric(API_CALLS.clone())
        .add_metric(RATE_LIMITED_CALLS.clone())
        .add_metric(QUEUE_SIZE.clone())
        .add_metric(TRANSACTIONS_SAVED.clone())
        .add_metric(TRANSACTIONS_DROPPED.clone())
        .add_metric(RECORDS_SKIPPED.clone())
        .run(port)
        .await;
}
