#[macro_use]
extern crate diesel;

mod api;
mod config;
mod db;
mod error;
mod ingest;
mod ledger;
mod metrics;
mod models;
mod schema;

use crate::db::repo::PostgresStorage;
use crate::error::Error;
use crate::ingest::Pipeline;
use crate::ledger::{EtherscanRequester, LedgerClient, RateLimiter};
use std::sync::Arc;
use wavesexchange_log::{error, info};

fn main() -> Result<(), Error> {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let result = rt.block_on(tokio_main());
    rt.shutdown_timeout(std::time::Duration::from_millis(1));
    result
}

async fn tokio_main() -> Result<(), Error> {
    metrics::register_metrics();

    let postgres_config = config::load_postgres()?;
    let etherscan_config = config::load_etherscan()?;
    let ingest_config = config::load_ingest()?;
    let server_config = config::load_api()?;

    if let Some(server_config) = server_config {
        tokio::spawn(async move { api::start(server_config.port).await });
    }

    let db_pool = db::pool::new(&postgres_config, ingest_config.pipeline.consumers)?;
    let storage = PostgresStorage::new(db_pool);

    let limiter = RateLimiter::new(
        etherscan_config.rate_limit_permits,
        etherscan_config.call_delay,
    );
    info!(
        "ledger API limited to {} concurrent calls, {:?} apart",
        limiter.capacity(),
        etherscan_config.call_delay
    );
    let requester = EtherscanRequester::new(&etherscan_config)?;
    let client = LedgerClient::new(requester, Arc::new(limiter), etherscan_config.retries);

    let pipeline = Pipeline::new(Arc::new(client), Arc::new(storage), ingest_config.pipeline);

    info!("starting ingestion for address {}", ingest_config.address);
    match pipeline.run(&ingest_config.address).await {
        Ok(summary) => {
            info!("ingestion finished: {:?}", summary);
            Ok(())
        }
        Err(err) => {
            error!("ingestion failed: {}", err);
            Err(err)
        }
    }
}
