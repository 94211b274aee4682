use crate::error::Error;
use crate::ingest::{pipeline, ConflictPolicy};
use crate::ledger;
use itertools::Itertools;
use serde::Deserialize;
use std::time::Duration;

fn default_pg_port() -> u16 {
    5432
}

fn default_pg_pool_size() -> u32 {
    8
}

fn default_base_url() -> String {
    "https://api.etherscan.io/api".to_string()
}

fn default_action() -> String {
    "txlistinternal".to_string()
}

fn default_page_size() -> usize {
    10_000
}

fn default_retries() -> u32 {
    4
}

fn default_rate_limit_permits() -> usize {
    4
}

fn default_call_delay_ms() -> u64 {
    200
}

fn default_base_block_window() -> u64 {
    10_000
}

fn default_block_window_attempts() -> Vec<u64> {
    vec![5000, 2000, 1000, 500, 100]
}

fn default_min_block_window() -> u64 {
    20
}

fn default_producers() -> usize {
    4
}

fn default_consumers() -> usize {
    2
}

fn default_batch_size() -> usize {
    1000
}

fn default_pop_timeout_secs() -> u64 {
    5
}

#[derive(Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_pg_pool_size")]
    pub pool_size: u32,
}

#[derive(Deserialize)]
struct FlatEtherscanConfig {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_rate_limit_permits")]
    pub rate_limit_permits: usize,
    #[serde(default = "default_call_delay_ms")]
    pub call_delay_ms: u64,
}

#[derive(Deserialize)]
struct FlatIngestConfig {
    pub address: String,
    #[serde(default = "default_base_block_window")]
    pub base_block_window: u64,
    #[serde(default = "default_block_window_attempts")]
    pub block_window_attempts: Vec<u64>,
    #[serde(default = "default_min_block_window")]
    pub min_block_window: u64,
    pub range_step: Option<u64>,
    #[serde(default = "default_producers")]
    pub producers: usize,
    #[serde(default = "default_consumers")]
    pub consumers: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_pop_timeout_secs")]
    pub pop_timeout_secs: u64,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
    pub dev_span_blocks: Option<u64>,
}

#[derive(Deserialize)]
struct FlatApiConfig {
    pub port: Option<u16>,
}

pub struct IngestConfig {
    pub address: String,
    pub pipeline: pipeline::Config,
}

pub fn load_postgres() -> Result<PostgresConfig, Error> {
    envy::prefixed("POSTGRES__")
        .from_env::<PostgresConfig>()
        .map_err(Error::from)
}

pub fn load_etherscan() -> Result<ledger::Config, Error> {
    let flat_config = envy::prefixed("ETHERSCAN__").from_env::<FlatEtherscanConfig>()?;

    if flat_config.page_size == 0 {
        return Err(Error::InvalidConfig("ETHERSCAN__PAGE_SIZE must be positive".into()));
    }
    if flat_config.rate_limit_permits == 0 {
        return Err(Error::InvalidConfig(
            "ETHERSCAN__RATE_LIMIT_PERMITS must be positive".into(),
        ));
    }

    Ok(ledger::Config {
        api_key: flat_config.api_key,
        base_url: flat_config.base_url,
        action: flat_config.action,
        page_size: flat_config.page_size,
        retries: flat_config.retries,
        rate_limit_permits: flat_config.rate_limit_permits,
        call_delay: Duration::from_millis(flat_config.call_delay_ms),
    })
}

pub fn load_ingest() -> Result<IngestConfig, Error> {
    let flat_config = envy::prefixed("INGEST__").from_env::<FlatIngestConfig>()?;
    ingest_config(flat_config)
}

fn ingest_config(flat_config: FlatIngestConfig) -> Result<IngestConfig, Error> {
    if flat_config.producers == 0 || flat_config.consumers == 0 {
        return Err(Error::InvalidConfig(
            "INGEST__PRODUCERS and INGEST__CONSUMERS must be positive".into(),
        ));
    }
    if flat_config.address.trim().is_empty() {
        return Err(Error::InvalidConfig("INGEST__ADDRESS must not be empty".into()));
    }
    if flat_config.batch_size == 0 {
        return Err(Error::InvalidConfig("INGEST__BATCH_SIZE must be positive".into()));
    }
    if flat_config.min_block_window == 0 {
        return Err(Error::InvalidConfig("INGEST__MIN_BLOCK_WINDOW must be positive".into()));
    }
    let shrinking = std::iter::once(&flat_config.base_block_window)
        .chain(flat_config.block_window_attempts.iter())
        .tuple_windows()
        .all(|(wider, narrower)| wider > narrower);
    if !shrinking {
        return Err(Error::InvalidConfig(format!(
            "INGEST__BLOCK_WINDOW_ATTEMPTS must be strictly decreasing and below \
             INGEST__BASE_BLOCK_WINDOW {}, got [{}]",
            flat_config.base_block_window,
            flat_config.block_window_attempts.iter().join(",")
        )));
    }
    let range_step = flat_config.range_step.unwrap_or(flat_config.base_block_window);
    if range_step == 0 {
        return Err(Error::InvalidConfig("INGEST__RANGE_STEP must be positive".into()));
    }

    let span = match (flat_config.start_block, flat_config.end_block) {
        (Some(start), Some(end)) if start <= end => pipeline::SpanOverride::Fixed { start, end },
        (Some(start), Some(end)) => {
            return Err(Error::InvalidConfig(format!(
                "INGEST__START_BLOCK {} is past INGEST__END_BLOCK {}",
                start, end
            )))
        }
        (None, None) => match flat_config.dev_span_blocks {
            Some(blocks) => pipeline::SpanOverride::Capped { blocks },
            None => pipeline::SpanOverride::Discover,
        },
        _ => {
            return Err(Error::InvalidConfig(
                "INGEST__START_BLOCK and INGEST__END_BLOCK must be set together".into(),
            ))
        }
    };

    Ok(IngestConfig {
        address: flat_config.address.trim().to_lowercase(),
        pipeline: pipeline::Config {
            producers: flat_config.producers,
            consumers: flat_config.consumers,
            range_step,
            span,
            producer: crate::ingest::producer::Config {
                base_window: flat_config.base_block_window,
                window_attempts: flat_config.block_window_attempts,
                min_window: flat_config.min_block_window,
            },
            consumer: crate::ingest::consumer::Config {
                batch_size: flat_config.batch_size,
                pop_timeout: Duration::from_secs(flat_config.pop_timeout_secs),
                conflict_policy: flat_config.conflict_policy,
            },
        },
    })
}

pub fn load_api() -> Result<Option<crate::api::Config>, Error> {
    let flat_config = envy::prefixed("API__").from_env::<FlatApiConfig>()?;

    Ok(flat_config.port.map(|port| crate::api::Config { port }))
}
