use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use std::convert::TryFrom;
use std::time::Duration;
use wavesexchange_log::debug;

use super::Config;
use crate::error::{Error, Result};
use crate::models::{RawTransferDto, RawTransferRecord, SortOrder};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerQuery {
    pub address: String,
    pub start_block: u64,
    pub end_block: u64,
    pub sort: SortOrder,
}

#[derive(Debug)]
pub enum ApiResponse {
    Records(Vec<RawTransferRecord>),
    /// The API refused the call because of its own rate limit.
    RateLimited(String),
}

/// Issues exactly one page request against the ledger API.
#[async_trait]
pub trait Requester: Send + Sync + 'static {
    async fn request(&self, query: &LedgerQuery) -> Result<ApiResponse>;

    /// Largest number of records one page can hold.
    fn page_size(&self) -> usize;
}

pub struct EtherscanRequester {
    base_url: String,
    api_key: String,
    action: String,
    page_size: usize,
    http_client: Client,
}

impl EtherscanRequester {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            action: config.action.clone(),
            page_size: config.page_size,
            http_client: ClientBuilder::new()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(30))
                .build()?,
        })
    }

    fn url(&self, query: &LedgerQuery) -> Result<reqwest::Url> {
        let start_block = query.start_block.to_string();
        let end_block = query.end_block.to_string();
        let offset = self.page_size.to_string();

        Ok(reqwest::Url::parse_with_params(
            &self.base_url,
            &[
                ("module", "account"),
                ("action", self.action.as_str()),
                ("address", query.address.as_str()),
                ("startblock", start_block.as_str()),
                ("endblock", end_block.as_str()),
                ("page", "1"),
                ("offset", offset.as_str()),
                ("sort", query.sort.as_str()),
                ("apikey", self.api_key.as_str()),
            ],
        )?)
    }
}

#[async_trait]
impl Requester for EtherscanRequester {
    async fn request(&self, query: &LedgerQuery) -> Result<ApiResponse> {
        let url = self.url(query)?;
        debug!(
            "requesting {} blocks {}..={} sort {}",
            query.address,
            query.start_block,
            query.end_block,
            query.sort.as_str()
        );

        let res = self.http_client.get(url).send().await?;
        let status = res.status();
        let text = res.text().await?;

        if !status.is_success() {
            return Err(Error::ApiError(format!("HTTP {}: {}", status, text)));
        }

        parse_response(&text)
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

/// Turns the loosely typed `{status, message, result}` body into records or a rate-limit answer.
pub fn parse_response(body: &str) -> Result<ApiResponse> {
    let envelope: Envelope = serde_json::from_str(body)?;

    match envelope.result {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| {
                let dto: RawTransferDto = serde_json::from_value(item)?;
                RawTransferRecord::try_from(dto)
            })
            .collect::<Result<Vec<_>>>()
            .map(ApiResponse::Records),
        serde_json::Value::String(reason) if reason.to_lowercase().contains("rate limit") => {
            Ok(ApiResponse::RateLimited(reason))
        }
        other => Err(Error::ApiError(format!(
            "status {:?}, message {:?}, result {}",
            envelope.status, envelope.message, other
        ))),
    }
}
