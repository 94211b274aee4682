//! Access to the remote ledger API: a shared rate limiter, a single-request
//! transport and a client that retries on the API's rate-limit answer.

pub mod client;
pub mod rate_limiter;
pub mod requester;
#[cfg(test)]
pub mod test_resources;

pub use client::LedgerClient;
pub use rate_limiter::RateLimiter;
pub use requester::{ApiResponse, EtherscanRequester, LedgerQuery, Requester};

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub action: String,
    pub page_size: usize,
    pub retries: u32,
    pub rate_limit_permits: usize,
    pub call_delay: Duration,
}
