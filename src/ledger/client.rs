use std::sync::Arc;
use wavesexchange_log::{error, info, warn};

use super::{ApiResponse, LedgerQuery, RateLimiter, Requester};
use crate::error::{Error, Result};
use crate::metrics::{API_CALLS, RATE_LIMITED_CALLS};
use crate::models::{RawTransferRecord, SortOrder};

/// Highest block the API accepts as an open upper bound.
pub const LATEST_BLOCK: u64 = 99_999_999;

pub struct LedgerClient<R> {
    requester: R,
    limiter: Arc<RateLimiter>,
    attempts: u32,
}

impl<R: Requester> LedgerClient<R> {
    pub fn new(requester: R, limiter: Arc<RateLimiter>, attempts: u32) -> Self {
        Self {
            requester,
            limiter,
            attempts: attempts.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.requester.page_size()
    }

    /// Fetches one page of records for `start_block..=end_block`.
    ///
    /// Every attempt goes through the rate limiter. Only the API's rate-limit
    /// answer is retried; transport and parse errors are returned as they are.
    pub async fn fetch(
        &self,
        address: &str,
        start_block: u64,
        end_block: u64,
        sort: SortOrder,
        caller: &str,
    ) -> Result<Vec<RawTransferRecord>> {
        let query = LedgerQuery {
            address: address.to_owned(),
            start_block,
            end_block,
            sort,
        };

        for attempt in 1..=self.attempts {
            info!(
                "{}: calling ledger API, current block: {}, ending block: {}",
                caller, start_block, end_block
            );
            let response = self
                .limiter
                .throttle(self.requester.request(&query))
                .await;
            API_CALLS.inc();

            match response? {
                ApiResponse::Records(records) => return Ok(records),
                ApiResponse::RateLimited(reason) => {
                    RATE_LIMITED_CALLS.inc();
                    warn!(
                        "{}: rate limited on blocks {}..={} (attempt {}/{}): {}",
                        caller, start_block, end_block, attempt, self.attempts, reason
                    );
                }
            }
        }

        error!(
            "{}: rate limit retries exhausted, current block: {}, ending block: {}",
            caller, start_block, end_block
        );
        Err(Error::RateLimitExhausted {
            caller: caller.to_owned(),
            start_block,
            end_block,
        })
    }

    /// Block number of the first record in `sort` order, `None` when the address has no records.
    pub async fn boundary_block(
        &self,
        address: &str,
        sort: SortOrder,
        caller: &str,
    ) -> Result<Option<u64>> {
        let records = self.fetch(address, 0, LATEST_BLOCK, sort, caller).await?;
        Ok(records.first().map(|r| r.block_number))
    }
}
