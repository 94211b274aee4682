use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{ApiResponse, LedgerQuery, Requester};
use crate::error::{Error, Result};
use crate::models::{RawTransferRecord, SortOrder};

pub type Calls = Arc<Mutex<Vec<LedgerQuery>>>;

pub enum Reply {
    Records(Vec<RawTransferRecord>),
    RateLimited,
    Fail,
}

/// Answers with pre-recorded replies in order, then with empty pages.
pub struct ScriptedRequester {
    replies: Mutex<VecDeque<Reply>>,
    page_size: usize,
    calls: Calls,
}

impl ScriptedRequester {
    pub fn new(page_size: usize) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            page_size,
            calls: Calls::default(),
        }
    }

    pub fn push(self, reply: Reply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.clone()
    }
}

#[async_trait]
impl Requester for ScriptedRequester {
    async fn request(&self, query: &LedgerQuery) -> Result<ApiResponse> {
        self.calls.lock().unwrap().push(query.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Records(records)) => Ok(ApiResponse::Records(records)),
            Some(Reply::RateLimited) => Ok(ApiResponse::RateLimited(
                "Max rate limit reached".to_string(),
            )),
            Some(Reply::Fail) => Err(Error::ApiError("connection reset".to_string())),
            None => Ok(ApiResponse::Records(vec![])),
        }
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

/// Serves a fixed set of records the way the real API pages them:
/// filtered by block range, sorted, truncated to the page size.
pub struct ChainRequester {
    records: Vec<RawTransferRecord>,
    page_size: usize,
    rate_limit_every: Option<usize>,
    calls: Calls,
}

impl ChainRequester {
    pub fn new(mut records: Vec<RawTransferRecord>, page_size: usize) -> Self {
        records.sort_by_key(|r| r.block_number);
        Self {
            records,
            page_size,
            rate_limit_every: None,
            calls: Calls::default(),
        }
    }

    /// Every `n`-th call is answered with the rate-limit body.
    pub fn rate_limit_every(mut self, n: usize) -> Self {
        self.rate_limit_every = Some(n);
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.clone()
    }
}

#[async_trait]
impl Requester for ChainRequester {
    async fn request(&self, query: &LedgerQuery) -> Result<ApiResponse> {
        let call_no = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(query.clone());
            calls.len()
        };
        if let Some(n) = self.rate_limit_every {
            if call_no % n == 0 {
                return Ok(ApiResponse::RateLimited(
                    "Max rate limit reached".to_string(),
                ));
            }
        }

        let in_range = self
            .records
            .iter()
            .filter(|r| r.block_number >= query.start_block && r.block_number <= query.end_block)
            .cloned();
        let page = match query.sort {
            SortOrder::Asc => in_range.take(self.page_size).collect(),
            SortOrder::Desc => {
                let mut all = in_range.collect::<Vec<_>>();
                all.reverse();
                all.truncate(self.page_size);
                all
            }
        };

        Ok(ApiResponse::Records(page))
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}
