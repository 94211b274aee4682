use std::sync::Arc;
use wavesexchange_log::{debug, error, info};

use super::queue::QueueSender;
use crate::error::{Error, Result};
use crate::ledger::{LedgerClient, Requester};
use crate::models::{BlockRange, RawTransferRecord, SortOrder};

#[derive(Clone, Debug)]
pub struct Config {
    /// Blocks past the cursor asked for in the first request of every step.
    pub base_window: u64,
    /// Progressively smaller windows tried while a page comes back full.
    pub window_attempts: Vec<u64>,
    /// Window used once `window_attempts` is exhausted.
    pub min_window: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProducerReport {
    pub api_calls: u64,
    pub fetched: u64,
    pub enqueued: u64,
}

/// Fetches every qualifying record of one block range into the queue.
pub struct Producer<R> {
    name: String,
    address: String,
    range: BlockRange,
    client: Arc<LedgerClient<R>>,
    config: Arc<Config>,
    queue: QueueSender,
}

impl<R: Requester> Producer<R> {
    pub fn new(
        id: usize,
        address: String,
        range: BlockRange,
        client: Arc<LedgerClient<R>>,
        config: Arc<Config>,
        queue: QueueSender,
    ) -> Self {
        Self {
            name: format!("producer_{}", id),
            address,
            range,
            client,
            config,
            queue,
        }
    }

    pub async fn run(self) -> Result<ProducerReport> {
        let mut report = ProducerReport::default();
        let result = self.produce(&mut report).await;

        match &result {
            Ok(()) => info!(
                "{}: reached ending block {}, {} of {} fetched records enqueued",
                self.name, self.range.end, report.enqueued, report.fetched
            ),
            Err(err) => error!(
                "{}: failed on range {}, starting block: {}, ending block: {}: {}",
                self.name, self.range, self.range.start, self.range.end, err
            ),
        }

        result.map(|_| report)
    }

    async fn produce(&self, report: &mut ProducerReport) -> Result<()> {
        let page_limit = self.client.page_size();
        let end = self.range.end;
        let mut current = self.range.start;

        while current <= end {
            let mut window = self.config.base_window;
            let mut tentative_end = current.saturating_add(window).min(end);
            debug!(
                "{}: new loop, current block: {}, ending block: {}",
                self.name, current, end
            );

            let mut records = self.fetch(current, tentative_end, report).await?;

            if !records.is_empty() {
                let mut attempt = 0;
                while records.len() >= page_limit {
                    if attempt > self.config.window_attempts.len() {
                        return Err(Error::WindowOverflow {
                            caller: self.name.clone(),
                            start_block: current,
                            end_block: tentative_end,
                        });
                    }
                    debug!(
                        "{}: {} records with a window of {} blocks fill the page",
                        self.name,
                        records.len(),
                        window
                    );

                    window = self
                        .config
                        .window_attempts
                        .get(attempt)
                        .copied()
                        .unwrap_or(self.config.min_window);
                    tentative_end = current.saturating_add(window).min(end);
                    debug!(
                        "{}: shrinking window to {} blocks, new ending block: {}",
                        self.name, window, tentative_end
                    );

                    records = self.fetch(current, tentative_end, report).await?;
                    attempt += 1;
                }

                debug!(
                    "{}: retrieved {} records with a window of {} blocks",
                    self.name,
                    records.len(),
                    window
                );
                self.enqueue(records, report)?;
            } else {
                debug!(
                    "{}: no transfers for {} in blocks {}..={}",
                    self.name, self.address, current, tentative_end
                );
            }

            match tentative_end.checked_add(1) {
                Some(next) => current = next,
                None => break,
            }
        }

        Ok(())
    }

    async fn fetch(
        &self,
        start_block: u64,
        end_block: u64,
        report: &mut ProducerReport,
    ) -> Result<Vec<RawTransferRecord>> {
        let records = self
            .client
            .fetch(
                &self.address,
                start_block,
                end_block,
                SortOrder::Asc,
                &self.name,
            )
            .await?;
        report.api_calls += 1;
        Ok(records)
    }

    /// Overflowing pages thrown away by the shrink loop don't count as fetched.
    fn enqueue(&self, records: Vec<RawTransferRecord>, report: &mut ProducerReport) -> Result<()> {
        report.fetched += records.len() as u64;
        for record in records.into_iter().filter(RawTransferRecord::is_qualifying) {
            self.queue.push(record)?;
            report.enqueued += 1;
        }
        Ok(())
    }
}
