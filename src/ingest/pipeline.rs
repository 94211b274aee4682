use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use wavesexchange_log::{error, info};

use super::consumer::{self, Consumer, ConsumerReport};
use super::producer::{self, Producer, ProducerReport};
use super::queue::{self, QueueSender};
use super::ranges::BlockRanges;
use crate::db::repo::Storage;
use crate::error::{Error, Result};
use crate::ledger::{LedgerClient, Requester};
use crate::models::{BlockRange, SortOrder};

const COORDINATOR: &str = "coordinator";

/// Where the block span of a run comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpanOverride {
    /// First and last block with a record for the address, asked from the API.
    Discover,
    /// Starts at the first block with a record and covers `blocks` more.
    Capped { blocks: u64 },
    Fixed { start: u64, end: u64 },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub producers: usize,
    pub consumers: usize,
    /// Size of the block ranges handed to producers.
    pub range_step: u64,
    pub span: SpanOverride,
    pub producer: producer::Config,
    pub consumer: consumer::Config,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub span: Option<BlockRange>,
    pub ranges: u64,
    pub api_calls: u64,
    pub fetched: u64,
    pub enqueued: u64,
    pub saved: u64,
    pub dropped: u64,
    pub skipped: u64,
}

impl IngestSummary {
    fn add_producer(&mut self, report: ProducerReport) {
        self.api_calls += report.api_calls;
        self.fetched += report.fetched;
        self.enqueued += report.enqueued;
    }

    fn add_consumer(&mut self, report: ConsumerReport) {
        self.saved += report.saved;
        self.dropped += report.dropped;
        self.skipped += report.skipped;
    }
}

type ProducerHandle = JoinHandle<Result<ProducerReport>>;

/// Drives one ingestion run: M consumers draining the queue while a window
/// of N producers slides over the partitioned block span.
pub struct Pipeline<R, S> {
    client: Arc<LedgerClient<R>>,
    storage: Arc<S>,
    config: Config,
}

impl<R: Requester, S: Storage> Pipeline<R, S> {
    pub fn new(client: Arc<LedgerClient<R>>, storage: Arc<S>, config: Config) -> Self {
        assert!(config.producers > 0 && config.consumers > 0);
        Self {
            client,
            storage,
            config,
        }
    }

    /// Ingests every qualifying transfer of `address`.
    ///
    /// A failing producer tears the run down: the other producers are aborted,
    /// consumers flush what was already queued, and the producer's error is returned.
    pub async fn run(&self, address: &str) -> Result<IngestSummary> {
        let span = match self.block_span(address).await? {
            Some(span) => span,
            None => {
                info!("no transfers found for address {}, nothing to ingest", address);
                return Ok(IngestSummary::default());
            }
        };
        info!(
            "address {} starting block: {}, ending block: {} ({} blocks)",
            address,
            span.start,
            span.end,
            span.len()
        );

        let mut summary = IngestSummary {
            span: Some(span),
            ..Default::default()
        };

        let (queue_tx, queue_rx) = queue::new();
        let consumer_config = Arc::new(self.config.consumer.clone());
        let consumers = (0..self.config.consumers)
            .map(|id| {
                let consumer = Consumer::new(
                    id,
                    self.storage.clone(),
                    queue_rx.clone(),
                    consumer_config.clone(),
                );
                tokio::spawn(consumer.run())
            })
            .collect::<Vec<_>>();
        drop(queue_rx);

        let produced = self
            .run_producers(address, span, &queue_tx, &mut summary)
            .await;
        queue_tx.close();
        match &produced {
            Ok(()) => info!("all producers have finished producing"),
            Err(err) => error!("producers aborted, draining what was queued: {}", err),
        }

        for (id, consumer) in consumers.into_iter().enumerate() {
            match consumer.await {
                Ok(Ok(report)) => summary.add_consumer(report),
                Ok(Err(err)) => error!("consumer_{} stopped early: {}", id, err),
                Err(err) => error!("consumer_{} panicked: {}", id, err),
            }
        }
        info!(
            "consumers have finished processing all items: saved {}, dropped {}, skipped {}",
            summary.saved, summary.dropped, summary.skipped
        );

        produced.map(|_| summary)
    }

    async fn block_span(&self, address: &str) -> Result<Option<BlockRange>> {
        let (start, end) = match self.config.span {
            SpanOverride::Fixed { start, end } => return Ok(Some(BlockRange::new(start, end))),
            SpanOverride::Capped { blocks } => {
                let Some(start) = self
                    .client
                    .boundary_block(address, SortOrder::Asc, COORDINATOR)
                    .await?
                else {
                    return Ok(None);
                };
                info!("span capped at {} blocks", blocks);
                (start, start.saturating_add(blocks))
            }
            SpanOverride::Discover => {
                let Some(start) = self
                    .client
                    .boundary_block(address, SortOrder::Asc, COORDINATOR)
                    .await?
                else {
                    return Ok(None);
                };
                let end = self
                    .client
                    .boundary_block(address, SortOrder::Desc, COORDINATOR)
                    .await?
                    .unwrap_or(start);
                (start, end)
            }
        };

        Ok(Some(BlockRange::new(start, end.max(start))))
    }

    async fn run_producers(
        &self,
        address: &str,
        span: BlockRange,
        queue: &QueueSender,
        summary: &mut IngestSummary,
    ) -> Result<()> {
        let producer_config = Arc::new(self.config.producer.clone());
        let mut ranges = BlockRanges::new(span.start, span.end, self.config.range_step);
        let mut in_flight = FuturesUnordered::new();
        let mut next_id = 0;

        for range in ranges.by_ref().take(self.config.producers) {
            in_flight.push(self.spawn_producer(next_id, address, range, &producer_config, queue));
            next_id += 1;
            summary.ranges += 1;
        }

        while let Some(joined) = in_flight.next().await {
            let outcome = joined.map_err(Error::from).and_then(|produced| produced);
            let report = match outcome {
                Ok(report) => report,
                Err(err) => {
                    for handle in in_flight.iter() {
                        handle.abort();
                    }
                    // aborted producers release their queue handles once they are gone
                    while in_flight.next().await.is_some() {}
                    return Err(err);
                }
            };
            summary.add_producer(report);

            if let Some(range) = ranges.next() {
                in_flight.push(self.spawn_producer(next_id, address, range, &producer_config, queue));
                next_id += 1;
                summary.ranges += 1;
            }
        }

        Ok(())
    }

    fn spawn_producer(
        &self,
        id: usize,
        address: &str,
        range: BlockRange,
        config: &Arc<producer::Config>,
        queue: &QueueSender,
    ) -> ProducerHandle {
        let producer = Producer::new(
            id,
            address.to_owned(),
            range,
            self.client.clone(),
            config.clone(),
            queue.clone(),
        );
        tokio::spawn(producer.run())
    }
}
