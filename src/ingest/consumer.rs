use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use wavesexchange_log::{debug, error, info, warn};

use super::identity::resolve_or_create;
use super::queue::{Pop, QueueReceiver};
use crate::db::repo::{Session, Storage, StorageOperations};
use crate::db::NewTransaction;
use crate::error::{Error, Result};
use crate::metrics::{RECORDS_SKIPPED, TRANSACTIONS_DROPPED, TRANSACTIONS_SAVED};
use crate::models::RawTransferRecord;

lazy_static! {
    static ref CONFLICTING_HASH: Regex =
        Regex::new(r"\(hash\)=\((.*?)\)").expect("can't compile conflicting hash pattern");
}

/// What a flush does with a batch that hits an already stored hash.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Roll back and drop the whole batch.
    #[default]
    DropBatch,
    /// Roll back, take the conflicting record out and flush the rest again.
    ExcludeConflicting,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub batch_size: usize,
    pub pop_timeout: Duration,
    pub conflict_policy: ConflictPolicy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub saved: u64,
    pub dropped: u64,
    pub skipped: u64,
}

pub struct Consumer<S> {
    name: String,
    storage: Arc<S>,
    queue: QueueReceiver,
    config: Arc<Config>,
}

impl<S: Storage> Consumer<S> {
    pub fn new(id: usize, storage: Arc<S>, queue: QueueReceiver, config: Arc<Config>) -> Self {
        Self {
            name: format!("consumer_{}", id),
            storage,
            queue,
            config,
        }
    }

    /// Drains the queue until producers are done, flushing every `batch_size` records.
    ///
    /// The session is held for the whole run and released when this returns.
    pub async fn run(self) -> Result<ConsumerReport> {
        info!("{}: starting", self.name);
        let mut session = match self.storage.session().await {
            Ok(session) => session,
            Err(err) => {
                error!("{}: can't acquire a database session: {}", self.name, err);
                return Err(err);
            }
        };

        let mut batch = Vec::with_capacity(self.config.batch_size);
        // records of the current batch that couldn't be turned into rows
        let mut unresolved = 0;
        let mut report = ConsumerReport::default();

        loop {
            match self.queue.pop(self.config.pop_timeout).await {
                Pop::Record(record) => {
                    match self.to_transaction(&mut session, &record).await {
                        Ok(tx) => batch.push(tx),
                        Err(err) => {
                            warn!(
                                "{}: skipping transfer {}, its batch will be dropped: {}",
                                self.name, record.hash, err
                            );
                            RECORDS_SKIPPED.inc();
                            report.skipped += 1;
                            unresolved += 1;
                        }
                    }

                    if batch.len() + unresolved >= self.config.batch_size {
                        self.flush(&mut session, &mut batch, unresolved, &mut report)
                            .await;
                        unresolved = 0;
                        self.log_progress(&mut session).await;
                    }
                }
                Pop::Empty => {
                    debug!("{}: queue is empty, waiting for new transactions", self.name);
                }
                Pop::Drained => {
                    info!(
                        "{}: producers have finished, no more transactions are expected",
                        self.name
                    );
                    break;
                }
            }
        }

        if !batch.is_empty() || unresolved > 0 {
            let size = batch.len();
            self.flush(&mut session, &mut batch, unresolved, &mut report)
                .await;
            info!("{}: final batch of {} flushed", self.name, size);
        }

        drop(session);
        info!(
            "{}: session closed, saved {}, dropped {}, skipped {}",
            self.name, report.saved, report.dropped, report.skipped
        );

        Ok(report)
    }

    async fn to_transaction(
        &self,
        session: &mut S::Session,
        record: &RawTransferRecord,
    ) -> Result<NewTransaction> {
        let from_id = resolve_or_create(session, &record.from).await?;
        let to_id = if record.to == record.from {
            from_id
        } else {
            resolve_or_create(session, &record.to).await?
        };
        NewTransaction::from_record(record, from_id, to_id)
    }

    /// Persists the batch in one database transaction. The batch is empty afterwards
    /// whether it was saved or dropped.
    ///
    /// A batch with `unresolved` records is dropped without touching the database.
    async fn flush(
        &self,
        session: &mut S::Session,
        batch: &mut Vec<NewTransaction>,
        unresolved: usize,
        report: &mut ConsumerReport,
    ) {
        let mut pending = std::mem::take(batch);
        if unresolved > 0 {
            error!(
                "{}: {} record(s) of the batch could not be resolved",
                self.name, unresolved
            );
            self.drop_batch(pending, report);
            return;
        }
        debug!("{}: about to save {} records", self.name, pending.len());

        loop {
            let rows = pending.clone();
            let result = session
                .transaction(move |ops| ops.insert_transactions(&rows))
                .await;

            let detail = match result {
                Ok(saved) => {
                    TRANSACTIONS_SAVED.inc_by(saved as u64);
                    report.saved += saved as u64;
                    return;
                }
                Err(Error::UniqueViolation(detail)) => detail,
                Err(err) => {
                    error!(
                        "{}: unexpected error while inserting transactions: {}",
                        self.name, err
                    );
                    self.drop_batch(pending, report);
                    return;
                }
            };

            error!(
                "{}: duplicate key error while inserting transactions: {}",
                self.name, detail
            );
            let Some(hash) = conflicting_hash(&detail) else {
                self.drop_batch(pending, report);
                return;
            };

            let stored = self.report_conflict(session, &pending, &hash).await;

            if self.config.conflict_policy == ConflictPolicy::DropBatch {
                self.drop_batch(pending, report);
                return;
            }

            let before = pending.len();
            pending = exclude_conflicting(pending, &hash, stored);
            let excluded = before - pending.len();
            if excluded == 0 {
                self.drop_batch(pending, report);
                return;
            }
            warn!(
                "{}: retrying batch without {} record(s) of hash {}",
                self.name, excluded, hash
            );
            TRANSACTIONS_DROPPED.inc_by(excluded as u64);
            report.dropped += excluded as u64;
            if pending.is_empty() {
                return;
            }
        }
    }

    /// Logs both sides of a hash conflict and tells whether the hash is already stored.
    async fn report_conflict(
        &self,
        session: &mut S::Session,
        pending: &[NewTransaction],
        hash: &str,
    ) -> bool {
        error!("{}: conflict detected for hash: {}", self.name, hash);
        for tx in pending.iter().filter(|tx| tx.hash == hash) {
            error!("{}: conflicting transaction: {:?}", self.name, tx);
        }

        let owned = hash.to_owned();
        match session
            .execute(move |ops| ops.find_transaction_by_hash(&owned))
            .await
        {
            Ok(Some(existing)) => {
                error!(
                    "{}: existing transaction in database that caused the conflict: {:?}",
                    self.name, existing
                );
                true
            }
            Ok(None) => false,
            Err(err) => {
                error!(
                    "{}: can't load the stored transaction {}: {}",
                    self.name, hash, err
                );
                false
            }
        }
    }

    fn drop_batch(&self, pending: Vec<NewTransaction>, report: &mut ConsumerReport) {
        error!(
            "{}: batch rolled back, dropping {} transactions",
            self.name,
            pending.len()
        );
        TRANSACTIONS_DROPPED.inc_by(pending.len() as u64);
        report.dropped += pending.len() as u64;
    }

    async fn log_progress(&self, session: &mut S::Session) {
        match session.execute(|ops| ops.count_transactions()).await {
            Ok(total) => info!(
                "{}: batch saved, {} transactions stored in total",
                self.name, total
            ),
            Err(err) => warn!("{}: can't count stored transactions: {}", self.name, err),
        }
    }
}

/// Pulls the offending hash out of a unique violation detail such as
/// `Key (hash)=(0xabc) already exists.`
pub fn conflicting_hash(detail: &str) -> Option<String> {
    CONFLICTING_HASH
        .captures(detail)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}

/// Drops every record of `hash` when it is already stored, otherwise keeps its first occurrence.
fn exclude_conflicting(
    pending: Vec<NewTransaction>,
    hash: &str,
    stored: bool,
) -> Vec<NewTransaction> {
    let mut kept_first = stored;
    pending
        .into_iter()
        .filter(|tx| {
            if tx.hash != hash {
                return true;
            }
            if kept_first {
                return false;
            }
            kept_first = true;
            true
        })
        .collect()
}
