use lazy_static::lazy_static;
use prometheus::{IntCounter, IntGauge, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref API_CALLS: IntCounter =
        IntCounter::new("LedgerApiCalls", "Ledger API requests issued")
            .expect("can't create api_calls metrics");
    pub static ref RATE_LIMITED_CALLS: IntCounter = IntCounter::new(
        "LedgerApiRateLimited",
        "Ledger API requests answered with the rate-limit body"
    )
    .expect("can't create rate_limited_calls metrics");
    pub static ref QUEUE_SIZE: IntGauge =
        IntGauge::new("TransfersQueueSize", "Records waiting for a consumer")
            .expect("can't create queue_size metrics");
    pub static ref TRANSACTIONS_SAVED: IntCounter =
        IntCounter::new("TransactionsSaved", "Transactions committed to the store")
            .expect("can't create transactions_saved metrics");
    pub static ref TRANSACTIONS_DROPPED: IntCounter = IntCounter::new(
        "TransactionsDropped",
        "Transactions lost with a rolled back batch"
    )
    .expect("can't create transactions_dropped metrics");
    pub static ref RECORDS_SKIPPED: IntCounter = IntCounter::new(
        "RecordsSkipped",
        "Records skipped because a participant could not be resolved"
    )
    .expect("can't create records_skipped metrics");
}

pub fn register_metrics() {
    REGISTRY
        .register(Box::new(API_CALLS.clone()))
        .expect("can't register api_calls metrics");

    REGISTRY
        .register(Box::new(RATE_LIMITED_CALLS.clone()))
        .expect("can't register rate_limited_calls metrics");

    REGISTRY
        .register(Box::new(QUEUE_SIZE.clone()))
        .expect("can't register queue_size metrics");

    REGISTRY
        .register(Box::new(TRANSACTIONS_SAVED.clone()))
        .expect("can't register transactions_saved metrics");

    REGISTRY
        .register(Box::new(TRANSACTIONS_DROPPED.clone()))
        .expect("can't register transactions_dropped metrics");

    REGISTRY
        .register(Box::new(RECORDS_SKIPPED.clone()))
        .expect("can't register records_skipped metrics");
}
