use diesel::result::DatabaseErrorKind;

pub type Result<T> = std::result::Result<T, Error>;

#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("ConfigLoadError: {0}")]
    ConfigLoadError(#[from] envy::Error),
    #[error("InvalidConfig: {0}")]
    InvalidConfig(String),
    #[error("JoinError: {0}")]
    JoinError(#[from] tokio::task::JoinError),
    #[error("PgPoolCreateError: {0}")]
    PgPoolCreateError(#[from] crate::db::pool::PgPoolCreateError),
    #[error("PgPoolRuntimeError: {0}")]
    PgPoolRuntimeError(#[from] crate::db::pool::PgPoolRuntimeError),
    #[error("PgPoolSyncCallError: {0}")]
    PgPoolSyncCallError(#[from] crate::db::pool::PgPoolSyncCallError),
    #[error("DbError: {0}")]
    DbError(diesel::result::Error),
    #[error("UniqueViolation: {0}")]
    UniqueViolation(String),
    #[error("SerdeJsonError: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("ReqwestError: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("UrlParseError: {0}")]
    UrlParseError(#[from] url::ParseError),
    #[error("ApiError: {0}")]
    ApiError(String),
    #[error("InvalidRecord: {0}")]
    InvalidRecord(String),
    #[error("RateLimitExhausted: {caller} gave up on blocks {start_block}..={end_block}")]
    RateLimitExhausted {
        caller: String,
        start_block: u64,
        end_block: u64,
    },
    #[error("WindowOverflow: {caller} still hits the page limit at blocks {start_block}..={end_block}")]
    WindowOverflow {
        caller: String,
        start_block: u64,
        end_block: u64,
    },
    #[error("ResolutionFailed: {0}")]
    ResolutionFailed(String),
    #[error("QueueClosed")]
    QueueClosed,
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                let detail = info
                    .details()
                    .map(ToOwned::to_owned)
                    .unwrap_or_else(|| info.message().to_owned());
                Error::UniqueViolation(detail)
            }
            other => Error::DbError(other),
        }
    }
}

impl Error {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Error::UniqueViolation(_))
    }
}
