//! Consumer's database view (read-write operations).

use async_trait::async_trait;

use super::{NewTransaction, Transaction};
use crate::error::Result;

pub use self::repo_impl::{PostgresSession, PostgresStorage};

/// Hands out sessions. Shared by every consumer of a run.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    type Session: Session;

    /// Acquire a session that stays exclusive to the caller until dropped.
    async fn session(&self) -> Result<Self::Session>;
}

#[async_trait]
pub trait Session: Send + 'static {
    type Operations: StorageOperations;

    /// Execute some operations on the session's connection without creating a database transaction.
    async fn execute<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self::Operations) -> Result<R> + Send + 'static,
        R: Send + 'static;

    /// Execute some operations within a database transaction.
    /// Any error rolls the whole transaction back.
    async fn transaction<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self::Operations) -> Result<R> + Send + 'static,
        R: Send + 'static;
}

pub trait StorageOperations {
    fn find_address_id(&mut self, address: &str) -> Result<Option<i64>>;

    /// Fails with `Error::UniqueViolation` when the address already exists.
    fn insert_address(&mut self, address: &str) -> Result<i64>;

    /// Fails with `Error::UniqueViolation` on the first duplicate hash.
    fn insert_transactions(&mut self, transactions: &[NewTransaction]) -> Result<usize>;

    fn find_transaction_by_hash(&mut self, hash: &str) -> Result<Option<Transaction>>;

    fn count_transactions(&mut self) -> Result<i64>;
}

mod repo_impl {
    use async_trait::async_trait;
    use diesel::prelude::*;

    use super::{Session, Storage, StorageOperations};
    use crate::db::pool::{PgPool, PooledPgConnection};
    use crate::db::{NewTransaction, Transaction};
    use crate::error::Result;
    use crate::schema::{addresses, transactions};
    use wavesexchange_log::timer;

    // one transaction row binds 9 parameters, pg caps a statement at 65535
    const TX_CHUNK_SIZE: usize = 65535 / 9;

    /// Can be cloned freely, no need to wrap in `Arc`.
    #[derive(Clone)]
    pub struct PostgresStorage {
        pool: PgPool,
    }

    impl PostgresStorage {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl Storage for PostgresStorage {
        type Session = PostgresSession;

        async fn session(&self) -> Result<PostgresSession> {
            let conn = self.pool.get().await?;
            Ok(PostgresSession { conn })
        }
    }

    /// A pooled connection checked out for the lifetime of one worker.
    /// Dropping it returns the connection to the pool.
    pub struct PostgresSession {
        conn: PooledPgConnection,
    }

    #[async_trait]
    impl Session for PostgresSession {
        type Operations = PgConnection;

        async fn execute<F, R>(&mut self, f: F) -> Result<R>
        where
            F: FnOnce(&mut PgConnection) -> Result<R> + Send + 'static,
            R: Send + 'static,
        {
            self.conn.interact(|conn| f(conn)).await?
        }

        async fn transaction<F, R>(&mut self, f: F) -> Result<R>
        where
            F: FnOnce(&mut PgConnection) -> Result<R> + Send + 'static,
            R: Send + 'static,
        {
            self.conn
                .interact(|conn| conn.transaction(|conn| f(conn)))
                .await?
        }
    }

    impl StorageOperations for PgConnection {
        fn find_address_id(&mut self, address: &str) -> Result<Option<i64>> {
            timer!("find_address_id()", verbose);

            Ok(addresses::table
                .select(addresses::id)
                .filter(addresses::address.eq(address))
                .first(self)
                .optional()?)
        }

        fn insert_address(&mut self, address: &str) -> Result<i64> {
            timer!("insert_address()", verbose);

            Ok(diesel::insert_into(addresses::table)
                .values(addresses::address.eq(address))
                .returning(addresses::id)
                .get_result(self)?)
        }

        fn insert_transactions(&mut self, txs: &[NewTransaction]) -> Result<usize> {
            timer!("insert_transactions()", verbose);

            let mut inserted = 0;
            for chunk in txs.chunks(TX_CHUNK_SIZE) {
                inserted += diesel::insert_into(transactions::table)
                    .values(chunk)
                    .execute(self)?;
            }

            Ok(inserted)
        }

        fn find_transaction_by_hash(&mut self, tx_hash: &str) -> Result<Option<Transaction>> {
            timer!("find_transaction_by_hash()", verbose);

            Ok(transactions::table
                .filter(transactions::hash.eq(tx_hash))
                .first(self)
                .optional()?)
        }

        fn count_transactions(&mut self) -> Result<i64> {
            timer!("count_transactions()", verbose);

            Ok(transactions::table.count().get_result(self)?)
        }
    }
}
