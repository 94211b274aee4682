use async_trait::async_trait;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::repo::{Session, Storage, StorageOperations};
use super::{NewTransaction, Transaction};
use crate::error::{Error, Result};

#[derive(Clone, Debug, Default)]
pub struct MemoryState {
    addresses: Vec<String>,
    transactions: Vec<Transaction>,
    hidden_once: HashSet<String>,
    broken_addresses: HashSet<String>,
    fail_inserts: bool,
}

impl MemoryState {
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn address_of(&self, id: i64) -> Option<&str> {
        self.addresses.get((id - 1) as usize).map(String::as_str)
    }
}

impl MemoryState {
    fn check_address(&self, address: &str) -> Result<()> {
        if self.broken_addresses.contains(address) {
            return Err(DieselError::DatabaseError(
                DatabaseErrorKind::Unknown,
                Box::new(format!("could not read address {}", address)),
            )
            .into());
        }
        Ok(())
    }
}

impl StorageOperations for MemoryState {
    fn find_address_id(&mut self, address: &str) -> Result<Option<i64>> {
        self.check_address(address)?;
        // another writer committed it, but this reader hasn't seen it yet
        if self.hidden_once.remove(address) {
            return Ok(None);
        }
        Ok(self
            .addresses
            .iter()
            .position(|a| a == address)
            .map(|idx| idx as i64 + 1))
    }

    fn insert_address(&mut self, address: &str) -> Result<i64> {
        self.check_address(address)?;
        if self.addresses.iter().any(|a| a == address) {
            return Err(Error::UniqueViolation(format!(
                "Key (address)=({}) already exists.",
                address
            )));
        }
        self.addresses.push(address.to_owned());
        Ok(self.addresses.len() as i64)
    }

    fn insert_transactions(&mut self, txs: &[NewTransaction]) -> Result<usize> {
        if self.fail_inserts {
            return Err(DieselError::DatabaseError(
                DatabaseErrorKind::SerializationFailure,
                Box::new("could not serialize access".to_string()),
            )
            .into());
        }
        for tx in txs {
            if self.transactions.iter().any(|t| t.hash == tx.hash) {
                return Err(Error::UniqueViolation(format!(
                    "Key (hash)=({}) already exists.",
                    tx.hash
                )));
            }
            for id in [tx.from_address_id, tx.to_address_id] {
                if id < 1 || id as usize > self.addresses.len() {
                    return Err(DieselError::DatabaseError(
                        DatabaseErrorKind::ForeignKeyViolation,
                        Box::new(format!("Key (id)=({}) is not present.", id)),
                    )
                    .into());
                }
            }
            let id = self.transactions.len() as i64 + 1;
            self.transactions.push(Transaction {
                id,
                block_number: tx.block_number,
                time_stamp: tx.time_stamp,
                hash: tx.hash.clone(),
                from_address_id: tx.from_address_id,
                to_address_id: tx.to_address_id,
                value: tx.value.clone(),
                gas: tx.gas,
                gas_used: tx.gas_used,
                is_error: tx.is_error,
            });
        }
        Ok(txs.len())
    }

    fn find_transaction_by_hash(&mut self, hash: &str) -> Result<Option<Transaction>> {
        Ok(self.transactions.iter().find(|t| t.hash == hash).cloned())
    }

    fn count_transactions(&mut self) -> Result<i64> {
        Ok(self.transactions.len() as i64)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<MemoryState>>,
    open_sessions: Arc<AtomicUsize>,
    opened_sessions: Arc<AtomicUsize>,
}

impl InMemoryStorage {
    pub fn snapshot(&self) -> MemoryState {
        self.state.lock().unwrap().clone()
    }

    /// Stores `address` as if a concurrent writer inserted it right after the next lookup missed it.
    pub fn race_on_address(&self, address: &str) {
        let mut state = self.state.lock().unwrap();
        state.addresses.push(address.to_owned());
        state.hidden_once.insert(address.to_owned());
    }

    /// Every lookup or insert of `address` fails with a non-unique database error.
    pub fn break_address(&self, address: &str) {
        self.state
            .lock()
            .unwrap()
            .broken_addresses
            .insert(address.to_owned());
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.state.lock().unwrap().fail_inserts = fail;
    }

    pub fn seed_transaction(&self, tx: NewTransaction) {
        self.state
            .lock()
            .unwrap()
            .insert_transactions(&[tx])
            .unwrap();
    }

    pub fn seed_address(&self, address: &str) -> i64 {
        self.state.lock().unwrap().insert_address(address).unwrap()
    }

    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    pub fn opened_sessions(&self) -> usize {
        self.opened_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    type Session = InMemorySession;

    async fn session(&self) -> Result<InMemorySession> {
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.opened_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(InMemorySession {
            state: self.state.clone(),
            open_sessions: self.open_sessions.clone(),
        })
    }
}

pub struct InMemorySession {
    state: Arc<Mutex<MemoryState>>,
    open_sessions: Arc<AtomicUsize>,
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Session for InMemorySession {
    type Operations = MemoryState;

    async fn execute<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut MemoryState) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let mut state = self.state.lock().unwrap();
        f(&mut *state)
    }

    async fn transaction<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut MemoryState) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let mut state = self.state.lock().unwrap();
        let mut working = state.clone();
        let result = f(&mut working)?;
        *state = working;
        Ok(result)
    }
}
