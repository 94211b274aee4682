use bigdecimal::BigDecimal;
use chrono::{DateTime, TimeZone, Utc};
use diesel::{Insertable, Queryable};

use crate::error::{Error, Result};
use crate::models::RawTransferRecord;
use crate::schema::transactions;

pub mod pool;
pub mod repo;
#[cfg(test)]
pub mod test_resources;

#[derive(Clone, Debug, PartialEq, Eq, Insertable)]
#[diesel(table_name = transactions)]
pub struct NewTransaction {
    pub block_number: i64,
    pub time_stamp: DateTime<Utc>,
    pub hash: String,
    pub from_address_id: i64,
    pub to_address_id: i64,
    pub value: BigDecimal,
    pub gas: i64,
    pub gas_used: i64,
    pub is_error: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Queryable)]
pub struct Transaction {
    pub id: i64,
    pub block_number: i64,
    pub time_stamp: DateTime<Utc>,
    pub hash: String,
    pub from_address_id: i64,
    pub to_address_id: i64,
    pub value: BigDecimal,
    pub gas: i64,
    pub gas_used: i64,
    pub is_error: bool,
}

impl NewTransaction {
    /// Builds the row for a record whose participants are already resolved.
    pub fn from_record(
        record: &RawTransferRecord,
        from_address_id: i64,
        to_address_id: i64,
    ) -> Result<Self> {
        let time_stamp = Utc
            .timestamp_opt(record.timestamp, 0)
            .single()
            .ok_or_else(|| {
                Error::InvalidRecord(format!(
                    "timestamp {} of {} is out of range",
                    record.timestamp, record.hash
                ))
            })?;

        Ok(Self {
            block_number: to_i64(record.block_number, "blockNumber", &record.hash)?,
            time_stamp,
            hash: record.hash.clone(),
            from_address_id,
            to_address_id,
            value: record.value.clone(),
            gas: to_i64(record.gas, "gas", &record.hash)?,
            gas_used: to_i64(record.gas_used, "gasUsed", &record.hash)?,
            is_error: record.is_error,
        })
    }
}

fn to_i64(value: u64, field: &str, hash: &str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| Error::InvalidRecord(format!("{} {} of {} overflows i64", field, value, hash)))
}
