use bigdecimal::{BigDecimal, Zero};
use serde::Deserialize;
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Inclusive span of block numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Saturates at `u64::MAX` for the full `0..=u64::MAX` span.
    pub fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// One transfer as the ledger API returns it, every field a string.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransferDto {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub contract_address: String,
    pub value: String,
    pub gas: String,
    pub gas_used: String,
    pub is_error: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawTransferRecord {
    pub block_number: u64,
    pub timestamp: i64,
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: BigDecimal,
    pub gas: u64,
    pub gas_used: u64,
    pub is_error: bool,
}

impl RawTransferRecord {
    /// Only successful transfers that move value are ingested.
    pub fn is_qualifying(&self) -> bool {
        !self.is_error && self.value > BigDecimal::zero()
    }
}

impl TryFrom<RawTransferDto> for RawTransferRecord {
    type Error = Error;

    fn try_from(dto: RawTransferDto) -> Result<Self, Self::Error> {
        let hash = dto.hash;
        if hash.is_empty() {
            return Err(Error::InvalidRecord("record without hash".into()));
        }

        // contract creations carry the new contract instead of a recipient
        let to = if dto.to.is_empty() {
            dto.contract_address
        } else {
            dto.to
        };
        if dto.from.is_empty() || to.is_empty() {
            return Err(Error::InvalidRecord(format!(
                "record {} is missing a participant",
                hash
            )));
        }

        let is_error = match dto.is_error.as_str() {
            "0" => false,
            "1" => true,
            other => {
                return Err(Error::InvalidRecord(format!(
                    "isError {:?} of {}",
                    other, hash
                )))
            }
        };

        let value = BigDecimal::from_str(&dto.value).map_err(|_| {
            Error::InvalidRecord(format!("value {:?} of {}", dto.value, hash))
        })?;

        Ok(Self {
            block_number: parse_number(&dto.block_number, "blockNumber", &hash)?,
            timestamp: parse_number(&dto.time_stamp, "timeStamp", &hash)?,
            from: dto.from.to_lowercase(),
            to: to.to_lowercase(),
            value,
            gas: parse_number(&dto.gas, "gas", &hash)?,
            gas_used: parse_number(&dto.gas_used, "gasUsed", &hash)?,
            is_error,
            hash,
        })
    }
}

fn parse_number<T: FromStr>(raw: &str, field: &str, hash: &str) -> Result<T, Error> {
    raw.parse()
        .map_err(|_| Error::InvalidRecord(format!("{} {:?} of {}", field, raw, hash)))
}

#[cfg(test)]
pub mod tests {
    use super::{BlockRange, RawTransferDto, RawTransferRecord};
    use bigdecimal::BigDecimal;
    use std::convert::TryFrom;
    use std::str::FromStr;

    pub fn record(
        hash: &str,
        block_number: u64,
        from: &str,
        to: &str,
        value: &str,
        is_error: bool,
    ) -> RawTransferRecord {
        RawTransferRecord {
            block_number,
            timestamp: 1_600_000_000 + block_number as i64,
            hash: hash.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            value: BigDecimal::from_str(value).unwrap(),
            gas: 2300,
            gas_used: 0,
            is_error,
        }
    }

    fn dto(value: &str, is_error: &str) -> RawTransferDto {
        serde_json::from_value(serde_json::json!({
            "blockNumber": "14000000",
            "timeStamp": "1642000000",
            "hash": "0xdead",
            "from": "0xAbC",
            "to": "0xdef",
            "value": value,
            "contractAddress": "",
            "input": "",
            "type": "call",
            "gas": "2300",
            "gasUsed": "0",
            "traceId": "0_1",
            "isError": is_error,
            "errCode": ""
        }))
        .unwrap()
    }

    #[test]
    fn block_range_len_covers_whole_chain() {
        assert_eq!(BlockRange::new(7, 7).len(), 1);
        assert_eq!(BlockRange::new(100, 199).len(), 100);
        assert_eq!(BlockRange::new(0, u64::MAX).len(), u64::MAX);
        assert_eq!(BlockRange::new(0, u64::MAX).to_string(), format!("0..={}", u64::MAX));
    }

    #[test]
    fn parses_api_record() {
        let rec = RawTransferRecord::try_from(dto("1000000000000000000000000", "0")).unwrap();

        assert_eq!(rec.block_number, 14_000_000);
        assert_eq!(rec.timestamp, 1_642_000_000);
        assert_eq!(rec.from, "0xabc");
        assert_eq!(rec.to, "0xdef");
        assert_eq!(rec.value.to_string(), "1000000000000000000000000");
        assert!(!rec.is_error);
        assert!(rec.is_qualifying());
    }

    #[test]
    fn contract_creation_uses_contract_address() {
        let mut raw = dto("5", "0");
        raw.to = String::new();
        raw.contract_address = "0xNEW".to_string();

        let rec = RawTransferRecord::try_from(raw).unwrap();
        assert_eq!(rec.to, "0xnew");
    }

    #[test]
    fn rejects_malformed_fields() {
        assert!(RawTransferRecord::try_from(dto("abc", "0")).is_err());
        assert!(RawTransferRecord::try_from(dto("1", "2")).is_err());

        let mut raw = dto("1", "0");
        raw.block_number = "-1".to_string();
        assert!(RawTransferRecord::try_from(raw).is_err());
    }

    #[test]
    fn filters_zero_value_and_failed_transfers() {
        assert!(!record("0x1", 1, "0xa", "0xb", "0", false).is_qualifying());
        assert!(!record("0x2", 1, "0xa", "0xb", "10", true).is_qualifying());
        assert!(!record("0x3", 1, "0xa", "0xb", "0", true).is_qualifying());
        assert!(record("0x4", 1, "0xa", "0xb", "1", false).is_qualifying());
    }

    #[test]
    fn block_range_len() {
        assert_eq!(BlockRange::new(100, 199).len(), 100);
        assert_eq!(BlockRange::new(5, 5).len(), 1);
        assert_eq!(BlockRange::new(100, 250).to_string(), "100..=250");
    }
}
