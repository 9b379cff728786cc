//! Trade ledger: append-only record of closed positions.

use serde::Serialize;

use crate::domain::TradeRecord;

/// Records in emission order. Nothing is ever removed or rewritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeLedger {
    records: Vec<TradeRecord>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TradeRecord) {
        self.records.push(record);
    }

    pub fn extend<I: IntoIterator<Item = TradeRecord>>(&mut self, records: I) {
        self.records.extend(records);
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Index of the most recent record, if any.
    pub fn last_index(&self) -> Option<usize> {
        self.records.len().checked_sub(1)
    }

    pub fn into_records(self) -> Vec<TradeRecord> {
        self.records
    }

    /// BLAKE3 hex digest of the canonical JSON of every record.
    ///
    /// Two replays of identical inputs produce identical fingerprints.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let mut hasher = blake3::Hasher::new();
        serde_json::to_writer(&mut hasher, &self.records)?;
        Ok(hasher.finalize().to_hex().to_string())
    }
}
