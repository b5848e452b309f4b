//! In-memory opportunity book
//!
//! Holds emitted records until the execution stage resolves them by id or
//! the retention window expires.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::types::OpportunityRecord;

#[derive(Debug, Default)]
pub struct OpportunityBook {
    records: DashMap<Uuid, OpportunityRecord>,
}

impl OpportunityBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: OpportunityRecord) {
        self.records.insert(record.id, record);
    }

    /// Resolve a record (trade executed or abandoned)
    pub fn remove(&self, id: &Uuid) -> Option<OpportunityRecord> {
        self.records.remove(id).map(|(_, record)| record)
    }

    pub fn get(&self, id: &Uuid) -> Option<OpportunityRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    /// Drop records detected before `cutoff`; returns how many were removed
    pub fn prune(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.detected_at >= cutoff);
        before.saturating_sub(self.records.len())
    }

    /// All records, most profitable first
    pub fn snapshot(&self) -> Vec<OpportunityRecord> {
        let mut records: Vec<_> = self.records.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by(|a, b| b.estimated_profit_usd.total_cmp(&a.estimated_profit_usd));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OpportunityKind;
    use ethers::types::Address;

    fn record(edge: f64) -> OpportunityRecord {
        OpportunityRecord::new(
            OpportunityKind::Direct,
            vec![Address::repeat_byte(1), Address::repeat_byte(2), Address::repeat_byte(1)],
            vec![Address::repeat_byte(0xa0), Address::repeat_byte(0xa1)],
            vec!["uniswap".to_string(), "sushiswap".to_string()],
            edge,
            1_000.0,
        )
    }

    #[test]
    fn test_remove_by_id() {
        let book = OpportunityBook::new();
        let kept = record(0.01);
        let resolved = record(0.02);
        book.insert(kept.clone());
        book.insert(resolved.clone());

        assert_eq!(book.remove(&resolved.id).map(|r| r.id), Some(resolved.id));
        assert!(book.remove(&resolved.id).is_none());
        assert_eq!(book.len(), 1);
        assert_eq!(book.get(&kept.id), Some(kept));
    }

    #[test]
    fn test_prune_drops_old_records() {
        let book = OpportunityBook::new();
        let mut old = record(0.01);
        old.detected_at = Utc::now() - chrono::Duration::seconds(600);
        book.insert(old);
        book.insert(record(0.02));

        assert_eq!(book.prune(Utc::now() - chrono::Duration::seconds(300)), 1);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_snapshot_ordering() {
        let book = OpportunityBook::new();
        book.insert(record(0.01));
        book.insert(record(0.03));
        book.insert(record(0.02));

        let edges: Vec<f64> = book.snapshot().iter().map(|r| r.edge).collect();
        assert_eq!(edges, vec![0.03, 0.02, 0.01]);
    }
}
