//! Opportunity sinks: where emitted records are handed off

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::book::OpportunityBook;
use crate::error::{IntelligenceError, Result};
use crate::types::OpportunityRecord;

/// Consumer of opportunity records
#[async_trait]
pub trait OpportunitySink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, record: &OpportunityRecord) -> Result<()>;
}

/// Bounded hand-off to the execution stage; never blocks the dispatcher
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<OpportunityRecord>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<OpportunityRecord>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OpportunityRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl OpportunitySink for ChannelSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn publish(&self, record: &OpportunityRecord) -> Result<()> {
        self.tx
            .try_send(record.clone())
            .map_err(|e| IntelligenceError::sink(self.name(), e))
    }
}

/// Stores records in the opportunity book
#[derive(Debug, Clone)]
pub struct BookSink {
    book: Arc<OpportunityBook>,
}

impl BookSink {
    pub fn new(book: Arc<OpportunityBook>) -> Self {
        Self { book }
    }
}

#[async_trait]
impl OpportunitySink for BookSink {
    fn name(&self) -> &'static str {
        "book"
    }

    async fn publish(&self, record: &OpportunityRecord) -> Result<()> {
        self.book.insert(record.clone());
        Ok(())
    }
}

/// One structured log line per record
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait]
impl OpportunitySink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn publish(&self, record: &OpportunityRecord) -> Result<()> {
        info!(
            id = %record.id,
            kind = %record.kind,
            pools = ?record.pools,
            exchanges = ?record.exchanges,
            edge = record.edge,
            estimated_profit_usd = record.estimated_profit_usd,
            "Opportunity"
        );
        Ok(())
    }
}

/// Fan-out over every configured sink
#[derive(Clone, Default)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn OpportunitySink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl OpportunitySink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Publish every record to every sink; a failing sink does not stop the others.
    /// Returns the number of records emitted.
    pub async fn publish_all(&self, records: &[OpportunityRecord]) -> usize {
        for record in records {
            metrics::increment_counter!("opportunities_emitted_total", "kind" => record.kind.name());

            for sink in &self.sinks {
                if let Err(e) = sink.publish(record).await {
                    metrics::increment_counter!("sink_failures_total", "sink" => sink.name());
                    warn!(sink = sink.name(), id = %record.id, error = %e, "Sink rejected opportunity");
                }
            }
        }
        records.len()
    }
}

impl std::fmt::Debug for SinkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sinks.iter().map(|sink| sink.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OpportunityKind;
    use ethers::types::Address;

    fn record() -> OpportunityRecord {
        OpportunityRecord::new(
            OpportunityKind::Triangular,
            vec![Address::repeat_byte(1), Address::repeat_byte(2), Address::repeat_byte(3), Address::repeat_byte(1)],
            vec![Address::repeat_byte(0xa0), Address::repeat_byte(0xa1), Address::repeat_byte(0xa2)],
            vec!["uniswap".to_string(); 3],
            0.05,
            1_000.0,
        )
    }

    #[tokio::test]
    async fn test_full_channel_does_not_block_other_sinks() {
        let book = Arc::new(OpportunityBook::new());
        let (channel, mut rx) = ChannelSink::channel(1);
        let sinks = SinkSet::new()
            .with(channel)
            .with(BookSink::new(book.clone()))
            .with(LogSink);

        let records = vec![record(), record()];
        assert_eq!(sinks.publish_all(&records).await, 2);

        assert_eq!(book.len(), 2);
        assert_eq!(rx.recv().await.map(|r| r.id), Some(records[0].id));
        assert!(rx.try_recv().is_err());
    }
}
