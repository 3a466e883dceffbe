use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{EventBusError, EventEnvelope, EventId, EventLog, LogRecord, Offset, Result, Topic};

#[derive(Debug, Default)]
struct LogState {
    records: Vec<LogRecord>,
    event_ids: HashSet<EventId>,
    offsets: HashMap<(String, Topic, u32), Offset>,
    last_offset: Offset,
}

/// In-memory event log.
///
/// Provides the same interface as the PostgreSQL implementation; used by
/// tests and by the binary when no database is configured.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventLog {
    state: Arc<RwLock<LogState>>,
}

impl InMemoryEventLog {
    /// Creates a new empty in-memory log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Returns every record on a topic.
    pub async fn records(&self, topic: Topic) -> Vec<LogRecord> {
        self.state
            .read()
            .await
            .records
            .iter()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect()
    }

    /// Clears all records and committed offsets.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = LogState::default();
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(
        &self,
        topic: Topic,
        key: &str,
        envelope: &EventEnvelope,
    ) -> Result<LogRecord> {
        let mut state = self.state.write().await;

        if !state.event_ids.insert(envelope.event_id) {
            return Err(EventBusError::DuplicateEvent(envelope.event_id));
        }

        state.last_offset = state.last_offset.next();
        let record = LogRecord {
            offset: state.last_offset,
            topic,
            key: key.to_string(),
            envelope: envelope.clone(),
            appended_at: Utc::now(),
        };
        state.records.push(record.clone());
        Ok(record)
    }

    async fn read_after(&self, topic: Topic, after: Offset) -> Result<Vec<LogRecord>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .filter(|r| r.topic == topic && r.offset > after)
            .cloned()
            .collect())
    }

    async fn commit(
        &self,
        group: &str,
        topic: Topic,
        partition: u32,
        offset: Offset,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .offsets
            .entry((group.to_string(), topic, partition))
            .or_insert(offset);
        if offset > *entry {
            *entry = offset;
        }
        Ok(())
    }

    async fn committed(&self, group: &str, topic: Topic, partition: u32) -> Result<Option<Offset>> {
        let state = self.state.read().await;
        Ok(state
            .offsets
            .get(&(group.to_string(), topic, partition))
            .copied())
    }
}
