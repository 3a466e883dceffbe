use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EventEnvelope, Result, Topic};

/// Position of a record in the log.
///
/// Offsets are assigned by the log on append and grow monotonically across
/// all topics; within a topic they give the publish order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Offset(i64);

impl Offset {
    /// Creates an offset from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The position before the first record.
    pub fn start() -> Self {
        Self(0)
    }

    /// Returns the next offset.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw offset value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An envelope as stored in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub offset: Offset,
    pub topic: Topic,
    pub key: String,
    pub envelope: EventEnvelope,
    pub appended_at: DateTime<Utc>,
}

/// Maps a message key onto one of `partitions` partitions.
///
/// Uses FNV-1a so that the mapping is stable across processes, which keeps
/// committed offsets meaningful after a restart.
pub fn partition_for(key: &str, partitions: usize) -> usize {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let hash = key.bytes().fold(FNV_OFFSET, |acc, byte| {
        (acc ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    });
    (hash % partitions.max(1) as u64) as usize
}

/// Durable, append-only storage behind the bus.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Appends an envelope to a topic and returns the stored record.
    ///
    /// Fails with `DuplicateEvent` if the envelope's event id was already
    /// appended.
    async fn append(&self, topic: Topic, key: &str, envelope: &EventEnvelope)
    -> Result<LogRecord>;

    /// Returns all records of a topic with an offset strictly greater than
    /// `after`, in offset order.
    async fn read_after(&self, topic: Topic, after: Offset) -> Result<Vec<LogRecord>>;

    /// Records that a consumer group has processed a partition up to `offset`.
    ///
    /// Commits never move backwards.
    async fn commit(&self, group: &str, topic: Topic, partition: u32, offset: Offset)
    -> Result<()>;

    /// Last committed offset for a consumer group's partition.
    async fn committed(&self, group: &str, topic: Topic, partition: u32) -> Result<Option<Offset>>;
}
