use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{EventBusError, EventEnvelope, EventLog, LogRecord, Offset, Result, Topic};

/// PostgreSQL-backed event log.
#[derive(Clone)]
pub struct PostgresEventLog {
    pool: PgPool,
}

impl PostgresEventLog {
    /// Creates a new PostgreSQL event log.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<LogRecord> {
        let topic: String = row.try_get("topic")?;
        let envelope: serde_json::Value = row.try_get("envelope")?;

        Ok(LogRecord {
            offset: Offset::new(row.try_get("log_offset")?),
            topic: topic.parse()?,
            key: row.try_get("message_key")?,
            envelope: serde_json::from_value(envelope)?,
            appended_at: row.try_get("appended_at")?,
        })
    }
}

#[async_trait]
impl EventLog for PostgresEventLog {
    async fn append(
        &self,
        topic: Topic,
        key: &str,
        envelope: &EventEnvelope,
    ) -> Result<LogRecord> {
        let envelope_json = serde_json::to_value(envelope)?;

        let row = sqlx::query(
            r#"
            INSERT INTO event_log (event_id, topic, message_key, event_type, envelope)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING log_offset, topic, message_key, envelope, appended_at
            "#,
        )
        .bind(envelope.event_id.as_uuid())
        .bind(topic.as_str())
        .bind(key)
        .bind(envelope.event_type.as_str())
        .bind(envelope_json)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_event_id")
            {
                return EventBusError::DuplicateEvent(envelope.event_id);
            }
            EventBusError::Database(e)
        })?;

        Self::row_to_record(row)
    }

    async fn read_after(&self, topic: Topic, after: Offset) -> Result<Vec<LogRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT log_offset, topic, message_key, envelope, appended_at
            FROM event_log
            WHERE topic = $1 AND log_offset > $2
            ORDER BY log_offset ASC
            "#,
        )
        .bind(topic.as_str())
        .bind(after.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn commit(
        &self,
        group: &str,
        topic: Topic,
        partition: u32,
        offset: Offset,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO consumer_offsets (group_id, topic, partition_no, committed_offset)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (group_id, topic, partition_no) DO UPDATE
            SET committed_offset = GREATEST(consumer_offsets.committed_offset, EXCLUDED.committed_offset),
                updated_at = NOW()
            "#,
        )
        .bind(group)
        .bind(topic.as_str())
        .bind(partition as i32)
        .bind(offset.as_i64())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn committed(&self, group: &str, topic: Topic, partition: u32) -> Result<Option<Offset>> {
        let committed: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT committed_offset FROM consumer_offsets
            WHERE group_id = $1 AND topic = $2 AND partition_no = $3
            "#,
        )
        .bind(group)
        .bind(topic.as_str())
        .bind(partition as i32)
        .fetch_optional(&self.pool)
        .await?;

        Ok(committed.map(Offset::new))
    }
}
