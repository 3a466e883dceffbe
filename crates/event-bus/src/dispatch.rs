//! Log-backed event bus with consumer groups.
//!
//! ```text
//! publish ──► command queue ──► dispatcher ──► log.append
//!                                    │
//!                                    ├──► group A: partition 0 | 1 | 2 (one worker each)
//!                                    └──► group B: partition 0 | 1 | 2
//! ```
//!
//! A single dispatcher task appends in publish order and routes each record to
//! one partition worker per group, chosen from the message key. A worker runs
//! its records one at a time, so a key is never handled twice concurrently
//! within a group while different keys proceed in parallel.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{Mutex, Notify, mpsc, oneshot};
use tracing::Instrument;

use crate::{
    BusConfig, DeadLetter, EventBus, EventBusError, EventEnvelope, EventHandler, EventLog,
    HandlerError, LogRecord, Offset, Result, Topic, partition_for,
};

enum Command {
    Publish {
        topic: Topic,
        key: String,
        envelope: EventEnvelope,
    },
    Subscribe {
        topic: Topic,
        group: String,
        handler: Arc<dyn EventHandler>,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Counts messages that are queued, being appended, or being handled.
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn begin(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn end(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.current() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// The most recent dead letters, plus a count of all of them.
#[derive(Debug, Default)]
struct DeadLetterLog {
    recent: VecDeque<DeadLetter>,
    total: u64,
}

impl DeadLetterLog {
    fn push(&mut self, letter: DeadLetter, capacity: usize) {
        self.total += 1;
        if capacity == 0 {
            return;
        }
        while self.recent.len() >= capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(letter);
    }
}

#[derive(Debug)]
struct Shared {
    config: BusConfig,
    in_flight: InFlight,
    dead_letters: Mutex<DeadLetterLog>,
}

/// Event bus backed by an [`EventLog`].
///
/// Cheap to clone; clones share the dispatcher. The dispatcher stops once
/// every clone has been dropped.
#[derive(Clone)]
pub struct LogEventBus {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl LogEventBus {
    /// Starts the dispatcher task on the current Tokio runtime.
    pub fn start<L: EventLog + 'static>(log: L, config: BusConfig) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            config,
            in_flight: InFlight::default(),
            dead_letters: Mutex::new(DeadLetterLog::default()),
        });

        let dispatcher = Dispatcher {
            log: Arc::new(log),
            shared: shared.clone(),
            groups: HashMap::new(),
        };
        tokio::spawn(dispatcher.run(receiver));

        Self { commands, shared }
    }

    /// Returns the dispatcher configuration.
    pub fn config(&self) -> &BusConfig {
        &self.shared.config
    }

    /// Waits until every published message, including messages published by
    /// handlers in reaction, has been handled or dead-lettered.
    pub async fn wait_idle(&self) {
        self.shared.in_flight.wait_idle().await;
    }

    /// Number of messages not yet fully processed.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.current()
    }

    /// The most recent messages that exhausted their retries, oldest first.
    ///
    /// At most `dead_letter_capacity` are kept.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.shared
            .dead_letters
            .lock()
            .await
            .recent
            .iter()
            .cloned()
            .collect()
    }

    /// Number of messages dead-lettered since the bus started.
    pub async fn dead_letter_count(&self) -> u64 {
        self.shared.dead_letters.lock().await.total
    }
}

#[async_trait]
impl EventBus for LogEventBus {
    fn publish(&self, topic: Topic, key: &str, envelope: EventEnvelope) {
        tracing::debug!(%topic, key, event_type = %envelope.event_type, "publishing event");
        metrics::counter!("event_bus_published_total", "topic" => topic.as_str()).increment(1);

        self.shared.in_flight.begin();
        let command = Command::Publish {
            topic,
            key: key.to_string(),
            envelope,
        };
        if self.commands.send(command).is_err() {
            self.shared.in_flight.end();
            metrics::counter!("event_bus_publish_failures_total").increment(1);
            tracing::error!(%topic, key, "event bus closed, event dropped");
        }
    }

    async fn subscribe(
        &self,
        topic: Topic,
        group: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Subscribe {
                topic,
                group: group.to_string(),
                handler,
                reply,
            })
            .map_err(|_| EventBusError::Closed)?;
        response.await.map_err(|_| EventBusError::Closed)?
    }
}

struct GroupHandle {
    name: String,
    partitions: Vec<mpsc::UnboundedSender<LogRecord>>,
}

fn route(shared: &Shared, group: &GroupHandle, record: LogRecord) {
    let partition = partition_for(&record.key, group.partitions.len());
    shared.in_flight.begin();
    if group.partitions[partition].send(record).is_err() {
        shared.in_flight.end();
        tracing::error!(group = %group.name, partition, "consumer worker stopped, message dropped");
    }
}

struct Dispatcher {
    log: Arc<dyn EventLog>,
    shared: Arc<Shared>,
    groups: HashMap<Topic, Vec<GroupHandle>>,
}

impl Dispatcher {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Publish {
                    topic,
                    key,
                    envelope,
                } => {
                    self.append_and_route(topic, &key, &envelope).await;
                    self.shared.in_flight.end();
                }
                Command::Subscribe {
                    topic,
                    group,
                    handler,
                    reply,
                } => {
                    let result = self.register(topic, group, handler).await;
                    let _ = reply.send(result);
                }
            }
        }
        tracing::debug!("event bus dispatcher stopped");
    }

    async fn append_and_route(&self, topic: Topic, key: &str, envelope: &EventEnvelope) {
        let record = match self.log.append(topic, key, envelope).await {
            Ok(record) => record,
            Err(err) => {
                metrics::counter!("event_bus_publish_failures_total").increment(1);
                tracing::error!(
                    %topic,
                    key,
                    event_type = %envelope.event_type,
                    error = %err,
                    "failed to append event to log"
                );
                return;
            }
        };

        if let Some(groups) = self.groups.get(&topic) {
            for group in groups {
                route(&self.shared, group, record.clone());
            }
        }
    }

    async fn register(
        &mut self,
        topic: Topic,
        group: String,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        if self
            .groups
            .get(&topic)
            .is_some_and(|groups| groups.iter().any(|g| g.name == group))
        {
            return Err(EventBusError::DuplicateSubscription { topic, group });
        }

        let partitions = self.shared.config.concurrency.max(1);
        let mut committed = Vec::with_capacity(partitions);
        for partition in 0..partitions {
            let offset = self
                .log
                .committed(&group, topic, partition as u32)
                .await?
                .unwrap_or(Offset::start());
            committed.push(offset);
        }
        let replay_from = committed.iter().min().copied().unwrap_or(Offset::start());
        let backlog = self.log.read_after(topic, replay_from).await?;

        let mut senders = Vec::with_capacity(partitions);
        for partition in 0..partitions {
            let (sender, receiver) = mpsc::unbounded_channel();
            let worker = Worker {
                topic,
                group: group.clone(),
                partition: partition as u32,
                handler: handler.clone(),
                log: self.log.clone(),
                shared: self.shared.clone(),
            };
            tokio::spawn(worker.run(receiver));
            senders.push(sender);
        }
        let handle = GroupHandle {
            name: group.clone(),
            partitions: senders,
        };

        let mut replayed = 0usize;
        for record in backlog {
            let partition = partition_for(&record.key, partitions);
            if record.offset > committed[partition] {
                route(&self.shared, &handle, record);
                replayed += 1;
            }
        }

        tracing::info!(
            %topic,
            %group,
            handler = handler.name(),
            partitions,
            replayed,
            "consumer group subscribed"
        );
        self.groups.entry(topic).or_default().push(handle);
        Ok(())
    }
}

struct Worker {
    topic: Topic,
    group: String,
    partition: u32,
    handler: Arc<dyn EventHandler>,
    log: Arc<dyn EventLog>,
    shared: Arc<Shared>,
}

impl Worker {
    async fn run(self, mut records: mpsc::UnboundedReceiver<LogRecord>) {
        while let Some(record) = records.recv().await {
            let span = tracing::info_span!(
                "consume",
                topic = %self.topic,
                group = %self.group,
                partition = self.partition,
                offset = %record.offset,
                event_type = %record.envelope.event_type,
                order_id = %record.envelope.order_id,
            );
            self.process(&record).instrument(span).await;

            if let Err(err) = self
                .log
                .commit(&self.group, self.topic, self.partition, record.offset)
                .await
            {
                tracing::warn!(group = %self.group, offset = %record.offset, error = %err, "failed to commit offset");
            }
            self.shared.in_flight.end();
        }
    }

    async fn process(&self, record: &LogRecord) {
        let policy = &self.shared.config.retry;
        let mut attempt = 1;

        loop {
            let outcome = AssertUnwindSafe(self.handler.handle(&record.envelope))
                .catch_unwind()
                .await;

            let error = match outcome {
                Ok(Ok(())) => {
                    metrics::counter!(
                        "event_bus_handled_total",
                        "topic" => self.topic.as_str(),
                        "group" => self.group.clone()
                    )
                    .increment(1);
                    return;
                }
                Ok(Err(err)) => err,
                Err(panic) => HandlerError::Permanent(format!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };

            if error.is_retryable() && policy.can_retry(attempt) {
                let delay = policy.delay_for(attempt);
                metrics::counter!("event_bus_retries_total", "group" => self.group.clone())
                    .increment(1);
                tracing::warn!(attempt, ?delay, error = %error, "handler failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            self.dead_letter(record, error, attempt).await;
            return;
        }
    }

    async fn dead_letter(&self, record: &LogRecord, error: HandlerError, attempts: u32) {
        metrics::counter!(
            "event_bus_dead_lettered_total",
            "topic" => self.topic.as_str(),
            "group" => self.group.clone()
        )
        .increment(1);
        tracing::error!(
            handler = self.handler.name(),
            attempts,
            error = %error,
            "handler gave up, message dead-lettered"
        );

        let letter = DeadLetter {
            topic: self.topic,
            group: self.group.clone(),
            handler: self.handler.name().to_string(),
            key: record.key.clone(),
            offset: record.offset,
            envelope: record.envelope.clone(),
            error: error.to_string(),
            attempts,
            failed_at: Utc::now(),
        };
        self.shared
            .dead_letters
            .lock()
            .await
            .push(letter, self.shared.config.dead_letter_capacity);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
