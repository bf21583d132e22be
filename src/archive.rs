//! Archive writer (C1, §4.1): batches [`MessageRecord`]s onto a bounded
//! channel and flushes them to Postgres/TimescaleDB in a background worker.
//!
//! The handle/worker split follows the teacher's handoff-channel shape (see
//! the log-shipper pattern in the reference corpus): callers enqueue without
//! waiting on I/O, and a single background task owns the connection pool and
//! decides when to flush.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, QueryBuilder};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ArchiveError;
use crate::model::MessageRecord;

/// Handle held by producers (the receive loop and the signal client) to
/// enqueue outbound and inbound records without blocking on the database.
#[derive(Clone)]
pub struct ArchiveHandle {
    sender: mpsc::Sender<MessageRecord>,
}

impl ArchiveHandle {
    /// Enqueues `record`. If the worker has shut down (the channel is
    /// closed), the record is dropped and a warning is logged — archival is
    /// best-effort relative to the live conversation (§7).
    pub async fn enqueue(&self, record: MessageRecord) {
        if self.sender.send(record).await.is_err() {
            warn!("archive writer is shut down, dropping record");
        }
    }
}

pub struct ArchiveWriter {
    pool: PgPool,
    receiver: mpsc::Receiver<MessageRecord>,
    batch_size: usize,
    batch_timeout: Duration,
    cancellation: CancellationToken,
}

impl ArchiveWriter {
    /// Connects to the database, applies pending migrations, and returns a
    /// writer paired with the handle producers should clone.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        queue_capacity: usize,
        batch_size: usize,
        batch_timeout: Duration,
        cancellation: CancellationToken,
    ) -> Result<(Self, ArchiveHandle), ArchiveError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        activate_hypertable(&pool).await;

        let (sender, receiver) = mpsc::channel(queue_capacity);
        Ok((
            Self {
                pool,
                receiver,
                batch_size,
                batch_timeout,
                cancellation,
            },
            ArchiveHandle { sender },
        ))
    }

    /// Builds a detached handle/receiver pair without a database connection,
    /// for wiring components together in tests.
    pub fn test_handle(capacity: usize) -> (ArchiveHandle, mpsc::Receiver<MessageRecord>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (ArchiveHandle { sender }, receiver)
    }

    /// Drains the channel until cancellation, flushing whenever a batch
    /// fills or `batch_timeout` elapses since the first record of the
    /// current batch arrived.
    pub async fn run(mut self) {
        let mut batch = Vec::with_capacity(self.batch_size);
        // Only meaningful while `batch` is non-empty; set once when the
        // batch transitions from empty to non-empty, not on every
        // iteration, or sustained sub-timeout traffic would keep pushing it
        // forward and the timeout branch would never fire.
        let mut deadline = Instant::now() + self.batch_timeout;
        loop {
            tokio::select! {
                _ = self.cancellation.cancelled(), if batch.is_empty() => {
                    info!("archive writer shutting down, queue drained");
                    break;
                }
                record = self.receiver.recv() => {
                    match record {
                        Some(record) => {
                            if batch.is_empty() {
                                deadline = Instant::now() + self.batch_timeout;
                            }
                            batch.push(record);
                            if batch.len() >= self.batch_size {
                                self.flush(&mut batch).await;
                            }
                        }
                        None => {
                            // Senders gone: flush whatever remains and exit.
                            self.flush(&mut batch).await;
                            break;
                        }
                    }
                }
                () = tokio::time::sleep_until(deadline), if !batch.is_empty() => {
                    self.flush(&mut batch).await;
                }
            }
        }
    }

    async fn flush(&self, batch: &mut Vec<MessageRecord>) {
        if batch.is_empty() {
            return;
        }
        debug!(count = batch.len(), "flushing archive batch");
        match insert_batch(&self.pool, batch).await {
            Ok(()) => {}
            Err(err) => {
                // At-least-once is not attempted here: a batch that fails to
                // insert is logged and discarded rather than retried
                // indefinitely, so one poisoned batch cannot wedge the queue.
                error!(error = %err, count = batch.len(), "archive batch failed, discarding");
            }
        }
        batch.clear();
    }
}

/// Converts `signal_messages` into a TimescaleDB hypertable if the extension
/// is available. Tolerates the extension being absent — plain Postgres is a
/// supported deployment target (§4.1).
async fn activate_hypertable(pool: &PgPool) {
    if let Err(err) = sqlx::query("CREATE EXTENSION IF NOT EXISTS timescaledb")
        .execute(pool)
        .await
    {
        warn!(error = %err, "timescaledb extension unavailable, continuing on plain Postgres");
        return;
    }

    if let Err(err) = sqlx::query(
        "SELECT create_hypertable('signal_messages', 'timestamp', if_not_exists => TRUE, migrate_data => TRUE)",
    )
    .execute(pool)
    .await
    {
        warn!(error = %err, "create_hypertable failed, continuing with plain table");
    }
}

async fn insert_batch(pool: &PgPool, batch: &[MessageRecord]) -> Result<(), ArchiveError> {
    let mut tx = pool.begin().await?;

    let mut builder = QueryBuilder::new(
        "INSERT INTO signal_messages (timestamp, signal_received_timestamp, signal_delivered_timestamp, target, source, group_chat, mentions, content) ",
    );
    builder.push_values(batch, |mut row, record| {
        row.push_bind(record.timestamp)
            .push_bind(record.signal_received_timestamp)
            .push_bind(record.signal_delivered_timestamp)
            .push_bind(&record.target)
            .push_bind(&record.source)
            .push_bind(&record.group_chat)
            .push_bind(&record.mentions)
            .push_bind(&record.content);
    });

    builder.build().execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}
