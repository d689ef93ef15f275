use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use shared::constants::PAYLOAD_FIELD;

use super::{Delivery, MessageSource};
use crate::config::RedisConfig;

/// Reads transactions from a Redis stream through a consumer group.
///
/// Entries already delivered to this consumer but never acknowledged (a
/// crash, a failed XACK, a refused submit) are replayed from the pending
/// entries list before any new entry is read.
pub struct RedisStreamSource {
    conn: ConnectionManager,
    stream: String,
    group: String,
    options: StreamReadOptions,
    cursor: ReadCursor,
}

/// Which id the next XREADGROUP asks for
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReadCursor {
    /// Re-reading this consumer's pending entries after the given id
    Pending(String),
    /// Reading entries never delivered to the group (`>`)
    New,
}

impl ReadCursor {
    fn start() -> Self {
        ReadCursor::Pending("0".to_string())
    }

    fn id(&self) -> &str {
        match self {
            ReadCursor::Pending(after) => after,
            ReadCursor::New => ">",
        }
    }

    /// Move past a batch read at this cursor
    fn advance(&mut self, batch: &[Delivery]) {
        if *self == ReadCursor::New {
            return;
        }
        *self = match batch.last() {
            Some(last) => ReadCursor::Pending(last.id.clone()),
            None => ReadCursor::New,
        };
    }
}

impl RedisStreamSource {
    pub async fn connect(config: &RedisConfig) -> anyhow::Result<Self> {
        let client = redis::Client::open(config.url.clone())
            .with_context(|| format!("invalid Redis URL {}", config.url))?;
        let mut conn = client
            .get_connection_manager()
            .await
            .context("failed to connect to Redis")?;

        // Create the group (and the stream) on first use
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&config.stream, &config.group, "0")
            .await;
        match created {
            Ok(()) => tracing::info!(stream = %config.stream, group = %config.group, "Consumer group created"),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                tracing::debug!(group = %config.group, "Consumer group already exists");
            }
            Err(e) => return Err(e).context("failed to create consumer group"),
        }

        let options = StreamReadOptions::default()
            .group(&config.group, &config.consumer)
            .count(config.read_count)
            .block(config.block_ms);

        tracing::info!(
            stream = %config.stream,
            group = %config.group,
            consumer = %config.consumer,
            "Redis stream source ready"
        );

        Ok(Self {
            conn,
            stream: config.stream.clone(),
            group: config.group.clone(),
            options,
            cursor: ReadCursor::start(),
        })
    }
}

#[async_trait]
impl MessageSource for RedisStreamSource {
    async fn next_batch(&mut self) -> anyhow::Result<Option<Vec<Delivery>>> {
        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[&self.stream], &[self.cursor.id()], &self.options)
            .await
            .context("XREADGROUP failed")?;

        // A blocking read that timed out yields no reply
        let mut deliveries = Vec::new();
        for key in reply.map(|reply| reply.keys).unwrap_or_default() {
            for entry in key.ids {
                // Entries without a payload still get acked as malformed
                let payload: Vec<u8> = entry.get(PAYLOAD_FIELD).unwrap_or_default();
                deliveries.push(Delivery::new(entry.id, payload));
            }
        }

        if let ReadCursor::Pending(_) = self.cursor {
            tracing::debug!(count = deliveries.len(), "Replaying pending stream entries");
        }
        self.cursor.advance(&deliveries);
        Ok(Some(deliveries))
    }

    async fn ack(&mut self, ids: &[String]) -> anyhow::Result<()> {
        let _: i64 = self
            .conn
            .xack(&self.stream, &self.group, ids)
            .await
            .map_err(|e| {
                // Replay what is still pending on the next read
                self.cursor = ReadCursor::start();
                e
            })
            .context("XACK failed")?;
        Ok(())
    }
}
