use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use uuid::Uuid;

use crate::models::job::QueueMessage;

/// Sleep between ready-list polls while long-polling a receive.
const RECEIVE_POLL: Duration = Duration::from_millis(500);
/// Lapsed leases reclaimed per receive pass.
const RECLAIM_BATCH: isize = 16;

/// Wrapper stored on the wire. A fresh receipt is minted on every delivery
/// so each in-flight member is unique and can be removed exactly.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    receipt: Uuid,
    receives: u32,
    message: QueueMessage,
}

/// A message handed to a consumer, leased until its visibility timeout.
#[derive(Debug)]
pub struct Delivery {
    pub message: QueueMessage,
    /// How many times this message has been delivered, this one included.
    pub receives: u32,
    token: String,
}

/// Redis-backed work queue with at-least-once delivery.
///
/// Three keys per queue: a ready list, an in-flight sorted set scored by
/// lease expiry (epoch millis), and a dead-letter list. Messages whose
/// lease lapses without an ack are returned to the ready list; messages
/// delivered more than `max_receives` times are diverted to the
/// dead-letter list. Ordering and uniqueness are not guaranteed.
pub struct JobQueue {
    client: redis::Client,
    ready_key: String,
    inflight_key: String,
    dlq_key: String,
    visibility: Duration,
    max_receives: u32,
}

impl JobQueue {
    pub fn new(
        redis_url: &str,
        queue_name: &str,
        visibility: Duration,
        max_receives: u32,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            ready_key: format!("{queue_name}:ready"),
            inflight_key: format!("{queue_name}:inflight"),
            dlq_key: format!("{queue_name}:dlq"),
            visibility,
            max_receives,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }

    /// Enqueue a job message.
    pub async fn enqueue(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let envelope = Envelope {
            receipt: Uuid::new_v4(),
            receives: 0,
            message: message.clone(),
        };
        let payload = serde_json::to_string(&envelope).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(&self.ready_key, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Long-poll for one message, waiting up to `wait`. Returns None when
    /// nothing became available.
    pub async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.connection().await?;
        let deadline = Instant::now() + wait;
        loop {
            self.reclaim_lapsed(&mut conn).await?;
            if let Some(delivery) = self.try_pop(&mut conn).await? {
                return Ok(Some(delivery));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(RECEIVE_POLL).await;
        }
    }

    /// Acknowledge a delivery, destroying the message.
    pub async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn
            .zrem(&self.inflight_key, &delivery.token)
            .await
            .map_err(QueueError::Redis)?;
        if removed == 0 {
            tracing::warn!(
                job_id = %delivery.message.job_id,
                "ack after lease lapse; message may be redelivered"
            );
        }
        Ok(())
    }

    /// Push a delivery's lease expiry out to now + `extension`. Only takes
    /// effect while the message is still leased.
    pub async fn extend_visibility(
        &self,
        delivery: &Delivery,
        extension: Duration,
    ) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let expiry = Utc::now().timestamp_millis() + extension.as_millis() as i64;
        redis::cmd("ZADD")
            .arg(&self.inflight_key)
            .arg("XX")
            .arg(expiry)
            .arg(&delivery.token)
            .query_async::<()>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Approximate count of visible messages. Leased messages are not
    /// counted, which is what makes idle detection safe while work is
    /// in flight.
    pub async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        conn.llen(&self.ready_key).await.map_err(QueueError::Redis)
    }

    /// Count of messages diverted to the dead-letter list.
    pub async fn dead_letter_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        conn.llen(&self.dlq_key).await.map_err(QueueError::Redis)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Move in-flight members whose lease expired back to the ready list.
    async fn reclaim_lapsed(&self, conn: &mut MultiplexedConnection) -> Result<(), QueueError> {
        let now = Utc::now().timestamp_millis();
        let lapsed: Vec<String> = conn
            .zrangebyscore_limit(&self.inflight_key, "-inf", now, 0, RECLAIM_BATCH)
            .await
            .map_err(QueueError::Redis)?;
        for member in lapsed {
            let removed: i64 = conn
                .zrem(&self.inflight_key, &member)
                .await
                .map_err(QueueError::Redis)?;
            // Another consumer may have reclaimed it between the range
            // read and the remove; only the remover requeues.
            if removed == 1 {
                conn.lpush::<_, _, ()>(&self.ready_key, &member)
                    .await
                    .map_err(QueueError::Redis)?;
                tracing::debug!("visibility lease lapsed, message returned to queue");
            }
        }
        Ok(())
    }

    async fn try_pop(
        &self,
        conn: &mut MultiplexedConnection,
    ) -> Result<Option<Delivery>, QueueError> {
        loop {
            let raw: Option<String> = conn
                .rpop(&self.ready_key, None)
                .await
                .map_err(QueueError::Redis)?;
            let Some(raw) = raw else {
                return Ok(None);
            };

            let envelope: Envelope = match serde_json::from_str(&raw) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping undecodable queue message");
                    continue;
                }
            };

            let receives = envelope.receives + 1;
            if receives > self.max_receives {
                conn.lpush::<_, _, ()>(&self.dlq_key, &raw)
                    .await
                    .map_err(QueueError::Redis)?;
                tracing::warn!(
                    job_id = %envelope.message.job_id,
                    receives,
                    max_receives = self.max_receives,
                    "delivery limit exceeded, message moved to dead-letter list"
                );
                continue;
            }

            let envelope = Envelope {
                receipt: Uuid::new_v4(),
                receives,
                message: envelope.message,
            };
            let token = serde_json::to_string(&envelope).map_err(QueueError::Serialize)?;
            let expiry = Utc::now().timestamp_millis() + self.visibility.as_millis() as i64;
            conn.zadd::<_, _, _, ()>(&self.inflight_key, &token, expiry)
                .await
                .map_err(QueueError::Redis)?;

            return Ok(Some(Delivery {
                message: envelope.message,
                receives,
                token,
            }));
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
