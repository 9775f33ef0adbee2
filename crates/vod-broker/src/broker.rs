//! Redis Streams broker implementation.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use redis::streams::{StreamAutoClaimReply, StreamReadReply};
use redis::{AsyncCommands, Value};
use tracing::{debug, info};

use vod_models::RequestContext;

use crate::error::{BrokerError, BrokerResult};
use crate::{Broker, Delivery};

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Redis URL, e.g. `redis://localhost:6379/0`
    pub redis_url: String,
    /// Stream the processing events are appended to
    pub stream: String,
    /// Consumer group the workers read through
    pub group: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379/0".to_string(),
            stream: "video_stream".to_string(),
            group: "video_group".to_string(),
        }
    }
}

impl BrokerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("VOD_REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/0".to_string()),
            stream: std::env::var("VOD_BROKER_STREAM")
                .unwrap_or_else(|_| "video_stream".to_string()),
            group: std::env::var("VOD_BROKER_GROUP")
                .unwrap_or_else(|_| "video_group".to_string()),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }
}

/// Job broker over a Redis stream with one consumer group.
pub struct RedisBroker {
    client: redis::Client,
    config: BrokerConfig,
}

impl RedisBroker {
    /// Create a new broker client.
    pub fn new(config: BrokerConfig) -> BrokerResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> BrokerResult<Self> {
        Self::new(BrokerConfig::from_env())
    }

    pub fn stream(&self) -> &str {
        &self.config.stream
    }

    /// Run `fut` under the context's cancellation token and deadline.
    async fn guard<T>(
        ctx: &RequestContext,
        fut: impl Future<Output = BrokerResult<T>>,
    ) -> BrokerResult<T> {
        if ctx.is_cancelled() {
            return Err(BrokerError::Cancelled);
        }
        match ctx.remaining() {
            Some(left) => tokio::select! {
                _ = ctx.cancel.cancelled() => Err(BrokerError::Cancelled),
                res = tokio::time::timeout(left, fut) => {
                    res.map_err(|_| BrokerError::Cancelled)?
                }
            },
            None => tokio::select! {
                _ = ctx.cancel.cancelled() => Err(BrokerError::Cancelled),
                res = fut => res,
            },
        }
    }

    fn deliveries_from_reply(reply: StreamReadReply) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        for stream_key in reply.keys {
            for entry in stream_key.ids {
                deliveries.push(Delivery {
                    id: entry.id.clone(),
                    fields: string_fields(&entry.map),
                });
            }
        }
        deliveries
    }
}

/// Stream entry maps arrive as raw redis values; events are string-valued.
fn string_fields(map: &HashMap<String, Value>) -> HashMap<String, String> {
    map.iter()
        .filter_map(|(k, v)| {
            redis::from_redis_value::<String>(v)
                .ok()
                .map(|s| (k.clone(), s))
        })
        .collect()
}

#[async_trait::async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, ctx: &RequestContext, fields: &[(&str, String)]) -> BrokerResult<String> {
        let fut = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;

            let mut cmd = redis::cmd("XADD");
            cmd.arg(&self.config.stream).arg("*");
            for (name, value) in fields {
                cmd.arg(*name).arg(value);
            }

            let id: String = cmd.query_async(&mut conn).await?;
            info!(stream = %self.config.stream, id = %id, "published event");
            Ok(id)
        };
        Self::guard(ctx, fut).await
    }

    async fn ensure_group(&self, ctx: &RequestContext) -> BrokerResult<()> {
        let fut = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;

            // "$" starts the group at the current tail so entries published
            // before group creation are never delivered; MKSTREAM creates
            // the stream when it does not exist yet.
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&self.config.stream)
                .arg(&self.config.group)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(()) => info!(group = %self.config.group, "created consumer group"),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!(group = %self.config.group, "consumer group already exists");
                }
                Err(e) => return Err(BrokerError::Redis(e)),
            }
            Ok(())
        };
        Self::guard(ctx, fut).await
    }

    async fn read(
        &self,
        ctx: &RequestContext,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> BrokerResult<Vec<Delivery>> {
        let fut = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;

            // ">" asks for entries never delivered to any consumer of the
            // group; an expired BLOCK returns nil, which reads as empty.
            let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
                .arg("GROUP")
                .arg(&self.config.group)
                .arg(consumer)
                .arg("COUNT")
                .arg(count)
                .arg("BLOCK")
                .arg(block.as_millis() as u64)
                .arg("STREAMS")
                .arg(&self.config.stream)
                .arg(">")
                .query_async(&mut conn)
                .await?;

            Ok(reply.map(Self::deliveries_from_reply).unwrap_or_default())
        };
        Self::guard(ctx, fut).await
    }

    async fn ack(&self, ctx: &RequestContext, id: &str) -> BrokerResult<()> {
        let fut = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;

            redis::cmd("XACK")
                .arg(&self.config.stream)
                .arg(&self.config.group)
                .arg(id)
                .query_async::<()>(&mut conn)
                .await?;

            debug!(id = %id, "acknowledged entry");
            Ok(())
        };
        Self::guard(ctx, fut).await
    }

    async fn claim_pending(
        &self,
        ctx: &RequestContext,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> BrokerResult<Vec<Delivery>> {
        let fut = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;

            // Scan the pending-entries list from the beginning and take
            // ownership of entries idle past the threshold (dead peers).
            let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
                .arg(&self.config.stream)
                .arg(&self.config.group)
                .arg(consumer)
                .arg(min_idle.as_millis() as u64)
                .arg("0-0")
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn)
                .await?;

            let deliveries: Vec<Delivery> = reply
                .claimed
                .into_iter()
                .map(|entry| Delivery {
                    id: entry.id.clone(),
                    fields: string_fields(&entry.map),
                })
                .collect();

            if !deliveries.is_empty() {
                info!(count = deliveries.len(), "claimed pending entries");
            }
            Ok(deliveries)
        };
        Self::guard(ctx, fut).await
    }

    async fn len(&self, ctx: &RequestContext) -> BrokerResult<u64> {
        let fut = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let len: u64 = conn.xlen(&self.config.stream).await?;
            Ok(len)
        };
        Self::guard(ctx, fut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_wire_contract() {
        let config = BrokerConfig::default();
        assert_eq!(config.stream, "video_stream");
        assert_eq!(config.group, "video_group");
    }

    #[test]
    fn string_fields_drops_non_string_values() {
        let mut map = HashMap::new();
        map.insert(
            "bucket".to_string(),
            Value::BulkString(b"user-1".to_vec()),
        );
        map.insert("weird".to_string(), Value::Nil);

        let fields = string_fields(&map);
        assert_eq!(fields.get("bucket").map(String::as_str), Some("user-1"));
        assert!(!fields.contains_key("weird"));
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let broker = RedisBroker::new(BrokerConfig {
            redis_url: "redis://127.0.0.1:1/0".to_string(),
            ..BrokerConfig::default()
        })
        .unwrap();

        let ctx = RequestContext::new();
        ctx.cancel.cancel();
        let err = broker.ack(&ctx, "0-0").await.unwrap_err();
        assert!(matches!(err, BrokerError::Cancelled));
    }
}
