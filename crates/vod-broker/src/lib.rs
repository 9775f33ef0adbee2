//! Job broker over Redis Streams.
//!
//! An append-only, ID-ordered log with consumer-group semantics:
//! at-least-once delivery, pending-entries tracking, explicit
//! acknowledgement, and idle-entry claiming for crash recovery.

pub mod broker;
pub mod error;

use std::collections::HashMap;
use std::time::Duration;

use vod_models::{EventDecodeError, JobEvent, RequestContext};

pub use broker::{BrokerConfig, RedisBroker};
pub use error::{BrokerError, BrokerResult};

/// One stream entry delivered to a consumer.
///
/// The entry stays on the group's pending-entries list until it is
/// acknowledged by id.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Broker-assigned, monotonically increasing entry id
    pub id: String,
    pub fields: HashMap<String, String>,
}

impl Delivery {
    /// Decode the payload into a [`JobEvent`].
    pub fn event(&self) -> Result<JobEvent, EventDecodeError> {
        JobEvent::from_fields(&self.fields)
    }
}

/// Capability set the pipeline needs from the job broker.
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    /// Append an entry; returns the broker-assigned id.
    async fn publish(&self, ctx: &RequestContext, fields: &[(&str, String)])
        -> BrokerResult<String>;

    /// Create the stream and group if missing, starting at the tail.
    /// An existing group is not an error.
    async fn ensure_group(&self, ctx: &RequestContext) -> BrokerResult<()>;

    /// Block up to `block` for undelivered entries; a timeout returns an
    /// empty batch.
    async fn read(
        &self,
        ctx: &RequestContext,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> BrokerResult<Vec<Delivery>>;

    /// Remove an entry from the group's pending-entries list.
    async fn ack(&self, ctx: &RequestContext, id: &str) -> BrokerResult<()>;

    /// Take over entries another consumer left pending for at least
    /// `min_idle` (crash recovery).
    async fn claim_pending(
        &self,
        ctx: &RequestContext,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> BrokerResult<Vec<Delivery>>;

    /// Current stream length, for observability.
    async fn len(&self, ctx: &RequestContext) -> BrokerResult<u64>;
}
