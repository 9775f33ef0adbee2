//! Worker configuration.

use std::str::FromStr;
use std::time::Duration;

use vod_models::VARIANTS;

/// What to do with a message whose job completed with variant failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Acknowledge as long as the job itself ran; failed variants are
    /// logged and skipped.
    #[default]
    AckOnPartialSuccess,
    /// Leave the message pending unless every variant succeeded, letting
    /// the broker redeliver it.
    RequireFullSuccess,
}

impl FromStr for AckPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ack-on-partial-success" => Ok(AckPolicy::AckOnPartialSuccess),
            "require-full-success" => Ok(AckPolicy::RequireFullSuccess),
            other => Err(format!("unknown ack policy: {other}")),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Consumer name within the group, `video_consumer_<n>`
    pub consumer_name: String,
    /// Base directory for per-job scoped working directories
    pub work_dir: String,
    /// Batch size per broker read
    pub read_count: usize,
    /// Blocking window per broker read
    pub read_block: Duration,
    /// Fixed upload worker pool size per job
    pub upload_workers: usize,
    /// Bound of the per-job upload channel
    pub upload_queue: usize,
    /// Cap on concurrent transcodes within a job
    pub max_parallel_transcodes: usize,
    /// Thumbnail capture offset into the variant
    pub thumbnail_at_secs: u32,
    pub ack_policy: AckPolicy,
    /// How often to sweep for deliveries abandoned by dead consumers
    pub claim_interval: Duration,
    /// Idle threshold before a pending delivery may be claimed
    pub claim_min_idle: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            consumer_name: "video_consumer_1".to_string(),
            work_dir: "/tmp/vod".to_string(),
            read_count: 10,
            read_block: Duration::from_secs(2),
            upload_workers: 3,
            upload_queue: 100,
            max_parallel_transcodes: VARIANTS.len(),
            thumbnail_at_secs: 5,
            ack_policy: AckPolicy::default(),
            claim_interval: Duration::from_secs(60),
            claim_min_idle: Duration::from_secs(30 * 60),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            consumer_name: format!(
                "video_consumer_{}",
                std::env::var("VOD_WORKER_INDEX").unwrap_or_else(|_| "1".to_string())
            ),
            work_dir: std::env::var("VOD_WORKER_WORK_DIR")
                .unwrap_or_else(|_| defaults.work_dir.clone()),
            read_count: env_parsed("VOD_WORKER_READ_COUNT", defaults.read_count),
            read_block: Duration::from_secs(env_parsed("VOD_WORKER_READ_BLOCK_SECS", 2)),
            upload_workers: env_parsed("VOD_WORKER_UPLOAD_WORKERS", defaults.upload_workers),
            upload_queue: env_parsed("VOD_WORKER_UPLOAD_QUEUE", defaults.upload_queue),
            max_parallel_transcodes: env_parsed(
                "VOD_WORKER_MAX_PARALLEL_TRANSCODES",
                defaults.max_parallel_transcodes,
            ),
            thumbnail_at_secs: env_parsed("VOD_WORKER_THUMBNAIL_AT_SECS", 5),
            ack_policy: std::env::var("VOD_WORKER_ACK_POLICY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            claim_interval: Duration::from_secs(env_parsed("VOD_WORKER_CLAIM_INTERVAL_SECS", 60)),
            claim_min_idle: Duration::from_secs(env_parsed(
                "VOD_WORKER_CLAIM_MIN_IDLE_SECS",
                30 * 60,
            )),
        }
    }
}

fn env_parsed<T: FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
