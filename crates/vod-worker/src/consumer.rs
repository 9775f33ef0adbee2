//! Long-lived processing consumer.
//!
//! Bootstraps the consumer group at the stream tail, then loops on
//! blocking batch reads. Poison messages are dropped with an ack; job
//! failures leave the message pending so the broker redelivers it. A
//! periodic sweep claims deliveries abandoned by dead peers.

use std::sync::Arc;

use tracing::{error, info, warn};

use vod_broker::{Broker, BrokerError, Delivery};
use vod_models::RequestContext;

use crate::config::{AckPolicy, WorkerConfig};
use crate::error::WorkerResult;
use crate::job::{process_job, JobDeps, JobOutcome};

/// The processing consumer.
#[derive(Clone)]
pub struct Consumer {
    config: Arc<WorkerConfig>,
    broker: Arc<dyn Broker>,
    deps: Arc<JobDeps>,
}

impl Consumer {
    pub fn new(config: WorkerConfig, broker: Arc<dyn Broker>, deps: JobDeps) -> Self {
        Self {
            config: Arc::new(config),
            broker,
            deps: Arc::new(deps),
        }
    }

    /// Run until the context is cancelled. Only broker connectivity loss
    /// during bootstrap aborts; everything later is logged and retried.
    pub async fn run(&self, ctx: RequestContext) -> WorkerResult<()> {
        info!(consumer = %self.config.consumer_name, "starting consumer");

        self.broker.ensure_group(&ctx).await?;

        let sweep = self.spawn_claim_sweep(ctx.clone());

        loop {
            if ctx.is_cancelled() {
                break;
            }

            let deliveries = match self
                .broker
                .read(
                    &ctx,
                    &self.config.consumer_name,
                    self.config.read_count,
                    self.config.read_block,
                )
                .await
            {
                Ok(deliveries) => deliveries,
                Err(BrokerError::Cancelled) => break,
                Err(e) => {
                    error!("error reading stream: {e}");
                    // Back off before retrying the broker.
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.read_block) => continue,
                    }
                }
            };

            for delivery in deliveries {
                self.handle_delivery(&ctx, delivery).await;
            }
        }

        sweep.abort();
        info!(consumer = %self.config.consumer_name, "consumer stopped");
        Ok(())
    }

    /// Periodically claim deliveries that a crashed peer left pending.
    fn spawn_claim_sweep(&self, ctx: RequestContext) -> tokio::task::JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(worker.config.claim_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The immediate first tick would race group bootstrap.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                match worker
                    .broker
                    .claim_pending(
                        &ctx,
                        &worker.config.consumer_name,
                        worker.config.claim_min_idle,
                        worker.config.read_count,
                    )
                    .await
                {
                    Ok(deliveries) if !deliveries.is_empty() => {
                        info!(count = deliveries.len(), "claimed abandoned deliveries");
                        for delivery in deliveries {
                            worker.handle_delivery(&ctx, delivery).await;
                        }
                    }
                    Ok(_) => {}
                    Err(BrokerError::Cancelled) => break,
                    Err(e) => warn!("failed to claim pending deliveries: {e}"),
                }
            }
        })
    }

    async fn handle_delivery(&self, ctx: &RequestContext, delivery: Delivery) {
        let event = match delivery.event() {
            Ok(event) => event,
            Err(e) => {
                // Poison: nothing downstream can use it, drop it.
                warn!(id = %delivery.id, "dropping malformed message: {e}");
                if let Err(e) = self.broker.ack(ctx, &delivery.id).await {
                    error!(id = %delivery.id, "failed to ack malformed message: {e}");
                }
                return;
            }
        };

        let job_ctx = ctx.child();
        match process_job(&self.deps, &self.config, &job_ctx, &event).await {
            Ok(outcome) => {
                if should_ack(self.config.ack_policy, &outcome) {
                    if let Err(e) = self.broker.ack(ctx, &delivery.id).await {
                        error!(id = %delivery.id, "failed to ack message: {e}");
                    }
                } else {
                    warn!(
                        id = %delivery.id,
                        failed = outcome.failed,
                        "leaving message pending for redelivery"
                    );
                }
            }
            Err(e) if e.is_cancelled() => {
                info!(id = %delivery.id, "job interrupted by shutdown; leaving pending");
            }
            Err(e) => {
                // Fatal job error (download, working directory): no ack,
                // the broker will redeliver.
                error!(id = %delivery.id, video_id = %event.video_id, "job failed: {e}");
            }
        }
    }
}

/// Ack decision for a completed job.
fn should_ack(policy: AckPolicy, outcome: &JobOutcome) -> bool {
    match policy {
        AckPolicy::AckOnPartialSuccess => true,
        AckPolicy::RequireFullSuccess => outcome.failed == 0,
    }
}
