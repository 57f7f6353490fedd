//! Per-event delivery for one pipeline branch.
//!
//! The worker runs one event through the processor chain and then the
//! sink, applying the retry policy and dead-lettering failures. It never
//! returns an error: every failure is handled here so one bad event cannot
//! stop the branch.

use super::dead_letter::{DeadLetter, DeadLetterSink, FailureStage};
use super::retry::RetryPolicy;
use super::shutdown_signalled;
use crate::processors::{Outcome, Processor, ProcessorChain};
use crate::sinks::Sink;
use eventpipe_sdk::Event;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, trace, warn};

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered { attempts: u32 },
    Discarded,
    ProcessingFailed,
    DeliveryFailed { attempts: u32 },
}

pub(crate) struct DeliveryWorker<'a> {
    pub(crate) pipeline: &'a str,
    pub(crate) processors: &'a ProcessorChain,
    pub(crate) sink: &'a dyn Sink,
    pub(crate) retry: RetryPolicy,
    pub(crate) dead_letter: Option<&'a dyn DeadLetterSink>,
    pub(crate) shutdown_rx: watch::Receiver<bool>,
}

impl DeliveryWorker<'_> {
    async fn write_with_retry(&self, event: Event) -> Delivery {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let err = match self.sink.write_data(&event).await {
                Ok(()) => {
                    debug!(
                        pipeline = %self.pipeline,
                        event_id = ?event.id(),
                        attempts,
                        "Event delivered"
                    );
                    return Delivery::Delivered { attempts };
                }
                Err(e) => e,
            };

            let retry = attempts - 1;
            if err.is_retryable() && retry < self.retry.max_retries {
                let delay = self.retry.delay_for(retry);
                warn!(
                    pipeline = %self.pipeline,
                    event_id = ?event.id(),
                    attempt = attempts,
                    delay = ?delay,
                    error = %err,
                    "Sink write failed, retrying"
                );
                if self.backoff(delay).await {
                    continue;
                }
                warn!(
                    pipeline = %self.pipeline,
                    event_id = ?event.id(),
                    "Shutdown signalled during backoff, giving up on event"
                );
            }

            error!(
                pipeline = %self.pipeline,
                sink = self.sink.name(),
                event_id = ?event.id(),
                operation = %event.operation(),
                primary_keys = %event.primary_keys(),
                attempts,
                error = %err,
                "Failed to write event to sink"
            );
            self.dead_letter(event, FailureStage::Delivery, err.to_string(), attempts)
                .await;
            return Delivery::DeliveryFailed { attempts };
        }
    }

    /// Sleep for `delay`. Returns `false` when shutdown was signalled first.
    async fn backoff(&self, delay: Duration) -> bool {
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            biased;
            _ = shutdown_signalled(&mut shutdown_rx) => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn dead_letter(&self, event: Event, stage: FailureStage, error: String, attempts: u32) {
        let Some(dead_letter) = self.dead_letter else {
            return;
        };
        let letter = DeadLetter {
            pipeline: self.pipeline.to_owned(),
            event,
            stage,
            error,
            attempts,
            failed_at: time::OffsetDateTime::now_utc(),
        };
        if let Err(e) = dead_letter.store(letter).await {
            error!(pipeline = %self.pipeline, error = %e, "Failed to store dead letter");
        }
    }
}

impl kanau::processor::Processor<Event> for DeliveryWorker<'_> {
    type Output = Delivery;
    type Error = Infallible;

    async fn process(&self, event: Event) -> Result<Delivery, Infallible> {
        debug!(
            pipeline = %self.pipeline,
            event_id = ?event.id(),
            event_type = ?event.event_type(),
            operation = %event.operation(),
            "Processing event"
        );

        let raw = event.original_raw().clone();
        let input = self.dead_letter.is_some().then(|| event.clone());

        let delivery = match Outcome::from(self.processors.process(event).await) {
            Outcome::Discard => {
                trace!(pipeline = %self.pipeline, "Event discarded");
                Delivery::Discarded
            }
            Outcome::Failed(e) => {
                error!(
                    pipeline = %self.pipeline,
                    error = %e,
                    payload = %String::from_utf8_lossy(&raw),
                    "Failed to process event"
                );
                if let Some(input) = input {
                    self.dead_letter(input, FailureStage::Processing, e.to_string(), 1)
                        .await;
                }
                Delivery::ProcessingFailed
            }
            Outcome::Ok(event) => self.write_with_retry(event).await,
        };
        Ok(delivery)
    }
}
