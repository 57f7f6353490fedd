//! Pipelines: one queue, one consumer loop, a processor chain and a sink.
//!
//! # Lifecycle
//!
//! 1. Build with [`Pipeline::builder`] (or [`Pipeline::new`])
//! 2. [`Pipeline::start`] runs the consumer loop until the queue is drained
//!    or shutdown is signalled
//! 3. Producers call [`Pipeline::add_message`] at any time while running
//! 4. [`Pipeline::drain`] stops accepting events; the loop finishes the
//!    queue and returns `Ok(())`
//! 5. [`Pipeline::close`] closes the sink, then the processors
//!
//! Shutdown is signalled through a `watch::Receiver<bool>`; `true` means
//! stop. The loop only reacts between events, drains what is already
//! queued and returns [`PipelineError::Cancelled`].
//!
//! Processing and delivery failures never leave the loop: they are logged
//! (and optionally retried / dead-lettered) and the next event is taken.

pub mod dead_letter;
pub mod group;
pub mod retry;
mod worker;

pub use dead_letter::{
    DeadLetter, DeadLetterError, DeadLetterSink, FailureStage, LogDeadLetter, MemoryDeadLetter,
    SinkDeadLetter,
};
pub use group::{BranchFailure, GroupError, PipelineGroup};
pub use retry::RetryPolicy;
pub use worker::Delivery;

use crate::events::{EventReceiver, EventSender, QueueConfig, QueueError, event_queue};
use crate::processors::{ProcessError, Processor, ProcessorChain};
use crate::sinks::{Sink, SinkError};
use eventpipe_sdk::Event;
use kanau::processor::Processor as _;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};
use worker::DeliveryWorker;

/// Errors surfaced by pipeline lifecycle operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline has no sink, so it would silently drop everything.
    #[error("pipeline {0}: writer not defined")]
    WriterNotDefined(String),

    #[error("pipeline {0} was already started")]
    AlreadyStarted(String),

    #[error("pipeline queue is closed")]
    QueueClosed,

    #[error("pipeline queue is full")]
    QueueFull,

    #[error("queue capacity must be greater than zero")]
    InvalidQueueCapacity,

    /// The shutdown signal stopped the consumer loop.
    #[error("pipeline cancelled")]
    Cancelled,

    #[error("failed to close sink: {0}")]
    SinkClose(#[source] SinkError),

    #[error("failed to close processors: {0}")]
    ProcessorClose(#[source] ProcessError),

    /// The branch task panicked or was aborted.
    #[error("pipeline worker stopped abnormally: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl From<QueueError> for PipelineError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Full => PipelineError::QueueFull,
            QueueError::Closed => PipelineError::QueueClosed,
            QueueError::ZeroCapacity => PipelineError::InvalidQueueCapacity,
        }
    }
}

/// Wait until `true` is published on the shutdown channel.
///
/// A channel whose sender is gone without ever publishing `true` never
/// completes.
pub(crate) async fn shutdown_signalled(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// One delivery branch.
pub struct Pipeline {
    name: String,
    processors: ProcessorChain,
    sink: Option<Arc<dyn Sink>>,
    queue_config: QueueConfig,
    retry: RetryPolicy,
    dead_letter: Option<Arc<dyn DeadLetterSink>>,
    sender: Mutex<Option<EventSender>>,
    receiver: Mutex<Option<EventReceiver>>,
}

impl Pipeline {
    /// Create a pipeline with the default queue and no retries.
    ///
    /// A missing sink is accepted here and reported by [`start`](Self::start).
    pub fn new(
        name: impl Into<String>,
        processors: ProcessorChain,
        sink: Option<Arc<dyn Sink>>,
    ) -> Result<Self, PipelineError> {
        let mut builder = Self::builder(name).processors(processors);
        builder.sink = sink;
        builder.build()
    }

    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            processors: ProcessorChain::default(),
            sink: None,
            queue_config: QueueConfig::default(),
            retry: RetryPolicy::none(),
            dead_letter: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue_config(&self) -> QueueConfig {
        self.queue_config
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Enqueue an event for this branch.
    ///
    /// With the `Block` policy this waits while the queue is full. Fails
    /// with [`PipelineError::QueueClosed`] once the pipeline was drained,
    /// cancelled or closed.
    pub async fn add_message(&self, event: Event) -> Result<(), PipelineError> {
        let sender = self.sender.lock().await.clone();
        let Some(sender) = sender else {
            return Err(PipelineError::QueueClosed);
        };
        sender.send(event).await?;
        Ok(())
    }

    /// Run the consumer loop.
    ///
    /// Returns `Ok(())` once the queue was drained through [`drain`](Self::drain),
    /// or [`PipelineError::Cancelled`] after a shutdown signal. In both cases
    /// every event queued before the exit has been handled.
    pub async fn start(&self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), PipelineError> {
        let Some(sink) = self.sink.clone() else {
            error!(pipeline = %self.name, "Pipeline has no sink configured");
            self.reject_queue().await;
            return Err(PipelineError::WriterNotDefined(self.name.clone()));
        };
        let mut receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| PipelineError::AlreadyStarted(self.name.clone()))?;

        let worker = DeliveryWorker {
            pipeline: &self.name,
            processors: &self.processors,
            sink: sink.as_ref(),
            retry: self.retry,
            dead_letter: self.dead_letter.as_deref(),
            shutdown_rx: shutdown_rx.clone(),
        };

        info!(
            pipeline = %self.name,
            sink = sink.name(),
            processors = ?self.processors.names(),
            capacity = self.queue_config.capacity,
            "Pipeline started"
        );

        loop {
            tokio::select! {
                biased;

                // Shutdown has highest priority.
                _ = shutdown_signalled(&mut shutdown_rx) => {
                    info!(pipeline = %self.name, "Pipeline received shutdown signal, draining queue");
                    receiver.close();
                    self.sender.lock().await.take();

                    let mut drained = 0usize;
                    while let Some(event) = receiver.recv().await {
                        Self::handle(&worker, event).await;
                        drained += 1;
                    }
                    info!(pipeline = %self.name, drained, "Pipeline stopped");
                    return Err(PipelineError::Cancelled);
                }

                next = receiver.recv() => match next {
                    Some(event) => Self::handle(&worker, event).await,
                    None => {
                        info!(pipeline = %self.name, "Pipeline queue closed");
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Close the queue of a branch that cannot run, so producers get
    /// [`PipelineError::QueueClosed`] instead of waiting on a queue nobody
    /// consumes.
    async fn reject_queue(&self) {
        self.sender.lock().await.take();
        let Some(mut receiver) = self.receiver.lock().await.take() else {
            return;
        };
        receiver.close();
        let mut dropped = 0usize;
        while receiver.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(
                pipeline = %self.name,
                dropped,
                "Dropped events queued for a pipeline that cannot start"
            );
        }
    }

    async fn handle(worker: &DeliveryWorker<'_>, event: Event) {
        match worker.process(event).await {
            Ok(delivery) => debug!(pipeline = %worker.pipeline, ?delivery, "Event handled"),
            Err(never) => match never {},
        }
    }

    /// Stop accepting events. A running loop finishes the queue and
    /// returns `Ok(())`.
    pub async fn drain(&self) {
        if self.sender.lock().await.take().is_some() {
            info!(pipeline = %self.name, "Pipeline draining");
        }
    }

    /// Close the sink, then the processors.
    ///
    /// A sink close failure is returned right away and the processors are
    /// left open. Also stops accepting new events.
    pub async fn close(&self) -> Result<(), PipelineError> {
        self.sender.lock().await.take();
        if let Some(sink) = &self.sink {
            sink.close().await.map_err(PipelineError::SinkClose)?;
        }
        self.processors
            .close()
            .await
            .map_err(PipelineError::ProcessorClose)?;
        info!(pipeline = %self.name, "Pipeline closed");
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("processors", &self.processors)
            .field("sink", &self.sink.as_ref().map(|s| s.name().to_owned()))
            .field("queue_config", &self.queue_config)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    name: String,
    processors: ProcessorChain,
    sink: Option<Arc<dyn Sink>>,
    queue_config: QueueConfig,
    retry: RetryPolicy,
    dead_letter: Option<Arc<dyn DeadLetterSink>>,
}

impl PipelineBuilder {
    pub fn processor(mut self, processor: Box<dyn Processor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn processors(mut self, processors: ProcessorChain) -> Self {
        self.processors = processors;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn queue(mut self, queue_config: QueueConfig) -> Self {
        self.queue_config = queue_config;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn dead_letter(mut self, dead_letter: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letter = Some(dead_letter);
        self
    }

    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let (sender, receiver) = event_queue(self.queue_config)?;
        Ok(Pipeline {
            name: self.name,
            processors: self.processors,
            sink: self.sink,
            queue_config: self.queue_config,
            retry: self.retry,
            dead_letter: self.dead_letter,
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
        })
    }
}
