//! Ordered composition of processors.

use super::{ProcessError, Processor};
use async_trait::async_trait;
use eventpipe_sdk::Event;
use tracing::{debug, trace, warn};

/// Runs processors in configured order, feeding each output into the next.
///
/// Stops at the first error. [`ProcessError::Discard`] is passed through
/// unchanged so callers can tell "filtered" from "failed".
#[derive(Default)]
pub struct ProcessorChain {
    processors: Vec<Box<dyn Processor>>,
}

impl ProcessorChain {
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
        Self { processors }
    }

    pub fn push(&mut self, processor: Box<dyn Processor>) {
        self.processors.push(processor);
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }
}

impl std::fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorChain")
            .field("processors", &self.names())
            .finish()
    }
}

#[async_trait]
impl Processor for ProcessorChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn process(&self, event: Event) -> Result<Event, ProcessError> {
        let addressing = event.addressing();
        let mut current = event;

        for processor in &self.processors {
            current = match processor.process(current).await {
                Ok(next) => next,
                Err(ProcessError::Discard) => {
                    trace!(processor = processor.name(), "Processor discarded event");
                    return Err(ProcessError::Discard);
                }
                Err(e) => {
                    debug!(processor = processor.name(), error = %e, "Processor failed");
                    return Err(e);
                }
            };
        }

        if !addressing.matches(&current) {
            return Err(ProcessError::AddressingChanged);
        }
        Ok(current)
    }

    /// Close every processor, even after one of them fails.
    ///
    /// Returns the first error encountered.
    async fn close(&self) -> Result<(), ProcessError> {
        let mut first_error = None;
        for processor in &self.processors {
            if let Err(e) = processor.close().await {
                warn!(processor = processor.name(), error = %e, "Failed to close processor");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
