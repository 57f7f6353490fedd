//! Mock processors and sinks for unit tests.

use crate::processors::{ProcessError, Processor};
use crate::sinks::{Sink, SinkError};
use async_trait::async_trait;
use eventpipe_sdk::Event;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

/// Processor backed by a synchronous closure.
pub struct FnProcessor<F> {
    name: &'static str,
    f: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(Event) -> Result<Event, ProcessError> + Send + Sync,
{
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

#[async_trait]
impl<F> Processor for FnProcessor<F>
where
    F: Fn(Event) -> Result<Event, ProcessError> + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    async fn process(&self, event: Event) -> Result<Event, ProcessError> {
        (self.f)(event)
    }
}

/// Passes events through and counts calls to `process` and `close`.
pub struct RecordingProcessor {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    close_error: Option<&'static str>,
}

impl RecordingProcessor {
    pub fn new(name: &'static str, calls: Arc<AtomicUsize>) -> Self {
        Self {
            name,
            calls,
            close_error: None,
        }
    }

    pub fn failing_close(mut self, reason: &'static str) -> Self {
        self.close_error = Some(reason);
        self
    }
}

#[async_trait]
impl Processor for RecordingProcessor {
    fn name(&self) -> &str {
        self.name
    }

    async fn process(&self, event: Event) -> Result<Event, ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(event)
    }

    async fn close(&self) -> Result<(), ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.close_error {
            Some(reason) => Err(ProcessError::failed(self.name, reason)),
            None => Ok(()),
        }
    }
}

/// Sleeps for `delay_ms` from the payload before passing the event on.
pub struct SleepProcessor;

#[async_trait]
impl Processor for SleepProcessor {
    fn name(&self) -> &str {
        "sleep"
    }

    async fn process(&self, event: Event) -> Result<Event, ProcessError> {
        let delay = event.data()?["delay_ms"].as_u64().unwrap_or_default();
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(event)
    }
}

/// Holds every event until the test releases a permit for it.
pub struct GateProcessor {
    permits: Arc<Semaphore>,
}

impl GateProcessor {
    /// Returns the processor and the semaphore that releases events.
    pub fn closed() -> (Self, Arc<Semaphore>) {
        let permits = Arc::new(Semaphore::new(0));
        (
            Self {
                permits: Arc::clone(&permits),
            },
            permits,
        )
    }
}

#[async_trait]
impl Processor for GateProcessor {
    fn name(&self) -> &str {
        "gate"
    }

    async fn process(&self, event: Event) -> Result<Event, ProcessError> {
        self.permits
            .acquire()
            .await
            .map_err(|e| ProcessError::failed("gate", e))?
            .forget();
        Ok(event)
    }
}

/// Records every written event; can be told to fail the next N writes.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
    fail_remaining: AtomicUsize,
    close_error: Option<&'static str>,
    closed: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_close(reason: &'static str) -> Arc<Self> {
        Arc::new(Self {
            close_error: Some(reason),
            ..Self::default()
        })
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|e| e.id().map(str::to_owned))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn write_data(&self, event: &Event) -> Result<(), SinkError> {
        let should_fail = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(SinkError::Failed("injected failure".into()));
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::SeqCst);
        match self.close_error {
            Some(reason) => Err(SinkError::Failed(reason.into())),
            None => Ok(()),
        }
    }
}
