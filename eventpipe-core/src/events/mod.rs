//! Event queues feeding pipeline branches.
//!
//! Every pipeline branch owns exactly one bounded queue. Source adapters
//! push into it through an [`EventSender`] and the branch worker is the
//! only consumer.
//!
//! # Full-queue policy
//!
//! - [`FullQueuePolicy::Block`]: the producer waits until there is room.
//! - [`FullQueuePolicy::Reject`]: the producer gets [`QueueError::Full`].

pub mod queue;

pub use queue::{
    DEFAULT_QUEUE_CAPACITY, EventReceiver, EventSender, FullQueuePolicy, QueueConfig, QueueError,
    event_queue,
};
