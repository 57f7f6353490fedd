//! Event model shared by source adapters, processors and sinks.

pub mod event;
pub mod operation;
pub mod primary_keys;

pub use event::{Addressing, Event, EventBuilder, EventError};
pub use operation::{Operation, ParseOperationError};
pub use primary_keys::{PrimaryKey, PrimaryKeys};
