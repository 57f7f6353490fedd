#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod objects;
pub mod signature;

pub use objects::{Addressing, Event, EventBuilder, EventError, Operation, PrimaryKey, PrimaryKeys};
