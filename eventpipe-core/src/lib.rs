#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod events;
pub mod pipeline;
pub mod processors;
pub mod sinks;

#[cfg(test)]
pub(crate) mod test_support;

pub use eventpipe_sdk::{Event, Operation, PrimaryKeys};
