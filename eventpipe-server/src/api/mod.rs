//! HTTP API handlers.

pub mod ingest;
