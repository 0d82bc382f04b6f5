//! HTTP API for topology streaming
//!
//! Provides:
//! - Observer fanout broker with bounded per-observer queues
//! - Server-Sent Events (SSE) stream of snapshots and diffs
//! - Snapshot, activity and health endpoints

pub mod broker;
pub mod server;

pub use broker::{EventBroker, Payload, Subscription, DEFAULT_SUBSCRIBER_CAPACITY};
pub use server::{build_router, ApiServer, AppState};
