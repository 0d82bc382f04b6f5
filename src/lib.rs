//! Zeppelin - Live Topology Stream for Gas Town
//!
//! Observes a Gas Town installation (mayor, rigs, witnesses, refineries,
//! polecats, beads) and streams its topology to browser observers:
//! - Periodic collection from the `gt` and `bd` command-line tools
//! - Authoritative in-memory topology with structural diffing
//! - Bounded activity log
//! - Non-blocking fanout of diffs to Server-Sent Events subscribers
//!
//! # Architecture
//!
//! - **Types**: Graph model (Node, Edge, Snapshot, Diff)
//! - **State**: TopologyStore, the single source of truth and diff engine
//! - **Collector**: Polls external tooling and feeds the store
//! - **API**: EventBroker fanout plus the axum HTTP/SSE server
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use zeppelin_core::{EventBroker, TopologyStore};
//!
//! let store = Arc::new(TopologyStore::new());
//! let broker = EventBroker::default();
//! let mut subscription = broker.subscribe();
//!
//! if let Some(diff) = store.apply(nodes, edges, summary).await {
//!     broker.broadcast(&diff);
//! }
//! let payload = subscription.recv().await;
//! ```

pub mod api;
pub mod collector;
pub mod config;
pub mod error;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use api::{ApiServer, EventBroker, Subscription};
pub use collector::{Collector, CommandRunner, Observation, ShellRunner};
pub use config::{ConfigOverrides, ZeppelinConfig};
pub use error::{Result, ZeppelinError};
pub use state::{compute_diff, TopologyStore, ACTIVITY_LIMIT};
pub use types::{Activity, Diff, Edge, EdgeKey, Node, Snapshot, Summary};
