//! Topology collector
//!
//! Polls the Gas Town tooling (`gt`, `bd`) on a fixed cadence, turns the
//! output into an [`Observation`], applies it to the [`TopologyStore`] and
//! hands any resulting diff to the [`EventBroker`].
//!
//! A cycle whose agent listing cannot be obtained produces no observation and
//! the previous topology stays in place. When only `bd` fails, the beads
//! from the last successful listing are carried forward.

pub mod parse;
pub mod runner;

pub use runner::{CommandRunner, ShellRunner};

use crate::api::broker::EventBroker;
use crate::state::TopologyStore;
use crate::types::{Diff, Edge, Node, Summary};
use parse::BeadInfo;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// One full `(nodes, edges, summary)` triple from a polling cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub summary: Summary,
}

/// Periodic producer feeding the topology store
pub struct Collector {
    runner: Arc<dyn CommandRunner>,
    interval: Duration,
    /// Beads from the last usable `bd list`
    last_beads: Mutex<Vec<BeadInfo>>,
}

impl Collector {
    pub fn new(runner: Arc<dyn CommandRunner>, interval: Duration) -> Self {
        Self {
            runner,
            interval,
            last_beads: Mutex::new(Vec::new()),
        }
    }

    /// Run a command; `None` (logged) when it fails
    async fn output(&self, program: &str, args: &[&str]) -> Option<String> {
        match self.runner.run(program, args).await {
            Ok(out) => Some(out),
            Err(e) => {
                warn!(program, ?args, error = %e, "Collector command failed");
                None
            }
        }
    }

    /// Agent graph from `gt status`, falling back to the polecat listing
    ///
    /// `None` when every source failed to run.
    async fn collect_agents(&self) -> Option<(Vec<Node>, Vec<Edge>)> {
        let status = self.output("gt", &["status", "--json"]).await;
        if let Some(status) = status.as_deref().and_then(parse::parse_status) {
            return Some(parse::graph_from_status(&status));
        }
        debug!("gt status unavailable, falling back to polecat list");

        let listing = self.output("gt", &["polecat", "list", "--all", "--json"]).await;
        if let Some(entries) = listing.as_deref().and_then(parse::parse_polecat_json) {
            return Some(parse::graph_from_polecats(&entries));
        }

        let text = self.output("gt", &["polecat", "list", "--all"]).await;
        if text.is_none() && status.is_none() && listing.is_none() {
            return None;
        }
        let entries = parse::parse_polecat_text(text.as_deref().unwrap_or_default());
        Some(parse::graph_from_polecats(&entries))
    }

    /// Current beads, or the last usable listing when `bd` fails
    async fn collect_beads(&self) -> Vec<BeadInfo> {
        let fresh = self
            .output("bd", &["list", "--json"])
            .await
            .as_deref()
            .and_then(parse::parse_beads);

        let mut last = self.last_beads.lock().unwrap_or_else(|e| e.into_inner());
        match fresh {
            Some(beads) => {
                *last = beads.clone();
                beads
            }
            None => {
                debug!(count = last.len(), "Keeping previous beads");
                last.clone()
            }
        }
    }

    /// Gather one observation from the tooling
    ///
    /// `None` when the agent listing could not be obtained at all; the cycle
    /// is then skipped rather than read as an empty town.
    pub async fn collect(&self) -> Option<Observation> {
        let Some((mut nodes, mut edges)) = self.collect_agents().await else {
            warn!("No agent listing available, skipping this cycle");
            return None;
        };

        let beads = self.collect_beads().await;
        let (bead_nodes, bead_edges) = parse::graph_from_beads(&beads);
        nodes.extend(bead_nodes);
        edges.extend(bead_edges);

        parse::dedupe(&mut nodes, &mut edges);
        let summary = parse::summarize(&nodes);

        Some(Observation {
            nodes,
            edges,
            summary,
        })
    }

    /// Collect once, apply to the store, and broadcast the diff if any
    /// observer is listening
    ///
    /// The store's lock is released before the broker is touched.
    pub async fn poll_once(&self, store: &TopologyStore, broker: &EventBroker) -> Option<Diff> {
        let observation = self.collect().await?;
        let diff = store
            .apply(observation.nodes, observation.edges, observation.summary)
            .await?;

        if broker.subscriber_count() > 0 {
            let delivered = broker.broadcast(&diff);
            debug!(delivered, "Broadcast topology diff");
        }
        Some(diff)
    }

    /// Poll immediately, then every interval, until `shutdown` changes
    pub async fn run(
        self,
        store: Arc<TopologyStore>,
        broker: EventBroker,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(interval = ?self.interval, "Collector started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once(&store, &broker).await;
                }
                _ = shutdown.changed() => {
                    debug!("Collector received shutdown signal");
                    break;
                }
            }
        }

        info!("Collector stopped");
    }
}
