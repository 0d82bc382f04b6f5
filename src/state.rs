//! Topology state and diff engine
//!
//! [`TopologyStore`] owns the single authoritative topology. Each observation
//! from the collector replaces the node set, edge set and summary wholesale;
//! the store answers with the [`Diff`] against the state it just replaced, or
//! `None` when there is nothing worth publishing.

use crate::types::{Activity, Diff, Edge, EdgeKey, Node, Snapshot, Summary};
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Number of activity entries retained, oldest evicted first
pub const ACTIVITY_LIMIT: usize = 100;

#[derive(Debug, Default)]
struct Topology {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    activity: VecDeque<Activity>,
    summary: Summary,
}

/// Holds the current topology and computes diffs between observations
#[derive(Debug, Default)]
pub struct TopologyStore {
    inner: RwLock<Topology>,
}

impl TopologyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state, stamped with the time of this read
    pub async fn snapshot(&self) -> Snapshot {
        let topology = self.inner.read().await;
        Snapshot {
            timestamp: Utc::now(),
            nodes: topology.nodes.clone(),
            edges: topology.edges.clone(),
            activity: topology.activity.iter().cloned().collect(),
            summary: topology.summary,
        }
    }

    /// Replace the topology with a new observation
    ///
    /// Returns `None` on cold start (the store held no nodes before this call,
    /// callers should serve a full snapshot instead) and when nothing changed.
    pub async fn apply(&self, nodes: Vec<Node>, edges: Vec<Edge>, summary: Summary) -> Option<Diff> {
        let mut topology = self.inner.write().await;

        let cold_start = topology.nodes.is_empty();
        let diff = compute_diff(
            &topology.nodes,
            &nodes,
            &topology.edges,
            &edges,
            &topology.summary,
            &summary,
        );

        topology.nodes = nodes;
        topology.edges = edges;
        topology.summary = summary;

        if cold_start {
            debug!(nodes = topology.nodes.len(), "Initial topology loaded");
            return None;
        }
        if diff.is_empty() {
            trace!("Observation unchanged");
            return None;
        }

        debug!(
            added = diff.nodes_added.len(),
            removed = diff.nodes_removed.len(),
            updated = diff.nodes_updated.len(),
            edges_added = diff.edges_added.len(),
            edges_removed = diff.edges_removed.len(),
            summary_changed = diff.summary.is_some(),
            "Topology changed"
        );
        Some(diff)
    }

    /// Append an activity entry, evicting the oldest beyond [`ACTIVITY_LIMIT`]
    pub async fn append_activity(&self, entry: Activity) {
        let mut topology = self.inner.write().await;
        topology.activity.push_back(entry);
        while topology.activity.len() > ACTIVITY_LIMIT {
            topology.activity.pop_front();
        }
    }

    /// Number of nodes currently held
    pub async fn node_count(&self) -> usize {
        self.inner.read().await.nodes.len()
    }
}

/// Compute the changes needed to turn one observation into the next
///
/// Nodes are matched by ID and compared by full value. Edges are matched by
/// their `(kind, source, target)` identity only: an edge whose label or
/// metadata changes under the same identity produces no entry, edges are
/// treated as immutable once created.
///
/// Additions and updates follow the order of the new observation, removals
/// the order of the previous one.
pub fn compute_diff(
    old_nodes: &[Node],
    new_nodes: &[Node],
    old_edges: &[Edge],
    new_edges: &[Edge],
    old_summary: &Summary,
    new_summary: &Summary,
) -> Diff {
    let mut diff = Diff::new();

    let old_by_id: HashMap<&str, &Node> = old_nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let new_ids: HashSet<&str> = new_nodes.iter().map(|n| n.id.as_str()).collect();

    for node in new_nodes {
        match old_by_id.get(node.id.as_str()) {
            None => diff.nodes_added.push(node.clone()),
            Some(old) if *old != node => diff.nodes_updated.push(node.clone()),
            Some(_) => {}
        }
    }
    diff.nodes_removed = old_nodes
        .iter()
        .filter(|n| !new_ids.contains(n.id.as_str()))
        .map(|n| n.id.clone())
        .collect();

    let old_keys: HashSet<EdgeKey> = old_edges.iter().map(Edge::key).collect();
    let new_keys: HashSet<EdgeKey> = new_edges.iter().map(Edge::key).collect();

    diff.edges_added = new_edges
        .iter()
        .filter(|e| !old_keys.contains(&e.key()))
        .cloned()
        .collect();
    diff.edges_removed = old_edges
        .iter()
        .map(Edge::key)
        .filter(|k| !new_keys.contains(k))
        .collect();

    if old_summary != new_summary {
        diff.summary = Some(*new_summary);
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{kind, relation};

    fn mayor() -> Node {
        Node::new("mayor", kind::MAYOR, "Mayor", "running")
    }

    fn rust_polecat(state: &str) -> Node {
        Node::new("zeppelin/polecats/rust", kind::POLECAT, "rust", state).with_rig("zeppelin")
    }

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = TopologyStore::new();
        let snapshot = store.snapshot().await;
        assert!(snapshot.nodes.is_empty());
        assert!(snapshot.edges.is_empty());
        assert!(snapshot.activity.is_empty());
        assert_eq!(snapshot.summary, Summary::default());
    }

    #[tokio::test]
    async fn test_first_apply_returns_none() {
        let store = TopologyStore::new();
        let summary = Summary {
            rig_count: 1,
            ..Default::default()
        };
        let diff = store.apply(vec![mayor()], vec![], summary).await;
        assert!(diff.is_none());

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.summary.rig_count, 1);
    }

    #[tokio::test]
    async fn test_identical_apply_returns_none() {
        let store = TopologyStore::new();
        let edges = vec![Edge::new(relation::MONITORING, "zeppelin/witness", "zeppelin/polecats/rust")];
        store
            .apply(vec![mayor(), rust_polecat("idle")], edges.clone(), Summary::default())
            .await;

        for _ in 0..3 {
            let diff = store
                .apply(vec![mayor(), rust_polecat("idle")], edges.clone(), Summary::default())
                .await;
            assert!(diff.is_none());
        }
    }

    #[tokio::test]
    async fn test_node_added() {
        let store = TopologyStore::new();
        store.apply(vec![mayor()], vec![], Summary::default()).await;

        let diff = store
            .apply(vec![mayor(), rust_polecat("working")], vec![], Summary::default())
            .await
            .expect("diff");
        assert_eq!(diff.nodes_added, vec![rust_polecat("working")]);
        assert!(diff.nodes_removed.is_empty());
        assert!(diff.nodes_updated.is_empty());
    }

    #[tokio::test]
    async fn test_node_removed() {
        let store = TopologyStore::new();
        store
            .apply(vec![mayor(), rust_polecat("working")], vec![], Summary::default())
            .await;

        let diff = store
            .apply(vec![mayor()], vec![], Summary::default())
            .await
            .expect("diff");
        assert_eq!(diff.nodes_removed, vec!["zeppelin/polecats/rust".to_string()]);
        assert!(diff.nodes_added.is_empty());
    }

    #[tokio::test]
    async fn test_node_state_change_is_update() {
        let store = TopologyStore::new();
        store
            .apply(vec![mayor(), rust_polecat("idle")], vec![], Summary::default())
            .await;

        let diff = store
            .apply(vec![mayor(), rust_polecat("working")], vec![], Summary::default())
            .await
            .expect("diff");
        assert_eq!(diff.nodes_updated.len(), 1);
        assert_eq!(diff.nodes_updated[0].state, "working");
        assert!(diff.nodes_added.is_empty());
        assert!(diff.nodes_removed.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_change_is_update() {
        let store = TopologyStore::new();
        store
            .apply(vec![rust_polecat("working").with_metadata("hooked_bead", "zep-1")], vec![], Summary::default())
            .await;

        let diff = store
            .apply(vec![rust_polecat("working").with_metadata("hooked_bead", "zep-2")], vec![], Summary::default())
            .await
            .expect("diff");
        assert_eq!(diff.nodes_updated[0].metadata["hooked_bead"], "zep-2");
    }

    #[tokio::test]
    async fn test_edge_replaced() {
        let store = TopologyStore::new();
        store
            .apply(vec![mayor()], vec![Edge::new(relation::ASSIGNMENT, "a", "b")], Summary::default())
            .await;

        let diff = store
            .apply(vec![mayor()], vec![Edge::new(relation::MONITORING, "a", "c")], Summary::default())
            .await
            .expect("diff");
        assert_eq!(diff.edges_added.len(), 1);
        assert_eq!(diff.edges_added[0].key(), EdgeKey::new(relation::MONITORING, "a", "c"));
        assert_eq!(diff.edges_removed, vec![EdgeKey::new(relation::ASSIGNMENT, "a", "b")]);
    }

    #[tokio::test]
    async fn test_edge_label_change_is_invisible() {
        let store = TopologyStore::new();
        let edge = Edge::new(relation::ASSIGNMENT, "mayor", "zeppelin/polecats/rust");
        store
            .apply(vec![mayor()], vec![edge.clone().with_label("zep-1")], Summary::default())
            .await;

        let diff = store
            .apply(vec![mayor()], vec![edge.with_label("zep-2")], Summary::default())
            .await;
        assert!(diff.is_none());

        // The new label is still what snapshots report.
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.edges[0].label, "zep-2");
    }

    #[tokio::test]
    async fn test_summary_change_carries_full_summary() {
        let store = TopologyStore::new();
        let before = Summary {
            rig_count: 1,
            active_polecats: 3,
            open_beads: 7,
            active_convoys: 0,
        };
        store.apply(vec![mayor()], vec![], before).await;

        let after = Summary { rig_count: 2, ..before };
        let diff = store.apply(vec![mayor()], vec![], after).await.expect("diff");
        assert_eq!(diff.summary, Some(after));
        assert!(diff.nodes_added.is_empty());
    }

    #[tokio::test]
    async fn test_emptied_store_cold_starts_again() {
        let store = TopologyStore::new();
        store.apply(vec![mayor()], vec![], Summary::default()).await;

        let diff = store.apply(vec![], vec![], Summary::default()).await.expect("diff");
        assert_eq!(diff.nodes_removed, vec!["mayor".to_string()]);

        // Store is empty again, so the next population is a cold start.
        assert!(store.apply(vec![mayor()], vec![], Summary::default()).await.is_none());
    }

    #[tokio::test]
    async fn test_activity_bounded_fifo() {
        let store = TopologyStore::new();
        for i in 0..150 {
            store
                .append_activity(Activity::now("mail_sent", "mayor", format!("mail {}", i)))
                .await;
        }

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.activity.len(), ACTIVITY_LIMIT);
        assert_eq!(snapshot.activity[0].detail, "mail 50");
        assert_eq!(snapshot.activity[99].detail, "mail 149");
    }

    #[tokio::test]
    async fn test_snapshot_timestamp_is_read_time() {
        let store = TopologyStore::new();
        store.apply(vec![mayor()], vec![], Summary::default()).await;

        let first = store.snapshot().await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.snapshot().await;
        assert!(second.timestamp > first.timestamp);
    }

    #[test]
    fn test_compute_diff_ordering() {
        let old = vec![
            Node::new("a", kind::CREW, "a", "idle"),
            Node::new("b", kind::CREW, "b", "idle"),
            Node::new("c", kind::CREW, "c", "idle"),
        ];
        let new = vec![
            Node::new("e", kind::CREW, "e", "idle"),
            Node::new("b", kind::CREW, "b", "idle"),
            Node::new("d", kind::CREW, "d", "idle"),
        ];
        let s = Summary::default();
        let diff = compute_diff(&old, &new, &[], &[], &s, &s);

        let added: Vec<&str> = diff.nodes_added.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(added, vec!["e", "d"]);
        assert_eq!(diff.nodes_removed, vec!["a".to_string(), "c".to_string()]);
        assert!(diff.summary.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_applies_serialize() {
        use std::sync::Arc;

        let store = Arc::new(TopologyStore::new());
        store.apply(vec![mayor()], vec![], Summary::default()).await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let summary = Summary {
                    open_beads: i + 1,
                    ..Default::default()
                };
                store.apply(vec![mayor()], vec![], summary).await
            }));
        }

        for handle in handles {
            let diff = handle.await.unwrap().expect("every summary differs from its predecessor");
            assert!(diff.summary.is_some());
            assert!(diff.nodes_added.is_empty());
        }
        assert_eq!(store.node_count().await, 1);
    }
}
