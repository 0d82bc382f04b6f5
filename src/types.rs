//! Graph model for the Gas Town topology
//!
//! Nodes are agents, beads and convoys; edges are the relationships between
//! them. A [`Snapshot`] is the whole picture at one instant, a [`Diff`] is what
//! changed between two observations. Both serialize to the JSON shapes the
//! frontend consumes (`type: "snapshot"` / `type: "diff"`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Node kinds emitted by the collector
pub mod kind {
    pub const MAYOR: &str = "mayor";
    pub const WITNESS: &str = "witness";
    pub const REFINERY: &str = "refinery";
    pub const POLECAT: &str = "polecat";
    pub const CREW: &str = "crew";
    pub const BEAD: &str = "bead";
    pub const CONVOY: &str = "convoy";
}

/// Edge kinds emitted by the collector
pub mod relation {
    pub const ASSIGNMENT: &str = "assignment";
    pub const MONITORING: &str = "monitoring";
}

/// An agent, bead or convoy
///
/// Two nodes are equal only when every attribute matches, metadata included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Globally unique ID (e.g. `zeppelin/polecats/rust`, `bead:zep-12`)
    pub id: String,
    /// Category tag (`mayor`, `polecat`, `bead`, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Human readable label
    pub label: String,
    /// Rig the node belongs to, empty for fleet-wide nodes
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rig: String,
    /// State label (`running`, `idle`, `working`, `unassigned`, ...)
    pub state: String,
    /// Category specific metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        label: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            label: label.into(),
            rig: String::new(),
            state: state.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_rig(mut self, rig: impl Into<String>) -> Self {
        self.rig = rig.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A directed relationship between two nodes
///
/// Identity is `(kind, source, target)`; label and metadata ride along but
/// never participate in change detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Edge {
    pub fn new(
        kind: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: kind.into(),
            label: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Identity triple of this edge
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            kind: self.kind.clone(),
            source: self.source.clone(),
            target: self.target.clone(),
        }
    }
}

/// Identity of an edge: `(kind, source, target)`
///
/// Serializes as `"<kind>:<source>:<target>"`, the form the frontend matches
/// removed edges against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub kind: String,
    pub source: String,
    pub target: String,
}

impl EdgeKey {
    pub fn new(
        kind: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.source, self.target)
    }
}

impl Serialize for EdgeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A recent event in the fleet (mail sent, merge complete, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub agent: String,
    pub detail: String,
}

impl Activity {
    /// Create an activity stamped with the current time
    pub fn now(
        event: impl Into<String>,
        agent: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            event: event.into(),
            agent: agent.into(),
            detail: detail.into(),
        }
    }
}

/// Aggregate counters for the status bar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Monitoring units, one witness per rig
    pub rig_count: usize,
    /// Polecats currently in the `working` state
    pub active_polecats: usize,
    /// Open work items
    pub open_beads: usize,
    /// Convoys in flight
    pub active_convoys: usize,
}

/// Full topology state sent to a newly connected observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "snapshot")]
pub struct Snapshot {
    /// Time the snapshot was read, not the time of the last observation
    pub timestamp: DateTime<Utc>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub activity: Vec<Activity>,
    pub summary: Summary,
}

/// Changes between two consecutive observations
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "diff")]
pub struct Diff {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nodes_added: Vec<Node>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nodes_removed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nodes_updated: Vec<Node>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub edges_added: Vec<Edge>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub edges_removed: Vec<EdgeKey>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub activity_append: Vec<Activity>,
    /// Replacement summary, present only when any counter changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

impl Diff {
    /// An empty diff stamped with the current time
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            nodes_added: Vec::new(),
            nodes_removed: Vec::new(),
            nodes_updated: Vec::new(),
            edges_added: Vec::new(),
            edges_removed: Vec::new(),
            activity_append: Vec::new(),
            summary: None,
        }
    }

    /// A diff carrying a single appended activity entry
    pub fn activity(entry: Activity) -> Self {
        Self {
            activity_append: vec![entry],
            ..Self::new()
        }
    }

    /// True when no field carries a change
    pub fn is_empty(&self) -> bool {
        self.nodes_added.is_empty()
            && self.nodes_removed.is_empty()
            && self.nodes_updated.is_empty()
            && self.edges_added.is_empty()
            && self.edges_removed.is_empty()
            && self.activity_append.is_empty()
            && self.summary.is_none()
    }
}

impl Default for Diff {
    fn default() -> Self {
        Self::new()
    }
}
