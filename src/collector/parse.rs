//! Parsing of `gt` and `bd` output into graph nodes and edges

use crate::types::{kind, relation, Edge, Node, Summary};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

/// Treat an explicit JSON `null` like a missing field
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Output of `gt status --json`
#[derive(Debug, Default, Deserialize)]
pub struct GtStatus {
    #[serde(default, deserialize_with = "null_default")]
    pub rigs: Vec<RigInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RigInfo {
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub witness: AgentInfo,
    #[serde(default, deserialize_with = "null_default")]
    pub refinery: AgentInfo,
    #[serde(default, deserialize_with = "null_default")]
    pub polecats: Vec<AgentInfo>,
    #[serde(default, deserialize_with = "null_default")]
    pub crew: Vec<AgentInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentInfo {
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub state: String,
    #[serde(default, deserialize_with = "null_default")]
    pub details: BTreeMap<String, String>,
}

/// One row of `gt polecat list --all`, JSON or text
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PolecatEntry {
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub rig: String,
    #[serde(default, deserialize_with = "null_default")]
    pub state: String,
    #[serde(default, deserialize_with = "null_default")]
    pub hook: String,
}

/// One bead from `bd list --json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BeadInfo {
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_default")]
    pub assignee: String,
    #[serde(default, deserialize_with = "null_default")]
    pub priority: i64,
    #[serde(rename = "type", default, deserialize_with = "null_default")]
    pub kind: String,
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() {
        default
    } else {
        value
    }
}

fn mayor() -> Node {
    Node::new("mayor", kind::MAYOR, "Mayor", "running")
}

fn witness_id(rig: &str) -> String {
    format!("{}/witness", rig)
}

fn refinery_id(rig: &str) -> String {
    format!("{}/refinery", rig)
}

fn polecat_id(rig: &str, name: &str) -> String {
    format!("{}/polecats/{}", rig, name)
}

/// Parse `gt status --json`; `None` unless it parses and lists at least one rig
pub fn parse_status(json: &str) -> Option<GtStatus> {
    match serde_json::from_str::<GtStatus>(json) {
        Ok(status) if !status.rigs.is_empty() => Some(status),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "gt status output not usable");
            None
        }
    }
}

/// Build the agent graph from `gt status`
pub fn graph_from_status(status: &GtStatus) -> (Vec<Node>, Vec<Edge>) {
    let mut nodes = vec![mayor()];
    let mut edges = Vec::new();

    for rig in status.rigs.iter().filter(|r| !r.name.is_empty()) {
        let wid = witness_id(&rig.name);

        if !rig.witness.name.is_empty() {
            nodes.push(
                Node::new(&wid, kind::WITNESS, "Witness", or_default(&rig.witness.state, "running"))
                    .with_rig(&rig.name),
            );
        }

        if !rig.refinery.name.is_empty() {
            nodes.push(
                Node::new(
                    refinery_id(&rig.name),
                    kind::REFINERY,
                    "Refinery",
                    or_default(&rig.refinery.state, "running"),
                )
                .with_rig(&rig.name),
            );
        }

        for pc in &rig.polecats {
            let pid = polecat_id(&rig.name, &pc.name);
            let mut node = Node::new(&pid, kind::POLECAT, &pc.name, or_default(&pc.state, "idle"))
                .with_rig(&rig.name);
            node.metadata = pc.details.clone();
            nodes.push(node);

            if let Some(bead) = pc.details.get("hooked_bead").filter(|b| !b.is_empty()) {
                edges.push(Edge::new(relation::ASSIGNMENT, "mayor", &pid).with_label(bead));
            }
            edges.push(Edge::new(relation::MONITORING, &wid, &pid));
        }

        for cr in &rig.crew {
            nodes.push(
                Node::new(
                    format!("{}/crew/{}", rig.name, cr.name),
                    kind::CREW,
                    &cr.name,
                    or_default(&cr.state, "idle"),
                )
                .with_rig(&rig.name),
            );
        }
    }

    (nodes, edges)
}

/// Parse `gt polecat list --all --json`; `null` is an empty listing
pub fn parse_polecat_json(json: &str) -> Option<Vec<PolecatEntry>> {
    match serde_json::from_str::<Option<Vec<PolecatEntry>>>(json) {
        Ok(entries) => Some(entries.unwrap_or_default()),
        Err(e) => {
            debug!(error = %e, "gt polecat list JSON not usable");
            None
        }
    }
}

/// Parse the tabular text form of `gt polecat list --all`
///
/// Rows look like `rust  zeppelin  working  zep-toof`; the hook column is
/// optional. Comments, separators and header rows are skipped.
pub fn parse_polecat_text(text: &str) -> Vec<PolecatEntry> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('─'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 || matches!(fields[0], "NAME" | "name" | "Polecat") {
                return None;
            }
            Some(PolecatEntry {
                name: fields[0].to_string(),
                rig: fields[1].to_string(),
                state: fields[2].to_string(),
                hook: fields.get(3).map(|h| h.to_string()).unwrap_or_default(),
            })
        })
        .collect()
}

/// Build the agent graph from a polecat listing
///
/// Rigs are inferred from the polecats; each gets a witness and a refinery.
pub fn graph_from_polecats(entries: &[PolecatEntry]) -> (Vec<Node>, Vec<Edge>) {
    let mut nodes = vec![mayor()];
    let mut edges = Vec::new();
    let mut rigs = BTreeSet::new();

    for pc in entries {
        rigs.insert(pc.rig.as_str());
        let pid = polecat_id(&pc.rig, &pc.name);
        nodes.push(
            Node::new(&pid, kind::POLECAT, &pc.name, or_default(&pc.state, "idle"))
                .with_rig(&pc.rig)
                .with_metadata("hooked_bead", &pc.hook),
        );
        if !pc.hook.is_empty() {
            edges.push(Edge::new(relation::ASSIGNMENT, "mayor", &pid).with_label(&pc.hook));
        }
    }

    for rig in rigs {
        let wid = witness_id(rig);
        nodes.push(Node::new(&wid, kind::WITNESS, "Witness", "running").with_rig(rig));
        nodes.push(Node::new(refinery_id(rig), kind::REFINERY, "Refinery", "running").with_rig(rig));

        for pc in entries.iter().filter(|pc| pc.rig == rig) {
            edges.push(Edge::new(
                relation::MONITORING,
                &wid,
                polecat_id(&pc.rig, &pc.name),
            ));
        }
    }

    (nodes, edges)
}

/// Parse `bd list --json`
///
/// Empty output and `null` mean no beads. `None` when the output is not a
/// bead list at all.
pub fn parse_beads(json: &str) -> Option<Vec<BeadInfo>> {
    if json.trim().is_empty() {
        return Some(Vec::new());
    }
    match serde_json::from_str::<Option<Vec<BeadInfo>>>(json) {
        Ok(beads) => Some(beads.unwrap_or_default()),
        Err(e) => {
            debug!(error = %e, "bd list output not usable");
            None
        }
    }
}

/// Normalize a bead status to the states the frontend colours
pub fn map_bead_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "open" | "" => "unassigned".to_string(),
        "in_progress" | "in-progress" => "in_progress".to_string(),
        "closed" | "done" => "closed".to_string(),
        "hooked" => "hooked".to_string(),
        _ => status.to_string(),
    }
}

/// Bead nodes plus an assignment edge from each bead to its assignee
pub fn graph_from_beads(beads: &[BeadInfo]) -> (Vec<Node>, Vec<Edge>) {
    let mut nodes = Vec::with_capacity(beads.len());
    let mut edges = Vec::new();

    for bead in beads.iter().filter(|b| !b.id.is_empty()) {
        let bid = format!("bead:{}", bead.id);
        nodes.push(
            Node::new(&bid, kind::BEAD, &bead.id, map_bead_status(&bead.status))
                .with_metadata("title", &bead.title)
                .with_metadata("assignee", &bead.assignee),
        );
        if !bead.assignee.is_empty() {
            edges.push(Edge::new(relation::ASSIGNMENT, &bid, &bead.assignee));
        }
    }

    (nodes, edges)
}

/// Aggregate counters for the status bar
pub fn summarize(nodes: &[Node]) -> Summary {
    Summary {
        rig_count: count_where(nodes, |n| n.kind == kind::WITNESS),
        active_polecats: count_where(nodes, |n| n.kind == kind::POLECAT && n.state == "working"),
        open_beads: count_where(nodes, |n| n.kind == kind::BEAD),
        active_convoys: count_where(nodes, |n| n.kind == kind::CONVOY && n.state != "closed"),
    }
}

fn count_where(nodes: &[Node], pred: impl Fn(&Node) -> bool) -> usize {
    nodes.iter().filter(|&n| pred(n)).count()
}

/// Drop repeated node IDs and edge identities, keeping the first occurrence
pub fn dedupe(nodes: &mut Vec<Node>, edges: &mut Vec<Edge>) {
    let mut seen = HashSet::new();
    nodes.retain(|n| seen.insert(n.id.clone()));

    let mut seen = HashSet::new();
    edges.retain(|e| seen.insert(e.key()));
}
