use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::layout::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Gene,
    Bubble,
    Intercell,
    Slash,
    Box,
    Bare,
    Diamond,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub node_type: NodeType,
    /// Geometry from an existing layout, when there is one.
    pub bounds: Option<Rect>,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// Read-only snapshot of the network being laid out.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: BTreeMap<String, Node>,
    pub links: BTreeMap<String, Link>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_node(&mut self, id: &str, name: Option<String>, node_type: Option<NodeType>) {
        let entry = self.nodes.entry(id.to_string()).or_insert(Node {
            id: id.to_string(),
            name: id.to_string(),
            node_type: NodeType::Gene,
            bounds: None,
        });
        if let Some(name) = name {
            entry.name = name;
        }
        if let Some(node_type) = node_type {
            entry.node_type = node_type;
        }
    }

    pub fn set_bounds(&mut self, id: &str, bounds: Rect) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.bounds = Some(bounds);
        }
    }

    /// Adds a link, creating gene nodes for unknown endpoints.
    pub fn add_link(&mut self, id: &str, source: &str, target: &str) {
        self.ensure_node(source, None, None);
        self.ensure_node(target, None, None);
        self.links.insert(
            id.to_string(),
            Link {
                id: id.to_string(),
                source: source.to_string(),
                target: target.to_string(),
            },
        );
    }

    pub fn node_type(&self, id: &str) -> Option<NodeType> {
        self.nodes.get(id).map(|node| node.node_type)
    }

    pub fn node_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.nodes
            .get(id)
            .map(|node| node.name.as_str())
            .unwrap_or(id)
    }

    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.values().filter(move |link| link.source == id)
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.values().filter(move |link| link.target == id)
    }

    /// Source ids keyed by target id.
    pub fn sources_by_target(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut out: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for link in self.links.values() {
            out.entry(link.target.as_str())
                .or_default()
                .insert(link.source.as_str());
        }
        out
    }

    /// Target ids keyed by source id.
    pub fn targets_by_source(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut out: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for link in self.links.values() {
            out.entry(link.source.as_str())
                .or_default()
                .insert(link.target.as_str());
        }
        out
    }
}

/// A core node plus the satellites bound to it, placed as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneCluster {
    pub core_id: String,
    pub satellites: Vec<String>,
    pub inputs: BTreeSet<String>,
    pub inbound_links: Vec<String>,
}

impl GeneCluster {
    pub fn new(core_id: &str) -> Self {
        Self {
            core_id: core_id.to_string(),
            satellites: Vec::new(),
            inputs: BTreeSet::new(),
            inbound_links: Vec::new(),
        }
    }

    pub fn with_inputs<I, S>(core_id: &str, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cluster = Self::new(core_id);
        cluster.inputs = inputs.into_iter().map(Into::into).collect();
        cluster
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.core_id.as_str()).chain(self.satellites.iter().map(String::as_str))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.core_id == id || self.satellites.iter().any(|sat| sat == id)
    }
}

/// Expression time-course data consulted by time-ordered row assignment.
pub trait TimeCourse {
    fn have_data(&self) -> bool;
    fn first_expression_time(&self, node_id: &str) -> Option<i32>;
}

#[derive(Debug, Clone, Default)]
pub struct TimeCourseTable {
    pub first_times: BTreeMap<String, i32>,
}

impl TimeCourseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node_id: &str, time: i32) {
        self.first_times.insert(node_id.to_string(), time);
    }
}

impl TimeCourse for TimeCourseTable {
    fn have_data(&self) -> bool {
        !self.first_times.is_empty()
    }

    fn first_expression_time(&self, node_id: &str) -> Option<i32> {
        self.first_times.get(node_id).copied()
    }
}
