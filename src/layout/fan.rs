use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::config::LayoutConfig;
use crate::ir::{GeneCluster, Graph, NodeType};

/// Finds the bubble nodes that exclusively feed a target.
pub struct FanBuilder<'a> {
    graph: &'a Graph,
    outgoing: BTreeMap<&'a str, BTreeSet<&'a str>>,
    incoming: BTreeMap<&'a str, BTreeSet<&'a str>>,
}

impl<'a> FanBuilder<'a> {
    pub fn new(graph: &'a Graph) -> Self {
        Self {
            graph,
            outgoing: graph.targets_by_source(),
            incoming: graph.sources_by_target(),
        }
    }

    /// Returns `target` plus every node of an `ok_types` type drawn from
    /// `sources` whose outputs all end up, directly or through other such
    /// nodes, at `target`.
    pub fn build_fan_in(
        &self,
        target: &str,
        sources: &BTreeSet<String>,
        ok_types: &[NodeType],
    ) -> BTreeSet<String> {
        let mut candidates: BTreeSet<&str> = sources
            .iter()
            .map(String::as_str)
            .filter(|id| {
                self.graph
                    .node_type(id)
                    .is_some_and(|node_type| ok_types.contains(&node_type))
            })
            .collect();
        candidates.insert(target);

        // Anything that leaks to a non-candidate cannot be part of the fan.
        loop {
            let doomed: Vec<&str> = candidates
                .iter()
                .copied()
                .filter(|id| *id != target)
                .filter(|id| {
                    self.outgoing
                        .get(id)
                        .is_some_and(|targets| targets.iter().any(|t| !candidates.contains(t)))
                })
                .collect();
            if doomed.is_empty() {
                break;
            }
            for id in doomed {
                candidates.remove(id);
            }
        }

        // Closed loops among candidates survive pruning; keep only what drains into target.
        let mut fan: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        fan.insert(target.to_string());
        queue.push_back(target);
        while let Some(id) = queue.pop_front() {
            let Some(feeders) = self.incoming.get(id) else {
                continue;
            };
            for feeder in feeders {
                if candidates.contains(feeder) && fan.insert(feeder.to_string()) {
                    queue.push_back(feeder);
                }
            }
        }
        fan
    }
}

/// Groups every node of the graph into clusters: one per non-bubble core,
/// with its exclusive bubble fan-in as satellites. Leftover nodes stand alone.
pub fn build_clusters(graph: &Graph, config: &LayoutConfig) -> Vec<GeneCluster> {
    let fan = FanBuilder::new(graph);
    let mut claimed: BTreeSet<String> = BTreeSet::new();
    let mut clusters: Vec<GeneCluster> = Vec::new();

    for node in graph.nodes.values() {
        if config.is_bubble_type(node.node_type) {
            continue;
        }
        let pool: BTreeSet<String> = graph
            .nodes
            .keys()
            .filter(|id| **id != node.id && !claimed.contains(*id))
            .cloned()
            .collect();
        let fan_in = fan.build_fan_in(&node.id, &pool, &config.bubble_types);
        let mut cluster = GeneCluster::new(&node.id);
        cluster.satellites = fan_in.into_iter().filter(|id| *id != node.id).collect();
        claimed.insert(node.id.clone());
        claimed.extend(cluster.satellites.iter().cloned());
        clusters.push(cluster);
    }
    for id in graph.nodes.keys() {
        if !claimed.contains(id) {
            clusters.push(GeneCluster::new(id));
        }
    }

    let mut owner: BTreeMap<&str, usize> = BTreeMap::new();
    for (idx, cluster) in clusters.iter().enumerate() {
        for member in cluster.members() {
            owner.insert(member, idx);
        }
    }
    let mut inbound: Vec<(usize, String, String)> = Vec::new();
    for link in graph.links.values() {
        let (Some(&src), Some(&trg)) = (
            owner.get(link.source.as_str()),
            owner.get(link.target.as_str()),
        ) else {
            continue;
        };
        if src != trg {
            inbound.push((trg, link.source.clone(), link.id.clone()));
        }
    }
    for (idx, source, link_id) in inbound {
        clusters[idx].inputs.insert(source);
        clusters[idx].inbound_links.push(link_id);
    }
    tracing::debug!(clusters = clusters.len(), "built gene clusters");
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_ids(graph: &Graph) -> BTreeSet<String> {
        graph.nodes.keys().cloned().collect()
    }

    #[test]
    fn fan_in_collects_exclusive_bubble_chain() {
        let mut graph = Graph::new();
        graph.ensure_node("b1", None, Some(NodeType::Bubble));
        graph.ensure_node("b2", None, Some(NodeType::Bubble));
        graph.add_link("l1", "G0", "b1");
        graph.add_link("l2", "b1", "b2");
        graph.add_link("l3", "b2", "T");
        let fan = FanBuilder::new(&graph).build_fan_in("T", &all_ids(&graph), &[NodeType::Bubble]);
        let expected: BTreeSet<String> = ["T", "b1", "b2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(fan, expected);
    }

    #[test]
    fn fan_in_drops_bubbles_leaking_elsewhere() {
        let mut graph = Graph::new();
        graph.ensure_node("b1", None, Some(NodeType::Bubble));
        graph.ensure_node("b2", None, Some(NodeType::Bubble));
        graph.add_link("l1", "b1", "T");
        graph.add_link("l2", "b2", "b1");
        graph.add_link("l3", "b2", "OTHER");
        let fan = FanBuilder::new(&graph).build_fan_in("T", &all_ids(&graph), &[NodeType::Bubble]);
        assert!(fan.contains("b1"));
        assert!(!fan.contains("b2"));
    }

    #[test]
    fn fan_in_drops_closed_loops() {
        // b1 <-> b2 never reach T, and neither leaks, so only the BFS removes them.
        let mut graph = Graph::new();
        graph.ensure_node("T", None, Some(NodeType::Gene));
        graph.ensure_node("b1", None, Some(NodeType::Bubble));
        graph.ensure_node("b2", None, Some(NodeType::Bubble));
        graph.add_link("l1", "b1", "b2");
        graph.add_link("l2", "b2", "b1");
        let fan = FanBuilder::new(&graph).build_fan_in("T", &all_ids(&graph), &[NodeType::Bubble]);
        assert_eq!(fan.len(), 1);
        assert!(fan.contains("T"));
    }

    #[test]
    fn fan_in_is_subset_of_target_and_ok_types() {
        let mut graph = Graph::new();
        graph.ensure_node("s1", None, Some(NodeType::Slash));
        graph.ensure_node("b1", None, Some(NodeType::Bubble));
        graph.add_link("l1", "s1", "T");
        graph.add_link("l2", "b1", "T");
        graph.add_link("l3", "G", "T");
        let fan = FanBuilder::new(&graph).build_fan_in("T", &all_ids(&graph), &[NodeType::Bubble]);
        for id in &fan {
            assert!(id == "T" || graph.node_type(id) == Some(NodeType::Bubble));
        }
        assert!(fan.contains("b1"));
        assert!(!fan.contains("s1"));
    }

    #[test]
    fn clusters_absorb_exclusive_bubbles_and_record_inputs() {
        let mut graph = Graph::new();
        graph.ensure_node("b1", None, Some(NodeType::Bubble));
        graph.add_link("l1", "A", "b1");
        graph.add_link("l2", "b1", "B");
        graph.add_link("l3", "A", "B");
        let config = LayoutConfig::default();
        let clusters = build_clusters(&graph, &config);
        assert_eq!(clusters.len(), 2);
        let b = clusters.iter().find(|c| c.core_id == "B").unwrap();
        assert_eq!(b.satellites, vec!["b1".to_string()]);
        assert_eq!(b.inputs.iter().collect::<Vec<_>>(), vec!["A"]);
        assert_eq!(b.inbound_links, vec!["l1".to_string(), "l3".to_string()]);
    }
}
