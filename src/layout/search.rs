use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

use crate::ir::{GeneCluster, Graph};

/// Cluster-to-cluster edges `(source core, target core)`, one per distinct pair.
pub(super) fn cluster_edges(clusters: &[GeneCluster]) -> Vec<(String, String)> {
    let mut owner: HashMap<&str, &str> = HashMap::new();
    for cluster in clusters {
        for member in cluster.members() {
            owner.insert(member, cluster.core_id.as_str());
        }
    }
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut edges = Vec::new();
    for cluster in clusters {
        for input in &cluster.inputs {
            let Some(&src) = owner.get(input.as_str()) else {
                continue;
            };
            if src != cluster.core_id && seen.insert((src, cluster.core_id.as_str())) {
                edges.push((src.to_string(), cluster.core_id.clone()));
            }
        }
    }
    edges
}

/// Longest-path depth of every node. Cycles are broken by taking the
/// remaining node earliest in `node_ids` as the next source, which turns its
/// incoming edges into ignored back edges.
pub(super) fn topological_depths(
    node_ids: &[String],
    edges: &[(String, String)],
) -> HashMap<String, usize> {
    let set: HashSet<&str> = node_ids.iter().map(String::as_str).collect();
    let order_key: HashMap<&str, usize> = node_ids
        .iter()
        .enumerate()
        .map(|(idx, id)| (id.as_str(), idx))
        .collect();
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut indeg: HashMap<&str, usize> = set.iter().map(|id| (*id, 0)).collect();
    for (from, to) in edges {
        if set.contains(from.as_str()) && set.contains(to.as_str()) && from != to {
            adj.entry(from.as_str()).or_default().push(to.as_str());
            *indeg.entry(to.as_str()).or_insert(0) += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<(usize, &str)>> = BinaryHeap::new();
    for id in &set {
        if indeg.get(id).copied().unwrap_or(0) == 0 {
            ready.push(Reverse((order_key[id], *id)));
        }
    }

    let mut order: Vec<&str> = Vec::with_capacity(set.len());
    let mut processed: HashSet<&str> = HashSet::new();
    loop {
        while let Some(Reverse((_key, id))) = ready.pop() {
            if !processed.insert(id) {
                continue;
            }
            order.push(id);
            for next in adj.get(id).into_iter().flatten() {
                if processed.contains(next) {
                    continue;
                }
                if let Some(deg) = indeg.get_mut(next) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(Reverse((order_key[next], *next)));
                    }
                }
            }
        }
        if processed.len() >= set.len() {
            break;
        }
        let best = node_ids
            .iter()
            .map(String::as_str)
            .find(|id| !processed.contains(id));
        match best {
            Some(id) => ready.push(Reverse((order_key[id], id))),
            None => break,
        }
    }

    let position: HashMap<&str, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut depths: HashMap<String, usize> = HashMap::new();
    for id in &order {
        let depth = *depths.entry(id.to_string()).or_insert(0);
        let from_idx = position[id];
        for next in adj.get(id).into_iter().flatten() {
            if position[next] <= from_idx {
                continue;
            }
            let entry = depths.entry(next.to_string()).or_insert(0);
            *entry = (*entry).max(depth + 1);
        }
    }
    depths
}

/// Groups clusters connected through shared inputs. Groups come largest
/// first; members within a group come by input count, descending.
pub(super) fn cluster_groups_by_inputs(clusters: &[GeneCluster]) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..clusters.len()).collect();
    fn find(parent: &mut [usize], mut idx: usize) -> usize {
        while parent[idx] != idx {
            parent[idx] = parent[parent[idx]];
            idx = parent[idx];
        }
        idx
    }

    let mut first_user: HashMap<&str, usize> = HashMap::new();
    for (idx, cluster) in clusters.iter().enumerate() {
        for input in &cluster.inputs {
            match first_user.get(input.as_str()) {
                Some(&other) => {
                    let a = find(&mut parent, idx);
                    let b = find(&mut parent, other);
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
                None => {
                    first_user.insert(input.as_str(), idx);
                }
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for idx in 0..clusters.len() {
        let root = find(&mut parent, idx);
        groups.entry(root).or_default().push(idx);
    }
    let mut groups: Vec<Vec<usize>> = groups.into_values().collect();
    for group in &mut groups {
        group.sort_by_key(|idx| (Reverse(clusters[*idx].inputs.len()), *idx));
    }
    groups.sort_by_key(|group| (Reverse(group.len()), group.iter().min().copied()));
    groups
}

/// Orders sources by how many nodes they drive, then groups each cluster
/// under its highest-ranked input. Clusters without inputs come last.
pub(super) fn cluster_groups_by_source_order(
    clusters: &[GeneCluster],
    graph: &Graph,
) -> Vec<Vec<usize>> {
    let mut sources: Vec<&str> = clusters
        .iter()
        .flat_map(|cluster| cluster.inputs.iter().map(String::as_str))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let degree = |id: &str| graph.outgoing(id).count();
    sources.sort_by(|a, b| degree(*b).cmp(&degree(*a)).then_with(|| a.cmp(b)));
    let rank: HashMap<&str, usize> = sources.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, cluster) in clusters.iter().enumerate() {
        let key = cluster
            .inputs
            .iter()
            .filter_map(|input| rank.get(input.as_str()).copied())
            .min()
            .unwrap_or(usize::MAX);
        groups.entry(key).or_default().push(idx);
    }
    groups.into_values().collect()
}

/// Number of distinct inputs feeding a group of clusters.
pub(super) fn source_count(clusters: &[GeneCluster], group: &[usize]) -> usize {
    group
        .iter()
        .flat_map(|idx| clusters[*idx].inputs.iter())
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn edge(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn depths_follow_longest_path() {
        let nodes = ids(&["A", "B", "C", "D"]);
        let edges = vec![edge("A", "B"), edge("B", "C"), edge("A", "C"), edge("A", "D")];
        let depths = topological_depths(&nodes, &edges);
        assert_eq!(depths["A"], 0);
        assert_eq!(depths["B"], 1);
        assert_eq!(depths["C"], 2);
        assert_eq!(depths["D"], 1);
    }

    #[test]
    fn depths_survive_cycles() {
        let nodes = ids(&["A", "B", "C"]);
        let edges = vec![edge("A", "B"), edge("B", "C"), edge("C", "A")];
        let depths = topological_depths(&nodes, &edges);
        assert_eq!(depths.len(), 3);
        assert_eq!(depths["A"], 0);
        assert_eq!(depths["C"], 2);
    }

    #[test]
    fn shared_inputs_join_groups() {
        let clusters = vec![
            GeneCluster::with_inputs("c1", ["A"]),
            GeneCluster::with_inputs("c2", ["B"]),
            GeneCluster::with_inputs("c3", ["A", "C"]),
            GeneCluster::with_inputs("c4", ["C"]),
        ];
        let groups = cluster_groups_by_inputs(&clusters);
        assert_eq!(groups, vec![vec![2, 0, 3], vec![1]]);
        assert_eq!(source_count(&clusters, &groups[0]), 2);
    }

    #[test]
    fn source_order_groups_under_busiest_input() {
        let mut graph = Graph::new();
        graph.add_link("l1", "A", "c1");
        graph.add_link("l2", "A", "c2");
        graph.add_link("l3", "B", "c2");
        graph.add_link("l4", "B", "c3");
        graph.add_link("l5", "A", "c3");
        let clusters = vec![
            GeneCluster::with_inputs("c1", ["A"]),
            GeneCluster::with_inputs("c3", ["B"]),
            GeneCluster::with_inputs("c2", ["A", "B"]),
            GeneCluster::new("c0"),
        ];
        let groups = cluster_groups_by_source_order(&clusters, &graph);
        assert_eq!(groups, vec![vec![0, 2], vec![1], vec![3]]);
    }
}
