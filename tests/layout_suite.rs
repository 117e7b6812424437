use std::collections::BTreeMap;
use std::path::Path;

use regnet_layout::layout::{
    RoutedLink, RowMap, StackGenerator, StackOrder, StackedLayout, build_clusters, is_orthogonal,
};
use regnet_layout::{
    AlwaysContinue, Graph, LayoutConfig, LayoutDump, NodeType, compute_rows,
    compute_stacked_layout, route_grid,
};

fn load_config(name: &str) -> LayoutConfig {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let input = std::fs::read_to_string(&path).expect("fixture read failed");
    LayoutConfig::from_json5(&input).expect("fixture config invalid")
}

/// Endomesoderm-like network: a chain of regulators with feedback, a few
/// shared input sets, and bubble intermediates.
fn regulatory_network() -> Graph {
    let mut graph = Graph::new();
    let genes = ["Wnt8", "Blimp1", "Otx", "GataE", "Bra", "FoxA", "Hox", "Delta"];
    for (idx, pair) in genes.windows(2).enumerate() {
        graph.add_link(&format!("chain{idx}"), pair[0], pair[1]);
    }
    graph.add_link("fb1", "Otx", "Wnt8");
    graph.add_link("ff1", "Blimp1", "Bra");
    graph.add_link("ff2", "Blimp1", "FoxA");
    graph.add_link("ff3", "Otx", "Bra");
    graph.add_link("ff4", "Otx", "FoxA");
    graph.add_link("self", "Hox", "Hox");
    graph.ensure_node("maternal", None, Some(NodeType::Bubble));
    graph.add_link("m1", "maternal", "Otx");
    graph
}

fn assert_complete(layout: &StackedLayout, graph: &Graph, label: &str) {
    for link in graph.links.values() {
        let routed = layout
            .links
            .get(&link.id)
            .unwrap_or_else(|| panic!("{label}: link {} not routed", link.id));
        assert!(routed.points.len() >= 2, "{label}: {} has no path", link.id);
        assert!(is_orthogonal(&routed.points), "{label}: {} not orthogonal", link.id);
    }
    for id in graph.nodes.keys() {
        assert!(layout.nodes.contains_key(id), "{label}: node {id} not placed");
    }
}

fn assert_on_grid(layout: &StackedLayout, config: &LayoutConfig, label: &str) {
    for link in layout.links.values() {
        for point in &link.points {
            assert!(
                config.on_grid(point.x) && config.on_grid(point.y),
                "{label}: {} has off-grid point ({}, {})",
                link.id,
                point.x,
                point.y
            );
        }
    }
}

/// Two rows of two batteries each. Row 0: `a*` listen to S and T, `b*` to
/// S. Row 1: `c*` listen to U and a1, `d*` to a1 alone.
fn battery_rows() -> (Graph, RowMap) {
    let mut graph = Graph::new();
    for target in ["a1", "a2", "b1", "b2"] {
        graph.add_link(&format!("S-{target}"), "S", target);
    }
    for target in ["a1", "a2"] {
        graph.add_link(&format!("T-{target}"), "T", target);
    }
    for target in ["c1", "c2"] {
        graph.add_link(&format!("U-{target}"), "U", target);
    }
    for target in ["c1", "c2", "d1", "d2"] {
        graph.add_link(&format!("a1-{target}"), "a1", target);
    }
    let row = |ids: [&str; 4]| ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
    let rows: RowMap = [(0, row(["a1", "a2", "b1", "b2"])), (1, row(["c1", "c2", "d1", "d2"]))]
        .into_iter()
        .collect();
    (graph, rows)
}

/// Fails when a vertex of one link lies on a segment of a link drawn for a
/// different source.
fn assert_sources_apart<'a>(links: impl IntoIterator<Item = &'a RoutedLink>, label: &str) {
    let links: Vec<&RoutedLink> = links.into_iter().collect();
    for link in &links {
        for other in &links {
            if link.source == other.source {
                continue;
            }
            for vertex in &link.points {
                let on_segment = other.points.windows(2).any(|seg| {
                    vertex.x >= seg[0].x.min(seg[1].x) - 1e-3
                        && vertex.x <= seg[0].x.max(seg[1].x) + 1e-3
                        && vertex.y >= seg[0].y.min(seg[1].y) - 1e-3
                        && vertex.y <= seg[0].y.max(seg[1].y) + 1e-3
                });
                assert!(
                    !on_segment,
                    "{label}: {} touches {} at ({}, {})",
                    link.id,
                    other.id,
                    vertex.x,
                    vertex.y
                );
            }
        }
    }
}

fn stacked(graph: &Graph, config: &LayoutConfig) -> StackedLayout {
    let clusters = build_clusters(graph, config);
    let rows = compute_rows(graph, &clusters, config, None, None).expect("rows failed");
    compute_stacked_layout(graph, &clusters, &rows, config, None, &AlwaysContinue)
        .expect("layout failed")
}

#[test]
fn stacked_layout_routes_network_with_defaults() {
    let graph = regulatory_network();
    let config = LayoutConfig::default();
    let layout = stacked(&graph, &config);
    assert_complete(&layout, &graph, "defaults");
    assert_on_grid(&layout, &config, "defaults");
    assert!(layout.rows.len() > 1, "feed-forward chain should span several rows");
}

#[test]
fn stacked_sources_never_share_geometry() {
    let graph = regulatory_network();
    let layout = stacked(&graph, &LayoutConfig::default());
    assert_sources_apart(layout.links.values(), "network");
}

#[test]
fn battery_rows_keep_sources_apart() {
    let (graph, rows) = battery_rows();
    let config = LayoutConfig::default();
    let clusters = build_clusters(&graph, &config);
    let layout = compute_stacked_layout(&graph, &clusters, &rows, &config, None, &AlwaysContinue)
        .expect("layout failed");
    assert_eq!(layout.links.len(), graph.links.len());
    for link in layout.links.values() {
        assert!(is_orthogonal(&link.points), "batteries: {} not orthogonal", link.id);
    }
    assert_on_grid(&layout, &config, "batteries");
    assert_sources_apart(layout.links.values(), "batteries");
}

#[test]
fn stacked_layout_honors_fixture_config() {
    let graph = regulatory_network();
    let config = load_config("compact.json5");
    assert!(config.compress_rows);
    let layout = stacked(&graph, &config);
    assert_complete(&layout, &graph, "compact");
    assert_on_grid(&layout, &config, "compact");
    for cores in layout.rows.values() {
        assert!(cores.len() <= config.max_row_size, "row exceeds max_row_size");
    }
}

#[test]
fn rows_never_overlap_vertically() {
    let graph = regulatory_network();
    let config = LayoutConfig::default();
    let layout = stacked(&graph, &config);
    let mut spans: Vec<(f32, f32)> = layout
        .rows
        .values()
        .map(|cores| {
            let top = cores
                .iter()
                .map(|id| layout.nodes[id].y)
                .fold(f32::INFINITY, f32::min);
            let bottom = cores
                .iter()
                .map(|id| layout.nodes[id].rect().bottom())
                .fold(f32::NEG_INFINITY, f32::max);
            (top, bottom)
        })
        .collect();
    spans.sort_by(|a, b| a.0.total_cmp(&b.0));
    for pair in spans.windows(2) {
        assert!(pair[0].1 < pair[1].0, "rows overlap: {pair:?}");
    }
}

#[test]
fn previous_tracks_are_reused() {
    let graph = regulatory_network();
    let config = LayoutConfig::default();
    let clusters = build_clusters(&graph, &config);
    let rows = compute_rows(&graph, &clusters, &config, None, None).unwrap();
    let first = compute_stacked_layout(&graph, &clusters, &rows, &config, None, &AlwaysContinue)
        .unwrap();
    let second = compute_stacked_layout(
        &graph,
        &clusters,
        &rows,
        &config,
        Some(&first.global_tracks),
        &AlwaysContinue,
    )
    .unwrap();
    assert_eq!(first.global_tracks, second.global_tracks);
}

#[test]
fn stack_order_round_trips_through_node_bounds() {
    let mut graph = regulatory_network();
    // Battery blocks offset their cores below the series top.
    let config = LayoutConfig {
        use_batteries: false,
        ..LayoutConfig::default()
    };
    let layout = stacked(&graph, &config);
    let mut cores = Vec::new();
    for cluster_cores in layout.rows.values() {
        for id in cluster_cores {
            graph.set_bounds(id, layout.nodes[id].rect());
            cores.push(id.clone());
        }
    }
    let order = StackGenerator::new(config.grid_size)
        .build_stack_order(&graph, &cores)
        .expect("stack order failed");
    let StackOrder::Rows(rows) = order else {
        panic!("laid out rows should never be ambiguous");
    };
    let recovered: Vec<Vec<String>> = rows.into_values().collect();
    let original: Vec<Vec<String>> = layout.rows.values().cloned().collect();
    assert_eq!(recovered, original);
}

#[test]
fn grid_mode_routes_network() {
    let graph = regulatory_network();
    let config = LayoutConfig::default();
    let clusters = build_clusters(&graph, &config);
    let cells: BTreeMap<String, (i32, i32)> = clusters
        .iter()
        .enumerate()
        .map(|(idx, cluster)| (cluster.core_id.clone(), (idx as i32 / 3, idx as i32 % 3)))
        .collect();
    let layout = route_grid(&graph, &clusters, &cells, &config, &AlwaysContinue)
        .expect("grid routing failed");
    for link in graph.links.values() {
        let routed = layout
            .links
            .get(&link.id)
            .unwrap_or_else(|| panic!("grid: link {} not routed", link.id));
        assert!(is_orthogonal(&routed.points), "grid: {} not orthogonal", link.id);
    }
    assert_sources_apart(layout.links.values(), "grid");
    let dump = LayoutDump::from_grid(&layout, &graph);
    assert_eq!(dump.links.len(), graph.links.len());
    assert!(dump.width > 0.0 && dump.height > 0.0);
}

#[test]
fn dump_serializes_stacked_layout() {
    let graph = regulatory_network();
    let layout = stacked(&graph, &LayoutConfig::default());
    let json = LayoutDump::from_layout(&layout, &graph)
        .to_json_string()
        .expect("dump failed");
    let value: serde_json::Value = serde_json::from_str(&json).expect("dump is not json");
    assert_eq!(value["kind"], "stacked");
    assert_eq!(
        value["links"].as_array().map(Vec::len),
        Some(graph.links.len())
    );
}
