use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use regnet_layout::config::{LayoutConfig, RowStrategy};
use regnet_layout::ir::{Graph, NodeType};
use regnet_layout::layout::{
    AlwaysContinue, build_clusters, compute_rows, compute_stacked_layout, route_grid,
};
use std::collections::BTreeMap;
use std::hint::black_box;

/// Chain of genes plus skip links, with a bubble feeding every fourth gene.
fn dense_network(genes: usize, extra_links: usize) -> Graph {
    let mut graph = Graph::new();
    if genes == 0 {
        return graph;
    }
    for i in 0..genes {
        graph.ensure_node(&format!("G{}", i), None, None);
    }
    for i in 0..genes.saturating_sub(1) {
        graph.add_link(&format!("c{}", i), &format!("G{}", i), &format!("G{}", i + 1));
    }
    let mut count = 0usize;
    for i in 0..genes {
        for j in (i + 2)..genes {
            if count >= extra_links {
                break;
            }
            graph.add_link(&format!("s{}", count), &format!("G{}", i), &format!("G{}", j));
            count += 1;
        }
        if count >= extra_links {
            break;
        }
    }
    for i in (0..genes).step_by(4) {
        let bubble = format!("B{}", i);
        graph.ensure_node(&bubble, None, Some(NodeType::Bubble));
        graph.add_link(&format!("b{}", i), &bubble, &format!("G{}", i));
    }
    graph
}

fn bench_stacked(c: &mut Criterion) {
    let mut group = c.benchmark_group("stacked_layout");
    for strategy in [RowStrategy::Sort, RowStrategy::Inputs, RowStrategy::SourceOrder] {
        let config = LayoutConfig {
            row_strategy: strategy,
            ..LayoutConfig::default()
        };
        for (genes, extra_links) in [(40usize, 80usize), (80, 320)] {
            let name = format!("{:?}_{}_{}", strategy, genes, extra_links);
            let graph = dense_network(genes, extra_links);
            group.bench_with_input(BenchmarkId::from_parameter(name), &graph, |b, graph| {
                b.iter(|| {
                    let clusters = build_clusters(black_box(graph), &config);
                    let rows = compute_rows(graph, &clusters, &config, None, None)
                        .expect("rows failed");
                    let layout = compute_stacked_layout(
                        graph,
                        &clusters,
                        &rows,
                        &config,
                        None,
                        &AlwaysContinue,
                    )
                    .expect("layout failed");
                    black_box(layout.links.len());
                });
            });
        }
    }
    group.finish();
}

fn bench_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_routing");
    let config = LayoutConfig::default();
    for (genes, extra_links) in [(40usize, 80usize), (80, 320)] {
        let name = format!("dense_{}_{}", genes, extra_links);
        let graph = dense_network(genes, extra_links);
        let clusters = build_clusters(&graph, &config);
        let side = (clusters.len() as f64).sqrt().ceil() as i32;
        let cells: BTreeMap<String, (i32, i32)> = clusters
            .iter()
            .enumerate()
            .map(|(idx, cluster)| (cluster.core_id.clone(), (idx as i32 / side, idx as i32 % side)))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(name), &graph, |b, graph| {
            b.iter(|| {
                let layout = route_grid(black_box(graph), &clusters, &cells, &config, &AlwaysContinue)
                    .expect("grid failed");
                black_box(layout.links.len());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_stacked, bench_grid);
criterion_main!(benches);
