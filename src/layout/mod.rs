mod battery;
mod compression;
mod error;
mod fan;
mod grid;
mod grid_router;
mod meta_source;
mod rows;
mod search;
mod series;
mod stack_order;
mod stacked;
pub mod tracks;
pub(crate) mod types;

pub use battery::*;
pub use compression::*;
pub use error::{AlwaysContinue, LayoutError, LayoutResult, ProgressMonitor};
pub use fan::*;
pub use grid::*;
pub use grid_router::*;
pub use meta_source::*;
pub use rows::*;
pub use series::{ClusterSeries, InboundLink};
pub use stack_order::*;
pub use stacked::*;
pub use types::*;

use std::collections::BTreeMap;

use crate::config::LayoutConfig;
use crate::ir::{GeneCluster, Graph, TimeCourse};

use error::checkpoint;

/// Assigns `clusters` to rows with the strategy named in `config`.
pub fn compute_rows(
    graph: &Graph,
    clusters: &[GeneCluster],
    config: &LayoutConfig,
    assignment: Option<&RowMap>,
    time_course: Option<&dyn TimeCourse>,
) -> LayoutResult<RowMap> {
    config.validate()?;
    let params = RowParams {
        max_row_size: config.max_row_size,
        chunked: config.chunked,
        assignment,
        time_course,
    };
    RowBuilder::new(graph, clusters).compute_rows(config.row_strategy, params)
}

/// Runs a full stacked layout: collect, prep, locate around the origin,
/// then route. `monitor` is polled once nodes are placed and again before
/// each row's sources are routed; cancellation discards everything.
pub fn compute_stacked_layout(
    graph: &Graph,
    clusters: &[GeneCluster],
    rows: &RowMap,
    config: &LayoutConfig,
    previous_tracks: Option<&BTreeMap<String, i32>>,
    monitor: &dyn ProgressMonitor,
) -> LayoutResult<StackedLayout> {
    let mut stack = StackedClusterSeries::new(graph, clusters, rows, config)?;
    stack.prep(previous_tracks)?;
    stack.locate(Point::new(0.0, 0.0))?;
    checkpoint(monitor, "node placement")?;
    stack.route(monitor)?;
    stack.into_layout()
}

/// Clusters the graph, assigns rows, and lays the result out as a stack.
pub fn layout_graph(
    graph: &Graph,
    config: &LayoutConfig,
    time_course: Option<&dyn TimeCourse>,
    monitor: &dyn ProgressMonitor,
) -> LayoutResult<StackedLayout> {
    let clusters = build_clusters(graph, config);
    let rows = compute_rows(graph, &clusters, config, None, time_course)?;
    compute_stacked_layout(graph, &clusters, &rows, config, None, monitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::NodeType;
    use std::cell::Cell;

    struct CountingMonitor {
        polls: Cell<usize>,
        allow: usize,
    }

    impl ProgressMonitor for CountingMonitor {
        fn keep_going(&self) -> bool {
            let polls = self.polls.get() + 1;
            self.polls.set(polls);
            polls <= self.allow
        }
    }

    fn regulatory_graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_link("l1", "A", "B");
        graph.add_link("l2", "A", "C");
        graph.add_link("l3", "B", "D");
        graph.add_link("l4", "C", "D");
        graph.add_link("l5", "D", "A");
        graph.ensure_node("bub", None, Some(NodeType::Bubble));
        graph.add_link("l6", "bub", "D");
        graph
    }

    #[test]
    fn cancellation_after_placement_skips_routing() {
        let graph = regulatory_graph();
        let config = LayoutConfig::default();
        let clusters = build_clusters(&graph, &config);
        let rows = compute_rows(&graph, &clusters, &config, None, None).unwrap();
        let monitor = CountingMonitor {
            polls: Cell::new(0),
            allow: 0,
        };
        let result = compute_stacked_layout(&graph, &clusters, &rows, &config, None, &monitor);
        assert_eq!(result.unwrap_err(), LayoutError::Cancelled);
        // Only the placement checkpoint ran; no row was routed.
        assert_eq!(monitor.polls.get(), 1);
    }

    #[test]
    fn cancellation_mid_routing_propagates() {
        let graph = regulatory_graph();
        let config = LayoutConfig::default();
        let monitor = CountingMonitor {
            polls: Cell::new(0),
            allow: 2,
        };
        let result = layout_graph(&graph, &config, None, &monitor);
        assert!(result.unwrap_err().is_cancelled());
    }

    #[test]
    fn full_pipeline_routes_every_link() {
        let graph = regulatory_graph();
        let config = LayoutConfig::default();
        let layout = layout_graph(&graph, &config, None, &AlwaysContinue).unwrap();
        assert_eq!(layout.links.len(), graph.links.len());
        assert!(layout.nodes.contains_key("bub"));
        assert_eq!(layout.nodes["bub"].cluster, "D");
        for link in layout.links.values() {
            assert!(is_orthogonal(&link.points), "{} is not orthogonal", link.id);
        }
    }

    #[test]
    fn compute_rows_rejects_bad_config() {
        let graph = regulatory_graph();
        let mut config = LayoutConfig::default();
        config.trace_offset = 15.0;
        assert!(matches!(
            compute_rows(&graph, &[], &config, None, None),
            Err(LayoutError::InvalidArgument(_))
        ));
    }
}
