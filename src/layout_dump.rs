use crate::ir::Graph;
use crate::layout::{GridLayout, Point, Rect, StackedLayout};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub kind: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<NodeDump>,
    pub links: Vec<LinkDump>,
    pub rows: Vec<RowDump>,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub id: String,
    pub name: String,
    pub node_type: String,
    pub cluster: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Serialize)]
pub struct LinkDump {
    pub id: String,
    pub source: String,
    pub target: String,
    pub points: Vec<[f32; 2]>,
}

#[derive(Debug, Serialize)]
pub struct RowDump {
    pub row: i32,
    pub clusters: Vec<String>,
}

impl LayoutDump {
    pub fn from_layout(layout: &StackedLayout, graph: &Graph) -> Self {
        let rows = layout
            .rows
            .iter()
            .map(|(row, clusters)| RowDump {
                row: *row,
                clusters: clusters.clone(),
            })
            .collect();
        Self::build(
            "stacked",
            layout.bounds,
            layout.nodes.values(),
            layout.links.values(),
            rows,
            graph,
        )
    }

    /// Grid cells are reported as rows too, one entry per occupied grid row.
    pub fn from_grid(layout: &GridLayout, graph: &Graph) -> Self {
        let mut by_row: std::collections::BTreeMap<i32, Vec<(i32, String)>> = Default::default();
        for (cluster, (row, col)) in &layout.cells {
            by_row.entry(*row).or_default().push((*col, cluster.clone()));
        }
        let rows = by_row
            .into_iter()
            .map(|(row, mut cells)| {
                cells.sort();
                RowDump {
                    row,
                    clusters: cells.into_iter().map(|(_, id)| id).collect(),
                }
            })
            .collect();
        Self::build(
            "grid",
            layout.bounds,
            layout.nodes.values(),
            layout.links.values(),
            rows,
            graph,
        )
    }

    fn build<'a>(
        kind: &str,
        bounds: Rect,
        nodes: impl Iterator<Item = &'a crate::layout::NodeLayout>,
        links: impl Iterator<Item = &'a crate::layout::RoutedLink>,
        rows: Vec<RowDump>,
        graph: &Graph,
    ) -> Self {
        let nodes = nodes
            .map(|node| NodeDump {
                id: node.id.clone(),
                name: graph.node_name(&node.id).to_string(),
                node_type: graph
                    .node_type(&node.id)
                    .map(|node_type| format!("{node_type:?}"))
                    .unwrap_or_default(),
                cluster: node.cluster.clone(),
                x: node.x,
                y: node.y,
                width: node.width,
                height: node.height,
            })
            .collect();
        let links = links
            .map(|link| LinkDump {
                id: link.id.clone(),
                source: link.source.clone(),
                target: link.target.clone(),
                points: link.points.iter().map(|Point { x, y }| [*x, *y]).collect(),
            })
            .collect();
        Self {
            kind: kind.to_string(),
            x: bounds.x,
            y: bounds.y,
            width: bounds.width,
            height: bounds.height,
            nodes,
            links,
            rows,
        }
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::layout::{AlwaysContinue, layout_graph};

    #[test]
    fn stacked_dump_lists_every_node_and_link() {
        let mut graph = Graph::new();
        graph.add_link("l1", "lacI", "lacZ");
        graph.add_link("l2", "lacZ", "lacY");
        let config = LayoutConfig::default();
        let layout = layout_graph(&graph, &config, None, &AlwaysContinue).unwrap();
        let dump = LayoutDump::from_layout(&layout, &graph);
        assert_eq!(dump.kind, "stacked");
        assert_eq!(dump.nodes.len(), 3);
        assert_eq!(dump.links.len(), 2);
        assert!(dump.links.iter().all(|link| link.points.len() >= 2));
        let json = dump.to_json_string().unwrap();
        assert!(json.contains("\"lacZ\""));
        assert!(json.contains("\"rows\""));
    }
}
