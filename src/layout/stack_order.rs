use std::collections::BTreeMap;

use crate::ir::Graph;

use super::rows::RowMap;
use super::{LayoutError, LayoutResult, Rect};

/// Row ordering recovered from an existing drawing.
#[derive(Debug, Clone, PartialEq)]
pub enum StackOrder {
    Rows(RowMap),
    /// Two cores in one band overlap horizontally, so their order cannot be
    /// read off the drawing.
    Ambiguous,
}

/// Reads rows off existing node geometry: empty grid rows between occupied
/// runs separate the bands.
#[derive(Debug, Clone, Copy)]
pub struct StackGenerator {
    grid_size: f32,
}

impl StackGenerator {
    pub fn new(grid_size: f32) -> Self {
        Self { grid_size }
    }

    pub fn build_stack_order(&self, graph: &Graph, cores: &[String]) -> LayoutResult<StackOrder> {
        if !(self.grid_size > 0.0) {
            return Err(LayoutError::invalid("grid size must be positive"));
        }
        let mut placed: Vec<(&str, Rect)> = Vec::with_capacity(cores.len());
        for id in cores {
            let Some(node) = graph.nodes.get(id) else {
                return Err(LayoutError::invalid(format!("unknown core {id}")));
            };
            let Some(bounds) = node.bounds else {
                return Err(LayoutError::invalid(format!("core {id} has no bounds")));
            };
            placed.push((id.as_str(), bounds));
        }

        let mut occupancy: BTreeMap<i64, usize> = BTreeMap::new();
        for (_, rect) in &placed {
            let (first, last) = self.grid_rows(rect);
            for row in first..=last {
                *occupancy.entry(row).or_insert(0) += 1;
            }
        }
        let holes = find_holes(&occupancy);

        let mut bands: BTreeMap<i32, Vec<(&str, Rect)>> = BTreeMap::new();
        for (id, rect) in placed {
            let (top, _) = self.grid_rows(&rect);
            let band = holes.iter().filter(|hole| **hole < top).count() as i32;
            bands.entry(band).or_default().push((id, rect));
        }

        let mut rows = RowMap::new();
        for (band, mut members) in bands {
            members.sort_by(|a, b| a.1.x.total_cmp(&b.1.x).then_with(|| a.0.cmp(b.0)));
            let mut reach = f32::NEG_INFINITY;
            for (_, rect) in &members {
                if rect.x < reach {
                    tracing::debug!(band, "overlapping cores make the stack order ambiguous");
                    return Ok(StackOrder::Ambiguous);
                }
                reach = reach.max(rect.right());
            }
            rows.insert(band, members.into_iter().map(|(id, _)| id.to_string()).collect());
        }
        tracing::debug!(holes = holes.len(), rows = rows.len(), "built stack order");
        Ok(StackOrder::Rows(rows))
    }

    /// First and last grid row a rectangle touches.
    fn grid_rows(&self, rect: &Rect) -> (i64, i64) {
        let first = (rect.y / self.grid_size).floor() as i64;
        let last = ((rect.bottom() / self.grid_size).ceil() as i64 - 1).max(first);
        (first, last)
    }
}

/// First empty row of every gap between occupied rows.
fn find_holes(occupancy: &BTreeMap<i64, usize>) -> Vec<i64> {
    let mut holes = Vec::new();
    let mut previous: Option<i64> = None;
    for row in occupancy.keys() {
        if let Some(prev) = previous
            && *row > prev + 1
        {
            holes.push(prev + 1);
        }
        previous = Some(*row);
    }
    holes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(boxes: &[(&str, f32, f32, f32, f32)]) -> Graph {
        let mut graph = Graph::new();
        for (id, x, y, w, h) in boxes {
            graph.ensure_node(id, None, None);
            graph.set_bounds(id, Rect::new(*x, *y, *w, *h));
        }
        graph
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn holes_split_bands_sorted_by_x() {
        let graph = graph_with(&[
            ("b", 200.0, 0.0, 60.0, 40.0),
            ("a", 0.0, 10.0, 60.0, 40.0),
            ("c", 100.0, 120.0, 60.0, 40.0),
        ]);
        let order = StackGenerator::new(10.0)
            .build_stack_order(&graph, &ids(&["a", "b", "c"]))
            .unwrap();
        let StackOrder::Rows(rows) = order else {
            panic!("expected rows");
        };
        assert_eq!(rows[&0], ids(&["a", "b"]));
        assert_eq!(rows[&1], ids(&["c"]));
    }

    #[test]
    fn no_gap_means_one_row() {
        let graph = graph_with(&[
            ("a", 0.0, 0.0, 60.0, 40.0),
            ("b", 100.0, 30.0, 60.0, 40.0),
            ("c", 200.0, 60.0, 60.0, 40.0),
        ]);
        let order = StackGenerator::new(10.0)
            .build_stack_order(&graph, &ids(&["a", "b", "c"]))
            .unwrap();
        assert_eq!(
            order,
            StackOrder::Rows([(0, ids(&["a", "b", "c"]))].into_iter().collect())
        );
    }

    #[test]
    fn stacked_cores_in_one_band_are_ambiguous() {
        let graph = graph_with(&[("a", 0.0, 0.0, 60.0, 40.0), ("b", 20.0, 40.0, 60.0, 40.0)]);
        let order = StackGenerator::new(10.0)
            .build_stack_order(&graph, &ids(&["a", "b"]))
            .unwrap();
        assert_eq!(order, StackOrder::Ambiguous);
    }

    #[test]
    fn cores_need_bounds() {
        let mut graph = Graph::new();
        graph.ensure_node("a", None, None);
        assert!(matches!(
            StackGenerator::new(10.0).build_stack_order(&graph, &ids(&["a"])),
            Err(LayoutError::InvalidArgument(_))
        ));
        assert!(StackGenerator::new(10.0)
            .build_stack_order(&graph, &ids(&["missing"]))
            .is_err());
    }

    #[test]
    fn holes_mark_each_gap_once() {
        let occupancy: BTreeMap<i64, usize> = [(0, 1), (1, 1), (5, 2), (6, 1), (9, 1)].into_iter().collect();
        assert_eq!(find_holes(&occupancy), vec![2, 7]);
    }
}
