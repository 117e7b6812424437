//! Grid layout mode: clusters sit in fixed cells and links run through the
//! channels along the top and left of every cell.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::LayoutConfig;
use crate::ir::{GeneCluster, Graph};

use super::error::{ProgressMonitor, checkpoint};
use super::grid_router::GridRouterPointSource;
use super::tracks::{GridGeometry, LineKey, TrackPool, TrackPosRC};
use super::types::{cluster_link_points, union_into};
use super::{GridLayout, LayoutError, LayoutResult, NodeLayout, Point, Rect, RoutedLink};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum GridTarget {
    Cell { row: i32, col: i32, node: String },
    /// Leaves the grid on the right.
    Outbound,
}

/// Places each cluster in its `(row, col)` cell and routes every link that
/// touches a placed cluster.
pub fn route_grid(
    graph: &Graph,
    clusters: &[GeneCluster],
    cells: &BTreeMap<String, (i32, i32)>,
    config: &LayoutConfig,
    monitor: &dyn ProgressMonitor,
) -> LayoutResult<GridLayout> {
    config.validate()?;
    let by_core: HashMap<&str, &GeneCluster> = clusters
        .iter()
        .map(|cluster| (cluster.core_id.as_str(), cluster))
        .collect();
    let mut occupied: BTreeSet<(i32, i32)> = BTreeSet::new();
    for (id, &(row, col)) in cells {
        if !by_core.contains_key(id.as_str()) {
            return Err(LayoutError::invalid(format!("cell given for unknown cluster {id}")));
        }
        if row < 0 || col < 0 {
            return Err(LayoutError::invalid(format!("cluster {id} placed at negative cell ({row}, {col})")));
        }
        if !occupied.insert((row, col)) {
            return Err(LayoutError::invalid(format!("cell ({row}, {col}) holds two clusters")));
        }
    }

    let geometry = GridGeometry::from_config(config, Point::new(0.0, 0.0));
    let mut nodes: BTreeMap<String, NodeLayout> = BTreeMap::new();
    let mut owner: HashMap<&str, (&str, i32, i32)> = HashMap::new();
    for (id, &(row, col)) in cells {
        let Some(cluster) = by_core.get(id.as_str()) else {
            continue;
        };
        for node in place_cluster(cluster, &geometry, config, row, col) {
            nodes.insert(node.id.clone(), node);
        }
        for member in cluster.members() {
            owner.insert(member, (id.as_str(), row, col));
        }
    }
    checkpoint(monitor, "grid placement")?;

    let mut by_source: BTreeMap<&str, Vec<(GridTarget, &str)>> = BTreeMap::new();
    let mut cluster_links: Vec<(&str, &str, &str)> = Vec::new();
    for link in graph.links.values() {
        let from = owner.get(link.source.as_str());
        let to = owner.get(link.target.as_str());
        match (from, to) {
            (Some((a, ..)), Some((b, ..))) if a == b && link.source != link.target => {
                cluster_links.push((link.id.as_str(), link.source.as_str(), link.target.as_str()));
            }
            (_, Some(&(_, row, col))) => {
                by_source.entry(link.source.as_str()).or_default().push((
                    GridTarget::Cell {
                        row,
                        col,
                        node: link.target.clone(),
                    },
                    link.id.as_str(),
                ));
            }
            (Some(_), None) => {
                by_source
                    .entry(link.source.as_str())
                    .or_default()
                    .push((GridTarget::Outbound, link.id.as_str()));
            }
            (None, None) => {}
        }
    }

    let max_row = occupied.iter().map(|(row, _)| *row).max().unwrap_or(0);
    let max_col = occupied.iter().map(|(_, col)| *col).max().unwrap_or(0);
    let border_x = geometry.origin.x + (max_col + 1) as f32 * geometry.cell_width + geometry.channel_width;

    // Tracks first; coordinates once every lane is known.
    let mut pool = TrackPool::new();
    let mut planned: Vec<PlannedLink<'_>> = Vec::new();
    let mut roots: BTreeMap<&str, TrackPosRC> = BTreeMap::new();
    for (source, mut targets) in by_source {
        checkpoint(monitor, "grid source")?;
        targets.sort();
        let placed = owner.get(source).map(|&(_, row, col)| (row, col));
        let mut router = match placed {
            Some((row, col)) => {
                let root = TrackPosRC::new(
                    pool.reserve_row(LineKey::line(row + 1)),
                    pool.reserve_col(LineKey::line(col + 1)),
                );
                roots.insert(source, root);
                GridRouterPointSource::new(source, root)
            }
            None => {
                let corner = TrackPosRC::new(
                    pool.reserve_row(LineKey::line(0)),
                    pool.reserve_col(LineKey::line(0)),
                );
                GridRouterPointSource::for_inbound(source, corner)
            }
        };

        let mut elbow: Option<TrackPosRC> = None;
        for (target, link_id) in targets {
            let (positions, end) = match target {
                GridTarget::Cell { row: tr, col: tc, node } => {
                    let positions = match placed {
                        None => router
                            .get_last_point_for_inbound(&mut pool, tr == 0, tr, tc, true)?
                            .route(),
                        Some((row, col)) if (tr, tc) == (row, col) => match elbow {
                            Some(pos) => vec![pos],
                            None => {
                                let hit = router.get_bottom_elbow_point(&mut pool, col)?;
                                elbow = Some(hit.pos);
                                hit.route()
                            }
                        },
                        Some((row, _)) if tr > row => router
                            .get_last_point(&mut pool, tr == row + 1, tr, tc, true)
                            .route(),
                        Some(_) => {
                            let dep = router.get_departing_point_to_core(&mut pool, tr, tc);
                            let hit = router.get_last_point_from(&mut pool, dep.pos, false, tr, tc, true)?;
                            let mut positions = Vec::new();
                            if hit.path.first() == Some(&dep.pos) {
                                positions.extend(dep.path.iter().copied());
                            }
                            positions.extend(hit.route());
                            positions
                        }
                    };
                    // Self loops come back up from the elbow under the node.
                    let bottom = placed == Some((tr, tc));
                    (positions, End::Node { id: node, bottom })
                }
                GridTarget::Outbound => (router.get_departing_point_to_outbound(&mut pool).route(), End::Border),
            };
            planned.push(PlannedLink {
                id: link_id,
                source,
                positions,
                end,
            });
        }
    }

    // Every distinct pad position arriving at a node gets its own slot on
    // the node's top edge; a pad resolves onto the slot of its first node.
    let mut arrivals: BTreeMap<&str, Vec<TrackPosRC>> = BTreeMap::new();
    let mut pad_owner: HashMap<TrackPosRC, (&str, bool)> = HashMap::new();
    for link in &planned {
        let (End::Node { id, bottom }, Some(&pad)) = (&link.end, link.positions.last()) else {
            continue;
        };
        if !*bottom {
            let pads = arrivals.entry(id.as_str()).or_default();
            if !pads.contains(&pad) {
                pads.push(pad);
            }
        }
        pad_owner.entry(pad).or_insert((id.as_str(), *bottom));
    }
    let lane = geometry.lane_spacing;
    let entry_x = |node: &NodeLayout, pad: TrackPosRC, bottom: bool| -> f32 {
        if bottom {
            return node.x + node.width - lane / 2.0;
        }
        let pads = arrivals.get(node.id.as_str()).map(Vec::as_slice).unwrap_or_default();
        let slot = pads.iter().position(|p| *p == pad).unwrap_or(0);
        // Top slots stay left of the bottom entry column.
        let usable = (node.width - lane).max(node.width / 2.0);
        let spacing = lane.min(usable / (pads.len() + 1) as f32);
        node.x + spacing * (slot + 1) as f32
    };
    let mut pad_x: HashMap<TrackPosRC, f32> = HashMap::new();
    for (pad, (id, bottom)) in &pad_owner {
        if let Some(node) = nodes.get(*id) {
            pad_x.insert(*pad, entry_x(node, *pad, *bottom));
        }
    }
    let locate = |pos: TrackPosRC| match pad_x.get(&pos) {
        Some(&x) => Point::new(x, geometry.row_y(pos.row, &pool)),
        None => geometry.resolve(pos, &pool),
    };

    let mut departures: BTreeMap<String, Vec<Point>> = BTreeMap::new();
    for (source, root) in &roots {
        let Some(node) = nodes.get(*source) else {
            continue;
        };
        let root_point = locate(*root);
        let mid_y = node.y + node.height / 2.0;
        departures.insert(
            source.to_string(),
            vec![
                Point::new(node.x + node.width, mid_y),
                Point::new(root_point.x, mid_y),
                root_point,
            ],
        );
    }

    let mut links: BTreeMap<String, RoutedLink> = BTreeMap::new();
    for link in &planned {
        let Some(&pad) = link.positions.last() else {
            return Err(LayoutError::internal(format!("link {} has no route", link.id)));
        };
        let mut points: Vec<Point> = Vec::with_capacity(link.positions.len() + 2);
        for pos in &link.positions {
            push(&mut points, locate(*pos));
        }
        let last = locate(pad);
        let target = match &link.end {
            End::Node { id, bottom } => {
                let Some(node) = nodes.get(id) else {
                    return Err(LayoutError::internal(format!("target {id} was not placed")));
                };
                // Own lane to the slot, then straight into the edge.
                let x = entry_x(node, pad, *bottom);
                let edge_y = if *bottom { node.y + node.height } else { node.y };
                push(&mut points, Point::new(x, last.y));
                push(&mut points, Point::new(x, edge_y));
                id.clone()
            }
            End::Border => {
                push(&mut points, Point::new(border_x, last.y));
                graph
                    .links
                    .get(link.id)
                    .map_or(String::new(), |routed| routed.target.clone())
            }
        };
        links.insert(
            link.id.to_string(),
            RoutedLink {
                id: link.id.to_string(),
                source: link.source.to_string(),
                target,
                points,
            },
        );
    }

    for (id, source, target) in cluster_links {
        let (Some(from), Some(to)) = (nodes.get(source), nodes.get(target)) else {
            continue;
        };
        let core = owner.get(source).and_then(|(core, ..)| nodes.get(*core));
        let y = core.map_or(from.y + from.height / 2.0, |core| core.y + core.height / 2.0);
        links.insert(
            id.to_string(),
            RoutedLink {
                id: id.to_string(),
                source: source.to_string(),
                target: target.to_string(),
                points: cluster_link_points(from, to, y),
            },
        );
    }

    let mut bounds = Some(Rect::new(
        geometry.origin.x,
        geometry.origin.y,
        border_x - geometry.origin.x,
        (max_row + 1) as f32 * geometry.cell_height + geometry.channel_height,
    ));
    for node in nodes.values() {
        union_into(&mut bounds, node.rect());
    }
    tracing::debug!(cells = cells.len(), links = links.len(), "routed grid layout");
    Ok(GridLayout {
        cells: cells.clone(),
        nodes,
        links,
        departures,
        bounds: bounds.unwrap_or_default(),
    })
}

struct PlannedLink<'a> {
    id: &'a str,
    source: &'a str,
    positions: Vec<TrackPosRC>,
    end: End,
}

enum End {
    /// Vertical run into the top edge, or the bottom edge for self loops.
    Node { id: String, bottom: bool },
    /// Run right to the grid border.
    Border,
}

fn push(points: &mut Vec<Point>, point: Point) {
    if points.last() != Some(&point) {
        points.push(point);
    }
}

/// Core flush right in the cell's node area, satellites in a strip before
/// it, all centered on the area's mid height.
fn place_cluster(cluster: &GeneCluster, geometry: &GridGeometry, config: &LayoutConfig, row: i32, col: i32) -> Vec<NodeLayout> {
    let (x, y, width, height) = geometry.node_area(row, col);
    let mid_y = y + height / 2.0;
    let core_x = x + width - config.node_width;
    let step = config.bubble_size + config.grid_size;
    let count = cluster.satellites.len();
    let mut out: Vec<NodeLayout> = cluster
        .satellites
        .iter()
        .enumerate()
        .map(|(idx, id)| NodeLayout {
            id: id.clone(),
            cluster: cluster.core_id.clone(),
            x: core_x - (count - idx) as f32 * step,
            y: mid_y - config.bubble_size / 2.0,
            width: config.bubble_size,
            height: config.bubble_size,
        })
        .collect();
    out.push(NodeLayout {
        id: cluster.core_id.clone(),
        cluster: cluster.core_id.clone(),
        x: core_x,
        y: mid_y - config.node_height / 2.0,
        width: config.node_width,
        height: config.node_height,
    });
    out
}
