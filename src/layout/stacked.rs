//! Stacks one [`ClusterSeries`] per row and routes every link entering the
//! stack's clusters.
//!
//! The computation runs in fixed stages: [`StackedClusterSeries::new`]
//! collects the series, [`StackedClusterSeries::prep`] classifies sources and
//! assigns global tracks, [`StackedClusterSeries::locate`] fixes geometry, and
//! [`StackedClusterSeries::route`] emits link points. Sources inside the stack
//! leave their cluster through a departure stub and reach other rows along a
//! trunk lane on the right; sources outside the stack come down a global
//! track on the left.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::LayoutConfig;
use crate::ir::{GeneCluster, Graph};

use super::compression::LayoutCompressionFramework;
use super::error::{ProgressMonitor, checkpoint};
use super::meta_source::{MetaClusterPointSource, SourceMode};
use super::rows::RowMap;
use super::series::{ClusterSeries, RowTarget, StackContext};
use super::tracks::GlobalTrackAssignment;
use super::types::{cluster_link_points, union_into};
use super::{LayoutError, LayoutResult, NodeLayout, Point, Rect, RoutedLink, StackedLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Collected,
    Prepared,
    Located,
    Routed,
}

/// A source whose cluster sits in the stack.
#[derive(Debug, Clone)]
struct InternalSource {
    cluster: String,
    row: usize,
    /// Series indices holding at least one target.
    target_rows: BTreeSet<usize>,
    /// Links leaving the stack.
    outbound: Vec<String>,
}

impl InternalSource {
    fn departs(&self) -> bool {
        !self.outbound.is_empty() || self.target_rows.iter().any(|row| *row != self.row)
    }
}

#[derive(Debug, Clone, Copy)]
struct StackFrame {
    bounds: Rect,
    content_right: f32,
    node_bounds: Option<Rect>,
}

#[derive(Debug, Default)]
struct RouteBook {
    links: BTreeMap<String, RoutedLink>,
}

impl RouteBook {
    fn start_link(&mut self, id: &str, source: &str, target: &str, points: Vec<Point>) -> LayoutResult<()> {
        if self.links.contains_key(id) {
            return Err(LayoutError::internal(format!("link {id} started twice")));
        }
        self.links.insert(
            id.to_string(),
            RoutedLink {
                id: id.to_string(),
                source: source.to_string(),
                target: target.to_string(),
                points,
            },
        );
        Ok(())
    }
}

pub struct StackedClusterSeries<'a> {
    config: &'a LayoutConfig,
    clusters: BTreeMap<String, GeneCluster>,
    row_keys: Vec<i32>,
    series: Vec<ClusterSeries>,
    /// Node id to the core id of its cluster, for nodes in the stack.
    owner: HashMap<String, String>,
    series_of: HashMap<String, usize>,
    links: HashMap<String, (String, String)>,
    internal: BTreeMap<String, InternalSource>,
    tracks: GlobalTrackAssignment,
    trunk_lanes: BTreeMap<String, usize>,
    frame: Option<StackFrame>,
    book: RouteBook,
    departures: BTreeMap<String, Vec<Point>>,
    stage: Stage,
}

impl<'a> StackedClusterSeries<'a> {
    /// Builds one series per row of `rows`, top to bottom.
    pub fn new(graph: &Graph, clusters: &[GeneCluster], rows: &RowMap, config: &'a LayoutConfig) -> LayoutResult<Self> {
        config.validate()?;
        let by_core: BTreeMap<String, GeneCluster> = clusters
            .iter()
            .map(|cluster| (cluster.core_id.clone(), cluster.clone()))
            .collect();

        let mut stacked: BTreeMap<String, GeneCluster> = BTreeMap::new();
        let mut series_of: HashMap<String, usize> = HashMap::new();
        for (idx, ids) in rows.values().enumerate() {
            for id in ids {
                let Some(cluster) = by_core.get(id) else {
                    return Err(LayoutError::invalid(format!("row names unknown cluster {id}")));
                };
                if series_of.insert(id.clone(), idx).is_some() {
                    return Err(LayoutError::invalid(format!("cluster {id} placed in two rows")));
                }
                stacked.insert(id.clone(), cluster.clone());
            }
        }

        let ctx = StackContext {
            config,
            clusters: &stacked,
        };
        let mut series = Vec::with_capacity(rows.len());
        for (row, ids) in rows {
            series.push(ClusterSeries::collect(*row, ids, &ctx)?);
        }

        let mut owner = HashMap::new();
        for cluster in stacked.values() {
            for member in cluster.members() {
                owner.insert(member.to_string(), cluster.core_id.clone());
            }
        }
        let links = graph
            .links
            .values()
            .map(|link| (link.id.clone(), (link.source.clone(), link.target.clone())))
            .collect();

        Ok(Self {
            config,
            clusters: stacked,
            row_keys: rows.keys().copied().collect(),
            series,
            owner,
            series_of,
            links,
            internal: BTreeMap::new(),
            tracks: GlobalTrackAssignment::default(),
            trunk_lanes: BTreeMap::new(),
            frame: None,
            book: RouteBook::default(),
            departures: BTreeMap::new(),
            stage: Stage::Collected,
        })
    }

    fn expect_stage(&self, stage: Stage, operation: &str) -> LayoutResult<()> {
        if self.stage == stage {
            Ok(())
        } else {
            Err(LayoutError::invalid(format!(
                "{operation} called in stage {:?}, expected {stage:?}",
                self.stage
            )))
        }
    }

    pub fn series(&self) -> &[ClusterSeries] {
        &self.series
    }

    pub fn global_tracks(&self) -> &GlobalTrackAssignment {
        &self.tracks
    }

    /// Classifies every link source as internal or external, assigns global
    /// tracks to external ones (keeping `previous` where still valid) and
    /// sizes each series' trace and departure bands.
    pub fn prep(&mut self, previous: Option<&BTreeMap<String, i32>>) -> LayoutResult<()> {
        self.expect_stage(Stage::Collected, "prep")?;
        let ctx = StackContext {
            config: self.config,
            clusters: &self.clusters,
        };
        for series in &mut self.series {
            series.preprocess(&ctx, &self.owner, &self.links);
        }

        let mut external: BTreeSet<String> = BTreeSet::new();
        let mut internal: BTreeMap<String, InternalSource> = BTreeMap::new();
        for (idx, series) in self.series.iter().enumerate() {
            for link in series.inbound_links() {
                if !link.internal {
                    external.insert(link.source.clone());
                    continue;
                }
                let Some(cluster) = self.owner.get(&link.source) else {
                    continue;
                };
                let Some(&row) = self.series_of.get(cluster) else {
                    continue;
                };
                internal
                    .entry(link.source.clone())
                    .or_insert_with(|| InternalSource {
                        cluster: cluster.clone(),
                        row,
                        target_rows: BTreeSet::new(),
                        outbound: Vec::new(),
                    })
                    .target_rows
                    .insert(idx);
            }
        }
        let mut outbound: Vec<(&String, &String)> = self
            .links
            .iter()
            .filter(|(_, (source, target))| {
                self.owner.contains_key(source) && !self.owner.contains_key(target)
            })
            .map(|(id, (source, _))| (source, id))
            .collect();
        outbound.sort();
        for (source, id) in outbound {
            let Some(cluster) = self.owner.get(source) else {
                continue;
            };
            let Some(&row) = self.series_of.get(cluster) else {
                continue;
            };
            internal
                .entry(source.clone())
                .or_insert_with(|| InternalSource {
                    cluster: cluster.clone(),
                    row,
                    target_rows: BTreeSet::new(),
                    outbound: Vec::new(),
                })
                .outbound
                .push(id.clone());
        }

        self.tracks = GlobalTrackAssignment::assign(&external, previous);

        // Trunk lanes go to departing sources by (row, id).
        let mut departing: Vec<(&usize, &String)> = internal
            .iter()
            .filter(|(_, info)| info.departs())
            .map(|(id, info)| (&info.row, id))
            .collect();
        departing.sort();
        self.trunk_lanes = departing
            .into_iter()
            .enumerate()
            .map(|(lane, (_, id))| (id.clone(), lane))
            .collect();

        for (idx, series) in self.series.iter_mut().enumerate() {
            let mut feeding_external: Vec<(i32, String)> = Vec::new();
            let mut feeding_internal: Vec<(usize, String)> = Vec::new();
            let mut seen: BTreeSet<String> = BTreeSet::new();
            for link in series.inbound_links() {
                if !seen.insert(link.source.clone()) {
                    continue;
                }
                if link.internal {
                    let row = internal.get(&link.source).map_or(idx, |info| info.row);
                    feeding_internal.push((row, link.source.clone()));
                } else if let Some(track) = self.tracks.track_for(&link.source) {
                    feeding_external.push((track, link.source.clone()));
                }
            }
            feeding_external.sort();
            feeding_internal.sort();
            let traces = feeding_external
                .into_iter()
                .map(|(_, id)| id)
                .chain(feeding_internal.into_iter().map(|(_, id)| id))
                .collect();
            series.set_traces(traces);

            let departures = internal
                .iter()
                .filter(|(_, info)| info.row == idx && info.departs())
                .map(|(id, _)| id.clone())
                .collect();
            series.set_departures(departures);
        }
        self.internal = internal;

        tracing::debug!(
            series = self.series.len(),
            global_tracks = self.tracks.len(),
            trunk_lanes = self.trunk_lanes.len(),
            "prepared stack"
        );
        self.stage = Stage::Prepared;
        Ok(())
    }

    /// Stacks the series centered on `center`, snapped to the grid.
    pub fn locate(&mut self, center: Point) -> LayoutResult<()> {
        self.expect_stage(Stage::Prepared, "locate")?;
        let config = self.config;
        let ctx = StackContext {
            config,
            clusters: &self.clusters,
        };
        let offset = config.trace_offset;
        let gap = offset + config.row_gap;

        let sizes: Vec<(f32, f32)> = self.series.iter().map(|series| series.measure(&ctx)).collect();
        let content_width = sizes.iter().map(|(w, _)| *w).fold(0.0, f32::max);
        let global_count = self.tracks.max_track().map_or(0, |track| track + 1);
        let global_width = (global_count + 1) as f32 * offset;
        let trunk_width = (self.trunk_lanes.len() + 2) as f32 * offset;
        let width = global_width + content_width + trunk_width;
        let rows_height: f32 = sizes.iter().map(|(_, h)| *h).sum();
        let gaps = self.series.len().saturating_sub(1) as f32 * gap;
        let height = offset + rows_height + gaps;

        let left = config.snap(center.x - width / 2.0);
        let top = config.snap(center.y - height / 2.0);
        let content_left = left + global_width;

        let mut bounds = Some(Rect::new(left, top, width, height));
        let mut node_bounds = None;
        let mut cursor = top + offset;
        for (series, (_, series_height)) in self.series.iter_mut().zip(&sizes) {
            series.locate(&ctx, content_left, cursor);
            if let Some(rect) = series.bounds() {
                union_into(&mut bounds, rect);
            }
            if let Some(rect) = series.node_bounds() {
                union_into(&mut node_bounds, rect);
            }
            cursor += series_height + gap;
        }
        let bounds = bounds.unwrap_or_default();
        self.frame = Some(StackFrame {
            bounds,
            content_right: content_left + content_width,
            node_bounds,
        });
        tracing::debug!(
            x = bounds.x,
            y = bounds.y,
            width = bounds.width,
            height = bounds.height,
            "located stack"
        );
        self.stage = Stage::Located;
        Ok(())
    }

    /// Node boxes of every cluster member in the stack.
    pub fn node_layouts(&self) -> BTreeMap<String, NodeLayout> {
        let ctx = StackContext {
            config: self.config,
            clusters: &self.clusters,
        };
        self.series
            .iter()
            .flat_map(|series| series.node_layouts(&ctx))
            .map(|node| (node.id.clone(), node))
            .collect()
    }

    fn frame(&self) -> LayoutResult<StackFrame> {
        self.frame
            .ok_or_else(|| LayoutError::internal("stack routed before locate"))
    }

    fn trunk_x(&self, frame: &StackFrame, source: &str) -> Option<f32> {
        let lane = self.trunk_lanes.get(source)?;
        Some(frame.content_right + (*lane + 1) as f32 * self.config.trace_offset)
    }

    /// Routes every link, checking `monitor` before each source row.
    pub fn route(&mut self, monitor: &dyn ProgressMonitor) -> LayoutResult<()> {
        self.expect_stage(Stage::Located, "route")?;
        for idx in 0..self.series.len() {
            checkpoint(monitor, "route row")?;
            self.route_row_sources(idx)?;
        }
        self.stacked_setup_for_inbound_sources()?;
        self.stacked_setup_for_outbound_sources()?;
        self.route_cluster_internal_links()?;
        tracing::debug!(links = self.book.links.len(), "routed stack");
        self.stage = Stage::Routed;
        Ok(())
    }

    /// Pass 1 then pass 2 for every source whose cluster sits in row `idx`.
    fn route_row_sources(&mut self, idx: usize) -> LayoutResult<()> {
        let frame = self.frame()?;
        let config = self.config;
        let ctx = StackContext {
            config,
            clusters: &self.clusters,
        };
        let sources: Vec<(String, InternalSource)> = self
            .internal
            .iter()
            .filter(|(_, info)| info.row == idx)
            .map(|(id, info)| (id.clone(), info.clone()))
            .collect();
        tracing::trace!(row = self.row_keys.get(idx).copied(), sources = sources.len(), "routing row sources");

        for (source, info) in sources {
            let series = &self.series[idx];
            let out = series.out_pad(&info.cluster, config)?;
            let stub = out.with_x(out.x + config.grid_size);
            let trunk = match self.trunk_x(&frame, &source) {
                Some(trunk_x) => {
                    let dep_y = series.departure_y(&source, config)?;
                    let foot = Point::new(trunk_x, dep_y);
                    self.departures.insert(
                        source.clone(),
                        vec![out, stub, stub.with_y(dep_y), foot],
                    );
                    Some(foot)
                }
                None => {
                    self.departures.insert(source.clone(), vec![out, stub]);
                    None
                }
            };

            // Pass 1: targets sharing the source's row.
            if info.target_rows.contains(&idx) {
                let mut pen = MetaClusterPointSource::new(&source, SourceMode::IntraSource, stub, config.grid_size)?;
                route_to_series(&self.series[idx], &ctx, &self.links, &mut self.book, &mut pen)?;
                pen.close();
            }

            // Pass 2: sweep down, then up, from the trunk foot.
            let Some(foot) = trunk else {
                continue;
            };
            let mut down = MetaClusterPointSource::new(&source, SourceMode::AlwaysBelow, foot, config.grid_size)?;
            for row in (idx + 1)..self.series.len() {
                if info.target_rows.contains(&row) {
                    route_to_series(&self.series[row], &ctx, &self.links, &mut self.book, &mut down)?;
                }
            }
            down.close();
            let mut up = MetaClusterPointSource::new(&source, SourceMode::AlwaysBelow, foot, config.grid_size)?;
            for row in (0..idx).rev() {
                if info.target_rows.contains(&row) {
                    route_to_series(&self.series[row], &ctx, &self.links, &mut self.book, &mut up)?;
                }
            }
            up.close();
        }
        Ok(())
    }

    /// External sources ride their global track down the left margin and
    /// tee into each row they feed.
    fn stacked_setup_for_inbound_sources(&mut self) -> LayoutResult<()> {
        let frame = self.frame()?;
        let config = self.config;
        let ctx = StackContext {
            config,
            clusters: &self.clusters,
        };
        for (track, source) in self.tracks.sources_by_track() {
            let base = Point::new(
                frame.bounds.x + (track + 1) as f32 * config.trace_offset,
                frame.bounds.y,
            );
            let mut pen = MetaClusterPointSource::new(source, SourceMode::InboundSource, base, config.grid_size)?;
            for series in &self.series {
                route_to_series(series, &ctx, &self.links, &mut self.book, &mut pen)?;
            }
            pen.close();
        }
        Ok(())
    }

    /// Links leaving the stack run from the trunk foot to the right border.
    fn stacked_setup_for_outbound_sources(&mut self) -> LayoutResult<()> {
        let frame = self.frame()?;
        let border_x = frame.content_right
            + (self.trunk_lanes.len() + 1) as f32 * self.config.trace_offset;
        for (source, info) in &self.internal {
            if info.outbound.is_empty() {
                continue;
            }
            let Some(foot) = self.departures.get(source).and_then(|path| path.last().copied()) else {
                return Err(LayoutError::internal(format!("outbound source {source} has no departure")));
            };
            for id in &info.outbound {
                let target = self.links.get(id).map_or("", |(_, target)| target.as_str());
                self.book
                    .start_link(id, source, target, vec![foot, foot.with_x(border_x)])?;
            }
        }
        Ok(())
    }

    /// Links between members of one cluster run straight across at mid
    /// height; self loops hook out of the right edge and back.
    fn route_cluster_internal_links(&mut self) -> LayoutResult<()> {
        let nodes = self.node_layouts();
        let mut internal: Vec<(&String, &String, &String)> = self
            .links
            .iter()
            .filter(|(_, (source, target))| {
                let (Some(a), Some(b)) = (self.owner.get(source), self.owner.get(target)) else {
                    return false;
                };
                a == b
            })
            .map(|(id, (source, target))| (id, source, target))
            .collect();
        internal.sort();
        for (id, source, target) in internal {
            let (Some(from), Some(to)) = (nodes.get(source), nodes.get(target)) else {
                return Err(LayoutError::internal(format!("cluster link {id} has unplaced ends")));
            };
            let core = self.owner.get(source).and_then(|core| nodes.get(core));
            let y = core.map_or(from.y + from.height / 2.0, |core| core.y + core.height / 2.0);
            let points = if source == target {
                let right = from.x + from.width;
                let hook = right + self.config.grid_size;
                let top = from.y + self.config.grid_size;
                vec![
                    Point::new(right, y),
                    Point::new(hook, y),
                    Point::new(hook, top),
                    Point::new(right, top),
                ]
            } else {
                cluster_link_points(from, to, y)
            };
            self.book.start_link(id, source, target, points)?;
        }
        Ok(())
    }

    /// Finishes the computation, closing wide row gaps when configured.
    pub fn into_layout(self) -> LayoutResult<StackedLayout> {
        self.expect_stage(Stage::Routed, "into_layout")?;
        let frame = self.frame()?;
        let mut layout = StackedLayout {
            rows: self
                .row_keys
                .iter()
                .zip(&self.series)
                .map(|(row, series)| (*row, series.cluster_ids()))
                .collect(),
            nodes: self.node_layouts(),
            links: self.book.links,
            departures: self.departures,
            global_tracks: self.tracks.to_map(),
            bounds: frame.bounds,
            node_bounds: frame.node_bounds.unwrap_or_default(),
        };
        if self.config.compress_rows {
            let framework = LayoutCompressionFramework::new(self.series.iter().filter_map(ClusterSeries::bounds));
            compress_layout(&mut layout, framework, self.config.min_row_gap);
        }
        Ok(layout)
    }
}

/// Sweeps `pen` across the targets its source feeds in `series`.
fn route_to_series(
    series: &ClusterSeries,
    ctx: &StackContext<'_>,
    links: &HashMap<String, (String, String)>,
    book: &mut RouteBook,
    pen: &mut MetaClusterPointSource,
) -> LayoutResult<()> {
    let source = pen.source().to_string();
    let targets = series.targets_of(&source);
    if targets.is_empty() {
        return Ok(());
    }
    let config = ctx.config;
    let trace_y = series.trace_y(&source, config)?;
    let target_of = |id: &str| links.get(id).map_or(String::new(), |(_, target)| target.clone());
    let cluster_of = |id: &str| {
        ctx.clusters
            .get(id)
            .ok_or_else(|| LayoutError::internal(format!("unknown cluster {id}")))
    };

    let mut battery_pen: Option<MetaClusterPointSource> = None;
    for target in targets {
        match target {
            RowTarget::Cluster { cluster, links: ids } => {
                let pad = series.pad_for(cluster_of(&cluster)?, &source, config)?;
                for id in ids {
                    let points = pen.link_to_pad(&cluster, trace_y, pad)?;
                    book.start_link(&id, &source, &target_of(&id), points)?;
                }
            }
            RowTarget::Battery { id, members } => {
                let entry = series.battery_entry(&id, &source, config)?;
                // The first battery is reached by the trace pen; later ones
                // tee off the same row trace inside the battery pen.
                let (mut inner, mut lead) = match battery_pen.take() {
                    Some(mut inner) => {
                        inner.begin_battery(entry, trace_y)?;
                        (inner, Vec::new())
                    }
                    None => {
                        let lead = pen.link_to_pad(&id, trace_y, entry)?;
                        let inner = MetaClusterPointSource::new(&source, SourceMode::PureTarget, entry, config.grid_size)?;
                        (inner, lead)
                    }
                };
                for (member, ids) in members {
                    let pad = series.pad_for(cluster_of(&member)?, &source, config)?;
                    let row_y = series.battery_row_y(&member, &source, config)?;
                    for link_id in ids {
                        let mut points = std::mem::take(&mut lead);
                        for point in inner.pure_target_link(row_y, pad)? {
                            if points.last() != Some(&point) {
                                points.push(point);
                            }
                        }
                        book.start_link(&link_id, &source, &target_of(&link_id), points)?;
                    }
                }
                battery_pen = Some(inner);
            }
        }
    }
    if let Some(mut inner) = battery_pen {
        inner.close();
    }
    Ok(())
}

fn compress_layout(layout: &mut StackedLayout, mut framework: LayoutCompressionFramework, min_gap: f32) {
    let total = framework.compress(min_gap);
    if framework.is_identity() {
        return;
    }
    for node in layout.nodes.values_mut() {
        node.y += framework.delta_for_y(node.y);
    }
    let shift = |points: &mut Vec<Point>| {
        for point in points.iter_mut() {
            point.y += framework.delta_for_y(point.y);
        }
    };
    for link in layout.links.values_mut() {
        shift(&mut link.points);
    }
    for path in layout.departures.values_mut() {
        shift(path);
    }
    layout.bounds.height += total;
    let mut node_bounds = None;
    for node in layout.nodes.values() {
        union_into(&mut node_bounds, node.rect());
    }
    layout.node_bounds = node_bounds.unwrap_or_default();
}
