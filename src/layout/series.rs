use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::LayoutConfig;
use crate::ir::GeneCluster;

use super::battery::{ClusterBattery, find_batteries};
use super::types::union_into;
use super::{LayoutError, LayoutResult, NodeLayout, Point, Rect};

/// What a series needs to know about the stack it belongs to.
pub(super) struct StackContext<'a> {
    pub config: &'a LayoutConfig,
    pub clusters: &'a BTreeMap<String, GeneCluster>,
}

#[derive(Debug, Clone)]
pub struct InboundLink {
    pub link_id: String,
    pub source: String,
    /// Core id of the target cluster.
    pub target: String,
    /// True when the source sits in a cluster of the same stack.
    pub internal: bool,
}

#[derive(Debug, Clone)]
enum SeriesUnit {
    Single(String),
    Battery(BatteryUnit),
}

#[derive(Debug, Clone)]
struct BatteryUnit {
    id: String,
    battery: ClusterBattery,
}

#[derive(Debug, Clone)]
struct BlockGeometry {
    rect: Rect,
    pitch: f32,
}

#[derive(Debug, Clone)]
struct SeriesGeometry {
    top: f32,
    height: f32,
    bounds: Rect,
    node_bounds: Option<Rect>,
    cluster_rects: BTreeMap<String, Rect>,
    blocks: BTreeMap<String, BlockGeometry>,
    /// Cluster core id to (battery id, block row).
    member_block: BTreeMap<String, (String, usize)>,
}

/// One step of a source's sweep along a series, left to right.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum RowTarget {
    Cluster {
        cluster: String,
        links: Vec<String>,
    },
    Battery {
        id: String,
        members: Vec<(String, Vec<String>)>,
    },
}

/// One row of the stack: clusters (or battery blocks) laid out left to
/// right below a band of source traces and above a band of departure lanes.
#[derive(Debug, Clone)]
pub struct ClusterSeries {
    row: i32,
    units: Vec<SeriesUnit>,
    inbound: BTreeMap<String, Vec<InboundLink>>,
    traces: Vec<String>,
    departures: Vec<String>,
    geometry: Option<SeriesGeometry>,
}

impl ClusterSeries {
    pub(super) fn collect(row: i32, ids: &[String], ctx: &StackContext<'_>) -> LayoutResult<Self> {
        let mut members: Vec<GeneCluster> = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(cluster) = ctx.clusters.get(id) else {
                return Err(LayoutError::invalid(format!("row {row} names unknown cluster {id}")));
            };
            members.push(cluster.clone());
        }

        let mut battery_of: HashMap<String, usize> = HashMap::new();
        let mut batteries: Vec<ClusterBattery> = Vec::new();
        if ctx.config.use_batteries {
            for battery in find_batteries(&members, true) {
                if battery.inputs().is_empty() {
                    continue;
                }
                for id in battery.members().keys() {
                    battery_of.insert(id.clone(), batteries.len());
                }
                batteries.push(battery);
            }
        }

        let mut units = Vec::new();
        let mut placed: BTreeSet<usize> = BTreeSet::new();
        for id in ids {
            match battery_of.get(id) {
                Some(&idx) => {
                    if placed.insert(idx) {
                        let battery = batteries[idx].clone();
                        let first = battery.members().keys().next().cloned().unwrap_or_default();
                        units.push(SeriesUnit::Battery(BatteryUnit {
                            id: format!("battery:{first}"),
                            battery,
                        }));
                    }
                }
                None => units.push(SeriesUnit::Single(id.clone())),
            }
        }

        Ok(Self {
            row,
            units,
            inbound: BTreeMap::new(),
            traces: Vec::new(),
            departures: Vec::new(),
            geometry: None,
        })
    }

    pub fn row(&self) -> i32 {
        self.row
    }

    /// Core ids of every cluster in the series, in placement order.
    pub fn cluster_ids(&self) -> Vec<String> {
        let mut out = Vec::new();
        for unit in &self.units {
            match unit {
                SeriesUnit::Single(id) => out.push(id.clone()),
                SeriesUnit::Battery(unit) => out.extend(unit.battery.members().keys().cloned()),
            }
        }
        out
    }

    pub fn battery_count(&self) -> usize {
        self.units
            .iter()
            .filter(|unit| matches!(unit, SeriesUnit::Battery(_)))
            .count()
    }

    /// Classifies the sources of every link entering this row's clusters.
    /// `owner` maps node ids to the core id of their cluster in the stack.
    pub(super) fn preprocess(&mut self, ctx: &StackContext<'_>, owner: &HashMap<String, String>, links: &HashMap<String, (String, String)>) {
        self.inbound.clear();
        for id in self.cluster_ids() {
            let Some(cluster) = ctx.clusters.get(&id) else {
                continue;
            };
            let mut entries = Vec::new();
            for link_id in &cluster.inbound_links {
                let Some((source, _target)) = links.get(link_id) else {
                    continue;
                };
                entries.push(InboundLink {
                    link_id: link_id.clone(),
                    source: source.clone(),
                    target: id.clone(),
                    internal: owner.contains_key(source),
                });
            }
            self.inbound.insert(id, entries);
        }
    }

    pub fn inbound_links(&self) -> impl Iterator<Item = &InboundLink> {
        self.inbound.values().flatten()
    }

    pub(super) fn set_traces(&mut self, traces: Vec<String>) {
        self.traces = traces;
    }

    pub(super) fn set_departures(&mut self, departures: Vec<String>) {
        self.departures = departures;
    }

    /// Width and height the series needs, independent of position.
    pub(super) fn measure(&self, ctx: &StackContext<'_>) -> (f32, f32) {
        let config = ctx.config;
        let mut width = 0.0;
        let mut unit_height = config.node_height;
        for (idx, unit) in self.units.iter().enumerate() {
            let (w, h) = unit_size(unit, ctx);
            if idx > 0 {
                width += config.cluster_spacing;
            }
            width += w;
            unit_height = f32::max(unit_height, h);
        }
        let trace_band = (self.traces.len() + 1) as f32 * config.trace_offset;
        let departure_band = (self.departures.len() + 1) as f32 * config.trace_offset;
        (width, trace_band + unit_height + departure_band)
    }

    /// Places every unit with the series' top-left corner at `(left, top)`.
    pub(super) fn locate(&mut self, ctx: &StackContext<'_>, left: f32, top: f32) {
        let config = ctx.config;
        let (width, height) = self.measure(ctx);
        let unit_top = top + (self.traces.len() + 1) as f32 * config.trace_offset;
        let mut geometry = SeriesGeometry {
            top,
            height,
            bounds: Rect::new(left, top, width, height),
            node_bounds: None,
            cluster_rects: BTreeMap::new(),
            blocks: BTreeMap::new(),
            member_block: BTreeMap::new(),
        };

        let mut x = left;
        for unit in &self.units {
            let (w, h) = unit_size(unit, ctx);
            match unit {
                SeriesUnit::Single(id) => {
                    let rect = Rect::new(x, unit_top, w, h);
                    geometry.cluster_rects.insert(id.clone(), rect);
                    union_into(&mut geometry.node_bounds, rect);
                }
                SeriesUnit::Battery(unit) => {
                    let rect = Rect::new(x, unit_top, w, h);
                    let inputs = unit.battery.inputs().len();
                    let band = (inputs + 1) as f32 * config.trace_offset;
                    let pitch = band + config.node_height + config.trace_offset;
                    let margin = band;
                    let cell_w = battery_cell_width(&unit.battery, config);
                    for (idx, id) in unit.battery.members().keys().enumerate() {
                        let (block_row, block_col) = unit.battery.cell_of(idx);
                        let member = Rect::new(
                            x + margin + block_col as f32 * (cell_w + config.cluster_spacing),
                            unit_top + block_row as f32 * pitch + band,
                            cell_w,
                            config.node_height,
                        );
                        geometry.cluster_rects.insert(id.clone(), member);
                        geometry
                            .member_block
                            .insert(id.clone(), (unit.id.clone(), block_row));
                        union_into(&mut geometry.node_bounds, member);
                    }
                    geometry.blocks.insert(unit.id.clone(), BlockGeometry { rect, pitch });
                }
            }
            x += w + config.cluster_spacing;
        }
        self.geometry = Some(geometry);
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.geometry.as_ref().map(|g| g.bounds)
    }

    pub fn node_bounds(&self) -> Option<Rect> {
        self.geometry.as_ref().and_then(|g| g.node_bounds)
    }

    pub fn height(&self) -> Option<f32> {
        self.geometry.as_ref().map(|g| g.height)
    }

    pub fn cluster_rect(&self, id: &str) -> Option<Rect> {
        self.geometry.as_ref()?.cluster_rects.get(id).copied()
    }

    fn located(&self) -> LayoutResult<&SeriesGeometry> {
        self.geometry
            .as_ref()
            .ok_or_else(|| LayoutError::internal(format!("series {} routed before locate", self.row)))
    }

    /// Y of the trace `source` rides across this row.
    pub(super) fn trace_y(&self, source: &str, config: &LayoutConfig) -> LayoutResult<f32> {
        let geometry = self.located()?;
        let idx = self
            .traces
            .iter()
            .position(|s| s == source)
            .ok_or_else(|| LayoutError::internal(format!("no trace for {source} in row {}", self.row)))?;
        Ok(geometry.top + (idx + 1) as f32 * config.trace_offset)
    }

    /// Y of the departure lane `source` uses under this row.
    pub(super) fn departure_y(&self, source: &str, config: &LayoutConfig) -> LayoutResult<f32> {
        let geometry = self.located()?;
        let idx = self
            .departures
            .iter()
            .position(|s| s == source)
            .ok_or_else(|| LayoutError::internal(format!("no departure lane for {source} in row {}", self.row)))?;
        let unit_bottom = geometry.top + geometry.height
            - (self.departures.len() + 1) as f32 * config.trace_offset;
        Ok(unit_bottom + (idx + 1) as f32 * config.trace_offset)
    }

    /// Input pad for `source` on the top edge of `cluster`.
    pub(super) fn pad_for(&self, cluster: &GeneCluster, source: &str, config: &LayoutConfig) -> LayoutResult<Point> {
        let rect = self.cluster_rect(&cluster.core_id).ok_or_else(|| {
            LayoutError::internal(format!("cluster {} not placed in row {}", cluster.core_id, self.row))
        })?;
        let idx = cluster.inputs.iter().position(|s| s == source).unwrap_or(0);
        Ok(Point::new(rect.x + (idx + 1) as f32 * 2.0 * config.grid_size, rect.y))
    }

    /// Output pad on the right edge of `cluster`.
    pub(super) fn out_pad(&self, cluster: &str, config: &LayoutConfig) -> LayoutResult<Point> {
        let rect = self.cluster_rect(cluster).ok_or_else(|| {
            LayoutError::internal(format!("cluster {cluster} not placed in row {}", self.row))
        })?;
        Ok(Point::new(rect.right(), rect.y + config.node_height / 2.0))
    }

    /// Where `source` enters battery `id`: the top of its drop column.
    pub(super) fn battery_entry(&self, id: &str, source: &str, config: &LayoutConfig) -> LayoutResult<Point> {
        let geometry = self.located()?;
        let (block, unit) = self.block(geometry, id)?;
        let idx = input_index(&unit.battery, source)?;
        Ok(Point::new(
            block.rect.x + (idx + 1) as f32 * config.trace_offset,
            block.rect.y,
        ))
    }

    /// Y of the block-row trace `source` rides to reach `cluster` in a battery.
    pub(super) fn battery_row_y(&self, cluster: &str, source: &str, config: &LayoutConfig) -> LayoutResult<f32> {
        let geometry = self.located()?;
        let (battery_id, block_row) = geometry.member_block.get(cluster).ok_or_else(|| {
            LayoutError::internal(format!("cluster {cluster} is not in a battery"))
        })?;
        let (block, unit) = self.block(geometry, battery_id)?;
        let idx = input_index(&unit.battery, source)?;
        Ok(block.rect.y + *block_row as f32 * block.pitch + (idx + 1) as f32 * config.trace_offset)
    }

    fn block<'s>(&'s self, geometry: &'s SeriesGeometry, id: &str) -> LayoutResult<(&'s BlockGeometry, &'s BatteryUnit)> {
        let block = geometry
            .blocks
            .get(id)
            .ok_or_else(|| LayoutError::internal(format!("unknown battery {id}")))?;
        let unit = self
            .units
            .iter()
            .find_map(|unit| match unit {
                SeriesUnit::Battery(unit) if unit.id == id => Some(unit),
                _ => None,
            })
            .ok_or_else(|| LayoutError::internal(format!("unknown battery {id}")))?;
        Ok((block, unit))
    }

    /// The clusters and batteries `source` feeds in this row, left to right.
    pub(super) fn targets_of(&self, source: &str) -> Vec<RowTarget> {
        let links_into = |cluster: &str| -> Vec<String> {
            self.inbound
                .get(cluster)
                .map(|links| {
                    links
                        .iter()
                        .filter(|link| link.source == source)
                        .map(|link| link.link_id.clone())
                        .collect()
                })
                .unwrap_or_default()
        };
        let mut out = Vec::new();
        for unit in &self.units {
            match unit {
                SeriesUnit::Single(id) => {
                    let links = links_into(id);
                    if !links.is_empty() {
                        out.push(RowTarget::Cluster {
                            cluster: id.clone(),
                            links,
                        });
                    }
                }
                SeriesUnit::Battery(unit) => {
                    let members: Vec<(String, Vec<String>)> = unit
                        .battery
                        .members()
                        .keys()
                        .map(|id| (id.clone(), links_into(id)))
                        .filter(|(_, links)| !links.is_empty())
                        .collect();
                    if !members.is_empty() {
                        out.push(RowTarget::Battery {
                            id: unit.id.clone(),
                            members,
                        });
                    }
                }
            }
        }
        out
    }

    /// Node boxes for every cluster member.
    pub(super) fn node_layouts(&self, ctx: &StackContext<'_>) -> Vec<NodeLayout> {
        let Some(geometry) = self.geometry.as_ref() else {
            return Vec::new();
        };
        let config = ctx.config;
        let mut out = Vec::new();
        for (id, rect) in &geometry.cluster_rects {
            let Some(cluster) = ctx.clusters.get(id) else {
                continue;
            };
            // Core flush right under the out pad, satellites in a strip before it.
            let core_x = rect.right() - config.node_width;
            let step = config.bubble_size + config.grid_size;
            let count = cluster.satellites.len();
            for (idx, satellite) in cluster.satellites.iter().enumerate() {
                out.push(NodeLayout {
                    id: satellite.clone(),
                    cluster: id.clone(),
                    x: core_x - (count - idx) as f32 * step,
                    y: rect.y + (rect.height - config.bubble_size) / 2.0,
                    width: config.bubble_size,
                    height: config.bubble_size,
                });
            }
            out.push(NodeLayout {
                id: id.clone(),
                cluster: id.clone(),
                x: core_x,
                y: rect.y,
                width: config.node_width,
                height: config.node_height,
            });
        }
        out
    }
}

fn input_index(battery: &ClusterBattery, source: &str) -> LayoutResult<usize> {
    battery
        .inputs()
        .iter()
        .position(|s| s == source)
        .ok_or_else(|| LayoutError::internal(format!("{source} does not feed battery")))
}

/// Box of a single cluster: satellites in a strip left of the core, wide
/// enough to space one input pad every two grid cells.
pub(super) fn cluster_size(cluster: &GeneCluster, config: &LayoutConfig) -> (f32, f32) {
    let body = config.node_width
        + cluster.satellites.len() as f32 * (config.bubble_size + config.grid_size);
    let pads = (cluster.inputs.len() + 1) as f32 * 2.0 * config.grid_size;
    let width = (body.max(pads) / config.grid_size).ceil() * config.grid_size;
    (width, config.node_height)
}

fn battery_cell_width(battery: &ClusterBattery, config: &LayoutConfig) -> f32 {
    battery
        .members()
        .values()
        .map(|cluster| cluster_size(cluster, config).0)
        .fold(config.node_width, f32::max)
}

fn unit_size(unit: &SeriesUnit, ctx: &StackContext<'_>) -> (f32, f32) {
    let config = ctx.config;
    match unit {
        SeriesUnit::Single(id) => ctx
            .clusters
            .get(id)
            .map(|cluster| cluster_size(cluster, config))
            .unwrap_or((config.node_width, config.node_height)),
        SeriesUnit::Battery(unit) => {
            let (cols, _) = unit.battery.layout();
            let rows = unit.battery.len().div_ceil(cols.max(1));
            let band = (unit.battery.inputs().len() + 1) as f32 * config.trace_offset;
            let pitch = band + config.node_height + config.trace_offset;
            let cell_w = battery_cell_width(&unit.battery, config);
            let width = band + cols as f32 * cell_w + (cols.saturating_sub(1)) as f32 * config.cluster_spacing;
            let height = rows as f32 * pitch - config.trace_offset;
            (width, height)
        }
    }
}
