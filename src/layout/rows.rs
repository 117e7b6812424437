use std::collections::{BTreeMap, HashSet};

use crate::config::RowStrategy;
use crate::ir::{GeneCluster, Graph, TimeCourse};

use super::search::{
    cluster_edges, cluster_groups_by_inputs, cluster_groups_by_source_order, source_count,
    topological_depths,
};
use super::{LayoutError, LayoutResult};

/// Row index to the core ids of the clusters placed in that row, left to right.
pub type RowMap = BTreeMap<i32, Vec<String>>;

#[derive(Clone, Copy, Default)]
pub struct RowParams<'a> {
    pub max_row_size: usize,
    /// Give big cluster groups their own balanced rows.
    pub chunked: bool,
    pub assignment: Option<&'a RowMap>,
    pub time_course: Option<&'a dyn TimeCourse>,
}

/// Assigns clusters to layout rows.
pub struct RowBuilder<'a> {
    graph: &'a Graph,
    clusters: &'a [GeneCluster],
}

impl<'a> RowBuilder<'a> {
    pub fn new(graph: &'a Graph, clusters: &'a [GeneCluster]) -> Self {
        Self { graph, clusters }
    }

    pub fn compute_rows(&self, strategy: RowStrategy, params: RowParams<'_>) -> LayoutResult<RowMap> {
        let rows = match strategy {
            RowStrategy::Assignment => {
                let Some(assignment) = params.assignment else {
                    return Err(LayoutError::invalid("assignment strategy needs a row assignment"));
                };
                self.build_rows_by_assignment(assignment)?
            }
            RowStrategy::Sort => self.build_cluster_series_by_sort(params.max_row_size)?,
            RowStrategy::Time => {
                let Some(time_course) = params.time_course else {
                    return Err(LayoutError::invalid("time strategy needs time course data"));
                };
                self.assign_rows_by_time(time_course, params.max_row_size)?
            }
            RowStrategy::Alpha => self.assign_rows_by_alpha(params.max_row_size)?,
            RowStrategy::Inputs => {
                self.assign_rows_by_inputs(params.max_row_size, params.chunked)?
            }
            RowStrategy::SourceOrder => {
                self.assign_rows_by_source_order(params.max_row_size, params.chunked)?
            }
        };
        tracing::debug!(?strategy, rows = rows.len(), "computed layout rows");
        Ok(rows)
    }

    /// Replays a caller-provided mapping verbatim after checking every id.
    pub fn build_rows_by_assignment(&self, assignment: &RowMap) -> LayoutResult<RowMap> {
        let known: HashSet<&str> = self.clusters.iter().map(|c| c.core_id.as_str()).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        for ids in assignment.values() {
            for id in ids {
                if !known.contains(id.as_str()) {
                    return Err(LayoutError::invalid(format!("row assignment names unknown cluster {id}")));
                }
                if !seen.insert(id.as_str()) {
                    return Err(LayoutError::invalid(format!("cluster {id} assigned to two rows")));
                }
            }
        }
        Ok(assignment.clone())
    }

    /// Buckets by topological depth, then splits each bucket into rows of at
    /// most `max_size`. Depth buckets never share a row.
    pub fn build_cluster_series_by_sort(&self, max_size: usize) -> LayoutResult<RowMap> {
        check_max(max_size)?;
        let ids: Vec<String> = self.clusters.iter().map(|c| c.core_id.clone()).collect();
        let depths = topological_depths(&ids, &cluster_edges(self.clusters));
        let mut buckets: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for id in ids {
            let depth = depths.get(&id).copied().unwrap_or(0);
            buckets.entry(depth).or_default().push(id);
        }
        let mut rows = RowMap::new();
        let mut next_row = 0;
        for bucket in buckets.into_values() {
            for chunk in bucket.chunks(max_size) {
                rows.insert(next_row, chunk.to_vec());
                next_row += 1;
            }
        }
        Ok(rows)
    }

    /// Packs clusters in order of first expression time. Clusters with no
    /// recorded time pack after the timed ones.
    pub fn assign_rows_by_time(&self, time_course: &dyn TimeCourse, max: usize) -> LayoutResult<RowMap> {
        check_max(max)?;
        if !time_course.have_data() {
            return Err(LayoutError::invalid("no time course data available"));
        }
        let mut buckets: BTreeMap<i32, Vec<String>> = BTreeMap::new();
        let mut untimed = Vec::new();
        for cluster in self.clusters {
            match time_course.first_expression_time(&cluster.core_id) {
                Some(time) => buckets.entry(time).or_default().push(cluster.core_id.clone()),
                None => untimed.push(cluster.core_id.clone()),
            }
        }
        let ordered = buckets.into_values().flatten().chain(untimed);
        Ok(pack_sequential(ordered, max))
    }

    /// Packs clusters sorted by upper-cased node name; ties keep input order.
    pub fn assign_rows_by_alpha(&self, max: usize) -> LayoutResult<RowMap> {
        check_max(max)?;
        let mut keyed: Vec<(String, &str)> = self
            .clusters
            .iter()
            .map(|c| (self.graph.node_name(&c.core_id).to_uppercase(), c.core_id.as_str()))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pack_sequential(keyed.into_iter().map(|(_, id)| id.to_string()), max))
    }

    pub fn assign_rows_by_inputs(&self, max: usize, chunked: bool) -> LayoutResult<RowMap> {
        check_max(max)?;
        let groups = cluster_groups_by_inputs(self.clusters);
        self.pack_groups(groups, max, chunked)
    }

    pub fn assign_rows_by_source_order(&self, max: usize, chunked: bool) -> LayoutResult<RowMap> {
        check_max(max)?;
        let groups = cluster_groups_by_source_order(self.clusters, self.graph);
        self.pack_groups(groups, max, chunked)
    }

    fn pack_groups(&self, groups: Vec<Vec<usize>>, max: usize, chunked: bool) -> LayoutResult<RowMap> {
        if !chunked {
            let ordered = groups
                .into_iter()
                .flatten()
                .map(|idx| self.clusters[idx].core_id.clone());
            return Ok(pack_sequential(ordered, max));
        }
        let mut rows = RowMap::new();
        let mut next_row = 0;
        let mut small = Vec::new();
        for group in groups {
            if group.len() >= max {
                let ids: Vec<String> = group
                    .iter()
                    .map(|idx| self.clusters[*idx].core_id.clone())
                    .collect();
                next_row = assign_large_cluster(&ids, max, next_row, &mut rows)?;
            } else {
                small.push(group);
            }
        }
        self.assign_small_cluster_series(small, max, next_row, &mut rows);
        Ok(rows)
    }

    /// First-fit packing of small groups onto shared rows, busiest groups first.
    fn assign_small_cluster_series(
        &self,
        mut groups: Vec<Vec<usize>>,
        max: usize,
        first_row: i32,
        rows: &mut RowMap,
    ) {
        let counts: Vec<usize> = groups
            .iter()
            .map(|group| source_count(self.clusters, group))
            .collect();
        let mut order: Vec<usize> = (0..groups.len()).collect();
        order.sort_by(|a, b| counts[*b].cmp(&counts[*a]));

        let mut open: Vec<(i32, usize)> = Vec::new();
        let mut next_row = first_row;
        for idx in order {
            let group = std::mem::take(&mut groups[idx]);
            let slot = open.iter_mut().find(|(_, used)| *used + group.len() <= max);
            let row = match slot {
                Some((row, used)) => {
                    *used += group.len();
                    *row
                }
                None => {
                    open.push((next_row, group.len()));
                    next_row += 1;
                    next_row - 1
                }
            };
            rows.entry(row)
                .or_default()
                .extend(group.iter().map(|idx| self.clusters[*idx].core_id.clone()));
        }
    }
}

/// Spreads one large group over its own rows as evenly as possible; the first
/// `len % rows` rows take one extra cluster. Returns the next free row.
pub fn assign_large_cluster(
    chunk: &[String],
    max: usize,
    first_row: i32,
    rows: &mut RowMap,
) -> LayoutResult<i32> {
    check_max(max)?;
    if chunk.len() < max {
        return Err(LayoutError::invalid(format!(
            "large cluster group of {} is smaller than row size {max}",
            chunk.len()
        )));
    }
    let row_count = chunk.len().div_ceil(max);
    let base = chunk.len() / row_count;
    let extra = chunk.len() % row_count;
    let mut start = 0;
    let mut row = first_row;
    for idx in 0..row_count {
        let size = base + usize::from(idx < extra);
        rows.insert(row, chunk[start..start + size].to_vec());
        start += size;
        row += 1;
    }
    Ok(row)
}

fn pack_sequential(ids: impl IntoIterator<Item = String>, max: usize) -> RowMap {
    let mut rows = RowMap::new();
    let mut row = 0;
    for id in ids {
        let entry = rows.entry(row).or_default();
        entry.push(id);
        if entry.len() >= max {
            row += 1;
        }
    }
    rows
}

fn check_max(max: usize) -> LayoutResult<()> {
    if max == 0 {
        Err(LayoutError::invalid("row size must be at least 1"))
    } else {
        Ok(())
    }
}
