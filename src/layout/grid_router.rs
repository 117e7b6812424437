//! Per-source track allocation on the routing grid.
//!
//! Every position a source has emitted is remembered by row key, then column
//! key. A request for a (row, column) either finds that position again or
//! grows the source's tree by one or two new tracks, anchored on geometry the
//! source already owns.

use std::collections::BTreeMap;

use super::tracks::{LineKey, PointAndPath, TrackPool, TrackPosRC};
use super::{LayoutError, LayoutResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElbowState {
    Unused,
    Issued,
}

#[derive(Debug, Clone)]
pub struct GridRouterPointSource {
    source: String,
    root: TrackPosRC,
    inbound_corner: Option<TrackPosRC>,
    pos_per_row: BTreeMap<LineKey, BTreeMap<LineKey, TrackPosRC>>,
    /// Rightmost strict-column position of every strict row.
    departures: BTreeMap<LineKey, TrackPosRC>,
    elbow: ElbowState,
}

impl GridRouterPointSource {
    /// Router for a source placed on the grid, leaving through `root`.
    pub fn new(source: &str, root: TrackPosRC) -> Self {
        let mut router = Self {
            source: source.to_string(),
            root,
            inbound_corner: None,
            pos_per_row: BTreeMap::new(),
            departures: BTreeMap::new(),
            elbow: ElbowState::Unused,
        };
        router.record(root);
        router
    }

    /// Router for a source outside the grid, entering at `corner`.
    pub fn for_inbound(source: &str, corner: TrackPosRC) -> Self {
        let mut router = Self::new(source, corner);
        router.inbound_corner = Some(corner);
        router
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> TrackPosRC {
        self.root
    }

    pub fn known_positions(&self) -> usize {
        self.pos_per_row.values().map(BTreeMap::len).sum()
    }

    fn record(&mut self, pos: TrackPosRC) {
        self.pos_per_row
            .entry(pos.row.key)
            .or_default()
            .insert(pos.col.key, pos);
        if pos.row.key.is_line() && pos.col.key.is_line() {
            let slot = self.departures.entry(pos.row.key).or_insert(pos);
            if (pos.col.key, pos.col.lane) > (slot.col.key, slot.col.lane) {
                *slot = pos;
            }
        }
    }

    fn lookup(&self, row: LineKey, col: LineKey) -> Option<TrackPosRC> {
        self.pos_per_row.get(&row)?.get(&col).copied()
    }

    /// Position at `row` (its line when `direct`, else its midline) and
    /// `col` (its midline when `pad`, else its line). Repeated requests
    /// return the position allocated the first time.
    pub fn get_last_point(
        &mut self,
        pool: &mut TrackPool,
        direct: bool,
        row: i32,
        col: i32,
        pad: bool,
    ) -> PointAndPath {
        let (row_key, col_key) = keys(direct, row, col, pad);
        if let Some(pos) = self.lookup(row_key, col_key) {
            return PointAndPath::known(pos);
        }
        let anchor = self.pos_per_row.get(&row_key).and_then(|cols| nearest_col(cols, col_key));
        match anchor {
            Some(anchor) => self.extend_col(pool, anchor, col_key),
            None => {
                let anchor = self.row_anchor(self.root, row_key, |cols| nearest_line_col(cols, col_key));
                self.extend_row(pool, anchor, row_key, col_key)
            }
        }
    }

    /// Like [`Self::get_last_point`], but grows from the inbound corner and
    /// always extends a row from its rightmost position.
    pub fn get_last_point_for_inbound(
        &mut self,
        pool: &mut TrackPool,
        direct: bool,
        row: i32,
        col: i32,
        pad: bool,
    ) -> LayoutResult<PointAndPath> {
        let Some(corner) = self.inbound_corner else {
            return Err(LayoutError::invalid(format!(
                "source {} has no inbound corner",
                self.source
            )));
        };
        let (row_key, col_key) = keys(direct, row, col, pad);
        if let Some(pos) = self.lookup(row_key, col_key) {
            return Ok(PointAndPath::known(pos));
        }
        if let Some(anchor) = self.pos_per_row.get(&row_key).and_then(rightmost) {
            return Ok(self.extend_col(pool, anchor, col_key));
        }
        let anchor = self.row_anchor(corner, row_key, rightmost_line);
        Ok(self.extend_row(pool, anchor, row_key, col_key))
    }

    /// Same as [`Self::get_last_point`], but a missing row grows from
    /// `anchor`, which must be a position this source already owns.
    pub fn get_last_point_from(
        &mut self,
        pool: &mut TrackPool,
        anchor: TrackPosRC,
        direct: bool,
        row: i32,
        col: i32,
        pad: bool,
    ) -> LayoutResult<PointAndPath> {
        if self.lookup(anchor.row.key, anchor.col.key) != Some(anchor) {
            return Err(LayoutError::invalid(format!(
                "anchor is not a position of source {}",
                self.source
            )));
        }
        let (row_key, col_key) = keys(direct, row, col, pad);
        if let Some(pos) = self.lookup(row_key, col_key) {
            return Ok(PointAndPath::known(pos));
        }
        if let Some(existing) = self.pos_per_row.get(&row_key).and_then(|cols| nearest_col(cols, col_key)) {
            return Ok(self.extend_col(pool, existing, col_key));
        }
        Ok(self.extend_row(pool, anchor, row_key, col_key))
    }

    /// Best strict position to leave from toward a core at
    /// (`trg_row`, `trg_col`): the highest strict row below the core's top
    /// line, at its rightmost strict column.
    pub fn get_departing_point_to_core(&mut self, pool: &mut TrackPool, trg_row: i32, trg_col: i32) -> PointAndPath {
        let found = self
            .departures
            .iter()
            .find(|(key, _)| key.index > trg_row)
            .map(|(_, pos)| *pos);
        match found {
            Some(pos) => PointAndPath::known(pos),
            None => {
                tracing::trace!(source = %self.source, trg_row, trg_col, "no strict departure, using root row");
                self.get_last_point(pool, true, self.root.row.key.index, self.root.col.key.index, false)
            }
        }
    }

    /// Best strict position to leave the grid from: the highest strict row,
    /// at its rightmost strict column.
    pub fn get_departing_point_to_outbound(&mut self, pool: &mut TrackPool) -> PointAndPath {
        match self.departures.values().next() {
            Some(pos) => PointAndPath::known(*pos),
            None => self.get_last_point(pool, true, self.root.row.key.index, self.root.col.key.index, false),
        }
    }

    /// Elbow under the source's own cell, at column `col`'s midline. May be
    /// requested once per source; an existing position is reused.
    pub fn get_bottom_elbow_point(&mut self, pool: &mut TrackPool, col: i32) -> LayoutResult<PointAndPath> {
        if self.elbow == ElbowState::Issued {
            return Err(LayoutError::internal(format!(
                "bottom elbow of {} requested twice",
                self.source
            )));
        }
        self.elbow = ElbowState::Issued;
        let row_key = self.root.row.key;
        let col_key = LineKey::mid(col);
        if let Some(pos) = self.lookup(row_key, col_key) {
            return Ok(PointAndPath::known(pos));
        }
        let anchor = self.pos_per_row.get(&row_key).and_then(|cols| nearest_col(cols, col_key));
        Ok(match anchor {
            Some(anchor) => self.extend_col(pool, anchor, col_key),
            None => self.extend_row(pool, self.root, row_key, col_key),
        })
    }

    /// Known row nearest to `row_key` between it and `origin`, or `origin`.
    fn row_anchor<F>(&self, origin: TrackPosRC, row_key: LineKey, pick: F) -> TrackPosRC
    where
        F: Fn(&BTreeMap<LineKey, TrackPosRC>) -> Option<TrackPosRC>,
    {
        let origin_key = origin.row.key;
        let candidate = if row_key > origin_key {
            self.pos_per_row.range(origin_key..row_key).next_back()
        } else {
            self.pos_per_row.range(row_key..=origin_key).next()
        };
        candidate
            .and_then(|(_, cols)| pick(cols))
            .unwrap_or(origin)
    }

    /// New column track on the anchor's row.
    fn extend_col(&mut self, pool: &mut TrackPool, anchor: TrackPosRC, col_key: LineKey) -> PointAndPath {
        let pos = anchor.with_col(pool.reserve_col(col_key));
        self.record(pos);
        PointAndPath {
            pos,
            path: vec![anchor],
        }
    }

    /// New row track reached straight down (or up) the anchor's column, then
    /// a new column track on it when the column differs. Pad columns end
    /// inside a node, so the anchor must sit on a line column.
    fn extend_row(&mut self, pool: &mut TrackPool, anchor: TrackPosRC, row_key: LineKey, col_key: LineKey) -> PointAndPath {
        let turn = anchor.with_row(pool.reserve_row(row_key));
        self.record(turn);
        if turn.col.key == col_key {
            return PointAndPath {
                pos: turn,
                path: vec![anchor],
            };
        }
        let pos = turn.with_col(pool.reserve_col(col_key));
        self.record(pos);
        PointAndPath {
            pos,
            path: vec![anchor, turn],
        }
    }
}

fn keys(direct: bool, row: i32, col: i32, pad: bool) -> (LineKey, LineKey) {
    let row_key = if direct { LineKey::line(row) } else { LineKey::mid(row) };
    let col_key = if pad { LineKey::mid(col) } else { LineKey::line(col) };
    (row_key, col_key)
}

fn ordinal(key: LineKey) -> i64 {
    i64::from(key.index) * 2 + i64::from(key.mid)
}

fn nearest_col(cols: &BTreeMap<LineKey, TrackPosRC>, col_key: LineKey) -> Option<TrackPosRC> {
    let below = cols.range(..=col_key).next_back();
    let above = cols.range(col_key..).next();
    match (below, above) {
        (Some((bk, bp)), Some((ak, ap))) => {
            if ordinal(col_key) - ordinal(*bk) <= ordinal(*ak) - ordinal(col_key) {
                Some(*bp)
            } else {
                Some(*ap)
            }
        }
        (Some((_, pos)), None) | (None, Some((_, pos))) => Some(*pos),
        (None, None) => None,
    }
}

fn rightmost(cols: &BTreeMap<LineKey, TrackPosRC>) -> Option<TrackPosRC> {
    cols.values().next_back().copied()
}

fn nearest_line_col(cols: &BTreeMap<LineKey, TrackPosRC>, col_key: LineKey) -> Option<TrackPosRC> {
    cols.iter()
        .filter(|(key, _)| key.is_line())
        .min_by_key(|(key, _)| (ordinal(**key) - ordinal(col_key)).abs())
        .map(|(_, pos)| *pos)
}

fn rightmost_line(cols: &BTreeMap<LineKey, TrackPosRC>) -> Option<TrackPosRC> {
    cols.values().rev().find(|pos| pos.col.key.is_line()).copied()
}
