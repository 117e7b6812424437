use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::LayoutConfig;

use super::Point;

/// A grid line on one axis: either the line itself or the midline that follows it.
///
/// Ordering is `line(i) < mid(i) < line(i + 1)`, so a sorted map walks the
/// axis top to bottom (or left to right).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineKey {
    pub index: i32,
    pub mid: bool,
}

impl LineKey {
    pub const fn line(index: i32) -> Self {
        Self { index, mid: false }
    }

    pub const fn mid(index: i32) -> Self {
        Self { index, mid: true }
    }

    pub const fn is_line(&self) -> bool {
        !self.mid
    }
}

/// A reserved lane next to a grid line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Track {
    pub key: LineKey,
    pub lane: u32,
}

/// The atomic routing position: a row track crossed with a column track.
/// Two positions are distinct whenever their tracks differ, even if they
/// resolve to the same coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackPosRC {
    pub row: Track,
    pub col: Track,
}

impl TrackPosRC {
    pub const fn new(row: Track, col: Track) -> Self {
        Self { row, col }
    }

    pub fn with_row(self, row: Track) -> Self {
        Self { row, col: self.col }
    }

    pub fn with_col(self, col: Track) -> Self {
        Self { row: self.row, col }
    }
}

/// A resolved position and the positions leading to it from known geometry.
/// `path[0]`, when present, lies on geometry the link already shares.
#[derive(Debug, Clone, PartialEq)]
pub struct PointAndPath {
    pub pos: TrackPosRC,
    pub path: Vec<TrackPosRC>,
}

impl PointAndPath {
    pub fn known(pos: TrackPosRC) -> Self {
        Self { pos, path: Vec::new() }
    }

    /// Every position in route order, ending at `pos`.
    pub fn route(&self) -> Vec<TrackPosRC> {
        let mut out = self.path.clone();
        if out.last() != Some(&self.pos) {
            out.push(self.pos);
        }
        out
    }
}

/// Lane reservations shared by every source routed on the same grid.
#[derive(Debug, Default)]
pub struct TrackPool {
    rows: HashMap<LineKey, u32>,
    cols: HashMap<LineKey, u32>,
}

impl TrackPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve_row(&mut self, key: LineKey) -> Track {
        let next = self.rows.entry(key).or_insert(0);
        let lane = *next;
        *next += 1;
        Track { key, lane }
    }

    pub fn reserve_col(&mut self, key: LineKey) -> Track {
        let next = self.cols.entry(key).or_insert(0);
        let lane = *next;
        *next += 1;
        Track { key, lane }
    }

    pub fn rows_in_use(&self, key: LineKey) -> u32 {
        self.rows.get(&key).copied().unwrap_or(0)
    }

    pub fn cols_in_use(&self, key: LineKey) -> u32 {
        self.cols.get(&key).copied().unwrap_or(0)
    }
}

/// Maps grid tracks to coordinates. Each cell has a routing channel along
/// its top and left edges; the node sits in the remainder.
#[derive(Debug, Clone, Copy)]
pub struct GridGeometry {
    pub origin: Point,
    pub cell_width: f32,
    pub cell_height: f32,
    pub channel_width: f32,
    pub channel_height: f32,
    pub lane_spacing: f32,
}

impl GridGeometry {
    pub fn from_config(config: &LayoutConfig, origin: Point) -> Self {
        Self {
            origin,
            cell_width: config.grid.cell_width,
            cell_height: config.grid.cell_height,
            channel_width: config.grid.channel_width,
            channel_height: config.grid.channel_height,
            lane_spacing: config.grid.lane_spacing,
        }
    }

    /// Lanes of a line fill its channel from the top; lanes of the midline
    /// that follows stack below every lane the pool gave out on the line.
    pub fn row_y(&self, track: Track, pool: &TrackPool) -> f32 {
        let top = self.origin.y + track.key.index as f32 * self.cell_height;
        let before = if track.key.mid {
            pool.rows_in_use(LineKey::line(track.key.index))
        } else {
            0
        };
        top + (1 + before + track.lane) as f32 * self.lane_spacing
    }

    pub fn col_x(&self, track: Track, pool: &TrackPool) -> f32 {
        let left = self.origin.x + track.key.index as f32 * self.cell_width;
        let before = if track.key.mid {
            pool.cols_in_use(LineKey::line(track.key.index))
        } else {
            0
        };
        left + (1 + before + track.lane) as f32 * self.lane_spacing
    }

    /// Coordinates once every lane has been reserved.
    pub fn resolve(&self, pos: TrackPosRC, pool: &TrackPool) -> Point {
        Point::new(self.col_x(pos.col, pool), self.row_y(pos.row, pool))
    }

    /// `(x, y, width, height)` of the node area of a cell.
    pub fn node_area(&self, row: i32, col: i32) -> (f32, f32, f32, f32) {
        (
            self.origin.x + col as f32 * self.cell_width + self.channel_width,
            self.origin.y + row as f32 * self.cell_height + self.channel_height,
            self.cell_width - self.channel_width,
            self.cell_height - self.channel_height,
        )
    }
}

/// Bijection between sources entering the stack from outside and the
/// vertical lanes ("global tracks") they ride down the left margin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalTrackAssignment {
    src_to_track: BTreeMap<String, i32>,
    track_to_src: BTreeMap<i32, String>,
}

impl GlobalTrackAssignment {
    /// Keeps every usable track from `previous`, then hands the lowest free
    /// tracks to the remaining sources in sorted order.
    pub fn assign(sources: &BTreeSet<String>, previous: Option<&BTreeMap<String, i32>>) -> Self {
        let mut assignment = Self::default();
        if let Some(previous) = previous {
            for (src, track) in previous {
                if *track >= 0 && sources.contains(src) && !assignment.track_to_src.contains_key(track) {
                    assignment.bind(src, *track);
                }
            }
        }
        let mut next = 0;
        for src in sources {
            if assignment.src_to_track.contains_key(src) {
                continue;
            }
            while assignment.track_to_src.contains_key(&next) {
                next += 1;
            }
            assignment.bind(src, next);
        }
        assignment
    }

    fn bind(&mut self, src: &str, track: i32) {
        self.src_to_track.insert(src.to_string(), track);
        self.track_to_src.insert(track, src.to_string());
    }

    pub fn track_for(&self, src: &str) -> Option<i32> {
        self.src_to_track.get(src).copied()
    }

    pub fn source_for(&self, track: i32) -> Option<&str> {
        self.track_to_src.get(&track).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.src_to_track.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src_to_track.is_empty()
    }

    pub fn max_track(&self) -> Option<i32> {
        self.track_to_src.keys().next_back().copied()
    }

    /// Sources in track order.
    pub fn sources_by_track(&self) -> impl Iterator<Item = (i32, &str)> {
        self.track_to_src.iter().map(|(track, src)| (*track, src.as_str()))
    }

    pub fn to_map(&self) -> BTreeMap<String, i32> {
        self.src_to_track.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn line_keys_interleave_midlines() {
        let mut keys = vec![LineKey::line(1), LineKey::mid(0), LineKey::line(0), LineKey::mid(1)];
        keys.sort();
        assert_eq!(
            keys,
            vec![LineKey::line(0), LineKey::mid(0), LineKey::line(1), LineKey::mid(1)]
        );
    }

    #[test]
    fn pool_hands_out_fresh_lanes() {
        let mut pool = TrackPool::new();
        let a = pool.reserve_row(LineKey::line(2));
        let b = pool.reserve_row(LineKey::line(2));
        let c = pool.reserve_row(LineKey::mid(2));
        assert_eq!((a.lane, b.lane, c.lane), (0, 1, 0));
        assert_eq!(pool.rows_in_use(LineKey::line(2)), 2);
        assert_eq!(pool.cols_in_use(LineKey::line(2)), 0);
    }

    #[test]
    fn midline_lanes_stack_below_line_lanes() {
        let geometry = GridGeometry {
            origin: Point::new(0.0, 0.0),
            cell_width: 100.0,
            cell_height: 100.0,
            channel_width: 40.0,
            channel_height: 40.0,
            lane_spacing: 10.0,
        };
        let mut pool = TrackPool::new();
        let col = pool.reserve_col(LineKey::line(0));
        let first = TrackPosRC::new(pool.reserve_row(LineKey::line(0)), col);
        let mid = TrackPosRC::new(pool.reserve_row(LineKey::mid(0)), col);
        let second = TrackPosRC::new(pool.reserve_row(LineKey::line(0)), col);

        assert_eq!(geometry.resolve(first, &pool), Point::new(10.0, 10.0));
        assert_eq!(geometry.resolve(second, &pool), Point::new(10.0, 20.0));
        assert_eq!(geometry.resolve(mid, &pool), Point::new(10.0, 30.0));
    }

    #[test]
    fn global_tracks_prefer_previous_assignment() {
        let mut previous = BTreeMap::new();
        previous.insert("B".to_string(), 0);
        previous.insert("GONE".to_string(), 1);
        previous.insert("C".to_string(), 0);
        let tracks = GlobalTrackAssignment::assign(&set(&["A", "B", "C"]), Some(&previous));
        assert_eq!(tracks.track_for("B"), Some(0));
        assert_eq!(tracks.track_for("A"), Some(1));
        assert_eq!(tracks.track_for("C"), Some(2));
        assert_eq!(tracks.source_for(1), Some("A"));
        assert_eq!(tracks.len(), 3);
        for (track, src) in tracks.sources_by_track() {
            assert_eq!(tracks.track_for(src), Some(track));
        }
    }

    #[test]
    fn global_tracks_fill_in_sorted_order() {
        let tracks = GlobalTrackAssignment::assign(&set(&["z", "a", "m"]), None);
        assert_eq!(tracks.track_for("a"), Some(0));
        assert_eq!(tracks.track_for("m"), Some(1));
        assert_eq!(tracks.track_for("z"), Some(2));
        assert_eq!(tracks.max_track(), Some(2));
    }
}
