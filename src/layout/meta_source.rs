//! Per-source pen used while emitting the link segments of one source.
//!
//! A source's links form a tree: the first link carries the shared trunk and
//! every later link tees off geometry already emitted. Each call returns the
//! points of one link, starting at its tee point.

use super::{LayoutError, LayoutResult, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// The pen serves the inside of a battery block.
    PureTarget,
    /// The source enters the stack from outside, down a global track.
    InboundSource,
    /// The source and its targets share one row.
    IntraSource,
    /// The source leaves its row through its departure lane and reaches
    /// targets in other rows along a trunk.
    AlwaysBelow,
}

#[derive(Debug, Clone, PartialEq)]
enum TracePhase {
    NotStarted,
    /// The trunk has reached `trace_y`; `last` is the rightmost tap on it.
    Tipped {
        trunk: Point,
        trace_y: f32,
        cluster: String,
        last: Point,
    },
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
enum PureTargetTip {
    /// Nothing emitted inside any battery yet.
    NoHotTip { entry: Point },
    /// A previous battery's drop column is live where it leaves the row
    /// trace; the current battery is not reached yet.
    HotTip { hot: Point, entry: Point },
    /// At the drop column of the current battery, row trace not reached.
    CarriedOver { entry: Point, drop: Point, deepest: f32 },
    /// Riding the trace of one block row.
    Established {
        entry: Point,
        row_y: f32,
        deepest: f32,
        last: Point,
    },
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
enum Cursor {
    Trace(TracePhase),
    PureTarget(PureTargetTip),
}

#[derive(Debug, Clone)]
pub struct MetaClusterPointSource {
    source: String,
    mode: SourceMode,
    grid_size: f32,
    base: Point,
    cursor: Cursor,
}

impl MetaClusterPointSource {
    /// `base` is where the pen starts: the top of a global track, the foot of
    /// a departure stub, or (for [`SourceMode::PureTarget`]) the entry point of
    /// the first battery served.
    pub fn new(source: &str, mode: SourceMode, base: Point, grid_size: f32) -> LayoutResult<Self> {
        check_aligned(base, grid_size, "base point")?;
        let cursor = match mode {
            SourceMode::PureTarget => Cursor::PureTarget(PureTargetTip::NoHotTip { entry: base }),
            _ => Cursor::Trace(TracePhase::NotStarted),
        };
        Ok(Self {
            source: source.to_string(),
            mode,
            grid_size,
            base,
            cursor,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self.cursor,
            Cursor::Trace(TracePhase::Closed) | Cursor::PureTarget(PureTargetTip::Closed)
        )
    }

    pub fn close(&mut self) {
        self.cursor = match self.cursor {
            Cursor::Trace(_) => Cursor::Trace(TracePhase::Closed),
            Cursor::PureTarget(_) => Cursor::PureTarget(PureTargetTip::Closed),
        };
    }

    /// Where the next lateral extension would start from.
    pub fn last_left_point(&self) -> Option<Point> {
        match &self.cursor {
            Cursor::Trace(TracePhase::Tipped { last, .. }) => Some(*last),
            Cursor::PureTarget(PureTargetTip::Established { last, .. }) => Some(*last),
            _ => None,
        }
    }

    /// Routes one link to `pad` on `cluster`, whose row trace for this source
    /// runs at `trace_y`.
    pub fn link_to_pad(&mut self, cluster: &str, trace_y: f32, pad: Point) -> LayoutResult<Vec<Point>> {
        check_aligned(pad, self.grid_size, "pad")?;
        check_aligned(Point::new(pad.x, trace_y), self.grid_size, "trace")?;
        let Cursor::Trace(phase) = &self.cursor else {
            return Err(LayoutError::invalid(format!(
                "trace routing requested for {:?} source {}",
                self.mode, self.source
            )));
        };

        let mut points = Vec::with_capacity(4);
        let next = match phase {
            TracePhase::Closed => {
                return Err(LayoutError::internal(format!(
                    "source {} routed after close",
                    self.source
                )));
            }
            TracePhase::NotStarted => {
                // Top drop from a bus, or an internal branch off the stub.
                let trunk = self.base.with_y(trace_y);
                push(&mut points, self.base);
                push(&mut points, trunk);
                push(&mut points, pad.with_y(trace_y));
                push(&mut points, pad);
                TracePhase::Tipped {
                    trunk,
                    trace_y,
                    cluster: cluster.to_string(),
                    last: pad.with_y(trace_y),
                }
            }
            TracePhase::Tipped {
                trunk,
                trace_y: current_y,
                cluster: current,
                last,
            } => {
                if (*current_y - trace_y).abs() > f32::EPSILON {
                    if self.mode == SourceMode::IntraSource {
                        return Err(LayoutError::internal(format!(
                            "intra source {} asked to leave its row",
                            self.source
                        )));
                    }
                    // First cluster of a new row: extra drop along the trunk.
                    push(&mut points, *trunk);
                    let trunk = trunk.with_y(trace_y);
                    push(&mut points, trunk);
                    push(&mut points, pad.with_y(trace_y));
                    push(&mut points, pad);
                    TracePhase::Tipped {
                        trunk,
                        trace_y,
                        cluster: cluster.to_string(),
                        last: pad.with_y(trace_y),
                    }
                } else if current != cluster && (last.x - pad.x).abs() < f32::EPSILON {
                    // New cluster straight below the tap.
                    push(&mut points, *last);
                    push(&mut points, pad);
                    TracePhase::Tipped {
                        trunk: *trunk,
                        trace_y,
                        cluster: cluster.to_string(),
                        last: *last,
                    }
                } else {
                    // Lateral extension along the shared trace.
                    push(&mut points, *last);
                    push(&mut points, pad.with_y(trace_y));
                    push(&mut points, pad);
                    let last = if pad.x > last.x { pad.with_y(trace_y) } else { *last };
                    TracePhase::Tipped {
                        trunk: *trunk,
                        trace_y,
                        cluster: cluster.to_string(),
                        last,
                    }
                }
            }
        };
        self.cursor = Cursor::Trace(next);
        Ok(points)
    }

    /// Moves the battery pen on to the next block, entered at `entry`. The
    /// next link tees off the source's row trace at `trace_y`, above the
    /// previous battery's entry, and carries along that trace to the new
    /// drop column.
    pub fn begin_battery(&mut self, entry: Point, trace_y: f32) -> LayoutResult<()> {
        check_aligned(entry, self.grid_size, "battery entry")?;
        check_aligned(entry.with_y(trace_y), self.grid_size, "row trace")?;
        let Cursor::PureTarget(tip) = &self.cursor else {
            return Err(LayoutError::invalid(format!(
                "battery entry requested for {:?} source {}",
                self.mode, self.source
            )));
        };
        if trace_y >= entry.y {
            return Err(LayoutError::invalid(format!(
                "row trace of {} at {trace_y} is not above battery entry {}",
                self.source, entry.y
            )));
        }
        let next = match tip {
            PureTargetTip::Closed => {
                return Err(LayoutError::internal(format!(
                    "source {} routed after close",
                    self.source
                )));
            }
            PureTargetTip::NoHotTip { .. } => PureTargetTip::NoHotTip { entry },
            PureTargetTip::HotTip { hot, .. } => PureTargetTip::HotTip { hot: *hot, entry },
            PureTargetTip::CarriedOver { entry: previous, .. }
            | PureTargetTip::Established { entry: previous, .. } => PureTargetTip::HotTip {
                hot: previous.with_y(trace_y),
                entry,
            },
        };
        self.cursor = Cursor::PureTarget(next);
        Ok(())
    }

    /// Routes one link inside the current battery to `pad`, whose block row
    /// trace for this source runs at `row_y`.
    pub fn pure_target_link(&mut self, row_y: f32, pad: Point) -> LayoutResult<Vec<Point>> {
        check_aligned(pad, self.grid_size, "pad")?;
        check_aligned(Point::new(pad.x, row_y), self.grid_size, "row trace")?;
        let Cursor::PureTarget(tip) = &self.cursor else {
            return Err(LayoutError::invalid(format!(
                "battery routing requested for {:?} source {}",
                self.mode, self.source
            )));
        };
        let mut tip = tip.clone();
        let mut points = Vec::with_capacity(4);
        loop {
            tip = match tip {
                PureTargetTip::Closed => {
                    return Err(LayoutError::internal(format!(
                        "source {} routed after close",
                        self.source
                    )));
                }
                PureTargetTip::NoHotTip { entry } => {
                    // The drop root is the entry itself.
                    push(&mut points, entry);
                    PureTargetTip::CarriedOver {
                        entry,
                        drop: entry,
                        deepest: entry.y,
                    }
                }
                PureTargetTip::HotTip { hot, entry } => {
                    // Along the row trace, then down through the entry.
                    push(&mut points, hot);
                    let drop = entry.with_y(hot.y);
                    push(&mut points, drop);
                    PureTargetTip::CarriedOver {
                        entry,
                        drop,
                        deepest: entry.y,
                    }
                }
                PureTargetTip::CarriedOver { entry, drop, deepest } => {
                    push(&mut points, drop);
                    let at_row = drop.with_y(row_y);
                    push(&mut points, at_row);
                    PureTargetTip::Established {
                        entry,
                        row_y,
                        deepest: deepest.max(row_y),
                        last: at_row,
                    }
                }
                PureTargetTip::Established {
                    entry,
                    row_y: current,
                    deepest,
                    last,
                } => {
                    if (current - row_y).abs() > f32::EPSILON {
                        // New block row: leave from the bottom of the drop column.
                        PureTargetTip::CarriedOver {
                            entry,
                            drop: entry.with_y(deepest),
                            deepest,
                        }
                    } else {
                        push(&mut points, last);
                        push(&mut points, pad.with_y(row_y));
                        push(&mut points, pad);
                        let last = if pad.x > last.x { pad.with_y(row_y) } else { last };
                        self.cursor = Cursor::PureTarget(PureTargetTip::Established {
                            entry,
                            row_y,
                            deepest,
                            last,
                        });
                        return Ok(points);
                    }
                }
            };
        }
    }
}

/// Appends `point` unless it repeats the previous one.
fn push(points: &mut Vec<Point>, point: Point) {
    if points.last() != Some(&point) {
        points.push(point);
    }
}

fn check_aligned(point: Point, grid_size: f32, what: &str) -> LayoutResult<()> {
    let aligned = |v: f32| {
        let cells = v / grid_size;
        (cells - cells.round()).abs() < 1e-4
    };
    if aligned(point.x) && aligned(point.y) {
        Ok(())
    } else {
        Err(LayoutError::invalid(format!(
            "{what} ({}, {}) is off the {grid_size} grid",
            point.x, point.y
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f32, y: f32) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn off_grid_base_is_rejected() {
        let err = MetaClusterPointSource::new("s", SourceMode::InboundSource, p(5.0, 0.0), 10.0)
            .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidArgument(_)));
    }

    #[test]
    fn inbound_source_drops_then_extends() {
        let mut pen =
            MetaClusterPointSource::new("s", SourceMode::InboundSource, p(10.0, 0.0), 10.0).unwrap();
        let first = pen.link_to_pad("c1", 50.0, p(100.0, 80.0)).unwrap();
        assert_eq!(first, vec![p(10.0, 0.0), p(10.0, 50.0), p(100.0, 50.0), p(100.0, 80.0)]);

        // Same row, next cluster: lateral extension from the last tap.
        let second = pen.link_to_pad("c2", 50.0, p(200.0, 80.0)).unwrap();
        assert_eq!(second, vec![p(100.0, 50.0), p(200.0, 50.0), p(200.0, 80.0)]);
        assert_eq!(pen.last_left_point(), Some(p(200.0, 50.0)));

        // Next row: extra drop from the trunk, not from the last tap.
        let third = pen.link_to_pad("c3", 150.0, p(60.0, 180.0)).unwrap();
        assert_eq!(third, vec![p(10.0, 50.0), p(10.0, 150.0), p(60.0, 150.0), p(60.0, 180.0)]);
    }

    #[test]
    fn new_cluster_under_tap_extends_vertically() {
        let mut pen =
            MetaClusterPointSource::new("s", SourceMode::AlwaysBelow, p(300.0, 0.0), 10.0).unwrap();
        pen.link_to_pad("c1", 50.0, p(100.0, 80.0)).unwrap();
        let next = pen.link_to_pad("c2", 50.0, p(100.0, 80.0)).unwrap();
        assert_eq!(next, vec![p(100.0, 50.0), p(100.0, 80.0)]);
    }

    #[test]
    fn intra_source_cannot_change_rows() {
        let mut pen =
            MetaClusterPointSource::new("s", SourceMode::IntraSource, p(100.0, 100.0), 10.0).unwrap();
        let first = pen.link_to_pad("c1", 60.0, p(20.0, 80.0)).unwrap();
        assert_eq!(first[0], p(100.0, 100.0));
        let err = pen.link_to_pad("c2", 160.0, p(20.0, 180.0)).unwrap_err();
        assert!(matches!(err, LayoutError::Internal(_)));
    }

    #[test]
    fn closed_pen_refuses_links() {
        let mut pen =
            MetaClusterPointSource::new("s", SourceMode::InboundSource, p(0.0, 0.0), 10.0).unwrap();
        pen.close();
        assert!(pen.is_closed());
        assert!(matches!(
            pen.link_to_pad("c", 10.0, p(10.0, 20.0)),
            Err(LayoutError::Internal(_))
        ));
    }

    #[test]
    fn modes_reject_foreign_operations() {
        let mut pen =
            MetaClusterPointSource::new("s", SourceMode::PureTarget, p(0.0, 0.0), 10.0).unwrap();
        assert!(matches!(
            pen.link_to_pad("c", 10.0, p(10.0, 20.0)),
            Err(LayoutError::InvalidArgument(_))
        ));
        let mut pen =
            MetaClusterPointSource::new("s", SourceMode::InboundSource, p(0.0, 0.0), 10.0).unwrap();
        assert!(pen.pure_target_link(10.0, p(10.0, 20.0)).is_err());
        assert!(pen.begin_battery(p(10.0, 0.0), -10.0).is_err());
    }

    #[test]
    fn pure_target_accounting_walks_block_rows() {
        let entry = p(20.0, 100.0);
        let mut pen = MetaClusterPointSource::new("s", SourceMode::PureTarget, entry, 10.0).unwrap();

        // No hot tip: drop root at the entry, drop to the row, carry to the pad.
        let first = pen.pure_target_link(120.0, p(60.0, 140.0)).unwrap();
        assert_eq!(first, vec![p(20.0, 100.0), p(20.0, 120.0), p(60.0, 120.0), p(60.0, 140.0)]);

        // Same block row: lateral carry.
        let second = pen.pure_target_link(120.0, p(120.0, 140.0)).unwrap();
        assert_eq!(second, vec![p(60.0, 120.0), p(120.0, 120.0), p(120.0, 140.0)]);

        // Next block row: back down the drop column.
        let third = pen.pure_target_link(200.0, p(60.0, 220.0)).unwrap();
        assert_eq!(third, vec![p(20.0, 120.0), p(20.0, 200.0), p(60.0, 200.0), p(60.0, 220.0)]);
    }

    #[test]
    fn pure_target_tees_off_row_trace_for_next_battery() {
        let mut pen =
            MetaClusterPointSource::new("s", SourceMode::PureTarget, p(20.0, 100.0), 10.0).unwrap();
        pen.pure_target_link(120.0, p(60.0, 140.0)).unwrap();
        pen.begin_battery(p(300.0, 100.0), 60.0).unwrap();
        let next = pen.pure_target_link(120.0, p(340.0, 140.0)).unwrap();
        assert_eq!(
            next,
            vec![p(20.0, 60.0), p(300.0, 60.0), p(300.0, 120.0), p(340.0, 120.0), p(340.0, 140.0)]
        );
        // Nothing runs along the block top the entries share.
        assert!(next.windows(2).all(|seg| seg[0].y != 100.0 || seg[1].y != 100.0));
    }

    #[test]
    fn battery_entry_must_sit_below_the_row_trace() {
        let mut pen =
            MetaClusterPointSource::new("s", SourceMode::PureTarget, p(20.0, 100.0), 10.0).unwrap();
        pen.pure_target_link(120.0, p(60.0, 140.0)).unwrap();
        assert!(matches!(
            pen.begin_battery(p(300.0, 100.0), 100.0),
            Err(LayoutError::InvalidArgument(_))
        ));
    }
}
