use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn with_x(self, x: f32) -> Self {
        Self { x, y: self.y }
    }

    pub fn with_y(self, y: f32) -> Self {
        Self { x: self.x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }
}

/// Grows an optional accumulator by `rect`.
pub(crate) fn union_into(acc: &mut Option<Rect>, rect: Rect) {
    *acc = Some(match acc {
        Some(current) => current.union(&rect),
        None => rect,
    });
}

#[derive(Debug, Clone)]
pub struct NodeLayout {
    pub id: String,
    /// Core id of the cluster the node was placed with.
    pub cluster: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NodeLayout {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Points of one link, starting on geometry already emitted for its source.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedLink {
    pub id: String,
    pub source: String,
    pub target: String,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone)]
pub struct StackedLayout {
    pub rows: BTreeMap<i32, Vec<String>>,
    pub nodes: BTreeMap<String, NodeLayout>,
    pub links: BTreeMap<String, RoutedLink>,
    /// Shared segment from each in-stack source's out pad to its trunk lane.
    pub departures: BTreeMap<String, Vec<Point>>,
    pub global_tracks: BTreeMap<String, i32>,
    pub bounds: Rect,
    pub node_bounds: Rect,
}

#[derive(Debug, Clone)]
pub struct GridLayout {
    pub cells: BTreeMap<String, (i32, i32)>,
    pub nodes: BTreeMap<String, NodeLayout>,
    pub links: BTreeMap<String, RoutedLink>,
    /// Stub from each placed source's right side to its root position.
    pub departures: BTreeMap<String, Vec<Point>>,
    pub bounds: Rect,
}

/// Horizontal run at `y` between two members of one cluster.
pub(crate) fn cluster_link_points(from: &NodeLayout, to: &NodeLayout, y: f32) -> Vec<Point> {
    if from.x < to.x {
        vec![Point::new(from.x + from.width, y), Point::new(to.x, y)]
    } else {
        vec![Point::new(from.x, y), Point::new(to.x + to.width, y)]
    }
}

/// True when every segment is horizontal or vertical.
pub fn is_orthogonal(points: &[Point]) -> bool {
    points
        .windows(2)
        .all(|pair| (pair[0].x - pair[1].x).abs() < 1e-3 || (pair[0].y - pair[1].y).abs() < 1e-3)
}

/// Vertices of one link lying on a segment of a link from another source,
/// as `(link, other link, vertex)`.
#[cfg(test)]
pub(crate) fn foreign_contacts<'a>(links: impl IntoIterator<Item = &'a RoutedLink>) -> Vec<(String, String, Point)> {
    let links: Vec<&RoutedLink> = links.into_iter().collect();
    let mut out = Vec::new();
    for link in &links {
        for other in &links {
            if link.source == other.source {
                continue;
            }
            for vertex in &link.points {
                let touches = other.points.windows(2).any(|seg| {
                    let (a, b) = (seg[0], seg[1]);
                    vertex.x >= a.x.min(b.x) - 1e-3
                        && vertex.x <= a.x.max(b.x) + 1e-3
                        && vertex.y >= a.y.min(b.y) - 1e-3
                        && vertex.y <= a.y.max(b.y) + 1e-3
                });
                if touches {
                    out.push((link.id.clone(), other.id.clone(), *vertex));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_covers_both_rects() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, -5.0, 5.0, 5.0);
        let u = a.union(&b);
        assert_eq!(u, Rect::new(0.0, -5.0, 25.0, 15.0));

        let mut acc = None;
        union_into(&mut acc, a);
        union_into(&mut acc, b);
        assert_eq!(acc, Some(u));
    }

    #[test]
    fn orthogonal_paths_only_turn_square() {
        let orth = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(20.0, 10.0),
        ];
        assert!(is_orthogonal(&orth));
        assert!(!is_orthogonal(&[Point::new(0.0, 0.0), Point::new(5.0, 5.0)]));
    }

    fn link(id: &str, source: &str, points: &[(f32, f32)]) -> RoutedLink {
        RoutedLink {
            id: id.to_string(),
            source: source.to_string(),
            target: String::new(),
            points: points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        }
    }

    #[test]
    fn contacts_ignore_crossings_and_own_source() {
        let across = link("a", "s", &[(0.0, 10.0), (40.0, 10.0)]);
        let down = link("b", "t", &[(20.0, 0.0), (20.0, 30.0)]);
        let sibling = link("c", "s", &[(40.0, 10.0), (40.0, 30.0)]);
        assert!(foreign_contacts([&across, &down, &sibling]).is_empty());

        let landing = link("d", "t", &[(30.0, 0.0), (30.0, 10.0)]);
        assert_eq!(
            foreign_contacts([&across, &landing]),
            vec![("d".to_string(), "a".to_string(), Point::new(30.0, 10.0))]
        );
    }
}
