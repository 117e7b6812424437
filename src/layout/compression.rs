use super::Rect;

/// Row rectangles in top-to-bottom order. Shifting a row moves every row
/// below it by the same amount; geometry is moved afterwards through
/// [`LayoutCompressionFramework::delta_for_y`].
#[derive(Debug, Clone, Default)]
pub struct LayoutCompressionFramework {
    rows: Vec<Rect>,
    /// Original top of each row.
    tops: Vec<f32>,
    /// `(original top, dy)` for every shift, in application order.
    shifts: Vec<(f32, f32)>,
}

impl LayoutCompressionFramework {
    pub fn new(rows: impl IntoIterator<Item = Rect>) -> Self {
        let mut rows: Vec<Rect> = rows.into_iter().collect();
        rows.sort_by(|a, b| a.y.total_cmp(&b.y));
        let tops = rows.iter().map(|rect| rect.y).collect();
        Self {
            rows,
            tops,
            shifts: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[Rect] {
        &self.rows
    }

    /// Moves row `from` and every row below it by `dy`.
    pub fn shift(&mut self, from: usize, dy: f32) {
        if from >= self.rows.len() || dy == 0.0 {
            return;
        }
        for rect in &mut self.rows[from..] {
            rect.y += dy;
        }
        self.shifts.push((self.tops[from], dy));
    }

    /// Closes every gap wider than `min_gap`; returns the total shift.
    pub fn compress(&mut self, min_gap: f32) -> f32 {
        let mut total = 0.0;
        for idx in 1..self.rows.len() {
            let gap = self.rows[idx].y - self.rows[idx - 1].bottom();
            if gap > min_gap {
                let dy = min_gap - gap;
                self.shift(idx, dy);
                total += dy;
            }
        }
        if total != 0.0 {
            tracing::debug!(total, rows = self.rows.len(), "compressed row spacing");
        }
        total
    }

    /// Cumulative shift for geometry originally at `y`.
    pub fn delta_for_y(&self, y: f32) -> f32 {
        self.shifts
            .iter()
            .filter(|(top, _)| y >= *top)
            .map(|(_, dy)| dy)
            .sum()
    }

    pub fn is_identity(&self) -> bool {
        self.shifts.is_empty()
    }
}
