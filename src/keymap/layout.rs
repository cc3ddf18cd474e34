//! Key geometry in normalized coordinates.
//!
//! Every key occupies a rectangle in [0,1]² per side. Grid keys get uniform
//! cells computed from the layer's row/column extents; custom buttons carry
//! explicit rectangles and are checked before the grid. Rectangle edges are
//! inclusive; a point on a shared border is contained by both neighbors and
//! the declared-order tie-break hands it to the lower-indexed one.

use serde::Serialize;

/// Rectangle in normalized surface coordinates, edge-inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl NormalizedRect {
    #[must_use]
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.w && py >= self.y && py <= self.y + self.h
    }
}

/// Uniform grid geometry for one (side, layer) keymap page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridDims {
    pub rows: u8,
    pub cols: u8,
}

impl GridDims {
    /// Rectangle of the cell at (row, col).
    #[must_use]
    pub fn cell_rect(&self, row: u8, col: u8) -> NormalizedRect {
        let w = 1.0 / f32::from(self.cols.max(1));
        let h = 1.0 / f32::from(self.rows.max(1));
        NormalizedRect {
            x: f32::from(col) * w,
            y: f32::from(row) * h,
            w,
            h,
        }
    }

    /// Cell containing a normalized point, or None outside the surface.
    /// Cells cover (left, right] of their span except the first, so a point
    /// on a shared border lands in the lower-indexed cell.
    #[must_use]
    pub fn hit(&self, px: f32, py: f32) -> Option<(u8, u8)> {
        if !(0.0..=1.0).contains(&px) || !(0.0..=1.0).contains(&py) {
            return None;
        }
        Some((axis_index(py, self.rows), axis_index(px, self.cols)))
    }
}

fn axis_index(p: f32, n: u8) -> u8 {
    let idx = (p * f32::from(n.max(1))).ceil() - 1.0;
    (idx.max(0.0) as u8).min(n.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_rects_tile_the_unit_square() {
        let g = GridDims { rows: 3, cols: 6 };
        let r = g.cell_rect(0, 0);
        assert_eq!((r.x, r.y), (0.0, 0.0));
        let last = g.cell_rect(2, 5);
        assert!((last.x + last.w - 1.0).abs() < 1e-6);
        assert!((last.y + last.h - 1.0).abs() < 1e-6);
    }

    #[test]
    fn hit_maps_interior_points() {
        let g = GridDims { rows: 3, cols: 6 };
        assert_eq!(g.hit(0.4, 0.5), Some((1, 2)));
        assert_eq!(g.hit(0.0, 0.0), Some((0, 0)));
        assert_eq!(g.hit(1.0, 1.0), Some((2, 5)));
    }

    #[test]
    fn border_points_belong_to_lower_indexed_cell() {
        let g = GridDims { rows: 2, cols: 2 };
        // x = 0.5 is the border shared by cols 0 and 1.
        assert_eq!(g.hit(0.5, 0.25), Some((0, 0)));
        assert_eq!(g.hit(0.25, 0.5), Some((0, 0)));
        // Both rects contain the border point; declared order decides.
        assert!(g.cell_rect(0, 0).contains(0.5, 0.25));
        assert!(g.cell_rect(0, 1).contains(0.5, 0.25));
    }

    #[test]
    fn out_of_range_points_miss() {
        let g = GridDims { rows: 2, cols: 2 };
        assert_eq!(g.hit(1.01, 0.5), None);
        assert_eq!(g.hit(-0.01, 0.5), None);
    }

    #[test]
    fn custom_rect_containment_is_edge_inclusive() {
        let r = NormalizedRect { x: 0.2, y: 0.2, w: 0.2, h: 0.2 };
        assert!(r.contains(0.2, 0.2));
        assert!(r.contains(0.4, 0.4));
        assert!(!r.contains(0.41, 0.3));
    }
}
