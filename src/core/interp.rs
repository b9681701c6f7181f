//! Bilinear interpolation from a curvilinear mesh of planar sample points.
//!
//! Each quadrilateral cell `(i, j)..(i + 1, j + 1)` of the source mesh is
//! binned by its bounding box; a target point is located by inverting the
//! bilinear map of the candidate cells. Points not covered by any cell are
//! outside the mesh and never extrapolated.

use crate::types::{StormError, StormResult};
use ndarray::{Array2, ArrayView2};

/// Corner offsets `(di, dj)` in weight order
const CORNERS: [(usize, usize); 4] = [(0, 0), (0, 1), (1, 0), (1, 1)];

/// Slack on the unit square when accepting an inverted point
const CELL_EPS: f64 = 1e-9;

const MAX_NEWTON_ITERATIONS: usize = 25;

/// Interpolation weights of one target point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stencil {
    /// Lower-left node of the containing cell
    pub i: usize,
    pub j: usize,
    /// Bilinear weights for corners (i,j), (i,j+1), (i+1,j), (i+1,j+1)
    pub weights: [f64; 4],
}

impl Stencil {
    /// Weighted value over the valid (non-NaN) corners.
    ///
    /// NaN when fewer than `min_valid` corners are valid or when the valid
    /// corners carry no weight.
    pub fn apply(&self, field: &ArrayView2<'_, f64>, min_valid: usize) -> f64 {
        let mut sum = 0.0;
        let mut weight_sum = 0.0;
        let mut valid = 0;
        for (&(di, dj), &w) in CORNERS.iter().zip(self.weights.iter()) {
            let value = field[[self.i + di, self.j + dj]];
            if value.is_nan() {
                continue;
            }
            valid += 1;
            sum += w * value;
            weight_sum += w;
        }
        if valid < min_valid || weight_sum <= 0.0 {
            f64::NAN
        } else {
            sum / weight_sum
        }
    }
}

/// Spatial bins over the cells of a curvilinear mesh
pub struct CellLocator {
    x: Array2<f64>,
    y: Array2<f64>,
    x0: f64,
    y0: f64,
    bin_size: f64,
    bins_x: usize,
    bins_y: usize,
    bins: Vec<Vec<(usize, usize)>>,
}

impl CellLocator {
    /// Bin every cell whose four corners have finite coordinates
    pub fn new(x: Array2<f64>, y: Array2<f64>) -> StormResult<Self> {
        Self::build(x, y, |_| true)
    }

    /// Bin only the cells whose bounding box meets the square
    /// `[-half_width, half_width]²` and whose x extent is below `max_x_span`.
    ///
    /// Cells spanning more than `max_x_span` straddle a longitude seam once
    /// folded into local coordinates and are never a valid neighbourhood.
    pub fn within(x: Array2<f64>, y: Array2<f64>, half_width: f64, max_x_span: f64) -> StormResult<Self> {
        Self::build(x, y, |&[cx0, cx1, cy0, cy1]| {
            cx1 >= -half_width
                && cx0 <= half_width
                && cy1 >= -half_width
                && cy0 <= half_width
                && cx1 - cx0 < max_x_span
        })
    }

    fn build<F>(x: Array2<f64>, y: Array2<f64>, keep: F) -> StormResult<Self>
    where
        F: Fn(&[f64; 4]) -> bool,
    {
        if x.dim() != y.dim() {
            return Err(StormError::ShapeMismatch(format!(
                "x coordinates are {:?} but y coordinates are {:?}",
                x.dim(),
                y.dim()
            )));
        }
        let (rows, cols) = x.dim();
        let cells: Vec<(usize, usize, [f64; 4])> = (0..rows.saturating_sub(1))
            .flat_map(|i| (0..cols.saturating_sub(1)).map(move |j| (i, j)))
            .filter_map(|(i, j)| cell_bounds(&x, &y, i, j).map(|b| (i, j, b)))
            .filter(|(_, _, bounds)| keep(bounds))
            .collect();

        let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for (_, _, [cx0, cx1, cy0, cy1]) in &cells {
            x_min = x_min.min(*cx0);
            x_max = x_max.max(*cx1);
            y_min = y_min.min(*cy0);
            y_max = y_max.max(*cy1);
        }

        let per_axis = ((cells.len() as f64).sqrt().ceil() as usize).max(1);
        let span = (x_max - x_min).max(y_max - y_min);
        let bin_size = if cells.is_empty() || !(span > 0.0) {
            1.0
        } else {
            span / per_axis as f64
        };
        let bins_x = if cells.is_empty() { 0 } else { ((x_max - x_min) / bin_size).floor() as usize + 1 };
        let bins_y = if cells.is_empty() { 0 } else { ((y_max - y_min) / bin_size).floor() as usize + 1 };

        let mut locator = Self {
            x,
            y,
            x0: x_min,
            y0: y_min,
            bin_size,
            bins_x,
            bins_y,
            bins: vec![Vec::new(); bins_x * bins_y],
        };
        for (i, j, [cx0, cx1, cy0, cy1]) in cells {
            let (bx0, by0) = locator.bin_of(cx0, cy0);
            let (bx1, by1) = locator.bin_of(cx1, cy1);
            for by in by0..=by1 {
                for bx in bx0..=bx1 {
                    locator.bins[by * bins_x + bx].push((i, j));
                }
            }
        }
        log::debug!(
            "Cell locator: {}x{} bins of {:.2} km over a {}x{} mesh",
            bins_x,
            bins_y,
            bin_size,
            rows,
            cols
        );
        Ok(locator)
    }

    /// Shape of the source mesh
    pub fn dim(&self) -> (usize, usize) {
        self.x.dim()
    }

    fn bin_of(&self, px: f64, py: f64) -> (usize, usize) {
        let bx = ((px - self.x0) / self.bin_size).floor().max(0.0) as usize;
        let by = ((py - self.y0) / self.bin_size).floor().max(0.0) as usize;
        (bx.min(self.bins_x - 1), by.min(self.bins_y - 1))
    }

    /// Stencil of the cell containing `(px, py)`, `None` outside the mesh
    pub fn locate(&self, px: f64, py: f64) -> Option<Stencil> {
        if self.bins.is_empty() || !px.is_finite() || !py.is_finite() {
            return None;
        }
        let fx = (px - self.x0) / self.bin_size;
        let fy = (py - self.y0) / self.bin_size;
        if fx < 0.0 || fy < 0.0 || fx >= self.bins_x as f64 || fy >= self.bins_y as f64 {
            return None;
        }
        let bin = &self.bins[fy as usize * self.bins_x + fx as usize];
        bin.iter().find_map(|&(i, j)| {
            let [cx0, cx1, cy0, cy1] = cell_bounds(&self.x, &self.y, i, j)?;
            if px < cx0 || px > cx1 || py < cy0 || py > cy1 {
                return None;
            }
            let corners = self.corners(i, j);
            invert_bilinear(&corners, px, py).map(|(s, t)| Stencil {
                i,
                j,
                weights: [(1.0 - s) * (1.0 - t), s * (1.0 - t), (1.0 - s) * t, s * t],
            })
        })
    }

    fn corners(&self, i: usize, j: usize) -> [(f64, f64); 4] {
        CORNERS.map(|(di, dj)| (self.x[[i + di, j + dj]], self.y[[i + di, j + dj]]))
    }
}

/// Bounding box `[x_min, x_max, y_min, y_max]` of a cell with finite corners
fn cell_bounds(x: &Array2<f64>, y: &Array2<f64>, i: usize, j: usize) -> Option<[f64; 4]> {
    let mut bounds = [f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY];
    for &(di, dj) in &CORNERS {
        let (cx, cy) = (x[[i + di, j + dj]], y[[i + di, j + dj]]);
        if !cx.is_finite() || !cy.is_finite() {
            return None;
        }
        bounds[0] = bounds[0].min(cx);
        bounds[1] = bounds[1].max(cx);
        bounds[2] = bounds[2].min(cy);
        bounds[3] = bounds[3].max(cy);
    }
    Some(bounds)
}

/// Unit-square coordinates `(s, t)` of `(px, py)` in a bilinear cell.
///
/// `s` runs along the column direction and `t` along the row direction.
/// Newton iteration from the cell center; `None` when it fails to converge,
/// the cell is degenerate, or the point falls outside the cell.
fn invert_bilinear(corners: &[(f64, f64); 4], px: f64, py: f64) -> Option<(f64, f64)> {
    let [p00, p01, p10, p11] = *corners;
    let scale = (p11.0 - p00.0).abs() + (p11.1 - p00.1).abs() + (p01.0 - p10.0).abs() + (p01.1 - p10.1).abs();
    if !(scale > 0.0) {
        return None;
    }

    let (mut s, mut t) = (0.5, 0.5);
    for _ in 0..MAX_NEWTON_ITERATIONS {
        let fx = (1.0 - s) * (1.0 - t) * p00.0 + s * (1.0 - t) * p01.0 + (1.0 - s) * t * p10.0 + s * t * p11.0 - px;
        let fy = (1.0 - s) * (1.0 - t) * p00.1 + s * (1.0 - t) * p01.1 + (1.0 - s) * t * p10.1 + s * t * p11.1 - py;

        let dxds = (1.0 - t) * (p01.0 - p00.0) + t * (p11.0 - p10.0);
        let dyds = (1.0 - t) * (p01.1 - p00.1) + t * (p11.1 - p10.1);
        let dxdt = (1.0 - s) * (p10.0 - p00.0) + s * (p11.0 - p01.0);
        let dydt = (1.0 - s) * (p10.1 - p00.1) + s * (p11.1 - p01.1);

        let det = dxds * dydt - dxdt * dyds;
        if det.abs() < 1e-12 * scale * scale {
            return None;
        }
        let ds = (fx * dydt - fy * dxdt) / det;
        let dt = (dxds * fy - dyds * fx) / det;
        s -= ds;
        t -= dt;
        if ds.abs() < 1e-12 && dt.abs() < 1e-12 {
            break;
        }
    }

    let inside = |u: f64| u >= -CELL_EPS && u <= 1.0 + CELL_EPS;
    if s.is_finite() && t.is_finite() && inside(s) && inside(t) {
        Some((s.clamp(0.0, 1.0), t.clamp(0.0, 1.0)))
    } else {
        None
    }
}
