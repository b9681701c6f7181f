//! Vertical sections: piecewise great-circle lines sampled at grid nodes, and
//! straight row/column slices through the storm center.

use crate::core::geodesy::{initial_bearing, Sphere};
use crate::core::grid_index::{DistanceMetric, GridIndex, GridIndexParams, SearchStrategy};
use crate::types::{GeoPoint, Grid, StormError, StormResult};
use ndarray::{s, Array2, ArrayView3};

/// Densified path with a cumulative distance axis
#[derive(Debug, Clone, PartialEq)]
pub struct SectionPath {
    pub points: Vec<GeoPoint>,
    /// Distance along the path from the first point (km)
    pub distance_km: Vec<f64>,
}

impl Sphere {
    /// Insert great-circle waypoints between successive fixpoints so that each
    /// segment is split into `n - 1` equal steps.
    ///
    /// Shared segment end points appear once. Fewer than two fixpoints or
    /// `n < 2` return the fixpoints unchanged.
    pub fn refine_segments(&self, fixpoints: &[GeoPoint], n: usize) -> SectionPath {
        let points: Vec<GeoPoint> = if fixpoints.len() < 2 || n < 2 {
            fixpoints.to_vec()
        } else {
            let mut points = vec![fixpoints[0]];
            for pair in fixpoints.windows(2) {
                points.extend(self.waypoints(pair[0], pair[1], n).into_iter().skip(1));
            }
            points
        };

        let mut distance_km = Vec::with_capacity(points.len());
        let mut total = 0.0;
        for (k, p) in points.iter().enumerate() {
            if k > 0 {
                total += self.distance_km(points[k - 1], *p);
            }
            distance_km.push(total);
        }
        SectionPath { points, distance_km }
    }
}

/// Grid nodes along a piecewise great-circle section
#[derive(Debug, Clone)]
pub struct SectionLine {
    /// (i, j) of each section node, no two consecutive entries equal
    pub nodes: Vec<(usize, usize)>,
    /// Path point that selected each node
    pub path: Vec<GeoPoint>,
    /// Distance from each path point to its node (km)
    pub offset_km: Vec<f64>,
    /// Bearing from each node to the next (degrees)
    pub bearing_deg: Vec<f64>,
}

impl SectionLine {
    /// Nearest grid nodes (exact scan) along the fixpoints refined with `n`
    /// samples per segment
    pub fn along(grid: &Grid, fixpoints: &[GeoPoint], n: usize) -> StormResult<Self> {
        if fixpoints.is_empty() {
            return Err(StormError::InvalidParameter(
                "a section needs at least one fixpoint".to_string(),
            ));
        }
        let params = GridIndexParams::default();
        let path = params.sphere.refine_segments(fixpoints, n);
        let index = GridIndex::with_params(grid, params);
        let batch = index.nearest_batch(&path.points);

        let mut line = SectionLine {
            nodes: Vec::new(),
            path: Vec::new(),
            offset_km: Vec::new(),
            bearing_deg: Vec::new(),
        };
        for (k, point) in path.points.iter().enumerate() {
            let node = (batch.i[k], batch.j[k]);
            if line.nodes.last() == Some(&node) {
                continue;
            }
            line.nodes.push(node);
            line.path.push(*point);
            line.offset_km.push(batch.distance_km[k]);
        }
        line.bearing_deg = line
            .nodes
            .windows(2)
            .map(|pair| initial_bearing(grid.node(pair[0].0, pair[0].1), grid.node(pair[1].0, pair[1].1)))
            .collect();

        log::debug!(
            "Section through {} fixpoints: {} path points, {} distinct nodes",
            fixpoints.len(),
            path.points.len(),
            line.nodes.len()
        );
        Ok(line)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// (level, node) samples of a (level, row, column) field along the line
    pub fn sample(&self, field: &ArrayView3<'_, f64>) -> StormResult<Array2<f64>> {
        let (levels, rows, cols) = field.dim();
        if let Some(&(i, j)) = self.nodes.iter().find(|&&(i, j)| i >= rows || j >= cols) {
            return Err(StormError::ShapeMismatch(format!(
                "section node ({}, {}) is outside a {}x{} field",
                i, j, rows, cols
            )));
        }
        Ok(Array2::from_shape_fn((levels, self.nodes.len()), |(k, n)| {
            let (i, j) = self.nodes[n];
            field[[k, i, j]]
        }))
    }
}

/// Direction of a slice through the storm center
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionAxis {
    /// Along the row index through the center (column fixed)
    SouthNorth,
    /// Along the column index through the center (row fixed)
    WestEast,
}

/// Grid node nearest the storm center by exact scan with `metric`
pub fn center_index(grid: &Grid, center: GeoPoint, metric: DistanceMetric) -> StormResult<(usize, usize)> {
    let params = GridIndexParams {
        strategy: SearchStrategy::Exact,
        metric,
        ..Default::default()
    };
    let node = GridIndex::with_params(grid, params).nearest(center);
    if !node.is_valid() {
        return Err(StormError::InvalidParameter(format!(
            "no grid node has a finite distance to {}",
            center
        )));
    }
    Ok((node.i, node.j))
}

/// (level, distance) slice of `field` through `center_index` along `axis`
pub fn cross_section(
    field: &ArrayView3<'_, f64>,
    center_index: (usize, usize),
    axis: SectionAxis,
) -> StormResult<Array2<f64>> {
    let (_, rows, cols) = field.dim();
    let (ci, cj) = center_index;
    if ci >= rows || cj >= cols {
        return Err(StormError::ShapeMismatch(format!(
            "center index ({}, {}) is outside a {}x{} field",
            ci, cj, rows, cols
        )));
    }
    let slice = match axis {
        SectionAxis::SouthNorth => field.slice(s![.., .., cj]),
        SectionAxis::WestEast => field.slice(s![.., ci, ..]),
    };
    Ok(slice.to_owned())
}
