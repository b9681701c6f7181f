//! Nearest-node search on curvilinear longitude/latitude grids.
//!
//! Two strategies sit behind one interface:
//!
//! * [`SearchStrategy::Exact`] scans every node. O(N) per query and always
//!   returns the global nearest node.
//! * [`SearchStrategy::Fast`] narrows an index box by quadrant bisection.
//!   O(log N) per query, but it is a heuristic: it assumes lon/lat vary
//!   smoothly and monotonically with the indices. On strongly distorted
//!   grids (folded or rotated nests, coordinates that jump across a seam) it
//!   can settle on a local minimum and return the wrong node. Nothing in the
//!   result reveals this; use [`GridIndex::nearest_validated`] or the exact
//!   scan when the grid geometry is not known to be well behaved.

use crate::core::geodesy::Sphere;
use crate::types::{GeoPoint, Grid, LonConvention, StormError, StormResult};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Nearest-node search strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStrategy {
    /// Full linear scan, guaranteed global minimum
    Exact,
    /// Quadrant bisection, heuristic
    Fast,
}

impl Default for SearchStrategy {
    fn default() -> Self {
        SearchStrategy::Exact
    }
}

/// Metric used to rank nodes during the exact scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Great-circle distance
    Haversine,
    /// Squared difference in degrees (wrapped longitude); cheaper, adequate
    /// for locating a storm center on a fine regional grid
    PlanarDegrees,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        DistanceMetric::Haversine
    }
}

/// Grid search parameters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GridIndexParams {
    pub strategy: SearchStrategy,
    pub metric: DistanceMetric,
    pub sphere: Sphere,
}

/// Result of a nearest-node query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestNode {
    pub i: usize,
    pub j: usize,
    /// Great-circle distance from the query point to the node (km)
    pub distance_km: f64,
}

impl NearestNode {
    /// False when no node had a finite distance (NaN query point or an
    /// all-NaN grid); the index is then (0, 0) and carries no meaning
    pub fn is_valid(&self) -> bool {
        !self.distance_km.is_nan()
    }
}

/// Parallel index arrays for a batch of queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NearestBatch {
    pub i: Vec<usize>,
    pub j: Vec<usize>,
    pub distance_km: Vec<f64>,
}

impl NearestBatch {
    pub fn len(&self) -> usize {
        self.i.len()
    }

    pub fn is_empty(&self) -> bool {
        self.i.is_empty()
    }
}

impl FromIterator<NearestNode> for NearestBatch {
    fn from_iter<T: IntoIterator<Item = NearestNode>>(iter: T) -> Self {
        let mut batch = NearestBatch::default();
        for node in iter {
            batch.i.push(node.i);
            batch.j.push(node.j);
            batch.distance_km.push(node.distance_km);
        }
        batch
    }
}

/// Nearest-node searcher bound to one grid
pub struct GridIndex<'a> {
    grid: &'a Grid,
    params: GridIndexParams,
}

impl<'a> GridIndex<'a> {
    /// Exact haversine search on the default sphere
    pub fn new(grid: &'a Grid) -> Self {
        Self {
            grid,
            params: GridIndexParams::default(),
        }
    }

    pub fn with_params(grid: &'a Grid, params: GridIndexParams) -> Self {
        Self { grid, params }
    }

    pub fn params(&self) -> &GridIndexParams {
        &self.params
    }

    /// Nearest node using the configured strategy.
    ///
    /// Query points outside the grid envelope return the nearest boundary
    /// node; whether that matters is up to the caller.
    pub fn nearest(&self, point: GeoPoint) -> NearestNode {
        match self.params.strategy {
            SearchStrategy::Exact => self.nearest_linear(point),
            SearchStrategy::Fast => self.nearest_binary(point),
        }
    }

    /// Linear scan over every node. Ties resolve to the first node in
    /// row-major order.
    pub fn nearest_linear(&self, point: GeoPoint) -> NearestNode {
        let lon = self.grid.lon();
        let lat = self.grid.lat();

        let mut best: Option<(usize, usize, f64)> = None;
        for ((i, j), &node_lon) in lon.indexed_iter() {
            let node = GeoPoint::new(node_lon, lat[[i, j]]);
            let score = match self.params.metric {
                DistanceMetric::Haversine => self.params.sphere.arc_length(node, point),
                DistanceMetric::PlanarDegrees => {
                    let dlon = LonConvention::delta(node.lon, point.lon);
                    let dlat = node.lat - point.lat;
                    dlon * dlon + dlat * dlat
                }
            };
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, _, best_score)) if score >= best_score => {}
                _ => best = Some((i, j, score)),
            }
        }

        match best {
            Some((i, j, _)) => self.node_result(i, j, point),
            None => NearestNode {
                i: 0,
                j: 0,
                distance_km: f64::NAN,
            },
        }
    }

    /// Quadrant bisection search.
    ///
    /// Probes sit a quarter of the way in from each edge of the active index
    /// box. The box is halved on both axes towards the nearest probe until it
    /// spans at most 2x2 nodes, and the nearest of those nodes is returned.
    /// See the module documentation for when this can miss the global minimum.
    pub fn nearest_binary(&self, point: GeoPoint) -> NearestNode {
        let (rows, cols) = self.grid.dim();
        let (mut lo_i, mut hi_i) = (0usize, rows - 1);
        let (mut lo_j, mut hi_j) = (0usize, cols - 1);

        loop {
            let (i0, i1) = quarter_points(lo_i, hi_i);
            let (j0, j1) = quarter_points(lo_j, hi_j);
            if i1 - i0 <= 1 && j1 - j0 <= 1 {
                break;
            }

            let probes = [(i0, j0), (i0, j1), (i1, j0), (i1, j1)];
            let half_i = (hi_i - lo_i) / 2;
            let half_j = (hi_j - lo_j) / 2;
            match self.closest_of(&probes, point) {
                0 => {
                    hi_i -= half_i;
                    hi_j -= half_j;
                }
                1 => {
                    hi_i -= half_i;
                    lo_j += half_j;
                }
                2 => {
                    lo_i += half_i;
                    hi_j -= half_j;
                }
                _ => {
                    lo_i += half_i;
                    lo_j += half_j;
                }
            }
        }

        let cell = [(lo_i, lo_j), (lo_i, hi_j), (hi_i, lo_j), (hi_i, hi_j)];
        let (i, j) = cell[self.closest_of(&cell, point)];
        self.node_result(i, j, point)
    }

    /// Fast search checked against the exact scan; logs a warning and
    /// returns the exact answer when they disagree
    pub fn nearest_validated(&self, point: GeoPoint) -> NearestNode {
        let fast = self.nearest_binary(point);
        let exact = self.nearest_linear(point);
        if (fast.i, fast.j) != (exact.i, exact.j) && fast.distance_km != exact.distance_km {
            log::warn!(
                "Quadrant search for {} settled on ({}, {}) at {:.2} km; global nearest is ({}, {}) at {:.2} km",
                point,
                fast.i,
                fast.j,
                fast.distance_km,
                exact.i,
                exact.j,
                exact.distance_km
            );
        }
        exact
    }

    /// Independent nearest-node queries, results in input order
    pub fn nearest_batch(&self, points: &[GeoPoint]) -> NearestBatch {
        log::debug!(
            "Nearest-node batch: {} points, {:?} strategy",
            points.len(),
            self.params.strategy
        );

        #[cfg(feature = "parallel")]
        let nodes: Vec<NearestNode> = points.par_iter().map(|&p| self.nearest(p)).collect();
        #[cfg(not(feature = "parallel"))]
        let nodes: Vec<NearestNode> = points.iter().map(|&p| self.nearest(p)).collect();

        nodes.into_iter().collect()
    }

    /// Batch form taking parallel longitude and latitude slices
    pub fn nearest_batch_lonlat(&self, lons: &[f64], lats: &[f64]) -> StormResult<NearestBatch> {
        if lons.len() != lats.len() {
            return Err(StormError::ShapeMismatch(format!(
                "{} query longitudes but {} latitudes",
                lons.len(),
                lats.len()
            )));
        }
        let points: Vec<GeoPoint> = lons
            .iter()
            .zip(lats)
            .map(|(&lon, &lat)| GeoPoint::new(lon, lat))
            .collect();
        Ok(self.nearest_batch(&points))
    }

    /// Index into `candidates` of the node nearest `point`, first one on ties
    fn closest_of(&self, candidates: &[(usize, usize)], point: GeoPoint) -> usize {
        let mut best = 0;
        let mut best_arc = f64::INFINITY;
        for (k, &(i, j)) in candidates.iter().enumerate() {
            let arc = self.params.sphere.arc_length(self.grid.node(i, j), point);
            if arc < best_arc {
                best = k;
                best_arc = arc;
            }
        }
        best
    }

    fn node_result(&self, i: usize, j: usize, point: GeoPoint) -> NearestNode {
        NearestNode {
            i,
            j,
            distance_km: self.params.sphere.distance_km(self.grid.node(i, j), point),
        }
    }
}

/// Probe indices a quarter of the span in from each end of [lo, hi]
fn quarter_points(lo: usize, hi: usize) -> (usize, usize) {
    let quarter = (hi - lo) / 4;
    (lo + quarter, hi - quarter)
}

/// Exact nearest node (i, j) on the default sphere
pub fn nearest_index_linear(grid: &Grid, point: GeoPoint) -> (usize, usize) {
    let node = GridIndex::new(grid).nearest_linear(point);
    (node.i, node.j)
}

/// Quadrant-bisection nearest node (i, j, distance_km) on the default
/// sphere. Heuristic; see the module documentation.
pub fn nearest_index_binary(grid: &Grid, point: GeoPoint) -> (usize, usize, f64) {
    let node = GridIndex::new(grid).nearest_binary(point);
    (node.i, node.j, node.distance_km)
}
