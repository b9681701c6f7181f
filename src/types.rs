use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

/// 2D scalar field on the grid (row x column)
pub type ScalarField2 = Array2<f64>;

/// 3D scalar field with a leading level axis (level x row x column)
pub type ScalarField3 = Array3<f64>;

/// Boolean selector shaped like the grid
pub type GridMask = Array2<bool>;

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }

    /// Same point with its longitude expressed in `convention`
    pub fn normalized(&self, convention: LonConvention) -> Self {
        Self {
            lon: convention.normalize(self.lon),
            lat: self.lat,
        }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3})", self.lon, self.lat)
    }
}

/// Longitude convention of a grid or a point.
///
/// Model grids arrive either in [-180, 180), in [0, 360), or wrapped at the
/// western edge of a regional domain (an ocean grid starting at 74.16E keeps
/// everything in [74.16, 434.16)). Every component that compares longitudes
/// normalizes through this type first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LonConvention {
    /// [-180, 180)
    Signed180,
    /// [0, 360)
    Positive360,
    /// [west_edge, west_edge + 360)
    WrapFrom(f64),
}

impl Default for LonConvention {
    fn default() -> Self {
        LonConvention::Signed180
    }
}

impl LonConvention {
    /// Map a longitude into this convention. NaN stays NaN.
    pub fn normalize(&self, lon: f64) -> f64 {
        let west = match *self {
            LonConvention::Signed180 => -180.0,
            LonConvention::Positive360 => 0.0,
            LonConvention::WrapFrom(west) => west,
        };
        let offset = (lon - west).rem_euclid(360.0);
        // rem_euclid rounds tiny negative offsets up to exactly 360
        if offset >= 360.0 {
            west
        } else {
            west + offset
        }
    }

    /// Signed longitude difference `lon - reference` folded into [-180, 180)
    pub fn delta(lon: f64, reference: f64) -> f64 {
        LonConvention::Signed180.normalize(lon - reference)
    }
}

/// Curvilinear longitude/latitude grid.
///
/// Row index `i` runs along one grid axis and column index `j` along the
/// other; the grid is neither assumed orthogonal nor evenly spaced.
#[derive(Debug, Clone)]
pub struct Grid {
    lon: Array2<f64>,
    lat: Array2<f64>,
}

impl Grid {
    /// Build a grid from same-shaped longitude and latitude arrays
    pub fn new(lon: Array2<f64>, lat: Array2<f64>) -> StormResult<Self> {
        if lon.dim() != lat.dim() {
            return Err(StormError::ShapeMismatch(format!(
                "longitude array is {:?} but latitude array is {:?}",
                lon.dim(),
                lat.dim()
            )));
        }
        if lon.is_empty() {
            return Err(StormError::InvalidParameter(
                "grid must contain at least one node".to_string(),
            ));
        }
        Ok(Self { lon, lat })
    }

    /// Rectilinear grid from 1D axes: rows follow `lats`, columns follow `lons`
    pub fn from_axes(lons: &[f64], lats: &[f64]) -> StormResult<Self> {
        let lon = Array2::from_shape_fn((lats.len(), lons.len()), |(_, j)| lons[j]);
        let lat = Array2::from_shape_fn((lats.len(), lons.len()), |(i, _)| lats[i]);
        Self::new(lon, lat)
    }

    pub fn lon(&self) -> ArrayView2<'_, f64> {
        self.lon.view()
    }

    pub fn lat(&self) -> ArrayView2<'_, f64> {
        self.lat.view()
    }

    /// (rows, columns)
    pub fn dim(&self) -> (usize, usize) {
        self.lon.dim()
    }

    pub fn len(&self) -> usize {
        self.lon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lon.is_empty()
    }

    pub fn node(&self, i: usize, j: usize) -> GeoPoint {
        GeoPoint::new(self.lon[[i, j]], self.lat[[i, j]])
    }

    /// Copy of the grid with every longitude expressed in `convention`
    pub fn normalized(&self, convention: LonConvention) -> Self {
        Self {
            lon: self.lon.mapv(|lon| convention.normalize(lon)),
            lat: self.lat.clone(),
        }
    }

    /// Fail fast unless `field` has the grid's shape
    pub fn check_field2(&self, field: &ArrayView2<'_, f64>) -> StormResult<()> {
        if field.dim() != self.dim() {
            return Err(StormError::ShapeMismatch(format!(
                "field shape {:?} does not match grid shape {:?}",
                field.dim(),
                self.dim()
            )));
        }
        Ok(())
    }

    /// Fail fast unless every level of `field` has the grid's shape
    pub fn check_field3(&self, field: &ArrayView3<'_, f64>) -> StormResult<()> {
        let (levels, rows, cols) = field.dim();
        if (rows, cols) != self.dim() {
            return Err(StormError::ShapeMismatch(format!(
                "field levels are {:?} but grid is {:?}",
                (rows, cols),
                self.dim()
            )));
        }
        if levels == 0 {
            return Err(StormError::ShapeMismatch(
                "3D field has no levels".to_string(),
            ));
        }
        Ok(())
    }
}

/// Horizontal vector field (wind, current) as Cartesian (u, v) components
#[derive(Debug, Clone)]
pub struct VectorField {
    pub u: ScalarField3,
    pub v: ScalarField3,
}

impl VectorField {
    pub fn new(u: ScalarField3, v: ScalarField3) -> StormResult<Self> {
        if u.dim() != v.dim() {
            return Err(StormError::ShapeMismatch(format!(
                "u component is {:?} but v component is {:?}",
                u.dim(),
                v.dim()
            )));
        }
        Ok(Self { u, v })
    }

    /// Single-level vector field
    pub fn from_2d(u: ScalarField2, v: ScalarField2) -> StormResult<Self> {
        Self::new(u.insert_axis(Axis(0)), v.insert_axis(Axis(0)))
    }

    pub fn levels(&self) -> usize {
        self.u.len_of(Axis(0))
    }
}

/// Error types for storm-relative grid processing
#[derive(Debug, thiserror::Error)]
pub enum StormError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for storm-relative operations
pub type StormResult<T> = Result<T, StormError>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_longitude_conventions() {
        assert_abs_diff_eq!(LonConvention::Signed180.normalize(300.0), -60.0, epsilon = 1e-9);
        assert_abs_diff_eq!(LonConvention::Signed180.normalize(180.0), -180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(LonConvention::Positive360.normalize(-60.0), 300.0, epsilon = 1e-9);
        assert_abs_diff_eq!(LonConvention::Positive360.normalize(720.5), 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(LonConvention::WrapFrom(74.16).normalize(-60.0), 300.0, epsilon = 1e-9);
        assert_abs_diff_eq!(LonConvention::WrapFrom(74.16).normalize(10.0), 370.0, epsilon = 1e-9);
        assert_abs_diff_eq!(LonConvention::WrapFrom(74.16).normalize(100.0), 100.0, epsilon = 1e-9);
        assert!(LonConvention::Positive360.normalize(f64::NAN).is_nan());
        assert_eq!(LonConvention::Positive360.normalize(-1e-20), 0.0);
    }

    #[test]
    fn test_longitude_delta_wraps() {
        assert_abs_diff_eq!(LonConvention::delta(359.0, 1.0), -2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(LonConvention::delta(-179.0, 179.0), 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(LonConvention::delta(300.0, -60.0), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_grid_shape_validation() {
        let lon = Array2::<f64>::zeros((3, 4));
        let lat = Array2::<f64>::zeros((4, 3));
        assert!(matches!(Grid::new(lon, lat), Err(StormError::ShapeMismatch(_))));

        let empty = Array2::<f64>::zeros((0, 4));
        assert!(Grid::new(empty.clone(), empty).is_err());

        let grid = Grid::from_axes(&[-61.0, -60.0, -59.0], &[19.0, 20.0]).unwrap();
        assert_eq!(grid.dim(), (2, 3));
        assert_eq!(grid.node(1, 2), GeoPoint::new(-59.0, 20.0));

        let field = Array2::<f64>::zeros((3, 2));
        assert!(grid.check_field2(&field.view()).is_err());
    }

    #[test]
    fn test_vector_field_components_must_match() {
        let u = Array3::<f64>::zeros((2, 3, 3));
        let v = Array3::<f64>::zeros((1, 3, 3));
        assert!(VectorField::new(u, v).is_err());

        let field = VectorField::from_2d(Array2::zeros((3, 3)), Array2::zeros((3, 3))).unwrap();
        assert_eq!(field.levels(), 1);
    }
}
