//! Storm-centered polar resampling and azimuthal averaging.
//!
//! The grid is first localized to storm-relative kilometres with a local
//! equirectangular approximation:
//!
//! ```text
//! x = Δlon · k · cos(lat_c)      y = Δlat · k      (k = km_per_degree)
//! ```
//!
//! This is a bounded-validity approximation, not a geodesic projection. With
//! the default `k = 111.1` it stays within about 1% of great-circle distance
//! out to 500 km at tropical latitudes; the error grows with radius and with
//! latitude, and the constant ignores the latitude dependence of the meridian
//! degree. `k` is configurable so products can match the value they were
//! built with.
//!
//! Fields are then interpolated bilinearly from the curvilinear grid cells
//! onto an (radius, azimuth) mesh and can be averaged over azimuth.
//! Azimuth is measured counter-clockwise from east, in radians.

use crate::core::interp::{CellLocator, Stencil};
use crate::core::stats::nan_mean_axis;
use crate::core::track::Track;
use crate::types::{GeoPoint, Grid, LonConvention, StormError, StormResult, VectorField};
use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Polar resampling parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PolarParams {
    /// Outer radius of the polar mesh (km)
    pub max_radius_km: f64,
    /// Target radial spacing (km), usually the grid's native resolution
    pub radial_resolution_km: f64,
    /// Azimuth samples over one full turn
    pub azimuth_steps: usize,
    /// Length of one degree used by the local projection (km)
    pub km_per_degree: f64,
    /// Valid cell corners required for an interpolated value (1-4)
    pub min_valid_corners: usize,
}

impl Default for PolarParams {
    fn default() -> Self {
        Self {
            max_radius_km: 400.0,
            // 0.02 degree nest spacing
            radial_resolution_km: 0.02 * 111.0,
            azimuth_steps: 72,
            km_per_degree: 111.1,
            min_valid_corners: 3,
        }
    }
}

impl PolarParams {
    pub fn validate(&self) -> StormResult<()> {
        if !(self.max_radius_km > 0.0 && self.max_radius_km.is_finite()) {
            return Err(StormError::InvalidParameter(format!(
                "max_radius_km must be positive, got {}",
                self.max_radius_km
            )));
        }
        if !(self.radial_resolution_km > 0.0 && self.radial_resolution_km.is_finite()) {
            return Err(StormError::InvalidParameter(format!(
                "radial_resolution_km must be positive, got {}",
                self.radial_resolution_km
            )));
        }
        if self.azimuth_steps == 0 {
            return Err(StormError::InvalidParameter(
                "azimuth_steps must be at least 1".to_string(),
            ));
        }
        if !(self.km_per_degree > 0.0 && self.km_per_degree.is_finite()) {
            return Err(StormError::InvalidParameter(format!(
                "km_per_degree must be positive, got {}",
                self.km_per_degree
            )));
        }
        if !(1..=4).contains(&self.min_valid_corners) {
            return Err(StormError::InvalidParameter(format!(
                "min_valid_corners must be between 1 and 4, got {}",
                self.min_valid_corners
            )));
        }
        Ok(())
    }
}

/// (radius, azimuth) mesh around the storm center
#[derive(Debug, Clone)]
pub struct PolarMesh {
    radii: Array1<f64>,
    azimuths: Array1<f64>,
    x: Array2<f64>,
    y: Array2<f64>,
}

impl PolarMesh {
    /// Radii `0..=max_radius_km` evenly spaced at no finer than the requested
    /// resolution; azimuths `2πk / azimuth_steps` for `k < azimuth_steps`
    pub fn new(params: &PolarParams) -> StormResult<Self> {
        params.validate()?;
        let n_radii = (params.max_radius_km / params.radial_resolution_km).floor() as usize + 1;
        let radii = Array1::linspace(0.0, params.max_radius_km, n_radii);
        let step = 2.0 * std::f64::consts::PI / params.azimuth_steps as f64;
        let azimuths = Array1::from_shape_fn(params.azimuth_steps, |k| k as f64 * step);

        let shape = (radii.len(), azimuths.len());
        let x = Array2::from_shape_fn(shape, |(r, a)| radii[r] * azimuths[a].cos());
        let y = Array2::from_shape_fn(shape, |(r, a)| radii[r] * azimuths[a].sin());
        Ok(Self { radii, azimuths, x, y })
    }

    /// Radial axis (km)
    pub fn radii(&self) -> &Array1<f64> {
        &self.radii
    }

    /// Azimuth axis (radians, counter-clockwise from east)
    pub fn azimuths(&self) -> &Array1<f64> {
        &self.azimuths
    }

    pub fn azimuths_deg(&self) -> Array1<f64> {
        self.azimuths.mapv(f64::to_degrees)
    }

    /// Storm-relative eastward coordinate of each mesh point (km)
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    /// Storm-relative northward coordinate of each mesh point (km)
    pub fn y(&self) -> &Array2<f64> {
        &self.y
    }

    /// (radii, azimuths)
    pub fn dim(&self) -> (usize, usize) {
        self.x.dim()
    }
}

/// Radial and tangential components on the polar mesh
#[derive(Debug, Clone)]
pub struct PolarVector {
    /// Outward component, (level, radius, azimuth)
    pub radial: Array3<f64>,
    /// Counter-clockwise component, (level, radius, azimuth)
    pub tangential: Array3<f64>,
}

/// Outcome of resampling at a forecast hour
#[derive(Debug, Clone)]
pub enum Resampling<T> {
    Resampled(T),
    /// The track has no usable center at this hour; nothing was computed
    NoTrackRecord { forecast_hour: i32 },
}

impl<T> Resampling<T> {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Resampling::NoTrackRecord { .. })
    }

    pub fn resampled(self) -> Option<T> {
        match self {
            Resampling::Resampled(value) => Some(value),
            Resampling::NoTrackRecord { .. } => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Resampling<U> {
        match self {
            Resampling::Resampled(value) => Resampling::Resampled(f(value)),
            Resampling::NoTrackRecord { forecast_hour } => Resampling::NoTrackRecord { forecast_hour },
        }
    }
}

/// Interpolation stencils from one grid onto one polar mesh.
///
/// Built once per (grid, center) and reused for every level and component.
pub struct PolarPlan {
    mesh: PolarMesh,
    center: GeoPoint,
    grid_dim: (usize, usize),
    stencils: Array2<Option<Stencil>>,
    min_valid_corners: usize,
}

impl PolarPlan {
    pub fn mesh(&self) -> &PolarMesh {
        &self.mesh
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    /// Fraction of polar points covered by a grid cell
    pub fn coverage(&self) -> f64 {
        let covered = self.stencils.iter().filter(|s| s.is_some()).count();
        covered as f64 / self.stencils.len() as f64
    }

    /// Interpolate one 2D level onto the mesh
    pub fn apply(&self, field: &ArrayView2<'_, f64>) -> StormResult<Array2<f64>> {
        if field.dim() != self.grid_dim {
            return Err(StormError::ShapeMismatch(format!(
                "field shape {:?} does not match grid shape {:?}",
                field.dim(),
                self.grid_dim
            )));
        }
        Ok(self.stencils.map(|stencil| match stencil {
            Some(stencil) => stencil.apply(field, self.min_valid_corners),
            None => f64::NAN,
        }))
    }

    /// Interpolate every level of a (level, row, column) field
    pub fn apply_levels(&self, field: &ArrayView3<'_, f64>) -> StormResult<Array3<f64>> {
        let n_levels = field.len_of(Axis(0));

        #[cfg(feature = "parallel")]
        let levels: StormResult<Vec<Array2<f64>>> = (0..n_levels)
            .into_par_iter()
            .map(|k| self.apply(&field.index_axis(Axis(0), k)))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let levels: StormResult<Vec<Array2<f64>>> = (0..n_levels)
            .map(|k| self.apply(&field.index_axis(Axis(0), k)))
            .collect();

        let levels = levels?;
        let views: Vec<ArrayView2<'_, f64>> = levels.iter().map(|level| level.view()).collect();
        ndarray::stack(Axis(0), &views)
            .map_err(|e| StormError::Processing(format!("failed to stack polar levels: {}", e)))
    }
}

/// Resamples grid fields onto a storm-centered polar mesh
pub struct PolarResampler {
    params: PolarParams,
}

impl PolarResampler {
    pub fn new() -> Self {
        Self {
            params: PolarParams::default(),
        }
    }

    pub fn with_params(params: PolarParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PolarParams {
        &self.params
    }

    pub fn mesh(&self) -> StormResult<PolarMesh> {
        PolarMesh::new(&self.params)
    }

    /// Storm-relative (x, y) km of every grid node.
    ///
    /// Longitude differences are folded into [-180, 180), so grid and center
    /// may use different longitude conventions.
    pub fn localize(&self, grid: &Grid, center: GeoPoint) -> (Array2<f64>, Array2<f64>) {
        let k = self.params.km_per_degree;
        let lon_scale = k * center.lat.to_radians().cos();
        let x = grid.lon().mapv(|lon| LonConvention::delta(lon, center.lon) * lon_scale);
        let y = grid.lat().mapv(|lat| (lat - center.lat) * k);
        (x, y)
    }

    /// Locate every polar point in the grid around `center`
    pub fn plan(&self, grid: &Grid, center: GeoPoint) -> StormResult<PolarPlan> {
        if !center.is_finite() {
            return Err(StormError::InvalidParameter(format!(
                "storm center must be finite, got {}",
                center
            )));
        }
        let mesh = self.mesh()?;
        log::debug!(
            "Polar mesh around {}: {} radii to {:.0} km, {} azimuths",
            center,
            mesh.radii().len(),
            self.params.max_radius_km,
            mesh.azimuths().len()
        );

        // half a turn of longitude in local km; wider cells wrap the globe
        let half_turn_km = 180.0 * self.params.km_per_degree * center.lat.to_radians().cos();
        let (x, y) = self.localize(grid, center);
        let locator = CellLocator::within(x, y, self.params.max_radius_km, half_turn_km)?;

        let stencils = ndarray::Zip::from(mesh.x())
            .and(mesh.y())
            .map_collect(|&px, &py| locator.locate(px, py));

        let plan = PolarPlan {
            mesh,
            center,
            grid_dim: grid.dim(),
            stencils,
            min_valid_corners: self.params.min_valid_corners,
        };
        if plan.coverage() < 1.0 {
            log::debug!(
                "Only {:.1}% of the polar mesh around {} lies inside the grid",
                100.0 * plan.coverage(),
                center
            );
        }
        Ok(plan)
    }

    /// 2D field on the polar mesh, (radius, azimuth)
    pub fn resample(&self, grid: &Grid, field: &ArrayView2<'_, f64>, center: GeoPoint) -> StormResult<Array2<f64>> {
        grid.check_field2(field)?;
        self.plan(grid, center)?.apply(field)
    }

    /// 3D field on the polar mesh, (level, radius, azimuth)
    pub fn resample_levels(&self, grid: &Grid, field: &ArrayView3<'_, f64>, center: GeoPoint) -> StormResult<Array3<f64>> {
        grid.check_field3(field)?;
        let plan = self.plan(grid, center)?;
        let polar = plan.apply_levels(field)?;
        log::info!(
            "Resampled {} levels onto a {}x{} polar mesh ({:.1}% coverage)",
            polar.len_of(Axis(0)),
            plan.mesh().radii().len(),
            plan.mesh().azimuths().len(),
            100.0 * plan.coverage()
        );
        Ok(polar)
    }

    /// Radial and tangential components of a vector field on the polar mesh.
    ///
    /// u and v are interpolated first; the rotation into (radial, tangential)
    /// uses each polar point's azimuth.
    pub fn decompose(&self, grid: &Grid, field: &VectorField, center: GeoPoint) -> StormResult<PolarVector> {
        grid.check_field3(&field.u.view())?;
        grid.check_field3(&field.v.view())?;
        let plan = self.plan(grid, center)?;
        let u = plan.apply_levels(&field.u.view())?;
        let v = plan.apply_levels(&field.v.view())?;
        let (radial, tangential) = rotate(&u, &v, plan.mesh().azimuths());
        Ok(PolarVector { radial, tangential })
    }

    /// Azimuth-mean profile of a 3D field, (radius, level)
    pub fn azimuthal_profile(&self, grid: &Grid, field: &ArrayView3<'_, f64>, center: GeoPoint) -> StormResult<Array2<f64>> {
        let polar = self.resample_levels(grid, field, center)?;
        Ok(azimuthal_mean(&polar.view()))
    }

    /// Azimuth-mean profile of a 2D field, one value per radius
    pub fn azimuthal_profile_2d(&self, grid: &Grid, field: &ArrayView2<'_, f64>, center: GeoPoint) -> StormResult<Array1<f64>> {
        let polar = self.resample(grid, field, center)?;
        Ok(nan_mean_axis(polar.view(), Axis(1)))
    }

    /// Azimuth-mean radial and tangential profiles, each (radius, level)
    pub fn vector_profile(&self, grid: &Grid, field: &VectorField, center: GeoPoint) -> StormResult<(Array2<f64>, Array2<f64>)> {
        let polar = self.decompose(grid, field, center)?;
        Ok((azimuthal_mean(&polar.radial.view()), azimuthal_mean(&polar.tangential.view())))
    }

    /// Azimuth-mean profile at a forecast hour of `track`.
    ///
    /// Without a track center at exactly `forecast_hour` nothing is computed
    /// and `NoTrackRecord` is returned.
    pub fn profile_at(
        &self,
        grid: &Grid,
        field: &ArrayView3<'_, f64>,
        track: &Track,
        forecast_hour: i32,
    ) -> StormResult<Resampling<Array2<f64>>> {
        match track.center_at(forecast_hour) {
            Some(center) => Ok(Resampling::Resampled(self.azimuthal_profile(grid, field, center)?)),
            None => {
                log::warn!("No track record at forecast hour {}, skipping resampling", forecast_hour);
                Ok(Resampling::NoTrackRecord { forecast_hour })
            }
        }
    }

    /// Polar vector components at a forecast hour of `track`
    pub fn decompose_at(
        &self,
        grid: &Grid,
        field: &VectorField,
        track: &Track,
        forecast_hour: i32,
    ) -> StormResult<Resampling<PolarVector>> {
        match track.center_at(forecast_hour) {
            Some(center) => Ok(Resampling::Resampled(self.decompose(grid, field, center)?)),
            None => {
                log::warn!("No track record at forecast hour {}, skipping resampling", forecast_hour);
                Ok(Resampling::NoTrackRecord { forecast_hour })
            }
        }
    }
}

impl Default for PolarResampler {
    fn default() -> Self {
        Self::new()
    }
}

/// `vr = u cosθ + v sinθ`, `vt = -u sinθ + v cosθ` over (level, radius, azimuth)
fn rotate(u: &Array3<f64>, v: &Array3<f64>, azimuths: &Array1<f64>) -> (Array3<f64>, Array3<f64>) {
    let mut radial = Array3::zeros(u.dim());
    let mut tangential = Array3::zeros(u.dim());
    for ((k, r, a), &uu) in u.indexed_iter() {
        let (sin, cos) = azimuths[a].sin_cos();
        let vv = v[[k, r, a]];
        radial[[k, r, a]] = uu * cos + vv * sin;
        tangential[[k, r, a]] = -uu * sin + vv * cos;
    }
    (radial, tangential)
}

/// NaN-aware mean over azimuth: (level, radius, azimuth) to (radius, level)
pub fn azimuthal_mean(polar: &ArrayView3<'_, f64>) -> Array2<f64> {
    nan_mean_axis(polar.view(), Axis(2)).reversed_axes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn regular_grid(center: GeoPoint, half_width: f64, step: f64) -> Grid {
        let n = (2.0 * half_width / step).round() as usize + 1;
        let lons: Vec<f64> = (0..n).map(|k| center.lon - half_width + k as f64 * step).collect();
        let lats: Vec<f64> = (0..n).map(|k| center.lat - half_width + k as f64 * step).collect();
        Grid::from_axes(&lons, &lats).unwrap()
    }

    #[test]
    fn test_mesh_axes() {
        let mesh = PolarMesh::new(&PolarParams::default()).unwrap();
        assert_eq!(mesh.radii().len(), 181);
        assert_eq!(mesh.radii()[0], 0.0);
        assert_abs_diff_eq!(mesh.radii()[180], 400.0, epsilon = 1e-9);
        assert_eq!(mesh.azimuths().len(), 72);
        assert_abs_diff_eq!(mesh.azimuths_deg()[1], 5.0, epsilon = 1e-9);
        assert!(mesh.azimuths()[71] < 2.0 * std::f64::consts::PI);
        assert_abs_diff_eq!(mesh.y()[[10, 18]], mesh.radii()[10], epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let bad = PolarParams {
            azimuth_steps: 0,
            ..Default::default()
        };
        assert!(PolarMesh::new(&bad).is_err());
        let bad = PolarParams {
            radial_resolution_km: -1.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = PolarParams {
            min_valid_corners: 5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_localize_across_conventions() {
        let resampler = PolarResampler::new();
        let grid = Grid::from_axes(&[299.0, 300.0, 301.0], &[19.0, 20.0, 21.0]).unwrap();
        let (x, y) = resampler.localize(&grid, GeoPoint::new(-60.0, 20.0));
        assert_abs_diff_eq!(x[[1, 1]], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(x[[1, 2]], 111.1 * 20f64.to_radians().cos(), epsilon = 1e-9);
        assert_abs_diff_eq!(y[[2, 1]], 111.1, epsilon = 1e-9);
    }

    #[test]
    fn test_center_value_and_uniform_field() {
        let center = GeoPoint::new(-60.0, 20.0);
        let grid = regular_grid(center, 1.0, 0.1);
        let resampler = PolarResampler::with_params(PolarParams {
            max_radius_km: 80.0,
            radial_resolution_km: 10.0,
            azimuth_steps: 16,
            ..Default::default()
        });
        let field = Array2::from_elem(grid.dim(), 3.5);
        let polar = resampler.resample(&grid, &field.view(), center).unwrap();
        assert_eq!(polar.dim(), (9, 16));
        for &v in polar.iter() {
            assert_abs_diff_eq!(v, 3.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_profile_of_2d_field() {
        let center = GeoPoint::new(-60.0, 20.0);
        let grid = regular_grid(center, 1.0, 0.1);
        let resampler = PolarResampler::with_params(PolarParams {
            max_radius_km: 80.0,
            radial_resolution_km: 10.0,
            azimuth_steps: 16,
            ..Default::default()
        });
        let (x, _) = resampler.localize(&grid, center);
        // odd in x, so every ring averages to the offset
        let field = x.mapv(|x| 7.0 + 0.01 * x);
        let profile = resampler.azimuthal_profile_2d(&grid, &field.view(), center).unwrap();
        assert_eq!(profile.len(), 9);
        for &v in profile.iter() {
            assert_abs_diff_eq!(v, 7.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_points_beyond_grid_are_nan() {
        let center = GeoPoint::new(-60.0, 20.0);
        let grid = regular_grid(center, 0.5, 0.1);
        let resampler = PolarResampler::with_params(PolarParams {
            max_radius_km: 150.0,
            radial_resolution_km: 10.0,
            azimuth_steps: 8,
            ..Default::default()
        });
        let field = Array2::from_elem(grid.dim(), 1.0);
        let polar = resampler.resample(&grid, &field.view(), center).unwrap();
        // 150 km is beyond the 0.5 degree half-width in every direction
        assert!(polar.row(15).iter().all(|v| v.is_nan()));
        assert!(polar.row(2).iter().all(|v| !v.is_nan()));

        let profile = azimuthal_mean(&polar.insert_axis(Axis(0)).view());
        assert_eq!(profile.dim(), (16, 1));
        assert!(profile[[15, 0]].is_nan());
        assert_abs_diff_eq!(profile[[0, 0]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shape_mismatch_fails_fast() {
        let center = GeoPoint::new(-60.0, 20.0);
        let grid = regular_grid(center, 0.5, 0.1);
        let resampler = PolarResampler::new();
        let field = Array2::<f64>::zeros((3, 3));
        assert!(matches!(
            resampler.resample(&grid, &field.view(), center),
            Err(StormError::ShapeMismatch(_))
        ));
        let field = Array2::<f64>::zeros(grid.dim());
        assert!(resampler
            .resample(&grid, &field.view(), GeoPoint::new(f64::NAN, 20.0))
            .is_err());
    }

    #[test]
    fn test_rotation_of_uniform_easterly() {
        let azimuths = Array1::from(vec![0.0, std::f64::consts::FRAC_PI_2]);
        let u = Array3::from_elem((1, 1, 2), 1.0);
        let v = Array3::zeros((1, 1, 2));
        let (radial, tangential) = rotate(&u, &v, &azimuths);
        // east of the center an eastward wind is outward
        assert_abs_diff_eq!(radial[[0, 0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(tangential[[0, 0, 0]], 0.0, epsilon = 1e-12);
        // north of the center it blows clockwise
        assert_abs_diff_eq!(radial[[0, 0, 1]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(tangential[[0, 0, 1]], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_resampling_outcome() {
        let no_data: Resampling<f64> = Resampling::NoTrackRecord { forecast_hour: 33 };
        assert!(no_data.is_no_data());
        assert!(no_data.map(|v| v * 2.0).resampled().is_none());
        assert_eq!(Resampling::Resampled(2.0).map(|v| v * 2.0).resampled(), Some(4.0));
    }
}
