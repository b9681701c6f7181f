//! Storm-footprint masks: every grid cell within a great-circle radius of
//! the storm center.

use crate::core::geodesy::Sphere;
use crate::core::stats::{nan_count, nan_max, nan_mean, nan_min};
use crate::core::track::Track;
use crate::types::{GeoPoint, Grid, GridMask, LonConvention, StormError, StormResult};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Footprint masking parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FootprintParams {
    /// Search radius around the storm center (km)
    pub radius_km: f64,
    /// Common longitude convention for grid and center
    pub convention: LonConvention,
    pub sphere: Sphere,
}

impl Default for FootprintParams {
    fn default() -> Self {
        Self {
            radius_km: 500.0,
            convention: LonConvention::Signed180,
            sphere: Sphere::default(),
        }
    }
}

/// Summary of a field inside a footprint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FootprintStats {
    /// Valid (non-NaN) cells inside the footprint
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Cells within `radius_km` of `center`
#[derive(Debug, Clone)]
pub struct Footprint {
    mask: GridMask,
    center: GeoPoint,
    radius_km: f64,
}

impl Footprint {
    pub fn mask(&self) -> &GridMask {
        &self.mask
    }

    pub fn into_mask(self) -> GridMask {
        self.mask
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /// Number of cells inside
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|&&inside| inside).count()
    }

    /// Multiplicative form: 1 inside, NaN outside
    pub fn nan_mask(&self) -> Array2<f64> {
        self.mask.mapv(|inside| if inside { 1.0 } else { f64::NAN })
    }

    /// Copy of `field` with every cell outside the footprint set to NaN
    pub fn apply(&self, field: &ArrayView2<'_, f64>) -> StormResult<Array2<f64>> {
        self.check_shape(field.dim())?;
        Ok(Zip::from(field)
            .and(&self.mask)
            .map_collect(|&v, &inside| if inside { v } else { f64::NAN }))
    }

    /// Level-by-level form of [`Footprint::apply`] for (level, row, column) fields
    pub fn apply_levels(&self, field: &ArrayView3<'_, f64>) -> StormResult<Array3<f64>> {
        let (_, rows, cols) = field.dim();
        self.check_shape((rows, cols))?;
        let mut masked = field.to_owned();
        for mut level in masked.axis_iter_mut(Axis(0)) {
            Zip::from(&mut level).and(&self.mask).for_each(|v, &inside| {
                if !inside {
                    *v = f64::NAN;
                }
            });
        }
        Ok(masked)
    }

    /// NaN-aware min/max/mean of `field` over the footprint
    pub fn statistics(&self, field: &ArrayView2<'_, f64>) -> StormResult<FootprintStats> {
        let masked = self.apply(field)?;
        Ok(FootprintStats {
            count: nan_count(masked.iter().copied()),
            min: nan_min(masked.iter().copied()),
            max: nan_max(masked.iter().copied()),
            mean: nan_mean(masked.iter().copied()),
        })
    }

    fn check_shape(&self, dim: (usize, usize)) -> StormResult<()> {
        if dim != self.mask.dim() {
            return Err(StormError::ShapeMismatch(format!(
                "field shape {:?} does not match footprint shape {:?}",
                dim,
                self.mask.dim()
            )));
        }
        Ok(())
    }
}

/// Builds footprint masks
pub struct FootprintMasker {
    params: FootprintParams,
}

impl FootprintMasker {
    pub fn new() -> Self {
        Self {
            params: FootprintParams::default(),
        }
    }

    pub fn with_params(params: FootprintParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FootprintParams {
        &self.params
    }

    /// Express grid and center in the configured longitude convention
    pub fn normalize(&self, grid: &Grid, center: GeoPoint) -> (Grid, GeoPoint) {
        (
            grid.normalized(self.params.convention),
            center.normalized(self.params.convention),
        )
    }

    /// Footprint of radius `params.radius_km` around `center`.
    ///
    /// A cell is inside iff its great-circle distance to the center is
    /// `<= radius_km`. Cells with NaN coordinates and every cell for a NaN
    /// center are outside.
    pub fn mask(&self, grid: &Grid, center: GeoPoint) -> StormResult<Footprint> {
        let radius_km = self.params.radius_km;
        if !(radius_km >= 0.0) {
            return Err(StormError::InvalidParameter(format!(
                "footprint radius must be a non-negative number of km, got {}",
                radius_km
            )));
        }

        let (grid, center) = self.normalize(grid, center);
        let distance = self.params.sphere.distance_grid(&grid, center);

        let zip = Zip::from(&distance);
        #[cfg(feature = "parallel")]
        let mask = zip.par_map_collect(|&d| d <= radius_km);
        #[cfg(not(feature = "parallel"))]
        let mask = zip.map_collect(|&d| d <= radius_km);

        let footprint = Footprint {
            mask,
            center,
            radius_km,
        };
        log::debug!(
            "Footprint around {} ({:.0} km): {}/{} cells",
            center,
            radius_km,
            footprint.count(),
            grid.len()
        );
        Ok(footprint)
    }

    /// One footprint per track fix with a usable center
    pub fn for_track(&self, grid: &Grid, track: &Track) -> StormResult<Vec<(i32, Footprint)>> {
        log::info!(
            "Building {:.0} km footprints for {} track fixes",
            self.params.radius_km,
            track.len()
        );
        track
            .fixes()
            .iter()
            .filter(|fix| fix.center.is_finite())
            .map(|fix| Ok((fix.forecast_hour, self.mask(grid, fix.center)?)))
            .collect()
    }
}

impl Default for FootprintMasker {
    fn default() -> Self {
        Self::new()
    }
}

/// Boolean mask of cells within `radius_km` of `center` on the default
/// sphere, longitudes compared in [-180, 180)
pub fn mask_within_radius(grid: &Grid, center: GeoPoint, radius_km: f64) -> StormResult<GridMask> {
    let masker = FootprintMasker::with_params(FootprintParams {
        radius_km,
        ..Default::default()
    });
    Ok(masker.mask(grid, center)?.into_mask())
}
