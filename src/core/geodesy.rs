//! Great-circle geometry on a spherical Earth.
//!
//! Distances are kilometres and angles are decimal degrees at every public
//! entry point; radians only appear inside the formulas.

use crate::types::{GeoPoint, Grid, StormError, StormResult};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// IUGG mean Earth radius (km)
pub const MEAN_EARTH_RADIUS_KM: f64 = 6371.0088;

/// WGS84 equatorial radius (km)
pub const WGS84_EQUATORIAL_RADIUS_KM: f64 = 6378.137;

/// Rounded equatorial radius used by the ocean footprint products (km)
pub const OCEAN_PRODUCT_RADIUS_KM: f64 = 6378.1;

/// Nautical miles to kilometres
pub const NM_TO_KM: f64 = 1.852;

/// WGS84 ellipsoid semi-axes (m)
const WGS84_A: f64 = 6_378_137.0;
const WGS84_B: f64 = 6_356_752.3142;

/// Below this sin(arc) two points are treated as coincident or antipodal
/// (under a metre apart, or under a metre from each other's antipode)
const DEGENERATE_ARC: f64 = 1e-7;

/// Spherical Earth model.
///
/// A sphere is an approximation: depending on the radius chosen, distances
/// differ by up to ~0.1% from one another and by up to ~0.5% from the WGS84
/// ellipsoid. One radius should be chosen per product and reused everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sphere {
    /// Radius in kilometres
    pub radius_km: f64,
}

impl Default for Sphere {
    fn default() -> Self {
        Self {
            radius_km: MEAN_EARTH_RADIUS_KM,
        }
    }
}

impl Sphere {
    pub fn new(radius_km: f64) -> Self {
        Self { radius_km }
    }

    /// Central angle between two points (radians), haversine form
    pub fn arc_length(&self, p1: GeoPoint, p2: GeoPoint) -> f64 {
        let lat1 = p1.lat.to_radians();
        let lat2 = p2.lat.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (p2.lon - p1.lon).to_radians();

        let a = (dlat * 0.5).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon * 0.5).sin().powi(2);
        // round-off can push `a` just outside [0, 1]; clamp keeps NaN as NaN
        let a = a.clamp(0.0, 1.0);
        2.0 * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Great-circle distance in kilometres
    pub fn distance_km(&self, p1: GeoPoint, p2: GeoPoint) -> f64 {
        self.radius_km * self.arc_length(p1, p2)
    }

    /// Distance (km) and initial bearing (degrees clockwise from north, [0, 360))
    /// from `p1` towards `p2`. Identical points give (0, 0).
    pub fn distance_bearing(&self, p1: GeoPoint, p2: GeoPoint) -> (f64, f64) {
        (self.distance_km(p1, p2), initial_bearing(p1, p2))
    }

    /// Point at `fraction` of the great-circle arc from `p1` to `p2`.
    ///
    /// `fraction` 0 and 1 return the end points unchanged. Coincident end
    /// points return `p1`. Antipodal end points have no unique great circle,
    /// so interior fractions return NaN coordinates.
    pub fn waypoint(&self, p1: GeoPoint, p2: GeoPoint, fraction: f64) -> GeoPoint {
        if fraction == 0.0 {
            return p1;
        }
        if fraction == 1.0 {
            return p2;
        }

        let d = self.arc_length(p1, p2);
        if !d.is_finite() || !fraction.is_finite() {
            return GeoPoint::new(f64::NAN, f64::NAN);
        }
        let sin_d = d.sin();
        if sin_d.abs() < DEGENERATE_ARC && d < std::f64::consts::FRAC_PI_2 {
            return p1;
        }
        if sin_d.abs() < DEGENERATE_ARC {
            log::debug!("Antipodal waypoint request {} -> {}, returning NaN", p1, p2);
            return GeoPoint::new(f64::NAN, f64::NAN);
        }

        let (lon1, lat1) = (p1.lon.to_radians(), p1.lat.to_radians());
        let (lon2, lat2) = (p2.lon.to_radians(), p2.lat.to_radians());

        let a = ((1.0 - fraction) * d).sin() / sin_d;
        let b = (fraction * d).sin() / sin_d;
        let x = a * lat1.cos() * lon1.cos() + b * lat2.cos() * lon2.cos();
        let y = a * lat1.cos() * lon1.sin() + b * lat2.cos() * lon2.sin();
        let z = a * lat1.sin() + b * lat2.sin();

        GeoPoint::new(
            y.atan2(x).to_degrees(),
            z.atan2((x * x + y * y).sqrt()).to_degrees(),
        )
    }

    /// `n` evenly spaced waypoints from `p1` to `p2`, both end points included
    pub fn waypoints(&self, p1: GeoPoint, p2: GeoPoint, n: usize) -> Vec<GeoPoint> {
        match n {
            0 => Vec::new(),
            1 => vec![p1],
            _ => (0..n)
                .map(|k| self.waypoint(p1, p2, k as f64 / (n - 1) as f64))
                .collect(),
        }
    }

    /// Point reached by travelling `distance_km` from `start` along the great
    /// circle with initial bearing `bearing_deg`.
    ///
    /// The returned longitude continues from `start.lon` and is not wrapped.
    pub fn destination(&self, start: GeoPoint, bearing_deg: f64, distance_km: f64) -> GeoPoint {
        let delta = distance_km / self.radius_km;
        let theta = bearing_deg.to_radians();
        let lat1 = start.lat.to_radians();

        let sin_lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).clamp(-1.0, 1.0);
        let lat2 = sin_lat2.asin();
        let dlon = (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * sin_lat2);

        GeoPoint::new(start.lon + dlon.to_degrees(), lat2.to_degrees())
    }

    /// Closed ring of points `radius_km` from `center`, one every `step_deg`
    /// of bearing. The last point repeats the first.
    pub fn circle(&self, center: GeoPoint, radius_km: f64, step_deg: f64) -> StormResult<Vec<GeoPoint>> {
        if !(step_deg > 0.0 && step_deg <= 360.0) {
            return Err(StormError::InvalidParameter(format!(
                "circle bearing step must be in (0, 360], got {}",
                step_deg
            )));
        }
        let steps = (360.0 / step_deg).ceil() as usize;
        let mut ring: Vec<GeoPoint> = (0..steps)
            .map(|k| self.destination(center, k as f64 * step_deg, radius_km))
            .collect();
        ring.push(ring[0]);
        Ok(ring)
    }

    /// Distance (km) from every grid node to `point`
    pub fn distance_grid(&self, grid: &Grid, point: GeoPoint) -> Array2<f64> {
        let zip = Zip::from(grid.lon()).and(grid.lat());
        let node_distance = |&lon: &f64, &lat: &f64| self.distance_km(GeoPoint::new(lon, lat), point);

        #[cfg(feature = "parallel")]
        {
            zip.par_map_collect(node_distance)
        }
        #[cfg(not(feature = "parallel"))]
        {
            zip.map_collect(node_distance)
        }
    }

    /// Distance (km) and initial bearing (degrees) from every grid node to `point`
    pub fn distance_bearing_grid(&self, grid: &Grid, point: GeoPoint) -> (Array2<f64>, Array2<f64>) {
        let distance = self.distance_grid(grid, point);
        let bearing = Zip::from(grid.lon())
            .and(grid.lat())
            .map_collect(|&lon, &lat| initial_bearing(GeoPoint::new(lon, lat), point));
        (distance, bearing)
    }
}

/// Initial great-circle bearing from `p1` to `p2` in degrees, [0, 360)
pub fn initial_bearing(p1: GeoPoint, p2: GeoPoint) -> f64 {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let dlon = (p2.lon - p1.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let bearing = y.atan2(x).to_degrees().rem_euclid(360.0);
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

/// Distance (km) and initial bearing (degrees) on the default sphere
pub fn distance_bearing(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> (f64, f64) {
    Sphere::default().distance_bearing(GeoPoint::new(lon1, lat1), GeoPoint::new(lon2, lat2))
}

/// Great-circle waypoint on the default sphere, as (lon, lat)
pub fn waypoint(lon1: f64, lat1: f64, lon2: f64, lat2: f64, fraction: f64) -> (f64, f64) {
    let p = Sphere::default().waypoint(GeoPoint::new(lon1, lat1), GeoPoint::new(lon2, lat2), fraction);
    (p.lon, p.lat)
}

/// Length of one degree of latitude at `lat` on the WGS84 ellipsoid (m)
pub fn meters_per_degree_lat(lat: f64) -> f64 {
    let lat = lat.to_radians();
    111_132.954 - 559.822 * (2.0 * lat).cos() + 1.175 * (4.0 * lat).cos()
}

/// Length of one degree of longitude at `lat` on the WGS84 ellipsoid (m)
pub fn meters_per_degree_lon(lat: f64) -> f64 {
    let e2 = (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_A * WGS84_A);
    let lat = lat.to_radians();
    std::f64::consts::PI * WGS84_A * lat.cos() / (180.0 * (1.0 - e2 * lat.sin().powi(2)).sqrt())
}

/// Northward distance (m) expressed as degrees of latitude at `lat`
pub fn meters_to_lat_degrees(meters: f64, lat: f64) -> f64 {
    meters / meters_per_degree_lat(lat)
}

/// Eastward distance (m) expressed as degrees of longitude at `lat`
pub fn meters_to_lon_degrees(meters: f64, lat: f64) -> f64 {
    meters / meters_per_degree_lon(lat)
}
