//! Python bindings (`_core` extension module)

use crate::core::footprint::mask_within_radius as footprint_mask;
use crate::core::geodesy::Sphere;
use crate::core::grid_index::{GridIndex, GridIndexParams, SearchStrategy};
use crate::core::polar::{PolarParams, PolarResampler};
use crate::types::{GeoPoint, Grid, StormError};
use numpy::{PyReadonlyArray2, PyReadonlyArray3, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

fn to_py_err(e: StormError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Convert numpy lon/lat arrays into a Grid
fn numpy_to_grid(lon: PyReadonlyArray2<f64>, lat: PyReadonlyArray2<f64>) -> PyResult<Grid> {
    Grid::new(lon.as_array().to_owned(), lat.as_array().to_owned()).map_err(to_py_err)
}

/// Great-circle distance (km) and initial bearing (degrees)
#[pyfunction]
#[pyo3(signature = (lon1, lat1, lon2, lat2, radius_km = None))]
fn distance_bearing(lon1: f64, lat1: f64, lon2: f64, lat2: f64, radius_km: Option<f64>) -> (f64, f64) {
    let sphere = radius_km.map(Sphere::new).unwrap_or_default();
    sphere.distance_bearing(GeoPoint::new(lon1, lat1), GeoPoint::new(lon2, lat2))
}

/// Nearest grid node (i, j, distance_km); `fast` selects the quadrant search
#[pyfunction]
#[pyo3(signature = (lon, lat, point_lon, point_lat, fast = false))]
fn nearest_index(
    lon: PyReadonlyArray2<f64>,
    lat: PyReadonlyArray2<f64>,
    point_lon: f64,
    point_lat: f64,
    fast: bool,
) -> PyResult<(usize, usize, f64)> {
    let grid = numpy_to_grid(lon, lat)?;
    let params = GridIndexParams {
        strategy: if fast { SearchStrategy::Fast } else { SearchStrategy::Exact },
        ..Default::default()
    };
    let node = GridIndex::with_params(&grid, params).nearest(GeoPoint::new(point_lon, point_lat));
    Ok((node.i, node.j, node.distance_km))
}

/// Boolean mask of grid cells within `radius_km` of the center
#[pyfunction]
fn mask_within_radius(
    py: Python,
    lon: PyReadonlyArray2<f64>,
    lat: PyReadonlyArray2<f64>,
    center_lon: f64,
    center_lat: f64,
    radius_km: f64,
) -> PyResult<PyObject> {
    let grid = numpy_to_grid(lon, lat)?;
    let mask = footprint_mask(&grid, GeoPoint::new(center_lon, center_lat), radius_km).map_err(to_py_err)?;
    Ok(mask.to_pyarray(py).into())
}

/// Azimuth-mean (radius, level) profile of a (level, row, column) field
#[pyfunction]
#[pyo3(signature = (lon, lat, field, center_lon, center_lat, max_radius_km = 400.0, radial_resolution_km = 2.22, azimuth_steps = 72))]
#[allow(clippy::too_many_arguments)]
fn azimuthal_mean(
    py: Python,
    lon: PyReadonlyArray2<f64>,
    lat: PyReadonlyArray2<f64>,
    field: PyReadonlyArray3<f64>,
    center_lon: f64,
    center_lat: f64,
    max_radius_km: f64,
    radial_resolution_km: f64,
    azimuth_steps: usize,
) -> PyResult<PyObject> {
    let grid = numpy_to_grid(lon, lat)?;
    let params = PolarParams {
        max_radius_km,
        radial_resolution_km,
        azimuth_steps,
        ..Default::default()
    };
    let resampler = PolarResampler::with_params(params);
    let mesh = resampler.mesh().map_err(to_py_err)?;
    let profile = resampler
        .azimuthal_profile(&grid, &field.as_array(), GeoPoint::new(center_lon, center_lat))
        .map_err(to_py_err)?;

    let result = PyDict::new(py);
    result.set_item("radius", mesh.radii().to_pyarray(py))?;
    result.set_item("profile", profile.to_pyarray(py))?;
    result.set_item("azimuth_steps", azimuth_steps)?;
    Ok(result.into())
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(distance_bearing, m)?)?;
    m.add_function(wrap_pyfunction!(nearest_index, m)?)?;
    m.add_function(wrap_pyfunction!(mask_within_radius, m)?)?;
    m.add_function(wrap_pyfunction!(azimuthal_mean, m)?)?;
    Ok(())
}
