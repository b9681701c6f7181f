//! stormgeo: storm-relative geodesic grid search and polar resampling
//!
//! Great-circle geometry, nearest-node search on curvilinear lon/lat grids,
//! radius footprints around a moving storm center, and storm-centered polar
//! resampling with azimuthal averaging for tropical-cyclone model output.
//! Inputs are plain arrays; the crate performs no file I/O.

pub mod types;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types
pub use types::{
    GeoPoint, Grid, GridMask, LonConvention, ScalarField2, ScalarField3, StormError, StormResult,
    VectorField,
};

pub use crate::core::{
    FootprintMasker, GridIndex, PolarResampler, Resampling, SearchStrategy, Sphere, Track,
};
