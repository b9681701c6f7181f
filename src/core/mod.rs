//! Core storm-relative grid processing modules

pub mod geodesy;
pub mod grid_index;
pub mod footprint;
pub mod interp;
pub mod polar;
pub mod section;
pub mod stats;
pub mod track;

// Re-export main types
pub use geodesy::{distance_bearing, initial_bearing, waypoint, Sphere};
pub use grid_index::{
    nearest_index_binary, nearest_index_linear, DistanceMetric, GridIndex, GridIndexParams,
    NearestBatch, NearestNode, SearchStrategy,
};
pub use footprint::{mask_within_radius, Footprint, FootprintMasker, FootprintParams, FootprintStats};
pub use interp::{CellLocator, Stencil};
pub use polar::{azimuthal_mean, PolarMesh, PolarParams, PolarPlan, PolarResampler, PolarVector, Resampling};
pub use section::{center_index, cross_section, SectionAxis, SectionLine, SectionPath};
pub use stats::{level_anomaly, nan_max, nan_mean, nan_min};
pub use track::{Track, TrackFix};
