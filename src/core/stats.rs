//! NaN-aware reductions. NaN marks missing data and is skipped, never
//! counted as zero.

use ndarray::{Array, Array3, ArrayView, ArrayView3, Axis, Dimension, RemoveAxis};

/// Mean of the non-NaN values, NaN when there are none
pub fn nan_mean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Minimum of the non-NaN values, NaN when there are none
pub fn nan_min<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.min(v))))
        .unwrap_or(f64::NAN)
}

/// Maximum of the non-NaN values, NaN when there are none
pub fn nan_max<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
        .unwrap_or(f64::NAN)
}

/// Number of non-NaN values
pub fn nan_count<I: IntoIterator<Item = f64>>(values: I) -> usize {
    values.into_iter().filter(|v| !v.is_nan()).count()
}

/// NaN-aware mean along `axis`
pub fn nan_mean_axis<D>(array: ArrayView<'_, f64, D>, axis: Axis) -> Array<f64, D::Smaller>
where
    D: Dimension + RemoveAxis,
{
    array.map_axis(axis, |lane| nan_mean(lane.iter().copied()))
}

/// Subtract each level's domain mean (NaN-aware) from that level
pub fn level_anomaly(field: ArrayView3<'_, f64>) -> Array3<f64> {
    let mut anomaly = field.to_owned();
    for mut level in anomaly.axis_iter_mut(Axis(0)) {
        let mean = nan_mean(level.iter().copied());
        level.mapv_inplace(|v| v - mean);
    }
    anomaly
}
