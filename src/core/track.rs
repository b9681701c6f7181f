//! Forecast storm-center track.
//!
//! Parsing the track file (hemisphere letters, tenths of a degree) happens
//! before this point; a track here is already a list of decimal-degree
//! centers keyed by integer forecast hour.

use crate::types::{GeoPoint, StormError, StormResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One storm-center fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackFix {
    pub forecast_hour: i32,
    pub center: GeoPoint,
}

impl TrackFix {
    pub fn new(forecast_hour: i32, lon: f64, lat: f64) -> Self {
        Self {
            forecast_hour,
            center: GeoPoint::new(lon, lat),
        }
    }
}

/// Storm-center track, strictly ascending in forecast hour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "TrackData")]
pub struct Track {
    init_time: Option<DateTime<Utc>>,
    fixes: Vec<TrackFix>,
}

/// Serialized form of a track, checked through [`Track::new`] on load
#[derive(Deserialize)]
struct TrackData {
    #[serde(default)]
    init_time: Option<DateTime<Utc>>,
    fixes: Vec<TrackFix>,
}

impl TryFrom<TrackData> for Track {
    type Error = StormError;

    fn try_from(data: TrackData) -> StormResult<Self> {
        let mut track = Track::new(data.fixes)?;
        track.init_time = data.init_time;
        Ok(track)
    }
}

impl Track {
    /// Build a track from fixes already in time order
    pub fn new(fixes: Vec<TrackFix>) -> StormResult<Self> {
        if let Some(pair) = fixes
            .windows(2)
            .find(|pair| pair[1].forecast_hour <= pair[0].forecast_hour)
        {
            return Err(StormError::InvalidParameter(format!(
                "track fixes must be strictly ascending in forecast hour, found {} after {}",
                pair[1].forecast_hour, pair[0].forecast_hour
            )));
        }
        Ok(Self {
            init_time: None,
            fixes,
        })
    }

    /// Build a track from `(forecast_hour, lon, lat)` records in file order.
    ///
    /// Track files repeat a forecast hour once per wind-radii threshold; the
    /// last record for each hour wins.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = (i32, f64, f64)>,
    {
        let by_hour: BTreeMap<i32, TrackFix> = records
            .into_iter()
            .map(|(hour, lon, lat)| (hour, TrackFix::new(hour, lon, lat)))
            .collect();
        Self {
            init_time: None,
            fixes: by_hour.into_values().collect(),
        }
    }

    /// Attach the forecast cycle time
    pub fn with_init_time(mut self, init_time: DateTime<Utc>) -> Self {
        self.init_time = Some(init_time);
        self
    }

    pub fn init_time(&self) -> Option<DateTime<Utc>> {
        self.init_time
    }

    /// Wall-clock valid time of a forecast hour, when the cycle time is known
    pub fn valid_time(&self, forecast_hour: i32) -> Option<DateTime<Utc>> {
        self.init_time
            .map(|init| init + Duration::hours(i64::from(forecast_hour)))
    }

    pub fn fixes(&self) -> &[TrackFix] {
        &self.fixes
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    pub fn forecast_hours(&self) -> Vec<i32> {
        self.fixes.iter().map(|fix| fix.forecast_hour).collect()
    }

    /// Storm center at exactly `forecast_hour`.
    ///
    /// There is no interpolation between fixes and no extrapolation past the
    /// ends; a missing hour, or a fix with non-finite coordinates, is `None`.
    pub fn center_at(&self, forecast_hour: i32) -> Option<GeoPoint> {
        self.fixes
            .binary_search_by_key(&forecast_hour, |fix| fix.forecast_hour)
            .ok()
            .map(|k| self.fixes[k].center)
            .filter(|center| center.is_finite())
    }

    /// Only the fixes on 6-hourly synoptic times
    pub fn synoptic(&self) -> Track {
        Track {
            init_time: self.init_time,
            fixes: self
                .fixes
                .iter()
                .filter(|fix| fix.forecast_hour.rem_euclid(6) == 0)
                .copied()
                .collect(),
        }
    }
}
