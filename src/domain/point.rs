// Point domain model - one aggregated time window of a series
use super::time_series::SMALLEST_RESOLUTION;
use serde::{Deserialize, Serialize};

/// Point as delivered by an external data source, before it is fitted into
/// chart windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPoint {
    pub timestamp: i64,
    pub value: Option<f64>,
    #[serde(default)]
    pub first_measurement_timestamp: Option<i64>,
    #[serde(default)]
    pub last_measurement_timestamp: Option<i64>,
}

impl RawPoint {
    pub fn new(timestamp: i64, value: Option<f64>) -> Self {
        Self {
            timestamp,
            value,
            first_measurement_timestamp: None,
            last_measurement_timestamp: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PointParams {
    pub point_duration: Option<i64>,
    pub first_measurement_timestamp: Option<i64>,
    pub last_measurement_timestamp: Option<i64>,
    pub fake: bool,
    pub oldest: bool,
    pub newest: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    /// Beginning of the point window, in seconds.
    pub timestamp: i64,
    /// `None` means there were no measurements in this window.
    pub value: Option<f64>,
    /// Width of the window on the time axis. Same for all points of a chart.
    pub point_duration: i64,
    pub first_measurement_timestamp: Option<i64>,
    pub last_measurement_timestamp: Option<i64>,
    /// Generated on-the-fly to fill a gap, not backed by the data source.
    pub fake: bool,
    /// No meaningful points exist before this one.
    pub oldest: bool,
    /// No meaningful points exist after this one.
    pub newest: bool,
}

impl Point {
    pub fn new(timestamp: i64, value: Option<f64>, params: PointParams) -> Self {
        Self {
            timestamp,
            value,
            point_duration: params.point_duration.unwrap_or(SMALLEST_RESOLUTION),
            first_measurement_timestamp: params.first_measurement_timestamp,
            last_measurement_timestamp: params.last_measurement_timestamp,
            fake: params.fake,
            oldest: params.oldest,
            newest: params.newest,
        }
    }

    pub fn fake(timestamp: i64, point_duration: i64) -> Self {
        Self::new(
            timestamp,
            None,
            PointParams {
                point_duration: Some(point_duration),
                fake: true,
                ..Default::default()
            },
        )
    }

    pub fn from_raw(raw: &RawPoint, point_duration: i64) -> Self {
        Self::new(
            raw.timestamp,
            raw.value,
            PointParams {
                point_duration: Some(point_duration),
                first_measurement_timestamp: raw.first_measurement_timestamp,
                last_measurement_timestamp: raw.last_measurement_timestamp,
                ..Default::default()
            },
        )
    }

    /// Real time span (in seconds) the value was aggregated from. Differs from
    /// `point_duration` only for points at the oldest/newest edge of a series.
    pub fn measurement_duration(&self) -> i64 {
        let first_measurement = self.first_measurement_timestamp.unwrap_or(self.timestamp);
        let last_measurement = self
            .last_measurement_timestamp
            .unwrap_or(self.timestamp + self.point_duration - 1);

        let duration = match (self.oldest, self.newest) {
            (false, false) => self.point_duration,
            _ if self.fake => 1,
            (true, false) => self.timestamp + self.point_duration - first_measurement,
            (false, true) => last_measurement - self.timestamp + 1,
            (true, true) => last_measurement - first_measurement + 1,
        };

        duration.max(1)
    }
}
