// In-memory external data source - aggregates recorded measurements into windows
use crate::application::data_source::{ExternalDataSource, SeriesFetchParams};
use crate::domain::point::RawPoint;
use crate::domain::time_series::align_to_resolution;
use crate::error::{ChartError, ChartResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// How measurements falling into the same window are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricAggregation {
    Sum,
    Max,
    Min,
    First,
    Last,
    #[default]
    Avg,
}

impl MetricAggregation {
    /// `measurements` are ordered by timestamp and never empty
    fn aggregate(&self, measurements: &[Measurement]) -> Option<f64> {
        let values = measurements.iter().map(|measurement| measurement.value);
        match self {
            Self::Sum => Some(values.sum()),
            Self::Max => values.reduce(f64::max),
            Self::Min => values.reduce(f64::min),
            Self::First => measurements.first().map(|measurement| measurement.value),
            Self::Last => measurements.last().map(|measurement| measurement.value),
            Self::Avg => {
                let count = measurements.len();
                (count > 0).then(|| values.sum::<f64>() / count as f64)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Measurement {
    pub timestamp: i64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureTimeSeries {
    pub time_series_name: String,
    pub metric_id: String,
    #[serde(default)]
    pub aggregation: MetricAggregation,
    #[serde(default)]
    pub measurements: Vec<Measurement>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixtures {
    #[serde(default)]
    pub time_series: Vec<FixtureTimeSeries>,
    #[serde(default)]
    pub dynamic_series_configs: Vec<Value>,
    #[serde(default)]
    pub dynamic_series_group_configs: Vec<Value>,
}

pub fn load_fixtures(path: &Path) -> ChartResult<Fixtures> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| ChartError::Config(format!("cannot read {}: {}", path.display(), err)))?;
    Ok(serde_json::from_str(&content)?)
}

/// Serves series addressed by `{ timeSeriesName, metricId }` source parameters.
pub struct FixtureDataSource {
    time_series: HashMap<(String, String), FixtureTimeSeries>,
    dynamic_series_configs: Vec<Value>,
    dynamic_series_group_configs: Vec<Value>,
}

impl FixtureDataSource {
    pub fn new(fixtures: Fixtures) -> Self {
        let time_series = fixtures
            .time_series
            .into_iter()
            .map(|mut series| {
                series.measurements.sort_by_key(|measurement| measurement.timestamp);
                ((series.time_series_name.clone(), series.metric_id.clone()), series)
            })
            .collect();

        Self {
            time_series,
            dynamic_series_configs: fixtures.dynamic_series_configs,
            dynamic_series_group_configs: fixtures.dynamic_series_group_configs,
        }
    }

    fn find_time_series(&self, source_parameters: &Value) -> Option<&FixtureTimeSeries> {
        let time_series_name = source_parameters.get("timeSeriesName")?.as_str()?;
        let metric_id = source_parameters.get("metricId")?.as_str()?;
        self.time_series
            .get(&(time_series_name.to_string(), metric_id.to_string()))
    }
}

/// Newest `points_count` windows with at least one measurement, oldest first.
fn aggregate_windows(series: &FixtureTimeSeries, params: &SeriesFetchParams) -> Vec<RawPoint> {
    let resolution = params.time_resolution;
    let mut windows: BTreeMap<i64, Vec<Measurement>> = BTreeMap::new();
    for measurement in &series.measurements {
        let window = align_to_resolution(measurement.timestamp, resolution);
        if params.last_point_timestamp.is_some_and(|last| window > last) {
            continue;
        }
        windows.entry(window).or_default().push(*measurement);
    }

    let mut points: Vec<RawPoint> = windows
        .iter()
        .rev()
        .take(params.points_count)
        .filter_map(|(window, measurements)| {
            Some(RawPoint {
                timestamp: *window,
                value: series.aggregation.aggregate(measurements),
                first_measurement_timestamp: Some(measurements.first()?.timestamp),
                last_measurement_timestamp: Some(measurements.last()?.timestamp),
            })
        })
        .collect();
    points.reverse();
    points
}

#[async_trait]
impl ExternalDataSource for FixtureDataSource {
    async fn fetch_series(
        &self,
        params: SeriesFetchParams,
        source_parameters: &Value,
    ) -> anyhow::Result<Vec<RawPoint>> {
        if params.time_resolution <= 0 {
            anyhow::bail!("invalid time resolution {}", params.time_resolution);
        }
        // Both identifiers are required
        let Some(series) = self.find_time_series(source_parameters) else {
            tracing::debug!("No fixture series for {}", source_parameters);
            return Ok(Vec::new());
        };

        let points = aggregate_windows(series, &params);
        tracing::debug!(
            "Fixture series {}/{}: {} windows at resolution {}",
            series.time_series_name,
            series.metric_id,
            points.len(),
            params.time_resolution
        );
        Ok(points)
    }

    async fn fetch_dynamic_series_configs(&self, _source_parameters: &Value) -> anyhow::Result<Vec<Value>> {
        Ok(self.dynamic_series_configs.clone())
    }

    async fn fetch_dynamic_series_group_configs(&self, _source_parameters: &Value) -> anyhow::Result<Vec<Value>> {
        Ok(self.dynamic_series_group_configs.clone())
    }
}
