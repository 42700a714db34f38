// loadSeries series function - fetches raw points and fits them into chart windows
use crate::application::data_source::SeriesFetchParams;
use crate::application::evaluation::{
    EvaluationContext, FunctionResult, evaluate_argument, evaluate_series_function,
};
use crate::domain::point::{Point, RawPoint};
use crate::domain::template::{ObjectTemplate, RawFunction, Template};
use crate::domain::time_series::{SMALLEST_RESOLUTION, align_to_resolution, is_aligned};
use crate::domain::transform::{ReplaceEmptyStrategy, number, replace_empty_values};
use crate::error::{ChartError, ChartResult};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashMap;

/// How windows without measurements get their values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplaceEmptyParameters {
    pub strategy: ReplaceEmptyStrategy,
    pub fallback_value: Value,
}

/// Range of windows a series is fitted into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitWindow {
    pub time_resolution: i64,
    pub points_count: usize,
    pub last_point_timestamp: Option<i64>,
    pub newest_point_timestamp: Option<i64>,
}

impl FitWindow {
    pub fn from_context(context: &EvaluationContext) -> Self {
        Self {
            time_resolution: context.time_resolution,
            points_count: context.points_count,
            last_point_timestamp: context.last_point_timestamp,
            newest_point_timestamp: context.newest_point_timestamp,
        }
    }
}

pub fn load_series<'a>(
    context: &'a EvaluationContext,
    function: &'a RawFunction,
) -> BoxFuture<'a, ChartResult<FunctionResult>> {
    async move {
        let empty = FunctionResult::Points(Vec::new());
        if context.time_resolution <= 0 || context.points_count == 0 {
            return Ok(empty);
        }

        let source_spec_argument = if function.has_argument("sourceSpecProvider") {
            "sourceSpecProvider"
        } else {
            "sourceParameters"
        };
        let (source_type, source_spec, replace_empty) = futures::try_join!(
            evaluate_argument(context, function, "sourceType"),
            evaluate_argument(context, function, source_spec_argument),
            evaluate_replace_empty_parameters(context, function),
        )?;

        if source_type.into_value().as_str() != Some("external") {
            return Ok(empty);
        }
        let source_spec = source_spec.into_value();
        let Some(source_name) = source_spec.get("externalSourceName").and_then(Value::as_str) else {
            return Ok(empty);
        };
        let Some(source) = context.external_data_sources.get(source_name) else {
            tracing::debug!("External data source '{}' is not registered", source_name);
            return Ok(empty);
        };

        let params = SeriesFetchParams {
            time_resolution: context.time_resolution,
            last_point_timestamp: context.last_point_timestamp,
            // One additional point tells whether the series has more data
            points_count: context.points_count + 1,
        };
        let source_parameters = source_spec
            .get("externalSourceParameters")
            .cloned()
            .unwrap_or(Value::Null);
        let raw_points = source
            .fetch_series(params, &source_parameters)
            .await
            .map_err(|err| ChartError::data_source(source_name, err))?;

        tracing::debug!(
            "Fetched {} raw points from '{}' at resolution {}",
            raw_points.len(),
            source_name,
            context.time_resolution
        );

        Ok(FunctionResult::Points(fit_points(
            raw_points,
            &FitWindow::from_context(context),
            &replace_empty,
        )))
    }
    .boxed()
}

async fn evaluate_replace_empty_parameters(
    context: &EvaluationContext,
    function: &RawFunction,
) -> ChartResult<ReplaceEmptyParameters> {
    let Some(raw) = function.raw_argument("replaceEmptyParametersProvider") else {
        return Ok(ReplaceEmptyParameters::default());
    };

    let (strategy, fallback_value) = match Template::parse(raw) {
        template @ Template::Function(_) => {
            let parameters = evaluate_series_function(context, &template).await?.into_value();
            (
                parameters.get("strategy").cloned().unwrap_or(Value::Null),
                parameters.get("fallbackValue").cloned().unwrap_or(Value::Null),
            )
        }
        Template::Literal(value) => {
            let template = ObjectTemplate::from_value(&value).unwrap_or_default();
            let (strategy, fallback_value) = (template.field("strategy"), template.field("fallbackValue"));
            let (strategy, fallback_value) = futures::try_join!(
                evaluate_series_function(context, &strategy),
                evaluate_series_function(context, &fallback_value),
            )?;
            (strategy.into_value(), fallback_value.into_value())
        }
    };

    Ok(ReplaceEmptyParameters {
        strategy: ReplaceEmptyStrategy::from_value(&strategy),
        fallback_value,
    })
}

/// Turns raw points into exactly `points_count` contiguous windows ending at
/// the last point timestamp. Missing windows become fake points. Returns
/// an empty series only when there is neither data nor a last point timestamp.
pub fn fit_points(
    mut raw_points: Vec<RawPoint>,
    window: &FitWindow,
    replace_empty: &ReplaceEmptyParameters,
) -> Vec<Point> {
    let resolution = window.time_resolution;
    if resolution <= 0 || window.points_count == 0 {
        return Vec::new();
    }

    raw_points.sort_by_key(|point| point.timestamp);
    if let Some(last) = window.last_point_timestamp {
        raw_points.retain(|point| point.timestamp <= last);
    }

    let is_last_point_newest = match window.last_point_timestamp {
        None => true,
        Some(last) => window.newest_point_timestamp.is_none_or(|newest| last >= newest),
    };

    // Fewer points than requested means the source has nothing older
    let globally_oldest_timestamp = match raw_points.first() {
        Some(oldest) if raw_points.len() < window.points_count + 1 => Some(oldest.timestamp),
        _ => None,
    };

    raw_points.retain(|point| is_aligned(point.timestamp, resolution));

    let last_window = match (window.last_point_timestamp, raw_points.last()) {
        (Some(last), _) => align_to_resolution(last, resolution),
        (None, Some(newest)) => newest.timestamp,
        (None, None) => return Vec::new(),
    };
    let first_window = last_window - (window.points_count as i64 - 1) * resolution;

    let by_timestamp: HashMap<i64, &RawPoint> =
        raw_points.iter().map(|point| (point.timestamp, point)).collect();
    let mut points: Vec<Point> = (0..window.points_count as i64)
        .map(|index| {
            let timestamp = first_window + index * resolution;
            match by_timestamp.get(&timestamp) {
                Some(raw) => Point::from_raw(raw, resolution),
                None => Point::fake(timestamp, resolution),
            }
        })
        .collect();

    // `usePrevious` continues from the newest value before the visible range
    let previous_value = raw_points
        .iter()
        .rev()
        .filter(|point| point.timestamp < first_window)
        .find_map(|point| point.value);
    apply_replace_empty(&mut points, previous_value, replace_empty);

    if raw_points.is_empty() {
        for point in &mut points {
            point.oldest = true;
            point.newest = is_last_point_newest;
        }
        return points;
    }

    if is_last_point_newest {
        for point in points.iter_mut().rev() {
            point.newest = true;
            if !point.fake {
                break;
            }
        }
    }

    if let Some(oldest_timestamp) = globally_oldest_timestamp {
        for point in points.iter_mut().take_while(|point| point.timestamp <= oldest_timestamp) {
            point.oldest = true;
        }
    }

    points
}

fn apply_replace_empty(points: &mut [Point], previous_value: Option<f64>, parameters: &ReplaceEmptyParameters) {
    let values: Vec<Value> = std::iter::once(previous_value)
        .chain(points.iter().map(|point| point.value))
        .map(|value| value.map_or(Value::Null, number))
        .collect();
    let replaced = replace_empty_values(&Value::Array(values), &parameters.fallback_value, parameters.strategy);
    for (index, point) in points.iter_mut().enumerate() {
        point.value = replaced.get(index + 1).and_then(Value::as_f64);
    }
}

/// Aligns all series to the same windows, ending at the newest last point
/// among them. Windows added after the end of a series are fake and inherit
/// its `newest` flag. An empty series becomes fully fake.
pub fn reconcile_points_timing(series_points: &mut [Vec<Point>]) {
    let Some(newest_timestamp) = series_points
        .iter()
        .filter_map(|points| points.last())
        .map(|point| point.timestamp)
        .max()
    else {
        return;
    };
    let points_count = series_points.iter().map(Vec::len).max().unwrap_or(0) as i64;
    let point_duration = series_points
        .iter()
        .find_map(|points| points.first())
        .map(|point| point.point_duration)
        .unwrap_or(SMALLEST_RESOLUTION);
    let first_timestamp = newest_timestamp - (points_count - 1) * point_duration;

    for points in series_points.iter_mut() {
        let original_last = points.last().map(|point| (point.timestamp, point.newest));
        let mut existing: HashMap<i64, Point> = points.drain(..).map(|point| (point.timestamp, point)).collect();
        *points = (0..points_count)
            .map(|index| first_timestamp + index * point_duration)
            .map(|timestamp| {
                existing.remove(&timestamp).unwrap_or_else(|| {
                    let mut fake = Point::fake(timestamp, point_duration);
                    match original_last {
                        None => {
                            fake.oldest = true;
                            fake.newest = true;
                        }
                        Some((last_timestamp, last_newest)) => {
                            fake.newest = last_newest && timestamp > last_timestamp;
                        }
                    }
                    fake
                })
            })
            .collect();
    }
}
