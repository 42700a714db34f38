// Chart state - immutable snapshot published after every recomputation
use super::chart_definition::RawYAxis;
use super::series::{Series, SeriesGroup};
use super::time_series::{DAY, MINUTE};
use super::template::Template;
use super::transform::{TransformContext, evaluate_transform, number};
use super::unit_format::format_value_with_unit;
use chrono::DateTime;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Title {
    pub content: String,
    pub tip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YAxis {
    pub id: String,
    pub name: String,
    pub min_interval: Option<f64>,
    pub unit_name: Option<String>,
    pub unit_options: Option<Value>,
    #[serde(skip)]
    pub value_provider: Option<Template>,
}

impl YAxis {
    pub fn from_raw(raw: &RawYAxis) -> Self {
        Self {
            id: raw.id.clone(),
            name: raw.name.clone(),
            min_interval: raw.min_interval,
            unit_name: raw.unit_name.clone(),
            unit_options: raw.unit_options.clone(),
            value_provider: raw.value_provider.as_ref().map(Template::parse),
        }
    }

    /// Runs the axis value provider (if any) and formats the result with the
    /// axis unit. A provider which fails to evaluate is skipped.
    pub fn format_value(&self, value: f64) -> Option<String> {
        let transformed = match &self.value_provider {
            Some(provider) => {
                let context = TransformContext {
                    current_value: number(value),
                };
                evaluate_transform(&context, provider).unwrap_or_else(|_| number(value))
            }
            None => number(value),
        };

        match transformed {
            Value::String(formatted) => Some(formatted),
            other => format_value_with_unit(
                other.as_f64()?,
                self.unit_name.as_deref(),
                self.unit_options.as_ref(),
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XAxis {
    pub timestamps: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct StateInit {
    pub title: Title,
    pub y_axes: Vec<YAxis>,
    pub series_groups: Vec<SeriesGroup>,
    pub series: Vec<Series>,
    pub time_resolution: i64,
    pub windows_count: usize,
    pub first_window_timestamp: i64,
    pub last_window_timestamp: i64,
    pub newest_point_timestamp: Option<i64>,
    pub live: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub title: Title,
    pub y_axes: Vec<YAxis>,
    pub x_axis: XAxis,
    pub series_groups: Vec<SeriesGroup>,
    pub series: Vec<Series>,
    pub time_resolution: i64,
    pub windows_count: usize,
    pub first_window_timestamp: i64,
    pub last_window_timestamp: i64,
    pub newest_point_timestamp: Option<i64>,
    pub live: bool,
    /// Every non-empty series starts with an `oldest` point.
    pub has_reached_oldest: bool,
    /// Every non-empty series ends with a `newest` point.
    pub has_reached_newest: bool,
}

impl State {
    pub fn new(init: StateInit) -> Self {
        let has_reached_oldest = init
            .series
            .iter()
            .all(|series| series.first_point().is_none_or(|point| point.oldest));
        let has_reached_newest = init
            .series
            .iter()
            .all(|series| series.last_point().is_none_or(|point| point.newest));
        let timestamps = init
            .series
            .first()
            .map(|series| series.data.iter().map(|point| point.timestamp).collect())
            .unwrap_or_default();

        Self {
            title: init.title,
            y_axes: init.y_axes,
            x_axis: XAxis { timestamps },
            series_groups: init.series_groups,
            series: init.series,
            time_resolution: init.time_resolution,
            windows_count: init.windows_count,
            first_window_timestamp: init.first_window_timestamp,
            last_window_timestamp: init.last_window_timestamp,
            newest_point_timestamp: init.newest_point_timestamp,
            live: init.live,
            has_reached_oldest,
            has_reached_newest,
        }
    }

    pub fn series_by_id(&self, id: &str) -> Option<&Series> {
        self.series.iter().find(|series| series.id == id)
    }

    pub fn format_timestamp(&self, timestamp: i64) -> String {
        format_timestamp(timestamp, self.time_resolution)
    }
}

/// X axis label for a window start. The precision follows the resolution.
pub fn format_timestamp(timestamp: i64, time_resolution: i64) -> String {
    let Some(datetime) = DateTime::from_timestamp(timestamp, 0) else {
        return String::new();
    };
    let format = if time_resolution < MINUTE {
        "%-H:%M:%S\n%d/%m/%Y"
    } else if time_resolution % DAY != 0 {
        "%-H:%M\n%d/%m/%Y"
    } else {
        "%d/%m/%Y"
    };
    datetime.format(format).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::point::{Point, PointParams};
    use crate::domain::series::SeriesType;
    use serde_json::json;

    fn series(id: &str, points: Vec<Point>) -> Series {
        Series {
            id: id.to_string(),
            name: id.to_string(),
            series_type: SeriesType::Line,
            y_axis_id: "axis".to_string(),
            color: None,
            group_id: None,
            data: points,
        }
    }

    fn point(timestamp: i64, oldest: bool, newest: bool) -> Point {
        Point::new(
            timestamp,
            Some(1.0),
            PointParams {
                point_duration: Some(60),
                oldest,
                newest,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_edge_flags() {
        let state = State::new(StateInit {
            series: vec![
                series("a", vec![point(0, true, false), point(60, false, true)]),
                series("empty", vec![]),
            ],
            ..Default::default()
        });
        assert!(state.has_reached_oldest);
        assert!(state.has_reached_newest);
        assert_eq!(state.x_axis.timestamps, vec![0, 60]);

        let state = State::new(StateInit {
            series: vec![
                series("a", vec![point(0, true, false), point(60, false, true)]),
                series("b", vec![point(0, false, false), point(60, false, false)]),
            ],
            ..Default::default()
        });
        assert!(!state.has_reached_oldest);
        assert!(!state.has_reached_newest);
        assert!(state.series_by_id("b").is_some());
    }

    #[test]
    fn test_empty_state_reached_both_edges() {
        let state = State::new(StateInit::default());
        assert!(state.has_reached_oldest && state.has_reached_newest);
        assert!(state.x_axis.timestamps.is_empty());
    }

    #[test]
    fn test_y_axis_format_value() {
        let axis = YAxis::from_raw(&RawYAxis {
            id: "bytes".to_string(),
            name: "Bytes".to_string(),
            min_interval: None,
            unit_name: Some("bytes".to_string()),
            unit_options: None,
            value_provider: Some(json!({
                "functionName": "multiply",
                "functionArguments": {
                    "inputDataProviders": [{ "functionName": "currentValue" }, 2]
                }
            })),
        });
        assert_eq!(axis.format_value(512.0).as_deref(), Some("1 KiB"));
        assert_eq!(axis.format_value(f64::NAN), None);
    }

    #[test]
    fn test_format_timestamp() {
        // 2022-03-04 05:06:07 UTC
        let timestamp = 1_646_370_367;
        assert_eq!(format_timestamp(timestamp, 5), "5:06:07\n04/03/2022");
        assert_eq!(format_timestamp(timestamp, 3600), "5:06\n04/03/2022");
        assert_eq!(format_timestamp(timestamp, 7 * 86_400), "04/03/2022");
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let state = State::new(StateInit {
            time_resolution: 60,
            windows_count: 2,
            ..Default::default()
        });
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["timeResolution"], 60);
        assert_eq!(json["hasReachedOldest"], true);
        assert!(json["xAxis"]["timestamps"].is_array());
    }
}
