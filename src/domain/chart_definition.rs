// Chart definition - raw, data-independent description of a chart
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDefinition {
    #[serde(default)]
    pub title: Option<RawTitle>,
    #[serde(default)]
    pub y_axes: Vec<RawYAxis>,
    #[serde(default)]
    pub series_builders: Vec<RawBuilder>,
    #[serde(default)]
    pub series_group_builders: Vec<RawBuilder>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTitle {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawYAxis {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub min_interval: Option<f64>,
    #[serde(default)]
    pub unit_name: Option<String>,
    #[serde(default)]
    pub unit_options: Option<Value>,
    /// Transform function applied to an axis value before it is formatted
    #[serde(default)]
    pub value_provider: Option<Value>,
}

/// Series or series group builder. The recipe shape depends on the builder type.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBuilder {
    #[serde(alias = "builderName")]
    pub builder_type: String,
    #[serde(default)]
    pub builder_recipe: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeResolutionSpec {
    /// Seconds aggregated into a single point
    #[serde(alias = "time_resolution")]
    pub time_resolution: i64,
    /// Number of consecutive windows rendered at this resolution
    #[serde(alias = "points_count")]
    pub points_count: usize,
    /// Seconds between live updates
    #[serde(alias = "update_interval")]
    pub update_interval: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewParameters {
    pub live: bool,
    /// `None` means "the newest available window"
    pub last_window_timestamp: Option<i64>,
    pub time_resolution: i64,
}

/// Partial update of view parameters. Fields left as `None` are not changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewParametersChange {
    #[serde(default)]
    pub live: Option<bool>,
    #[serde(default, deserialize_with = "present_option")]
    pub last_window_timestamp: Option<Option<i64>>,
    #[serde(default)]
    pub time_resolution: Option<i64>,
}

impl ViewParametersChange {
    pub fn live(mut self, live: bool) -> Self {
        self.live = Some(live);
        self
    }

    pub fn last_window_timestamp(mut self, timestamp: Option<i64>) -> Self {
        self.last_window_timestamp = Some(timestamp);
        self
    }

    pub fn time_resolution(mut self, time_resolution: i64) -> Self {
        self.time_resolution = Some(time_resolution);
        self
    }
}

// Distinguishes an explicit `null` from a missing field.
fn present_option<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chart_definition() {
        let definition: ChartDefinition = serde_json::from_str(
            r#"{
                "title": { "content": "Upload" },
                "yAxes": [{ "id": "bytes", "name": "Bytes", "unitName": "bytes" }],
                "seriesBuilders": [{
                    "builderType": "static",
                    "builderRecipe": { "seriesTemplate": { "id": "s1" } }
                }],
                "seriesGroupBuilders": [{ "builderName": "dynamic" }]
            }"#,
        )
        .unwrap();

        assert_eq!(definition.title.unwrap().content, "Upload");
        assert_eq!(definition.y_axes[0].unit_name.as_deref(), Some("bytes"));
        assert_eq!(definition.series_builders[0].builder_type, "static");
        assert_eq!(definition.series_group_builders[0].builder_type, "dynamic");
        assert_eq!(definition.series_group_builders[0].builder_recipe, Value::Null);
    }

    #[test]
    fn test_view_parameters_change_distinguishes_null() {
        let change: ViewParametersChange =
            serde_json::from_str(r#"{ "live": true, "lastWindowTimestamp": null }"#).unwrap();
        assert_eq!(change.live, Some(true));
        assert_eq!(change.last_window_timestamp, Some(None));

        let change: ViewParametersChange = serde_json::from_str(r#"{ "timeResolution": 60 }"#).unwrap();
        assert_eq!(change.last_window_timestamp, None);
        assert_eq!(change, ViewParametersChange::default().time_resolution(60));
    }

    #[test]
    fn test_time_resolution_spec_accepts_snake_case() {
        let spec: TimeResolutionSpec =
            serde_json::from_str(r#"{ "time_resolution": 5, "points_count": 24, "update_interval": 5 }"#)
                .unwrap();
        assert_eq!(spec.time_resolution, 5);
        assert_eq!(spec.points_count, 24);
    }
}
