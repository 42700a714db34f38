// Series function interpreter - evaluates series and series group templates
use crate::application::data_source::ExternalDataSources;
use crate::application::load_series::load_series;
use crate::domain::point::Point;
use crate::domain::series::{Series, SeriesGroup, SeriesType, normalize_color};
use crate::domain::template::{ObjectTemplate, RawFunction, Template};
use crate::domain::transform::{
    ReplaceEmptyStrategy, abs_value, multiply_values, number, replace_empty_values,
};
use crate::error::{ChartError, ChartResult};
use futures::future::{self, BoxFuture, FutureExt, try_join_all};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of a series function. Functions working on loaded series keep the
/// point metadata by returning `Points`.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionResult {
    Basic(Value),
    Points(Vec<Point>),
}

impl FunctionResult {
    /// Plain value; points collapse to an array of their values.
    pub fn into_value(self) -> Value {
        match self {
            FunctionResult::Basic(value) => value,
            FunctionResult::Points(points) => points_to_values(&points),
        }
    }
}

pub type SeriesFunction =
    for<'a> fn(&'a EvaluationContext, &'a RawFunction) -> BoxFuture<'a, ChartResult<FunctionResult>>;

pub type SeriesFunctionIndex = HashMap<&'static str, SeriesFunction>;

pub fn series_functions_index() -> SeriesFunctionIndex {
    HashMap::from([
        ("literal", literal as SeriesFunction),
        ("getDynamicSeriesConfig", get_dynamic_series_config),
        ("getDynamicSeriesGroupConfig", get_dynamic_series_group_config),
        ("loadSeries", load_series),
        ("abs", abs),
        ("multiply", multiply),
        ("rate", rate),
        ("timeDerivative", time_derivative),
        ("replaceEmpty", replace_empty),
    ])
}

/// Everything a series function may depend on. Cloned (cheaply) whenever a
/// dynamic builder narrows it down to a single config.
#[derive(Clone)]
pub struct EvaluationContext {
    pub external_data_sources: Arc<ExternalDataSources>,
    pub series_functions: Arc<SeriesFunctionIndex>,
    pub time_resolution: i64,
    pub points_count: usize,
    /// Newest window which should be loaded. `None` loads up to the newest point.
    pub last_point_timestamp: Option<i64>,
    /// Newest window for which any data can exist
    pub newest_point_timestamp: Option<i64>,
    pub dynamic_series_config: Option<Arc<Value>>,
    pub dynamic_series_group_config: Option<Arc<Value>>,
}

impl EvaluationContext {
    pub fn new(
        external_data_sources: Arc<ExternalDataSources>,
        time_resolution: i64,
        points_count: usize,
    ) -> Self {
        Self::with_series_functions(
            external_data_sources,
            Arc::new(series_functions_index()),
            time_resolution,
            points_count,
        )
    }

    /// Shares an already built function index
    pub fn with_series_functions(
        external_data_sources: Arc<ExternalDataSources>,
        series_functions: Arc<SeriesFunctionIndex>,
        time_resolution: i64,
        points_count: usize,
    ) -> Self {
        Self {
            external_data_sources,
            series_functions,
            time_resolution,
            points_count,
            last_point_timestamp: None,
            newest_point_timestamp: None,
            dynamic_series_config: None,
            dynamic_series_group_config: None,
        }
    }

    pub fn with_dynamic_series_config(&self, config: Value) -> Self {
        Self {
            dynamic_series_config: Some(Arc::new(config)),
            ..self.clone()
        }
    }

    pub fn with_dynamic_series_group_config(&self, config: Value) -> Self {
        Self {
            dynamic_series_group_config: Some(Arc::new(config)),
            ..self.clone()
        }
    }
}

pub fn evaluate_series_function<'a>(
    context: &'a EvaluationContext,
    template: &'a Template,
) -> BoxFuture<'a, ChartResult<FunctionResult>> {
    match template {
        Template::Literal(value) => future::ready(Ok(FunctionResult::Basic(value.clone()))).boxed(),
        Template::Function(function) => match context.series_functions.get(function.function_name.as_str()) {
            Some(callback) => callback(context, function),
            None => future::ready(Err(ChartError::UnknownFunction {
                function_name: function.function_name.clone(),
            }))
            .boxed(),
        },
    }
}

pub(crate) async fn evaluate_argument(
    context: &EvaluationContext,
    function: &RawFunction,
    name: &str,
) -> ChartResult<FunctionResult> {
    let template = function.argument(name);
    evaluate_series_function(context, &template).await
}

/// Evaluates all series fields concurrently. The template itself may be
/// missing any of them.
pub async fn evaluate_series(context: &EvaluationContext, template: &Value) -> ChartResult<Series> {
    let template = ObjectTemplate::from_value(template).unwrap_or_default();
    let [id, name, series_type, y_axis_id, color, group_id, data] =
        ["id", "name", "type", "yAxisId", "color", "groupId", "data"].map(|field| template.field(field));

    let (id, name, series_type, y_axis_id, color, group_id, data) = futures::try_join!(
        evaluate_series_function(context, &id),
        evaluate_series_function(context, &name),
        evaluate_series_function(context, &series_type),
        evaluate_series_function(context, &y_axis_id),
        evaluate_series_function(context, &color),
        evaluate_series_function(context, &group_id),
        evaluate_series_function(context, &data),
    )?;

    let series_type = series_type.into_value();
    let color = color.into_value();
    let group_id = group_id.into_value();

    Ok(Series {
        id: value_to_string(&id.into_value()),
        name: value_to_string(&name.into_value()),
        series_type: series_type
            .as_str()
            .and_then(SeriesType::from_name)
            .unwrap_or_default(),
        y_axis_id: value_to_string(&y_axis_id.into_value()),
        color: normalize_color(color.as_str()),
        group_id: Some(value_to_string(&group_id)).filter(|id| !id.is_empty()),
        data: match data {
            FunctionResult::Points(points) => points,
            FunctionResult::Basic(_) => Vec::new(),
        },
    })
}

pub fn evaluate_series_group<'a>(
    context: &'a EvaluationContext,
    template: &'a Value,
) -> BoxFuture<'a, ChartResult<SeriesGroup>> {
    async move {
        let template = ObjectTemplate::from_value(template).unwrap_or_default();
        let [id, name, stacked, show_sum, color, subgroups] =
            ["id", "name", "stacked", "showSum", "color", "subgroups"].map(|field| template.field(field));

        let (id, name, stacked, show_sum, color, subgroups) = futures::try_join!(
            evaluate_series_function(context, &id),
            evaluate_series_function(context, &name),
            evaluate_series_function(context, &stacked),
            evaluate_series_function(context, &show_sum),
            evaluate_series_function(context, &color),
            evaluate_series_function(context, &subgroups),
        )?;

        let color = color.into_value();
        let subgroups = match subgroups.into_value() {
            Value::Array(raw_subgroups) => {
                try_join_all(
                    raw_subgroups
                        .iter()
                        .map(|raw_subgroup| evaluate_series_group(context, raw_subgroup)),
                )
                .await?
            }
            _ => Vec::new(),
        };

        Ok(SeriesGroup {
            id: value_to_string(&id.into_value()),
            name: value_to_string(&name.into_value()),
            stacked: is_truthy(&stacked.into_value()),
            show_sum: is_truthy(&show_sum.into_value()),
            color: normalize_color(color.as_str()),
            subgroups,
        })
    }
    .boxed()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub(crate) fn points_to_values(points: &[Point]) -> Value {
    Value::Array(
        points
            .iter()
            .map(|point| point.value.map_or(Value::Null, number))
            .collect(),
    )
}

/// Copies `values` (an array matching `points` by position) into the points.
pub(crate) fn with_values(mut points: Vec<Point>, values: &Value) -> Vec<Point> {
    for (index, point) in points.iter_mut().enumerate() {
        point.value = values.get(index).and_then(Value::as_f64);
    }
    points
}

fn literal<'a>(
    _context: &'a EvaluationContext,
    function: &'a RawFunction,
) -> BoxFuture<'a, ChartResult<FunctionResult>> {
    let data = function.raw_argument("data").cloned().unwrap_or(Value::Null);
    future::ready(Ok(FunctionResult::Basic(data))).boxed()
}

async fn config_property(
    context: &EvaluationContext,
    function: &RawFunction,
    config: Option<&Arc<Value>>,
) -> ChartResult<FunctionResult> {
    let property_name = evaluate_argument(context, function, "propertyName")
        .await?
        .into_value();
    let property = match (config, property_name.as_str()) {
        (Some(config), Some(name)) => config.get(name).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    };
    Ok(FunctionResult::Basic(property))
}

fn get_dynamic_series_config<'a>(
    context: &'a EvaluationContext,
    function: &'a RawFunction,
) -> BoxFuture<'a, ChartResult<FunctionResult>> {
    config_property(context, function, context.dynamic_series_config.as_ref()).boxed()
}

fn get_dynamic_series_group_config<'a>(
    context: &'a EvaluationContext,
    function: &'a RawFunction,
) -> BoxFuture<'a, ChartResult<FunctionResult>> {
    config_property(context, function, context.dynamic_series_group_config.as_ref()).boxed()
}

fn abs<'a>(
    context: &'a EvaluationContext,
    function: &'a RawFunction,
) -> BoxFuture<'a, ChartResult<FunctionResult>> {
    async move {
        let input = evaluate_argument(context, function, "inputDataProvider").await?;
        Ok(match input {
            FunctionResult::Points(mut points) => {
                for point in &mut points {
                    point.value = point.value.map(f64::abs);
                }
                FunctionResult::Points(points)
            }
            FunctionResult::Basic(value) => FunctionResult::Basic(abs_value(&value)),
        })
    }
    .boxed()
}

fn multiply<'a>(
    context: &'a EvaluationContext,
    function: &'a RawFunction,
) -> BoxFuture<'a, ChartResult<FunctionResult>> {
    async move {
        let templates: Vec<Template> = match function.raw_argument("inputDataProviders") {
            Some(Value::Array(items)) => items.iter().map(Template::parse).collect(),
            _ => return Ok(FunctionResult::Basic(Value::Null)),
        };
        let inputs = try_join_all(
            templates
                .iter()
                .map(|template| evaluate_series_function(context, template)),
        )
        .await?;

        // The first points input gives the shape of the result
        let base_points = inputs.iter().find_map(|input| match input {
            FunctionResult::Points(points) => Some(points.clone()),
            FunctionResult::Basic(_) => None,
        });
        let values: Vec<Value> = inputs.into_iter().map(FunctionResult::into_value).collect();
        let product = multiply_values(&values);

        Ok(match base_points {
            Some(points) => FunctionResult::Points(with_values(points, &product)),
            None => FunctionResult::Basic(product),
        })
    }
    .boxed()
}

fn rate<'a>(
    context: &'a EvaluationContext,
    function: &'a RawFunction,
) -> BoxFuture<'a, ChartResult<FunctionResult>> {
    async move {
        if !function.has_argument("inputDataProvider") {
            return Ok(FunctionResult::Basic(Value::Null));
        }
        let (input, time_span) = futures::try_join!(
            evaluate_argument(context, function, "inputDataProvider"),
            evaluate_argument(context, function, "timeSpanProvider"),
        )?;
        let time_span = normalize_time_span(time_span);
        let resolution_rate = |value: &Value| {
            value
                .as_f64()
                .filter(|value| value.is_finite())
                .map_or(Value::Null, |value| {
                    number(value / context.time_resolution as f64 * time_span)
                })
        };

        Ok(match input {
            FunctionResult::Points(mut points) => {
                for point in &mut points {
                    let measurement_duration = point.measurement_duration() as f64;
                    point.value = point
                        .value
                        .filter(|value| value.is_finite())
                        .map(|value| value / measurement_duration * time_span);
                }
                FunctionResult::Points(points)
            }
            FunctionResult::Basic(Value::Array(items)) => {
                FunctionResult::Basic(Value::Array(items.iter().map(resolution_rate).collect()))
            }
            FunctionResult::Basic(value) => FunctionResult::Basic(resolution_rate(&value)),
        })
    }
    .boxed()
}

// Non-positive and non-numeric time spans fall back to one second.
fn normalize_time_span(time_span: FunctionResult) -> f64 {
    let candidate = match time_span {
        FunctionResult::Points(points) => points.last().and_then(|point| point.value),
        FunctionResult::Basic(value) => value.as_f64(),
    };
    candidate
        .filter(|span| span.is_finite() && *span > 0.0)
        .unwrap_or(1.0)
}

/// Change between consecutive values per `timeSpan` seconds. The input is
/// loaded with one additional older point, which is dropped from the result.
fn time_derivative<'a>(
    context: &'a EvaluationContext,
    function: &'a RawFunction,
) -> BoxFuture<'a, ChartResult<FunctionResult>> {
    async move {
        if !function.has_argument("inputDataProvider") {
            return Ok(FunctionResult::Basic(Value::Null));
        }
        let extended_context = EvaluationContext {
            points_count: context.points_count + 1,
            ..context.clone()
        };
        let (input, time_span) = futures::try_join!(
            evaluate_argument(&extended_context, function, "inputDataProvider"),
            evaluate_argument(context, function, "timeSpanProvider"),
        )?;
        let time_span = normalize_time_span(time_span);

        Ok(match input {
            FunctionResult::Points(points) => FunctionResult::Points(points_time_derivative(points, time_span)),
            FunctionResult::Basic(Value::Array(items)) => FunctionResult::Basic(values_time_derivative(
                &items,
                context.time_resolution,
                time_span,
            )),
            FunctionResult::Basic(_) => FunctionResult::Basic(Value::Null),
        })
    }
    .boxed()
}

fn points_time_derivative(points: Vec<Point>, time_span: f64) -> Vec<Point> {
    let mut previous_value = None;
    let mut result = Vec::with_capacity(points.len().saturating_sub(1));
    for (index, mut point) in points.into_iter().enumerate() {
        let value = point.value.filter(|value| value.is_finite());
        // The first real point grows from nothing
        let value_before = match point.value {
            None if point.fake && point.oldest => Some(0.0),
            _ => value,
        };
        if index > 0 {
            let measurement_duration = point.measurement_duration() as f64;
            point.value = value
                .zip(previous_value)
                .map(|(value, previous)| (value - previous) / measurement_duration * time_span);
            result.push(point);
        }
        previous_value = value_before;
    }
    result
}

fn values_time_derivative(values: &[Value], time_resolution: i64, time_span: f64) -> Value {
    let numbers: Vec<Option<f64>> = values
        .iter()
        .map(|value| value.as_f64().filter(|value| value.is_finite()))
        .collect();
    Value::Array(
        numbers
            .windows(2)
            .map(|pair| match (pair[0], pair[1]) {
                (Some(previous), Some(value)) => {
                    number((value - previous) / time_resolution as f64 * time_span)
                }
                _ => Value::Null,
            })
            .collect(),
    )
}

fn replace_empty<'a>(
    context: &'a EvaluationContext,
    function: &'a RawFunction,
) -> BoxFuture<'a, ChartResult<FunctionResult>> {
    async move {
        if !function.has_argument("inputDataProvider") || !function.has_argument("fallbackValueProvider") {
            return Ok(FunctionResult::Basic(Value::Null));
        }
        let (data, fallback, strategy) = futures::try_join!(
            evaluate_argument(context, function, "inputDataProvider"),
            evaluate_argument(context, function, "fallbackValueProvider"),
            evaluate_argument(context, function, "strategyProvider"),
        )?;
        let strategy = ReplaceEmptyStrategy::from_value(&strategy.into_value());

        let fallback = match (&data, fallback) {
            // Points are matched with fallback points by timestamp
            (FunctionResult::Points(points), FunctionResult::Points(fallback_points)) => Value::Array(
                points
                    .iter()
                    .map(|point| {
                        fallback_points
                            .iter()
                            .find(|fallback| fallback.timestamp == point.timestamp)
                            .and_then(|fallback| fallback.value)
                            .map_or(Value::Null, number)
                    })
                    .collect(),
            ),
            (_, fallback) => fallback.into_value(),
        };

        Ok(match data {
            FunctionResult::Points(points) => {
                let replaced = replace_empty_values(&points_to_values(&points), &fallback, strategy);
                if replaced.is_null() {
                    FunctionResult::Basic(Value::Null)
                } else {
                    FunctionResult::Points(with_values(points, &replaced))
                }
            }
            FunctionResult::Basic(value) => {
                FunctionResult::Basic(replace_empty_values(&value, &fallback, strategy))
            }
        })
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::point::PointParams;
    use serde_json::json;

    fn context() -> EvaluationContext {
        EvaluationContext::new(Arc::new(ExternalDataSources::new()), 60, 3)
    }

    fn points(values: &[Option<f64>]) -> Vec<Point> {
        values
            .iter()
            .enumerate()
            .map(|(index, value)| {
                Point::new(
                    index as i64 * 60,
                    *value,
                    PointParams {
                        point_duration: Some(60),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    async fn evaluate(context: &EvaluationContext, template: Value) -> ChartResult<FunctionResult> {
        evaluate_series_function(context, &Template::parse(&template)).await
    }

    #[tokio::test]
    async fn test_literal_values() {
        let context = context();
        assert_eq!(
            evaluate(&context, json!(5)).await.unwrap(),
            FunctionResult::Basic(json!(5))
        );
        assert_eq!(
            evaluate(&context, json!({ "functionName": "literal", "functionArguments": { "data": "x" } }))
                .await
                .unwrap(),
            FunctionResult::Basic(json!("x"))
        );
    }

    #[tokio::test]
    async fn test_unknown_function() {
        let err = evaluate(&context(), json!({ "functionName": "sqrt" })).await.unwrap_err();
        assert!(matches!(err, ChartError::UnknownFunction { function_name } if function_name == "sqrt"));
    }

    #[tokio::test]
    async fn test_dynamic_config_lookup() {
        let context = context().with_dynamic_series_config(json!({ "id": "a", "name": "Alpha" }));
        let template = json!({
            "functionName": "getDynamicSeriesConfig",
            "functionArguments": { "propertyName": "name" }
        });
        assert_eq!(
            evaluate(&context, template).await.unwrap(),
            FunctionResult::Basic(json!("Alpha"))
        );

        let group_template = json!({
            "functionName": "getDynamicSeriesGroupConfig",
            "functionArguments": { "propertyName": "name" }
        });
        assert_eq!(
            evaluate(&context, group_template).await.unwrap(),
            FunctionResult::Basic(Value::Null)
        );
    }

    #[tokio::test]
    async fn test_evaluate_series_fields() {
        let context = context().with_dynamic_series_config(json!({ "id": "disk-1" }));
        let series = evaluate_series(
            &context,
            &json!({
                "idProvider": {
                    "functionName": "getDynamicSeriesConfig",
                    "functionArguments": { "propertyName": "id" }
                },
                "name": "Disk",
                "type": "bar",
                "yAxisId": "bytes",
                "color": "not-a-color",
                "data": [1, 2, 3]
            }),
        )
        .await
        .unwrap();

        assert_eq!(series.id, "disk-1");
        assert_eq!(series.name, "Disk");
        assert_eq!(series.series_type, SeriesType::Bar);
        assert_eq!(series.y_axis_id, "bytes");
        assert_eq!(series.color, None);
        assert_eq!(series.group_id, None);
        assert!(series.data.is_empty());
    }

    #[tokio::test]
    async fn test_evaluate_series_group_with_subgroups() {
        let group = evaluate_series_group(
            &context(),
            &json!({
                "id": "root",
                "name": "Root",
                "stacked": true,
                "color": "#abc",
                "subgroups": [{ "id": "child", "showSum": 1 }]
            }),
        )
        .await
        .unwrap();

        assert_eq!(group.id, "root");
        assert!(group.stacked);
        assert!(!group.show_sum);
        assert_eq!(group.color.as_deref(), Some("#abc"));
        assert_eq!(group.subgroups.len(), 1);
        assert_eq!(group.subgroups[0].id, "child");
        assert!(group.subgroups[0].show_sum);
    }

    #[tokio::test]
    async fn test_abs_and_multiply_basic() {
        let context = context();
        let template = json!({
            "functionName": "multiply",
            "functionArguments": {
                "inputDataProviders": [
                    { "functionName": "abs", "functionArguments": { "inputDataProvider": [-1, 2] } },
                    3
                ]
            }
        });
        assert_eq!(
            evaluate(&context, template).await.unwrap(),
            FunctionResult::Basic(json!([3.0, 6.0]))
        );
    }

    #[test]
    fn test_normalize_time_span() {
        assert_eq!(normalize_time_span(FunctionResult::Basic(Value::Null)), 1.0);
        assert_eq!(normalize_time_span(FunctionResult::Basic(json!(-5))), 1.0);
        assert_eq!(normalize_time_span(FunctionResult::Basic(json!(60))), 60.0);
        assert_eq!(
            normalize_time_span(FunctionResult::Points(points(&[Some(1.0), Some(30.0)]))),
            30.0
        );
    }

    #[tokio::test]
    async fn test_rate_on_basic_values() {
        let context = context();
        let template = json!({
            "functionName": "rate",
            "functionArguments": { "inputDataProvider": [120, null], "timeSpanProvider": 2 }
        });
        assert_eq!(
            evaluate(&context, template).await.unwrap(),
            FunctionResult::Basic(json!([4.0, null]))
        );

        let missing = json!({ "functionName": "rate", "functionArguments": {} });
        assert_eq!(
            evaluate(&context, missing).await.unwrap(),
            FunctionResult::Basic(Value::Null)
        );
    }

    fn point(timestamp: i64, value: Option<f64>, params: PointParams) -> Point {
        Point::new(timestamp, value, params)
    }

    fn plain(timestamp: i64, value: Option<f64>) -> Point {
        point(timestamp, value, PointParams::default())
    }

    fn before_oldest(timestamp: i64) -> Point {
        point(
            timestamp,
            None,
            PointParams {
                oldest: true,
                fake: true,
                ..Default::default()
            },
        )
    }

    fn oldest(timestamp: i64, value: f64) -> Point {
        point(
            timestamp,
            Some(value),
            PointParams {
                oldest: true,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_points_time_derivative() {
        let input = || vec![plain(10, Some(100.0)), plain(15, Some(50.0)), plain(20, Some(150.0))];
        assert_eq!(
            points_time_derivative(input(), 1.0),
            vec![plain(15, Some(-10.0)), plain(20, Some(20.0))]
        );
        assert_eq!(
            points_time_derivative(input(), 60.0),
            vec![plain(15, Some(-600.0)), plain(20, Some(1200.0))]
        );

        let with_gaps = vec![
            plain(10, Some(100.0)),
            plain(15, None),
            plain(20, None),
            plain(25, Some(50.0)),
            plain(30, Some(100.0)),
        ];
        assert_eq!(
            points_time_derivative(with_gaps, 1.0),
            vec![plain(15, None), plain(20, None), plain(25, None), plain(30, Some(10.0))]
        );

        let day = |timestamp: i64, value: f64| {
            point(
                timestamp,
                Some(value),
                PointParams {
                    point_duration: Some(86_400),
                    ..Default::default()
                },
            )
        };
        assert_eq!(
            points_time_derivative(vec![day(10, 8_640_000.0), day(15, 2_160_000.0), day(20, 4_320_000.0)], 30.0),
            vec![day(15, -2250.0), day(20, 750.0)]
        );
    }

    #[test]
    fn test_points_time_derivative_at_edges() {
        let input = vec![oldest(10, 100.0), plain(15, Some(50.0)), plain(20, Some(150.0))];
        assert_eq!(
            points_time_derivative(input, 1.0),
            vec![plain(15, Some(-10.0)), plain(20, Some(20.0))]
        );

        let input = vec![before_oldest(5), oldest(10, 100.0), plain(15, Some(50.0)), plain(20, Some(150.0))];
        assert_eq!(
            points_time_derivative(input, 1.0),
            vec![oldest(10, 20.0), plain(15, Some(-10.0)), plain(20, Some(20.0))]
        );

        let input = vec![
            before_oldest(0),
            before_oldest(5),
            oldest(10, 100.0),
            plain(15, Some(50.0)),
            plain(20, Some(150.0)),
        ];
        assert_eq!(
            points_time_derivative(input, 1.0),
            vec![before_oldest(5), oldest(10, 20.0), plain(15, Some(-10.0)), plain(20, Some(20.0))]
        );

        let partial = |value: f64| {
            point(
                20,
                Some(value),
                PointParams {
                    last_measurement_timestamp: Some(21),
                    newest: true,
                    ..Default::default()
                },
            )
        };
        let input = vec![plain(10, Some(100.0)), plain(15, Some(50.0)), partial(150.0)];
        assert_eq!(
            points_time_derivative(input, 1.0),
            vec![plain(15, Some(-10.0)), partial(50.0)]
        );
    }

    #[tokio::test]
    async fn test_time_derivative_on_basic_values() {
        let context = EvaluationContext::new(Arc::new(ExternalDataSources::new()), 5, 3);
        let derivative = |input: Value, time_span: Value| {
            json!({
                "functionName": "timeDerivative",
                "functionArguments": { "inputDataProvider": input, "timeSpanProvider": time_span }
            })
        };

        for time_span in [Value::Null, json!(0), json!(-1), json!(1)] {
            assert_eq!(
                evaluate(&context, derivative(json!([100, 50, null]), time_span)).await.unwrap(),
                FunctionResult::Basic(json!([-10.0, null]))
            );
        }
        assert_eq!(
            evaluate(&context, derivative(json!([100, 50, 150]), json!(5))).await.unwrap(),
            FunctionResult::Basic(json!([-50.0, 100.0]))
        );
        assert_eq!(
            evaluate(&context, derivative(json!(100), Value::Null)).await.unwrap(),
            FunctionResult::Basic(Value::Null)
        );
        assert_eq!(
            evaluate(&context, derivative(Value::Null, Value::Null)).await.unwrap(),
            FunctionResult::Basic(Value::Null)
        );
    }

    #[tokio::test]
    async fn test_replace_empty_basic() {
        let context = context();
        let template = json!({
            "functionName": "replaceEmpty",
            "functionArguments": {
                "inputDataProvider": [null, 1, null],
                "fallbackValueProvider": 0,
                "strategyProvider": "usePrevious"
            }
        });
        assert_eq!(
            evaluate(&context, template).await.unwrap(),
            FunctionResult::Basic(json!([0, 1, 1]))
        );
    }

    #[test]
    fn test_points_values_round_trip() {
        let source = points(&[Some(1.5), None]);
        let values = points_to_values(&source);
        assert_eq!(values, json!([1.5, null]));
        let updated = with_values(source.clone(), &json!([null, 2]));
        assert_eq!(updated[0].value, None);
        assert_eq!(updated[1].value, Some(2.0));
        assert_eq!(updated[1].timestamp, source[1].timestamp);
    }
}
