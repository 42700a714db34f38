// Series and series group builders - turn builder recipes into descriptors
use crate::application::evaluation::{EvaluationContext, evaluate_series, evaluate_series_group};
use crate::domain::series::{Series, SeriesGroup};
use crate::error::{ChartError, ChartResult};
use futures::future::{BoxFuture, FutureExt, try_join_all};
use serde_json::Value;
use std::collections::HashMap;

pub type SeriesBuilder =
    for<'a> fn(&'a EvaluationContext, &'a Value) -> BoxFuture<'a, ChartResult<Vec<Series>>>;

pub type SeriesGroupBuilder =
    for<'a> fn(&'a EvaluationContext, &'a Value) -> BoxFuture<'a, ChartResult<Vec<SeriesGroup>>>;

pub type SeriesBuilderIndex = HashMap<&'static str, SeriesBuilder>;
pub type SeriesGroupBuilderIndex = HashMap<&'static str, SeriesGroupBuilder>;

pub fn series_builders_index() -> SeriesBuilderIndex {
    HashMap::from([
        ("static", static_series as SeriesBuilder),
        ("dynamic", dynamic_series),
    ])
}

pub fn series_group_builders_index() -> SeriesGroupBuilderIndex {
    HashMap::from([
        ("static", static_series_group as SeriesGroupBuilder),
        ("dynamic", dynamic_series_group),
    ])
}

/// Looks up a builder by the type named in a chart definition.
pub fn find_builder<B: Copy>(index: &HashMap<&'static str, B>, builder_type: &str) -> ChartResult<B> {
    index
        .get(builder_type)
        .copied()
        .ok_or_else(|| ChartError::UnknownBuilder {
            builder_type: builder_type.to_string(),
        })
}

/// Recipe: `{ seriesTemplate }`. Produces a single series.
pub fn static_series<'a>(
    context: &'a EvaluationContext,
    recipe: &'a Value,
) -> BoxFuture<'a, ChartResult<Vec<Series>>> {
    async move {
        let Some(template) = recipe.get("seriesTemplate") else {
            return Ok(Vec::new());
        };
        Ok(vec![evaluate_series(context, template).await?])
    }
    .boxed()
}

/// Recipe: `{ dynamicSeriesConfigsSource, seriesTemplate }`. Produces one
/// series per fetched config, in config order.
pub fn dynamic_series<'a>(
    context: &'a EvaluationContext,
    recipe: &'a Value,
) -> BoxFuture<'a, ChartResult<Vec<Series>>> {
    async move {
        let (Some(configs_source), Some(template)) =
            (recipe.get("dynamicSeriesConfigsSource"), recipe.get("seriesTemplate"))
        else {
            return Ok(Vec::new());
        };

        let configs = fetch_dynamic_configs(context, configs_source, ConfigKind::Series).await?;
        let contexts: Vec<EvaluationContext> = configs
            .into_iter()
            .map(|config| context.with_dynamic_series_config(config))
            .collect();

        try_join_all(
            contexts
                .iter()
                .map(|instance_context| evaluate_series(instance_context, template)),
        )
        .await
    }
    .boxed()
}

/// Recipe: `{ seriesGroupTemplate }`. Produces a single series group.
pub fn static_series_group<'a>(
    context: &'a EvaluationContext,
    recipe: &'a Value,
) -> BoxFuture<'a, ChartResult<Vec<SeriesGroup>>> {
    async move {
        let Some(template) = recipe.get("seriesGroupTemplate") else {
            return Ok(Vec::new());
        };
        Ok(vec![evaluate_series_group(context, template).await?])
    }
    .boxed()
}

/// Recipe: `{ dynamicSeriesGroupConfigsSource, seriesGroupTemplate }`
pub fn dynamic_series_group<'a>(
    context: &'a EvaluationContext,
    recipe: &'a Value,
) -> BoxFuture<'a, ChartResult<Vec<SeriesGroup>>> {
    async move {
        let (Some(configs_source), Some(template)) = (
            recipe.get("dynamicSeriesGroupConfigsSource"),
            recipe.get("seriesGroupTemplate"),
        ) else {
            return Ok(Vec::new());
        };

        let configs = fetch_dynamic_configs(context, configs_source, ConfigKind::SeriesGroup).await?;
        let contexts: Vec<EvaluationContext> = configs
            .into_iter()
            .map(|config| context.with_dynamic_series_group_config(config))
            .collect();

        try_join_all(
            contexts
                .iter()
                .map(|instance_context| evaluate_series_group(instance_context, template)),
        )
        .await
    }
    .boxed()
}

#[derive(Debug, Clone, Copy)]
enum ConfigKind {
    Series,
    SeriesGroup,
}

/// `{ sourceType: "external", sourceSpec: { externalSourceName, externalSourceParameters } }`.
/// Anything that cannot be resolved yields no configs.
async fn fetch_dynamic_configs(
    context: &EvaluationContext,
    configs_source: &Value,
    kind: ConfigKind,
) -> ChartResult<Vec<Value>> {
    if configs_source.get("sourceType").and_then(Value::as_str) != Some("external") {
        return Ok(Vec::new());
    }
    let source_spec = configs_source.get("sourceSpec");
    let Some(source_name) = source_spec
        .and_then(|spec| spec.get("externalSourceName"))
        .and_then(Value::as_str)
    else {
        return Ok(Vec::new());
    };
    let Some(source) = context.external_data_sources.get(source_name) else {
        tracing::debug!("External data source '{}' is not registered", source_name);
        return Ok(Vec::new());
    };
    let source_parameters = source_spec
        .and_then(|spec| spec.get("externalSourceParameters"))
        .cloned()
        .unwrap_or(Value::Null);

    let configs = match kind {
        ConfigKind::Series => source.fetch_dynamic_series_configs(&source_parameters).await,
        ConfigKind::SeriesGroup => source.fetch_dynamic_series_group_configs(&source_parameters).await,
    }
    .map_err(|err| ChartError::data_source(source_name, err))?;

    tracing::debug!("Fetched {} dynamic {:?} configs from '{}'", configs.len(), kind, source_name);
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::data_source::{ExternalDataSource, ExternalDataSources, SeriesFetchParams};
    use crate::domain::point::RawPoint;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    /// Returns configs `a` and `b`. Series for `a` load slower than for `b`.
    struct ReversedTimingSource;

    #[async_trait]
    impl ExternalDataSource for ReversedTimingSource {
        async fn fetch_series(
            &self,
            _params: SeriesFetchParams,
            source_parameters: &Value,
        ) -> anyhow::Result<Vec<RawPoint>> {
            let delay = source_parameters["delay"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(Vec::new())
        }

        async fn fetch_dynamic_series_configs(&self, _source_parameters: &Value) -> anyhow::Result<Vec<Value>> {
            let config = |id: &str, delay: u64| {
                json!({
                    "id": id,
                    "sourceSpec": {
                        "externalSourceName": "custom",
                        "externalSourceParameters": { "delay": delay }
                    }
                })
            };
            Ok(vec![config("a", 50), config("b", 1)])
        }

        async fn fetch_dynamic_series_group_configs(&self, _source_parameters: &Value) -> anyhow::Result<Vec<Value>> {
            Ok(vec![json!({ "id": "g1" }), json!({ "id": "g1" })])
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl ExternalDataSource for BrokenSource {
        async fn fetch_dynamic_series_configs(&self, _source_parameters: &Value) -> anyhow::Result<Vec<Value>> {
            anyhow::bail!("configs unavailable")
        }
    }

    fn context() -> EvaluationContext {
        let mut sources = ExternalDataSources::new();
        sources.insert("custom".to_string(), Arc::new(ReversedTimingSource) as Arc<dyn ExternalDataSource>);
        sources.insert("broken".to_string(), Arc::new(BrokenSource) as Arc<dyn ExternalDataSource>);
        let mut context = EvaluationContext::new(Arc::new(sources), 60, 2);
        context.last_point_timestamp = Some(600);
        context
    }

    fn dynamic_recipe(source_name: &str) -> Value {
        json!({
            "dynamicSeriesConfigsSource": {
                "sourceType": "external",
                "sourceSpec": { "externalSourceName": source_name }
            },
            "seriesTemplate": {
                "idProvider": {
                    "functionName": "getDynamicSeriesConfig",
                    "functionArguments": { "propertyName": "id" }
                },
                "dataProvider": {
                    "functionName": "loadSeries",
                    "functionArguments": {
                        "sourceType": "external",
                        "sourceSpecProvider": {
                            "functionName": "getDynamicSeriesConfig",
                            "functionArguments": { "propertyName": "sourceSpec" }
                        }
                    }
                }
            }
        })
    }

    #[tokio::test]
    async fn test_static_series_builder() {
        let context = context();
        let series = static_series(&context, &json!({ "seriesTemplate": { "id": "s1", "name": "S1" } }))
            .await
            .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].id, "s1");

        assert!(static_series(&context, &json!({})).await.unwrap().is_empty());
        assert!(static_series(&context, &Value::Null).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dynamic_series_keeps_config_order() {
        let context = context();
        let series = dynamic_series(&context, &dynamic_recipe("custom")).await.unwrap();
        let ids: Vec<&str> = series.iter().map(|series| series.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(series.iter().all(|series| series.data.len() == 2));
    }

    #[tokio::test]
    async fn test_dynamic_series_degrades_to_empty() {
        let context = context();
        assert!(dynamic_series(&context, &dynamic_recipe("missing")).await.unwrap().is_empty());
        assert!(dynamic_series(&context, &json!({ "seriesTemplate": {} })).await.unwrap().is_empty());

        let mut recipe = dynamic_recipe("custom");
        recipe["dynamicSeriesConfigsSource"]["sourceType"] = json!("internal");
        assert!(dynamic_series(&context, &recipe).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dynamic_series_propagates_source_failure() {
        let context = context();
        let err = dynamic_series(&context, &dynamic_recipe("broken")).await.unwrap_err();
        assert!(matches!(err, ChartError::DataSource { ref source_name, .. } if source_name == "broken"));
    }

    #[tokio::test]
    async fn test_series_group_builders() {
        let context = context();
        let groups = static_series_group(&context, &json!({ "seriesGroupTemplate": { "id": "g", "stacked": true } }))
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].stacked);

        // Duplicate ids are not collapsed
        let groups = dynamic_series_group(
            &context,
            &json!({
                "dynamicSeriesGroupConfigsSource": {
                    "sourceType": "external",
                    "sourceSpec": { "externalSourceName": "custom" }
                },
                "seriesGroupTemplate": {
                    "idProvider": {
                        "functionName": "getDynamicSeriesGroupConfig",
                        "functionArguments": { "propertyName": "id" }
                    }
                }
            }),
        )
        .await
        .unwrap();
        let ids: Vec<&str> = groups.iter().map(|group| group.id.as_str()).collect();
        assert_eq!(ids, vec!["g1", "g1"]);
    }

    #[test]
    fn test_find_builder() {
        let index = series_builders_index();
        assert!(find_builder(&index, "static").is_ok());
        assert!(find_builder(&series_group_builders_index(), "dynamic").is_ok());
        let err = find_builder(&index, "magic").unwrap_err();
        assert!(matches!(err, ChartError::UnknownBuilder { builder_type } if builder_type == "magic"));
    }
}
