// External data source contract - how the chart engine reaches measurement data
use crate::domain::point::RawPoint;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Which windows a series fetch should return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesFetchParams {
    pub time_resolution: i64,
    /// Timestamp of the newest window to return. `None` means "up to the newest point".
    pub last_point_timestamp: Option<i64>,
    /// Maximum number of points, counted back from `last_point_timestamp`
    pub points_count: usize,
}

/// Host-supplied provider of series data and dynamic series configs. Every
/// method has an empty default so a source implements only what it serves.
#[async_trait]
pub trait ExternalDataSource: Send + Sync {
    /// Raw points for a series described by `source_parameters`
    async fn fetch_series(
        &self,
        _params: SeriesFetchParams,
        _source_parameters: &Value,
    ) -> anyhow::Result<Vec<RawPoint>> {
        Ok(Vec::new())
    }

    /// One config object per dynamic series instance
    async fn fetch_dynamic_series_configs(&self, _source_parameters: &Value) -> anyhow::Result<Vec<Value>> {
        Ok(Vec::new())
    }

    /// One config object per dynamic series group instance
    async fn fetch_dynamic_series_group_configs(
        &self,
        _source_parameters: &Value,
    ) -> anyhow::Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

/// Data sources by the name chart definitions refer to them with
pub type ExternalDataSources = HashMap<String, Arc<dyn ExternalDataSource>>;
