// Engine settings - loaded from config/chart.{toml,json} and CHART__* environment variables
use crate::domain::chart_definition::{ChartDefinition, TimeResolutionSpec, ViewParametersChange};
use crate::domain::color_generator::DEFAULT_BASE_COLORS;
use crate::error::{ChartError, ChartResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct EngineSettings {
    pub chart_definition_path: PathBuf,
    #[serde(default)]
    pub fixtures_path: Option<PathBuf>,
    pub time_resolutions: Vec<TimeResolutionSpec>,
    #[serde(default)]
    pub now_timestamp_offset: i64,
    #[serde(default)]
    pub live_mode_lag: i64,
    #[serde(default = "default_base_colors")]
    pub base_colors: Vec<String>,
    #[serde(default)]
    pub view: ViewSettings,
}

/// View parameters applied on startup
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct ViewSettings {
    #[serde(default)]
    pub live: bool,
    pub time_resolution: Option<i64>,
    pub last_window_timestamp: Option<i64>,
}

impl ViewSettings {
    pub fn to_change(&self) -> ViewParametersChange {
        let change = ViewParametersChange::default()
            .live(self.live)
            .last_window_timestamp(self.last_window_timestamp);
        match self.time_resolution {
            Some(time_resolution) => change.time_resolution(time_resolution),
            None => change,
        }
    }
}

fn default_base_colors() -> Vec<String> {
    DEFAULT_BASE_COLORS.iter().map(|color| color.to_string()).collect()
}

/// `path` may omit the extension, e.g. `config/chart`
pub fn load_engine_settings(path: &str) -> ChartResult<EngineSettings> {
    build_settings(config::File::with_name(path))
}

fn build_settings<S>(source: S) -> ChartResult<EngineSettings>
where
    S: config::Source + Send + Sync + 'static,
{
    let settings = config::Config::builder()
        .add_source(source)
        .add_source(
            config::Environment::with_prefix("CHART")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_chart_definition(path: &Path) -> ChartResult<ChartDefinition> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| ChartError::Config(format!("cannot read {}: {}", path.display(), err)))?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = r##"
        chart_definition_path = "config/chart-definition.json"
        live_mode_lag = 5
        base_colors = ["#112233", "#445566"]

        [[time_resolutions]]
        time_resolution = 5
        points_count = 24
        update_interval = 5

        [[time_resolutions]]
        time_resolution = 60
        points_count = 60
        update_interval = 30

        [view]
        live = true
    "##;

    #[test]
    fn test_build_settings() {
        let settings = build_settings(config::File::from_str(SETTINGS, config::FileFormat::Toml)).unwrap();

        assert_eq!(settings.chart_definition_path, PathBuf::from("config/chart-definition.json"));
        assert_eq!(settings.fixtures_path, None);
        assert_eq!(settings.time_resolutions.len(), 2);
        assert_eq!(settings.time_resolutions[1].points_count, 60);
        assert_eq!(settings.time_resolutions[1].update_interval, 30.0);
        assert_eq!(settings.live_mode_lag, 5);
        assert_eq!(settings.now_timestamp_offset, 0);
        assert_eq!(settings.base_colors, vec!["#112233", "#445566"]);
        assert!(settings.view.live);
    }

    #[test]
    fn test_default_base_colors() {
        let settings = build_settings(config::File::from_str(
            r#"
                chart_definition_path = "chart.json"
                time_resolutions = []
            "#,
            config::FileFormat::Toml,
        ))
        .unwrap();
        assert_eq!(settings.base_colors.len(), DEFAULT_BASE_COLORS.len());
        assert_eq!(settings.view, ViewSettings::default());
    }

    #[test]
    fn test_view_settings_to_change() {
        let view = ViewSettings {
            live: false,
            time_resolution: Some(60),
            last_window_timestamp: Some(1200),
        };
        let change = view.to_change();
        assert_eq!(change.live, Some(false));
        assert_eq!(change.time_resolution, Some(60));
        assert_eq!(change.last_window_timestamp, Some(Some(1200)));
        assert_eq!(ViewSettings::default().to_change().time_resolution, None);
    }

    #[test]
    fn test_missing_settings_file() {
        let err = load_engine_settings("config/does-not-exist").unwrap_err();
        assert!(matches!(err, ChartError::Config(_)));
    }

    #[test]
    fn test_missing_chart_definition() {
        let err = load_chart_definition(Path::new("config/does-not-exist.json")).unwrap_err();
        assert!(matches!(err, ChartError::Config(_)));
    }
}
