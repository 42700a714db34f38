// Main entry point - Loads settings, evaluates the chart and prints its state
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use time_series_chart::application::configuration::{Configuration, ConfigurationOptions};
use time_series_chart::application::data_source::ExternalDataSource;
use time_series_chart::infrastructure::config::{load_chart_definition, load_engine_settings};
use time_series_chart::infrastructure::fixture_source::{FixtureDataSource, Fixtures, load_fixtures};

/// Evaluates a chart definition against recorded fixture data.
#[derive(Parser, Debug)]
#[command(name = "time-series-chart")]
#[command(about = "Evaluate a time series chart definition and print its state")]
#[command(version)]
struct Args {
    /// Settings file, extension optional
    #[arg(short, long, default_value = "config/chart")]
    config: String,

    /// Time resolution in seconds (overrides settings)
    #[arg(long)]
    resolution: Option<i64>,

    /// Follow the newest data
    #[arg(long)]
    live: bool,

    /// Pin the newest visible window to this unix timestamp
    #[arg(long)]
    last_window: Option<i64>,

    /// Keep refreshing in live mode for this many seconds
    #[arg(long)]
    follow: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let settings = load_engine_settings(&args.config)?;
    let chart_definition = load_chart_definition(&settings.chart_definition_path)?;
    let fixtures = match &settings.fixtures_path {
        Some(path) => load_fixtures(path)?,
        None => Fixtures::default(),
    };

    let fixture_source: Arc<dyn ExternalDataSource> = Arc::new(FixtureDataSource::new(fixtures));
    let sources = HashMap::from([("fixtures".to_string(), fixture_source)]);

    let options = ConfigurationOptions::new(chart_definition, settings.time_resolutions.clone(), sources)
        .now_timestamp_offset(settings.now_timestamp_offset)
        .live_mode_lag(settings.live_mode_lag)
        .base_colors(settings.base_colors.clone());
    let configuration = Configuration::new(options)?;

    configuration.register_state_change_handler(|configuration| {
        if let Some(state) = configuration.current_state() {
            tracing::info!(
                "State changed: {} series, last window {}",
                state.series.len(),
                state.format_timestamp(state.last_window_timestamp).replace('\n', " ")
            );
        }
    });

    let mut change = settings.view.to_change();
    if args.live {
        change = change.live(true);
    }
    if let Some(resolution) = args.resolution {
        change = change.time_resolution(resolution);
    }
    if args.last_window.is_some() {
        change = change.last_window_timestamp(args.last_window);
    }

    let state = configuration.set_view_parameters(change).await?;
    println!("{}", serde_json::to_string_pretty(state.as_ref())?);

    if let Some(seconds) = args.follow {
        let updater = configuration.spawn_live_updater();
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        configuration.destroy();
        updater.await?;
    }

    Ok(())
}
