// Chart configuration - view parameters, recomputation and state publication
use crate::application::builders::{
    SeriesBuilderIndex, SeriesGroupBuilderIndex, find_builder, series_builders_index,
    series_group_builders_index,
};
use crate::application::data_source::ExternalDataSources;
use crate::application::evaluation::{EvaluationContext, SeriesFunctionIndex, series_functions_index};
use crate::application::load_series::reconcile_points_timing;
use crate::domain::chart_definition::{
    ChartDefinition, TimeResolutionSpec, ViewParameters, ViewParametersChange,
};
use crate::domain::color_generator::{ColorGenerator, DEFAULT_BASE_COLORS};
use crate::domain::series::{Series, SeriesGroup};
use crate::domain::state::{State, StateInit, Title, YAxis};
use crate::domain::time_series::{SMALLEST_RESOLUTION, align_to_resolution};
use crate::error::{ChartError, ChartResult};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, try_join_all};
use serde::Serialize;
use std::future::IntoFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Current unix time in seconds
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub type StateChangeHandler = Arc<dyn Fn(&Configuration) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "message")]
pub enum ChartStatus {
    Idle,
    Computing,
    Ready,
    /// Latest recomputation failed. The previous state is still current.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ColorKey {
    Series(String),
    Group(String),
}

#[derive(Debug, Clone)]
struct Published {
    generation: u64,
    status: ChartStatus,
    state: Option<Arc<State>>,
}

pub struct ConfigurationOptions {
    pub chart_definition: ChartDefinition,
    pub time_resolution_specs: Vec<TimeResolutionSpec>,
    pub external_data_sources: ExternalDataSources,
    /// Subtracted from the clock when computing "now"
    pub now_timestamp_offset: i64,
    /// Additionally subtracted from "now" in live mode
    pub live_mode_lag: i64,
    pub base_colors: Vec<String>,
    pub clock: Clock,
}

impl ConfigurationOptions {
    pub fn new(
        chart_definition: ChartDefinition,
        time_resolution_specs: Vec<TimeResolutionSpec>,
        external_data_sources: ExternalDataSources,
    ) -> Self {
        Self {
            chart_definition,
            time_resolution_specs,
            external_data_sources,
            now_timestamp_offset: 0,
            live_mode_lag: 0,
            base_colors: DEFAULT_BASE_COLORS.iter().map(|color| color.to_string()).collect(),
            clock: Arc::new(|| Utc::now().timestamp()),
        }
    }

    pub fn now_timestamp_offset(mut self, offset: i64) -> Self {
        self.now_timestamp_offset = offset;
        self
    }

    pub fn live_mode_lag(mut self, lag: i64) -> Self {
        self.live_mode_lag = lag;
        self
    }

    pub fn base_colors(mut self, base_colors: Vec<String>) -> Self {
        self.base_colors = base_colors;
        self
    }

    pub fn clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

/// A pending recomputation. Awaiting it yields the published state, or
/// `ChartError::Superseded` when a newer recomputation was requested meanwhile.
pub struct Recomputation {
    generation: u64,
    handle: JoinHandle<ChartResult<Arc<State>>>,
}

impl Recomputation {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl IntoFuture for Recomputation {
    type Output = ChartResult<Arc<State>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.handle.await? }.boxed()
    }
}

/// Stateful chart model. Every view parameters change (and every live tick)
/// starts a recomputation; only the most recently started one may publish.
pub struct Configuration {
    chart_definition: ChartDefinition,
    time_resolution_specs: Vec<TimeResolutionSpec>,
    external_data_sources: Arc<ExternalDataSources>,
    series_functions: Arc<SeriesFunctionIndex>,
    series_builders: SeriesBuilderIndex,
    series_group_builders: SeriesGroupBuilderIndex,
    now_timestamp_offset: i64,
    live_mode_lag: i64,
    clock: Clock,
    view_parameters: Mutex<ViewParameters>,
    // Globally newest point, discovered in non-live mode
    newest_point_timestamp: Mutex<Option<i64>>,
    colors: Mutex<ColorGenerator<ColorKey>>,
    requested_generation: AtomicU64,
    published: watch::Sender<Published>,
    handlers: Mutex<Vec<(HandlerId, StateChangeHandler)>>,
    next_handler_id: AtomicU64,
    destroyed: watch::Sender<bool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Configuration {
    pub fn new(options: ConfigurationOptions) -> ChartResult<Arc<Self>> {
        let time_resolution_specs = options.time_resolution_specs;
        if time_resolution_specs.is_empty() {
            return Err(ChartError::Config(
                "at least one time resolution spec is required".to_string(),
            ));
        }
        if let Some(spec) = time_resolution_specs
            .iter()
            .find(|spec| spec.time_resolution <= 0 || spec.points_count == 0)
        {
            return Err(ChartError::Config(format!(
                "invalid time resolution spec: resolution {}s, {} points",
                spec.time_resolution, spec.points_count
            )));
        }

        let colors = ColorGenerator::new(&options.base_colors)?;
        let view_parameters = ViewParameters {
            live: false,
            last_window_timestamp: None,
            time_resolution: time_resolution_specs[0].time_resolution,
        };
        let (published, _) = watch::channel(Published {
            generation: 0,
            status: ChartStatus::Idle,
            state: None,
        });
        let (destroyed, _) = watch::channel(false);

        Ok(Arc::new(Self {
            chart_definition: options.chart_definition,
            time_resolution_specs,
            external_data_sources: Arc::new(options.external_data_sources),
            series_functions: Arc::new(series_functions_index()),
            series_builders: series_builders_index(),
            series_group_builders: series_group_builders_index(),
            now_timestamp_offset: options.now_timestamp_offset,
            live_mode_lag: options.live_mode_lag,
            clock: options.clock,
            view_parameters: Mutex::new(view_parameters),
            newest_point_timestamp: Mutex::new(None),
            colors: Mutex::new(colors),
            requested_generation: AtomicU64::new(0),
            published,
            handlers: Mutex::new(Vec::new()),
            next_handler_id: AtomicU64::new(1),
            destroyed,
        }))
    }

    pub fn chart_definition(&self) -> &ChartDefinition {
        &self.chart_definition
    }

    /// In configured order. The first entry is the fallback resolution.
    pub fn time_resolution_specs(&self) -> &[TimeResolutionSpec] {
        &self.time_resolution_specs
    }

    pub fn get_view_parameters(&self) -> ViewParameters {
        *lock(&self.view_parameters)
    }

    /// Merges `change` into the view parameters and starts a recomputation.
    /// Unknown resolutions fall back to the first configured one and explicit
    /// timestamps are rounded down to the resolution.
    pub fn set_view_parameters(self: &Arc<Self>, change: ViewParametersChange) -> Recomputation {
        {
            let mut view = lock(&self.view_parameters);
            if let Some(live) = change.live {
                view.live = live;
                if live {
                    *lock(&self.newest_point_timestamp) = None;
                }
            }
            if let Some(time_resolution) = change.time_resolution {
                view.time_resolution = self.resolve_time_resolution(time_resolution).time_resolution;
            }
            if let Some(last_window_timestamp) = change.last_window_timestamp {
                let normalized = self.normalize_last_window_timestamp(&view, last_window_timestamp);
                view.last_window_timestamp = normalized;
            }
            tracing::debug!(
                "View parameters: live={}, resolution={}s, last window={:?}",
                view.live,
                view.time_resolution,
                view.last_window_timestamp
            );
        }
        self.start_recomputation()
    }

    /// Recomputes the state with unchanged view parameters.
    pub fn refresh(self: &Arc<Self>) -> Recomputation {
        self.start_recomputation()
    }

    /// State of the most recently requested recomputation. Waits until that
    /// recomputation (or a newer one) finishes. `None` until the first state
    /// is computed successfully.
    pub async fn get_state(self: &Arc<Self>) -> Option<Arc<State>> {
        let mut requested = self.requested_generation.load(Ordering::SeqCst);
        if requested == 0 {
            requested = self.refresh().generation();
        }
        let mut receiver = self.published.subscribe();
        let published = receiver
            .wait_for(|published| published.generation >= requested)
            .await;
        match published {
            Ok(published) => published.state.clone(),
            Err(_) => None,
        }
    }

    /// Last published state, without waiting
    pub fn current_state(&self) -> Option<Arc<State>> {
        self.published.borrow().state.clone()
    }

    pub fn status(&self) -> ChartStatus {
        self.published.borrow().status.clone()
    }

    pub fn register_state_change_handler(
        &self,
        handler: impl Fn(&Configuration) + Send + Sync + 'static,
    ) -> HandlerId {
        let id = HandlerId(self.next_handler_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.handlers).push((id, Arc::new(handler)));
        id
    }

    /// Returns `false` when the handler was not registered
    pub fn deregister_state_change_handler(&self, id: HandlerId) -> bool {
        let mut handlers = lock(&self.handlers);
        let registered_count = handlers.len();
        handlers.retain(|(registered_id, _)| *registered_id != id);
        handlers.len() != registered_count
    }

    /// Starts a task refreshing the state every `update_interval` seconds of
    /// the active resolution while in live mode. Ends on `destroy`.
    pub fn spawn_live_updater(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let mut destroyed = self.destroyed.subscribe();

        tokio::spawn(async move {
            loop {
                let Some(interval) = weak.upgrade().map(|configuration| configuration.update_interval()) else {
                    break;
                };
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = destroyed.wait_for(|destroyed| *destroyed) => break,
                }

                let Some(configuration) = weak.upgrade() else {
                    break;
                };
                if !configuration.get_view_parameters().live {
                    continue;
                }
                match configuration.refresh().await {
                    Ok(state) => tracing::debug!(
                        "Live update published window ending at {}",
                        state.last_window_timestamp
                    ),
                    Err(ChartError::Superseded { generation }) => {
                        tracing::debug!("Live update {} superseded", generation)
                    }
                    Err(err) => tracing::warn!("Live update failed: {}", err),
                }
            }
            tracing::debug!("Live updater stopped");
        })
    }

    /// Drops all handlers and stops the live updater.
    pub fn destroy(&self) {
        lock(&self.handlers).clear();
        self.destroyed.send_replace(true);
    }

    fn update_interval(&self) -> Duration {
        let seconds = self
            .resolve_time_resolution(self.get_view_parameters().time_resolution)
            .update_interval;
        update_interval_duration(seconds)
    }

    fn resolve_time_resolution(&self, time_resolution: i64) -> TimeResolutionSpec {
        self.time_resolution_specs
            .iter()
            .find(|spec| spec.time_resolution == time_resolution)
            .unwrap_or(&self.time_resolution_specs[0])
            .to_owned()
    }

    fn now_timestamp(&self, live: bool) -> i64 {
        let lag = if live { self.live_mode_lag } else { 0 };
        (self.clock)() - self.now_timestamp_offset - lag
    }

    fn normalize_last_window_timestamp(&self, view: &ViewParameters, requested: Option<i64>) -> Option<i64> {
        let requested = requested.map(|timestamp| align_to_resolution(timestamp, view.time_resolution));
        if view.live {
            // Anything at or after the current window means "follow now"
            let now_window = align_to_resolution(self.now_timestamp(true), view.time_resolution);
            requested.filter(|timestamp| *timestamp < now_window)
        } else {
            match (requested, *lock(&self.newest_point_timestamp)) {
                (Some(timestamp), Some(newest)) => Some(timestamp.min(newest)),
                (None, Some(newest)) => Some(newest),
                (requested, None) => requested,
            }
        }
    }

    fn start_recomputation(self: &Arc<Self>) -> Recomputation {
        let generation = self.requested_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let view = self.get_view_parameters();
        self.published
            .send_modify(|published| published.status = ChartStatus::Computing);

        let computing = Arc::clone(self);
        let compute = tokio::spawn(async move { computing.compute_state(view).await });
        let configuration = Arc::clone(self);
        let handle = tokio::spawn(async move {
            // A panicking computation still has to settle its generation
            let result = compute.await.unwrap_or_else(|err| {
                tracing::error!("Recomputation {} aborted: {}", generation, err);
                Err(err.into())
            });
            configuration.publish(generation, result)
        });
        Recomputation { generation, handle }
    }

    fn evaluation_context(&self, time_resolution: i64, points_count: usize) -> EvaluationContext {
        EvaluationContext::with_series_functions(
            Arc::clone(&self.external_data_sources),
            Arc::clone(&self.series_functions),
            time_resolution,
            points_count,
        )
    }

    async fn compute_state(&self, view: ViewParameters) -> ChartResult<State> {
        let spec = self.resolve_time_resolution(view.time_resolution);
        let time_resolution = spec.time_resolution;
        let now = self.now_timestamp(view.live);
        let newest_point_timestamp = if view.live {
            now
        } else {
            self.acquire_newest_point_timestamp(now).await?
        };

        let last_point_timestamp = match view.last_window_timestamp {
            Some(pinned) => pinned.min(newest_point_timestamp),
            None => newest_point_timestamp,
        };
        let last_window_timestamp = align_to_resolution(last_point_timestamp, time_resolution);
        let first_window_timestamp =
            last_window_timestamp - (spec.points_count as i64 - 1) * time_resolution;

        let mut context = self.evaluation_context(time_resolution, spec.points_count);
        context.last_point_timestamp = Some(last_point_timestamp);
        context.newest_point_timestamp = Some(newest_point_timestamp);

        let (mut series, mut series_groups) =
            futures::try_join!(self.build_series(&context), self.build_series_groups(&context))?;

        if !view.live {
            flag_newest_points(&mut series, newest_point_timestamp);
        }
        self.assign_colors(&mut series, &mut series_groups);

        Ok(State::new(StateInit {
            title: self.title(),
            y_axes: self.chart_definition.y_axes.iter().map(YAxis::from_raw).collect(),
            series_groups,
            series,
            time_resolution,
            windows_count: spec.points_count,
            first_window_timestamp,
            last_window_timestamp,
            newest_point_timestamp: Some(newest_point_timestamp),
            live: view.live,
        }))
    }

    /// Runs a one-point evaluation at the smallest resolution to find the
    /// newest window with data. Cached until live mode is turned on.
    async fn acquire_newest_point_timestamp(&self, now: i64) -> ChartResult<i64> {
        let cached = *lock(&self.newest_point_timestamp);
        if let Some(newest) = cached {
            return Ok(newest);
        }

        let smallest_resolution = self
            .time_resolution_specs
            .iter()
            .map(|spec| spec.time_resolution)
            .min()
            .unwrap_or(SMALLEST_RESOLUTION);
        let context = self.evaluation_context(smallest_resolution, 1);
        let series = self.build_series(&context).await?;
        let newest = find_globally_newest_timestamp(&series, smallest_resolution, &self.time_resolution_specs)
            .unwrap_or(now);

        tracing::debug!("Newest point timestamp: {}", newest);
        *lock(&self.newest_point_timestamp) = Some(newest);
        Ok(newest)
    }

    async fn build_series(&self, context: &EvaluationContext) -> ChartResult<Vec<Series>> {
        let builders = self
            .chart_definition
            .series_builders
            .iter()
            .map(|raw| Ok((find_builder(&self.series_builders, &raw.builder_type)?, &raw.builder_recipe)))
            .collect::<ChartResult<Vec<_>>>()?;

        let series_per_builder =
            try_join_all(builders.into_iter().map(|(builder, recipe)| builder(context, recipe))).await?;
        let mut series: Vec<Series> = series_per_builder.into_iter().flatten().collect();

        let mut data: Vec<_> = series
            .iter_mut()
            .map(|series| std::mem::take(&mut series.data))
            .collect();
        reconcile_points_timing(&mut data);
        for (series, points) in series.iter_mut().zip(data) {
            series.data = points;
        }
        Ok(series)
    }

    async fn build_series_groups(&self, context: &EvaluationContext) -> ChartResult<Vec<SeriesGroup>> {
        let builders = self
            .chart_definition
            .series_group_builders
            .iter()
            .map(|raw| {
                Ok((
                    find_builder(&self.series_group_builders, &raw.builder_type)?,
                    &raw.builder_recipe,
                ))
            })
            .collect::<ChartResult<Vec<_>>>()?;

        let groups_per_builder =
            try_join_all(builders.into_iter().map(|(builder, recipe)| builder(context, recipe))).await?;
        Ok(groups_per_builder.into_iter().flatten().collect())
    }

    fn assign_colors(&self, series: &mut [Series], series_groups: &mut [SeriesGroup]) {
        let mut colors = lock(&self.colors);
        for series in series.iter_mut().filter(|series| series.color.is_none()) {
            series.color = Some(colors.generate_color_for_key(ColorKey::Series(series.id.clone())));
        }
        for group in series_groups.iter_mut() {
            group.for_each_mut(&mut |group| {
                if group.color.is_none() {
                    group.color = Some(colors.generate_color_for_key(ColorKey::Group(group.id.clone())));
                }
            });
        }
    }

    fn title(&self) -> Title {
        match &self.chart_definition.title {
            Some(title) => Title {
                content: title.content.clone(),
                tip: title.tip.clone().filter(|_| !title.content.is_empty()),
            },
            None => Title::default(),
        }
    }

    fn is_latest(&self, generation: u64) -> bool {
        self.requested_generation.load(Ordering::SeqCst) == generation
    }

    fn publish(&self, generation: u64, result: ChartResult<State>) -> ChartResult<Arc<State>> {
        match result {
            Ok(state) => {
                let state = Arc::new(state);
                let accepted = self.published.send_if_modified(|published| {
                    if !self.is_latest(generation) || published.generation >= generation {
                        return false;
                    }
                    *published = Published {
                        generation,
                        status: ChartStatus::Ready,
                        state: Some(Arc::clone(&state)),
                    };
                    true
                });
                if !accepted {
                    tracing::warn!("Discarding state of superseded recomputation {}", generation);
                    return Err(ChartError::Superseded { generation });
                }

                tracing::info!(
                    "Published chart state {} ({} series, resolution {}s, windows {}..{})",
                    generation,
                    state.series.len(),
                    state.time_resolution,
                    state.first_window_timestamp,
                    state.last_window_timestamp
                );
                self.notify_state_change();
                Ok(state)
            }
            Err(err) => {
                let message = err.to_string();
                self.published.send_if_modified(|published| {
                    if !self.is_latest(generation) || published.generation >= generation {
                        return false;
                    }
                    published.generation = generation;
                    published.status = ChartStatus::Error(message.clone());
                    true
                });
                tracing::warn!("Chart recomputation {} failed: {}", generation, message);
                Err(err)
            }
        }
    }

    fn notify_state_change(&self) {
        let handlers = lock(&self.handlers).clone();
        for (id, handler) in handlers {
            // Skip handlers removed by a previous handler in this round
            let still_registered = lock(&self.handlers)
                .iter()
                .any(|(registered_id, _)| *registered_id == id);
            if still_registered {
                handler(self);
            }
        }
    }
}

fn flag_newest_points(series: &mut [Series], newest_point_timestamp: i64) {
    for series in series {
        for point in series.data.iter_mut().rev() {
            if point.timestamp < newest_point_timestamp {
                break;
            }
            point.newest = true;
        }
    }
}

/// Newest window start among the series, considering every configured
/// resolution the newest measurement falls into.
/// Falls back to the smallest resolution for zero, negative, NaN and overflowing intervals
fn update_interval_duration(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|duration| !duration.is_zero())
        .unwrap_or(Duration::from_secs(SMALLEST_RESOLUTION as u64))
}

fn find_globally_newest_timestamp(
    series: &[Series],
    used_resolution: i64,
    time_resolution_specs: &[TimeResolutionSpec],
) -> Option<i64> {
    let last_real_points: Vec<_> = series
        .iter()
        .filter_map(Series::last_point)
        .filter(|point| !point.fake)
        .collect();
    let newest_timestamp = last_real_points.iter().map(|point| point.timestamp).max()?;
    let newest_edge_timestamp = last_real_points
        .iter()
        .filter_map(|point| point.last_measurement_timestamp)
        .max()
        .unwrap_or(newest_timestamp + used_resolution - 1);

    Some(
        time_resolution_specs
            .iter()
            .map(|spec| align_to_resolution(newest_edge_timestamp, spec.time_resolution))
            .fold(newest_timestamp, i64::max),
    )
}
