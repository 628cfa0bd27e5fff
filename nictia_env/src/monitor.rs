// Environment monitor: owns the live state and its derived params.
//
// Lifecycle:
// - `new()` builds the startup state (fallback coordinates, clear, loading)
//   and an initial params bundle from it, so consumers always have
//   something to render.
// - `refresh()` marks the state loading, bumps the request generation, and
//   runs location resolution followed by the weather fetch on a background
//   thread. The outcome comes back over an `mpsc` channel tagged with its
//   generation.
// - `poll()` drains finished fetches without blocking. Only an outcome
//   carrying the newest generation is applied; anything older is a stale
//   response overtaken by a later `refresh()` and is dropped.
// - `tick()` re-derives the local hour from the wall clock at most once per
//   `clock_tick_interval`, catching day/night transitions between fetches.
//
// Applying a fetch outcome: the location permission is always recorded. A
// successful weather fetch replaces the sensed fields wholesale and clears
// any error. A failed fetch sets `error` and clears `is_loading` but keeps
// every previously sensed field. There is no automatic retry.
//
// Params are recomputed whenever the state changes while not loading.
// `params_revision()` increments on every recompute so consumers can skip
// pushing an unchanged bundle.
//
// See also: `location.rs` for the bounded location wait, `weather.rs` for
// the source trait, `nictia_installation::session` which calls `poll()` and
// `tick()` once per frame.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use nictia_prng::FieldRng;

use crate::clock::WallClock;
use crate::config::EnvironmentConfig;
use crate::error::EnvError;
use crate::location::{
    Coordinates, LocationProvider, LocationResolution, PositionOptions, resolve_location,
};
use crate::mapper::calculate_params;
use crate::types::{EnvironmentParams, EnvironmentState};
use crate::weather::{WeatherObservation, WeatherSource};

/// Result of one refresh, as reported by the worker thread.
struct FetchOutcome {
    generation: u64,
    location: LocationResolution,
    weather: Result<WeatherObservation, EnvError>,
}

pub struct EnvironmentMonitor {
    config: EnvironmentConfig,
    state: EnvironmentState,
    params: EnvironmentParams,
    params_revision: u64,
    location: Arc<dyn LocationProvider>,
    weather: Arc<dyn WeatherSource>,
    clock: Arc<dyn WallClock>,
    rng: FieldRng,
    /// Generation of the most recent `refresh()`. Outcomes tagged with any
    /// other value are stale.
    generation: u64,
    tx: Sender<FetchOutcome>,
    rx: Receiver<FetchOutcome>,
    last_tick_unix: i64,
}

impl EnvironmentMonitor {
    pub fn new(
        config: EnvironmentConfig,
        location: Arc<dyn LocationProvider>,
        weather: Arc<dyn WeatherSource>,
        clock: Arc<dyn WallClock>,
        rng: FieldRng,
    ) -> Self {
        let now = clock.now_unix();
        let reading = clock.reading(config.initial_utc_offset_seconds);
        let mut state = EnvironmentState::initial(reading.hour);
        state.latitude = config.fallback_latitude;
        state.longitude = config.fallback_longitude;
        state.utc_offset_seconds = config.initial_utc_offset_seconds;

        let (tx, rx) = mpsc::channel();
        let mut monitor = Self {
            config,
            state,
            params: EnvironmentParams::default(),
            params_revision: 0,
            location,
            weather,
            clock,
            rng,
            generation: 0,
            tx,
            rx,
            last_tick_unix: now,
        };
        monitor.recompute_params();
        monitor
    }

    pub fn state(&self) -> &EnvironmentState {
        &self.state
    }

    pub fn params(&self) -> &EnvironmentParams {
        &self.params
    }

    /// Increments every time `params()` is recomputed.
    pub fn params_revision(&self) -> u64 {
        self.params_revision
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Start a background re-fetch of location and weather.
    ///
    /// Any fetch still in flight becomes stale and its result will be
    /// discarded by `poll()`.
    pub fn refresh(&mut self) {
        let generation = self.begin_refresh();
        let location = Arc::clone(&self.location);
        let weather = Arc::clone(&self.weather);
        let options = self.config.position;
        let fallback = self.config.fallback();
        let tx = self.tx.clone();

        let spawned = thread::Builder::new()
            .name(format!("nictia-env-fetch-{generation}"))
            .spawn(move || {
                let outcome = fetch_environment(generation, location, weather, options, fallback);
                // Receiver dropped means the monitor is gone; nothing to do.
                let _ = tx.send(outcome);
            });

        if let Err(e) = spawned {
            log::warn!("could not start environment fetch: {e}");
            let outcome = FetchOutcome {
                generation,
                location: LocationResolution {
                    coordinates: self.config.fallback(),
                    permission: self.state.location_permission,
                },
                weather: Err(EnvError::WorkerLost),
            };
            self.apply(outcome);
        }
    }

    /// Same transition as `refresh()`, performed on the calling thread.
    pub fn refresh_blocking(&mut self) {
        let generation = self.begin_refresh();
        let outcome = fetch_environment(
            generation,
            Arc::clone(&self.location),
            Arc::clone(&self.weather),
            self.config.position,
            self.config.fallback(),
        );
        self.apply(outcome);
    }

    fn begin_refresh(&mut self) -> u64 {
        self.generation += 1;
        self.state.is_loading = true;
        log::info!("environment refresh #{} started", self.generation);
        self.generation
    }

    /// Apply any finished fetch. Returns whether the state changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(outcome) = self.rx.try_recv() {
            changed |= self.accept(outcome);
        }
        changed
    }

    /// Block until the newest refresh has landed or `max` elapses.
    ///
    /// Returns `true` if the monitor is no longer loading.
    pub fn poll_until_settled(&mut self, max: Duration) -> bool {
        let deadline = Instant::now() + max;
        while self.state.is_loading {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(outcome) => {
                    self.accept(outcome);
                }
                Err(_) => break,
            }
        }
        !self.state.is_loading
    }

    fn accept(&mut self, outcome: FetchOutcome) -> bool {
        if outcome.generation != self.generation {
            log::debug!(
                "discarding stale environment fetch #{} (current #{})",
                outcome.generation,
                self.generation
            );
            return false;
        }
        self.apply(outcome);
        true
    }

    fn apply(&mut self, outcome: FetchOutcome) {
        self.state.location_permission = outcome.location.permission;
        match outcome.weather {
            Ok(obs) => {
                let reading = self.clock.reading(obs.utc_offset_seconds);
                self.state = EnvironmentState {
                    latitude: outcome.location.coordinates.latitude,
                    longitude: outcome.location.coordinates.longitude,
                    hour: reading.hour,
                    weather_code: obs.weather_code,
                    is_day: obs.is_day,
                    temperature_c: obs.temperature_c,
                    utc_offset_seconds: obs.utc_offset_seconds,
                    is_loading: false,
                    error: None,
                    location_permission: outcome.location.permission,
                };
                log::info!(
                    "environment #{}: {} at ({:.2}, {:.2}), {:.1}°C, hour {}",
                    outcome.generation,
                    self.state.weather(),
                    self.state.latitude,
                    self.state.longitude,
                    self.state.temperature_c,
                    self.state.hour
                );
            }
            Err(e) => {
                log::warn!("environment #{} fetch failed: {e}", outcome.generation);
                self.state.is_loading = false;
                self.state.error = Some(format!("failed to fetch weather data: {e}"));
            }
        }
        self.recompute_params();
    }

    /// Re-derive the local hour if a tick interval has passed. Returns
    /// whether the hour changed.
    pub fn tick(&mut self) -> bool {
        let now = self.clock.now_unix();
        let interval = self.config.clock_tick_interval.as_secs() as i64;
        if now - self.last_tick_unix < interval {
            return false;
        }
        self.last_tick_unix = now;

        let hour = self.clock.reading(self.state.utc_offset_seconds).hour;
        if hour == self.state.hour {
            return false;
        }
        log::debug!("local hour {} -> {}", self.state.hour, hour);
        self.state.hour = hour;
        if !self.state.is_loading {
            self.recompute_params();
        }
        true
    }

    fn recompute_params(&mut self) {
        let reading = self.clock.reading(self.state.utc_offset_seconds);
        self.params = calculate_params(&self.state, &reading, &mut self.rng);
        self.params_revision += 1;
    }
}

/// Resolve the location, then fetch weather there. Blocking.
fn fetch_environment(
    generation: u64,
    location: Arc<dyn LocationProvider>,
    weather: Arc<dyn WeatherSource>,
    options: PositionOptions,
    fallback: Coordinates,
) -> FetchOutcome {
    let resolution = resolve_location(location, options, fallback);
    let weather = weather.fetch(
        resolution.coordinates.latitude,
        resolution.coordinates.longitude,
    );
    FetchOutcome {
        generation,
        location: resolution,
        weather,
    }
}
