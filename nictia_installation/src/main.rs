// CLI entry point for the NICTIA installation.
//
// Runs a headless session for a fixed stretch of simulated time: the
// environment is sensed (or pinned from flags), the generative audio plays
// into an offline host, the particle field follows it, and a summary is
// printed at the end. The composition can be exported as MIDI.
//
// Usage:
//   nictia [OPTIONS]
//     --config <FILE>          JSON config (every field optional)
//     --seconds <S>            Simulated run length (default: 30)
//     --latitude <DEG>         Pin the location (needs --longitude)
//     --longitude <DEG>
//     --weather-file <FILE>    Saved forecast response to read conditions from
//     --midi <FILE>            Write the generated composition as SMF
//     --constrained            Behave as a constrained handheld
//     --seed <N>               Override the session seed
//     --volume <0-100>         Initial master volume
//     --json                   Print the summary as JSON
//
// Exits non-zero only for config and file errors. Audio startup failures
// and environment failures degrade the run instead.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use nictia_env::{
    Coordinates, DeviceSignals, FixedLocation, ForecastFileWeather, LocationProvider,
    WeatherSource,
};
use nictia_installation::{Installation, InstallationConfig, SessionSummary, Sources};

/// NICTIA - environment-driven generative audio and particle field
#[derive(Parser, Debug)]
#[command(name = "nictia", version, about)]
struct Cli {
    /// JSON config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seconds of simulated time to run
    #[arg(long, default_value_t = 30.0)]
    seconds: f64,

    /// Fixed latitude in degrees
    #[arg(long, allow_hyphen_values = true, requires = "longitude")]
    latitude: Option<f64>,

    /// Fixed longitude in degrees
    #[arg(long, allow_hyphen_values = true, requires = "latitude")]
    longitude: Option<f64>,

    /// Forecast response body to read current conditions from
    #[arg(long, value_name = "FILE")]
    weather_file: Option<PathBuf>,

    /// Export the composition to a Standard MIDI File
    #[arg(long, value_name = "FILE")]
    midi: Option<PathBuf>,

    /// Use the constrained-device profile for audio and field
    #[arg(long)]
    constrained: bool,

    /// Session seed
    #[arg(long)]
    seed: Option<u64>,

    /// Initial master volume
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    volume: Option<u8>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => InstallationConfig::load(path)?,
        None => InstallationConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.session.seed = seed;
    }
    if let Some(volume) = cli.volume {
        config.audio.volume = volume;
    }
    if cli.constrained {
        config.session.device = Some(DeviceSignals::constrained());
    }

    let mut sources = Sources::offline();
    if let (Some(lat), Some(lon)) = (cli.latitude, cli.longitude) {
        let location: Arc<dyn LocationProvider> =
            Arc::new(FixedLocation(Coordinates::new(lat, lon)));
        sources.location = location;
    }
    if let Some(path) = &cli.weather_file {
        // Fail early on a missing file; the source re-reads it on every fetch.
        std::fs::metadata(path)
            .with_context(|| format!("weather file {}", path.display()))?;
        let weather: Arc<dyn WeatherSource> = Arc::new(ForecastFileWeather::new(path));
        sources.weather = weather;
    }

    let sample_rate = config.audio.sample_rate;
    let mut installation = Installation::new(config, sources);
    if let Err(e) = installation.start() {
        log::warn!("audio unavailable, running visuals only: {e}");
    }
    // Let the first fetch land before the clock starts so the run reflects
    // the sensed environment from frame one.
    installation.settle_environment(Duration::from_secs(12));

    let summary = installation.run_for(cli.seconds);

    if let Some(path) = &cli.midi {
        nictia_audio::write_midi(installation.engine().events(), sample_rate, path)
            .with_context(|| format!("writing MIDI to {}", path.display()))?;
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(s: &SessionSummary) {
    println!("=== NICTIA session ===");
    println!(
        "Location: {:.4}, {:.4} ({:?})",
        s.state.latitude, s.state.longitude, s.state.location_permission
    );
    println!(
        "Conditions: {} / {:?}, {:.1}°C, local hour {}",
        s.state.weather(),
        s.state.time_of_day(),
        s.state.temperature_c,
        s.state.hour
    );
    if let Some(err) = &s.state.error {
        println!("Environment error: {err}");
    }
    println!(
        "Params: {:.1} bpm, filter {:.0} Hz, reverb {:.2}, {:?} energy, {:?} wave",
        s.params.bpm, s.params.filter_frequency, s.params.reverb_wet, s.params.energy,
        s.params.waveform_type
    );
    println!(
        "Audio: {:?}, reverb {:?}, {} events, {} samples, peak {:.3}",
        s.phase, s.reverb, s.events, s.samples_rendered, s.peak
    );
    println!(
        "Field: {:?} tier, {} frames over {:.1}s, {} interaction updates, mean intensity {:.2}",
        s.performance, s.frames, s.seconds, s.lenia_updates, s.mean_audio_intensity
    );
}
