// Device position with a bounded wait and a fixed fallback.
//
// `resolve_location` asks a `LocationProvider` for the current position on
// a worker thread and waits at most `PositionOptions::timeout` for the
// answer. Denial, capability absence, provider errors and timeouts all
// resolve to the default coordinates with `LocationPermission::Denied`; the
// call never blocks past the timeout and never fails.
//
// A provider that overruns the timeout keeps running on its worker thread
// until it returns; its late answer is dropped with the channel.
//
// `CachedLocation` wraps any provider and serves a remembered fix while it
// is younger than `PositionOptions::maximum_age`.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::LocationError;
use crate::types::{DEFAULT_LATITUDE, DEFAULT_LONGITUDE, LocationPermission};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Tokyo.
    pub const fn fallback() -> Self {
        Self::new(DEFAULT_LATITUDE, DEFAULT_LONGITUDE)
    }
}

/// Knobs passed to the provider with each request.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    /// Upper bound on how long resolution waits for the provider.
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// A cached fix younger than this is acceptable.
    #[serde(with = "duration_millis")]
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: false,
            timeout: Duration::from_millis(10_000),
            maximum_age: Duration::from_millis(300_000),
        }
    }
}

/// Durations in config files are plain millisecond counts.
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Host capability that can report where the installation is.
///
/// Runs on a worker thread and may block.
pub trait LocationProvider: Send + Sync {
    fn current_position(&self, options: &PositionOptions) -> Result<Coordinates, LocationError>;
}

/// Always reports the same position.
#[derive(Clone, Copy, Debug)]
pub struct FixedLocation(pub Coordinates);

impl LocationProvider for FixedLocation {
    fn current_position(&self, _options: &PositionOptions) -> Result<Coordinates, LocationError> {
        Ok(self.0)
    }
}

/// A host with no location capability at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableLocation;

impl LocationProvider for UnavailableLocation {
    fn current_position(&self, _options: &PositionOptions) -> Result<Coordinates, LocationError> {
        Err(LocationError::Unavailable)
    }
}

/// Serves the last successful fix while it is younger than `maximum_age`.
pub struct CachedLocation<P> {
    inner: P,
    last_fix: Mutex<Option<(Instant, Coordinates)>>,
}

impl<P: LocationProvider> CachedLocation<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            last_fix: Mutex::new(None),
        }
    }
}

impl<P: LocationProvider> LocationProvider for CachedLocation<P> {
    fn current_position(&self, options: &PositionOptions) -> Result<Coordinates, LocationError> {
        let cached = self.last_fix.lock().ok().and_then(|guard| *guard);
        if let Some((at, coords)) = cached {
            if at.elapsed() <= options.maximum_age {
                return Ok(coords);
            }
        }
        let coords = self.inner.current_position(options)?;
        if let Ok(mut guard) = self.last_fix.lock() {
            *guard = Some((Instant::now(), coords));
        }
        Ok(coords)
    }
}

/// Where the installation decided it is, and how it found out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocationResolution {
    pub coordinates: Coordinates,
    pub permission: LocationPermission,
}

/// Ask `provider` for a position, waiting at most `options.timeout`.
///
/// Any failure resolves to `fallback` with `LocationPermission::Denied`.
pub fn resolve_location(
    provider: Arc<dyn LocationProvider>,
    options: PositionOptions,
    fallback: Coordinates,
) -> LocationResolution {
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("nictia-location".into())
        .spawn(move || {
            // The receiver is gone if we already timed out.
            let _ = tx.send(provider.current_position(&options));
        });

    let outcome = match spawned {
        Ok(_) => match rx.recv_timeout(options.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(LocationError::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(LocationError::Provider("worker panicked".into()))
            }
        },
        Err(e) => Err(LocationError::Provider(e.to_string())),
    };

    match outcome {
        Ok(coordinates) => {
            log::debug!(
                "location granted: ({:.4}, {:.4})",
                coordinates.latitude,
                coordinates.longitude
            );
            LocationResolution {
                coordinates,
                permission: LocationPermission::Granted,
            }
        }
        Err(e) => {
            log::warn!("location unavailable ({e}); using fallback coordinates");
            LocationResolution {
                coordinates: fallback,
                permission: LocationPermission::Denied,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Denying;
    impl LocationProvider for Denying {
        fn current_position(&self, _: &PositionOptions) -> Result<Coordinates, LocationError> {
            Err(LocationError::PermissionDenied)
        }
    }

    struct Slow(Duration);
    impl LocationProvider for Slow {
        fn current_position(&self, _: &PositionOptions) -> Result<Coordinates, LocationError> {
            thread::sleep(self.0);
            Ok(Coordinates::new(1.0, 2.0))
        }
    }

    struct Counting(AtomicUsize);
    impl LocationProvider for Counting {
        fn current_position(&self, _: &PositionOptions) -> Result<Coordinates, LocationError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Coordinates::new(n as f64, 0.0))
        }
    }

    #[test]
    fn default_options_match_browser_request() {
        let o = PositionOptions::default();
        assert!(!o.enable_high_accuracy);
        assert_eq!(o.timeout, Duration::from_secs(10));
        assert_eq!(o.maximum_age, Duration::from_secs(300));
    }

    #[test]
    fn granted_position_is_used() {
        let r = resolve_location(
            Arc::new(FixedLocation(Coordinates::new(51.5, -0.12))),
            PositionOptions::default(),
            Coordinates::fallback(),
        );
        assert_eq!(r.permission, LocationPermission::Granted);
        assert_eq!(r.coordinates, Coordinates::new(51.5, -0.12));
    }

    #[test]
    fn denial_and_absence_fall_back() {
        for provider in [
            Arc::new(Denying) as Arc<dyn LocationProvider>,
            Arc::new(UnavailableLocation),
        ] {
            let r = resolve_location(provider, PositionOptions::default(), Coordinates::fallback());
            assert_eq!(r.permission, LocationPermission::Denied);
            assert_eq!(r.coordinates, Coordinates::fallback());
        }
    }

    #[test]
    fn slow_provider_times_out_to_fallback() {
        let options = PositionOptions {
            timeout: Duration::from_millis(20),
            ..PositionOptions::default()
        };
        let start = Instant::now();
        let r = resolve_location(
            Arc::new(Slow(Duration::from_millis(500))),
            options,
            Coordinates::fallback(),
        );
        assert!(start.elapsed() < Duration::from_millis(400));
        assert_eq!(r.permission, LocationPermission::Denied);
        assert_eq!(r.coordinates, Coordinates::fallback());
    }

    #[test]
    fn cache_serves_recent_fix() {
        let cached = CachedLocation::new(Counting(AtomicUsize::new(0)));
        let options = PositionOptions::default();
        let a = cached.current_position(&options).unwrap();
        let b = cached.current_position(&options).unwrap();
        assert_eq!(a, b);

        let no_cache = PositionOptions {
            maximum_age: Duration::ZERO,
            ..options
        };
        thread::sleep(Duration::from_millis(2));
        let c = cached.current_position(&no_cache).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn options_roundtrip_as_millis() {
        let json = serde_json::to_string(&PositionOptions::default()).unwrap();
        assert!(json.contains("\"timeout\":10000"));
        let back: PositionOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PositionOptions::default());
    }
}
