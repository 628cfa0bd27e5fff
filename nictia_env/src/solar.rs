// Solar position and seasonal phase.
//
// A deliberately coarse astronomical model: declination from a sine over
// the day of year, local solar time approximated as `hour + longitude / 15`
// with no equation-of-time correction, and altitude from the standard
// spherical-trigonometry formula. Good enough to tell noon from midnight and
// summer from winter anywhere on the globe, which is all the mapper needs.
//
// Note that `hour` is already local clock time, so adding `longitude / 15`
// shifts it a second time. The resulting "solar intensity" is a stylised
// signal rather than true insolation, and the mapper's tables are tuned
// against it.

use std::f64::consts::PI;

use crate::clock::ClockReading;

const DAYS_PER_YEAR: f64 = 365.0;
/// Axial tilt, degrees.
const MAX_DECLINATION_DEG: f64 = 23.45;
/// Day of year of the March equinox in the declination model.
const EQUINOX_DAY: f64 = 81.0;
/// Day of year of the June solstice, where the northern season factor peaks.
const SOLSTICE_DAY: f64 = 172.0;

/// Solar declination in degrees for a 1-based day of year.
pub fn solar_declination(day_of_year: u32) -> f64 {
    MAX_DECLINATION_DEG * ((2.0 * PI / DAYS_PER_YEAR) * (f64::from(day_of_year) - EQUINOX_DAY)).sin()
}

/// Solar altitude in radians, in [-pi/2, pi/2].
pub fn solar_altitude(latitude: f64, longitude: f64, clock: &ClockReading) -> f64 {
    let declination = solar_declination(clock.day_of_year).to_radians();
    let lat = latitude.to_radians();

    let local_solar_time = clock.fractional_hour() + longitude / 15.0;
    let hour_angle = ((local_solar_time - 12.0) * 15.0).to_radians();

    let sin_altitude =
        lat.sin() * declination.sin() + lat.cos() * declination.cos() * hour_angle.cos();
    sin_altitude.clamp(-1.0, 1.0).asin()
}

/// `max(0, sin(altitude))`: 0 at or below the horizon, 1 at zenith.
pub fn calculate_solar_intensity(latitude: f64, longitude: f64, clock: &ClockReading) -> f64 {
    solar_altitude(latitude, longitude, clock).sin().max(0.0)
}

/// Seasonal phase in [0, 1]: 1 at local midsummer, 0 at midwinter.
///
/// A cosine over the day of year peaking at the June solstice, flipped for
/// the southern hemisphere.
pub fn calculate_season_factor(latitude: f64, clock: &ClockReading) -> f64 {
    let mut phase =
        ((2.0 * PI / DAYS_PER_YEAR) * (f64::from(clock.day_of_year) - SOLSTICE_DAY)).cos();
    if latitude < 0.0 {
        phase = -phase;
    }
    (phase + 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declination_zero_at_equinox_and_max_near_solstice() {
        assert!(solar_declination(81).abs() < 1e-9);
        let june = solar_declination(172);
        assert!((june - 23.45).abs() < 0.01, "june declination {june}");
    }

    #[test]
    fn intensity_is_zero_below_horizon() {
        // Equator, equinox, local solar midnight: sun straight below.
        let midnight = ClockReading::new(81, 0, 0);
        assert_eq!(calculate_solar_intensity(0.0, 0.0, &midnight), 0.0);
    }

    #[test]
    fn intensity_is_one_at_equatorial_equinox_noon() {
        let noon = ClockReading::new(81, 12, 0);
        let i = calculate_solar_intensity(0.0, 0.0, &noon);
        assert!((i - 1.0).abs() < 1e-9, "intensity {i}");
    }

    #[test]
    fn intensity_stays_in_unit_interval() {
        for lat in (-90..=90).step_by(15) {
            for lon in (-180..=180).step_by(45) {
                for hour in 0..24 {
                    for day in [1, 81, 172, 266, 355] {
                        let clock = ClockReading::new(day, hour, 30);
                        let i = calculate_solar_intensity(f64::from(lat), f64::from(lon), &clock);
                        assert!((0.0..=1.0).contains(&i), "intensity {i} at {lat},{lon}");
                    }
                }
            }
        }
    }

    #[test]
    fn intensity_is_continuous_across_the_horizon() {
        // Walk minute by minute through a sunrise; no jump bigger than the
        // slope of sin(altitude) allows.
        let mut prev = calculate_solar_intensity(0.0, 0.0, &ClockReading::new(81, 5, 0));
        for minute in 1..120 {
            let clock = ClockReading::new(81, 5 + minute / 60, minute % 60);
            let i = calculate_solar_intensity(0.0, 0.0, &clock);
            assert!((i - prev).abs() < 0.01, "jump from {prev} to {i}");
            prev = i;
        }
    }

    #[test]
    fn tokyo_afternoon_in_march_reads_as_dark() {
        // 14:00 local plus 139.69/15 hours lands near 23:19 solar time.
        let clock = ClockReading::new(81, 14, 0);
        assert_eq!(calculate_solar_intensity(35.6895, 139.6917, &clock), 0.0);
    }

    #[test]
    fn season_factor_peaks_at_solstice_and_flips_south() {
        let june = ClockReading::new(172, 12, 0);
        assert!((calculate_season_factor(45.0, &june) - 1.0).abs() < 1e-12);
        assert!(calculate_season_factor(-45.0, &june).abs() < 1e-12);
    }

    #[test]
    fn season_factor_in_unit_interval() {
        for day in 1..=366 {
            let clock = ClockReading::new(day, 0, 0);
            for lat in [-60.0, 0.0, 60.0] {
                let f = calculate_season_factor(lat, &clock);
                assert!((0.0..=1.0).contains(&f));
            }
        }
    }
}
