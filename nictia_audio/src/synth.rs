// The three instruments.
//
// - `PolySynth`: the drone pad. A fixed pool of oscillator+envelope voices;
//   a new note takes an idle voice, or steals the one released longest ago.
// - `MonoSynth`: the pulse. One square oscillator through its own lowpass
//   whose cutoff follows a second envelope (base 200 Hz, up three octaves).
// - `NoiseSynth`: pink-noise bursts.
//
// Notes are scheduled on the sample timeline: `trigger_attack_release`
// starts the attack now and remembers the sample at which to release, and
// `process(now)` performs the release when that sample is reached.
//
// Each instrument's volume is a linear-gain `Ramp` set from decibels.

use nictia_env::WaveformType;
use nictia_prng::FieldRng;

use crate::dsp::{Adsr, AdsrShape, Lowpass, Oscillator, PinkNoise, Ramp, db_to_gain, midi_to_hz};

pub const DRONE_SHAPE: AdsrShape = AdsrShape::new(4.0, 2.0, 0.8, 6.0);
pub const PULSE_SHAPE: AdsrShape = AdsrShape::new(0.01, 0.3, 0.0, 0.5);
pub const PULSE_FILTER_SHAPE: AdsrShape = AdsrShape::new(0.01, 0.2, 0.2, 0.5);
pub const NOISE_SHAPE: AdsrShape = AdsrShape::new(0.5, 1.0, 0.0, 1.0);

pub const PULSE_FILTER_BASE_HZ: f32 = 200.0;
pub const PULSE_FILTER_OCTAVES: f32 = 3.0;

// ---------------------------------------------------------------------------
// PolySynth
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Voice {
    osc: Oscillator,
    env: Adsr,
    freq: f32,
    release_at: Option<u64>,
    /// Sample at which the voice last started; used for stealing.
    started: u64,
}

#[derive(Clone, Debug)]
pub struct PolySynth {
    voices: Vec<Voice>,
    sample_rate: f32,
    pub volume: Ramp,
}

impl PolySynth {
    pub fn new(
        voices: usize,
        waveform: WaveformType,
        shape: AdsrShape,
        volume_db: f32,
        sample_rate: f32,
    ) -> Self {
        let voices = (0..voices.max(1))
            .map(|_| Voice {
                osc: Oscillator::new(waveform),
                env: Adsr::new(shape, sample_rate),
                freq: 0.0,
                release_at: None,
                started: 0,
            })
            .collect();
        Self {
            voices,
            sample_rate,
            volume: Ramp::new(db_to_gain(volume_db)),
        }
    }

    pub fn set_waveform(&mut self, waveform: WaveformType) {
        for v in &mut self.voices {
            v.osc.waveform = waveform;
        }
    }

    pub fn waveform(&self) -> WaveformType {
        self.voices[0].osc.waveform
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| !v.env.is_idle()).count()
    }

    /// Start `note` now and release it `duration` samples later.
    pub fn trigger_attack_release(&mut self, note: u8, duration: u64, now: u64) {
        let idx = self
            .voices
            .iter()
            .position(|v| v.env.is_idle())
            .or_else(|| {
                // Steal: prefer voices already releasing, then the oldest.
                self.voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, v)| (!v.env.is_released(), v.started))
                    .map(|(i, _)| i)
            });
        let Some(idx) = idx else { return };
        let voice = &mut self.voices[idx];
        if voice.env.is_idle() {
            voice.osc.reset();
        }
        voice.freq = midi_to_hz(note);
        voice.env.trigger_attack();
        voice.release_at = Some(now + duration);
        voice.started = now;
    }

    pub fn release_all(&mut self) {
        for v in &mut self.voices {
            v.env.trigger_release();
            v.release_at = None;
        }
    }

    pub fn process(&mut self, now: u64) -> f32 {
        let mut out = 0.0;
        for v in &mut self.voices {
            if v.release_at.is_some_and(|at| now >= at) {
                v.env.trigger_release();
                v.release_at = None;
            }
            if v.env.is_idle() {
                continue;
            }
            let level = v.env.next();
            out += v.osc.next(v.freq, self.sample_rate) * level;
        }
        out * self.volume.next()
    }
}

// ---------------------------------------------------------------------------
// MonoSynth
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct MonoSynth {
    osc: Oscillator,
    env: Adsr,
    filter_env: Adsr,
    filter: Lowpass,
    freq: f32,
    release_at: Option<u64>,
    sample_rate: f32,
    pub volume: Ramp,
}

impl MonoSynth {
    pub fn new(volume_db: f32, sample_rate: f32) -> Self {
        Self {
            osc: Oscillator::new(WaveformType::Square),
            env: Adsr::new(PULSE_SHAPE, sample_rate),
            filter_env: Adsr::new(PULSE_FILTER_SHAPE, sample_rate),
            filter: Lowpass::new(PULSE_FILTER_BASE_HZ, 1.0, sample_rate),
            freq: 0.0,
            release_at: None,
            sample_rate,
            volume: Ramp::new(db_to_gain(volume_db)),
        }
    }

    pub fn is_sounding(&self) -> bool {
        !self.env.is_idle()
    }

    pub fn trigger_attack_release(&mut self, note: u8, duration: u64, now: u64) {
        self.freq = midi_to_hz(note);
        self.env.trigger_attack();
        self.filter_env.trigger_attack();
        self.release_at = Some(now + duration);
    }

    pub fn release(&mut self) {
        self.env.trigger_release();
        self.filter_env.trigger_release();
        self.release_at = None;
    }

    pub fn process(&mut self, now: u64) -> f32 {
        if self.release_at.is_some_and(|at| now >= at) {
            self.release();
        }
        // The volume glide runs on the sample clock, sounding or not.
        let gain = self.volume.next();
        if self.env.is_idle() {
            return 0.0;
        }
        let level = self.env.next();
        let cutoff =
            PULSE_FILTER_BASE_HZ * 2.0_f32.powf(PULSE_FILTER_OCTAVES * self.filter_env.next());
        let raw = self.osc.next(self.freq, self.sample_rate);
        self.filter.process_at(raw, Some(cutoff)) * level * gain
    }
}

// ---------------------------------------------------------------------------
// NoiseSynth
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct NoiseSynth {
    noise: PinkNoise,
    env: Adsr,
    release_at: Option<u64>,
    pub volume: Ramp,
}

impl NoiseSynth {
    pub fn new(shape: AdsrShape, volume_db: f32, rng: FieldRng, sample_rate: f32) -> Self {
        Self {
            noise: PinkNoise::new(rng),
            env: Adsr::new(shape, sample_rate),
            release_at: None,
            volume: Ramp::new(db_to_gain(volume_db)),
        }
    }

    pub fn is_sounding(&self) -> bool {
        !self.env.is_idle()
    }

    pub fn trigger_attack(&mut self) {
        self.env.trigger_attack();
        self.release_at = None;
    }

    pub fn trigger_release(&mut self) {
        self.env.trigger_release();
        self.release_at = None;
    }

    pub fn trigger_attack_release(&mut self, duration: u64, now: u64) {
        self.env.trigger_attack();
        self.release_at = Some(now + duration);
    }

    pub fn process(&mut self, now: u64) -> f32 {
        if self.release_at.is_some_and(|at| now >= at) {
            self.trigger_release();
        }
        let gain = self.volume.next();
        if self.env.is_idle() {
            return 0.0;
        }
        self.noise.next() * self.env.next() * gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 8000.0;

    fn energy(samples: impl Iterator<Item = f32>) -> f32 {
        samples.map(|s| s * s).sum()
    }

    #[test]
    fn poly_voices_release_and_go_idle() {
        let fast = AdsrShape::new(0.01, 0.01, 0.5, 0.01);
        let mut synth = PolySynth::new(4, WaveformType::Sine, fast, 0.0, SR);
        synth.trigger_attack_release(60, 400, 0);
        synth.trigger_attack_release(64, 400, 0);
        assert_eq!(synth.active_voices(), 2);
        let e = energy((0..400).map(|n| synth.process(n)));
        assert!(e > 0.0);
        for n in 400..1000 {
            synth.process(n);
        }
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn poly_steals_when_full() {
        let mut synth = PolySynth::new(2, WaveformType::Sine, DRONE_SHAPE, -12.0, SR);
        for (i, note) in [36, 43, 48].into_iter().enumerate() {
            synth.trigger_attack_release(note, 100_000, i as u64);
        }
        assert_eq!(synth.active_voices(), 2);
    }

    #[test]
    fn waveform_change_applies_to_all_voices() {
        let mut synth = PolySynth::new(3, WaveformType::Sine, DRONE_SHAPE, -12.0, SR);
        synth.set_waveform(WaveformType::Square);
        assert_eq!(synth.waveform(), WaveformType::Square);
    }

    #[test]
    fn pulse_is_short() {
        let mut synth = MonoSynth::new(-18.0, SR);
        synth.trigger_attack_release(48, 500, 0);
        let e = energy((0..500).map(|n| synth.process(n)));
        assert!(e > 0.0);
        // Zero sustain: silent well before the release would end.
        for n in 500..6000 {
            synth.process(n);
        }
        assert!(!synth.is_sounding());
    }

    #[test]
    fn noise_burst_fades() {
        let mut synth = NoiseSynth::new(NOISE_SHAPE, -24.0, FieldRng::new(4), SR);
        synth.trigger_attack_release(4000, 0);
        assert!(synth.is_sounding());
        let e = energy((0..4000).map(|n| synth.process(n)));
        assert!(e > 0.0);
        for n in 4000..30_000 {
            synth.process(n);
        }
        assert!(!synth.is_sounding());
    }

    #[test]
    fn muted_volume_is_silent() {
        let mut synth = NoiseSynth::new(NOISE_SHAPE, f32::NEG_INFINITY, FieldRng::new(5), SR);
        synth.trigger_attack();
        assert_eq!(energy((0..1000).map(|n| synth.process(n))), 0.0);
    }

    #[test]
    fn idle_pulse_still_glides_volume() {
        let mut synth = MonoSynth::new(-18.0, SR);
        let target = db_to_gain(-24.0);
        synth.volume.ramp_to(target, 1000);
        for n in 0..999 {
            assert_eq!(synth.process(n), 0.0);
        }
        assert!(synth.volume.value() != target);
        synth.process(999);
        assert_eq!(synth.volume.value(), target);
    }

    #[test]
    fn idle_noise_still_glides_volume() {
        let mut synth = NoiseSynth::new(NOISE_SHAPE, -24.0, FieldRng::new(6), SR);
        synth.volume.ramp_to(db_to_gain(-12.0), 500);
        for n in 0..500 {
            synth.process(n);
        }
        assert!(!synth.volume.is_ramping());
        assert_eq!(synth.volume.value(), db_to_gain(-12.0));
    }
}
