// Signal-processing primitives.
//
// Everything here is mono, runs one sample at a time, and owns its own
// state. Parameters that the engine changes while sound is playing (filter
// cutoff, wet levels, volumes, tempo) are `Ramp`s: a target and a per-sample
// increment, so a change lands smoothly over a fixed time instead of
// clicking.
//
// - `Ramp`:          linear parameter glide. Retargeting to the current
//                    value is a no-op.
// - `Oscillator`:    naive sine / triangle / square.
// - `Adsr`:          linear attack/decay/release envelope with sustain.
// - `PinkNoise`:     Paul Kellett's refined pink filter over white noise
//                    drawn from `FieldRng`.
// - `Lowpass`:       RBJ cookbook biquad with a rampable cutoff.
// - `FeedbackDelay`: circular-buffer echo with feedback and dry/wet mix.
// - `Reverb`:        sparse convolution with a velvet-noise impulse
//                    response; see `reverb_taps` for how the response is
//                    generated.

use std::f32::consts::TAU;

use nictia_env::WaveformType;
use nictia_prng::FieldRng;

/// Decibels to linear amplitude. `-inf` maps to exactly 0.
pub fn db_to_gain(db: f32) -> f32 {
    if db == f32::NEG_INFINITY {
        0.0
    } else {
        10.0_f32.powf(db / 20.0)
    }
}

/// Linear amplitude to decibels. Silence maps to `-inf`.
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * gain.log10()
    }
}

/// Equal-tempered frequency of a MIDI note number (A4 = 69 = 440 Hz).
pub fn midi_to_hz(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((f32::from(note) - 69.0) / 12.0)
}

fn wrap_phase(mut phase: f32) -> f32 {
    while phase >= TAU {
        phase -= TAU;
    }
    phase
}

// ---------------------------------------------------------------------------
// Ramp
// ---------------------------------------------------------------------------

/// Linear glide from the current value to a target over a number of samples.
#[derive(Clone, Debug)]
pub struct Ramp {
    value: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl Ramp {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            target: value,
            step: 0.0,
            remaining: 0,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    /// Jump immediately, cancelling any glide in progress.
    pub fn set(&mut self, value: f32) {
        self.value = value;
        self.target = value;
        self.step = 0.0;
        self.remaining = 0;
    }

    /// Glide to `target` over `samples`. Zero samples jumps.
    pub fn ramp_to(&mut self, target: f32, samples: u32) {
        if target == self.target && (self.remaining > 0 || target == self.value) {
            return;
        }
        if samples == 0 {
            self.set(target);
            return;
        }
        self.target = target;
        self.step = (target - self.value) / samples as f32;
        self.remaining = samples;
    }

    /// Advance one sample and return the new value.
    pub fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.value = self.target;
            } else {
                self.value += self.step;
            }
        }
        self.value
    }
}

// ---------------------------------------------------------------------------
// Oscillator
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Oscillator {
    pub waveform: WaveformType,
    phase: f32,
}

impl Oscillator {
    pub fn new(waveform: WaveformType) -> Self {
        Self { waveform, phase: 0.0 }
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    pub fn next(&mut self, freq_hz: f32, sample_rate: f32) -> f32 {
        let out = match self.waveform {
            WaveformType::Sine => self.phase.sin(),
            WaveformType::Triangle => {
                let t = self.phase / TAU;
                if t < 0.25 {
                    4.0 * t
                } else if t < 0.75 {
                    2.0 - 4.0 * t
                } else {
                    4.0 * t - 4.0
                }
            }
            WaveformType::Square => {
                if self.phase < TAU / 2.0 {
                    1.0
                } else {
                    -1.0
                }
            }
        };
        self.phase = wrap_phase(self.phase + TAU * freq_hz / sample_rate);
        out
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Times in seconds, sustain as a level in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AdsrShape {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl AdsrShape {
    pub const fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Clone, Debug)]
pub struct Adsr {
    shape: AdsrShape,
    sample_rate: f32,
    stage: Stage,
    level: f32,
    /// Per-sample level change in the current stage.
    rate: f32,
}

impl Adsr {
    pub fn new(shape: AdsrShape, sample_rate: f32) -> Self {
        Self {
            shape,
            sample_rate,
            stage: Stage::Idle,
            level: 0.0,
            rate: 0.0,
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }

    pub fn is_released(&self) -> bool {
        matches!(self.stage, Stage::Release | Stage::Idle)
    }

    /// Start (or restart) the attack from the current level.
    pub fn trigger_attack(&mut self) {
        self.stage = Stage::Attack;
        self.rate = self.per_sample(1.0 - self.level, self.shape.attack);
    }

    /// Fall from the current level to silence over the release time.
    pub fn trigger_release(&mut self) {
        if self.stage == Stage::Idle {
            return;
        }
        self.stage = Stage::Release;
        self.rate = self.per_sample(-self.level, self.shape.release);
    }

    fn per_sample(&self, delta: f32, seconds: f32) -> f32 {
        let samples = (seconds * self.sample_rate).max(1.0);
        delta / samples
    }

    pub fn next(&mut self) -> f32 {
        match self.stage {
            Stage::Idle | Stage::Sustain => {}
            Stage::Attack => {
                self.level += self.rate;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                    self.rate = self.per_sample(self.shape.sustain - 1.0, self.shape.decay);
                }
            }
            Stage::Decay => {
                self.level += self.rate;
                if self.level <= self.shape.sustain {
                    self.level = self.shape.sustain;
                    self.stage = if self.shape.sustain <= 0.0 {
                        Stage::Idle
                    } else {
                        Stage::Sustain
                    };
                }
            }
            Stage::Release => {
                self.level += self.rate;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }
}

// ---------------------------------------------------------------------------
// Pink noise
// ---------------------------------------------------------------------------

/// Kellett's seven-pole pink filter, roughly -3 dB/octave across the band.
#[derive(Clone, Debug)]
pub struct PinkNoise {
    rng: FieldRng,
    b: [f32; 7],
}

impl PinkNoise {
    pub fn new(rng: FieldRng) -> Self {
        Self { rng, b: [0.0; 7] }
    }

    pub fn next(&mut self) -> f32 {
        let white = self.rng.next_f32() * 2.0 - 1.0;
        let b = &mut self.b;
        b[0] = 0.99886 * b[0] + white * 0.0555179;
        b[1] = 0.99332 * b[1] + white * 0.0750759;
        b[2] = 0.96900 * b[2] + white * 0.1538520;
        b[3] = 0.86650 * b[3] + white * 0.3104856;
        b[4] = 0.55000 * b[4] + white * 0.5329522;
        b[5] = -0.7616 * b[5] - white * 0.0168980;
        let out = b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + white * 0.5362;
        b[6] = white * 0.115926;
        // The filter's passband gain is about 9 dB; bring it back near unity.
        out * 0.11
    }
}

// ---------------------------------------------------------------------------
// Lowpass
// ---------------------------------------------------------------------------

/// RBJ cookbook lowpass biquad, direct form I.
#[derive(Clone, Debug)]
pub struct Lowpass {
    pub frequency: Ramp,
    q: f32,
    sample_rate: f32,
    coeffs: [f32; 5],
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Lowpass {
    pub fn new(frequency: f32, q: f32, sample_rate: f32) -> Self {
        let mut filter = Self {
            frequency: Ramp::new(frequency),
            q,
            sample_rate,
            coeffs: [0.0; 5],
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        };
        filter.update_coeffs(frequency);
        filter
    }

    fn update_coeffs(&mut self, frequency: f32) {
        let nyquist_guard = self.sample_rate * 0.49;
        let f0 = frequency.clamp(10.0, nyquist_guard);
        let w0 = TAU * f0 / self.sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * self.q.max(0.01));
        let a0 = 1.0 + alpha;
        let b1 = (1.0 - cos_w0) / a0;
        let b0 = b1 / 2.0;
        self.coeffs = [b0, b1, b0, (-2.0 * cos_w0) / a0, (1.0 - alpha) / a0];
    }

    /// Filter one sample at the ramped cutoff.
    pub fn process(&mut self, input: f32) -> f32 {
        if self.frequency.is_ramping() {
            let f = self.frequency.next();
            self.update_coeffs(f);
        }
        self.process_at(input, None)
    }

    /// Filter one sample, optionally overriding the cutoff for this sample
    /// (used by the pulse synth's filter envelope).
    pub fn process_at(&mut self, input: f32, cutoff: Option<f32>) -> f32 {
        if let Some(f) = cutoff {
            self.update_coeffs(f);
        }
        let [b0, b1, b2, a1, a2] = self.coeffs;
        let y = b0 * input + b1 * self.x1 + b2 * self.x2 - a1 * self.y1 - a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// Echo with feedback. The delay time may change at any time; reads
/// interpolate linearly between buffer slots.
#[derive(Clone, Debug)]
pub struct FeedbackDelay {
    buffer: Vec<f32>,
    write_idx: usize,
    delay_samples: f32,
    pub feedback: f32,
    pub wet: Ramp,
}

impl FeedbackDelay {
    pub fn new(max_seconds: f32, delay_seconds: f32, feedback: f32, wet: f32, sample_rate: f32) -> Self {
        let len = (max_seconds * sample_rate).ceil() as usize + 2;
        let mut delay = Self {
            buffer: vec![0.0; len],
            write_idx: 0,
            delay_samples: 1.0,
            feedback,
            wet: Ramp::new(wet),
        };
        delay.set_delay_seconds(delay_seconds, sample_rate);
        delay
    }

    pub fn set_delay_seconds(&mut self, seconds: f32, sample_rate: f32) {
        let max = (self.buffer.len() - 2) as f32;
        self.delay_samples = (seconds * sample_rate).clamp(1.0, max);
    }

    pub fn delay_seconds(&self, sample_rate: f32) -> f32 {
        self.delay_samples / sample_rate
    }

    fn read_tap(&self) -> f32 {
        let len = self.buffer.len();
        let pos = (self.write_idx as f32 - self.delay_samples).rem_euclid(len as f32);
        let idx0 = pos.floor() as usize % len;
        let idx1 = (idx0 + 1) % len;
        let frac = pos - pos.floor();
        self.buffer[idx0] + (self.buffer[idx1] - self.buffer[idx0]) * frac
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = self.read_tap();
        self.buffer[self.write_idx] = input + delayed * self.feedback;
        self.write_idx = (self.write_idx + 1) % self.buffer.len();
        let wet = self.wet.next();
        input * (1.0 - wet) + delayed * wet
    }
}

// ---------------------------------------------------------------------------
// Reverb
// ---------------------------------------------------------------------------

/// One non-zero sample of a sparse impulse response.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tap {
    pub delay: usize,
    pub gain: f32,
}

/// Generate a velvet-noise impulse response: one randomly placed, randomly
/// signed impulse per `sample_rate / density` segment, with gains decaying
/// by 60 dB over `decay` seconds, starting after `pre_delay` seconds.
/// Gains are normalised to unit energy.
pub fn reverb_taps(
    decay: f32,
    pre_delay: f32,
    density: f32,
    sample_rate: f32,
    rng: &mut FieldRng,
) -> Vec<Tap> {
    let segment = (sample_rate / density.max(1.0)).max(1.0) as usize;
    let length = (decay.max(0.01) * sample_rate) as usize;
    let offset = (pre_delay.max(0.0) * sample_rate) as usize;
    // ln(1000): a 60 dB fall over `decay` seconds.
    let k = 6.907_755 / decay.max(0.01);

    let mut taps = Vec::with_capacity(length / segment + 1);
    let mut start = 0;
    while start < length {
        let pos = start + rng.range_usize(0, segment);
        let t = pos as f32 / sample_rate;
        let sign = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
        taps.push(Tap {
            delay: offset + pos + 1,
            gain: sign * (-k * t).exp(),
        });
        start += segment;
    }

    let energy: f32 = taps.iter().map(|t| t.gain * t.gain).sum();
    if energy > 0.0 {
        let norm = energy.sqrt().recip();
        for tap in &mut taps {
            tap.gain *= norm;
        }
    }
    taps
}

/// Sparse-convolution reverb with a rampable wet level.
#[derive(Clone, Debug)]
pub struct Reverb {
    taps: Vec<Tap>,
    history: Vec<f32>,
    write_idx: usize,
    pub wet: Ramp,
}

impl Reverb {
    pub fn new(taps: Vec<Tap>, wet: f32) -> Self {
        let len = taps.iter().map(|t| t.delay).max().unwrap_or(0) + 1;
        Self {
            taps,
            history: vec![0.0; len],
            write_idx: 0,
            wet: Ramp::new(wet),
        }
    }

    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let len = self.history.len();
        self.history[self.write_idx] = input;
        let mut acc = 0.0;
        for tap in &self.taps {
            let idx = (self.write_idx + len - tap.delay % len) % len;
            acc += self.history[idx] * tap.gain;
        }
        self.write_idx = (self.write_idx + 1) % len;
        let wet = self.wet.next();
        input * (1.0 - wet) + acc * wet
    }
}
