// Frequency and waveform feed.
//
// Taps the master output (after volume and mute) and keeps the most recent
// samples in a ring. Readers poll:
//
// - `frequency_data()`: `bins` magnitudes in dB from a Blackman-windowed FFT
//   of the last `2 * bins` samples, smoothed across calls with a constant of
//   0.8 and floored at -100 dB.
// - `waveform_data()`: the last `waveform_samples` output samples, oldest
//   first.
//
// Silence reads as -100 dB in every bin.

use std::f32::consts::PI;

/// Floor for reported magnitudes, in dB.
pub const MIN_DECIBELS: f32 = -100.0;
const SMOOTHING: f32 = 0.8;

#[derive(Clone, Debug)]
pub struct Analyser {
    bins: usize,
    fft_size: usize,
    history: Vec<f32>,
    write_idx: usize,
    waveform_len: usize,
    window: Vec<f32>,
    smoothed: Vec<f32>,
}

impl Analyser {
    /// `bins` is rounded up to a power of two.
    pub fn new(bins: usize, waveform_samples: usize) -> Self {
        let bins = bins.max(1).next_power_of_two();
        let fft_size = bins * 2;
        let waveform_len = waveform_samples.max(1);
        let window = (0..fft_size)
            .map(|i| {
                let x = i as f32 / fft_size as f32;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();
        Self {
            bins,
            fft_size,
            history: vec![0.0; fft_size.max(waveform_len)],
            write_idx: 0,
            waveform_len,
            window,
            smoothed: vec![0.0; bins],
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn waveform_len(&self) -> usize {
        self.waveform_len
    }

    pub fn push(&mut self, sample: f32) {
        self.history[self.write_idx] = sample;
        self.write_idx = (self.write_idx + 1) % self.history.len();
    }

    /// The last `n` samples, oldest first.
    fn latest(&self, n: usize) -> impl Iterator<Item = f32> + '_ {
        let len = self.history.len();
        let start = (self.write_idx + len - n) % len;
        (0..n).map(move |i| self.history[(start + i) % len])
    }

    pub fn waveform_data(&self) -> Vec<f32> {
        self.latest(self.waveform_len).collect()
    }

    pub fn frequency_data(&mut self) -> Vec<f32> {
        let mut re: Vec<f32> = self
            .latest(self.fft_size)
            .zip(&self.window)
            .map(|(s, w)| s * w)
            .collect();
        let mut im = vec![0.0; self.fft_size];
        fft(&mut re, &mut im);

        let scale = 1.0 / self.fft_size as f32;
        self.smoothed
            .iter_mut()
            .enumerate()
            .map(|(k, prev)| {
                let mag = (re[k] * re[k] + im[k] * im[k]).sqrt() * scale;
                *prev = SMOOTHING * *prev + (1.0 - SMOOTHING) * mag;
                if *prev > 0.0 {
                    (20.0 * prev.log10()).max(MIN_DECIBELS)
                } else {
                    MIN_DECIBELS
                }
            })
            .collect()
    }
}

/// In-place iterative radix-2 FFT. Length must be a power of two.
fn fft(re: &mut [f32], im: &mut [f32]) {
    let n = re.len();
    debug_assert!(n.is_power_of_two() && im.len() == n);

    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f32;
        for start in (0..n).step_by(len) {
            for k in 0..len / 2 {
                let (sin, cos) = (angle * k as f32).sin_cos();
                let a = start + k;
                let b = a + len / 2;
                let tr = re[b] * cos - im[b] * sin;
                let ti = re[b] * sin + im[b] * cos;
                re[b] = re[a] - tr;
                im[b] = im[a] - ti;
                re[a] += tr;
                im[a] += ti;
            }
        }
        len <<= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fft_of_impulse_is_flat() {
        let mut re = vec![0.0; 8];
        let mut im = vec![0.0; 8];
        re[0] = 1.0;
        fft(&mut re, &mut im);
        for k in 0..8 {
            assert!((re[k] - 1.0).abs() < 1e-6);
            assert!(im[k].abs() < 1e-6);
        }
    }

    #[test]
    fn fft_finds_a_pure_tone() {
        let n = 64;
        let mut re: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * 5.0 * i as f32 / n as f32).cos())
            .collect();
        let mut im = vec![0.0; n];
        fft(&mut re, &mut im);
        let peak = (0..n / 2)
            .max_by(|&a, &b| re[a].hypot(im[a]).total_cmp(&re[b].hypot(im[b])))
            .unwrap();
        assert_eq!(peak, 5);
    }

    #[test]
    fn silence_reads_as_floor() {
        let mut a = Analyser::new(32, 128);
        assert_eq!(a.frequency_data(), vec![MIN_DECIBELS; 32]);
        assert_eq!(a.waveform_data(), vec![0.0; 128]);
    }

    #[test]
    fn tone_rises_above_floor_in_its_bin() {
        let mut a = Analyser::new(64, 256);
        // Bin 8 of a 128-point FFT.
        for i in 0..1024 {
            a.push((2.0 * PI * 8.0 * i as f32 / 128.0).sin());
        }
        let mut data = Vec::new();
        for _ in 0..20 {
            data = a.frequency_data();
        }
        let peak = (0..64).max_by(|&x, &y| data[x].total_cmp(&data[y])).unwrap();
        assert_eq!(peak, 8);
        assert!(data[8] > -20.0);
        assert!(data[30] < data[8] - 30.0);
    }

    #[test]
    fn waveform_is_latest_samples_in_order() {
        let mut a = Analyser::new(4, 4);
        for i in 0..10 {
            a.push(i as f32);
        }
        assert_eq!(a.waveform_data(), vec![6.0, 7.0, 8.0, 9.0]);
    }
}
