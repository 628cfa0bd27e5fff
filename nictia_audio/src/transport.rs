// Shared musical clock and the loops scheduled against it.
//
// The transport counts beats (quarter notes, 4/4) at a tempo that can be
// ramped while running. Loops fire whenever the beat position crosses their
// next scheduled beat; they are independent of each other and only share
// this clock. Everything advances one sample at a time from the engine's
// render loop, so firing is sample-accurate and reproducible.

use serde::{Deserialize, Serialize};

use crate::dsp::Ramp;

/// A musical duration in 4/4 time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteValue {
    Measures(u32),
    Half,
    Quarter,
    DottedEighth,
    Eighth,
    Sixteenth,
}

impl NoteValue {
    /// Length in quarter-note beats.
    pub fn beats(self) -> f64 {
        match self {
            NoteValue::Measures(n) => 4.0 * f64::from(n),
            NoteValue::Half => 2.0,
            NoteValue::Quarter => 1.0,
            NoteValue::DottedEighth => 0.75,
            NoteValue::Eighth => 0.5,
            NoteValue::Sixteenth => 0.25,
        }
    }

    pub fn seconds(self, bpm: f32) -> f32 {
        (self.beats() * 60.0 / f64::from(bpm.max(1.0))) as f32
    }

    pub fn samples(self, bpm: f32, sample_rate: f32) -> u64 {
        (self.seconds(bpm) * sample_rate).round() as u64
    }
}

#[derive(Clone, Debug)]
pub struct Transport {
    pub bpm: Ramp,
    position: f64,
    running: bool,
    sample_rate: f32,
}

impl Transport {
    pub fn new(bpm: f32, sample_rate: f32) -> Self {
        Self {
            bpm: Ramp::new(bpm),
            position: 0.0,
            running: false,
            sample_rate,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Current position in beats.
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stop and rewind to beat 0.
    pub fn stop(&mut self) {
        self.running = false;
        self.position = 0.0;
    }

    /// Advance one sample. The tempo ramp keeps moving while stopped so a
    /// retarget issued during a pause still lands on time.
    pub fn tick(&mut self) {
        let bpm = self.bpm.next();
        if self.running {
            self.position += f64::from(bpm) / 60.0 / f64::from(self.sample_rate);
        }
    }
}

/// Which of the three composition loops a schedule drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    Drone,
    Pulse,
    Noise,
}

impl LoopKind {
    pub const ALL: [LoopKind; 3] = [LoopKind::Drone, LoopKind::Pulse, LoopKind::Noise];
}

/// A callback slot that fires every `interval` beats once started.
#[derive(Clone, Debug)]
pub struct Loop {
    pub kind: LoopKind,
    interval: f64,
    next_beat: Option<f64>,
}

impl Loop {
    pub fn new(kind: LoopKind, interval: NoteValue) -> Self {
        Self {
            kind,
            interval: interval.beats(),
            next_beat: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_beat.is_some()
    }

    pub fn interval_beats(&self) -> f64 {
        self.interval
    }

    /// Schedule the first firing at `beat`.
    pub fn start(&mut self, beat: f64) {
        self.next_beat = Some(beat);
    }

    pub fn stop(&mut self) {
        self.next_beat = None;
    }

    /// Returns true (at most once per call) if the transport has reached the
    /// next scheduled beat, and schedules the following one.
    pub fn poll(&mut self, position: f64) -> bool {
        match self.next_beat {
            Some(beat) if position >= beat => {
                let mut next = beat + self.interval;
                // A long stall (or a tempo jump) must not produce a burst of
                // catch-up firings.
                while next <= position {
                    next += self.interval;
                }
                self.next_beat = Some(next);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_values_in_beats() {
        assert_eq!(NoteValue::Measures(2).beats(), 8.0);
        assert_eq!(NoteValue::DottedEighth.beats(), 0.75);
        assert!((NoteValue::Quarter.seconds(120.0) - 0.5).abs() < 1e-6);
        assert_eq!(NoteValue::Eighth.samples(60.0, 8000.0), 4000);
    }

    #[test]
    fn transport_only_moves_while_running() {
        let mut t = Transport::new(120.0, 1000.0);
        for _ in 0..500 {
            t.tick();
        }
        assert_eq!(t.position(), 0.0);
        t.start();
        for _ in 0..500 {
            t.tick();
        }
        assert!((t.position() - 1.0).abs() < 1e-9);
        t.stop();
        assert_eq!(t.position(), 0.0);
    }

    #[test]
    fn loop_fires_on_its_grid() {
        let mut t = Transport::new(120.0, 1000.0);
        let mut l = Loop::new(LoopKind::Pulse, NoteValue::Eighth);
        l.start(0.0);
        t.start();
        let mut fired = 0;
        // Two seconds at 120 bpm is four beats, eight eighths. The first
        // firing happens at beat 0 before any tick.
        for _ in 0..2000 {
            if l.poll(t.position()) {
                fired += 1;
            }
            t.tick();
        }
        assert_eq!(fired, 8);
    }

    #[test]
    fn stopped_loop_never_fires() {
        let mut l = Loop::new(LoopKind::Noise, NoteValue::Quarter);
        assert!(!l.poll(100.0));
        l.start(0.0);
        l.stop();
        assert!(!l.poll(100.0));
    }

    #[test]
    fn stall_does_not_burst() {
        let mut l = Loop::new(LoopKind::Drone, NoteValue::Quarter);
        l.start(0.0);
        assert!(l.poll(10.5));
        assert!(!l.poll(10.6));
        assert!(l.poll(11.0));
    }
}
