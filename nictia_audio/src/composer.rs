// Probabilistic composition.
//
// Three independent gesture generators, one per loop. Each loop firing asks
// the composer what (if anything) to play; the composer rolls against its
// own `FieldRng` and returns a `Gesture`. No gesture depends on any earlier
// one: the music's character comes from three uncoordinated random
// processes sharing only the transport grid.
//
// - drone: 2-3 notes drawn (with replacement) from C2 G2 C3 E3, held for a
//   quarter note, and half the time a lowpass retune to 500-2500 Hz over 4 s.
// - pulse: fires when a roll exceeds 0.4; one note from the C major
//   pentatonic in octave 2, 3 or 4, lasting a sixteenth, eighth or quarter.
// - noise: fires when a roll exceeds 0.7; a quarter-note pink noise burst.
//
// Fired gestures are also logged as `CompositionEvent`s by the engine so a
// session can be exported to MIDI (see `midi.rs`).

use nictia_prng::FieldRng;
use serde::{Deserialize, Serialize};

use crate::transport::{LoopKind, NoteValue};

/// C2 G2 C3 E3.
pub const DRONE_NOTES: [u8; 4] = [36, 43, 48, 52];
/// C D E G A as semitones above C.
pub const PENTATONIC: [u8; 5] = [0, 2, 4, 7, 9];
pub const PULSE_OCTAVES: [u8; 3] = [2, 3, 4];
pub const PULSE_DURATIONS: [NoteValue; 3] =
    [NoteValue::Sixteenth, NoteValue::Eighth, NoteValue::Quarter];

const PULSE_GATE: f64 = 0.4;
const NOISE_GATE: f64 = 0.7;
const RETUNE_GATE: f64 = 0.5;
const RETUNE_MIN_HZ: f32 = 500.0;
const RETUNE_SPAN_HZ: f32 = 2000.0;
pub const RETUNE_SECONDS: f32 = 4.0;

/// MIDI note number for a pitch class in a scientific-pitch octave (C4 = 60).
pub fn note_number(pitch_class: u8, octave: u8) -> u8 {
    12 * (octave + 1) + pitch_class
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Gesture {
    Drone {
        notes: Vec<u8>,
        duration: NoteValue,
        /// New lowpass cutoff, ramped over `RETUNE_SECONDS`.
        filter_retune: Option<f32>,
    },
    Pulse {
        note: u8,
        duration: NoteValue,
    },
    Noise {
        duration: NoteValue,
    },
}

impl Gesture {
    pub fn kind(&self) -> LoopKind {
        match self {
            Gesture::Drone { .. } => LoopKind::Drone,
            Gesture::Pulse { .. } => LoopKind::Pulse,
            Gesture::Noise { .. } => LoopKind::Noise,
        }
    }

    pub fn duration(&self) -> NoteValue {
        match self {
            Gesture::Drone { duration, .. }
            | Gesture::Pulse { duration, .. }
            | Gesture::Noise { duration } => *duration,
        }
    }
}

/// A gesture as it was played: when, and at what tempo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositionEvent {
    /// Sample index on the engine's render timeline.
    pub sample: u64,
    pub bpm: f32,
    pub gesture: Gesture,
}

#[derive(Clone, Debug)]
pub struct Composer {
    rng: FieldRng,
}

impl Composer {
    pub fn new(rng: FieldRng) -> Self {
        Self { rng }
    }

    /// Dispatch on the loop that fired.
    pub fn gesture_for(&mut self, kind: LoopKind) -> Option<Gesture> {
        match kind {
            LoopKind::Drone => Some(self.drone_gesture()),
            LoopKind::Pulse => self.pulse_gesture(),
            LoopKind::Noise => self.noise_gesture(),
        }
    }

    pub fn drone_gesture(&mut self) -> Gesture {
        let count = self.rng.range_usize(2, 4);
        let notes = (0..count)
            .filter_map(|_| self.rng.choose(&DRONE_NOTES).copied())
            .collect();
        let filter_retune = if self.rng.next_f64() > RETUNE_GATE {
            Some(RETUNE_MIN_HZ + self.rng.next_f32() * RETUNE_SPAN_HZ)
        } else {
            None
        };
        Gesture::Drone {
            notes,
            duration: NoteValue::Quarter,
            filter_retune,
        }
    }

    pub fn pulse_gesture(&mut self) -> Option<Gesture> {
        if self.rng.next_f64() <= PULSE_GATE {
            return None;
        }
        let pitch_class = *self.rng.choose(&PENTATONIC)?;
        let octave = *self.rng.choose(&PULSE_OCTAVES)?;
        let duration = *self.rng.choose(&PULSE_DURATIONS)?;
        Some(Gesture::Pulse {
            note: note_number(pitch_class, octave),
            duration,
        })
    }

    pub fn noise_gesture(&mut self) -> Option<Gesture> {
        if self.rng.next_f64() <= NOISE_GATE {
            return None;
        }
        Some(Gesture::Noise {
            duration: NoteValue::Quarter,
        })
    }
}
