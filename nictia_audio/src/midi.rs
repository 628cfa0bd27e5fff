// MIDI export of a session's composition.
//
// Converts the engine's recorded `CompositionEvent`s into a Standard MIDI
// File so a run can be inspected or replayed in a DAW. Output is SMF Format
// 1: a tempo track followed by one track per loop (drone, pulse, noise).
//
// Events are stamped with render-timeline sample indices, not beats, and the
// live tempo may have been ramping when they fired. Times are therefore
// converted through wall-clock seconds at a single reference tempo (the
// tempo of the first event), which keeps every note exactly where it sounded.
//
// Uses the `midly` crate for MIDI writing.

use std::path::Path;

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};

use crate::composer::{CompositionEvent, Gesture};
use crate::error::AudioError;
use crate::transport::LoopKind;

/// Ticks per quarter note in MIDI output.
const TICKS_PER_QUARTER: u16 = 480;

/// Key used for noise bursts on the noise track.
const NOISE_KEY: u8 = 60;

/// Track name, channel and General MIDI program for each loop.
fn track_layout(kind: LoopKind) -> (&'static [u8], u8, u8) {
    match kind {
        LoopKind::Drone => (&b"Drone"[..], 0, 89),
        LoopKind::Pulse => (&b"Pulse"[..], 1, 80),
        LoopKind::Noise => (&b"Noise"[..], 2, 122),
    }
}

/// Convert recorded events to MIDI and write to a file.
pub fn write_midi(
    events: &[CompositionEvent],
    sample_rate: u32,
    path: &Path,
) -> Result<(), AudioError> {
    let smf = events_to_smf(events, sample_rate);
    smf.save(path).map_err(|source| AudioError::MidiWrite {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("wrote {} composition events to {}", events.len(), path.display());
    Ok(())
}

/// Convert recorded events to an in-memory SMF.
pub fn events_to_smf(events: &[CompositionEvent], sample_rate: u32) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    let reference_bpm = events.first().map_or(120.0, |e| e.bpm).max(1.0);
    let ticks_per_second = f64::from(reference_bpm) / 60.0 * f64::from(TICKS_PER_QUARTER);
    let sample_rate = f64::from(sample_rate.max(1));
    let to_tick = |seconds: f64| (seconds * ticks_per_second).round() as u32;

    // Track 0: tempo track
    let tempo_microseconds = (60_000_000.0 / f64::from(reference_bpm)) as u32;
    smf.tracks.push(vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
        },
        end_of_track(),
    ]);

    for kind in LoopKind::ALL {
        let (name, channel, program) = track_layout(kind);
        let channel = u4::new(channel);

        // (absolute tick, is_note_on, key)
        let mut timeline: Vec<(u32, bool, u8)> = Vec::new();
        for event in events.iter().filter(|e| e.gesture.kind() == kind) {
            let start_s = event.sample as f64 / sample_rate;
            let length_s = f64::from(event.gesture.duration().seconds(event.bpm));
            let on = to_tick(start_s);
            let off = to_tick(start_s + length_s).max(on + 1);
            let keys: Vec<u8> = match &event.gesture {
                Gesture::Drone { notes, .. } => notes.clone(),
                Gesture::Pulse { note, .. } => vec![*note],
                Gesture::Noise { .. } => vec![NOISE_KEY],
            };
            for key in keys {
                timeline.push((on, true, key));
                timeline.push((off, false, key));
            }
        }
        // Note-offs sort before note-ons on the same tick, so a repeated
        // pitch is closed before it is struck again.
        timeline.sort_by_key(|&(tick, is_on, key)| (tick, is_on, key));

        let mut track: Track<'static> = Vec::with_capacity(timeline.len() + 3);
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(name)),
        });
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::new(program),
                },
            },
        });

        let mut last_tick = 0;
        for (tick, is_on, key) in timeline {
            let message = if is_on {
                MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(80),
                }
            } else {
                MidiMessage::NoteOff {
                    key: u7::new(key),
                    vel: u7::new(0),
                }
            };
            track.push(TrackEvent {
                delta: u28::new(tick - last_tick),
                kind: TrackEventKind::Midi { channel, message },
            });
            last_tick = tick;
        }
        track.push(end_of_track());
        smf.tracks.push(track);
    }

    smf
}

fn end_of_track() -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::NoteValue;

    fn event(sample: u64, gesture: Gesture) -> CompositionEvent {
        CompositionEvent {
            sample,
            bpm: 120.0,
            gesture,
        }
    }

    fn note_ons(track: &Track<'_>) -> Vec<(u32, u8)> {
        let mut tick = 0;
        let mut out = Vec::new();
        for ev in track {
            tick += ev.delta.as_int();
            if let TrackEventKind::Midi {
                message: MidiMessage::NoteOn { key, .. },
                ..
            } = &ev.kind
            {
                out.push((tick, key.as_int()));
            }
        }
        out
    }

    #[test]
    fn one_track_per_loop_plus_tempo() {
        let smf = events_to_smf(&[], 44_100);
        assert_eq!(smf.tracks.len(), 4);
    }

    #[test]
    fn events_land_on_their_tracks_at_the_right_ticks() {
        let sr = 1000;
        let events = vec![
            event(
                0,
                Gesture::Drone {
                    notes: vec![36, 43],
                    duration: NoteValue::Quarter,
                    filter_retune: None,
                },
            ),
            // Half a second at 120 bpm is one beat.
            event(
                500,
                Gesture::Pulse {
                    note: 60,
                    duration: NoteValue::Sixteenth,
                },
            ),
            event(
                1000,
                Gesture::Noise {
                    duration: NoteValue::Quarter,
                },
            ),
        ];
        let smf = events_to_smf(&events, sr);
        assert_eq!(note_ons(&smf.tracks[1]), vec![(0, 36), (0, 43)]);
        assert_eq!(note_ons(&smf.tracks[2]), vec![(480, 60)]);
        assert_eq!(note_ons(&smf.tracks[3]), vec![(960, NOISE_KEY)]);
    }

    #[test]
    fn repeated_pitch_is_closed_before_restrike() {
        let drone = |sample| {
            event(
                sample,
                Gesture::Drone {
                    notes: vec![48],
                    duration: NoteValue::Quarter,
                    filter_retune: None,
                },
            )
        };
        // Second strike exactly when the first note ends.
        let smf = events_to_smf(&[drone(0), drone(500)], 1000);
        let kinds: Vec<bool> = smf.tracks[1]
            .iter()
            .filter_map(|ev| match &ev.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { .. },
                    ..
                } => Some(true),
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOff { .. },
                    ..
                } => Some(false),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![true, false, true, false]);
    }

    #[test]
    fn write_midi_creates_a_file() {
        let path = std::env::temp_dir().join(format!("nictia_midi_{}.mid", std::process::id()));
        let events = vec![event(
            0,
            Gesture::Pulse {
                note: 48,
                duration: NoteValue::Eighth,
            },
        )];
        write_midi(&events, 8000, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"MThd");
        let _ = std::fs::remove_file(&path);
    }
}
