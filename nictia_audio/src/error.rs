// Error type for the audio engine.
//
// Only the context and MIDI variants ever reach a caller. Reverb failures
// are recovered inside the engine (the reverb is disabled and a warning
// logged) and only show up as `ReverbStatus::Disabled`.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// An operation that needs a running context was called before
    /// `init_tone_context`.
    #[error("audio context has not been started")]
    ContextNotStarted,
    #[error("audio host refused to resume: {0}")]
    HostResume(String),
    #[error("reverb generation failed: {0}")]
    ReverbBuild(String),
    #[error("reverb generation exceeded {0:?}")]
    ReverbTimeout(Duration),
    #[error("failed to spawn reverb worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to write MIDI file {path}: {source}")]
    MidiWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
