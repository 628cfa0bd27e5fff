// Output host abstraction.
//
// The engine renders into caller-supplied buffers; whatever owns the sound
// device pulls those buffers. The one thing the engine needs from the host
// is permission to start: `resume()` is the user-gesture-gated context
// start, and a host may refuse it. The engine never retries a refused
// resume; the caller decides whether to ask again.

use crate::error::AudioError;

pub trait AudioHost: Send {
    /// Start (or confirm) the output context.
    fn resume(&mut self) -> Result<(), AudioError>;
    fn is_running(&self) -> bool;
}

/// A host with no device behind it. Rendering is driven entirely by the
/// caller, which is what tests and offline renders want.
#[derive(Clone, Debug, Default)]
pub struct OfflineHost {
    running: bool,
}

impl OfflineHost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioHost for OfflineHost {
    fn resume(&mut self) -> Result<(), AudioError> {
        self.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// A host that refuses to start, as a browser does outside a user gesture.
#[derive(Clone, Debug, Default)]
pub struct RefusingHost;

impl AudioHost for RefusingHost {
    fn resume(&mut self) -> Result<(), AudioError> {
        Err(AudioError::HostResume("not allowed outside a user gesture".into()))
    }

    fn is_running(&self) -> bool {
        false
    }
}
