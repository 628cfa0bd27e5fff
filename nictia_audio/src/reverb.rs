// Background reverb generation.
//
// Building the reverb's impulse response is the one expensive step of
// engine startup, so it never happens on the render path. `spawn` hands a
// `ReverbSpec` to a `ReverbBuilder` on a worker thread and returns a
// `PendingReverb` holding the receiving end of a channel plus a deadline.
// The engine checks the pending build without blocking on every render;
// past the deadline the build is abandoned (its result, if it ever arrives,
// is dropped with the channel) and the engine carries on without reverb.
//
// Outcomes are final for the session: a disabled reverb is never retried.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use nictia_prng::FieldRng;
use serde::{Deserialize, Serialize};

use crate::dsp::{Tap, reverb_taps};
use crate::error::AudioError;

/// Everything needed to generate an impulse response.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReverbSpec {
    pub decay: f32,
    pub pre_delay: f32,
    pub density: f32,
    pub sample_rate: f32,
    pub seed: u64,
}

/// Produces the impulse response. Runs on a worker thread.
pub trait ReverbBuilder: Send + Sync {
    fn build(&self, spec: &ReverbSpec) -> Result<Vec<Tap>, AudioError>;
}

/// Velvet-noise response, see `dsp::reverb_taps`.
#[derive(Clone, Copy, Debug, Default)]
pub struct VelvetReverbBuilder;

impl ReverbBuilder for VelvetReverbBuilder {
    fn build(&self, spec: &ReverbSpec) -> Result<Vec<Tap>, AudioError> {
        if !(spec.decay > 0.0 && spec.sample_rate > 0.0) {
            return Err(AudioError::ReverbBuild(format!(
                "invalid decay {} at {} Hz",
                spec.decay, spec.sample_rate
            )));
        }
        let mut rng = FieldRng::new(spec.seed);
        Ok(reverb_taps(
            spec.decay,
            spec.pre_delay,
            spec.density,
            spec.sample_rate,
            &mut rng,
        ))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisabledReason {
    /// The device profile asked for no reverb; generation never started.
    SkippedByProfile,
    TimedOut,
    BuildFailed(String),
    /// The worker could not be started or vanished without reporting.
    WorkerLost,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReverbStatus {
    NotRequested,
    Generating,
    Active,
    Disabled(DisabledReason),
}

impl ReverbStatus {
    /// True once the status can no longer change.
    pub fn is_settled(&self) -> bool {
        matches!(self, ReverbStatus::Active | ReverbStatus::Disabled(_))
    }
}

/// What a pending build has come to.
pub(crate) enum BuildPoll {
    Pending,
    Ready(Vec<Tap>),
    Failed(DisabledReason),
}

pub(crate) struct PendingReverb {
    rx: Receiver<Result<Vec<Tap>, AudioError>>,
    deadline: Instant,
    timeout: Duration,
}

impl PendingReverb {
    /// Start `builder` on a worker thread with `timeout` to finish.
    pub(crate) fn spawn(
        builder: Arc<dyn ReverbBuilder>,
        spec: ReverbSpec,
        timeout: Duration,
    ) -> Result<Self, AudioError> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("nictia-reverb".into())
            .spawn(move || {
                let started = Instant::now();
                let result = builder.build(&spec);
                log::debug!(
                    "reverb build finished in {:?} ({})",
                    started.elapsed(),
                    if result.is_ok() { "ok" } else { "error" }
                );
                // Receiver dropped means the build was abandoned.
                let _ = tx.send(result);
            })
            .map_err(AudioError::Spawn)?;
        Ok(Self {
            rx,
            deadline: Instant::now() + timeout,
            timeout,
        })
    }

    #[cfg(test)]
    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Non-blocking check.
    pub(crate) fn poll(&self) -> BuildPoll {
        match self.rx.try_recv() {
            Ok(result) => self.settle(result),
            Err(TryRecvError::Empty) if Instant::now() >= self.deadline => self.timed_out(),
            Err(TryRecvError::Empty) => BuildPoll::Pending,
            Err(TryRecvError::Disconnected) => BuildPoll::Failed(DisabledReason::WorkerLost),
        }
    }

    /// Block for at most `wait`, never past the deadline.
    pub(crate) fn wait(&self, wait: Duration) -> BuildPoll {
        let until_deadline = self.deadline.saturating_duration_since(Instant::now());
        match self.rx.recv_timeout(wait.min(until_deadline)) {
            Ok(result) => self.settle(result),
            Err(RecvTimeoutError::Timeout) if Instant::now() >= self.deadline => self.timed_out(),
            Err(RecvTimeoutError::Timeout) => BuildPoll::Pending,
            Err(RecvTimeoutError::Disconnected) => BuildPoll::Failed(DisabledReason::WorkerLost),
        }
    }

    fn settle(&self, result: Result<Vec<Tap>, AudioError>) -> BuildPoll {
        match result {
            Ok(taps) => BuildPoll::Ready(taps),
            Err(e) => BuildPoll::Failed(DisabledReason::BuildFailed(e.to_string())),
        }
    }

    fn timed_out(&self) -> BuildPoll {
        log::warn!("{}", AudioError::ReverbTimeout(self.timeout));
        BuildPoll::Failed(DisabledReason::TimedOut)
    }
}
