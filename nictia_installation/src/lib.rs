// nictia_installation: the installation as one headless process.
//
// Wires `nictia_env`, `nictia_audio` and `nictia_field` into a frame loop
// and exposes it as a library (for tests and embedding) and as the `nictia`
// binary.
//
// Module overview:
// - `session.rs`: Installation (staged startup, per-frame advance, run
//                 summaries), Sources, FrameReport, SessionSummary.
// - `config.rs`:  InstallationConfig and SessionConfig, loaded from JSON.
// - `main.rs`:    CLI entry point.

pub mod config;
pub mod session;

pub use config::{ConfigError, InstallationConfig, SessionConfig};
pub use session::{FrameReport, Installation, SessionSummary, Sources};
