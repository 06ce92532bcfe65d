// ABOUTME: Build orchestration for Packer: pipeline passes, output emission and watch mode
// ABOUTME: Re-exports the orchestrator, its result type and the tracing bootstrap

pub mod packer;
pub mod performance;
pub mod telemetry;
pub mod watch;

pub use packer::{Packer, PackerResult, PackerState};
pub use performance::Performance;
pub use telemetry::init_tracing;
pub use watch::NotifyWatcher;
