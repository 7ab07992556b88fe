//! crossforge process runner
//!
//! Executes toolchain and obfuscator binaries with a fully specified
//! environment, captures stdout and stderr separately, and attaches a
//! diagnostic record to every failure.
//!
//! The crate can be used in two modes:
//! - **System runner**: spawns real processes with deadline and
//!   cancellation enforcement
//! - **Scripted runner**: records invocations and replays canned
//!   responses, for orchestrator tests

pub mod diagnostics;
pub mod error;
pub mod invocation;
pub mod mock;
pub mod system;

pub use diagnostics::{redact_url_credentials, Diagnostics, ExitSummary};
pub use error::{RunError, RunResult};
pub use invocation::{Invocation, RunOutput};
pub use mock::{ScriptedResponse, ScriptedRunner};
pub use system::{CancelFlag, SystemRunner, DEFAULT_TERMINATION_GRACE_SECONDS};

/// Executes a fully described process invocation.
///
/// Implementations must not consult the parent environment: the
/// invocation's `env` is the child's complete environment.
pub trait ProcessRunner: Send + Sync {
    /// Run the invocation to completion and return its captured output.
    fn run(&self, invocation: &Invocation) -> RunResult<RunOutput>;
}
