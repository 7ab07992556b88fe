//! Interrupt handling for the operator binary
//!
//! The first SIGINT/SIGTERM cancels the running toolchain process through
//! the runner's [`CancelFlag`]; the runner terminates the child and the
//! command fails with a cancellation error. A second signal exits at once.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crossforge_runner::CancelFlag;
use tracing::warn;

/// Exit code for a cancelled command
pub const EXIT_CODE_CANCELLED: i32 = 130;

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: cancel the running process
    Cancel,
    /// Second signal: exit without waiting
    ImmediateExit,
    /// Third+ signal
    Ignore,
}

/// Counts signals and trips the cancel flag on the first one.
#[derive(Debug)]
pub struct SignalState {
    cancel: CancelFlag,
    signal_count: AtomicU8,
}

impl SignalState {
    pub fn new(cancel: CancelFlag) -> Self {
        Self {
            cancel,
            signal_count: AtomicU8::new(0),
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Record a signal and return what to do about it.
    pub fn handle_signal(&self) -> SignalAction {
        match self.signal_count.fetch_add(1, Ordering::SeqCst) {
            0 => {
                self.cancel.cancel();
                SignalAction::Cancel
            }
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }
}

/// Installs the process-wide handler.
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    pub fn new(cancel: CancelFlag) -> Self {
        Self {
            state: Arc::new(SignalState::new(cancel)),
        }
    }

    pub fn state(&self) -> Arc<SignalState> {
        Arc::clone(&self.state)
    }

    /// Install handlers for SIGINT and SIGTERM. Call once at startup.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::Cancel => {
                warn!("interrupt received, stopping toolchain (repeat to exit immediately)");
            }
            SignalAction::ImmediateExit => {
                eprintln!("\nSecond interrupt, exiting");
                std::process::exit(EXIT_CODE_CANCELLED);
            }
            SignalAction::Ignore => {}
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = SignalState::new(CancelFlag::new());
        assert!(!state.is_cancel_requested());
        assert_eq!(state.signal_count(), 0);
    }

    #[test]
    fn test_first_signal_trips_shared_flag() {
        let flag = CancelFlag::new();
        let state = SignalState::new(flag.clone());

        assert_eq!(state.handle_signal(), SignalAction::Cancel);
        assert!(flag.is_cancelled());
        assert!(state.is_cancel_requested());
    }

    #[test]
    fn test_second_signal_exits_third_ignored() {
        let state = SignalState::new(CancelFlag::new());

        state.handle_signal();
        assert_eq!(state.handle_signal(), SignalAction::ImmediateExit);
        assert_eq!(state.handle_signal(), SignalAction::Ignore);
        assert_eq!(state.signal_count(), 3);
    }
}
