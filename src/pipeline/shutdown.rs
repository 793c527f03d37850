//! Shutdown Coordinator
//!
//! Single stop flag checked by the executor between stages and by
//! long-running stages at loop boundaries. First signal drains
//! cooperatively to the next checkpoint; a second signal within the
//! escalation window aborts immediately (the last checkpoint stays
//! valid).

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::constants::shutdown as shutdown_constants;

/// How a stop request should be honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    /// Finish the current stage, checkpoint, then synthesize and exit
    Drain,
    /// Stop now; the last written checkpoint is the resume point
    Abort,
}

/// Cooperative shutdown flag with double-signal escalation.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    should_stop: AtomicBool,
    aborted: AtomicBool,
    first_signal_at: Mutex<Option<Instant>>,
    escalation_window: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_millis(shutdown_constants::ESCALATION_WINDOW_MS))
    }
}

impl ShutdownCoordinator {
    pub fn new(escalation_window: Duration) -> Self {
        Self {
            should_stop: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            first_signal_at: Mutex::new(None),
            escalation_window,
        }
    }

    /// Register an external signal; returns how to honor it.
    pub fn signal(&self) -> StopKind {
        let mut first = self
            .first_signal_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match *first {
            Some(at) if at.elapsed() <= self.escalation_window => {
                tracing::warn!("second interrupt, aborting immediately");
                self.aborted.store(true, Ordering::SeqCst);
                self.should_stop.store(true, Ordering::SeqCst);
                StopKind::Abort
            }
            _ => {
                tracing::info!("interrupt received, draining to next checkpoint");
                *first = Some(Instant::now());
                self.should_stop.store(true, Ordering::SeqCst);
                StopKind::Drain
            }
        }
    }

    /// Cooperative check: stages and the executor poll this.
    pub fn should_stop(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }

    /// Hard-abort check: set only by an escalated second signal.
    pub fn aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}
