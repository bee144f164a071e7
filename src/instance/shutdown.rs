//! Last-resort process termination after a failed core close

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

pub const DEFAULT_TERMINATION_DELAY: Duration = Duration::from_millis(500);

pub trait ProcessTerminator: Send + Sync {
    fn terminate(&self);
}

/// Exits the whole process
pub struct ExitProcess;

impl ProcessTerminator for ExitProcess {
    fn terminate(&self) {
        tracing::warn!("terminating process after failed core close");
        std::process::exit(0);
    }
}

/// What happens when the core refuses to close.
///
/// A core that failed to close may still hold its inbound listeners, so a secondary
/// process kills itself after `delay`. The primary process never does; its instances
/// only run tests and open no listeners.
#[derive(Clone)]
pub struct ShutdownPolicy {
    pub is_primary: bool,
    pub delay: Duration,
    pub terminator: Arc<dyn ProcessTerminator>,
}

impl ShutdownPolicy {
    pub fn primary() -> Self {
        Self {
            is_primary: true,
            ..Self::default()
        }
    }

    pub fn secondary() -> Self {
        Self::default()
    }

    pub fn with_terminator(mut self, terminator: Arc<dyn ProcessTerminator>) -> Self {
        self.terminator = terminator;
        self
    }

    /// Schedule termination, or `None` for the primary process.
    pub(crate) fn on_close_failure(&self) -> Option<JoinHandle<()>> {
        if self.is_primary {
            return None;
        }
        let deadline = Instant::now() + self.delay;
        let terminator = self.terminator.clone();
        Some(tokio::spawn(async move {
            sleep_until(deadline).await;
            terminator.terminate();
        }))
    }
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            is_primary: false,
            delay: DEFAULT_TERMINATION_DELAY,
            terminator: Arc::new(ExitProcess),
        }
    }
}

impl std::fmt::Debug for ShutdownPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownPolicy")
            .field("is_primary", &self.is_primary)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}
