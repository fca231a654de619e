//! Deferral of shutdown requests across critical sections.
//!
//! A consumer wraps each claimed event in a critical section so that a
//! shutdown request arriving mid-event is honored only once the event has
//! been fully processed (or rolled back and requeued). This does not help
//! against SIGKILL or losing power.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::info;

/// A process-termination request, ordered by urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShutdownSignal {
    /// SIGINT, e.g. Ctrl+C.
    Interrupt,
    /// SIGTERM, e.g. from a process supervisor.
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
        }
    }
}

#[derive(Debug, Default)]
struct GateState {
    depth: usize,
    pending: Option<ShutdownSignal>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<GateState>,
    delivered: watch::Sender<Option<ShutdownSignal>>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, signal: ShutdownSignal) {
        self.delivered.send_if_modified(|current| {
            if current.is_none_or(|existing| signal > existing) {
                *current = Some(signal);
                true
            } else {
                false
            }
        });
    }
}

/// Gate through which shutdown requests reach the rest of the process.
///
/// Outside a critical section a request is delivered immediately. Inside one
/// it is buffered, keeping only the most urgent request, and delivered when
/// the outermost section ends. Sections may nest.
#[derive(Debug, Clone)]
pub struct SignalGate {
    inner: Arc<Inner>,
}

impl SignalGate {
    /// Creates a gate with no delivered or pending signal.
    #[must_use]
    pub fn new() -> Self {
        let (delivered, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(GateState::default()),
                delivered,
            }),
        }
    }

    /// Requests shutdown.
    pub fn request(&self, signal: ShutdownSignal) {
        let mut state = self.inner.state();
        if state.depth > 0 {
            info!(%signal, "capturing and delaying signal until the end of a critical block");
            state.pending = state.pending.max(Some(signal));
        } else {
            drop(state);
            self.inner.deliver(signal);
        }
    }

    /// Enters a critical section that lasts until the returned guard drops.
    #[must_use = "the critical section ends when the guard is dropped"]
    pub fn defer(&self) -> DeferGuard {
        self.inner.state().depth += 1;
        DeferGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns true while at least one critical section is open.
    #[must_use]
    pub fn is_deferring(&self) -> bool {
        self.inner.state().depth > 0
    }

    /// The most urgent signal delivered so far, if any.
    #[must_use]
    pub fn delivered(&self) -> Option<ShutdownSignal> {
        *self.inner.delivered.borrow()
    }

    /// Returns true once any signal has been delivered.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.delivered().is_some()
    }

    /// Resolves once a signal has been delivered.
    pub async fn wait(&self) -> ShutdownSignal {
        let mut rx = self.inner.delivered.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            if let Some(signal) = current {
                return signal;
            }
            if rx.changed().await.is_err() {
                // The sender lives as long as `self`, so this is unreachable.
                return std::future::pending().await;
            }
        }
    }
}

impl Default for SignalGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for an open critical section. See [`SignalGate::defer`].
#[derive(Debug)]
pub struct DeferGuard {
    inner: Arc<Inner>,
}

impl Drop for DeferGuard {
    fn drop(&mut self) {
        let released = {
            let mut state = self.inner.state();
            state.depth = state.depth.saturating_sub(1);
            if state.depth == 0 {
                state.pending.take()
            } else {
                None
            }
        };
        if let Some(signal) = released {
            info!(%signal, "repeating captured signal (critical block finished)");
            self.inner.deliver(signal);
        }
    }
}
