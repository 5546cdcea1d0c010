use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RenderThreadState {
    Stopped = 0,
    Running = 1,
    Idling = 2,
    Suspended = 3,
    Faulted = 4,
}

impl RenderThreadState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Idling,
            3 => Self::Suspended,
            4 => Self::Faulted,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderThreadError {
    #[error("render thread faulted: {diagnostics}")]
    Faulted { diagnostics: String },
    #[error("render thread fault was already reported")]
    FaultAlreadyReported,
    #[error("render thread exited without recording a fault")]
    WorkerGone,
    #[error("render thread could not be joined")]
    JoinFailed,
}

/// Health shared between the worker and the producer.
///
/// The worker publishes diagnostics before clearing `healthy`; a producer that
/// observes `healthy == false` with acquire ordering always sees them.
#[derive(Debug)]
pub struct RenderThreadHealth {
    healthy: AtomicBool,
    fault_reported: AtomicBool,
    state: AtomicU8,
    diagnostics: Mutex<Option<String>>,
}

impl Default for RenderThreadHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderThreadHealth {
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            fault_reported: AtomicBool::new(false),
            state: AtomicU8::new(RenderThreadState::Stopped as u8),
            diagnostics: Mutex::new(None),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RenderThreadState {
        RenderThreadState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: RenderThreadState) {
        if self.state() == RenderThreadState::Faulted {
            return;
        }
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn record_fault(&self, diagnostics: String) {
        log::error!("render thread fault: {diagnostics}");
        *self
            .diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(diagnostics);
        self.state
            .store(RenderThreadState::Faulted as u8, Ordering::Release);
        self.healthy.store(false, Ordering::Release);
    }

    pub fn diagnostics(&self) -> Option<String> {
        if self.is_healthy() {
            return None;
        }
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The first caller after a fault receives the diagnostics, every later
    /// caller receives [`RenderThreadError::FaultAlreadyReported`].
    pub fn check(&self) -> Result<(), RenderThreadError> {
        if self.is_healthy() {
            return Ok(());
        }
        if self.fault_reported.swap(true, Ordering::AcqRel) {
            return Err(RenderThreadError::FaultAlreadyReported);
        }
        let diagnostics = self.diagnostics().unwrap_or_default();
        log::error!("render thread is unhealthy: {diagnostics}");
        Err(RenderThreadError::Faulted { diagnostics })
    }
}
