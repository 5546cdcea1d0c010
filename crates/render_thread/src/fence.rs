use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering, fence};

use render_command::{RenderCommand, RenderCommandError};

use crate::health::{RenderThreadError, RenderThreadHealth};

/// Counter of fence commands that were enqueued and have not executed yet.
///
/// Fences share the counter, so waiting for `0` waits for every fence begun
/// on this value, and every command enqueued before them.
#[derive(Debug, Clone, Default)]
pub struct CompletionFence {
    pending: Arc<AtomicU32>,
}

impl CompletionFence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.pending() == 0
    }

    pub(crate) fn arm(&self) -> FenceCommand {
        self.pending.fetch_add(1, Ordering::AcqRel);
        FenceCommand {
            pending: Arc::clone(&self.pending),
        }
    }

    /// Undoes [`Self::arm`] when the fence command never reached the ring.
    pub(crate) fn disarm(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    /// Yields until at most `max_remaining` fences are outstanding.
    pub fn wait(
        &self,
        health: &RenderThreadHealth,
        max_remaining: u32,
    ) -> Result<(), RenderThreadError> {
        loop {
            if self.pending() <= max_remaining {
                return Ok(());
            }
            health.check()?;
            std::thread::yield_now();
        }
    }
}

pub(crate) struct FenceCommand {
    pending: Arc<AtomicU32>,
}

impl<Context> RenderCommand<Context> for FenceCommand {
    fn execute(self: Box<Self>, _context: &mut Context) -> Result<(), RenderCommandError> {
        fence(Ordering::Release);
        self.pending.fetch_sub(1, Ordering::Release);
        Ok(())
    }

    fn label(&self) -> &'static str {
        "completion_fence"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn armed_fence_completes_when_its_command_runs() {
        let completion = CompletionFence::new();
        let command = completion.arm();
        assert_eq!(completion.pending(), 1);

        Box::new(command).execute(&mut ()).expect("fence command");
        assert_eq!(completion.pending(), 0);
        assert!(completion.is_complete());
    }

    #[test]
    fn wait_returns_immediately_within_threshold() {
        let completion = CompletionFence::new();
        let _first = completion.arm();
        let _second = completion.arm();

        let health = RenderThreadHealth::new();
        assert_eq!(completion.wait(&health, 2), Ok(()));
        completion.disarm();
        assert_eq!(completion.wait(&health, 1), Ok(()));
    }

    #[test]
    fn wait_reports_fault_instead_of_spinning() {
        let completion = CompletionFence::new();
        let _pending = completion.arm();
        let health = RenderThreadHealth::new();
        health.record_fault("lost device".to_owned());

        assert_eq!(
            completion.wait(&health, 0),
            Err(RenderThreadError::Faulted {
                diagnostics: "lost device".to_owned(),
            })
        );
        assert_eq!(
            completion.wait(&health, 0),
            Err(RenderThreadError::FaultAlreadyReported)
        );
    }
}
