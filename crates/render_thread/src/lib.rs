//! Dedicated render thread that owns the render context and drains a command ring.

mod config;
mod fence;
mod health;
mod run_loop;
mod suspend;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use render_command::{
    CommandChannelCreateError, CommandChannelStats, CommandProducer, EnqueueError, RenderCommand,
    RenderCommandError, create_command_channel,
};
use thiserror::Error;

pub use config::{RenderThreadConfig, RenderThreadConfigError};
pub use fence::CompletionFence;
pub use health::{RenderThreadError, RenderThreadHealth, RenderThreadState};
pub use suspend::SuspendedRendering;

/// State owned by the render thread while it runs, usually the graphics device.
pub trait RenderThreadContext: Send + 'static {
    fn on_suspend(&mut self) {}

    fn on_resume(&mut self) {}
}

/// Low-priority work ticked while the render thread is idle.
pub trait IdleTickable<Context>: Send {
    fn tick(&mut self, context: &mut Context, delta: Duration);
}

/// An object the render thread may still reference. It is finished only after
/// the next flush proves the worker is done with it.
pub trait DeferredCleanup: Send + 'static {
    fn finish_cleanup(self: Box<Self>);
}

#[derive(Debug, Error)]
pub enum RenderThreadStartError {
    #[error(transparent)]
    Config(#[from] RenderThreadConfigError),
    #[error(transparent)]
    Channel(#[from] CommandChannelCreateError),
    #[error("failed to spawn render thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub(crate) struct RenderThreadShared {
    pub(crate) health: RenderThreadHealth,
    pub(crate) stop_requested: AtomicBool,
    pub(crate) suspend_requests: AtomicU32,
    pub(crate) suspend_acks: AtomicU64,
}

pub struct RenderThread<Context: RenderThreadContext> {
    producer: CommandProducer<Context>,
    shared: Arc<RenderThreadShared>,
    pending_cleanup: Vec<Box<dyn DeferredCleanup>>,
    suspend_poll: Duration,
    thread_name: String,
    join_handle: Option<JoinHandle<Context>>,
}

impl<Context: RenderThreadContext> RenderThread<Context> {
    /// Moves `context` onto a new worker thread. Until [`Self::stop`] returns
    /// it, only commands can touch the context.
    pub fn start(
        context: Context,
        config: RenderThreadConfig,
        tickables: Vec<Box<dyn IdleTickable<Context>>>,
    ) -> Result<Self, RenderThreadStartError> {
        config.validate()?;
        let (producer, consumer) = create_command_channel(config.command_capacity)?;

        let shared = Arc::new(RenderThreadShared {
            health: RenderThreadHealth::new(),
            stop_requested: AtomicBool::new(false),
            suspend_requests: AtomicU32::new(0),
            suspend_acks: AtomicU64::new(0),
        });
        shared.health.set_state(RenderThreadState::Running);
        let worker_shared = Arc::clone(&shared);
        let suspend_poll = config.suspend_poll();
        let thread_name = config.thread_name.clone();

        let join_handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                run_loop::render_thread_main(context, consumer, worker_shared, config, tickables)
            })?;

        Ok(Self {
            producer,
            shared,
            pending_cleanup: Vec::new(),
            suspend_poll,
            thread_name,
            join_handle: Some(join_handle),
        })
    }

    pub fn enqueue<T>(&mut self, command: T) -> Result<(), RenderThreadError>
    where
        T: RenderCommand<Context>,
    {
        self.enqueue_boxed(Box::new(command))
    }

    pub fn enqueue_fn<F>(&mut self, command: F) -> Result<(), RenderThreadError>
    where
        F: FnOnce(&mut Context) -> Result<(), RenderCommandError> + Send + 'static,
    {
        self.enqueue_boxed(Box::new(command))
    }

    /// Blocks while the ring is full, but gives up as soon as the worker faults.
    pub fn enqueue_boxed(
        &mut self,
        command: Box<dyn RenderCommand<Context>>,
    ) -> Result<(), RenderThreadError> {
        self.shared.health.check()?;
        let health = &self.shared.health;
        match self
            .producer
            .enqueue_boxed_while(command, || health.is_healthy())
        {
            Ok(()) => Ok(()),
            Err(EnqueueError::WaitAborted | EnqueueError::ConsumerAbandoned) => {
                self.shared.health.check()?;
                Err(RenderThreadError::WorkerGone)
            }
        }
    }

    pub fn begin_fence(&mut self, fence: &CompletionFence) -> Result<(), RenderThreadError> {
        let command = fence.arm();
        if let Err(error) = self.enqueue(command) {
            fence.disarm();
            return Err(error);
        }
        Ok(())
    }

    pub fn wait_fence(
        &self,
        fence: &CompletionFence,
        max_remaining: u32,
    ) -> Result<(), RenderThreadError> {
        fence.wait(&self.shared.health, max_remaining)
    }

    /// Waits for every command enqueued so far, then finishes the cleanup
    /// objects handed over before this call.
    pub fn flush(&mut self) -> Result<(), RenderThreadError> {
        let cleanup = std::mem::take(&mut self.pending_cleanup);
        let fence = CompletionFence::new();
        let result = self
            .begin_fence(&fence)
            .and_then(|()| self.wait_fence(&fence, 0));
        if !cleanup.is_empty() {
            log::debug!("finishing {} deferred cleanup objects", cleanup.len());
        }
        for object in cleanup {
            object.finish_cleanup();
        }
        result
    }

    pub fn begin_cleanup<T: DeferredCleanup>(&mut self, object: T) {
        if self.shared.health.is_healthy() {
            self.pending_cleanup.push(Box::new(object));
        } else {
            Box::new(object).finish_cleanup();
        }
    }

    /// Parks the worker after the commands already queued. The worker stays
    /// parked until the returned guard is dropped.
    pub fn request_suspend(&mut self) -> Result<SuspendedRendering<'_>, RenderThreadError> {
        let acks_before = self.shared.suspend_acks.load(Ordering::Acquire);
        let suspend_shared = Arc::clone(&self.shared);
        self.enqueue_fn(move |context: &mut Context| {
            context.on_suspend();
            suspend_shared
                .suspend_requests
                .fetch_add(1, Ordering::AcqRel);
            Ok(())
        })?;

        while self.shared.suspend_acks.load(Ordering::Acquire) == acks_before {
            self.shared.health.check()?;
            std::thread::sleep(self.suspend_poll);
        }

        self.enqueue_fn(|context: &mut Context| {
            context.on_resume();
            Ok(())
        })?;
        Ok(SuspendedRendering::new(&self.shared))
    }

    pub fn is_healthy(&self) -> bool {
        self.shared.health.is_healthy()
    }

    pub fn check_health(&self) -> Result<(), RenderThreadError> {
        self.shared.health.check()
    }

    pub fn health(&self) -> &RenderThreadHealth {
        &self.shared.health
    }

    pub fn state(&self) -> RenderThreadState {
        self.shared.health.state()
    }

    pub fn command_stats(&self) -> CommandChannelStats {
        self.producer.stats()
    }

    pub fn free_command_slots(&self) -> usize {
        self.producer.free_slots()
    }

    pub fn pending_cleanup_count(&self) -> usize {
        self.pending_cleanup.len()
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Drains the ring, joins the worker and hands the context back.
    pub fn stop(mut self) -> Result<Context, RenderThreadError> {
        let flush_result = self.flush();
        let context = self.join_worker()?;
        match flush_result {
            Ok(()) => {
                log::info!("render thread `{}` handed its context back", self.thread_name);
                Ok(context)
            }
            Err(error) => {
                log::warn!(
                    "dropping context of faulted render thread `{}`",
                    self.thread_name
                );
                Err(error)
            }
        }
    }

    fn join_worker(&mut self) -> Result<Context, RenderThreadError> {
        let Some(join_handle) = self.join_handle.take() else {
            return Err(RenderThreadError::WorkerGone);
        };
        self.shared.stop_requested.store(true, Ordering::Release);
        self.producer.wake_consumer();
        join_handle
            .join()
            .map_err(|_| RenderThreadError::JoinFailed)
    }
}

impl<Context: RenderThreadContext> Drop for RenderThread<Context> {
    fn drop(&mut self) {
        if self.join_handle.is_none() {
            return;
        }
        if let Err(error) = self.flush() {
            log::warn!("render thread `{}` flush on drop: {error}", self.thread_name);
        }
        if let Err(error) = self.join_worker() {
            log::error!("render thread `{}` join on drop: {error}", self.thread_name);
        }
    }
}
