//! Bounded single-producer single-consumer queue of render commands.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use rtrb::{Consumer, PopError, Producer, PushError, RingBuffer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RenderCommandError {
    message: String,
}

impl RenderCommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Work executed on the render thread against the context it owns.
///
/// `execute` consumes the command, so its destructor runs right after it
/// finishes and on the same thread.
pub trait RenderCommand<Context>: Send + 'static {
    fn execute(self: Box<Self>, context: &mut Context) -> Result<(), RenderCommandError>;

    fn label(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<Context, F> RenderCommand<Context> for F
where
    F: FnOnce(&mut Context) -> Result<(), RenderCommandError> + Send + 'static,
{
    fn execute(self: Box<Self>, context: &mut Context) -> Result<(), RenderCommandError> {
        (*self)(context)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandChannelCreateError {
    #[error("command channel capacity must be greater than zero")]
    ZeroCapacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("command consumer was dropped")]
    ConsumerAbandoned,
    #[error("stopped waiting for a free command slot")]
    WaitAborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandChannelStats {
    pub enqueued_commands: u64,
    pub enqueued_bytes: u64,
    pub executed_commands: u64,
    pub executed_bytes: u64,
    /// Number of enqueues that found the ring full at least once.
    pub full_waits: u64,
}

struct QueuedCommand<Context> {
    command: Box<dyn RenderCommand<Context>>,
    footprint: usize,
}

struct ChannelShared {
    capacity: usize,
    notify_sender: Sender<()>,
    notify_receiver: Receiver<()>,
    enqueued_commands: AtomicU64,
    enqueued_bytes: AtomicU64,
    executed_commands: AtomicU64,
    executed_bytes: AtomicU64,
    full_waits: AtomicU64,
}

impl ChannelShared {
    fn stats(&self) -> CommandChannelStats {
        CommandChannelStats {
            enqueued_commands: self.enqueued_commands.load(Ordering::Relaxed),
            enqueued_bytes: self.enqueued_bytes.load(Ordering::Relaxed),
            executed_commands: self.executed_commands.load(Ordering::Relaxed),
            executed_bytes: self.executed_bytes.load(Ordering::Relaxed),
            full_waits: self.full_waits.load(Ordering::Relaxed),
        }
    }
}

fn command_footprint<Context: 'static>(command: &dyn RenderCommand<Context>) -> usize {
    std::mem::size_of::<QueuedCommand<Context>>() + std::mem::size_of_val(command)
}

pub struct CommandProducer<Context> {
    producer: Producer<QueuedCommand<Context>>,
    shared: Arc<ChannelShared>,
}

impl<Context: 'static> CommandProducer<Context> {
    /// Blocks while the ring is full. Fails only once the consumer is gone.
    pub fn enqueue<T>(&mut self, command: T) -> Result<(), EnqueueError>
    where
        T: RenderCommand<Context>,
    {
        self.enqueue_boxed_while(Box::new(command), || true)
    }

    pub fn enqueue_fn<F>(&mut self, command: F) -> Result<(), EnqueueError>
    where
        F: FnOnce(&mut Context) -> Result<(), RenderCommandError> + Send + 'static,
    {
        self.enqueue_boxed_while(Box::new(command), || true)
    }

    pub fn enqueue_while<T, W>(&mut self, command: T, keep_waiting: W) -> Result<(), EnqueueError>
    where
        T: RenderCommand<Context>,
        W: FnMut() -> bool,
    {
        self.enqueue_boxed_while(Box::new(command), keep_waiting)
    }

    /// Spins with `yield_now` while the ring is full, asking `keep_waiting`
    /// before every retry. A rejected command is dropped on this thread.
    pub fn enqueue_boxed_while<W>(
        &mut self,
        command: Box<dyn RenderCommand<Context>>,
        mut keep_waiting: W,
    ) -> Result<(), EnqueueError>
    where
        W: FnMut() -> bool,
    {
        if self.producer.is_abandoned() {
            return Err(EnqueueError::ConsumerAbandoned);
        }

        let footprint = command_footprint(command.as_ref());
        let mut pending_command = QueuedCommand { command, footprint };
        let mut reported_full = false;
        loop {
            match self.producer.push(pending_command) {
                Ok(()) => break,
                Err(PushError::Full(returned_command)) => {
                    pending_command = returned_command;
                    if self.producer.is_abandoned() {
                        return Err(EnqueueError::ConsumerAbandoned);
                    }
                    if !keep_waiting() {
                        return Err(EnqueueError::WaitAborted);
                    }
                    if !reported_full {
                        reported_full = true;
                        self.shared.full_waits.fetch_add(1, Ordering::Relaxed);
                        log::trace!(
                            "command ring full ({} slots), waiting for the consumer",
                            self.shared.capacity
                        );
                    }
                    self.wake_consumer();
                    std::thread::yield_now();
                }
            }
        }

        self.shared.enqueued_commands.fetch_add(1, Ordering::Relaxed);
        self.shared
            .enqueued_bytes
            .fetch_add(footprint as u64, Ordering::Relaxed);
        self.wake_consumer();
        Ok(())
    }

    /// Interrupts a consumer blocked in [`CommandConsumer::wait_for_command`].
    pub fn wake_consumer(&self) {
        match self.shared.notify_sender.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                log::warn!("command notify channel disconnected")
            }
        }
    }

    pub fn free_slots(&self) -> usize {
        self.producer.slots()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_consumer_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }

    pub fn stats(&self) -> CommandChannelStats {
        self.shared.stats()
    }
}

pub struct CommandConsumer<Context> {
    consumer: Consumer<QueuedCommand<Context>>,
    shared: Arc<ChannelShared>,
}

/// A command taken off the ring that has not run yet.
pub struct DequeuedCommand<'a, Context> {
    queued: QueuedCommand<Context>,
    shared: &'a ChannelShared,
}

impl<Context: 'static> DequeuedCommand<'_, Context> {
    pub fn label(&self) -> &'static str {
        self.queued.command.label()
    }

    pub fn footprint(&self) -> usize {
        self.queued.footprint
    }

    /// Runs and destroys the command, returning the bytes it occupied.
    pub fn execute(self, context: &mut Context) -> Result<usize, RenderCommandError> {
        let QueuedCommand { command, footprint } = self.queued;
        let result = command.execute(context);
        self.shared
            .executed_commands
            .fetch_add(1, Ordering::Relaxed);
        self.shared
            .executed_bytes
            .fetch_add(footprint as u64, Ordering::Relaxed);
        result.map(|()| footprint)
    }
}

impl<Context: 'static> CommandConsumer<Context> {
    pub fn try_dequeue(&mut self) -> Option<DequeuedCommand<'_, Context>> {
        match self.consumer.pop() {
            Ok(queued) => Some(DequeuedCommand {
                queued,
                shared: &self.shared,
            }),
            Err(PopError::Empty) => None,
        }
    }

    /// Waits until a command is available, the producer wakes us, or `timeout`
    /// elapses. Returns whether a command is ready.
    pub fn wait_for_command(&self, timeout: Duration) -> bool {
        if self.pending_commands() > 0 {
            return true;
        }
        if timeout.is_zero() {
            return false;
        }

        match self.shared.notify_receiver.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("command notify channel disconnected");
                std::thread::sleep(timeout);
            }
        }
        self.pending_commands() > 0
    }

    pub fn pending_commands(&self) -> usize {
        self.consumer.slots()
    }

    pub fn is_producer_abandoned(&self) -> bool {
        self.consumer.is_abandoned()
    }

    pub fn stats(&self) -> CommandChannelStats {
        self.shared.stats()
    }
}

pub fn create_command_channel<Context: 'static>(
    capacity: usize,
) -> Result<(CommandProducer<Context>, CommandConsumer<Context>), CommandChannelCreateError> {
    if capacity == 0 {
        return Err(CommandChannelCreateError::ZeroCapacity);
    }

    let (notify_sender, notify_receiver) = bounded(1);
    let shared = Arc::new(ChannelShared {
        capacity,
        notify_sender,
        notify_receiver,
        enqueued_commands: AtomicU64::new(0),
        enqueued_bytes: AtomicU64::new(0),
        executed_commands: AtomicU64::new(0),
        executed_bytes: AtomicU64::new(0),
        full_waits: AtomicU64::new(0),
    });
    let (producer, consumer) = RingBuffer::new(capacity);

    Ok((
        CommandProducer {
            producer,
            shared: Arc::clone(&shared),
        },
        CommandConsumer { consumer, shared },
    ))
}
