//! Fake render contexts and recorders shared by the threaded tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use render_command::RenderCommandError;

use crate::{DeferredCleanup, IdleTickable, RenderThreadConfig, RenderThreadContext};

/// Records command output and suspend/resume hooks.
#[derive(Default)]
pub struct RecordingContext {
    pub log: String,
    pub events: Arc<Mutex<Vec<String>>>,
}

impl RecordingContext {
    pub fn with_events() -> (Self, Arc<Mutex<Vec<String>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let context = Self {
            log: String::new(),
            events: Arc::clone(&events),
        };
        (context, events)
    }

    pub fn record(&self, event: &str) {
        self.events
            .lock()
            .expect("events lock")
            .push(event.to_owned());
    }
}

impl RenderThreadContext for RecordingContext {
    fn on_suspend(&mut self) {
        self.record("suspend");
    }

    fn on_resume(&mut self) {
        self.record("resume");
    }
}

pub fn test_config() -> RenderThreadConfig {
    RenderThreadConfig {
        command_capacity: 64,
        idle_wait_millis: 2,
        suspend_poll_micros: 200,
        thread_name: "render_thread_test".to_owned(),
        ..RenderThreadConfig::default()
    }
}

/// Blocks the worker inside a command until the test opens the gate.
pub struct CommandGate {
    sender: Sender<()>,
}

impl CommandGate {
    pub fn new() -> (Self, Receiver<()>) {
        let (sender, receiver) = channel();
        (Self { sender }, receiver)
    }

    pub fn open(&self) {
        let _ = self.sender.send(());
    }
}

pub fn wait_at_gate(gate: &Receiver<()>) -> Result<(), RenderCommandError> {
    gate.recv_timeout(Duration::from_secs(10))
        .map_err(|_| RenderCommandError::new("gate was never opened"))
}

pub struct CountingTickable {
    pub ticks: Arc<AtomicUsize>,
}

impl IdleTickable<RecordingContext> for CountingTickable {
    fn tick(&mut self, _context: &mut RecordingContext, _delta: Duration) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct CleanupRecorder {
    pub finished: Arc<AtomicBool>,
}

impl DeferredCleanup for CleanupRecorder {
    fn finish_cleanup(self: Box<Self>) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

/// Raises its flag when dropped, wherever that happens.
pub struct DropFlag {
    pub dropped: Arc<AtomicBool>,
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

pub fn assert_within_timeout<F, R>(f: F, timeout: Duration, message: &str) -> R
where
    F: FnOnce() -> R,
{
    let start = std::time::Instant::now();
    let result = f();
    assert!(
        start.elapsed() < timeout,
        "operation timed out: {} (took {:?}, limit {:?})",
        message,
        start.elapsed(),
        timeout
    );
    result
}
