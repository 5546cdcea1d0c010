use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use render_command::CommandConsumer;

use crate::config::RenderThreadConfig;
use crate::health::RenderThreadState;
use crate::{IdleTickable, RenderThreadContext, RenderThreadShared};

/// Worker entry point. Returns the context so the owner can take the device back.
pub(crate) fn render_thread_main<Context: RenderThreadContext>(
    mut context: Context,
    mut consumer: CommandConsumer<Context>,
    shared: Arc<RenderThreadShared>,
    config: RenderThreadConfig,
    tickables: Vec<Box<dyn IdleTickable<Context>>>,
) -> Context {
    log::info!("render thread `{}` started", config.thread_name);
    let mut housekeeping = IdleHousekeeping::new(tickables, config.min_idle_tick_interval());

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run_render_loop(
            &mut context,
            &mut consumer,
            &shared,
            &config,
            &mut housekeeping,
        )
    }));

    // Leftovers are destroyed on this thread before the outcome becomes
    // visible. Commands enqueued after this point die with the producer.
    let mut discarded = 0usize;
    while let Some(command) = consumer.try_dequeue() {
        drop(command);
        discarded += 1;
    }
    if discarded > 0 {
        log::debug!("discarded {discarded} unexecuted commands on exit");
    }

    match outcome {
        Ok(Ok(())) => {
            shared.health.set_state(RenderThreadState::Stopped);
            log::info!("render thread `{}` stopped", config.thread_name);
        }
        Ok(Err(diagnostics)) => shared.health.record_fault(diagnostics),
        Err(payload) => shared.health.record_fault(format!(
            "render loop panicked: {}",
            panic_payload_message(&*payload)
        )),
    }

    drop(consumer);
    context
}

fn run_render_loop<Context: RenderThreadContext>(
    context: &mut Context,
    consumer: &mut CommandConsumer<Context>,
    shared: &RenderThreadShared,
    config: &RenderThreadConfig,
    housekeeping: &mut IdleHousekeeping<Context>,
) -> Result<(), String> {
    let idle_wait = config.idle_wait();
    let suspend_poll = config.suspend_poll();

    loop {
        while let Some(command) = consumer.try_dequeue() {
            shared.health.set_state(RenderThreadState::Running);
            let label = command.label();
            match panic::catch_unwind(AssertUnwindSafe(|| command.execute(context))) {
                Ok(Ok(footprint)) => {
                    log::trace!("executed `{label}` ({footprint} bytes)");
                }
                Ok(Err(error)) => {
                    return Err(format!("command `{label}` failed: {error}"));
                }
                Err(payload) => {
                    return Err(format!(
                        "command `{label}` panicked: {}",
                        panic_payload_message(&*payload)
                    ));
                }
            }
            wait_while_suspended(shared, suspend_poll);
        }

        if shared.stop_requested.load(Ordering::Acquire) {
            return Ok(());
        }

        shared.health.set_state(RenderThreadState::Idling);
        consumer.wait_for_command(idle_wait);
        if shared.suspend_requests.load(Ordering::Acquire) == 0 {
            housekeeping.tick(context, Instant::now());
        }
    }
}

fn wait_while_suspended(shared: &RenderThreadShared, poll_interval: Duration) {
    if shared.suspend_requests.load(Ordering::Acquire) == 0 {
        return;
    }

    shared.health.set_state(RenderThreadState::Suspended);
    shared.suspend_acks.fetch_add(1, Ordering::AcqRel);
    log::debug!("render thread suspended");
    while shared.suspend_requests.load(Ordering::Acquire) > 0 {
        std::thread::sleep(poll_interval);
    }
    shared.health.set_state(RenderThreadState::Running);
    log::debug!("render thread resumed");
}

fn panic_payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Time-based subsystems ticked only while the worker has nothing to run.
pub(crate) struct IdleHousekeeping<Context> {
    tickables: Vec<Box<dyn IdleTickable<Context>>>,
    min_interval: Duration,
    last_tick: Option<Instant>,
}

impl<Context> IdleHousekeeping<Context> {
    pub(crate) fn new(
        tickables: Vec<Box<dyn IdleTickable<Context>>>,
        min_interval: Duration,
    ) -> Self {
        Self {
            tickables,
            min_interval,
            last_tick: None,
        }
    }

    /// Returns whether the tickables ran.
    pub(crate) fn tick(&mut self, context: &mut Context, now: Instant) -> bool {
        if self.tickables.is_empty() {
            return false;
        }
        let delta = match self.last_tick {
            Some(last_tick) => {
                let elapsed = now.saturating_duration_since(last_tick);
                if elapsed < self.min_interval {
                    return false;
                }
                elapsed
            }
            None => Duration::ZERO,
        };
        self.last_tick = Some(now);
        for tickable in &mut self.tickables {
            tickable.tick(context, delta);
        }
        true
    }
}
