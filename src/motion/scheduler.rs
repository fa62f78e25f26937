//! Motion scheduler - one worker thread executing queued commands in order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::Mutex;

use super::command::{IdleAction, MotionCommand, MotionContext, Priority};
use super::queue::PendingQueue;
use crate::{ActionError, MotionError, SchedulerConfig};

struct CurrentCommand {
    name: String,
    interruptible: bool,
}

#[derive(Default)]
struct IdleBehavior {
    action: Option<IdleAction>,
    enabled: bool,
}

struct Shared {
    queue: PendingQueue,
    interrupt: Arc<AtomicBool>,
    current: Mutex<Option<CurrentCommand>>,
    idle: Mutex<IdleBehavior>,
}

struct Worker {
    stop: Arc<AtomicBool>,
    done: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Executes motion commands one at a time on a dedicated thread.
///
/// Commands run in priority order (high, normal, low) and in arrival order
/// within a priority. When nothing is queued, the idle behavior (if set and
/// enabled) runs between polls. A failing or panicking action is logged and
/// the worker moves on.
///
/// The scheduler never blocks the caller: [`enqueue()`](Self::enqueue) and
/// [`interrupt_current()`](Self::interrupt_current) only touch the queue and
/// a flag.
///
/// # Example
///
/// ```
/// use companion_runtime::{MotionScheduler, Priority, SchedulerConfig};
///
/// let scheduler = MotionScheduler::new(SchedulerConfig::default());
/// scheduler.start()?;
///
/// scheduler.execute_gesture("nod", Priority::Normal, |ctx| {
///     for _ in 0..3 {
///         ctx.check_interrupted()?;
///         // drive the head here
///     }
///     Ok(())
/// });
///
/// scheduler.stop()?;
/// # Ok::<(), companion_runtime::MotionError>(())
/// ```
pub struct MotionScheduler {
    shared: Arc<Shared>,
    config: SchedulerConfig,
    worker: Mutex<Option<Worker>>,
    // Worker whose stop timed out; it still owns the device until it exits
    lingering: Mutex<Option<Worker>>,
}

impl MotionScheduler {
    /// Creates a stopped scheduler.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: PendingQueue::default(),
                interrupt: Arc::new(AtomicBool::new(false)),
                current: Mutex::new(None),
                idle: Mutex::new(IdleBehavior::default()),
            }),
            config,
            worker: Mutex::new(None),
            lingering: Mutex::new(None),
        }
    }

    /// Starts the worker thread. Does nothing if already running.
    ///
    /// # Errors
    ///
    /// - [`MotionError::StillStopping`] if a worker whose stop timed out is
    ///   still running its last command
    /// - [`MotionError::Spawn`] if the thread cannot be created
    pub fn start(&self) -> Result<(), MotionError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            tracing::warn!("Motion scheduler already running");
            return Ok(());
        }
        self.reap_lingering()?;

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let worker_stop = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("motion-scheduler".to_string())
            .spawn(move || {
                // Dropped when the thread exits, however it exits
                let _done = done_tx;
                worker_loop(&shared, &config, &worker_stop);
            })
            .map_err(MotionError::Spawn)?;

        *worker = Some(Worker {
            stop,
            done: done_rx,
            handle,
        });
        tracing::info!("Motion scheduler started");
        Ok(())
    }

    /// Stops the worker after its current command and waits for it to exit.
    ///
    /// Pending commands stay queued for the next [`start()`](Self::start).
    /// Does nothing if not running. After a timed-out stop, calling this
    /// again waits for the same worker once more.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::StopTimeout`] if the worker is still busy after
    /// the configured stop timeout. It keeps running its current command and
    /// exits afterwards; [`start()`](Self::start) is refused until then.
    pub fn stop(&self) -> Result<(), MotionError> {
        let taken = self.worker.lock().take();
        let Some(worker) = taken.or_else(|| self.lingering.lock().take()) else {
            return Ok(());
        };

        tracing::info!("Stopping motion scheduler");
        worker.stop.store(true, Ordering::SeqCst);
        self.shared.queue.wake();

        match worker.done.recv_timeout(self.config.stop_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                let timeout_ms = self.config.stop_timeout.as_millis() as u64;
                tracing::warn!(timeout_ms, "Motion scheduler did not stop gracefully");
                *self.lingering.lock() = Some(worker);
                Err(MotionError::StopTimeout { timeout_ms })
            }
            _ => {
                let _ = worker.handle.join();
                tracing::info!("Motion scheduler stopped");
                Ok(())
            }
        }
    }

    /// Joins a worker left behind by a timed-out stop, if it has exited.
    fn reap_lingering(&self) -> Result<(), MotionError> {
        let mut lingering = self.lingering.lock();
        let Some(ref old) = *lingering else {
            return Ok(());
        };
        if let Err(TryRecvError::Empty) = old.done.try_recv() {
            tracing::warn!("Previous motion worker still running, refusing start");
            return Err(MotionError::StillStopping);
        }
        if let Some(old) = lingering.take() {
            let _ = old.handle.join();
        }
        Ok(())
    }

    /// Returns `true` while the worker thread is running.
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Queues a command. Safe to call while the worker runs.
    pub fn enqueue(&self, command: MotionCommand) {
        tracing::debug!(
            name = command.name(),
            priority = %command.priority(),
            "Queued motion"
        );
        self.shared.queue.push(command);
    }

    /// Queues an interruptible gesture.
    pub fn execute_gesture<F>(&self, name: impl Into<String>, priority: Priority, action: F)
    where
        F: FnOnce(&MotionContext) -> Result<(), ActionError> + Send + 'static,
    {
        self.enqueue(MotionCommand::new(name, priority, action));
    }

    /// Sets the action run while the queue is empty.
    pub fn set_idle_behavior<F>(&self, action: F, enabled: bool)
    where
        F: Fn(&MotionContext) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        let mut idle = self.shared.idle.lock();
        idle.action = Some(Arc::new(action));
        idle.enabled = enabled;
        tracing::debug!(enabled, "Idle behavior set");
    }

    /// Enables or disables the idle behavior without replacing it.
    pub fn set_idle_enabled(&self, enabled: bool) {
        self.shared.idle.lock().enabled = enabled;
        tracing::debug!(enabled, "Idle behavior toggled");
    }

    /// Removes the idle behavior.
    pub fn clear_idle_behavior(&self) {
        *self.shared.idle.lock() = IdleBehavior::default();
    }

    /// Requests that the running command stop early.
    ///
    /// This is advisory: the action sees [`MotionContext::is_interrupted()`]
    /// turn `true` and may return early, but an action that never checks it
    /// runs to completion. Returns `true` if a request was made, `false` if
    /// nothing is running or the running command is not interruptible.
    pub fn interrupt_current(&self) -> bool {
        let current = self.shared.current.lock();
        match current.as_ref() {
            Some(command) if command.interruptible => {
                tracing::info!(name = %command.name, "Interrupting motion");
                self.shared.interrupt.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    /// Discards every pending command and returns how many were dropped.
    pub fn clear_queue(&self) -> usize {
        let dropped = self.shared.queue.clear();
        tracing::debug!(dropped, "Motion queue cleared");
        dropped
    }

    /// Returns the number of pending commands.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Returns the name of the command being executed, if any.
    pub fn current_command(&self) -> Option<String> {
        self.shared
            .current
            .lock()
            .as_ref()
            .map(|command| command.name.clone())
    }
}

impl Drop for MotionScheduler {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            // Let the worker exit on its own; joining here could block
            worker.stop.store(true, Ordering::SeqCst);
            self.shared.queue.wake();
        }
    }
}

fn worker_loop(shared: &Shared, config: &SchedulerConfig, stop: &AtomicBool) {
    tracing::debug!("Motion worker started");
    let ctx = MotionContext::new(Arc::clone(&shared.interrupt));

    while !stop.load(Ordering::SeqCst) {
        match shared.queue.pop_timeout(config.poll_timeout) {
            Some(command) => execute(shared, &ctx, command),
            None if stop.load(Ordering::SeqCst) => break,
            None => run_idle(shared, config, &ctx),
        }
    }

    tracing::debug!("Motion worker stopped");
}

fn execute(shared: &Shared, ctx: &MotionContext, command: MotionCommand) {
    let priority = command.priority();
    let (name, interruptible, action) = command.into_parts();

    shared.interrupt.store(false, Ordering::SeqCst);
    *shared.current.lock() = Some(CurrentCommand {
        name: name.clone(),
        interruptible,
    });
    tracing::debug!(name = %name, %priority, "Executing motion");

    match catch_unwind(AssertUnwindSafe(|| action(ctx))) {
        Ok(Ok(())) => tracing::debug!(name = %name, "Motion completed"),
        Ok(Err(ActionError::Interrupted)) => tracing::info!(name = %name, "Motion interrupted"),
        Ok(Err(e)) => tracing::warn!(name = %name, error = %e, "Motion failed"),
        Err(payload) => tracing::error!(
            name = %name,
            panic = panic_message(&*payload),
            "Motion panicked"
        ),
    }

    *shared.current.lock() = None;
    shared.interrupt.store(false, Ordering::SeqCst);
}

fn run_idle(shared: &Shared, config: &SchedulerConfig, ctx: &MotionContext) {
    let action = {
        let idle = shared.idle.lock();
        match idle.action {
            Some(ref action) if idle.enabled => Arc::clone(action),
            _ => return,
        }
    };

    let failed = match catch_unwind(AssertUnwindSafe(|| action(ctx))) {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Idle behavior failed");
            true
        }
        Err(payload) => {
            tracing::error!(panic = panic_message(&*payload), "Idle behavior panicked");
            true
        }
    };

    if failed {
        std::thread::sleep(config.error_backoff);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::Sender;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            poll_timeout: Duration::from_millis(10),
            stop_timeout: Duration::from_secs(2),
            error_backoff: Duration::from_millis(10),
        }
    }

    fn recorder() -> (Sender<String>, Receiver<String>) {
        crossbeam_channel::unbounded()
    }

    fn record(scheduler: &MotionScheduler, tx: &Sender<String>, name: &str, priority: Priority) {
        let tx = tx.clone();
        let label = name.to_string();
        scheduler.execute_gesture(name, priority, move |_| {
            let _ = tx.send(label);
            Ok(())
        });
    }

    fn collect(rx: &Receiver<String>, count: usize) -> Vec<String> {
        (0..count)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect()
    }

    #[test]
    fn test_priority_order() {
        let scheduler = MotionScheduler::new(fast_config());
        let (tx, rx) = recorder();
        record(&scheduler, &tx, "low", Priority::Low);
        record(&scheduler, &tx, "high", Priority::High);
        record(&scheduler, &tx, "normal", Priority::Normal);

        scheduler.start().unwrap();
        assert_eq!(collect(&rx, 3), vec!["high", "normal", "low"]);
        scheduler.stop().unwrap();
    }

    #[test]
    fn test_fifo_within_priority() {
        let scheduler = MotionScheduler::new(fast_config());
        let (tx, rx) = recorder();
        for name in ["first", "second", "third"] {
            record(&scheduler, &tx, name, Priority::Normal);
        }

        scheduler.start().unwrap();
        assert_eq!(collect(&rx, 3), vec!["first", "second", "third"]);
        scheduler.stop().unwrap();
    }

    #[test]
    fn test_idle_runs_until_command_arrives() {
        let scheduler = MotionScheduler::new(fast_config());
        let idle_runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&idle_runs);
        scheduler.set_idle_behavior(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            true,
        );

        scheduler.start().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(idle_runs.load(Ordering::SeqCst) >= 2);

        let (tx, rx) = recorder();
        record(&scheduler, &tx, "wave", Priority::Normal);
        assert_eq!(collect(&rx, 1), vec!["wave"]);
        scheduler.stop().unwrap();
    }

    #[test]
    fn test_disabled_idle_does_not_run() {
        let scheduler = MotionScheduler::new(fast_config());
        let idle_runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&idle_runs);
        scheduler.set_idle_behavior(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            false,
        );

        scheduler.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        scheduler.stop().unwrap();
        assert_eq!(idle_runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failures_do_not_stop_worker() {
        let scheduler = MotionScheduler::new(fast_config());
        let (tx, rx) = recorder();
        scheduler.execute_gesture("fails", Priority::High, |_| {
            Err(ActionError::motion("servo stalled"))
        });
        scheduler.execute_gesture("panics", Priority::High, |_| panic!("bad trajectory"));
        record(&scheduler, &tx, "after", Priority::Normal);

        scheduler.start().unwrap();
        assert_eq!(collect(&rx, 1), vec!["after"]);
        assert!(scheduler.is_running());
        scheduler.stop().unwrap();
    }

    #[test]
    fn test_interrupt_is_advisory() {
        let scheduler = MotionScheduler::new(fast_config());
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        let (done_tx, done_rx) = crossbeam_channel::unbounded();

        scheduler.execute_gesture("look_around", Priority::Normal, move |ctx| {
            let _ = started_tx.send(());
            let deadline = Instant::now() + Duration::from_secs(2);
            while !ctx.is_interrupted() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
            let _ = done_tx.send(ctx.is_interrupted());
            ctx.check_interrupted()
        });

        scheduler.start().unwrap();
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(scheduler.current_command().as_deref(), Some("look_around"));
        assert!(scheduler.interrupt_current());

        assert!(done_rx.recv_timeout(Duration::from_secs(2)).unwrap());
        scheduler.stop().unwrap();
    }

    #[test]
    fn test_uninterruptible_command_ignores_request() {
        let scheduler = MotionScheduler::new(fast_config());
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();

        scheduler.enqueue(
            MotionCommand::new("calibrate", Priority::High, move |_| {
                let _ = started_tx.send(());
                let _ = release_rx.recv_timeout(Duration::from_secs(2));
                Ok(())
            })
            .uninterruptible(),
        );

        scheduler.start().unwrap();
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(!scheduler.interrupt_current());

        release_tx.send(()).unwrap();
        scheduler.stop().unwrap();
        assert!(scheduler.current_command().is_none());
    }

    #[test]
    fn test_interrupt_with_nothing_running() {
        let scheduler = MotionScheduler::new(fast_config());
        assert!(!scheduler.interrupt_current());
    }

    #[test]
    fn test_stop_timeout_reported() {
        let config = SchedulerConfig {
            stop_timeout: Duration::from_millis(20),
            ..fast_config()
        };
        let scheduler = MotionScheduler::new(config);
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        scheduler.execute_gesture("slow", Priority::Normal, move |_| {
            let _ = started_tx.send(());
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        });

        scheduler.start().unwrap();
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        let result = scheduler.stop();
        assert!(matches!(result, Err(MotionError::StopTimeout { timeout_ms: 20 })));
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let scheduler = MotionScheduler::new(fast_config());
        assert!(scheduler.stop().is_ok());

        scheduler.start().unwrap();
        scheduler.start().unwrap();
        assert!(scheduler.is_running());

        scheduler.stop().unwrap();
        scheduler.stop().unwrap();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_queue_len_and_clear() {
        let scheduler = MotionScheduler::new(fast_config());
        scheduler.execute_gesture("a", Priority::Low, |_| Ok(()));
        scheduler.execute_gesture("b", Priority::Low, |_| Ok(()));
        assert_eq!(scheduler.queue_len(), 2);
        assert_eq!(scheduler.clear_queue(), 2);
        assert_eq!(scheduler.queue_len(), 0);
    }

    #[test]
    fn test_start_refused_while_stopped_worker_finishes() {
        let config = SchedulerConfig {
            stop_timeout: Duration::from_millis(20),
            ..fast_config()
        };
        let scheduler = MotionScheduler::new(config);
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();
        scheduler.execute_gesture("first", Priority::Normal, move |_| {
            let _ = started_tx.send(());
            let _ = release_rx.recv_timeout(Duration::from_secs(2));
            Ok(())
        });

        scheduler.start().unwrap();
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(
            scheduler.stop(),
            Err(MotionError::StopTimeout { .. })
        ));

        let (tx, rx) = recorder();
        record(&scheduler, &tx, "second", Priority::Normal);

        // No second worker may run while the first still drives the device
        assert!(matches!(scheduler.start(), Err(MotionError::StillStopping)));
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.current_command().as_deref(), Some("first"));
        assert!(rx.try_recv().is_err());

        release_tx.send(()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match scheduler.start() {
                Ok(()) => break,
                Err(MotionError::StillStopping) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => panic!("start failed: {e}"),
            }
        }

        assert_eq!(collect(&rx, 1), vec!["second"]);
        scheduler.stop().unwrap();
    }

    #[test]
    fn test_stop_again_waits_for_lingering_worker() {
        let config = SchedulerConfig {
            stop_timeout: Duration::from_millis(20),
            ..fast_config()
        };
        let scheduler = MotionScheduler::new(config);
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();
        scheduler.execute_gesture("slow", Priority::Normal, move |_| {
            let _ = started_tx.send(());
            let _ = release_rx.recv_timeout(Duration::from_secs(2));
            Ok(())
        });

        scheduler.start().unwrap();
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(scheduler.stop().is_err());

        release_tx.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        scheduler.stop().unwrap();
        scheduler.start().unwrap();
        scheduler.stop().unwrap();
    }
}
