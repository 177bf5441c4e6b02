// Delayed and periodic callbacks for signals and the intersection tick.
//
// Callbacks run as tasks on the shared tokio worker pool; no thread is
// created per timer. A callback that panics is logged and does not take the
// pool, the tick loop, or other signals down with it.

use crate::error::ConfigurationError;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

pub type OnceTask = Box<dyn FnOnce() + Send + 'static>;
pub type RepeatingTask = Box<dyn FnMut() + Send + 'static>;

pub trait Scheduler: Send + Sync {
    /// Runs `task` once after `delay`, unless cancelled first.
    fn schedule_once(&self, delay: Duration, task: OnceTask) -> TimerHandle;

    /// Runs `task` immediately and then every `period` until cancelled.
    fn schedule_repeating(&self, period: Duration, task: RepeatingTask) -> TimerHandle;
}

/// Cancels a scheduled callback. Dropping the handle does not cancel it.
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    task: Option<AbortHandle>,
}

impl TimerHandle {
    pub fn new(cancelled: Arc<AtomicBool>, task: Option<AbortHandle>) -> Self {
        Self { cancelled, task }
    }

    /// Stops future invocations. An invocation already running finishes.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime the caller is running on.
    pub fn current() -> Result<Self, ConfigurationError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| ConfigurationError::NoRuntime)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: OnceTask) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let join = self.handle.spawn(async move {
            sleep(delay).await;
            if flag.load(Ordering::SeqCst) {
                return;
            }
            run_isolated("one-shot timer", task);
        });
        TimerHandle::new(cancelled, Some(join.abort_handle()))
    }

    fn schedule_repeating(&self, period: Duration, mut task: RepeatingTask) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        // tokio's interval rejects a zero period
        let period = period.max(Duration::from_millis(1));
        let join = self.handle.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                run_isolated("repeating timer", || task());
            }
        });
        TimerHandle::new(cancelled, Some(join.abort_handle()))
    }
}

pub(crate) fn run_isolated(label: &str, task: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
        log::error!("{} callback panicked: {}", label, panic_message(panic.as_ref()));
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
