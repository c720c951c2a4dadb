//! Event Loop Implementation
//!
//! Microtask and macrotask queues, virtual-time timers and a local executor
//! for suspended async tasks. Time only moves when the host calls `tick`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use smol::LocalExecutor;

use crate::config::{HostCapabilities, RuntimeConfig};
use crate::rejection::{RejectionTracker, UnhandledRejection};
use crate::thenable::PromiseId;
use crate::value::Value;

/// Timer handle
pub type TimerId = u32;

/// Queued unit of work
pub struct Task {
    pub label: &'static str,
    callback: Box<dyn FnOnce()>,
}

impl Task {
    pub fn new(label: &'static str, callback: impl FnOnce() + 'static) -> Self {
        Self { label, callback: Box::new(callback) }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("label", &self.label).finish()
    }
}

/// Timer task
struct Timer {
    id: TimerId,
    delay_ms: u64,
    scheduled_at: u64,
    task: Task,
}

impl Timer {
    fn deadline(&self) -> u64 {
        self.scheduled_at + self.delay_ms
    }
}

/// Promise host event loop
///
/// Cloning yields another handle to the same loop.
#[derive(Clone)]
pub struct EventLoop(Rc<LoopInner>);

struct LoopInner {
    config: RuntimeConfig,
    /// Microtask queue (promise reactions, queueMicrotask)
    microtasks: RefCell<VecDeque<Task>>,
    /// Macrotask queue (expired timers)
    macrotasks: RefCell<VecDeque<Task>>,
    /// Pending timers
    timers: RefCell<Vec<Timer>>,
    /// Next timer ID
    next_timer_id: Cell<TimerId>,
    /// Next promise ID
    next_promise_id: Cell<u64>,
    /// Current timestamp (ms)
    current_time: Cell<u64>,
    /// Set while a job or async task runs
    in_job: Cell<bool>,
    /// Re-entrancy guard for checkpoints
    draining: Cell<bool>,
    /// Suspended async tasks
    executor: LocalExecutor<'static>,
    rejections: RejectionTracker,
}

impl EventLoop {
    pub fn new(config: RuntimeConfig) -> Self {
        let rejections =
            RejectionTracker::new(config.report_unhandled_rejections, config.retained_reports);
        Self(Rc::new(LoopInner {
            config,
            microtasks: RefCell::new(VecDeque::new()),
            macrotasks: RefCell::new(VecDeque::new()),
            timers: RefCell::new(Vec::new()),
            next_timer_id: Cell::new(1),
            next_promise_id: Cell::new(1),
            current_time: Cell::new(0),
            in_job: Cell::new(false),
            draining: Cell::new(false),
            executor: LocalExecutor::new(),
            rejections,
        }))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.0.config
    }

    pub fn capabilities(&self) -> HostCapabilities {
        self.0.config.capabilities()
    }

    /// Queue a microtask (promise reactions, queueMicrotask)
    pub fn queue_microtask(&self, label: &'static str, callback: impl FnOnce() + 'static) {
        self.0.microtasks.borrow_mut().push_back(Task::new(label, callback));
    }

    /// Queue a macrotask
    pub fn queue_macrotask(&self, label: &'static str, callback: impl FnOnce() + 'static) {
        self.0.macrotasks.borrow_mut().push_back(Task::new(label, callback));
    }

    /// Set a timeout
    pub fn set_timeout(
        &self,
        delay_ms: u64,
        label: &'static str,
        callback: impl FnOnce() + 'static,
    ) -> TimerId {
        let id = self.0.next_timer_id.get();
        self.0.next_timer_id.set(id + 1);
        self.0.timers.borrow_mut().push(Timer {
            id,
            delay_ms,
            scheduled_at: self.current_time(),
            task: Task::new(label, callback),
        });
        id
    }

    /// Clear a timeout
    pub fn clear_timer(&self, id: TimerId) {
        self.0.timers.borrow_mut().retain(|t| t.id != id);
    }

    /// Spawn an async task polled between microtasks.
    pub fn spawn_local(&self, future: impl Future<Output = ()> + 'static) {
        self.0.executor.spawn(future).detach();
    }

    /// Whether a job or async task is currently executing
    pub fn is_running_job(&self) -> bool {
        self.0.in_job.get()
    }

    pub fn next_promise_id(&self) -> PromiseId {
        let id = self.0.next_promise_id.get();
        self.0.next_promise_id.set(id + 1);
        PromiseId(id)
    }

    /// Process all microtasks and runnable async tasks, then run the
    /// rejection checkpoint. Returns the number of steps executed.
    pub fn run_microtasks(&self) -> usize {
        if self.0.draining.replace(true) {
            return 0;
        }
        let mut executed = 0;
        loop {
            let next = self.0.microtasks.borrow_mut().pop_front();
            if let Some(task) = next {
                self.run_task(task);
                executed += 1;
                continue;
            }
            let was = self.0.in_job.replace(true);
            let progressed = self.0.executor.try_tick();
            self.0.in_job.set(was);
            if !progressed {
                break;
            }
            executed += 1;
        }
        self.0.draining.set(false);
        self.0.rejections.checkpoint();
        executed
    }

    fn run_task(&self, task: Task) {
        tracing::trace!(task = task.label, "running task");
        let was = self.0.in_job.replace(true);
        (task.callback)();
        self.0.in_job.set(was);
    }

    /// Advance time, firing due timers in deadline order. Each timer runs as
    /// a macrotask followed by a microtask checkpoint.
    pub fn tick(&self, delta_ms: u64) {
        let target = self.current_time() + delta_ms;
        self.drain_macrotasks();
        while let Some(timer) = self.pop_due_timer(target) {
            self.0.current_time.set(timer.deadline().max(self.current_time()));
            self.0.macrotasks.borrow_mut().push_back(timer.task);
            self.drain_macrotasks();
        }
        self.0.current_time.set(target);
    }

    fn drain_macrotasks(&self) {
        self.run_microtasks();
        loop {
            let next = self.0.macrotasks.borrow_mut().pop_front();
            let Some(task) = next else { break };
            self.run_task(task);
            self.run_microtasks();
        }
    }

    fn pop_due_timer(&self, target: u64) -> Option<Timer> {
        let mut timers = self.0.timers.borrow_mut();
        let index = timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline() <= target)
            .min_by_key(|(_, t)| (t.deadline(), t.id))
            .map(|(i, _)| i)?;
        Some(timers.remove(index))
    }

    /// Run until no microtask, macrotask or timer remains.
    pub fn run_until_idle(&self) {
        self.drain_macrotasks();
        while let Some(deadline) = self.next_deadline() {
            self.tick(deadline.saturating_sub(self.current_time()));
        }
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.0.timers.borrow().iter().map(Timer::deadline).min()
    }

    /// Check if there's pending work
    pub fn has_pending_work(&self) -> bool {
        !self.0.microtasks.borrow().is_empty()
            || !self.0.macrotasks.borrow().is_empty()
            || !self.0.timers.borrow().is_empty()
    }

    /// Get current time
    pub fn current_time(&self) -> u64 {
        self.0.current_time.get()
    }

    pub fn rejections(&self) -> &RejectionTracker {
        &self.0.rejections
    }

    pub fn take_unhandled_rejections(&self) -> Vec<UnhandledRejection> {
        self.0.rejections.take_reported()
    }

    pub fn report_uncaught(&self, error: Value) {
        self.0.rejections.report_uncaught(error);
    }

    pub fn take_uncaught_errors(&self) -> Vec<Value> {
        self.0.rejections.take_uncaught()
    }

    pub fn ptr_eq(&self, other: &EventLoop) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("microtasks", &self.0.microtasks.borrow().len())
            .field("timers", &self.0.timers.borrow().len())
            .field("current_time", &self.current_time())
            .finish()
    }
}
