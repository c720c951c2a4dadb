//! Unhandled Rejection Tracking
//!
//! Promises rejected without a handler are recorded as pending. At the end
//! of each microtask checkpoint, still-pending entries become reported.
//! Reported entries are logged and kept in a bounded log until drained.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::thenable::PromiseId;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct UnhandledRejection {
    pub promise: PromiseId,
    /// Class name of the rejected promise
    pub origin: &'static str,
    pub reason: Value,
}

pub struct RejectionTracker {
    report: bool,
    retain: usize,
    pending: RefCell<Vec<UnhandledRejection>>,
    reported: RefCell<VecDeque<UnhandledRejection>>,
    uncaught: RefCell<VecDeque<Value>>,
    /// Reports and uncaught errors evicted before anyone drained them
    dropped: Cell<u64>,
}

impl RejectionTracker {
    pub(crate) fn new(report: bool, retain: usize) -> Self {
        Self {
            report,
            retain,
            pending: RefCell::new(Vec::new()),
            reported: RefCell::new(VecDeque::new()),
            uncaught: RefCell::new(VecDeque::new()),
            dropped: Cell::new(0),
        }
    }

    fn push_bounded<T>(&self, log: &mut VecDeque<T>, entry: T) {
        log.push_back(entry);
        while log.len() > self.retain {
            log.pop_front();
            self.dropped.set(self.dropped.get() + 1);
        }
    }

    /// A promise was rejected with no handler attached.
    pub fn rejected(&self, promise: PromiseId, origin: &'static str, reason: Value) {
        let mut pending = self.pending.borrow_mut();
        if pending.iter().all(|r| r.promise != promise) {
            pending.push(UnhandledRejection { promise, origin, reason });
        }
    }

    /// A handler was attached; forget any pending record.
    pub fn handled(&self, promise: PromiseId) {
        self.pending.borrow_mut().retain(|r| r.promise != promise);
    }

    pub fn is_pending(&self, promise: PromiseId) -> bool {
        self.pending.borrow().iter().any(|r| r.promise == promise)
    }

    pub(crate) fn checkpoint(&self) {
        let drained: Vec<_> = self.pending.borrow_mut().drain(..).collect();
        let mut reported = self.reported.borrow_mut();
        for rejection in drained {
            if self.report {
                tracing::warn!(
                    promise = %rejection.promise,
                    origin = rejection.origin,
                    reason = %rejection.reason,
                    "unhandled promise rejection"
                );
            }
            self.push_bounded(&mut reported, rejection);
        }
    }

    pub fn take_reported(&self) -> Vec<UnhandledRejection> {
        self.reported.borrow_mut().drain(..).collect()
    }

    /// An error escaped a callback with nowhere to go.
    pub fn report_uncaught(&self, error: Value) {
        tracing::error!(error = %error, "uncaught error");
        self.push_bounded(&mut self.uncaught.borrow_mut(), error);
    }

    pub fn take_uncaught(&self) -> Vec<Value> {
        self.uncaught.borrow_mut().drain(..).collect()
    }

    /// Entries evicted from the bounded logs so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }
}
