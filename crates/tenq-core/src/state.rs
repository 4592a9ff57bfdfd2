use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Seqlock-style wakeup primitive shared by blocked consumers.
///
/// Callers read `current` before checking for work; if the check comes up
/// empty they wait for the sequence to move past the observed value. Any
/// state change that could make work available bumps the sequence, so a
/// notification between the check and the wait is never lost.
#[derive(Debug)]
pub(crate) struct WorkSignal {
    mutex: Mutex<()>,
    condvar: Condvar,
    seq: AtomicU64,
}

impl WorkSignal {
    pub(crate) fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            seq: AtomicU64::new(0),
        }
    }

    pub(crate) fn current(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }

    pub(crate) fn notify_all(&self) {
        let _guard = self.mutex.lock();
        self.seq.fetch_add(1, Ordering::Release);
        self.condvar.notify_all();
    }

    pub(crate) fn wait_for_change(&self, last_seen: u64) {
        let mut guard = self.mutex.lock();
        while self.seq.load(Ordering::Acquire) == last_seen {
            self.condvar.wait(&mut guard);
        }
    }

    /// Waits until the sequence moves or the timeout elapses. Returns `true`
    /// if a change was observed.
    pub(crate) fn wait_for_change_timeout(&self, last_seen: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.mutex.lock();
        while self.seq.load(Ordering::Acquire) == last_seen {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let _ = self.condvar.wait_for(&mut guard, deadline - now);
        }
        true
    }
}

/// Outcome of routing a submission through a tenant's backlog.
pub(crate) enum RouteOutcome<T> {
    /// The tenant was idle; the caller now owns placing this task into the
    /// shared dispatch queue. The tenant is already marked active.
    Activated(T),
    /// The tenant was active; the task was appended to its backlog.
    Queued,
    /// The backlog was closed (deprovision or shutdown); the task is handed
    /// back untouched.
    Closed(T),
}

/// Outcome of promoting a tenant's next task after a dispatch.
pub(crate) enum PromoteOutcome<T> {
    /// The backlog yielded a task; the tenant keeps its rotation slot.
    Next(T),
    /// The backlog was empty; the tenant is now idle.
    Idle,
}

/// Outcome of pulling the backlog head under weighted scheduling.
pub(crate) enum WeightedTake<T> {
    Taken {
        task: T,
        /// The backlog is now empty and the tenant has been marked idle.
        drained: bool,
    },
    /// Nothing pending; the tenant has been marked idle.
    Empty,
}

struct BacklogInner<T> {
    queue: VecDeque<T>,
    /// True while the tenant holds a slot in the rotation (a representative
    /// task in the dispatch queue, or a ring entry under weighted
    /// scheduling). Kept under the same lock as the queue so that routing a
    /// submission and promoting after a dispatch can never interleave into a
    /// per-tenant ordering violation.
    active: bool,
    closed: bool,
}

/// Bounded per-tenant backlog with blocking put and non-blocking poll.
///
/// The capacity bounds the queue only; an active tenant's representative
/// task lives in the dispatch structure, not here. A full backlog suspends
/// only this tenant's producers.
pub(crate) struct TenantBacklog<T> {
    inner: Mutex<BacklogInner<T>>,
    space: Condvar,
    capacity: usize,
}

impl<T> TenantBacklog<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BacklogInner {
                queue: VecDeque::new(),
                active: false,
                closed: false,
            }),
            space: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Fair-queueing admission: flips the tenant active and returns the task
    /// for direct dispatch, or appends to the backlog, blocking while the
    /// backlog is at capacity.
    pub(crate) fn route(&self, task: T) -> RouteOutcome<T> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return RouteOutcome::Closed(task);
        }
        if !inner.active {
            inner.active = true;
            return RouteOutcome::Activated(task);
        }
        loop {
            if inner.closed {
                return RouteOutcome::Closed(task);
            }
            if inner.queue.len() < self.capacity {
                inner.queue.push_back(task);
                return RouteOutcome::Queued;
            }
            self.space.wait(&mut inner);
        }
    }

    /// Fair-queueing promotion after this tenant's representative was
    /// dispatched: pops the next backlog task or marks the tenant idle.
    pub(crate) fn promote(&self) -> PromoteOutcome<T> {
        let mut inner = self.inner.lock();
        match inner.queue.pop_front() {
            Some(task) => {
                self.space.notify_one();
                PromoteOutcome::Next(task)
            }
            None => {
                inner.active = false;
                PromoteOutcome::Idle
            }
        }
    }

    /// Weighted admission: always appends to the backlog (blocking on
    /// capacity) and reports whether this was an idle-to-busy transition.
    pub(crate) fn put_and_activate(&self, task: T) -> Result<bool, T> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return Err(task);
            }
            if inner.queue.len() < self.capacity {
                inner.queue.push_back(task);
                let was_idle = !inner.active;
                inner.active = true;
                return Ok(was_idle);
            }
            self.space.wait(&mut inner);
        }
    }

    /// Weighted dispatch: pops the backlog head, marking the tenant idle
    /// when the backlog drains.
    pub(crate) fn take_front(&self) -> WeightedTake<T> {
        let mut inner = self.inner.lock();
        match inner.queue.pop_front() {
            Some(task) => {
                self.space.notify_one();
                let drained = inner.queue.is_empty();
                if drained {
                    inner.active = false;
                }
                WeightedTake::Taken { task, drained }
            }
            None => {
                inner.active = false;
                WeightedTake::Empty
            }
        }
    }

    /// Closes the backlog, discarding queued tasks and waking blocked
    /// producers. Returns the number of tasks discarded.
    pub(crate) fn close(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let dropped = inner.queue.len();
        inner.queue.clear();
        self.space.notify_all();
        dropped
    }
}

/// Monotonic observability counters. Never consulted for scheduling.
#[derive(Debug)]
pub(crate) struct Counters {
    pub(crate) tenants: AtomicUsize,
    pub(crate) submitted: AtomicU64,
    pub(crate) processed: AtomicU64,
    pub(crate) rejected_unknown: AtomicU64,
}

impl Counters {
    pub(crate) fn new() -> Self {
        Self {
            tenants: AtomicUsize::new(0),
            submitted: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            rejected_unknown: AtomicU64::new(0),
        }
    }
}
