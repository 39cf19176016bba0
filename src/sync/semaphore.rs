//! Counting semaphore with a priority-ordered wait queue.

use crate::interrupt;
use crate::thread::{self, Tid};

use alloc::sync::Arc;
use alloc::vec::Vec;

/// A counting semaphore.
///
/// The counter never goes below zero: [`down`] blocks while it is zero,
/// [`up`] wakes the highest-priority waiter. Handles are cheap clones of
/// the same semaphore.
///
/// [`down`]: Semaphore::down
/// [`up`]: Semaphore::up
#[derive(Clone)]
pub struct Semaphore {
    inner: Arc<SemaphoreInner>,
}

struct SemaphoreInner {
    state: spin::Mutex<SemaphoreState>,
}

struct SemaphoreState {
    value: u32,
    /// Blocked waiters in non-increasing priority order at enqueue time;
    /// re-sorted on wake because priorities shift while threads wait.
    waiters: Vec<Tid>,
}

impl Semaphore {
    /// Create a semaphore with the given initial value.
    pub fn new(value: u32) -> Self {
        Self {
            inner: Arc::new(SemaphoreInner {
                state: spin::Mutex::new(SemaphoreState {
                    value,
                    waiters: Vec::new(),
                }),
            }),
        }
    }

    /// Decrement the counter, blocking until it is positive.
    ///
    /// Suspends. Must not be called from an interrupt handler. May be
    /// called with interrupts on or off; the wait itself always happens
    /// with them off.
    pub fn down(&self) {
        assert!(
            !interrupt::in_interrupt_context(),
            "semaphore down may block; not allowed in an interrupt handler"
        );

        let old = interrupt::disable();
        loop {
            let mut sem = self.inner.state.lock();
            if sem.value > 0 {
                sem.value -= 1;
                break;
            }

            // Enqueue behind waiters of equal or higher priority, then
            // sleep until an up() picks us.
            let current = thread::current();
            let position = {
                let waiters = &sem.waiters;
                thread::with_state(|state| {
                    let priority = state.threads[&state.current].priority;
                    waiters
                        .iter()
                        .position(|tid| state.threads[tid].priority < priority)
                        .unwrap_or(waiters.len())
                })
            };
            sem.waiters.insert(position, current);
            drop(sem);
            thread::block();
        }
        interrupt::set_level(old);
    }

    /// Decrement the counter if it is positive, without blocking.
    ///
    /// Returns whether the decrement happened. Safe from any context.
    pub fn try_down(&self) -> bool {
        let old = interrupt::disable();
        let acquired = {
            let mut sem = self.inner.state.lock();
            if sem.value > 0 {
                sem.value -= 1;
                true
            } else {
                false
            }
        };
        interrupt::set_level(old);
        acquired
    }

    /// Increment the counter and wake the highest-priority waiter.
    ///
    /// The wait queue is re-sorted first: a waiter's priority may have
    /// been raised by donation after it enqueued, and the elevated
    /// thread must be the one released. Safe from any context; if the
    /// woken thread outranks the caller, the CPU is yielded (deferred to
    /// the handler epilogue from interrupt context).
    pub fn up(&self) {
        let old = interrupt::disable();
        let woken: Option<Tid> = {
            let mut sem = self.inner.state.lock();
            let woken = if sem.waiters.is_empty() {
                None
            } else {
                thread::with_state(|state| {
                    sem.waiters
                        .sort_by_key(|&tid| core::cmp::Reverse(state.threads[&tid].priority));
                });
                Some(sem.waiters.remove(0))
            };
            sem.value += 1;
            woken
        };
        if let Some(tid) = woken {
            thread::unblock(tid);
        }
        interrupt::set_level(old);

        if woken.is_some() {
            thread::preempt_check();
        }
    }

    /// The current counter value.
    pub fn value(&self) -> u32 {
        self.inner.state.lock().value
    }

    /// Number of threads blocked on this semaphore.
    pub fn waiter_count(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }
}
