//! Condition variables.
//!
//! Each waiter parks on its own one-shot semaphore; the condition
//! variable itself is just the queue of those semaphores. The queue is
//! deliberately unsorted: waiter priorities drift while they wait, so
//! [`signal`] scans for the currently-highest-priority waiter instead.
//!
//! [`signal`]: Condvar::signal

use crate::interrupt;
use crate::sync::{Lock, Semaphore};
use crate::thread::{self, Tid};

use alloc::sync::Arc;
use alloc::vec::Vec;

/// A condition variable, used together with a [`Lock`].
#[derive(Clone)]
pub struct Condvar {
    inner: Arc<CondvarInner>,
}

struct CondvarInner {
    waiters: spin::Mutex<Vec<Waiter>>,
}

struct Waiter {
    semaphore: Semaphore,
    owner: Tid,
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl Condvar {
    /// Create a condition variable with no waiters.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CondvarInner {
                waiters: spin::Mutex::new(Vec::new()),
            }),
        }
    }

    /// Atomically release `lock` and wait to be signaled, then reacquire
    /// `lock` before returning.
    ///
    /// Suspends. The caller must hold `lock`; as usual for condition
    /// variables the woken thread must re-check its predicate.
    pub fn wait(&self, lock: &Lock) {
        assert!(
            !interrupt::in_interrupt_context(),
            "condition waits are not allowed in an interrupt handler"
        );
        assert!(
            lock.held_by_current(),
            "condition wait without holding the lock"
        );

        let semaphore = Semaphore::new(0);
        self.inner.waiters.lock().push(Waiter {
            semaphore: semaphore.clone(),
            owner: thread::current(),
        });

        lock.release();
        semaphore.down();
        lock.acquire();
    }

    /// Wake one waiter: the one whose thread currently has the highest
    /// priority, ties broken by wait order.
    ///
    /// The caller must hold `lock`.
    pub fn signal(&self, lock: &Lock) {
        assert!(
            lock.held_by_current(),
            "condition signal without holding the lock"
        );
        self.signal_one();
    }

    /// Wake every waiter. The caller must hold `lock`.
    pub fn broadcast(&self, lock: &Lock) {
        assert!(
            lock.held_by_current(),
            "condition broadcast without holding the lock"
        );
        while self.signal_one() {}
    }

    fn signal_one(&self) -> bool {
        let old = interrupt::disable();
        let waiter = {
            let mut waiters = self.inner.waiters.lock();
            if waiters.is_empty() {
                None
            } else {
                let best = thread::with_state(|state| {
                    let mut best = 0;
                    for (index, waiter) in waiters.iter().enumerate().skip(1) {
                        if state.threads[&waiter.owner].priority
                            > state.threads[&waiters[best].owner].priority
                        {
                            best = index;
                        }
                    }
                    best
                });
                Some(waiters.remove(best))
            }
        };
        interrupt::set_level(old);

        match waiter {
            Some(waiter) => {
                waiter.semaphore.up();
                true
            }
            None => false,
        }
    }

    /// Number of threads waiting on this condition.
    pub fn waiter_count(&self) -> usize {
        self.inner.waiters.lock().len()
    }
}
