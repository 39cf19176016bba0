//! Mutual-exclusion lock with priority donation.
//!
//! A lock is a binary semaphore plus an owner. Under the
//! priority-donation policy, a thread that blocks on a held lock lends
//! the holder its priority, walking the chain of holders-waiting-on-locks
//! so that a nested arrangement (H1 holds L1 and waits on L2, held by
//! H2, ...) cannot starve the top of the chain. Releasing a lock takes
//! back exactly the donations made through it; donations through other
//! locks the thread still holds survive.

use crate::interrupt::{self, Level};
use crate::sched::Policy;
use crate::sync::Semaphore;
use crate::thread::{self, Tid};

use alloc::sync::Arc;
use alloc::vec::Vec;

/// Maximum number of holder-to-holder hops a donation propagates.
pub const DONATION_DEPTH_MAX: usize = 8;

/// A mutual-exclusion lock.
///
/// Handles are cheap clones of the same lock. Not recursive: a holder
/// acquiring again is a bug and panics, as is releasing a lock the
/// caller does not hold.
#[derive(Clone)]
pub struct Lock {
    inner: Arc<LockInner>,
}

struct LockInner {
    semaphore: Semaphore,
    holder: spin::Mutex<Option<Tid>>,
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock {
    /// Create an unheld lock.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LockInner {
                semaphore: Semaphore::new(1),
                holder: spin::Mutex::new(None),
            }),
        }
    }

    /// Whether two handles refer to the same lock.
    pub(crate) fn same(&self, other: &Lock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The thread currently holding this lock, if any.
    pub fn holder(&self) -> Option<Tid> {
        *self.inner.holder.lock()
    }

    /// Whether the current thread holds this lock.
    pub fn held_by_current(&self) -> bool {
        self.holder() == Some(thread::current())
    }

    /// Acquire the lock, blocking until it is free.
    ///
    /// Suspends. Must not be called from an interrupt handler, and the
    /// caller must not already hold the lock. If the lock is held and
    /// the donation policy is active, the caller's priority propagates
    /// down the holder chain before the wait begins.
    pub fn acquire(&self) {
        assert!(
            !interrupt::in_interrupt_context(),
            "locks cannot be acquired in an interrupt handler"
        );
        assert!(
            !self.held_by_current(),
            "recursive acquire of a lock already held by thread {}",
            thread::current()
        );

        let old = interrupt::disable();
        if old == Level::On && self.holder().is_some() {
            self.donate();
        }
        self.inner.semaphore.down();

        thread::with_state(|state| {
            let current = state.current;
            state
                .threads
                .get_mut(&current)
                .expect("no current thread")
                .awaiting_lock = None;
        });
        *self.inner.holder.lock() = Some(thread::current());
        interrupt::set_level(old);
    }

    /// Record the current thread as a donor and push its priority down
    /// the chain of waiting holders. Interrupts must be off.
    fn donate(&self) {
        thread::with_state(|state| {
            if state.policy == Policy::Mlfqs {
                return;
            }
            let holder = match self.holder() {
                Some(holder) => holder,
                None => return,
            };
            let current = state.current;
            state
                .threads
                .get_mut(&current)
                .expect("no current thread")
                .awaiting_lock = Some(self.clone());
            state
                .threads
                .get_mut(&holder)
                .expect("lock holder disappeared")
                .donations
                .push(current);

            // Raise each holder along the chain to the donor's level.
            // Bounded: a deeper chain than this is almost certainly a
            // deadlock already.
            let mut donor = current;
            for _ in 0..DONATION_DEPTH_MAX {
                let lock = match state.threads[&donor].awaiting_lock.clone() {
                    Some(lock) => lock,
                    None => break,
                };
                let above = match lock.holder() {
                    Some(above) => above,
                    None => break,
                };
                let donor_priority = state.threads[&donor].priority;
                let holder_thread = state
                    .threads
                    .get_mut(&above)
                    .expect("lock holder disappeared");
                if holder_thread.priority < donor_priority {
                    holder_thread.priority = donor_priority;
                }
                donor = above;
            }

            // A raised holder may be sitting on the ready queue.
            thread::ready_resort(state);
        });
    }

    /// Release the lock and wake its highest-priority waiter.
    ///
    /// Donations made through this lock are withdrawn and the caller's
    /// effective priority recomputed before the waiter is released; a
    /// higher-priority waiter will take the CPU immediately.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock.
    pub fn release(&self) {
        assert!(
            self.held_by_current(),
            "release of a lock not held by thread {}",
            thread::current()
        );

        let old = interrupt::disable();
        thread::with_state(|state| {
            if state.policy == Policy::Mlfqs {
                return;
            }
            let current = state.current;

            // Withdraw exactly the donations made through this lock.
            let mut donations = core::mem::take(
                &mut state
                    .threads
                    .get_mut(&current)
                    .expect("no current thread")
                    .donations,
            );
            donations.retain(|donor| {
                !state.threads[donor]
                    .awaiting_lock
                    .as_ref()
                    .is_some_and(|lock| lock.same(self))
            });
            state
                .threads
                .get_mut(&current)
                .expect("no current thread")
                .donations = donations;

            thread::refresh_priority(state, current);
            thread::ready_resort(state);
        });
        *self.inner.holder.lock() = None;
        interrupt::set_level(old);

        self.inner.semaphore.up();
    }

    /// Acquire the lock only if it is free right now.
    ///
    /// No donation, no blocking. Returns whether the lock was taken.
    pub fn try_acquire(&self) -> bool {
        assert!(
            !interrupt::in_interrupt_context(),
            "locks cannot be acquired in an interrupt handler"
        );
        if self.inner.semaphore.try_down() {
            *self.inner.holder.lock() = Some(thread::current());
            true
        } else {
            false
        }
    }

    /// Threads currently donating to this lock's holder.
    #[allow(dead_code)]
    pub(crate) fn holder_donations(&self) -> Vec<Tid> {
        let old = interrupt::disable();
        let donors = match self.holder() {
            Some(holder) => thread::with_state(|state| state.threads[&holder].donations.clone()),
            None => Vec::new(),
        };
        interrupt::set_level(old);
        donors
    }
}
