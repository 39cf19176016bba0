//! Shared machinery for whole-kernel scenario tests.

use crate::interrupt;
use crate::kernel::{self, KernelConfig};
use crate::sched::Policy;
use crate::thread::{self, ThreadStatus};

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// Boot a kernel with the given policy and run `body` as the initial
/// thread. Runs serialize process-wide, so tests may use this freely.
pub(crate) fn run_scenario(policy: Policy, body: impl FnOnce()) {
    kernel::run(KernelConfig { policy }, body);
}

/// An event recorder shared between scenario threads.
///
/// Scenario threads only record; the initial thread asserts on the
/// collected sequence after the dust settles. (Asserting inside a
/// spawned thread would panic on a green-thread stack, which the
/// trampoline contains but cannot fail the test directly.)
#[derive(Clone, Default)]
pub(crate) struct EventLog {
    events: Arc<spin::Mutex<Vec<String>>>,
}

impl EventLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// All events joined with single spaces.
    pub(crate) fn joined(&self) -> String {
        self.events().join(" ")
    }
}

/// Simple linear congruential generator for property testing.
pub(crate) struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub(crate) fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    pub(crate) fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        min + (self.next_u64() % (max - min))
    }
}

/// Check every observable scheduler invariant.
///
/// Must be called from a thread inside a running kernel; takes the gate
/// itself.
pub(crate) fn check_invariants() {
    let old = interrupt::disable();
    thread::with_state(|state| {
        let state = &*state;

        // Ready queue sorted by non-increasing effective priority.
        let ready_priorities: Vec<i32> = state
            .ready
            .iter()
            .map(|tid| state.threads[&tid].priority)
            .collect();
        assert!(
            ready_priorities.windows(2).all(|w| w[0] >= w[1]),
            "ready queue out of priority order: {ready_priorities:?}"
        );

        // Every ready-queue entry is Ready and is not the idle thread.
        for tid in state.ready.iter() {
            assert_eq!(state.threads[&tid].status, ThreadStatus::Ready);
            assert_ne!(Some(tid), state.idle, "idle thread on the ready queue");
        }

        // Sleep queue sorted by non-decreasing deadline, entries Blocked
        // with a registered deadline.
        let deadlines: Vec<i64> = state
            .sleepers
            .iter()
            .map(|tid| {
                let thread = &state.threads[&tid];
                assert_eq!(thread.status, ThreadStatus::Blocked);
                thread.awake_tick.expect("sleeper without a deadline")
            })
            .collect();
        assert!(
            deadlines.windows(2).all(|w| w[0] <= w[1]),
            "sleep queue out of deadline order: {deadlines:?}"
        );

        // No thread on both queues.
        for tid in state.ready.iter() {
            assert!(
                state.sleepers.iter().all(|sleeper| sleeper != tid),
                "thread {tid} on both ready and sleep queues"
            );
        }

        // Effective priority bounds and the donation equation.
        for (&tid, thread) in &state.threads {
            assert!((crate::thread::PRI_MIN..=crate::thread::PRI_MAX)
                .contains(&thread.priority));
            if state.policy == Policy::PriorityDonation {
                let donated = thread
                    .donations
                    .iter()
                    .map(|donor| state.threads[donor].priority)
                    .max()
                    .unwrap_or(crate::thread::PRI_MIN);
                assert_eq!(
                    thread.priority,
                    thread.init_priority.max(donated),
                    "thread {tid} violates the donation equation"
                );
            }
        }

        // The all-threads list names each live thread exactly once.
        for i in 0..state.all.len() {
            let tid = state.all[i];
            assert!(state.threads.contains_key(&tid));
            assert!(state.all.iter().filter(|&&other| other == tid).count() == 1);
        }

        // Exactly one running thread: the current one.
        for (&tid, thread) in &state.threads {
            if thread.status == ThreadStatus::Running {
                assert_eq!(tid, state.current, "running thread is not current");
            }
        }
    });
    interrupt::set_level(old);
}
