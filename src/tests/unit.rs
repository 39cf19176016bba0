//! Kernel-level unit tests: single operations observed from the initial
//! thread.

use super::helpers::{run_scenario, EventLog};
use crate::sched::Policy;
use crate::sync::{Lock, Semaphore};
use crate::thread;
use crate::timer;

use alloc::format;
use alloc::sync::Arc;
use portable_atomic::{AtomicU32, Ordering};

#[test]
fn test_spawn_runs_thread() {
    run_scenario(Policy::PriorityDonation, || {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        // Outranks main, so it runs to completion inside spawn.
        thread::spawn("worker", 40, move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn failed");

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn test_tids_increase() {
    run_scenario(Policy::PriorityDonation, || {
        let first = thread::spawn("first", 5, || {}).unwrap();
        let second = thread::spawn("second", 5, || {}).unwrap();
        assert!(second.raw() > first.raw());
    });
}

#[test]
fn test_thread_names() {
    run_scenario(Policy::PriorityDonation, || {
        assert_eq!(thread::name(), "main");

        let log = EventLog::new();
        let log_clone = log.clone();
        thread::spawn("a-name-way-too-long-to-keep", 40, move || {
            log_clone.record(thread::name());
        })
        .unwrap();

        // Truncated to THREAD_NAME_MAX characters.
        assert_eq!(log.joined(), "a-name-way-too-");
    });
}

#[test]
fn test_priority_round_trip() {
    run_scenario(Policy::PriorityDonation, || {
        assert_eq!(thread::get_priority(), thread::PRI_DEFAULT);
        thread::set_priority(47);
        assert_eq!(thread::get_priority(), 47);
        thread::set_priority(thread::PRI_DEFAULT);
        assert_eq!(thread::get_priority(), thread::PRI_DEFAULT);
    });
}

#[test]
fn test_set_priority_ignored_under_mlfqs() {
    run_scenario(Policy::Mlfqs, || {
        let before = thread::get_priority();
        thread::set_priority(thread::PRI_MIN);
        assert_eq!(thread::get_priority(), before);
    });
}

#[test]
fn test_nice_round_trip() {
    run_scenario(Policy::Mlfqs, || {
        assert_eq!(thread::get_nice(), 0);
        thread::set_nice(10);
        assert_eq!(thread::get_nice(), 10);
        // Nicer threads compute to a lower priority.
        assert!(thread::get_priority() < thread::PRI_MAX);
    });
}

#[test]
fn test_semaphore_counting() {
    run_scenario(Policy::PriorityDonation, || {
        let sem = Semaphore::new(3);
        for _ in 0..3 {
            sem.down();
        }
        assert_eq!(sem.value(), 0);
        assert!(!sem.try_down());
        for _ in 0..3 {
            sem.up();
        }
        assert_eq!(sem.value(), 3);
        assert_eq!(sem.waiter_count(), 0);

        assert!(sem.try_down());
        assert_eq!(sem.value(), 2);
    });
}

#[test]
fn test_lock_round_trip() {
    run_scenario(Policy::PriorityDonation, || {
        let lock = Lock::new();
        assert_eq!(lock.holder(), None);
        assert!(!lock.held_by_current());

        let before = thread::get_priority();
        lock.acquire();
        assert!(lock.held_by_current());
        assert_eq!(lock.holder(), Some(thread::current()));

        lock.release();
        assert_eq!(lock.holder(), None);
        assert_eq!(thread::get_priority(), before);
    });
}

#[test]
fn test_try_acquire() {
    run_scenario(Policy::PriorityDonation, || {
        let lock = Lock::new();
        assert!(lock.try_acquire());
        assert!(lock.held_by_current());
        lock.release();

        // A holder elsewhere makes try_acquire fail without donating.
        lock.acquire();
        let lock_clone = lock.clone();
        let log = EventLog::new();
        let log_clone = log.clone();
        thread::spawn("contender", 40, move || {
            let outcome = if lock_clone.try_acquire() { "got" } else { "busy" };
            log_clone.record(format!("{outcome}:{}", thread::get_priority()));
        })
        .unwrap();

        assert_eq!(log.joined(), "busy:40");
        assert_eq!(thread::get_priority(), thread::PRI_DEFAULT);
        lock.release();
    });
}

#[test]
fn test_timer_monotonic() {
    run_scenario(Policy::PriorityDonation, || {
        let start = timer::ticks();
        timer::external_tick();
        timer::external_tick();
        assert_eq!(timer::elapsed(start), 2);
    });
}

#[test]
fn test_sub_tick_sleep_returns() {
    run_scenario(Policy::PriorityDonation, || {
        // Under one tick at 100 Hz: busy-waits instead of sleeping.
        timer::usleep(100);
        timer::ndelay(500);
        // A tick's worth of milliseconds goes through the sleep queue
        // and needs the (virtual) clock to advance.
        let start = timer::ticks();
        timer::msleep(1000 / timer::FREQUENCY);
        assert!(timer::elapsed(start) >= 1);
    });
}

#[test]
fn test_spawn_rejected_without_kernel() {
    // Hold off concurrent kernel runs; outside one there is nothing to
    // schedule onto.
    let _no_kernel = crate::kernel::lock_runs();
    let result = thread::spawn("orphan", 10, || {});
    assert_eq!(result.unwrap_err(), crate::errors::SpawnError::NotBooted);
}

#[test]
#[should_panic(expected = "release of a lock not held")]
fn test_release_without_holding_panics() {
    run_scenario(Policy::PriorityDonation, || {
        let lock = Lock::new();
        lock.release();
    });
}

#[test]
#[should_panic(expected = "recursive acquire")]
fn test_recursive_acquire_panics() {
    run_scenario(Policy::PriorityDonation, || {
        let lock = Lock::new();
        lock.acquire();
        lock.acquire();
    });
}

#[test]
#[should_panic(expected = "cannot yield inside an interrupt handler")]
fn test_yield_from_interrupt_context_panics() {
    run_scenario(Policy::PriorityDonation, || {
        crate::interrupt::dispatch_external(|| {
            thread::yield_now();
        });
    });
}

#[test]
#[should_panic(expected = "outside [0, 63]")]
fn test_spawn_priority_out_of_range_panics() {
    run_scenario(Policy::PriorityDonation, || {
        let _ = thread::spawn("bad", 64, || {});
    });
}
