//! Tick counting, sleeping and sub-tick delays.
//!
//! The tick counter is the kernel's only clock. An external periodic
//! interrupt source drives it through [`external_tick`]; on a hardware
//! port that is the platform timer's ISR stub, on the host backend it is
//! the virtual tick delivered by `Arch::wait_for_interrupt`.
//!
//! Sleeps at tick granularity go through the scheduler's sleep queue.
//! Shorter sleeps ([`usleep`], [`nsleep`] below one tick) busy-wait,
//! scaled by a loops-per-tick figure established at boot.

use crate::arch::{Arch, DefaultArch};
use crate::interrupt::{self, Level};
use crate::thread;
use portable_atomic::{AtomicI64, AtomicU64, Ordering};

/// Timer interrupt frequency in Hz.
pub const FREQUENCY: i64 = 100;

// The 8254-style divisor behind a tick source bounds the usable range.
const _: () = assert!(FREQUENCY >= 19, "tick source requires FREQUENCY >= 19");
const _: () = assert!(FREQUENCY <= 1000, "FREQUENCY <= 1000 required");

/// Ticks since boot.
static TICKS: AtomicI64 = AtomicI64::new(0);

/// Busy-wait iterations per timer tick, set at boot.
static LOOPS_PER_TICK: AtomicU64 = AtomicU64::new(0);

/// Loops-per-tick used when the platform has no asynchronous tick source
/// to calibrate against.
const DEFAULT_LOOPS_PER_TICK: u64 = 1 << 10;

/// Ticks elapsed since boot.
pub fn ticks() -> i64 {
    TICKS.load(Ordering::Acquire)
}

/// Ticks elapsed since `then`, which must be a previous [`ticks`] value.
pub fn elapsed(then: i64) -> i64 {
    ticks() - then
}

/// Sleep for approximately `duration` timer ticks.
///
/// Suspends; requires interrupts enabled. The thread wakes on the first
/// tick at or after the deadline, so the actual delay is at least
/// `duration` ticks.
pub fn sleep(duration: i64) {
    let start = ticks();

    assert_eq!(
        interrupt::get_level(),
        Level::On,
        "timer::sleep requires interrupts enabled"
    );
    thread::sleep_until(start + duration);
}

/// Sleep for approximately `ms` milliseconds.
pub fn msleep(ms: i64) {
    real_time_sleep(ms, 1000);
}

/// Sleep for approximately `us` microseconds.
pub fn usleep(us: i64) {
    real_time_sleep(us, 1000 * 1000);
}

/// Sleep for approximately `ns` nanoseconds.
pub fn nsleep(ns: i64) {
    real_time_sleep(ns, 1000 * 1000 * 1000);
}

/// Busy-wait for approximately `ms` milliseconds.
///
/// Wastes CPU; prefer [`msleep`] unless interrupts must stay untouched.
pub fn mdelay(ms: i64) {
    real_time_delay(ms, 1000);
}

/// Busy-wait for approximately `us` microseconds.
pub fn udelay(us: i64) {
    real_time_delay(us, 1000 * 1000);
}

/// Busy-wait for approximately `ns` nanoseconds.
pub fn ndelay(ns: i64) {
    real_time_delay(ns, 1000 * 1000 * 1000);
}

/// Log the tick count since boot.
pub fn print_stats() {
    log::info!("Timer: {} ticks", ticks());
}

/// Deliver one timer interrupt.
///
/// This is the tick source's entry point: a hardware port calls it from
/// the platform timer's interrupt stub, the host backend calls it from
/// its virtual halt. Interrupts must be on (hardware would be holding
/// the interrupt pending otherwise).
pub fn external_tick() {
    interrupt::dispatch_external(|| {
        let now = TICKS.fetch_add(1, Ordering::AcqRel) + 1;
        thread::tick();
        thread::mlfqs_tick(now);
        thread::wake(now);
    });
}

/// Sleep for `num / denom` seconds, busy-waiting when that is less than
/// one tick.
fn real_time_sleep(num: i64, denom: i64) {
    // Convert to ticks, rounding down:
    //   num / denom s * FREQUENCY ticks/s
    let duration = num * FREQUENCY / denom;

    assert_eq!(
        interrupt::get_level(),
        Level::On,
        "real-time sleep requires interrupts enabled"
    );
    if duration > 0 {
        // At least one full tick: let the scheduler have the CPU.
        sleep(duration);
    } else {
        // Sub-tick: a busy-wait is more accurate than sleeping a tick.
        real_time_delay(num, denom);
    }
}

/// Busy-wait for `num / denom` seconds.
fn real_time_delay(num: i64, denom: i64) {
    // Scaled to avoid overflow: denominators are powers of 1000.
    assert!(denom % 1000 == 0, "denominator must be a multiple of 1000");
    let loops_per_tick = LOOPS_PER_TICK.load(Ordering::Acquire) as i64;
    busy_wait(loops_per_tick * num / 1000 * FREQUENCY / (denom / 1000));
}

/// Run `loops` iterations of a tight loop.
///
/// Kept out of line so the per-iteration cost the calibration measured
/// stays stable across call sites.
#[inline(never)]
fn busy_wait(mut loops: i64) {
    while loops > 0 {
        core::hint::spin_loop();
        loops -= 1;
    }
}

/// Measure loops-per-tick against the running tick source.
///
/// Doubles a candidate until it overshoots one tick, then refines one
/// bit at a time. Requires interrupts enabled and an asynchronous tick
/// source; boot only runs this when the architecture advertises one.
///
/// # Panics
///
/// Panics if the loop count overflows without ever spanning a tick,
/// which means the tick source is not actually running.
pub fn calibrate() {
    assert_eq!(
        interrupt::get_level(),
        Level::On,
        "timer calibration runs with interrupts enabled"
    );
    log::info!("Calibrating timer...");

    // Coarse: largest power of two that still fits in one tick.
    let mut loops_per_tick: u64 = 1 << 10;
    while !too_many_loops(loops_per_tick << 1) {
        loops_per_tick <<= 1;
        assert!(loops_per_tick != 0, "timer calibration failed to converge");
    }

    // Fine: refine the next eight bits.
    let high_bit = loops_per_tick;
    let mut test_bit = high_bit >> 1;
    while test_bit != high_bit >> 10 {
        if !too_many_loops(loops_per_tick | test_bit) {
            loops_per_tick |= test_bit;
        }
        test_bit >>= 1;
    }

    LOOPS_PER_TICK.store(loops_per_tick, Ordering::Release);
    log::info!(
        "{} loops/s",
        loops_per_tick.saturating_mul(FREQUENCY as u64)
    );
}

/// True if `loops` iterations of the busy wait span more than one tick.
fn too_many_loops(loops: u64) -> bool {
    // Wait for a tick boundary so the measurement starts fresh.
    let start = ticks();
    while ticks() == start {
        core::hint::spin_loop();
    }

    let start = ticks();
    busy_wait(loops as i64);
    ticks() != start
}

/// Establish the boot-time loops-per-tick figure.
///
/// Measured when the platform delivers ticks asynchronously; seeded with
/// a fixed figure otherwise, since the measurement loop would never see
/// a tick edge.
pub(crate) fn init() {
    TICKS.store(0, Ordering::Release);
    if DefaultArch::ASYNC_TICKS {
        calibrate();
    } else {
        LOOPS_PER_TICK.store(DEFAULT_LOOPS_PER_TICK, Ordering::Release);
        log::debug!(
            "timer calibration skipped (no asynchronous tick source); {} loops/tick",
            DEFAULT_LOOPS_PER_TICK
        );
    }
}
