//! Single-CPU interrupt gate.
//!
//! All scheduler state in this crate is protected by disabling
//! interrupts, not by locks: locks are scheduler *clients*. This module
//! is the software half of that discipline. It tracks the interrupt
//! level, whether execution is currently inside an external interrupt
//! handler, and the deferred-yield request an interrupt handler can file
//! in place of yielding directly.
//!
//! A bare-metal port wires its interrupt stubs to [`dispatch_external`];
//! the shipped host backend calls it from its virtual tick source (see
//! [`crate::arch`]). Either way the contract is the same: the handler
//! body runs with the gate closed, and a requested yield is performed
//! right after the handler body, before the interrupted context resumes.

use portable_atomic::{AtomicBool, Ordering};

/// Interrupt level: are external interrupts deliverable right now?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Interrupts may be delivered.
    On,
    /// Interrupt delivery is held off.
    Off,
}

/// Whether interrupts are currently enabled.
static ENABLED: AtomicBool = AtomicBool::new(false);

/// Whether we are currently inside an external interrupt handler.
static IN_HANDLER: AtomicBool = AtomicBool::new(false);

/// Set by a handler that wants a yield once the handler returns.
static YIELD_ON_RETURN: AtomicBool = AtomicBool::new(false);

/// Get the current interrupt level.
#[inline]
pub fn get_level() -> Level {
    if ENABLED.load(Ordering::Acquire) {
        Level::On
    } else {
        Level::Off
    }
}

/// Enable interrupts, returning the previous level.
///
/// # Panics
///
/// Panics if called from within an interrupt handler: handlers run with
/// interrupts off and must stay that way.
pub fn enable() -> Level {
    assert!(
        !in_interrupt_context(),
        "interrupts cannot be enabled inside an interrupt handler"
    );
    if ENABLED.swap(true, Ordering::AcqRel) {
        Level::On
    } else {
        Level::Off
    }
}

/// Disable interrupts, returning the previous level.
pub fn disable() -> Level {
    if ENABLED.swap(false, Ordering::AcqRel) {
        Level::On
    } else {
        Level::Off
    }
}

/// Set the interrupt level, returning the previous one.
pub fn set_level(level: Level) -> Level {
    match level {
        Level::On => enable(),
        Level::Off => disable(),
    }
}

/// True while executing an external interrupt handler.
#[inline]
pub fn in_interrupt_context() -> bool {
    IN_HANDLER.load(Ordering::Acquire)
}

/// Request a yield to run once the current interrupt handler returns.
///
/// Handlers must not yield directly (the interrupted thread's state is
/// still live); this defers the yield to the handler epilogue.
///
/// # Panics
///
/// Panics if called outside an interrupt handler.
pub fn yield_on_return() {
    assert!(
        in_interrupt_context(),
        "yield_on_return is only meaningful inside an interrupt handler"
    );
    YIELD_ON_RETURN.store(true, Ordering::Release);
}

/// Deliver one external interrupt.
///
/// Models the hardware's interrupt entry/exit sequence: the handler body
/// runs with interrupts off and the in-handler flag set; afterwards any
/// deferred yield requested via [`yield_on_return`] is performed, still
/// with interrupts off, and only then is the gate reopened.
///
/// # Panics
///
/// Panics if interrupts are off (hardware would hold the interrupt
/// pending, so delivering one here is a bug in the caller) or if a
/// handler is already running (this is a single-CPU gate; handlers do
/// not nest).
pub fn dispatch_external(handler: impl FnOnce()) {
    assert_eq!(
        get_level(),
        Level::On,
        "external interrupt delivered while interrupts are off"
    );
    assert!(
        !in_interrupt_context(),
        "external interrupt handlers do not nest"
    );

    ENABLED.store(false, Ordering::Release);
    IN_HANDLER.store(true, Ordering::Release);

    handler();

    IN_HANDLER.store(false, Ordering::Release);
    if YIELD_ON_RETURN.swap(false, Ordering::AcqRel) {
        // Preemption point: the interrupted thread is switched out here
        // and resumes, later, by returning from this call.
        crate::thread::yield_now();
    }
    ENABLED.store(true, Ordering::Release);
}

/// Reset the gate to its boot state: interrupts off, no handler active.
pub(crate) fn reset_for_boot() {
    ENABLED.store(false, Ordering::Release);
    IN_HANDLER.store(false, Ordering::Release);
    YIELD_ON_RETURN.store(false, Ordering::Release);
}
