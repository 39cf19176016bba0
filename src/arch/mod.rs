//! Architecture abstraction layer for context switching.
//!
//! This module provides a unified interface for the architecture-specific
//! operations the scheduler core cannot express portably: switching
//! between thread stacks, seeding a brand-new stack so the first dispatch
//! lands in the thread trampoline, and waiting for the next timer
//! interrupt when the CPU has nothing to run.

/// Architecture abstraction trait.
///
/// This trait must be implemented for each supported CPU architecture.
/// The scheduler calls it with interrupts disabled; implementations do
/// not need to protect themselves against reentry.
///
/// # Safety
///
/// Implementations of this trait involve direct stack manipulation and
/// inline assembly. All methods marked as unsafe have specific
/// preconditions that must be upheld by the caller.
pub trait Arch {
    /// Architecture-specific saved context type.
    ///
    /// This type must contain everything needed to suspend and later
    /// resume a thread at a call boundary (for the shipped backend that
    /// is a single saved stack pointer; callee-saved registers live on
    /// the thread's own stack).
    type SavedContext: Send + Sync + Default;

    /// Whether this platform delivers timer interrupts asynchronously.
    ///
    /// When false (the host backend), ticks only arrive at explicit
    /// delivery points and boot skips the busy-wait calibration, which
    /// could never observe a tick edge.
    const ASYNC_TICKS: bool;

    /// Switch from one thread context to another.
    ///
    /// Saves the current execution state into `prev` and resumes
    /// execution from `next`. Returns (much later) when something
    /// switches back into `prev`.
    ///
    /// # Safety
    ///
    /// - `prev` must point to a valid, properly aligned SavedContext
    /// - `next` must point to a valid, properly aligned SavedContext
    ///   holding either a previously saved state or one produced by
    ///   [`Arch::initial_context`]
    /// - Both pointers must remain valid for the duration of the call
    /// - Must be called with interrupts disabled
    unsafe fn context_switch(prev: *mut Self::SavedContext, next: *const Self::SavedContext);

    /// Build the saved context for a thread that has never run.
    ///
    /// The first `context_switch` into the returned context must begin
    /// execution at `entry` on the given stack.
    ///
    /// # Safety
    ///
    /// `stack_top` must be the highest address of a writable stack region
    /// large enough for the seed frame and the thread's execution.
    unsafe fn initial_context(
        stack_top: *mut u8,
        entry: extern "C" fn() -> !,
    ) -> Self::SavedContext;

    /// Idle until the next timer interrupt.
    ///
    /// Called by the idle thread with interrupts enabled and nothing on
    /// the ready queue.
    fn wait_for_interrupt();
}

/// A no-op architecture implementation for API-only builds.
///
/// This implementation cannot actually dispatch threads and exists so the
/// crate compiles on hosts without a real backend (`std-shim` feature).
pub struct NoOpArch;

impl Arch for NoOpArch {
    type SavedContext = ();

    const ASYNC_TICKS: bool = false;

    unsafe fn context_switch(_prev: *mut Self::SavedContext, _next: *const Self::SavedContext) {
        // No-op: nothing to switch to.
    }

    unsafe fn initial_context(
        _stack_top: *mut u8,
        _entry: extern "C" fn() -> !,
    ) -> Self::SavedContext {
    }

    fn wait_for_interrupt() {
        core::hint::spin_loop();
    }
}

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "x86_64")]
pub use x86_64::X86_64Arch as DefaultArch;

// For API-only builds on other hosts
#[cfg(all(not(target_arch = "x86_64"), feature = "std-shim"))]
pub use self::NoOpArch as DefaultArch;

// Compile error for unsupported configurations
#[cfg(all(not(target_arch = "x86_64"), not(feature = "std-shim")))]
compile_error!("priority-threads ships a context-switch backend for x86_64 only. Build for x86_64 or enable the std-shim feature for an API-only build.");
