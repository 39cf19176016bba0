//! Kernel boot, run and shutdown.
//!
//! [`run`] is the crate's front door: it initializes the scheduler with
//! the calling stack as the initial thread, brings up the idle thread,
//! enables interrupts, runs the supplied closure as the initial thread's
//! body, and tears everything down when it returns.
//!
//! One kernel per process at a time; concurrent calls to [`run`] from
//! other host threads queue up behind the active one.

use crate::interrupt;
use crate::sched::Policy;
use crate::thread;
use crate::timer;

/// Boot-time configuration.
///
/// The one knob the scheduler core exposes is the policy switch; it
/// mirrors the `-mlfqs` boot flag of classic teaching kernels.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelConfig {
    /// Scheduling policy; defaults to priority scheduling with donation.
    pub policy: Policy,
}

impl KernelConfig {
    /// Default configuration: priority scheduling with donation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the multi-level feedback queue policy.
    pub fn mlfqs(mut self) -> Self {
        self.policy = Policy::Mlfqs;
        self
    }
}

/// Serializes whole kernel runs within the process.
static RUN_LOCK: spin::Mutex<()> = spin::Mutex::new(());

/// Hold off kernel runs without starting one.
#[cfg(test)]
pub(crate) fn lock_runs() -> spin::MutexGuard<'static, ()> {
    RUN_LOCK.lock()
}

/// Tears the kernel down when `run` returns, by unwind or otherwise, so
/// a later boot always starts from nothing.
struct ShutdownGuard;

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        interrupt::disable();
        timer::print_stats();
        thread::shutdown();
    }
}

/// Boot a kernel, run `main` as the initial thread, then shut down.
///
/// `main` executes on the caller's own stack as the thread named "main"
/// at [`thread::PRI_DEFAULT`]. When it returns, interrupts are disabled,
/// statistics are logged, and every remaining thread is discarded:
/// stacks go back to the pool, but values still live on a suspended
/// thread's stack are not dropped. Join anything you care about (via a
/// semaphore, typically) before returning.
///
/// The initial thread must not call [`thread::exit`]; with no initial
/// thread left to return from `main`, the kernel would idle forever.
pub fn run<F: FnOnce()>(config: KernelConfig, main: F) {
    let _running = RUN_LOCK.lock();

    interrupt::reset_for_boot();
    thread::init(config.policy);
    log::info!("kernel booting with {:?} scheduling", config.policy);

    // Bring up the idle thread and enable preemptive scheduling.
    thread::start();
    timer::init();

    let _teardown = ShutdownGuard;
    main();
}
