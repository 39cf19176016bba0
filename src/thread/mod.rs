//! Thread control blocks and the scheduler core.
//!
//! One CPU, one running thread. Every other live thread is on exactly one
//! of: the ready queue (runnable, sorted by effective priority), the
//! sleep queue (blocked until a tick deadline), or some primitive's wait
//! queue (blocked indefinitely). The kernel state that ties this together
//! lives behind a single process-wide handle and is only ever touched
//! with interrupts disabled; see [`crate::interrupt`] for the discipline.
//!
//! Suspension points are `block`, `yield_now`, `sleep_until` and `exit`
//! (and the synchronization operations built on `block`). Each documents
//! its interrupt-level precondition; violating one is a kernel bug and
//! panics.

use crate::arch::{Arch, DefaultArch};
use crate::errors::{SpawnError, SpawnResult};
use crate::fixed_point::Fixed;
use crate::interrupt::{self, Level};
use crate::mem::stack_pool::STACK_POOL;
use crate::mem::{Stack, StackSizeClass};
use crate::sched::{mlfqs, Policy, ReadyQueue, SleepQueue};
use crate::sync::Lock;
use portable_atomic::{AtomicU32, Ordering};

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

/// Lowest priority.
pub const PRI_MIN: i32 = 0;

/// Default priority for new threads.
pub const PRI_DEFAULT: i32 = 31;

/// Highest priority.
pub const PRI_MAX: i32 = 63;

/// Consecutive ticks a thread may run before preemption is requested.
pub const TIME_SLICE: u32 = 4;

/// Maximum length of a thread name in characters; longer names are cut.
pub const THREAD_NAME_MAX: usize = 15;

/// Pattern written at the overflow end of every spawned stack. Checked at
/// every dispatch; a mismatch means the thread overflowed its stack.
const STACK_CANARY: u64 = 0x6b6c_7264_5f70_7269;

/// Stack size class used for spawned threads.
const SPAWN_STACK_CLASS: StackSizeClass = StackSizeClass::Large;

/// Unique identifier for threads.
///
/// Allocated monotonically; never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(u32);

impl Tid {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Tid(raw)
    }

    /// The raw id value.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for Tid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// On the ready queue, waiting for the CPU.
    Ready,
    /// Currently executing.
    Running,
    /// Waiting on a primitive or a sleep deadline.
    Blocked,
    /// Finished; stack reclaimed by the next thread dispatched.
    Dying,
}

/// A thread control block.
///
/// Owned by the kernel state table. Handed out by reference through
/// [`foreach`]; everything else goes through tid-keyed functions.
pub struct Thread {
    pub(crate) tid: Tid,
    pub(crate) name: String,
    pub(crate) status: ThreadStatus,
    /// Priority assigned at creation or by `set_priority`.
    pub(crate) init_priority: i32,
    /// Effective priority: `init_priority`, possibly raised by donation,
    /// or the MLFQS-computed value under that policy.
    pub(crate) priority: i32,
    pub(crate) nice: i32,
    pub(crate) recent_cpu: Fixed,
    /// Absolute wake deadline while on the sleep queue.
    pub(crate) awake_tick: Option<i64>,
    /// The lock this thread is blocked on; the donation chain follows
    /// these edges upward through successive holders.
    pub(crate) awaiting_lock: Option<Lock>,
    /// Threads currently donating their priority to this one.
    pub(crate) donations: Vec<Tid>,
    pub(crate) context: <DefaultArch as Arch>::SavedContext,
    /// None for the initial thread, which runs on the boot stack.
    pub(crate) stack: Option<Stack>,
    pub(crate) entry: Option<Box<dyn FnOnce() + Send>>,
}

impl Thread {
    /// The thread's unique identifier.
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// The thread's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The thread's current execution state.
    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    /// The thread's effective priority.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The thread's base priority, before donation.
    pub fn init_priority(&self) -> i32 {
        self.init_priority
    }

    /// The thread's nice value.
    pub fn nice(&self) -> i32 {
        self.nice
    }
}

/// The process-wide scheduler state.
///
/// Initialized at boot, torn down when [`crate::kernel::run`] returns.
/// The spin mutex satisfies the compiler; the real protection is the
/// interrupt gate, which is why [`with_state`] insists on it.
pub(crate) struct KernelState {
    /// Every live thread, keyed by tid. The box keeps each control
    /// block's address stable while the map reshapes.
    pub(crate) threads: BTreeMap<Tid, Box<Thread>>,
    /// Live threads in creation order; exit removes its entry.
    pub(crate) all: Vec<Tid>,
    pub(crate) ready: ReadyQueue,
    pub(crate) sleepers: SleepQueue,
    pub(crate) current: Tid,
    pub(crate) idle: Option<Tid>,
    pub(crate) initial: Tid,
    pub(crate) policy: Policy,
    pub(crate) load_avg: Fixed,
    /// Ticks the current thread has run in its slice.
    pub(crate) slice_ticks: u32,
    pub(crate) idle_ticks: i64,
    pub(crate) kernel_ticks: i64,
    /// Outgoing thread of an in-progress switch; consumed by
    /// `schedule_tail` on the other side.
    pub(crate) prev: Option<Tid>,
}

static STATE: spin::Mutex<Option<KernelState>> = spin::Mutex::new(None);

/// Raw tid of the running thread, 0 when no kernel is running. Readable
/// without the gate; everything else goes through [`with_state`].
static CURRENT: AtomicU32 = AtomicU32::new(0);

static NEXT_TID: AtomicU32 = AtomicU32::new(1);

fn allocate_tid() -> Tid {
    Tid(NEXT_TID.fetch_add(1, Ordering::AcqRel))
}

/// Run `f` against the kernel state.
///
/// # Panics
///
/// Panics if interrupts are enabled (scheduler state is gate-protected)
/// or if no kernel is running.
pub(crate) fn with_state<R>(f: impl FnOnce(&mut KernelState) -> R) -> R {
    assert_eq!(
        interrupt::get_level(),
        Level::Off,
        "scheduler state touched with interrupts enabled"
    );
    let mut guard = STATE.lock();
    let state = guard.as_mut().expect("no kernel is running");
    f(state)
}

/// Whether a kernel has been booted in this process.
pub(crate) fn is_booted() -> bool {
    STATE.lock().is_some()
}

/// Insert a thread into the ready queue at its priority position.
pub(crate) fn ready_insert(state: &mut KernelState, tid: Tid) {
    let KernelState { ready, threads, .. } = state;
    ready.insert(tid, |t| threads[&t].priority);
}

/// Re-sort the ready queue after priorities changed underneath it.
pub(crate) fn ready_resort(state: &mut KernelState) {
    let KernelState { ready, threads, .. } = state;
    ready.resort(|t| threads[&t].priority);
}

/// Recompute a thread's effective priority from its base priority and
/// its remaining donors.
pub(crate) fn refresh_priority(state: &mut KernelState, tid: Tid) {
    let donated = state.threads[&tid]
        .donations
        .iter()
        .map(|donor| state.threads[donor].priority)
        .max()
        .unwrap_or(PRI_MIN);
    let thread = state.threads.get_mut(&tid).expect("refresh of dead thread");
    thread.priority = thread.init_priority.max(donated);
}

// ============================================================================
// Boot and shutdown (driven by crate::kernel)
// ============================================================================

/// Initialize the kernel state with the calling stack as the initial
/// thread. Interrupts must be off.
pub(crate) fn init(policy: Policy) {
    assert_eq!(interrupt::get_level(), Level::Off);

    let tid = allocate_tid();
    let initial = Box::new(Thread {
        tid,
        name: String::from("main"),
        status: ThreadStatus::Running,
        init_priority: PRI_DEFAULT,
        priority: PRI_DEFAULT,
        nice: 0,
        recent_cpu: Fixed::ZERO,
        awake_tick: None,
        awaiting_lock: None,
        donations: Vec::new(),
        context: Default::default(),
        stack: None,
        entry: None,
    });

    let mut threads = BTreeMap::new();
    threads.insert(tid, initial);

    *STATE.lock() = Some(KernelState {
        threads,
        all: alloc::vec![tid],
        ready: ReadyQueue::new(),
        sleepers: SleepQueue::new(),
        current: tid,
        idle: None,
        initial: tid,
        policy,
        load_avg: Fixed::ZERO,
        slice_ticks: 0,
        idle_ticks: 0,
        kernel_ticks: 0,
        prev: None,
    });
    CURRENT.store(tid.raw(), Ordering::Release);
}

/// Spawn the idle thread and enable preemptive scheduling.
///
/// Blocks until the idle thread has registered itself, so the scheduler
/// always has a fallback to dispatch.
pub(crate) fn start() {
    let started = crate::sync::Semaphore::new(0);
    let handshake = started.clone();
    spawn("idle", PRI_MIN, move || idle_loop(handshake))
        .expect("failed to spawn the idle thread");

    interrupt::enable();
    started.down();
}

/// The idle thread: dispatched only when the ready queue is empty.
///
/// It keeps itself blocked so it never appears on the ready queue; the
/// scheduler picks it explicitly as the fallback.
fn idle_loop(started: crate::sync::Semaphore) {
    interrupt::disable();
    with_state(|state| {
        state.idle = Some(state.current);
    });
    interrupt::enable();
    started.up();

    loop {
        interrupt::disable();
        block();

        // Re-dispatched with nothing to run: let a tick change that.
        interrupt::enable();
        DefaultArch::wait_for_interrupt();
    }
}

/// Log statistics and drop all remaining thread state.
///
/// Idempotent: a second call finds nothing to tear down. Threads that
/// were still suspended simply disappear; their stacks are returned to
/// the pool, but values live on those stacks are not dropped.
pub(crate) fn shutdown() {
    assert_eq!(interrupt::get_level(), Level::Off);

    let state = STATE.lock().take();
    CURRENT.store(0, Ordering::Release);
    if let Some(state) = state {
        log::info!(
            "Thread: {} idle ticks, {} kernel ticks",
            state.idle_ticks,
            state.kernel_ticks
        );
        for (_tid, mut thread) in state.threads {
            if let Some(stack) = thread.stack.take() {
                STACK_POOL.deallocate(stack);
            }
        }
    }
}

/// Log the per-bucket tick counters.
pub fn print_stats() {
    let old = interrupt::disable();
    let (idle_ticks, kernel_ticks) =
        with_state(|state| (state.idle_ticks, state.kernel_ticks));
    interrupt::set_level(old);
    log::info!("Thread: {idle_ticks} idle ticks, {kernel_ticks} kernel ticks");
}

// ============================================================================
// Thread lifecycle
// ============================================================================

/// Create a new thread, ready to run `entry` at the given priority.
///
/// The thread is created blocked, registered, and unblocked; if it
/// outranks the caller it runs before `spawn` returns. May be called
/// with interrupts on or off.
///
/// # Errors
///
/// Returns `SpawnError::OutOfMemory` when no stack can be allocated and
/// `SpawnError::NotBooted` outside a kernel run.
///
/// # Panics
///
/// Panics if `priority` is outside `[PRI_MIN, PRI_MAX]`.
pub fn spawn<F>(name: &str, priority: i32, entry: F) -> SpawnResult<Tid>
where
    F: FnOnce() + Send + 'static,
{
    assert!(
        (PRI_MIN..=PRI_MAX).contains(&priority),
        "spawn priority {priority} outside [{PRI_MIN}, {PRI_MAX}]"
    );

    let stack = STACK_POOL
        .allocate(SPAWN_STACK_CLASS)
        .ok_or(SpawnError::OutOfMemory)?;
    stack.install_canary(STACK_CANARY);

    let context =
        unsafe { DefaultArch::initial_context(stack.top(), thread_entry_trampoline) };

    let tid = allocate_tid();
    let thread = Box::new(Thread {
        tid,
        name: name.chars().take(THREAD_NAME_MAX).collect(),
        status: ThreadStatus::Blocked,
        init_priority: priority,
        priority,
        nice: 0,
        recent_cpu: Fixed::ZERO,
        awake_tick: None,
        awaiting_lock: None,
        donations: Vec::new(),
        context,
        stack: Some(stack),
        entry: Some(Box::new(entry)),
    });

    let old = interrupt::disable();
    if !is_booted() {
        interrupt::set_level(old);
        return Err(SpawnError::NotBooted);
    }
    with_state(|state| {
        state.threads.insert(tid, thread);
        state.all.push(tid);
    });
    unblock(tid);
    interrupt::set_level(old);

    log::trace!("spawned thread {tid} ({name}) at priority {priority}");
    preempt_check();
    Ok(tid)
}

/// First code every spawned thread runs, entered from the seeded stack
/// frame by the scheduler's context switch.
extern "C" fn thread_entry_trampoline() -> ! {
    // Finish the switch the scheduler started on the other stack.
    schedule_tail();

    let entry = with_state(|state| {
        let current = state.current;
        state
            .threads
            .get_mut(&current)
            .expect("trampoline with no current thread")
            .entry
            .take()
    })
    .expect("thread dispatched twice through its trampoline");

    interrupt::enable();

    #[cfg(test)]
    {
        // Unwinding off a green-thread stack would walk into the seeded
        // frame terminator; contain test-assert panics here instead.
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(entry)).is_err() {
            log::error!("thread {} panicked", current());
        }
    }
    #[cfg(not(test))]
    entry();

    exit();
}

/// Put the current thread to sleep until some other thread unblocks it.
///
/// The caller must have interrupts off and must already have registered
/// the thread wherever it expects to be woken from (a wait queue, the
/// sleep queue). Suspends; returns once re-dispatched.
pub fn block() {
    assert!(
        !interrupt::in_interrupt_context(),
        "cannot block inside an interrupt handler"
    );
    assert_eq!(
        interrupt::get_level(),
        Level::Off,
        "block requires interrupts off"
    );

    with_state(|state| {
        let current = state.current;
        state
            .threads
            .get_mut(&current)
            .expect("no current thread")
            .status = ThreadStatus::Blocked;
    });
    schedule();
}

/// Transition a blocked thread to ready.
///
/// Does not preempt; the caller decides whether the woken thread should
/// run (see [`preempt_check`]). Safe from any context, including
/// interrupt handlers.
///
/// # Panics
///
/// Panics if the thread is not blocked.
pub fn unblock(tid: Tid) {
    let old = interrupt::disable();
    with_state(|state| {
        {
            let thread = state.threads.get_mut(&tid).expect("unblock of unknown thread");
            assert_eq!(
                thread.status,
                ThreadStatus::Blocked,
                "unblock of thread {tid} which is not blocked"
            );
            thread.status = ThreadStatus::Ready;
        }
        ready_insert(state, tid);
    });
    interrupt::set_level(old);
}

/// Voluntarily give up the CPU; the current thread stays runnable.
///
/// Must not be called from an interrupt handler; handlers use
/// [`interrupt::yield_on_return`] instead.
pub fn yield_now() {
    assert!(
        !interrupt::in_interrupt_context(),
        "cannot yield inside an interrupt handler; use yield_on_return"
    );

    let old = interrupt::disable();
    with_state(|state| {
        let current = state.current;
        if Some(current) != state.idle {
            ready_insert(state, current);
        }
        state
            .threads
            .get_mut(&current)
            .expect("no current thread")
            .status = ThreadStatus::Ready;
    });
    schedule();
    interrupt::set_level(old);
}

/// Terminate the current thread. Never returns.
///
/// The control block and stack are reclaimed by the next thread to be
/// dispatched, not by the dying thread itself.
pub fn exit() -> ! {
    assert!(
        !interrupt::in_interrupt_context(),
        "cannot exit inside an interrupt handler"
    );

    interrupt::disable();
    with_state(|state| {
        let current = state.current;
        state.all.retain(|&tid| tid != current);
        state
            .threads
            .get_mut(&current)
            .expect("no current thread")
            .status = ThreadStatus::Dying;
    });
    schedule();
    unreachable!("a dying thread was rescheduled");
}

/// Sleep until the tick counter reaches `awake_tick`.
///
/// Requires interrupts enabled and a non-idle caller. Suspends.
pub fn sleep_until(awake_tick: i64) {
    assert!(
        !interrupt::in_interrupt_context(),
        "cannot sleep inside an interrupt handler"
    );
    let old = interrupt::disable();
    assert_eq!(old, Level::On, "sleep requires interrupts enabled on entry");

    with_state(|state| {
        let current = state.current;
        assert!(
            Some(current) != state.idle,
            "the idle thread cannot sleep"
        );
        state
            .threads
            .get_mut(&current)
            .expect("no current thread")
            .awake_tick = Some(awake_tick);
        state.sleepers.insert(current, awake_tick);
    });
    block();
    interrupt::set_level(old);
}

/// Wake every sleeper whose deadline has passed.
///
/// Called from the timer interrupt. If any woken thread outranks the
/// current one, requests an end-of-interrupt yield.
pub(crate) fn wake(now: i64) {
    with_state(|state| {
        let mut top_woken: Option<i32> = None;
        while let Some(tid) = state.sleepers.pop_due(now) {
            {
                let thread = state.threads.get_mut(&tid).expect("sleeper disappeared");
                assert_eq!(thread.status, ThreadStatus::Blocked);
                thread.awake_tick = None;
                thread.status = ThreadStatus::Ready;
                top_woken = Some(top_woken.map_or(thread.priority, |p| p.max(thread.priority)));
            }
            ready_insert(state, tid);
        }

        if let Some(priority) = top_woken {
            if priority > state.threads[&state.current].priority {
                interrupt::yield_on_return();
            }
        }
    });
}

// ============================================================================
// The dispatcher
// ============================================================================

/// Switch to the next thread to run.
///
/// Preconditions: interrupts off, and the current thread has already
/// left the Running state (and is queued wherever it now belongs). The
/// head of the ready queue runs next, the idle thread if there is none.
pub(crate) fn schedule() {
    assert_eq!(
        interrupt::get_level(),
        Level::Off,
        "schedule requires interrupts off"
    );

    type Context = <DefaultArch as Arch>::SavedContext;
    let switch: Option<(*mut Context, *const Context)> = {
        let mut guard = STATE.lock();
        let state = guard.as_mut().expect("no kernel is running");
        let current = state.current;
        assert_ne!(
            state.threads[&current].status,
            ThreadStatus::Running,
            "schedule with the current thread still running"
        );

        let next = state
            .ready
            .pop()
            .or(state.idle)
            .expect("nothing to schedule and no idle thread");
        state.prev = Some(current);

        if next == current {
            None
        } else {
            let incoming = &state.threads[&next];
            if let Some(stack) = &incoming.stack {
                assert!(
                    stack.check_canary(STACK_CANARY),
                    "stack overflow detected in thread {} ({})",
                    next,
                    incoming.name
                );
            }
            state.current = next;
            CURRENT.store(next.raw(), Ordering::Release);
            let prev_context: *mut Context =
                &mut state.threads.get_mut(&current).expect("outgoing thread").context;
            let next_context: *const Context = &state.threads[&next].context;
            Some((prev_context, next_context))
        }
    };

    // The state lock is released across the switch; interrupts stay off,
    // so nothing runs between here and the other side's schedule_tail.
    if let Some((prev_context, next_context)) = switch {
        unsafe { DefaultArch::context_switch(prev_context, next_context) }
    }
    schedule_tail();
}

/// Completion half of a dispatch, run by the incoming thread.
///
/// Marks itself running, starts a fresh time slice, and reaps the
/// outgoing thread if it was dying (the initial thread is exempt: it
/// owns the boot stack).
pub(crate) fn schedule_tail() {
    assert_eq!(interrupt::get_level(), Level::Off);

    let reaped = with_state(|state| {
        let current = state.current;
        state
            .threads
            .get_mut(&current)
            .expect("no current thread")
            .status = ThreadStatus::Running;
        state.slice_ticks = 0;

        match state.prev.take() {
            Some(prev)
                if prev != current
                    && prev != state.initial
                    && state
                        .threads
                        .get(&prev)
                        .is_some_and(|t| t.status == ThreadStatus::Dying) =>
            {
                state.threads.remove(&prev)
            }
            _ => None,
        }
    });

    if let Some(mut dead) = reaped {
        log::trace!("reaped thread {} ({})", dead.tid, dead.name);
        if let Some(stack) = dead.stack.take() {
            STACK_POOL.deallocate(stack);
        }
    }
}

/// Yield if the head of the ready queue outranks the current thread.
///
/// From an interrupt handler the yield is deferred to the handler
/// epilogue. Called after every operation that can make a
/// higher-priority thread runnable.
pub(crate) fn preempt_check() {
    let old = interrupt::disable();
    let should_yield = {
        let guard = STATE.lock();
        match guard.as_ref() {
            Some(state) => match state.ready.front() {
                Some(front) => {
                    state.threads[&front].priority > state.threads[&state.current].priority
                }
                None => false,
            },
            None => false,
        }
    };
    interrupt::set_level(old);

    if should_yield {
        if interrupt::in_interrupt_context() {
            interrupt::yield_on_return();
        } else {
            yield_now();
        }
    }
}

// ============================================================================
// Per-tick accounting
// ============================================================================

/// Timer-interrupt accounting: tick buckets and time-slice expiry.
pub(crate) fn tick() {
    with_state(|state| {
        if Some(state.current) == state.idle {
            state.idle_ticks += 1;
        } else {
            state.kernel_ticks += 1;
        }

        state.slice_ticks += 1;
        if state.slice_ticks >= TIME_SLICE {
            interrupt::yield_on_return();
        }
    });
}

/// MLFQS cadence work, run from the timer interrupt.
///
/// No-op under the priority-donation policy.
pub(crate) fn mlfqs_tick(now: i64) {
    with_state(|state| {
        if state.policy != Policy::Mlfqs {
            return;
        }

        // Every tick: the running thread accrues CPU.
        let current = state.current;
        if Some(current) != state.idle {
            let thread = state.threads.get_mut(&current).expect("no current thread");
            thread.recent_cpu = thread.recent_cpu.add_int(1);
        }

        // Once per second: refresh the load average, decay everyone.
        if now % crate::timer::FREQUENCY == 0 {
            let running = if Some(current) != state.idle { 1 } else { 0 };
            let ready_threads = state.ready.len() as i32 + running;
            state.load_avg = mlfqs::load_avg(state.load_avg, ready_threads);

            let load_avg = state.load_avg;
            for i in 0..state.all.len() {
                let tid = state.all[i];
                if let Some(thread) = state.threads.get_mut(&tid) {
                    thread.recent_cpu =
                        mlfqs::decay_recent_cpu(thread.recent_cpu, load_avg, thread.nice);
                }
            }
        }

        // Every fourth tick: recompute every priority, restore order.
        if now % mlfqs::PRIORITY_INTERVAL == 0 {
            for i in 0..state.all.len() {
                let tid = state.all[i];
                if Some(tid) == state.idle {
                    continue;
                }
                if let Some(thread) = state.threads.get_mut(&tid) {
                    thread.priority = mlfqs::priority(thread.recent_cpu, thread.nice);
                }
            }
            ready_resort(state);
        }
    });
}

// ============================================================================
// Introspection and tuning
// ============================================================================

/// The running thread's id.
///
/// # Panics
///
/// Panics when no kernel is running.
pub fn current() -> Tid {
    let raw = CURRENT.load(Ordering::Acquire);
    assert_ne!(raw, 0, "no kernel is running");
    Tid(raw)
}

/// The running thread's name.
pub fn name() -> String {
    let old = interrupt::disable();
    let name = with_state(|state| state.threads[&state.current].name.clone());
    interrupt::set_level(old);
    name
}

/// Visit every live thread. Interrupts must be off.
pub fn foreach(mut f: impl FnMut(&Thread)) {
    assert_eq!(
        interrupt::get_level(),
        Level::Off,
        "foreach requires interrupts off"
    );
    with_state(|state| {
        for i in 0..state.all.len() {
            let tid = state.all[i];
            if let Some(thread) = state.threads.get(&tid) {
                f(thread);
            }
        }
    });
}

/// Set the current thread's base priority and recompute its effective
/// priority; yields if it no longer outranks the ready queue.
///
/// Ignored under the MLFQS policy, which owns all priorities.
///
/// # Panics
///
/// Panics if `new_priority` is outside `[PRI_MIN, PRI_MAX]`.
pub fn set_priority(new_priority: i32) {
    assert!(
        (PRI_MIN..=PRI_MAX).contains(&new_priority),
        "priority {new_priority} outside [{PRI_MIN}, {PRI_MAX}]"
    );

    let old = interrupt::disable();
    let ignored = with_state(|state| {
        if state.policy == Policy::Mlfqs {
            return true;
        }
        let current = state.current;
        state
            .threads
            .get_mut(&current)
            .expect("no current thread")
            .init_priority = new_priority;
        refresh_priority(state, current);
        false
    });
    interrupt::set_level(old);

    if !ignored {
        preempt_check();
    }
}

/// The current thread's effective priority.
pub fn get_priority() -> i32 {
    let old = interrupt::disable();
    let priority = with_state(|state| state.threads[&state.current].priority);
    interrupt::set_level(old);
    priority
}

/// Set the current thread's nice value. Under MLFQS the thread's
/// priority is recomputed immediately and the CPU is yielded if the
/// thread no longer outranks the ready queue.
///
/// # Panics
///
/// Panics if `nice` is outside `[NICE_MIN, NICE_MAX]`.
pub fn set_nice(nice: i32) {
    assert!(
        (mlfqs::NICE_MIN..=mlfqs::NICE_MAX).contains(&nice),
        "nice {nice} outside [{}, {}]",
        mlfqs::NICE_MIN,
        mlfqs::NICE_MAX
    );

    let old = interrupt::disable();
    with_state(|state| {
        let current = state.current;
        state
            .threads
            .get_mut(&current)
            .expect("no current thread")
            .nice = nice;

        if state.policy == Policy::Mlfqs {
            let thread = &state.threads[&current];
            let priority = mlfqs::priority(thread.recent_cpu, thread.nice);
            state
                .threads
                .get_mut(&current)
                .expect("no current thread")
                .priority = priority;
            ready_resort(state);
        }
    });
    interrupt::set_level(old);
    preempt_check();
}

/// The current thread's nice value.
pub fn get_nice() -> i32 {
    let old = interrupt::disable();
    let nice = with_state(|state| state.threads[&state.current].nice);
    interrupt::set_level(old);
    nice
}

/// The system load average times 100, rounded to the nearest integer.
pub fn get_load_avg() -> i32 {
    let old = interrupt::disable();
    let load_avg = with_state(|state| state.load_avg);
    interrupt::set_level(old);
    load_avg.mul_int(100).to_int_round()
}

/// The current thread's `recent_cpu` times 100, rounded to nearest.
pub fn get_recent_cpu() -> i32 {
    let old = interrupt::disable();
    let recent_cpu = with_state(|state| state.threads[&state.current].recent_cpu);
    interrupt::set_level(old);
    recent_cpu.mul_int(100).to_int_round()
}
