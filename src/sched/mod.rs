//! Scheduling discipline: queue ordering and policy selection.
//!
//! The scheduler proper lives in [`crate::thread`]; this module owns the
//! two ordered queues it schedules from and the boot-time policy switch
//! between strict priority scheduling with donation and the
//! multi-level-feedback-queue policy.

pub mod mlfqs;

use crate::thread::Tid;
use alloc::vec::Vec;

/// Scheduling policy, selected once at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Strict priority scheduling with priority donation through locks.
    PriorityDonation,
    /// Multi-level feedback queue: priorities derived from recent CPU
    /// usage, load average and niceness. Donation is disabled and
    /// explicit priority changes are ignored.
    Mlfqs,
}

impl Default for Policy {
    fn default() -> Self {
        Policy::PriorityDonation
    }
}

/// The ready queue: runnable threads in non-increasing priority order.
///
/// Ties keep insertion order, so equal-priority threads run FIFO. The
/// queue stores thread ids only; priorities are looked up through the
/// closure each operation takes, because donation and MLFQS recomputation
/// change priorities while threads sit queued.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    queue: Vec<Tid>,
}

impl ReadyQueue {
    pub const fn new() -> Self {
        Self { queue: Vec::new() }
    }

    /// Insert a thread behind every queued thread of equal or higher
    /// priority.
    pub fn insert(&mut self, tid: Tid, priority_of: impl Fn(Tid) -> i32) {
        let priority = priority_of(tid);
        let position = self
            .queue
            .iter()
            .position(|&queued| priority_of(queued) < priority)
            .unwrap_or(self.queue.len());
        self.queue.insert(position, tid);
    }

    /// Restore priority order after queued threads' priorities changed.
    ///
    /// The sort is stable, so equal-priority threads keep their relative
    /// order.
    pub fn resort(&mut self, priority_of: impl Fn(Tid) -> i32) {
        self.queue.sort_by_key(|&tid| core::cmp::Reverse(priority_of(tid)));
    }

    /// The next thread to run, without removing it.
    pub fn front(&self) -> Option<Tid> {
        self.queue.first().copied()
    }

    /// Remove and return the next thread to run.
    pub fn pop(&mut self) -> Option<Tid> {
        if self.queue.is_empty() {
            None
        } else {
            Some(self.queue.remove(0))
        }
    }

    /// Remove a specific thread from the queue.
    pub fn remove(&mut self, tid: Tid) {
        self.queue.retain(|&queued| queued != tid);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued tids in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = Tid> + '_ {
        self.queue.iter().copied()
    }
}

/// The sleep queue: blocked sleepers in non-decreasing deadline order.
///
/// Deadlines are fixed for the duration of a sleep, so entries carry
/// their deadline with them. Ties keep insertion order.
#[derive(Debug, Default)]
pub struct SleepQueue {
    queue: Vec<SleepEntry>,
}

#[derive(Debug, Clone, Copy)]
struct SleepEntry {
    awake_tick: i64,
    tid: Tid,
}

impl SleepQueue {
    pub const fn new() -> Self {
        Self { queue: Vec::new() }
    }

    /// Insert a sleeper behind every entry with an equal or earlier
    /// deadline.
    pub fn insert(&mut self, tid: Tid, awake_tick: i64) {
        let position = self
            .queue
            .iter()
            .position(|entry| entry.awake_tick > awake_tick)
            .unwrap_or(self.queue.len());
        self.queue.insert(position, SleepEntry { awake_tick, tid });
    }

    /// Remove and return the next sleeper whose deadline has passed.
    ///
    /// Because the queue is sorted, scanning stops at the first entry
    /// that is not yet due; a full wake pass is O(number woken).
    pub fn pop_due(&mut self, now: i64) -> Option<Tid> {
        match self.queue.first() {
            Some(entry) if entry.awake_tick <= now => Some(self.queue.remove(0).tid),
            _ => None,
        }
    }

    /// The earliest deadline in the queue.
    pub fn next_deadline(&self) -> Option<i64> {
        self.queue.first().map(|entry| entry.awake_tick)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued tids in wake order.
    pub fn iter(&self) -> impl Iterator<Item = Tid> + '_ {
        self.queue.iter().map(|entry| entry.tid)
    }
}
