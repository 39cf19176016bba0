//! x86_64 context switching over green-thread stacks.
//!
//! The switch saves the System-V callee-saved registers on the outgoing
//! thread's stack, stores its stack pointer, and restores the incoming
//! thread's stack pointer and registers. Because only callee-saved state
//! crosses the boundary, the same primitive works in a bare-metal kernel
//! and inside an ordinary host process, which is how the test suite runs
//! whole-kernel scenarios.
//!
//! A stack that has never run is seeded so that the restore sequence pops
//! six zeroed registers and then `ret`s into the thread trampoline, with
//! the stack pointer in the alignment state the ABI guarantees after a
//! `call` (rsp ≡ 8 mod 16).
//!
//! This backend has no interrupt hardware behind it; "halt until the next
//! timer interrupt" is modeled as delivering one virtual timer tick. A
//! real port supplies its own [`Arch`] with a hardware halt and an
//! asynchronous tick source.

use super::Arch;
use core::ptr;

/// Saved execution state: the stack pointer at the point of suspension.
///
/// Everything else (return address, callee-saved registers) lives on the
/// thread's own stack, exactly where the switch assembly pushed it.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SavedContext {
    rsp: u64,
}

// Save rbp/rbx/r12-r15 plus the implicit return address on the outgoing
// stack, swap stack pointers, then unwind the same frame on the incoming
// stack. `ret` either resumes a suspended switch call or enters a seeded
// trampoline.
core::arch::global_asm!(
    r#"
    .text
    .balign 16
    .global __priority_threads_context_switch
__priority_threads_context_switch:
    push rbp
    push rbx
    push r12
    push r13
    push r14
    push r15
    mov [rdi], rsp
    mov rsp, [rsi]
    pop r15
    pop r14
    pop r13
    pop r12
    pop rbx
    pop rbp
    ret
"#
);

extern "C" {
    fn __priority_threads_context_switch(prev: *mut SavedContext, next: *const SavedContext);
}

/// Number of 8-byte slots in a seeded initial frame: six callee-saved
/// registers, the entry address, and a null frame-link terminator.
const SEED_SLOTS: usize = 8;

/// x86_64 System-V backend.
pub struct X86_64Arch;

impl Arch for X86_64Arch {
    type SavedContext = SavedContext;

    const ASYNC_TICKS: bool = false;

    unsafe fn context_switch(prev: *mut SavedContext, next: *const SavedContext) {
        unsafe { __priority_threads_context_switch(prev, next) }
    }

    unsafe fn initial_context(
        stack_top: *mut u8,
        entry: extern "C" fn() -> !,
    ) -> SavedContext {
        // Highest 16-byte-aligned address within the stack.
        let top = (stack_top as usize) & !0xF;
        let slots = top as *mut u64;
        unsafe {
            // [top-8]: null terminator so backtraces stop here.
            ptr::write(slots.sub(1), 0);
            // [top-16]: where the restore sequence's `ret` lands.
            ptr::write(slots.sub(2), entry as usize as u64);
            // [top-24 .. top-64]: rbp, rbx, r12-r15, all zero.
            for slot in 3..=SEED_SLOTS {
                ptr::write(slots.sub(slot), 0);
            }
        }
        SavedContext {
            rsp: (top - SEED_SLOTS * 8) as u64,
        }
    }

    fn wait_for_interrupt() {
        // Virtual halt: exactly one timer tick elapses.
        crate::timer::external_tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_context_alignment() {
        let mut stack = [0u8; 256];
        let top = unsafe { stack.as_mut_ptr().add(256) };

        extern "C" fn never() -> ! {
            loop {
                core::hint::spin_loop();
            }
        }
        let entry: extern "C" fn() -> ! = never;

        let ctx = unsafe { X86_64Arch::initial_context(top, entry) };

        // Six pops plus a ret leave rsp ≡ 8 (mod 16) at thread entry.
        assert_eq!(ctx.rsp % 16, 0);
        let aligned_top = (top as u64) & !0xF;
        assert_eq!(ctx.rsp, aligned_top - 64);

        // The ret target is the entry point.
        let ret_slot = (aligned_top - 16) as *const u64;
        assert_eq!(unsafe { ret_slot.read() }, entry as usize as u64);
    }
}
