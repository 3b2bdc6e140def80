//! Builds the crash record from inside the signal handler.

use std::ptr;

use ndcrash_common::{CONTEXT_SIZE, CrashRecord};

/// Signal-specific part of a crash: number, code and faulting address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultInfo {
    pub signo: i32,
    pub code: i32,
    pub address: usize,
}

impl FaultInfo {
    /// Reads the code and address out of the kernel-provided `siginfo_t`.
    ///
    /// # Safety
    ///
    /// `info` must be null or point to the `siginfo_t` passed to an
    /// `SA_SIGINFO` handler.
    pub unsafe fn from_siginfo(signo: i32, info: *const libc::siginfo_t) -> Self {
        if info.is_null() {
            return Self {
                signo,
                code: 0,
                address: 0,
            };
        }
        // SAFETY: non-null and valid per the caller.
        let info = unsafe { &*info };
        Self {
            signo,
            code: info.si_code,
            // SAFETY: si_addr is only meaningful for fault signals, but reading
            // it is always defined.
            address: unsafe { info.si_addr() } as usize,
        }
    }
}

pub fn current_pid() -> i32 {
    // SAFETY: getpid is always successful.
    unsafe { libc::getpid() }
}

pub fn current_tid() -> i32 {
    // SAFETY: gettid takes no arguments and cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as i32 }
}

/// Assembles a record for an already known process, thread and context.
pub fn record_from_parts(
    pid: i32,
    tid: i32,
    fault: &FaultInfo,
    context: &[u8; CONTEXT_SIZE],
) -> CrashRecord {
    CrashRecord {
        pid,
        tid,
        signo: fault.signo,
        si_code: fault.code,
        fault_addr: fault.address,
        context: *context,
    }
}

/// Builds the record for the calling thread.
///
/// # Safety
///
/// `context` must be null or point to the `ucontext_t` handed to the signal
/// handler. A null context leaves the blob zeroed.
pub unsafe fn capture(fault: &FaultInfo, context: *const libc::c_void) -> CrashRecord {
    let mut record = CrashRecord::zeroed();
    record.pid = current_pid();
    record.tid = current_tid();
    record.signo = fault.signo;
    record.si_code = fault.code;
    record.fault_addr = fault.address;
    if !context.is_null() {
        // SAFETY: the kernel-provided ucontext_t is CONTEXT_SIZE bytes.
        unsafe {
            ptr::copy_nonoverlapping(
                context.cast::<u8>(),
                record.context.as_mut_ptr(),
                CONTEXT_SIZE,
            );
        }
    }
    record
}
