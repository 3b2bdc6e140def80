//! The installed `SA_SIGINFO` handler.
//!
//! Not async-signal-safe: it logs with formatting, may allocate while doing
//! so, and performs blocking socket I/O. That is accepted so the crashing
//! thread stays parked until the collector holds the record.

use std::mem;
use std::ptr;

use log::error;
use ndcrash_common::{si_code_name, signal_name};

use crate::capture::{self, FaultInfo};
use crate::lifecycle;
use crate::transport;

pub(crate) extern "C" fn handle_crash_signal(
    signo: libc::c_int,
    info: *mut libc::siginfo_t,
    context: *mut libc::c_void,
) {
    let saved_errno = errno();

    // SAFETY: the context outlives every handler invocation that starts
    // before deinit.
    let Some(reporter) = (unsafe { lifecycle::active() }) else {
        // Installed but nothing to report to: fall back to the default action.
        reset_to_default(signo);
        set_errno(saved_errno);
        return;
    };

    // Restoring the old handler first: a refaulting instruction lands there
    // once we return, which keeps the platform crash handling working.
    reporter.table().restore(signo);

    // SAFETY: info and context are the kernel-provided handler arguments.
    let record = unsafe {
        let fault = FaultInfo::from_siginfo(signo, info);
        capture::capture(&fault, context)
    };

    error!(
        "Signal caught: {} ({}), code {} ({}) pid: {}, tid: {}",
        signo,
        signal_name(signo),
        record.si_code,
        si_code_name(signo, record.si_code),
        record.pid,
        record.tid
    );

    // Outcome is logged by deliver; there is nothing else to do about it here.
    let _ = transport::deliver(&record, reporter.config());

    set_errno(saved_errno);
}

fn reset_to_default(signo: libc::c_int) {
    // SAFETY: sigaction is plain old data; an all-zero value is valid.
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = libc::SIG_DFL;
    // SAFETY: sigemptyset and sigaction are async-signal-safe and both
    // pointers reference a live local.
    unsafe {
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(signo, &action, ptr::null_mut());
    }
}

#[cfg(target_os = "android")]
fn errno_location() -> *mut libc::c_int {
    // SAFETY: always returns the calling thread's errno slot.
    unsafe { libc::__errno() }
}

#[cfg(not(target_os = "android"))]
fn errno_location() -> *mut libc::c_int {
    // SAFETY: always returns the calling thread's errno slot.
    unsafe { libc::__errno_location() }
}

fn errno() -> libc::c_int {
    // SAFETY: the slot is valid for the lifetime of the thread.
    unsafe { *errno_location() }
}

fn set_errno(value: libc::c_int) {
    // SAFETY: see errno.
    unsafe {
        *errno_location() = value;
    }
}
