#![cfg_attr(not(test), no_std)]

use core::fmt;
use core::mem::size_of;

// Let's consider these as crashes
pub const SIGSEGV: i32 = libc::SIGSEGV;
pub const SIGABRT: i32 = libc::SIGABRT;
pub const SIGBUS: i32 = libc::SIGBUS;
pub const SIGILL: i32 = libc::SIGILL;
pub const SIGFPE: i32 = libc::SIGFPE;
pub const SIGTRAP: i32 = libc::SIGTRAP;
#[cfg(not(any(target_arch = "mips", target_arch = "mips64", target_arch = "sparc64")))]
pub const SIGSTKFLT: i32 = libc::SIGSTKFLT;

/// Signals the reporter takes over, in registration order.
#[cfg(not(any(target_arch = "mips", target_arch = "mips64", target_arch = "sparc64")))]
pub const MONITORED_SIGNALS: &[i32] = &[
    SIGSEGV, SIGABRT, SIGBUS, SIGILL, SIGFPE, SIGTRAP, SIGSTKFLT,
];
#[cfg(any(target_arch = "mips", target_arch = "mips64", target_arch = "sparc64"))]
pub const MONITORED_SIGNALS: &[i32] = &[SIGSEGV, SIGABRT, SIGBUS, SIGILL, SIGFPE, SIGTRAP];

/// One past the highest signal number the kernel can deliver.
#[cfg(any(target_arch = "mips", target_arch = "mips64"))]
pub const NSIG: usize = 129;
#[cfg(not(any(target_arch = "mips", target_arch = "mips64")))]
pub const NSIG: usize = 65;

/// Abstract-namespace name the collector listens on. The leading NUL of the
/// abstract address is not part of the name.
pub const DEFAULT_SOCKET_NAME: &str = "ndcrash";

/// Size of the raw machine context copied out of the signal frame.
pub const CONTEXT_SIZE: usize = size_of::<libc::ucontext_t>();

/// Message sent from the crashing process to the collector.
///
/// The layout is the wire format: host byte order, no length prefix, no
/// version. Client and collector must be built against the same layout.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CrashRecord {
    // process information
    pub pid: i32,
    pub tid: i32,

    // Signal info
    pub signo: i32,
    pub si_code: i32,
    pub fault_addr: usize,

    /// `ucontext_t` of the faulting thread, byte for byte.
    pub context: [u8; CONTEXT_SIZE],
}

// Every byte of the record must be a field byte, otherwise `as_bytes` would
// expose padding.
const _: () = assert!(
    size_of::<CrashRecord>() == 4 * size_of::<i32>() + size_of::<usize>() + CONTEXT_SIZE
);

impl CrashRecord {
    /// Exact number of bytes exchanged on the wire.
    pub const SIZE: usize = size_of::<Self>();

    pub const fn zeroed() -> Self {
        Self {
            pid: 0,
            tid: 0,
            signo: 0,
            si_code: 0,
            fault_addr: 0,
            context: [0u8; CONTEXT_SIZE],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: repr(C) with no padding (asserted above), so all SIZE bytes
        // are initialized.
        unsafe { core::slice::from_raw_parts((self as *const Self).cast::<u8>(), Self::SIZE) }
    }

    /// Rebuilds a record from its wire image. Any length other than
    /// [`CrashRecord::SIZE`] is rejected rather than truncated or padded.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordSizeMismatch> {
        if bytes.len() != Self::SIZE {
            return Err(RecordSizeMismatch {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        // SAFETY: length checked; every bit pattern is a valid CrashRecord.
        Ok(unsafe { core::ptr::read_unaligned(bytes.as_ptr().cast::<Self>()) })
    }
}

impl Default for CrashRecord {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for CrashRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrashRecord")
            .field("pid", &self.pid)
            .field("tid", &self.tid)
            .field("signo", &self.signo)
            .field("si_code", &self.si_code)
            .field("fault_addr", &format_args!("{:#x}", self.fault_addr))
            .field("context", &format_args!("[u8; {}]", CONTEXT_SIZE))
            .finish()
    }
}

impl PartialEq for CrashRecord {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for CrashRecord {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSizeMismatch {
    pub expected: usize,
    pub actual: usize,
}

impl fmt::Display for RecordSizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "crash record size mismatch: expected {} bytes, got {}",
            self.expected, self.actual
        )
    }
}

impl core::error::Error for RecordSizeMismatch {}

pub fn signal_name(sig: i32) -> &'static str {
    match sig {
        SIGILL => "SIGILL",
        SIGTRAP => "SIGTRAP",
        SIGABRT => "SIGABRT",
        SIGBUS => "SIGBUS",
        SIGFPE => "SIGFPE",
        SIGSEGV => "SIGSEGV",
        #[cfg(not(any(target_arch = "mips", target_arch = "mips64", target_arch = "sparc64")))]
        SIGSTKFLT => "SIGSTKFLT",
        _ => "UNKNOWN",
    }
}

pub fn si_code_name(sig: i32, code: i32) -> &'static str {
    // Codes raised from userspace share one namespace across signals.
    match code {
        0 => return "SI_USER",
        0x80 => return "SI_KERNEL",
        -1 => return "SI_QUEUE",
        -2 => return "SI_TIMER",
        -3 => return "SI_MESGQ",
        -4 => return "SI_ASYNCIO",
        -5 => return "SI_SIGIO",
        -6 => return "SI_TKILL",
        _ => {}
    }

    match (sig, code) {
        (SIGSEGV, 1) => "SEGV_MAPERR",
        (SIGSEGV, 2) => "SEGV_ACCERR",
        (SIGSEGV, 3) => "SEGV_BNDERR",
        (SIGSEGV, 4) => "SEGV_PKUERR",
        (SIGBUS, 1) => "BUS_ADRALN",
        (SIGBUS, 2) => "BUS_ADRERR",
        (SIGBUS, 3) => "BUS_OBJERR",
        (SIGBUS, 4) => "BUS_MCEERR_AR",
        (SIGBUS, 5) => "BUS_MCEERR_AO",
        (SIGFPE, 1) => "FPE_INTDIV",
        (SIGFPE, 2) => "FPE_INTOVF",
        (SIGFPE, 3) => "FPE_FLTDIV",
        (SIGFPE, 4) => "FPE_FLTOVF",
        (SIGFPE, 5) => "FPE_FLTUND",
        (SIGFPE, 6) => "FPE_FLTRES",
        (SIGFPE, 7) => "FPE_FLTINV",
        (SIGFPE, 8) => "FPE_FLTSUB",
        (SIGILL, 1) => "ILL_ILLOPC",
        (SIGILL, 2) => "ILL_ILLOPN",
        (SIGILL, 3) => "ILL_ILLADR",
        (SIGILL, 4) => "ILL_ILLTRP",
        (SIGILL, 5) => "ILL_PRVOPC",
        (SIGILL, 6) => "ILL_PRVREG",
        (SIGILL, 7) => "ILL_COPROC",
        (SIGILL, 8) => "ILL_BADSTK",
        (SIGTRAP, 1) => "TRAP_BRKPT",
        (SIGTRAP, 2) => "TRAP_TRACE",
        (SIGTRAP, 3) => "TRAP_BRANCH",
        (SIGTRAP, 4) => "TRAP_HWBKPT",
        _ => "UNKNOWN",
    }
}
