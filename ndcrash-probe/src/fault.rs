use std::io;
use std::ptr;

use clap::ValueEnum;
use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Fault {
    /// Read from a PROT_NONE page.
    Segv,
    /// std::process::abort.
    Abort,
    /// Execute an undefined instruction.
    Illegal,
    Bus,
    Fpe,
    Trap,
}

impl Fault {
    pub fn signal(self) -> i32 {
        match self {
            Fault::Segv => libc::SIGSEGV,
            Fault::Abort => libc::SIGABRT,
            Fault::Illegal => libc::SIGILL,
            Fault::Bus => libc::SIGBUS,
            Fault::Fpe => libc::SIGFPE,
            Fault::Trap => libc::SIGTRAP,
        }
    }
}

/// Triggers `fault`. Returns only if the process survived the signal.
pub fn trigger(fault: Fault) -> anyhow::Result<()> {
    match fault {
        Fault::Segv => read_protected_page(),
        Fault::Abort => std::process::abort(),
        Fault::Illegal => {
            undefined_instruction();
            Ok(())
        }
        Fault::Bus | Fault::Fpe | Fault::Trap => raise(fault.signal()),
    }
}

fn read_protected_page() -> anyhow::Result<()> {
    // SAFETY: sysconf has no preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    // SAFETY: anonymous private mapping, no existing memory involved.
    let page = unsafe {
        libc::mmap(
            ptr::null_mut(),
            page_size,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if page == libc::MAP_FAILED {
        return Err(io::Error::last_os_error().into());
    }

    info!("Reading protected page at {page:p}");
    // SAFETY: none. The mapping is PROT_NONE, this read is the fault.
    let value = unsafe { ptr::read_volatile(page.cast::<u8>()) };
    info!("Read {value} from a protected page");
    Ok(())
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn undefined_instruction() {
    info!("Executing ud2");
    // SAFETY: ud2 raises SIGILL and touches no state.
    unsafe { std::arch::asm!("ud2") };
}

#[cfg(target_arch = "aarch64")]
fn undefined_instruction() {
    info!("Executing udf");
    // SAFETY: udf raises SIGILL and touches no state.
    unsafe { std::arch::asm!("udf #0") };
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
fn undefined_instruction() {
    let _ = raise(libc::SIGILL);
}

fn raise(signo: i32) -> anyhow::Result<()> {
    info!("Raising signal {signo}");
    // SAFETY: raise has no memory preconditions.
    if unsafe { libc::raise(signo) } != 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(())
}
