//! Installation and restoration of the fatal-signal dispositions.

use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use ndcrash_common::{MONITORED_SIGNALS, NSIG};

use crate::error::InitError;

/// Entry point installed with `SA_SIGINFO`.
pub type SignalAction = extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void);

struct SavedDisposition {
    action: libc::sigaction,
    /// Cleared once the saved disposition has been put back.
    armed: AtomicBool,
}

/// Dispositions that were in place before ours, indexed by signal number.
pub struct SignalDispositionTable {
    slots: [Option<SavedDisposition>; NSIG],
}

impl SignalDispositionTable {
    pub fn new() -> Self {
        Self {
            slots: [const { None }; NSIG],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Whether a previous disposition for `signo` is recorded and not yet restored.
    pub fn is_armed(&self, signo: i32) -> bool {
        self.slot(signo)
            .is_some_and(|saved| saved.armed.load(Ordering::Acquire))
    }

    /// The disposition recorded for `signo`, if any.
    pub fn previous(&self, signo: i32) -> Option<&libc::sigaction> {
        self.slot(signo).map(|saved| &saved.action)
    }

    /// Puts back the disposition saved for `signo`, at most once.
    ///
    /// Only `sigaction` and an atomic swap are involved, so this is safe to
    /// call from a signal handler. Returns whether anything was restored.
    pub fn restore(&self, signo: i32) -> bool {
        let Some(saved) = self.slot(signo) else {
            return false;
        };
        if !saved.armed.swap(false, Ordering::AcqRel) {
            return false;
        }
        // SAFETY: the action was filled in by the kernel when we replaced it.
        unsafe { libc::sigaction(signo, &saved.action, ptr::null_mut()) == 0 }
    }

    fn slot(&self, signo: i32) -> Option<&SavedDisposition> {
        usize::try_from(signo)
            .ok()
            .and_then(|index| self.slots.get(index))
            .and_then(Option::as_ref)
    }
}

impl Default for SignalDispositionTable {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_monitored(signo: i32) -> bool {
    MONITORED_SIGNALS.contains(&signo)
}

/// Installs `handler` for every monitored signal, saving what it replaces.
///
/// Stops at the first signal that cannot be installed. Signals installed
/// before the failure stay installed and recorded in `table`; the caller
/// undoes them with [`unregister`].
pub fn register(handler: SignalAction, table: &mut SignalDispositionTable) -> Result<(), InitError> {
    register_signals(handler, MONITORED_SIGNALS, table)
}

pub(crate) fn register_signals(
    handler: SignalAction,
    signals: &[i32],
    table: &mut SignalDispositionTable,
) -> Result<(), InitError> {
    // SAFETY: sigaction is plain old data; an all-zero value is valid.
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = handler as libc::sighandler_t;
    action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
    // SAFETY: sa_mask is a valid sigset_t to initialize.
    unsafe {
        libc::sigemptyset(&mut action.sa_mask);
    }

    for &signo in signals {
        // SAFETY: see above.
        let mut previous: libc::sigaction = unsafe { mem::zeroed() };
        // SAFETY: both pointers reference live sigaction values.
        if unsafe { libc::sigaction(signo, &action, &mut previous) } != 0 {
            return Err(InitError::SignalRegistrationFailed {
                signal: signo,
                source: io::Error::last_os_error(),
            });
        }
        table.slots[signo as usize] = Some(SavedDisposition {
            action: previous,
            armed: AtomicBool::new(true),
        });
    }

    debug!("Installed crash handler for {} signals", signals.len());
    Ok(())
}

/// Restores every still-armed entry of `table`, then clears it.
pub fn unregister(table: &mut SignalDispositionTable) {
    let mut restored = 0;
    for (signo, slot) in table.slots.iter_mut().enumerate() {
        if let Some(saved) = slot.take() {
            if saved.armed.into_inner() {
                // SAFETY: the action was filled in by the kernel at registration.
                unsafe {
                    libc::sigaction(signo as libc::c_int, &saved.action, ptr::null_mut());
                }
                restored += 1;
            }
        }
    }
    if restored > 0 {
        debug!("Restored {restored} previous signal dispositions");
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    extern "C" fn noop_action(_: libc::c_int, _: *mut libc::siginfo_t, _: *mut libc::c_void) {}

    fn current(signo: i32) -> libc::sigaction {
        let mut action: libc::sigaction = unsafe { mem::zeroed() };
        unsafe {
            libc::sigaction(signo, ptr::null(), &mut action);
        }
        action
    }

    #[test]
    fn new_table_is_empty() {
        let table = SignalDispositionTable::new();
        assert!(table.is_empty());
        assert!(!table.is_armed(libc::SIGSEGV));
        assert!(!table.restore(libc::SIGSEGV));
        assert!(!table.restore(-1));
        assert!(!table.restore(NSIG as i32 + 10));
    }

    #[test]
    fn monitored_set() {
        for sig in [
            libc::SIGSEGV,
            libc::SIGABRT,
            libc::SIGBUS,
            libc::SIGILL,
            libc::SIGFPE,
            libc::SIGTRAP,
        ] {
            assert!(is_monitored(sig));
        }
        assert!(!is_monitored(libc::SIGINT));
        assert!(!is_monitored(libc::SIGPIPE));
    }

    #[test]
    #[serial]
    fn register_saves_then_unregister_restores() {
        let before: Vec<_> = MONITORED_SIGNALS
            .iter()
            .map(|&sig| current(sig).sa_sigaction)
            .collect();

        let mut table = SignalDispositionTable::new();
        register(noop_action, &mut table).unwrap();

        for (&sig, &old) in MONITORED_SIGNALS.iter().zip(&before) {
            let installed = current(sig);
            assert_eq!(installed.sa_sigaction, noop_action as libc::sighandler_t);
            assert_ne!(installed.sa_flags & libc::SA_SIGINFO, 0);
            assert!(table.is_armed(sig));
            assert_eq!(table.previous(sig).unwrap().sa_sigaction, old);
        }

        unregister(&mut table);
        assert!(table.is_empty());
        for (&sig, &old) in MONITORED_SIGNALS.iter().zip(&before) {
            assert_eq!(current(sig).sa_sigaction, old);
        }

        // Nothing left to restore.
        unregister(&mut table);
        assert!(table.is_empty());
    }

    #[test]
    #[serial]
    fn restore_consumes_a_single_entry() {
        let original = current(libc::SIGTRAP).sa_sigaction;

        let mut table = SignalDispositionTable::new();
        register(noop_action, &mut table).unwrap();

        assert!(table.restore(libc::SIGTRAP));
        assert_eq!(current(libc::SIGTRAP).sa_sigaction, original);
        assert!(!table.is_armed(libc::SIGTRAP));
        assert!(!table.restore(libc::SIGTRAP));

        // Others are untouched until unregister.
        assert_eq!(
            current(libc::SIGSEGV).sa_sigaction,
            noop_action as libc::sighandler_t
        );
        assert!(table.is_armed(libc::SIGSEGV));

        unregister(&mut table);
        assert_ne!(
            current(libc::SIGSEGV).sa_sigaction,
            noop_action as libc::sighandler_t
        );
        assert_eq!(current(libc::SIGTRAP).sa_sigaction, original);
    }

    #[test]
    #[serial]
    fn failed_registration_keeps_earlier_entries_for_unregister() {
        let original = current(libc::SIGSEGV).sa_sigaction;

        let mut table = SignalDispositionTable::new();
        let err = register_signals(noop_action, &[libc::SIGSEGV, libc::SIGKILL], &mut table)
            .unwrap_err();
        assert!(matches!(
            err,
            InitError::SignalRegistrationFailed { signal, .. } if signal == libc::SIGKILL
        ));
        assert!(table.is_armed(libc::SIGSEGV));
        assert!(!table.is_armed(libc::SIGKILL));
        assert_eq!(
            current(libc::SIGSEGV).sa_sigaction,
            noop_action as libc::sighandler_t
        );

        unregister(&mut table);
        assert!(table.is_empty());
        assert_eq!(current(libc::SIGSEGV).sa_sigaction, original);
    }
}
