//! Process-wide init/deinit of the reporter.
//!
//! The active [`ReporterContext`] is heap-owned by this module and published
//! through a single atomic pointer, the one handle the raw signal handler can
//! reach. `init` and `deinit` must not race each other; a handler still
//! running on another thread when `deinit` frees the context is not
//! protected against.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use log::{debug, error, info, warn};
use ndcrash_common::MONITORED_SIGNALS;

use crate::config::ReporterConfig;
use crate::error::InitError;
use crate::handler::handle_crash_signal;
use crate::registry::{self, SignalDispositionTable};

/// State shared with the signal handler while the reporter is active.
pub struct ReporterContext {
    table: SignalDispositionTable,
    config: ReporterConfig,
}

impl ReporterContext {
    fn new(config: ReporterConfig) -> Self {
        Self {
            table: SignalDispositionTable::new(),
            config,
        }
    }

    pub fn table(&self) -> &SignalDispositionTable {
        &self.table
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }
}

static ACTIVE: AtomicPtr<ReporterContext> = AtomicPtr::new(ptr::null_mut());

/// Installs the reporter with [`ReporterConfig::default`].
pub fn init() -> Result<(), InitError> {
    init_with(ReporterConfig::default())
}

/// Installs the crash handler for every monitored signal.
///
/// Fails with [`InitError::AlreadyInitialized`] without touching anything if
/// a reporter is active. If any signal cannot be taken over, the ones already
/// installed are restored and [`InitError::SignalRegistrationFailed`] is
/// returned.
pub fn init_with(config: ReporterConfig) -> Result<(), InitError> {
    init_for(config, MONITORED_SIGNALS)
}

fn init_for(config: ReporterConfig, signals: &[i32]) -> Result<(), InitError> {
    if is_initialized() {
        warn!("Crash reporter already initialized, ignoring init");
        return Err(InitError::AlreadyInitialized);
    }

    let mut context = Box::new(ReporterContext::new(config));
    if let Err(e) = registry::register_signals(handle_crash_signal, signals, &mut context.table) {
        error!("Crash reporter init failed: {e}");
        registry::unregister(&mut context.table);
        return Err(e);
    }

    let raw = Box::into_raw(context);
    if ACTIVE
        .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        // Another init won between the check and here.
        // SAFETY: raw came from Box::into_raw above and was never published.
        let mut context = unsafe { Box::from_raw(raw) };
        registry::unregister(&mut context.table);
        return Err(InitError::AlreadyInitialized);
    }

    info!(
        "Crash reporter initialized, collector at {:?}",
        config.address()
    );
    Ok(())
}

/// Restores the previous dispositions and drops the active reporter.
/// Does nothing if no reporter is active.
pub fn deinit() {
    let raw = ACTIVE.swap(ptr::null_mut(), Ordering::AcqRel);
    if raw.is_null() {
        return;
    }
    // SAFETY: a non-null ACTIVE always comes from Box::into_raw in init_with,
    // and the swap above makes this the only owner.
    let mut context = unsafe { Box::from_raw(raw) };
    registry::unregister(&mut context.table);
    debug!("Crash reporter deinitialized");
}

pub fn is_initialized() -> bool {
    !ACTIVE.load(Ordering::Acquire).is_null()
}

/// The published context, for the signal handler.
///
/// # Safety
///
/// The reference is only valid until the next `deinit`.
pub(crate) unsafe fn active<'a>() -> Option<&'a ReporterContext> {
    let raw = ACTIVE.load(Ordering::Acquire);
    // SAFETY: non-null values point to a live boxed context, per the caller.
    unsafe { raw.as_ref() }
}
