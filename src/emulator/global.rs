//! Process-wide emulator handle.
//!
//! The tested program binds to the emulator through link-time adapter
//! functions, which requires exactly one well-defined instance per process.
//! The harness installs it at startup, the driver acquires it exactly once;
//! a second acquisition signals that something is tampering with the
//! framework.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::emulator::Emulator;
use crate::error::Error;

static INSTANCE: Mutex<Option<Emulator>> = Mutex::new(None);
static ACQUIRED: AtomicBool = AtomicBool::new(false);

fn slot() -> std::sync::MutexGuard<'static, Option<Emulator>> {
    INSTANCE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Installs the process-wide emulator instance (harness startup).
///
/// Fails when an instance is already installed.
pub fn install(emulator: Emulator) -> Result<(), Error> {
    let mut instance = slot();
    if instance.is_some() {
        return Err(Error::Tampered);
    }
    *instance = Some(emulator);
    Ok(())
}

/// Takes the installed emulator instance.
///
/// This may be called exactly once per installation; further calls fail
/// with the framework-tamper error even after the instance was taken.
pub fn acquire() -> Result<Emulator, Error> {
    if ACQUIRED.swap(true, Ordering::SeqCst) {
        return Err(Error::Tampered);
    }
    slot().take().ok_or(Error::NotInstalled)
}

/// Discards any installed instance and re-arms the accessor (harness
/// shutdown, or between tests within one process).
pub fn teardown() {
    *slot() = None;
    ACQUIRED.store(false, Ordering::SeqCst);
}
