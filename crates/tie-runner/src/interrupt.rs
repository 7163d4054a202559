//! SIGINT bookkeeping for analyze runs.
//!
//! A terminal Ctrl-C reaches the whole foreground process group. While an
//! [`InterruptGuard`] is alive the orchestrator survives it: the handler only
//! bumps a counter, and [`SystemExecutor`](crate::SystemExecutor) reports a
//! child that finishes after the counter moved as interrupted.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;

static INTERRUPTS: AtomicUsize = AtomicUsize::new(0);

/// Number of SIGINTs received while a guard was installed.
pub fn interrupt_count() -> usize {
    INTERRUPTS.load(Ordering::SeqCst)
}

/// Keeps the counting SIGINT handler installed until dropped. Guards nest;
/// the previous disposition comes back when the last one goes.
#[derive(Debug)]
pub struct InterruptGuard {
    _installed: (),
}

#[cfg(unix)]
mod handler {
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use tracing::warn;

    use super::INTERRUPTS;

    static INSTALLED: Mutex<Option<(usize, SigAction)>> = Mutex::new(None);

    extern "C" fn on_sigint(_: nix::libc::c_int) {
        INTERRUPTS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    pub(super) fn acquire() -> Result<()> {
        let mut installed = INSTALLED
            .lock()
            .map_err(|_| anyhow!("interrupt handler state is poisoned"))?;
        match installed.as_mut() {
            Some((holders, _)) => *holders += 1,
            None => {
                let action = SigAction::new(
                    SigHandler::Handler(on_sigint),
                    SaFlags::SA_RESTART,
                    SigSet::empty(),
                );
                // SAFETY: the handler only touches an atomic counter.
                let previous = unsafe { sigaction(Signal::SIGINT, &action) }?;
                *installed = Some((1, previous));
            }
        }
        Ok(())
    }

    pub(super) fn release() {
        let Ok(mut installed) = INSTALLED.lock() else {
            return;
        };
        let Some((holders, previous)) = installed.as_mut() else {
            return;
        };
        *holders -= 1;
        if *holders > 0 {
            return;
        }
        let previous = *previous;
        *installed = None;
        // SAFETY: puts back the disposition saved by `acquire`.
        if let Err(err) = unsafe { sigaction(Signal::SIGINT, &previous) } {
            warn!(error = %err, "could not restore the SIGINT handler");
        }
    }
}

#[cfg(not(unix))]
mod handler {
    pub(super) fn acquire() -> anyhow::Result<()> {
        Ok(())
    }

    pub(super) fn release() {}
}

impl InterruptGuard {
    pub fn install() -> Result<Self> {
        handler::acquire()?;
        Ok(Self { _installed: () })
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        handler::release();
    }
}
