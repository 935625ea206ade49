//! Cooperative interrupt handling.
//!
//! The handler only raises a flag. It is installed without `SA_RESTART`, so a
//! blocked `msgrcv` returns `EINTR` and the channel turns that into
//! [`Error::Interrupted`](crate::Error::Interrupted). Teardown then happens on
//! the normal stack as the session guard drops.
//!
//! The channel checks the flag before every blocking call, so an interrupt
//! that arrived earlier is never slept through. A signal landing between that
//! check and the syscall entry is still missed until the peer acts. The
//! handler is one-shot (`SA_RESETHAND`): a second signal takes the default
//! action and ends the process.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::libc::c_int;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::{Error, Result};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_: c_int) {
    INTERRUPTED.store(true, Ordering::Release);
}

/// Routes SIGINT, SIGTERM and SIGHUP to the interrupt flag.
pub fn install() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::SA_RESETHAND,
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP] {
        unsafe { sigaction(sig, &action) }.map_err(|e| Error::ResourceUnavailable {
            what: "signal handler",
            source: e.into(),
        })?;
    }
    Ok(())
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::Acquire)
}

/// Fails with [`Error::Interrupted`] once the flag has been raised.
pub fn check() -> Result<()> {
    if interrupted() {
        Err(Error::Interrupted)
    } else {
        Ok(())
    }
}
