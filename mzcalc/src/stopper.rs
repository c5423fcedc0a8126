//! Process-wide cooperative cancellation.
//!
//! Long-running loops (pattern convolution, deisotoping, least-squares iterations, smoothing
//! cycles) call [`check`] at fixed points. Checking observes *and clears* the flag, so a single
//! [`stop`] aborts exactly one in-flight operation and the next call starts clean.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

static FORCE_QUIT: AtomicBool = AtomicBool::new(false);

/// Request cancellation of the operation currently running.
pub fn stop() {
    FORCE_QUIT.store(true, Ordering::SeqCst);
    log::debug!("stop requested");
}

/// Clear a pending cancellation request.
pub fn start() {
    FORCE_QUIT.store(false, Ordering::SeqCst);
}

/// Returns `true` if a stop was requested and has not been consumed yet.
pub fn is_stopped() -> bool {
    FORCE_QUIT.load(Ordering::SeqCst)
}

/// Consume a pending stop request.
///
/// Returns:
///
/// * `Err(Error::Cancelled)` if the flag was set, in which case the flag is reset
///
/// # Examples
///
/// ```
/// use mzcalc::stopper;
///
/// assert!(stopper::check().is_ok());
/// ```
pub fn check() -> Result<()> {
    check_flag(&FORCE_QUIT)
}

fn check_flag(flag: &AtomicBool) -> Result<()> {
    if flag.swap(false, Ordering::SeqCst) {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_clears_flag() {
        let flag = AtomicBool::new(true);
        assert!(matches!(check_flag(&flag), Err(Error::Cancelled)));
        assert!(check_flag(&flag).is_ok());
        assert!(!flag.load(Ordering::SeqCst));
    }
}
