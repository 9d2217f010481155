//! Interruption channel for abandoned deadline workers.
//!
//! The handler does nothing and is installed without `SA_RESTART`, which is
//! enough for a blocking syscall in the signalled thread to fail with
//! `EINTR`. It is installed while at least one deadline is running and the
//! previous disposition is put back when the last one finishes. SIGURG is
//! ignored by default, so a signal that lands after the restore is dropped.

use std::io;
use std::thread::JoinHandle;

pub(crate) use imp::{install, interrupt};

#[cfg(unix)]
mod imp {
    use super::*;
    use std::mem;
    use std::os::unix::thread::JoinHandleExt;
    use std::ptr;
    use std::sync::Mutex;
    use tracing::{debug, warn};

    const SIGNAL: libc::c_int = libc::SIGURG;

    struct Installation {
        users: usize,
        previous: Option<libc::sigaction>,
    }

    static INSTALLATION: Mutex<Installation> = Mutex::new(Installation {
        users: 0,
        previous: None,
    });

    extern "C" fn on_interrupt(_: libc::c_int) {}

    /// Keeps the interrupt handler installed while alive.
    pub(crate) struct InterruptHandler {
        _private: (),
    }

    pub(crate) fn install() -> io::Result<InterruptHandler> {
        let mut installation = INSTALLATION.lock().unwrap_or_else(|e| e.into_inner());

        if installation.users == 0 {
            // SAFETY: both structs are plain data, zeroed is a valid empty
            // sigaction and the pointers passed to sigaction outlive the call.
            let previous = unsafe {
                let mut action: libc::sigaction = mem::zeroed();
                action.sa_sigaction = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
                action.sa_flags = 0;
                libc::sigemptyset(&mut action.sa_mask);

                let mut previous: libc::sigaction = mem::zeroed();
                if libc::sigaction(SIGNAL, &action, &mut previous) != 0 {
                    return Err(io::Error::last_os_error());
                }
                previous
            };
            installation.previous = Some(previous);
            debug!("Interrupt handler installed");
        }

        installation.users += 1;
        Ok(InterruptHandler { _private: () })
    }

    impl Drop for InterruptHandler {
        fn drop(&mut self) {
            let mut installation = INSTALLATION.lock().unwrap_or_else(|e| e.into_inner());
            installation.users -= 1;
            if installation.users > 0 {
                return;
            }

            if let Some(previous) = installation.previous.take() {
                // SAFETY: `previous` was filled in by sigaction in `install`.
                let rc = unsafe { libc::sigaction(SIGNAL, &previous, ptr::null_mut()) };
                if rc != 0 {
                    warn!(
                        "Failed to restore interrupt signal disposition (non-fatal): {}",
                        io::Error::last_os_error()
                    );
                } else {
                    debug!("Interrupt handler removed");
                }
            }
        }
    }

    /// Knock the worker out of whatever blocking syscall it is in.
    pub(crate) fn interrupt<T>(worker: &JoinHandle<T>) {
        // SAFETY: the handle is neither joined nor detached, so the thread id
        // is still valid even if the thread already exited.
        let rc = unsafe { libc::pthread_kill(worker.as_pthread_t() as libc::pthread_t, SIGNAL) };
        if rc != 0 {
            debug!(
                "Could not interrupt deadline worker: {}",
                io::Error::from_raw_os_error(rc)
            );
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use super::*;

    pub(crate) struct InterruptHandler {
        _private: (),
    }

    pub(crate) fn install() -> io::Result<InterruptHandler> {
        Ok(InterruptHandler { _private: () })
    }

    // No signal to deliver; the worker is simply abandoned.
    pub(crate) fn interrupt<T>(_worker: &JoinHandle<T>) {}
}
