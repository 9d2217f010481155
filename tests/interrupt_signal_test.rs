// Kept in its own test binary: the signal disposition is process-wide.
#![cfg(unix)]

use interlock::{DeadlineExecutor, LockError};
use std::mem;
use std::ptr;
use std::time::Duration;

fn sigurg_handler() -> libc::sighandler_t {
    unsafe {
        let mut current: libc::sigaction = mem::zeroed();
        assert_eq!(libc::sigaction(libc::SIGURG, ptr::null(), &mut current), 0);
        current.sa_sigaction
    }
}

#[test]
fn test_handler_installed_only_while_deadline_runs() {
    assert_eq!(sigurg_handler(), libc::SIG_DFL);

    let executor = DeadlineExecutor::new(Duration::from_secs(1));
    let during: Result<libc::sighandler_t, LockError> = executor.run(|| Ok(sigurg_handler()));
    assert_ne!(during.unwrap(), libc::SIG_DFL);

    assert_eq!(sigurg_handler(), libc::SIG_DFL);

    let timed_out: Result<(), LockError> = DeadlineExecutor::new(Duration::from_millis(100))
        .run(|| {
            std::thread::sleep(Duration::from_millis(400));
            Ok(())
        });
    assert!(timed_out.unwrap_err().is_timeout());
    assert_eq!(sigurg_handler(), libc::SIG_DFL);
}
