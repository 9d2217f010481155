use interlock::{FlockMutex, LockError, LockStrategy, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn holder(path: &std::path::Path) -> (FlockMutex, <FlockMutex as Mutex>::Guard) {
    let mutex = FlockMutex::open(path).unwrap();
    let guard = mutex.acquire().unwrap();
    (mutex, guard)
}

#[test]
fn test_block_runs_code_once_and_unlocks() {
    let temp = TempDir::new().unwrap();
    let lock_path = temp.path().join("block.lock");
    let mutex = FlockMutex::open(&lock_path).unwrap();
    let runs = AtomicUsize::new(0);

    let result: interlock::Result<&str> = mutex.synchronized(|| {
        runs.fetch_add(1, Ordering::SeqCst);
        Ok("done")
    });

    assert_eq!(result.unwrap(), "done");
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Unlocked: a busy contender gets it immediately
    let other = FlockMutex::open(&lock_path)
        .unwrap()
        .with_strategy(LockStrategy::busy(Duration::from_millis(100)));
    assert!(other.acquire().is_ok());
}

#[test]
fn test_busy_times_out_while_held() {
    let temp = TempDir::new().unwrap();
    let lock_path = temp.path().join("busy.lock");
    let (_holder, _guard) = holder(&lock_path);

    let mutex = FlockMutex::open(&lock_path)
        .unwrap()
        .with_strategy(LockStrategy::busy(Duration::from_secs(1)));
    let start = Instant::now();
    let mut ran = false;

    let result: interlock::Result<()> = mutex.synchronized(|| {
        ran = true;
        Ok(())
    });

    let err = result.unwrap_err();
    assert!(matches!(err, LockError::AcquireTimedOut { .. }));
    assert!(err.is_timeout());
    assert!(err.is_acquire_error());
    assert_eq!(err.exit_code(), 2);
    assert!(!ran);
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[test]
fn test_busy_acquires_once_holder_lets_go() {
    let temp = TempDir::new().unwrap();
    let lock_path = temp.path().join("handover.lock");
    let (holder, guard) = holder(&lock_path);

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        holder.release(guard).unwrap();
    });

    let mutex = FlockMutex::open(&lock_path)
        .unwrap()
        .with_strategy(LockStrategy::busy(Duration::from_secs(5)));
    let result: interlock::Result<u8> = mutex.synchronized(|| Ok(7));

    assert_eq!(result.unwrap(), 7);
    releaser.join().unwrap();
}

#[test]
fn test_deadline_interrupts_blocked_wait() {
    let temp = TempDir::new().unwrap();
    let lock_path = temp.path().join("deadline.lock");
    let (holder, guard) = holder(&lock_path);

    let mutex = FlockMutex::open(&lock_path)
        .unwrap()
        .with_strategy(LockStrategy::deadline(Duration::from_secs(1)));
    let start = Instant::now();

    let err = mutex.acquire().err().unwrap();
    let elapsed = start.elapsed();

    assert!(matches!(err, LockError::AcquireTimedOut { ref source, .. } if source.duration == Duration::from_secs(1)));
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);

    // The abandoned wait must not end up owning the lock
    holder.release(guard).unwrap();
    let guard = mutex.acquire().unwrap();
    mutex.release(guard).unwrap();
}

#[test]
fn test_deadline_acquires_free_lock() {
    let temp = TempDir::new().unwrap();
    let lock_path = temp.path().join("free.lock");
    let mutex = FlockMutex::open(&lock_path)
        .unwrap()
        .with_strategy(LockStrategy::deadline(Duration::from_secs(1)));

    for round in 0..3 {
        let result: interlock::Result<i32> = mutex.synchronized(|| Ok(round));
        assert_eq!(result.unwrap(), round);
    }
}

#[test]
fn test_code_error_is_returned_and_lock_released() {
    let temp = TempDir::new().unwrap();
    let lock_path = temp.path().join("error.lock");
    let mutex = FlockMutex::open(&lock_path).unwrap();

    let result: interlock::Result<()> =
        mutex.synchronized(|| Err(LockError::Other("payment declined".to_string())));
    assert!(matches!(result, Err(LockError::Other(ref m)) if m == "payment declined"));

    let other = FlockMutex::open(&lock_path)
        .unwrap()
        .with_strategy(LockStrategy::busy(Duration::from_millis(100)));
    assert!(other.acquire().is_ok());
}

#[test]
fn test_panic_releases_lock() {
    let temp = TempDir::new().unwrap();
    let lock_path = temp.path().join("panic.lock");
    let mutex = FlockMutex::open(&lock_path).unwrap();

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _: interlock::Result<()> = mutex.synchronized(|| panic!("critical section blew up"));
    }));
    assert!(outcome.is_err());

    let other = FlockMutex::open(&lock_path)
        .unwrap()
        .with_strategy(LockStrategy::busy(Duration::from_millis(100)));
    assert!(other.acquire().is_ok());
}

#[test]
fn test_excludes_across_instances() {
    let temp = TempDir::new().unwrap();
    let lock_path = Arc::new(temp.path().join("shared.lock"));
    let inside = Arc::new(AtomicUsize::new(0));
    let total = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let lock_path = Arc::clone(&lock_path);
            let inside = Arc::clone(&inside);
            let total = Arc::clone(&total);
            thread::spawn(move || {
                let mutex = FlockMutex::open(&lock_path).unwrap();
                for _ in 0..5 {
                    let result: interlock::Result<()> = mutex.synchronized(|| {
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        thread::sleep(Duration::from_millis(2));
                        total.fetch_add(1, Ordering::SeqCst);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    });
                    result.unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(total.load(Ordering::SeqCst), 20);
}
