use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::error;

/// Exit status used when the wall-clock limit is exceeded (`-1` as a byte).
pub const TIMEOUT_EXIT_CODE: i32 = 255;

/// Wall-clock guillotine for a whole benchmark run.
///
/// A detached thread sleeps for the timeout and then fires unless the guard
/// has been dropped. There is no per-task cancellation.
pub struct TimeoutGuard {
    done: Arc<AtomicBool>,
}

impl TimeoutGuard {
    /// Terminate the process with [`TIMEOUT_EXIT_CODE`] once `timeout` elapses.
    pub fn arm(timeout: Duration) -> Self {
        Self::arm_with(timeout, move || {
            error!("Benchmark exceeded timeout of {} ms, terminating", timeout.as_millis());
            std::process::exit(TIMEOUT_EXIT_CODE);
        })
    }

    /// Run `on_expire` once `timeout` elapses, unless disarmed first.
    pub fn arm_with(timeout: Duration, on_expire: impl FnOnce() + Send + 'static) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let spawned = thread::Builder::new()
            .name("inncabs-timeout".to_string())
            .spawn(move || {
                thread::sleep(timeout);
                if !flag.load(Ordering::Acquire) {
                    on_expire();
                }
            });
        if let Err(e) = spawned {
            error!("Failed to start timeout thread: {}", e);
        }
        Self { done }
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.done.store(true, Ordering::Release);
    }
}
