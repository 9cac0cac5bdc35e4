// src/metrics.rs

//! Peak memory sampling for executed snippets.
//!
//! Memory tracking uses the `sysinfo` crate and is best-effort:
//! - Memory is sampled periodically (polling).
//! - Very short-lived programs may finish before the first sample.
//! - If the PID cannot be inspected, tracking returns `None`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use sysinfo::{Pid, System};

/// Tracks peak memory usage of a child process while it runs.
pub struct MemoryTracker {
    stop: Arc<AtomicBool>,
    max_kb: Arc<Mutex<u64>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MemoryTracker {
    /// Start sampling the RSS of `pid_u32` every `sample_every`.
    pub fn start(pid_u32: u32, sample_every: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let max_kb = Arc::new(Mutex::new(0u64));

        let stop_clone = Arc::clone(&stop);
        let max_clone = Arc::clone(&max_kb);

        let handle = thread::spawn(move || {
            let pid = Pid::from_u32(pid_u32);
            let mut system = System::new();

            loop {
                if stop_clone.load(Ordering::Relaxed) {
                    break;
                }

                system.refresh_process(pid);

                if let Some(process) = system.process(pid) {
                    // sysinfo reports bytes
                    let mem_kb = process.memory() / 1024;

                    if let Ok(mut guard) = max_clone.lock() {
                        if mem_kb > *guard {
                            *guard = mem_kb;
                        }
                    }
                } else {
                    break;
                }

                thread::sleep(sample_every);
            }
        });

        Self {
            stop,
            max_kb,
            handle: Some(handle),
        }
    }

    /// Stop tracking and return the peak RSS in KB.
    ///
    /// Returns `None` if no samples were collected.
    pub fn stop_and_take(mut self) -> Option<u64> {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }

        let max = match self.max_kb.lock() {
            Ok(guard) => *guard,
            Err(_) => 0,
        };

        if max > 0 {
            Some(max)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_pid_yields_none() {
        // above the Linux pid_max ceiling (2^22)
        let tracker = MemoryTracker::start(4_194_400, Duration::from_millis(5));
        assert_eq!(tracker.stop_and_take(), None);
    }

    #[test]
    fn own_process_is_sampled() {
        let tracker = MemoryTracker::start(std::process::id(), Duration::from_millis(5));
        thread::sleep(Duration::from_millis(50));
        assert!(tracker.stop_and_take().unwrap_or(0) > 0);
    }
}
