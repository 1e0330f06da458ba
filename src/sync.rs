//! CPU-GPU synchronization.
//!
//! Submission is synchronous at frame boundaries: every backend has finished
//! the submitted work by the time [`Context::submit`](crate::Context::submit)
//! returns, so the fence it hands out is already signaled. Fences are still
//! the type callers wait on, which keeps call sites unchanged if submission
//! becomes asynchronous.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    Unsignaled,
    Signaled,
}

/// Signals when submitted GPU work completes.
///
/// Clones share state: signaling one signals all.
///
/// ```ignore
/// let fence = context.submit()?;
/// fence.wait();
/// ```
#[derive(Debug, Clone)]
pub struct Fence {
    signaled: Arc<AtomicBool>,
}

impl Fence {
    pub(crate) fn new_unsignaled() -> Self {
        Self {
            signaled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn new_signaled() -> Self {
        Self {
            signaled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn status(&self) -> FenceStatus {
        if self.signaled.load(Ordering::Acquire) {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Block until signaled.
    pub fn wait(&self) {
        while !self.signaled.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
    }

    /// Returns `true` if the fence was signaled before `timeout` elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while !self.signaled.load(Ordering::Acquire) {
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::yield_now();
        }
        true
    }

    /// Must only be called when no GPU work is pending on this fence.
    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    pub(crate) fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }
}

impl Default for Fence {
    fn default() -> Self {
        Self::new_signaled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_status() {
        let fence = Fence::new_unsignaled();
        assert_eq!(fence.status(), FenceStatus::Unsignaled);
        assert!(!fence.wait_timeout(Duration::from_millis(1)));

        let other = fence.clone();
        other.signal();
        assert!(fence.is_signaled());
        fence.wait();

        fence.reset();
        assert!(!other.is_signaled());
    }

    #[test]
    fn test_fence_signaled_from_thread() {
        let fence = Fence::new_unsignaled();
        let signaler = fence.clone();
        let handle = std::thread::spawn(move || signaler.signal());
        assert!(fence.wait_timeout(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn test_default_is_signaled() {
        assert!(Fence::default().is_signaled());
    }
}
