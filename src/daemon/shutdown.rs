//! Cooperative termination flag shared by every building block

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Longest uninterrupted sleep while waiting on the flag
const SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless shutdown is requested first.
    ///
    /// Returns `false` when woken by shutdown.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return false;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep((deadline - now).min(SLICE)).await;
        }
    }

    /// Resolves once shutdown has been requested
    pub async fn triggered(&self) {
        while !self.is_triggered() {
            tokio::time::sleep(SLICE).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_to_completion() {
        let shutdown = Shutdown::new();
        let start = tokio::time::Instant::now();
        assert!(shutdown.sleep(Duration::from_secs(30)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_wakes_on_trigger() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        let waker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.trigger();
        });

        let start = tokio::time::Instant::now();
        assert!(!shutdown.sleep(Duration::from_secs(30)).await);
        assert!(start.elapsed() < Duration::from_secs(2));
        waker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggered_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        let waker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.trigger();
        });

        let start = tokio::time::Instant::now();
        shutdown.triggered().await;
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(4));
        waker.await.unwrap();
    }

    #[test]
    fn test_clones_share_flag() {
        let a = Shutdown::new();
        let b = a.clone();
        assert!(!b.is_triggered());
        a.trigger();
        assert!(b.is_triggered());
    }
}
