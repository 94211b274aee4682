use std::future::Future;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Process-wide bound on outbound API calls.
///
/// A call holds its permit for the request itself and for `delay` afterwards,
/// which caps both concurrency and the steady-state rate.
pub struct RateLimiter {
    permits: Semaphore,
    capacity: usize,
    delay: Duration,
}

impl RateLimiter {
    pub fn new(capacity: usize, delay: Duration) -> Self {
        assert!(capacity > 0);
        Self {
            permits: Semaphore::new(capacity),
            capacity,
            delay,
        }
    }

    /// Waits for a free permit. Dropping the permit releases it.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        // the semaphore is owned by self and never closed
        match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("rate limiter semaphore closed"),
        }
    }

    /// Runs `call` under a permit and keeps the permit for the post-call delay.
    pub async fn throttle<F, T>(&self, call: F) -> T
    where
        F: Future<Output = T>,
    {
        let permit = self.acquire().await;
        let output = call.await;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        drop(permit);
        output
    }

    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::RateLimiter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn caps_concurrent_calls() {
        let limiter = Arc::new(RateLimiter::new(2, Duration::ZERO));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..6)
            .map(|_| {
                let limiter = limiter.clone();
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    limiter
                        .throttle(async {
                            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                        })
                        .await
                })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn holds_permit_through_delay() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_millis(200)));
        let start = Instant::now();

        let first = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.throttle(async { 1 }).await })
        };
        let second = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.throttle(async { 2 }).await })
        };

        assert_eq!(first.await.unwrap() + second.await.unwrap(), 3);
        // two calls through a single permit each wait out the delay
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn permit_is_released_on_drop() {
        let limiter = RateLimiter::new(3, Duration::ZERO);
        let permit = limiter.acquire().await;
        assert_eq!(limiter.available(), 2);
        drop(permit);
        assert_eq!(limiter.available(), limiter.capacity());
    }
}
