use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use atlas_types::error::CatalogError;
use tokio::time::Instant;
use uuid::Uuid;

pub const MAX_REQUESTS: usize = 60;
pub const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window limiter: at most 60 accepted requests per session within
/// any trailing 60 seconds, continuous window.
///
/// Per-session timestamps live in a ring buffer bounded at the window
/// size, and check-and-record happens under one lock so two concurrent
/// requests on the same session cannot both claim the last slot.
#[derive(Clone, Default)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<Uuid, VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, session_id: Uuid) -> Result<(), CatalogError> {
        let now = Instant::now();
        let mut sessions = self
            .inner
            .lock()
            .map_err(|e| CatalogError::Fatal(format!("limiter lock poisoned: {e}")))?;
        let window = sessions
            .entry(session_id)
            .or_insert_with(|| VecDeque::with_capacity(MAX_REQUESTS));

        while window
            .front()
            .is_some_and(|&t| now.duration_since(t) >= WINDOW)
        {
            window.pop_front();
        }

        if window.len() >= MAX_REQUESTS {
            return Err(CatalogError::RateLimited);
        }
        window.push_back(now);
        Ok(())
    }

    /// Drop a session's accounting once the session is gone.
    pub fn forget(&self, session_id: Uuid) {
        if let Ok(mut sessions) = self.inner.lock() {
            sessions.remove(&session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn sixty_within_fifty_nine_seconds_pass_then_sixty_first_fails() {
        let limiter = RateLimiter::new();
        let session = Uuid::new_v4();

        // One request per second for 60 requests spans 59 seconds.
        for i in 0..60 {
            limiter.check(session).expect("request within budget");
            if i < 59 {
                advance(Duration::from_secs(1)).await;
            }
        }

        let err = limiter.check(session).unwrap_err();
        assert!(matches!(err, CatalogError::RateLimited));

        // Once the oldest timestamp slides out of the window, the next
        // request is accepted again.
        advance(Duration::from_secs(1)).await;
        limiter.check(session).expect("window slid past the first request");
    }

    #[tokio::test(start_paused = true)]
    async fn window_boundary_is_exact() {
        let limiter = RateLimiter::new();
        let session = Uuid::new_v4();

        for _ in 0..60 {
            limiter.check(session).unwrap();
        }

        // 59.999s later the burst is still entirely inside the window.
        advance(Duration::from_millis(59_999)).await;
        assert!(matches!(
            limiter.check(session).unwrap_err(),
            CatalogError::RateLimited
        ));

        // At exactly 60s the whole burst ages out.
        advance(Duration::from_millis(1)).await;
        limiter.check(session).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_are_limited_independently() {
        let limiter = RateLimiter::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        for _ in 0..60 {
            limiter.check(a).unwrap();
        }
        assert!(limiter.check(a).is_err());
        limiter.check(b).expect("another session has its own window");
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_requests_do_not_consume_budget() {
        let limiter = RateLimiter::new();
        let session = Uuid::new_v4();

        for _ in 0..60 {
            limiter.check(session).unwrap();
        }
        for _ in 0..10 {
            assert!(limiter.check(session).is_err());
        }

        // The rejections above must not have extended the window.
        advance(Duration::from_secs(60)).await;
        limiter.check(session).unwrap();
    }
}
