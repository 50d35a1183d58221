//! Coalescing session cache
//!
//! Readers share the cached session through an `RwLock`. When it is missing
//! or expired, callers queue on a single refresh mutex; the first one in
//! resolves a fresh session and everyone behind it reuses that result.

use crate::error::GatewayError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Session with a notion of expiry
pub trait Expiring {
    /// True while the session can still be handed to adapters
    fn is_valid(&self) -> bool;
}

/// Single-writer cache for one backend family
pub struct SessionCell<S> {
    current: RwLock<Option<Arc<S>>>,
    refresh: Mutex<()>,
}

impl<S> Default for SessionCell<S> {
    fn default() -> Self {
        Self {
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }
}

impl<S: Expiring> SessionCell<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached session if still valid, without waiting on a refresh
    pub async fn peek(&self) -> Option<Arc<S>> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|session| session.is_valid())
            .cloned()
    }

    /// Valid session, running `resolve` at most once per expiry
    pub async fn get_or_refresh<F, Fut>(&self, resolve: F) -> Result<Arc<S>, GatewayError>
    where
        F: FnOnce(Option<Arc<S>>) -> Fut,
        Fut: Future<Output = Result<S, GatewayError>>,
    {
        if let Some(session) = self.peek().await {
            return Ok(session);
        }

        let _refresh_guard = self.refresh.lock().await;

        // Another caller may have refreshed while we waited
        let stale = {
            let current = self.current.read().await;
            match current.as_ref() {
                Some(session) if session.is_valid() => return Ok(session.clone()),
                other => other.cloned(),
            }
        };

        let fresh = Arc::new(resolve(stale).await?);
        *self.current.write().await = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop the cached session so the next caller re-resolves
    pub async fn invalidate(&self) {
        let _refresh_guard = self.refresh.lock().await;
        *self.current.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeSession {
        id: usize,
        valid: AtomicBool,
    }

    impl Expiring for FakeSession {
        fn is_valid(&self) -> bool {
            self.valid.load(Ordering::SeqCst)
        }
    }

    fn fake(id: usize) -> FakeSession {
        FakeSession {
            id,
            valid: AtomicBool::new(true),
        }
    }

    #[tokio::test]
    async fn test_resolves_once_and_caches() {
        let cell = SessionCell::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let session = cell
                .get_or_refresh(|_| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(fake(1))
                })
                .await
                .unwrap();
            assert_eq!(session.id, 1);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_session_is_refreshed_with_stale_value() {
        let cell = SessionCell::new();
        let first = cell.get_or_refresh(|_| async { Ok(fake(1)) }).await.unwrap();
        first.valid.store(false, Ordering::SeqCst);

        let second = cell
            .get_or_refresh(|stale| async move {
                assert_eq!(stale.map(|s| s.id), Some(1));
                Ok(fake(2))
            })
            .await
            .unwrap();
        assert_eq!(second.id, 2);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_coalesced() {
        let cell = Arc::new(SessionCell::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cell.get_or_refresh(|_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(fake(7))
                    })
                    .await
                    .map(|s| s.id)
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_cache_empty() {
        let cell: SessionCell<FakeSession> = SessionCell::new();
        let err = cell
            .get_or_refresh(|_| async { Err(GatewayError::authentication("no credentials")) })
            .await;
        assert!(err.is_err());
        assert!(cell.peek().await.is_none());

        let session = cell.get_or_refresh(|_| async { Ok(fake(3)) }).await.unwrap();
        assert_eq!(session.id, 3);
    }

    #[tokio::test]
    async fn test_invalidate_forces_resolution() {
        let cell = SessionCell::new();
        cell.get_or_refresh(|_| async { Ok(fake(1)) }).await.unwrap();
        cell.invalidate().await;
        assert!(cell.peek().await.is_none());
    }
}
