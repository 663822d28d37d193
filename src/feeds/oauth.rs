//! Process-local OAuth token cache with explicit TTL.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::Result;

/// Refresh this long before the provider-reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Caches one bearer token per adapter. The fetch closure runs only when the
/// cache is empty or within the expiry margin.
pub struct TokenCache {
    token: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(None),
        }
    }

    /// Get the cached token or fetch a fresh one. `fetch` returns the access
    /// token and its `expires_in` in seconds.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, u64)>>,
    {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let (access_token, expires_in) = fetch().await?;
        let ttl = Duration::from_secs(expires_in).saturating_sub(EXPIRY_MARGIN);
        *guard = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(access_token)
    }

    /// Drop the cached token (e.g. after a 401).
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_token_is_cached_until_expiry() {
        let cache = TokenCache::new();
        let fetches = AtomicUsize::new(0);

        for _ in 0..3 {
            let token = cache
                .get_or_fetch(|| async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(("tok".to_string(), 3600))
                })
                .await
                .unwrap();
            assert_eq!(token, "tok");
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_short_ttl_forces_refetch() {
        let cache = TokenCache::new();
        let fetches = AtomicUsize::new(0);

        for _ in 0..2 {
            cache
                .get_or_fetch(|| async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    // Below the 60s margin: effectively already expired
                    Ok(("tok".to_string(), 30))
                })
                .await
                .unwrap();
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_clears_cache() {
        let cache = TokenCache::new();
        let fetches = AtomicUsize::new(0);

        cache
            .get_or_fetch(|| async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(("a".to_string(), 3600))
            })
            .await
            .unwrap();
        cache.invalidate().await;
        let token = cache
            .get_or_fetch(|| async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(("b".to_string(), 3600))
            })
            .await
            .unwrap();
        assert_eq!(token, "b");
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }
}
