//! Memoization of async functions through the API cache

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::cache::KeyDeriver;
use crate::domain::DomainError;

use super::api_cache::{ApiCache, LeaseConfig};

/// An async function whose results are cached by call signature
///
/// The key is derived from the prefix and the call's arguments, so equal
/// arguments share an entry and different arguments never do. The wrapped
/// function runs only on a miss.
///
/// ```ignore
/// let user = cache.memoize("users", Duration::from_secs(600), |(id,): (u64,)| fetch_user(id));
/// let profile = user.call((42,)).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Memoized<F> {
    cache: ApiCache,
    prefix: String,
    ttl: Duration,
    deriver: KeyDeriver,
    lease: Option<LeaseConfig>,
    func: F,
}

impl<F> Memoized<F> {
    pub fn new(cache: ApiCache, prefix: impl Into<String>, ttl: Duration, func: F) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            ttl,
            deriver: KeyDeriver::default(),
            lease: None,
            func,
        }
    }

    /// Takes a per-key lease so concurrent misses compute once
    pub fn with_lease(mut self, lease: LeaseConfig) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn with_key_deriver(mut self, deriver: KeyDeriver) -> Self {
        self.deriver = deriver;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key a call with these arguments reads and writes
    pub fn key_for<A, K>(&self, args: &A, kwargs: &K) -> Result<String, DomainError>
    where
        A: Serialize + ?Sized,
        K: Serialize + ?Sized,
    {
        self.deriver.derive(&self.prefix, args, kwargs)
    }

    /// Calls a function taking positional arguments only
    pub async fn call<A, V, Fut>(&self, args: A) -> Result<V, DomainError>
    where
        F: Fn(A) -> Fut,
        A: Serialize,
        V: Serialize + DeserializeOwned,
        Fut: Future<Output = V>,
    {
        let key = self.key_for(&args, &())?;
        self.fill(&key, || (self.func)(args)).await
    }

    /// Calls a function taking positional and named arguments
    pub async fn call_with<A, K, V, Fut>(&self, args: A, kwargs: K) -> Result<V, DomainError>
    where
        F: Fn(A, K) -> Fut,
        A: Serialize,
        K: Serialize,
        V: Serialize + DeserializeOwned,
        Fut: Future<Output = V>,
    {
        let key = self.key_for(&args, &kwargs)?;
        self.fill(&key, || (self.func)(args, kwargs)).await
    }

    /// Calls a fallible function taking positional arguments only
    ///
    /// Errors are returned as-is and never cached, so the next call computes
    /// again. The lease is not taken for fallible calls.
    pub async fn try_call<A, V, E, Fut>(&self, args: A) -> Result<V, E>
    where
        F: Fn(A) -> Fut,
        A: Serialize,
        V: Serialize + DeserializeOwned,
        E: From<DomainError>,
        Fut: Future<Output = Result<V, E>>,
    {
        let key = self.key_for(&args, &())?;
        self.cache.try_get_or_set(&key, || (self.func)(args), self.ttl).await
    }

    /// Fallible counterpart of [`Memoized::call_with`]
    pub async fn try_call_with<A, K, V, E, Fut>(&self, args: A, kwargs: K) -> Result<V, E>
    where
        F: Fn(A, K) -> Fut,
        A: Serialize,
        K: Serialize,
        V: Serialize + DeserializeOwned,
        E: From<DomainError>,
        Fut: Future<Output = Result<V, E>>,
    {
        let key = self.key_for(&args, &kwargs)?;
        self.cache
            .try_get_or_set(&key, || (self.func)(args, kwargs), self.ttl)
            .await
    }

    async fn fill<V, C, Fut>(&self, key: &str, compute: C) -> Result<V, DomainError>
    where
        V: Serialize + DeserializeOwned,
        C: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        match &self.lease {
            Some(lease) => {
                self.cache
                    .get_or_set_locked(key, compute, self.ttl, lease)
                    .await
            }
            None => self.cache.get_or_set(key, compute, self.ttl).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde::Deserialize;

    use crate::domain::cache::{DigestAlgorithm, MockCache};
    use crate::infrastructure::cache::InMemoryCache;

    fn cache() -> ApiCache {
        ApiCache::from_backend("api_cache", Arc::new(InMemoryCache::new()))
    }

    #[tokio::test]
    async fn test_memoized_computes_once_per_arguments() {
        let calls = AtomicUsize::new(0);
        let add = cache().memoize("sum", Duration::from_secs(60), |(a, b): (i64, i64)| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { a + b }
        });

        assert_eq!(add.call((2, 3)).await.unwrap(), 5);
        assert_eq!(add.call((2, 3)).await.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(add.call((3, 2)).await.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_memoized_uses_derived_key() {
        let backend = Arc::new(MockCache::new());
        let cache = ApiCache::from_backend("api_cache", backend.clone());
        let add = cache.memoize("sum", Duration::from_secs(60), |(a, b): (i64, i64)| async move {
            a + b
        });

        assert_eq!(add.key_for(&(2, 3), &()).unwrap(), "sum:7d70d88da551");

        add.call((2, 3)).await.unwrap();
        assert!(backend.contains("sum:7d70d88da551"));
        assert_eq!(backend.ttl_of("sum:7d70d88da551"), Some(Duration::from_secs(60)));
    }

    #[derive(Debug, Serialize)]
    struct Page {
        page: u32,
        per_page: u32,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Listing {
        query: String,
        page: u32,
    }

    #[tokio::test]
    async fn test_call_with_named_arguments() {
        let calls = AtomicUsize::new(0);
        let search = cache().memoize(
            "search",
            Duration::from_secs(60),
            |(query,): (String,), page: Page| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Listing {
                        query,
                        page: page.page,
                    }
                }
            },
        );

        let first = search
            .call_with(("rust".to_string(),), Page { page: 2, per_page: 20 })
            .await
            .unwrap();
        let second = search
            .call_with(("rust".to_string(),), Page { page: 2, per_page: 20 })
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        search
            .call_with(("rust".to_string(),), Page { page: 3, per_page: 20 })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_named_argument_order_does_not_matter() {
        let memo = cache().memoize("p", Duration::from_secs(60), |_: (), _: BTreeMap<String, i32>| async { 1 });

        let mut forward = serde_json::Map::new();
        forward.insert("a".to_string(), 1.into());
        forward.insert("b".to_string(), 2.into());
        let mut reverse = serde_json::Map::new();
        reverse.insert("b".to_string(), 2.into());
        reverse.insert("a".to_string(), 1.into());

        assert_eq!(memo.key_for(&(), &forward).unwrap(), "p:e84cde5e1775");
        assert_eq!(memo.key_for(&(), &reverse).unwrap(), "p:e84cde5e1775");
    }

    #[tokio::test]
    async fn test_memoized_with_custom_deriver() {
        let add = cache()
            .memoize("sum", Duration::from_secs(60), |(a, b): (i64, i64)| async move { a + b })
            .with_key_deriver(KeyDeriver::new().with_algorithm(DigestAlgorithm::Sha256));

        assert_eq!(add.key_for(&(2, 3), &()).unwrap(), "sum:f8ca566c0e0f");
        assert_eq!(add.call((2, 3)).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_memoized_with_lease_computes_once_concurrently() {
        let calls = AtomicUsize::new(0);
        let slow = cache()
            .memoize("slow", Duration::from_secs(60), |(n,): (u32,)| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    n * 2
                }
            })
            .with_lease(
                LeaseConfig::default()
                    .with_poll_interval(Duration::from_millis(5))
                    .with_max_wait(Duration::from_secs(2)),
            );

        let (a, b) = tokio::join!(slow.call((21,)), slow.call((21,)));

        assert_eq!(a.unwrap(), 42);
        assert_eq!(b.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_try_call_does_not_cache_errors() {
        let calls = AtomicUsize::new(0);
        let fetch = cache().memoize("users", Duration::from_secs(60), |(id,): (u64,)| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(DomainError::validation("upstream 503"))
                } else {
                    Ok(id)
                }
            }
        });

        let first: Result<u64, DomainError> = fetch.try_call((7,)).await;
        assert!(matches!(first, Err(DomainError::Validation { .. })));

        assert_eq!(fetch.try_call((7,)).await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert_eq!(fetch.try_call((7,)).await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_try_call_with_named_arguments() {
        let calls = AtomicUsize::new(0);
        let search = cache().memoize(
            "search",
            Duration::from_secs(60),
            |(query,): (String,), page: Page| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok::<_, DomainError>(Listing {
                        query,
                        page: page.page,
                    })
                }
            },
        );

        for _ in 0..2 {
            let listing = search
                .try_call_with(("rust".to_string(),), Page { page: 1, per_page: 10 })
                .await
                .unwrap();
            assert_eq!(listing.page, 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_memoized_empty_prefix_rejected() {
        let memo = cache().memoize("", Duration::from_secs(60), |_: ()| async { 1 });

        let result = memo.call(()).await;
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }
}
