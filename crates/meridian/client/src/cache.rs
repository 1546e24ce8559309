//! Last-good snapshot cache
//!
//! Readers never wait on the network: `get()` loads the current snapshot
//! from an `ArcSwapOption`, and a refresh either swaps in a complete new
//! snapshot or swaps in a copy of the old one marked stale. The stale flag
//! lives in the snapshot, so a reader never pairs a value with another
//! snapshot's flag.

use crate::error::{ClientError, Result};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Result of one fetch
#[derive(Debug)]
pub enum FetchOutcome<T> {
    /// A new value, with the server version when the source has one
    Updated(T, Option<u64>),
    /// The server still has the version we hold
    Unchanged,
}

/// Source of cached values
#[async_trait]
pub trait Fetcher<T>: Send + Sync {
    /// Fetch the current value; `known_version` lets the server answer
    /// `Unchanged` without a full transfer
    async fn fetch(&self, known_version: Option<u64>) -> Result<FetchOutcome<T>>;
}

struct Entry<T> {
    value: Arc<T>,
    version: Option<u64>,
    fetched_at: DateTime<Utc>,
    stale: bool,
}

impl<T> Entry<T> {
    fn marked(&self, stale: bool) -> Self {
        Self {
            value: self.value.clone(),
            version: self.version,
            fetched_at: self.fetched_at,
            stale,
        }
    }
}

/// A value read from the cache
#[derive(Debug, Clone)]
pub struct CachedValue<T> {
    pub value: Arc<T>,
    pub version: Option<u64>,

    /// The last refresh failed; `value` is the last good one
    pub stale: bool,

    /// When `value` was fetched
    pub fetched_at: DateTime<Utc>,
}

/// Pull-based cache with background refresh
pub struct ClientCache<T> {
    name: String,
    fetcher: Arc<dyn Fetcher<T>>,
    current: ArcSwapOption<Entry<T>>,
    failures: AtomicU32,
    refresh_interval: Duration,
    fetch_timeout: Duration,
}

impl<T: Send + Sync + 'static> ClientCache<T> {
    pub fn new(
        name: impl Into<String>,
        fetcher: Arc<dyn Fetcher<T>>,
        refresh_interval: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            fetcher,
            current: ArcSwapOption::empty(),
            failures: AtomicU32::new(0),
            refresh_interval,
            fetch_timeout,
        }
    }

    /// Current value; `Unavailable` until the first successful refresh
    pub fn get(&self) -> Result<CachedValue<T>> {
        let entry = self.current.load_full().ok_or_else(|| {
            ClientError::Unavailable(format!("{} cache has never been populated", self.name))
        })?;

        Ok(CachedValue {
            value: entry.value.clone(),
            version: entry.version,
            stale: entry.stale,
            fetched_at: entry.fetched_at,
        })
    }

    /// Whether the last refresh failed
    pub fn is_stale(&self) -> bool {
        match self.current.load().as_ref() {
            Some(entry) => entry.stale,
            None => self.failures.load(Ordering::Acquire) > 0,
        }
    }

    /// Failed refreshes since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    /// Fetch once. Returns whether a new value was swapped in.
    pub async fn refresh(&self) -> Result<bool> {
        let known_version = self.current.load_full().and_then(|e| e.version);
        let fetched = match tokio::time::timeout(
            self.fetch_timeout,
            self.fetcher.fetch(known_version),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(self.fetch_timeout.as_millis() as u64)),
        };

        match fetched {
            Ok(FetchOutcome::Updated(value, version)) => {
                self.current.store(Some(Arc::new(Entry {
                    value: Arc::new(value),
                    version,
                    fetched_at: Utc::now(),
                    stale: false,
                })));
                self.failures.store(0, Ordering::Release);
                debug!(cache = %self.name, version = ?version, "Cache refreshed");
                Ok(true)
            }
            Ok(FetchOutcome::Unchanged) => {
                self.failures.store(0, Ordering::Release);
                self.mark(false);
                Ok(false)
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                self.mark(true);
                warn!(
                    cache = %self.name,
                    error = %e,
                    consecutive_failures = failures,
                    "Cache refresh failed; serving last good value"
                );
                Err(e)
            }
        }
    }

    /// Swap in a copy of the current snapshot carrying `stale`
    fn mark(&self, stale: bool) {
        self.current.rcu(|current| match current {
            Some(entry) if entry.stale != stale => Some(Arc::new(entry.marked(stale))),
            other => other.clone(),
        });
    }

    /// Refresh on the configured interval until `shutdown` fires.
    ///
    /// An in-flight refresh is abandoned on shutdown; the snapshot is only
    /// ever replaced whole, so nothing is left half-written.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => break,
                }

                tokio::select! {
                    _ = self.refresh() => {}
                    _ = shutdown.changed() => break,
                }
            }
            debug!(cache = %self.name, "Cache refresh loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted outcomes; `None` means failure
    struct Scripted {
        script: Mutex<VecDeque<Option<FetchOutcome<u32>>>>,
        seen_versions: Mutex<Vec<Option<u64>>>,
    }

    impl Scripted {
        fn new(script: Vec<Option<FetchOutcome<u32>>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen_versions: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Fetcher<u32> for Scripted {
        async fn fetch(&self, known_version: Option<u64>) -> Result<FetchOutcome<u32>> {
            self.seen_versions.lock().unwrap().push(known_version);
            match self.script.lock().unwrap().pop_front().flatten() {
                Some(outcome) => Ok(outcome),
                None => Err(ClientError::Status {
                    status: 503,
                    message: "down".into(),
                }),
            }
        }
    }

    fn cache(fetcher: Arc<Scripted>) -> ClientCache<u32> {
        ClientCache::new(
            "test",
            fetcher,
            Duration::from_secs(30),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_unavailable_before_first_success() {
        let cache = cache(Scripted::new(vec![None]));
        assert!(matches!(cache.get(), Err(ClientError::Unavailable(_))));
        assert!(cache.refresh().await.is_err());
        assert!(matches!(cache.get(), Err(ClientError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_failures_keep_last_good_value() {
        let cache = cache(Scripted::new(vec![
            Some(FetchOutcome::Updated(7, Some(1))),
            None,
            None,
            None,
        ]));
        assert!(cache.refresh().await.unwrap());
        assert!(!cache.get().unwrap().stale);

        for _ in 0..3 {
            assert!(cache.refresh().await.is_err());
        }
        let cached = cache.get().unwrap();
        assert_eq!(*cached.value, 7);
        assert!(cached.stale);
        assert_eq!(cache.consecutive_failures(), 3);
    }

    #[tokio::test]
    async fn test_unchanged_clears_staleness_and_sends_version() {
        let fetcher = Scripted::new(vec![
            Some(FetchOutcome::Updated(1, Some(4))),
            None,
            Some(FetchOutcome::Unchanged),
            Some(FetchOutcome::Updated(2, Some(5))),
        ]);
        let cache = cache(fetcher.clone());

        cache.refresh().await.unwrap();
        let _ = cache.refresh().await;
        assert!(!cache.refresh().await.unwrap());
        assert!(!cache.is_stale());
        assert_eq!(*cache.get().unwrap().value, 1);

        cache.refresh().await.unwrap();
        assert_eq!(*cache.get().unwrap().value, 2);
        assert_eq!(
            *fetcher.seen_versions.lock().unwrap(),
            vec![None, Some(4), Some(4), Some(4)]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_readers_never_see_fresh_value_flagged_stale() {
        // Odd values are always followed by another success, so they must
        // never be read as stale.
        let mut script = Vec::new();
        for i in 0..500u32 {
            script.push(None);
            script.push(Some(FetchOutcome::Updated(2 * i + 1, Some(2 * i as u64 + 1))));
            script.push(Some(FetchOutcome::Updated(2 * i + 2, Some(2 * i as u64 + 2))));
        }
        let cache = Arc::new(cache(Scripted::new(script)));
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let reader = {
            let cache = cache.clone();
            let done = done.clone();
            tokio::spawn(async move {
                while !done.load(Ordering::Acquire) {
                    if let Ok(cached) = cache.get() {
                        assert!(
                            !(cached.stale && *cached.value % 2 == 1),
                            "value {} read as stale",
                            cached.value
                        );
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..1500 {
            let _ = cache.refresh().await;
        }
        done.store(true, Ordering::Release);
        reader.await.unwrap();

        let cached = cache.get().unwrap();
        assert_eq!(*cached.value, 1000);
        assert!(!cached.stale);
    }

    struct Hanging;

    #[async_trait]
    impl Fetcher<u32> for Hanging {
        async fn fetch(&self, _known_version: Option<u64>) -> Result<FetchOutcome<u32>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(FetchOutcome::Updated(1, None))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout_counts_as_failure() {
        let cache: ClientCache<u32> = ClientCache::new(
            "hanging",
            Arc::new(Hanging),
            Duration::from_secs(30),
            Duration::from_secs(2),
        );
        assert!(matches!(cache.refresh().await, Err(ClientError::Timeout(2000))));
        assert!(cache.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_stops_on_shutdown() {
        let fetcher = Scripted::new(vec![Some(FetchOutcome::Updated(3, Some(1)))]);
        let cache = Arc::new(cache(fetcher));
        let (tx, rx) = watch::channel(false);
        let handle = cache.clone().spawn(rx);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*cache.get().unwrap().value, 3);

        tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(*cache.get().unwrap().value, 3);
    }
}
