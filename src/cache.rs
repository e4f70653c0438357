//! Known-post cache.
//!
//! Holds the URLs of posts the tracker already has, per game, so ingestion can skip
//! a submission that would only come back as a duplicate. The cache is owned by the
//! caller and shared through `Arc`; [`run_refresh_loop`] reseeds it on a timer.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::PostStore;

#[derive(Debug, Default)]
struct Inner {
    urls: HashMap<String, HashSet<String>>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Summary of what the cache holds.
#[derive(Debug, Clone, Serialize)]
pub struct CacheSnapshot {
    pub games: usize,
    pub urls: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct KnownPostCache {
    inner: RwLock<Inner>,
}

impl KnownPostCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, game: &str, url: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.urls.get(game).is_some_and(|urls| urls.contains(url))
    }

    /// Record that the tracker has `url` for `game`. Also starts tracking the game
    /// for future refreshes.
    pub fn remember(&self, game: &str, url: &str) {
        if url.is_empty() {
            return;
        }
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner
            .urls
            .entry(game.to_string())
            .or_default()
            .insert(url.to_string());
    }

    /// Start tracking `game` without knowing any of its posts yet.
    pub fn track(&self, game: &str) {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.urls.entry(game.to_string()).or_default();
    }

    fn games(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.urls.keys().cloned().collect()
    }

    /// Reseed every tracked game from the store.
    ///
    /// A game whose fetch fails keeps its previous entries. Returns how many games were
    /// refreshed.
    pub async fn refresh(&self, store: &dyn PostStore) -> usize {
        let mut refreshed = 0;

        for game in self.games() {
            match store.recent_post_urls(&game).await {
                Ok(urls) => {
                    debug!(game = %game, count = urls.len(), "Refreshed known posts");
                    let mut inner =
                        self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
                    inner.urls.insert(game, urls.into_iter().collect());
                    refreshed += 1;
                }
                Err(e) => {
                    warn!(game = %game, "Failed to refresh known posts: {e}");
                }
            }
        }

        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.refreshed_at = Some(Utc::now());
        refreshed
    }

    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        CacheSnapshot {
            games: inner.urls.len(),
            urls: inner.urls.values().map(HashSet::len).sum(),
            refreshed_at: inner.refreshed_at,
        }
    }
}

/// Refresh `cache` every `interval` until `shutdown` is cancelled.
pub async fn run_refresh_loop(
    cache: Arc<KnownPostCache>,
    store: Arc<dyn PostStore>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let refreshed = cache.refresh(store.as_ref()).await;
                debug!(refreshed, "Known-post cache refresh complete");
            }
        }
    }
}
