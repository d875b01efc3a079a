use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::source::FeedSource;
use crate::types::FeedViewPost;

pub const LATEST_PAGE_SIZE: usize = 30;

const POST_FEED_ROOT: &str = "post-feed";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    root: &'static str,
    parts: Vec<String>,
}

impl QueryKey {
    pub fn post_feed(feed_desc: impl Into<String>) -> Self {
        Self {
            root: POST_FEED_ROOT,
            parts: vec![feed_desc.into()],
        }
    }

    pub fn with_param(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.parts.push(format!("{name}={value}"));
        self
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for part in &self.parts {
            write!(f, "/{part}")?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct FeedPageData {
    pub api: Arc<dyn FeedSource>,
    pub cursor: Option<String>,
    pub feed: Vec<FeedViewPost>,
    pub fetched_at: DateTime<Utc>,
}

impl fmt::Debug for FeedPageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedPageData")
            .field("cursor", &self.cursor)
            .field("feed", &self.feed.len())
            .field("fetched_at", &self.fetched_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PagedFeed {
    pub page_params: Vec<Option<String>>,
    pub pages: Vec<Arc<FeedPageData>>,
}

pub trait QueryCache: Send + Sync {
    fn get(&self, key: &QueryKey) -> Option<Arc<PagedFeed>>;
    fn set(&self, key: QueryKey, value: Arc<PagedFeed>);
    fn remove(&self, key: &QueryKey) -> Option<Arc<PagedFeed>>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<QueryKey, Arc<PagedFeed>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueryCache for MemoryCache {
    fn get(&self, key: &QueryKey) -> Option<Arc<PagedFeed>> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: QueryKey, value: Arc<PagedFeed>) {
        self.entries.write().insert(key, value);
    }

    fn remove(&self, key: &QueryKey) -> Option<Arc<PagedFeed>> {
        self.entries.write().remove(key)
    }
}

fn first_page(data: &PagedFeed) -> Option<&Arc<FeedPageData>> {
    data.pages.first()
}

fn page_uris(page: &FeedPageData) -> HashSet<&str> {
    page.feed.iter().map(|entry| entry.post.uri.as_str()).collect()
}

/// Prepends the entries of `new_items` that page 0 does not already hold.
/// Pages after the first, and the whole value when nothing is new, keep
/// their identity.
pub fn apply_prepended_items(cache: &dyn QueryCache, key: &QueryKey, new_items: Vec<FeedViewPost>) {
    let Some(data) = cache.get(key) else {
        return;
    };
    let Some(page0) = first_page(&data) else {
        return;
    };

    let fresh: Vec<FeedViewPost> = {
        let existing = page_uris(page0);
        new_items
            .into_iter()
            .filter(|entry| !existing.contains(entry.post.uri.as_str()))
            .collect()
    };
    if fresh.is_empty() {
        return;
    }
    debug!(key = %key, prepended = fresh.len(), "prepending to page 0");

    let mut feed = fresh;
    feed.extend(page0.feed.iter().cloned());
    let replaced = Arc::new(FeedPageData {
        api: page0.api.clone(),
        cursor: page0.cursor.clone(),
        feed,
        fetched_at: Utc::now(),
    });

    let mut pages = Vec::with_capacity(data.pages.len());
    pages.push(replaced);
    pages.extend(data.pages.iter().skip(1).cloned());
    cache.set(
        key.clone(),
        Arc::new(PagedFeed {
            page_params: data.page_params.clone(),
            pages,
        }),
    );
}

/// Polls page 0's source for entries newer than what is cached. Returns
/// `None` when nothing is cached or nothing is new. Never writes the cache.
pub fn fetch_latest_items(cache: &dyn QueryCache, key: &QueryKey) -> Result<Option<Vec<FeedViewPost>>> {
    let Some(data) = cache.get(key) else {
        return Ok(None);
    };
    let Some(page0) = first_page(&data) else {
        return Ok(None);
    };

    let latest = page0
        .api
        .fetch(None, LATEST_PAGE_SIZE)
        .with_context(|| format!("cache: poll latest for {key}"))?;
    let existing = page_uris(page0);
    let fresh: Vec<FeedViewPost> = latest
        .feed
        .into_iter()
        .filter(|entry| !existing.contains(entry.post.uri.as_str()))
        .collect();
    if fresh.is_empty() {
        return Ok(None);
    }
    Ok(Some(fresh))
}
