use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{apply_prepended_items, fetch_latest_items, FeedPageData, PagedFeed, QueryCache, QueryKey};
use crate::slice::FeedSlice;
use crate::source::FeedSource;
use crate::tuner::FeedTuner;
use crate::types::FeedViewPost;

pub const PAGE_SIZE: usize = 30;

pub struct FeedSession {
    source: Arc<dyn FeedSource>,
    key: QueryKey,
    cache: Arc<dyn QueryCache>,
    tuner: Mutex<FeedTuner>,
}

impl FeedSession {
    pub fn new(source: Arc<dyn FeedSource>, key: QueryKey, cache: Arc<dyn QueryCache>, tuner: FeedTuner) -> Self {
        Self {
            source,
            key,
            cache,
            tuner: Mutex::new(tuner),
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn pages(&self) -> Option<Arc<PagedFeed>> {
        self.cache.get(&self.key)
    }

    pub fn fetch_next_page(&self) -> Result<Option<Vec<FeedSlice>>> {
        let current = self.cache.get(&self.key).unwrap_or_default();
        let cursor = match current.pages.last() {
            None => None,
            Some(last) => match last.cursor.clone() {
                Some(cursor) => Some(cursor),
                None => return Ok(None),
            },
        };

        let page = self
            .source
            .fetch(cursor.as_deref(), PAGE_SIZE)
            .with_context(|| format!("session: fetch page for {}", self.key))?;
        debug!(key = %self.key, entries = page.feed.len(), end = page.is_end(), "page loaded");

        let mut next = PagedFeed {
            page_params: current.page_params.clone(),
            pages: current.pages.clone(),
        };
        next.page_params.push(cursor);
        next.pages.push(Arc::new(FeedPageData {
            api: self.source.clone(),
            cursor: page.cursor,
            feed: page.feed.clone(),
            fetched_at: Utc::now(),
        }));
        self.cache.set(self.key.clone(), Arc::new(next));

        Ok(Some(self.tuner.lock().tune(page.feed, false)))
    }

    pub fn refresh(&self) -> Result<Vec<FeedSlice>> {
        self.cache.remove(&self.key);
        self.tuner.lock().reset();
        Ok(self.fetch_next_page()?.unwrap_or_default())
    }

    pub fn poll_latest(&self) -> Result<Option<Vec<FeedViewPost>>> {
        fetch_latest_items(self.cache.as_ref(), &self.key)
    }

    pub fn show_new_posts(&self, items: Vec<FeedViewPost>) {
        apply_prepended_items(self.cache.as_ref(), &self.key, items);
    }

    /// Tunes `entries` without touching the session's memory.
    pub fn peek_tuned(&self, entries: Vec<FeedViewPost>) -> Vec<FeedSlice> {
        self.tuner.lock().tune(entries, true)
    }

    pub fn has_new_posts(&self) -> Result<bool> {
        let Some(latest) = self.source.peek_latest().context("session: peek latest")? else {
            return Ok(false);
        };
        let Some(slice) = self.peek_tuned(vec![latest]).into_iter().next() else {
            return Ok(false);
        };
        let uri = &slice.feed_post().post.uri;
        let cached = self
            .cache
            .get(&self.key)
            .and_then(|data| data.pages.first().cloned())
            .is_some_and(|page0| page0.feed.iter().any(|entry| &entry.post.uri == uri));
        Ok(!cached)
    }
}
