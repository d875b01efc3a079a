use std::sync::Arc;
use std::thread;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::source::{FeedPage, FeedSource};
use crate::types::{AuthorFeedFilter, AuthorFeedParams, AuthorFeedResponse, FeedViewPost};
use crate::xrpc::{fetch_or_none, AuthorFeedApi};

pub const BATCH_SIZE: usize = 10;
pub const PER_AUTHOR_LIMIT: usize = 15;

#[derive(Debug, Clone)]
struct AuthorSource {
    actor: String,
    cursor: Option<String>,
    buffer: Vec<FeedViewPost>,
    has_more: bool,
}

#[derive(Debug, Default)]
struct AggregatorState {
    sources: Vec<AuthorSource>,
    initialized: bool,
    item_cursor: usize,
}

/// The returned cursor is a running count of emitted items. It does not
/// encode per-source positions, so only the in-memory state can resume a
/// feed; a fetch without a cursor starts every source over.
pub struct BlockedByFeedSource {
    api: Arc<dyn AuthorFeedApi>,
    actors: Vec<String>,
    state: Mutex<AggregatorState>,
}

impl BlockedByFeedSource {
    pub fn new(api: Arc<dyn AuthorFeedApi>, actors: Vec<String>) -> Self {
        Self {
            api,
            actors,
            state: Mutex::new(AggregatorState::default()),
        }
    }

    pub fn actors(&self) -> &[String] {
        &self.actors
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    fn initialize(&self, state: &mut AggregatorState) {
        state.sources = self
            .actors
            .iter()
            .map(|actor| AuthorSource {
                actor: actor.clone(),
                cursor: None,
                buffer: Vec::new(),
                has_more: true,
            })
            .collect();
        state.item_cursor = 0;
        state.initialized = true;
    }

    fn top_up(&self, state: &mut AggregatorState, limit: usize) {
        let threshold = (limit / 2).max(1);
        let needs_data: Vec<usize> = state
            .sources
            .iter()
            .enumerate()
            .filter(|(_, source)| source.has_more && source.buffer.len() < threshold)
            .map(|(idx, _)| idx)
            .collect();

        for batch in needs_data.chunks(BATCH_SIZE) {
            let requests: Vec<AuthorFeedParams> = batch
                .iter()
                .map(|&idx| {
                    let source = &state.sources[idx];
                    AuthorFeedParams {
                        actor: source.actor.clone(),
                        limit: PER_AUTHOR_LIMIT,
                        cursor: source.cursor.clone(),
                        filter: Some(AuthorFeedFilter::PostsAndAuthorThreads),
                        include_pins: false,
                    }
                })
                .collect();

            let results = self.fetch_batch(&requests);

            for (&idx, result) in batch.iter().zip(results) {
                let source = &mut state.sources[idx];
                match result {
                    Some(resp) => {
                        source.buffer.extend(resp.feed);
                        source.cursor = resp.cursor;
                        if source.cursor.is_none() {
                            source.has_more = false;
                        }
                    }
                    None => source.has_more = false,
                }
            }
        }
    }

    fn fetch_batch(&self, requests: &[AuthorFeedParams]) -> Vec<Option<AuthorFeedResponse>> {
        let api = self.api.as_ref();
        thread::scope(|scope| {
            let handles: Vec<_> = requests
                .iter()
                .map(|params| scope.spawn(move || fetch_or_none(api, params)))
                .collect();
            handles
                .into_iter()
                .zip(requests)
                .map(|(handle, params)| {
                    handle.join().unwrap_or_else(|_| {
                        warn!(actor = %params.actor, "author fetch panicked");
                        None
                    })
                })
                .collect()
        })
    }

    fn drain_sorted(state: &mut AggregatorState, limit: usize) -> Vec<FeedViewPost> {
        let mut all: Vec<(usize, usize)> = state
            .sources
            .iter()
            .enumerate()
            .flat_map(|(src, source)| (0..source.buffer.len()).map(move |pos| (src, pos)))
            .collect();
        // sort_by is stable: equal timestamps keep source order.
        all.sort_by(|a, b| {
            let a_time = state.sources[a.0].buffer[a.1].post.indexed_at;
            let b_time = state.sources[b.0].buffer[b.1].post.indexed_at;
            b_time.cmp(&a_time)
        });
        all.truncate(limit);

        let mut taken: Vec<Option<FeedViewPost>> = vec![None; all.len()];
        let mut by_source: Vec<Vec<(usize, usize)>> = vec![Vec::new(); state.sources.len()];
        for (order, &(src, pos)) in all.iter().enumerate() {
            by_source[src].push((pos, order));
        }
        for (src, mut picks) in by_source.into_iter().enumerate() {
            if picks.is_empty() {
                continue;
            }
            // Remove from the back so earlier positions stay valid.
            picks.sort_unstable_by(|a, b| b.0.cmp(&a.0));
            let buffer = &mut state.sources[src].buffer;
            for (pos, order) in picks {
                taken[order] = Some(buffer.remove(pos));
            }
        }
        taken.into_iter().flatten().collect()
    }
}

impl FeedSource for BlockedByFeedSource {
    fn fetch(&self, cursor: Option<&str>, limit: usize) -> Result<FeedPage> {
        let mut state = self.state.lock();
        if cursor.is_none() {
            self.initialize(&mut state);
        }
        if state.sources.is_empty() {
            return Ok(FeedPage::empty());
        }

        self.top_up(&mut state, limit);
        let feed = Self::drain_sorted(&mut state, limit);
        debug!(
            drained = feed.len(),
            live_sources = state.sources.iter().filter(|s| s.has_more).count(),
            "blocked-by drain"
        );
        if feed.is_empty() {
            return Ok(FeedPage::empty());
        }
        state.item_cursor += feed.len();
        Ok(FeedPage {
            cursor: Some(state.item_cursor.to_string()),
            feed,
        })
    }

    fn peek_latest(&self) -> Result<Option<FeedViewPost>> {
        let Some(actor) = self.actors.first() else {
            return Ok(None);
        };
        let params = AuthorFeedParams {
            actor: actor.clone(),
            limit: 1,
            cursor: None,
            filter: Some(AuthorFeedFilter::PostsAndAuthorThreads),
            include_pins: false,
        };
        Ok(fetch_or_none(self.api.as_ref(), &params).and_then(|resp| resp.feed.into_iter().next()))
    }
}
