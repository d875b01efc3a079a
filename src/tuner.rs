use std::collections::HashSet;

use tracing::debug;

use crate::slice::FeedSlice;
use crate::types::FeedViewPost;

#[derive(Debug, Clone, Default)]
pub struct TunerState {
    seen_repost_uris: HashSet<String>,
}

impl TunerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_seen_repost(&self, uri: &str) -> bool {
        self.seen_repost_uris.contains(uri)
    }

    pub fn seen_count(&self) -> usize {
        self.seen_repost_uris.len()
    }

    pub fn reset(&mut self) {
        self.seen_repost_uris.clear();
    }
}

/// A page transform. `dry_run` must leave the state untouched.
pub type TunerStage = Box<dyn Fn(&mut TunerState, Vec<FeedSlice>, bool) -> Vec<FeedSlice> + Send + Sync>;

pub struct FeedTuner {
    stages: Vec<TunerStage>,
    state: TunerState,
}

impl FeedTuner {
    pub fn new(stages: Vec<TunerStage>) -> Self {
        Self {
            stages,
            state: TunerState::new(),
        }
    }

    pub fn state(&self) -> &TunerState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    pub fn tune(&mut self, feed: Vec<FeedViewPost>, dry_run: bool) -> Vec<FeedSlice> {
        let mut slices: Vec<FeedSlice> = feed.into_iter().map(FeedSlice::new).collect();
        let before = slices.len();
        for stage in &self.stages {
            slices = stage(&mut self.state, slices, dry_run);
        }
        debug!(before, after = slices.len(), dry_run, "tuned page");
        slices
    }
}

pub fn hide_reposts_from(hidden: HashSet<String>) -> TunerStage {
    stage(move |_state, slices, _dry_run| {
        if hidden.is_empty() {
            return slices;
        }
        slices
            .into_iter()
            .filter(|slice| !slice.reposted_by().is_some_and(|did| hidden.contains(did)))
            .collect()
    })
}

/// Keeps the first repost of each post across the whole session. Original
/// posts always pass and never count as seen. A dry run only consults the
/// memory, it never records into it.
pub fn dedup_reposts(state: &mut TunerState, slices: Vec<FeedSlice>, dry_run: bool) -> Vec<FeedSlice> {
    slices
        .into_iter()
        .filter(|slice| {
            if !slice.is_repost() {
                return true;
            }
            let uri = &slice.feed_post().post.uri;
            if state.has_seen_repost(uri) {
                return false;
            }
            if !dry_run {
                state.seen_repost_uris.insert(uri.clone());
            }
            true
        })
        .collect()
}

pub fn remove_reposts(_state: &mut TunerState, slices: Vec<FeedSlice>, _dry_run: bool) -> Vec<FeedSlice> {
    slices.into_iter().filter(|slice| !slice.is_repost()).collect()
}

pub fn remove_orphans(_state: &mut TunerState, slices: Vec<FeedSlice>, _dry_run: bool) -> Vec<FeedSlice> {
    slices.into_iter().filter(|slice| !slice.is_orphan).collect()
}

pub fn stage<F>(f: F) -> TunerStage
where
    F: Fn(&mut TunerState, Vec<FeedSlice>, bool) -> Vec<FeedSlice> + Send + Sync + 'static,
{
    Box::new(f)
}
