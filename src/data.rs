use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::author::AuthorFeedSource;
use crate::blocked_by::BlockedByFeedSource;
use crate::cache::QueryKey;
use crate::source::{FeedPage, FeedSource};
use crate::tuner::{dedup_reposts, hide_reposts_from, remove_orphans, remove_reposts, stage, FeedTuner, TunerStage};
use crate::types::{AuthorFeedFilter, FeedViewPost};
use crate::xrpc::AuthorFeedApi;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPreferences {
    pub hide_reposts: bool,
    pub hidden_reposters: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedDescriptor {
    Author {
        actor: String,
        filter: Option<AuthorFeedFilter>,
    },
    BlockedBy { actors: Vec<String> },
}

impl FeedDescriptor {
    pub fn query_key(&self) -> QueryKey {
        match self {
            FeedDescriptor::Author { .. } => QueryKey::post_feed(self.to_string()),
            FeedDescriptor::BlockedBy { actors } => {
                QueryKey::post_feed(self.to_string()).with_param("actors", actors.join(","))
            }
        }
    }

    pub fn tuner(&self, prefs: &FeedPreferences) -> FeedTuner {
        let mut stages: Vec<TunerStage> = Vec::new();
        if !prefs.hidden_reposters.is_empty() {
            stages.push(hide_reposts_from(prefs.hidden_reposters.clone()));
        }
        if prefs.hide_reposts {
            stages.push(stage(remove_reposts));
        }
        if let FeedDescriptor::BlockedBy { .. } = self {
            stages.push(stage(remove_orphans));
        }
        stages.push(stage(dedup_reposts));
        FeedTuner::new(stages)
    }
}

impl fmt::Display for FeedDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedDescriptor::Author { actor, filter } => {
                let filter = filter.map_or("default", |f| f.as_str());
                write!(f, "author|{actor}|{filter}")
            }
            FeedDescriptor::BlockedBy { .. } => write!(f, "blockedby"),
        }
    }
}

#[derive(Clone)]
pub struct FeedServices {
    agent: Arc<dyn AuthorFeedApi>,
    public: Arc<dyn AuthorFeedApi>,
}

impl FeedServices {
    pub fn new(agent: Arc<dyn AuthorFeedApi>, public: Arc<dyn AuthorFeedApi>) -> Self {
        Self { agent, public }
    }

    pub fn build_source(&self, descriptor: &FeedDescriptor) -> Arc<dyn FeedSource> {
        match descriptor {
            FeedDescriptor::Author { actor, filter } => Arc::new(AuthorFeedSource::new(
                self.agent.clone(),
                self.public.clone(),
                actor.clone(),
                *filter,
            )),
            FeedDescriptor::BlockedBy { actors } => {
                Arc::new(BlockedByFeedSource::new(self.public.clone(), actors.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticFeedSource {
    pages: Vec<Vec<FeedViewPost>>,
}

impl StaticFeedSource {
    pub fn new(pages: Vec<Vec<FeedViewPost>>) -> Self {
        Self { pages }
    }
}

impl FeedSource for StaticFeedSource {
    fn fetch(&self, cursor: Option<&str>, limit: usize) -> Result<FeedPage> {
        let index = match cursor {
            None => 0,
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("static feed: bad cursor {raw:?}"))?,
        };
        let Some(feed) = self.pages.get(index) else {
            return Ok(FeedPage::empty());
        };
        let next = index + 1;
        Ok(FeedPage {
            cursor: (next < self.pages.len()).then(|| next.to_string()),
            feed: feed.iter().take(limit).cloned().collect(),
        })
    }

    fn peek_latest(&self) -> Result<Option<FeedViewPost>> {
        Ok(self.pages.first().and_then(|page| page.first().cloned()))
    }
}
