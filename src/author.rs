use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::error::is_blocked_by_actor;
use crate::source::{FeedPage, FeedSource};
use crate::types::{AuthorFeedFilter, AuthorFeedParams, FeedViewPost, ReplyTarget};
use crate::xrpc::{fetch_or_none, AuthorFeedApi};

pub struct AuthorFeedSource {
    agent: Arc<dyn AuthorFeedApi>,
    fallback: Arc<dyn AuthorFeedApi>,
    actor: String,
    filter: Option<AuthorFeedFilter>,
}

impl AuthorFeedSource {
    pub fn new(
        agent: Arc<dyn AuthorFeedApi>,
        fallback: Arc<dyn AuthorFeedApi>,
        actor: impl Into<String>,
        filter: Option<AuthorFeedFilter>,
    ) -> Self {
        Self {
            agent,
            fallback,
            actor: actor.into(),
            filter,
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn params(&self, cursor: Option<&str>, limit: usize) -> AuthorFeedParams {
        AuthorFeedParams {
            actor: self.actor.clone(),
            limit,
            cursor: cursor.map(str::to_string),
            filter: self.filter,
            include_pins: self.filter == Some(AuthorFeedFilter::PostsAndAuthorThreads),
        }
    }

    fn filter_feed(&self, feed: Vec<FeedViewPost>) -> Vec<FeedViewPost> {
        if self.filter != Some(AuthorFeedFilter::PostsAndAuthorThreads) {
            return feed;
        }
        let keep: Vec<bool> = feed
            .iter()
            .map(|entry| {
                entry.reply.is_none()
                    || entry.is_repost()
                    || entry.is_pin()
                    || is_author_reply_chain(&self.actor, entry, &feed)
            })
            .collect();
        feed.into_iter()
            .zip(keep)
            .filter_map(|(entry, keep)| keep.then_some(entry))
            .collect()
    }
}

impl FeedSource for AuthorFeedSource {
    fn fetch(&self, cursor: Option<&str>, limit: usize) -> Result<FeedPage> {
        let params = self.params(cursor, limit);
        match self.agent.get_author_feed(&params) {
            Ok(resp) => {
                debug!(actor = %self.actor, entries = resp.feed.len(), "author feed page");
                Ok(FeedPage {
                    cursor: resp.cursor,
                    feed: self.filter_feed(resp.feed),
                })
            }
            Err(err) if is_blocked_by_actor(&err) => {
                info!(actor = %self.actor, "soft block, using public endpoint");
                Ok(match fetch_or_none(self.fallback.as_ref(), &params) {
                    Some(resp) => FeedPage {
                        cursor: resp.cursor,
                        feed: self.filter_feed(resp.feed),
                    },
                    None => FeedPage::empty(),
                })
            }
            Err(err) => Err(err).context("author feed: fetch"),
        }
    }

    fn peek_latest(&self) -> Result<Option<FeedViewPost>> {
        let params = self.params(None, 1);
        match self.agent.get_author_feed(&params) {
            Ok(resp) => Ok(resp.feed.into_iter().next()),
            Err(err) if is_blocked_by_actor(&err) => Ok(fetch_or_none(self.fallback.as_ref(), &params)
                .and_then(|resp| resp.feed.into_iter().next())),
            Err(err) => Err(err).context("author feed: peek latest"),
        }
    }
}

/// Walks from `entry` towards the thread root through entries present in
/// `page`, requiring each step to be authored by `actor`. Ancestors outside
/// the page, and parents that are placeholders, count as part of the chain.
pub fn is_author_reply_chain(actor: &str, entry: &FeedViewPost, page: &[FeedViewPost]) -> bool {
    let by_uri: HashMap<&str, &FeedViewPost> = page
        .iter()
        .map(|candidate| (candidate.post.uri.as_str(), candidate))
        .collect();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = entry;

    for _ in 0..=page.len() {
        if current.post.author.did != actor {
            return false;
        }
        if !visited.insert(current.post.uri.as_str()) {
            return true;
        }
        let parent = match current.reply.as_ref().map(|reply| &reply.parent) {
            Some(ReplyTarget::Post(parent)) => parent,
            _ => return true,
        };
        if parent.author.did != actor {
            return false;
        }
        match by_uri.get(parent.uri.as_str()) {
            Some(next) => current = next,
            None => return true,
        }
    }
    true
}
