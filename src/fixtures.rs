//! Builders shared by the unit tests.

use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::json;

use crate::source::{FeedPage, FeedSource};
use crate::types::{
    AuthorFeedParams, AuthorFeedResponse, BlockedAuthor, BlockedPost, FeedViewPost, NotFoundPost,
    PostView, ProfileViewBasic, Reason, ReplyRef, ReplyTarget,
};
use crate::xrpc::AuthorFeedApi;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_714_557_600 + secs, 0).unwrap()
}

pub fn profile(did: &str) -> ProfileViewBasic {
    ProfileViewBasic {
        did: did.into(),
        handle: format!("{did}.test"),
        display_name: None,
        viewer: None,
    }
}

pub fn post_view(uri: &str, did: &str) -> PostView {
    PostView {
        uri: uri.into(),
        cid: "bafyreig6fcr7pxa4gj5tu4jkbqbu37yaxqnxfjntbknbyomu6pjn3f5mqy".into(),
        author: profile(did),
        record: json!({"$type": "app.bsky.feed.post", "text": "test"}),
        indexed_at: at(0),
    }
}

pub fn reply_view(uri: &str, did: &str, parent_uri: &str, root_uri: &str) -> PostView {
    let mut view = post_view(uri, did);
    view.record = json!({
        "$type": "app.bsky.feed.post",
        "text": "reply",
        "reply": {"parent": {"uri": parent_uri}, "root": {"uri": root_uri}},
    });
    view
}

pub fn original(uri: &str, did: &str) -> FeedViewPost {
    FeedViewPost {
        post: post_view(uri, did),
        reason: None,
        reply: None,
    }
}

pub fn original_at(uri: &str, did: &str, secs: i64) -> FeedViewPost {
    let mut entry = original(uri, did);
    entry.post.indexed_at = at(secs);
    entry
}

pub fn repost(uri: &str, author: &str, reposter: &str) -> FeedViewPost {
    FeedViewPost {
        post: post_view(uri, author),
        reason: Some(Reason::Repost {
            by: profile(reposter),
            indexed_at: at(0),
        }),
        reply: None,
    }
}

pub fn blocked(uri: &str, did: &str) -> ReplyTarget {
    ReplyTarget::Blocked(BlockedPost {
        uri: uri.into(),
        blocked: true,
        author: BlockedAuthor { did: did.into() },
    })
}

pub fn not_found(uri: &str) -> ReplyTarget {
    ReplyTarget::NotFound(NotFoundPost {
        uri: uri.into(),
        not_found: true,
    })
}

pub fn reply_entry(post: PostView, parent: ReplyTarget, root: ReplyTarget) -> FeedViewPost {
    FeedViewPost {
        post,
        reason: None,
        reply: Some(ReplyRef {
            root,
            parent,
            grandparent_author: None,
        }),
    }
}

#[derive(Default)]
pub struct ScriptedSource {
    pages: Mutex<VecDeque<FeedPage>>,
    pub calls: Mutex<Vec<(Option<String>, usize)>>,
}

impl ScriptedSource {
    pub fn new(pages: Vec<FeedPage>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FeedSource for ScriptedSource {
    fn fetch(&self, cursor: Option<&str>, limit: usize) -> Result<FeedPage> {
        self.calls.lock().push((cursor.map(str::to_string), limit));
        Ok(self.pages.lock().pop_front().unwrap_or_default())
    }

    fn peek_latest(&self) -> Result<Option<FeedViewPost>> {
        Ok(self
            .pages
            .lock()
            .front()
            .and_then(|page| page.feed.first().cloned()))
    }
}

pub enum Scripted {
    Ok(AuthorFeedResponse),
    BlockedByActor,
    Fail(&'static str),
    Panic,
}

#[derive(Default)]
pub struct ScriptedApi {
    scripts: Mutex<Vec<(String, VecDeque<Scripted>)>>,
    pub requests: Mutex<Vec<AuthorFeedParams>>,
}

impl ScriptedApi {
    pub fn with(self, actor: &str, steps: Vec<Scripted>) -> Self {
        self.scripts.lock().push((actor.to_string(), steps.into()));
        self
    }
}

impl AuthorFeedApi for ScriptedApi {
    fn get_author_feed(&self, params: &AuthorFeedParams) -> Result<AuthorFeedResponse> {
        self.requests.lock().push(params.clone());
        let step = {
            let mut scripts = self.scripts.lock();
            scripts
                .iter_mut()
                .find(|(actor, _)| actor == &params.actor)
                .and_then(|(_, steps)| steps.pop_front())
        };
        match step {
            Some(Scripted::Ok(response)) => Ok(response),
            Some(Scripted::BlockedByActor) => Err(crate::error::FeedError::BlockedByActor {
                actor: params.actor.clone(),
            }
            .into()),
            Some(Scripted::Fail(msg)) => Err(anyhow!(msg)),
            Some(Scripted::Panic) => panic!("scripted panic for {}", params.actor),
            None => Ok(AuthorFeedResponse::default()),
        }
    }
}

pub fn response(feed: Vec<FeedViewPost>, cursor: Option<&str>) -> AuthorFeedResponse {
    AuthorFeedResponse {
        feed,
        cursor: cursor.map(str::to_string),
    }
}
