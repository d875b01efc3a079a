use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ViewerState {
    #[serde(default)]
    pub muted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted_by_list: Option<Value>,
    #[serde(default)]
    pub blocked_by: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_by_list: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileViewBasic {
    pub did: String,
    #[serde(default)]
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ViewerState>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub uri: String,
    #[serde(default)]
    pub cid: String,
    pub author: ProfileViewBasic,
    #[serde(default)]
    pub record: Value,
    pub indexed_at: DateTime<Utc>,
}

impl PostView {
    pub fn record_parent_uri(&self) -> Option<&str> {
        self.record.get("reply")?.get("parent")?.get("uri")?.as_str()
    }

    pub fn record_text(&self) -> &str {
        self.record
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "$type")]
pub enum Reason {
    #[serde(rename = "app.bsky.feed.defs#reasonRepost")]
    Repost {
        by: ProfileViewBasic,
        #[serde(rename = "indexedAt")]
        indexed_at: DateTime<Utc>,
    },
    #[serde(rename = "app.bsky.feed.defs#reasonPin")]
    Pin,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockedAuthor {
    pub did: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockedPost {
    pub uri: String,
    #[serde(default)]
    pub blocked: bool,
    pub author: BlockedAuthor,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundPost {
    pub uri: String,
    #[serde(default)]
    pub not_found: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "$type")]
pub enum ReplyTarget {
    #[serde(rename = "app.bsky.feed.defs#postView")]
    Post(PostView),
    #[serde(rename = "app.bsky.feed.defs#blockedPost")]
    Blocked(BlockedPost),
    #[serde(rename = "app.bsky.feed.defs#notFoundPost")]
    NotFound(NotFoundPost),
}

impl ReplyTarget {
    pub fn uri(&self) -> &str {
        match self {
            ReplyTarget::Post(post) => &post.uri,
            ReplyTarget::Blocked(blocked) => &blocked.uri,
            ReplyTarget::NotFound(missing) => &missing.uri,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRef {
    pub root: ReplyTarget,
    pub parent: ReplyTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grandparent_author: Option<ProfileViewBasic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedViewPost {
    pub post: PostView,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
}

impl FeedViewPost {
    pub fn is_repost(&self) -> bool {
        matches!(self.reason, Some(Reason::Repost { .. }))
    }

    pub fn is_pin(&self) -> bool {
        matches!(self.reason, Some(Reason::Pin))
    }

    pub fn reposted_by(&self) -> Option<&str> {
        match &self.reason {
            Some(Reason::Repost { by, .. }) => Some(by.did.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorFeedFilter {
    PostsWithReplies,
    PostsNoReplies,
    PostsWithMedia,
    PostsAndAuthorThreads,
    PostsWithVideo,
}

impl AuthorFeedFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorFeedFilter::PostsWithReplies => "posts_with_replies",
            AuthorFeedFilter::PostsNoReplies => "posts_no_replies",
            AuthorFeedFilter::PostsWithMedia => "posts_with_media",
            AuthorFeedFilter::PostsAndAuthorThreads => "posts_and_author_threads",
            AuthorFeedFilter::PostsWithVideo => "posts_with_video",
        }
    }
}

impl fmt::Display for AuthorFeedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorFeedFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posts_with_replies" => Ok(AuthorFeedFilter::PostsWithReplies),
            "posts_no_replies" => Ok(AuthorFeedFilter::PostsNoReplies),
            "posts_with_media" => Ok(AuthorFeedFilter::PostsWithMedia),
            "posts_and_author_threads" => Ok(AuthorFeedFilter::PostsAndAuthorThreads),
            "posts_with_video" => Ok(AuthorFeedFilter::PostsWithVideo),
            other => Err(format!("unknown author feed filter {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthorFeedParams {
    pub actor: String,
    pub limit: usize,
    pub cursor: Option<String>,
    pub filter: Option<AuthorFeedFilter>,
    pub include_pins: bool,
}

impl AuthorFeedParams {
    pub fn into_params(self) -> Vec<(String, String)> {
        let mut params = vec![
            ("actor".to_string(), self.actor),
            ("limit".to_string(), self.limit.to_string()),
        ];
        if let Some(filter) = self.filter {
            params.push(("filter".into(), filter.as_str().into()));
        }
        if self.include_pins {
            params.push(("includePins".into(), "true".into()));
        }
        if let Some(cursor) = self.cursor {
            params.push(("cursor".into(), cursor));
        }
        params
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AuthorFeedResponse {
    #[serde(default)]
    pub feed: Vec<FeedViewPost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GetPostsResponse {
    #[serde(default)]
    pub posts: Vec<PostView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_reply_placeholders() {
        let raw = r#"{
            "post": {
                "uri": "at://did:plc:child/app.bsky.feed.post/1",
                "cid": "bafy",
                "author": {"did": "did:plc:child", "handle": "child.test"},
                "record": {"text": "hi", "reply": {"parent": {"uri": "at://did:plc:gone/app.bsky.feed.post/2"}}},
                "indexedAt": "2024-05-01T10:00:00.000Z"
            },
            "reply": {
                "root": {"$type": "app.bsky.feed.defs#blockedPost", "uri": "at://did:plc:blocker/app.bsky.feed.post/9", "blocked": true, "author": {"did": "did:plc:blocker"}},
                "parent": {"$type": "app.bsky.feed.defs#notFoundPost", "uri": "at://did:plc:gone/app.bsky.feed.post/2", "notFound": true}
            },
            "reason": {"$type": "app.bsky.feed.defs#reasonPin"}
        }"#;
        let entry: FeedViewPost = serde_json::from_str(raw).unwrap();
        let reply = entry.reply.as_ref().unwrap();
        assert!(matches!(reply.root, ReplyTarget::Blocked(ref b) if b.author.did == "did:plc:blocker"));
        assert!(matches!(reply.parent, ReplyTarget::NotFound(_)));
        assert!(entry.is_pin());
        assert_eq!(
            entry.post.record_parent_uri(),
            Some("at://did:plc:gone/app.bsky.feed.post/2")
        );
    }

    #[test]
    fn unknown_reason_is_tolerated() {
        let raw = r#"{
            "post": {
                "uri": "at://a/app.bsky.feed.post/1",
                "author": {"did": "did:a"},
                "indexedAt": "2024-05-01T10:00:00Z"
            },
            "reason": {"$type": "app.bsky.feed.defs#reasonSomethingNew"}
        }"#;
        let entry: FeedViewPost = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.reason, Some(Reason::Unknown));
        assert!(!entry.is_repost());
    }

    #[test]
    fn query_params_follow_upstream_shape() {
        let params = AuthorFeedParams {
            actor: "did:a".into(),
            limit: 15,
            cursor: Some("c1".into()),
            filter: Some(AuthorFeedFilter::PostsAndAuthorThreads),
            include_pins: true,
        }
        .into_params();
        assert_eq!(
            params,
            vec![
                ("actor".to_string(), "did:a".to_string()),
                ("limit".to_string(), "15".to_string()),
                ("filter".to_string(), "posts_and_author_threads".to_string()),
                ("includePins".to_string(), "true".to_string()),
                ("cursor".to_string(), "c1".to_string()),
            ]
        );
    }

    #[test]
    fn filter_parses_from_wire_name() {
        assert_eq!(
            "posts_no_replies".parse::<AuthorFeedFilter>(),
            Ok(AuthorFeedFilter::PostsNoReplies)
        );
        assert!("everything".parse::<AuthorFeedFilter>().is_err());
    }
}
