use chrono::SecondsFormat;

use crate::types::{BlockedPost, FeedViewPost, PostView, ProfileViewBasic, Reason, ReplyTarget};

#[derive(Debug, Clone, PartialEq)]
pub struct SliceItem {
    pub post: PostView,
    pub parent_author: Option<ProfileViewBasic>,
    pub is_parent_blocked: bool,
    pub is_parent_not_found: bool,
    pub parent_uri: Option<String>,
    pub parent_did: Option<String>,
}

impl SliceItem {
    fn new(post: PostView) -> Self {
        Self {
            post,
            parent_author: None,
            is_parent_blocked: false,
            is_parent_not_found: false,
            parent_uri: None,
            parent_did: None,
        }
    }

    fn mark_parent_blocked(&mut self, blocked: &BlockedPost) {
        self.is_parent_blocked = true;
        self.parent_uri = Some(blocked.uri.clone());
        self.parent_did = Some(blocked.author.did.clone());
    }
}

/// A blocked parent still exists, so the slice is not an orphan and the
/// leaf records who wrote the hidden parent. A parent that was not found
/// makes the slice an orphan. The root never affects orphan status.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSlice {
    pub items: Vec<SliceItem>,
    pub is_orphan: bool,
    pub is_incomplete_thread: bool,
    feed_post: FeedViewPost,
}

impl FeedSlice {
    pub fn new(feed_post: FeedViewPost) -> Self {
        let mut leaf = SliceItem::new(feed_post.post.clone());
        let mut items = Vec::with_capacity(3);
        let mut is_orphan = false;
        let mut is_incomplete_thread = false;

        if let Some(reply) = &feed_post.reply {
            match &reply.parent {
                ReplyTarget::Post(parent) => {
                    leaf.parent_author = Some(parent.author.clone());
                    let mut parent_item = SliceItem::new(parent.clone());
                    parent_item.parent_author = reply.grandparent_author.clone();
                    let replies_to_root = parent.record_parent_uri() == Some(reply.root.uri());

                    match &reply.root {
                        ReplyTarget::Post(root) if root.uri != parent.uri => {
                            items.push(SliceItem::new(root.clone()));
                            is_incomplete_thread = !replies_to_root;
                        }
                        ReplyTarget::Post(_) => {}
                        ReplyTarget::Blocked(root) => {
                            parent_item.mark_parent_blocked(root);
                            is_incomplete_thread = !replies_to_root;
                        }
                        ReplyTarget::NotFound(_) => {
                            parent_item.is_parent_not_found = true;
                            is_incomplete_thread = !replies_to_root;
                        }
                    }
                    items.push(parent_item);
                }
                ReplyTarget::Blocked(parent) => leaf.mark_parent_blocked(parent),
                ReplyTarget::NotFound(_) => {
                    leaf.is_parent_not_found = true;
                    is_orphan = true;
                }
            }
        }

        items.push(leaf);
        FeedSlice {
            items,
            is_orphan,
            is_incomplete_thread,
            feed_post,
        }
    }

    pub fn feed_post(&self) -> &FeedViewPost {
        &self.feed_post
    }

    pub fn leaf(&self) -> &SliceItem {
        // `new` always pushes the leaf last.
        &self.items[self.items.len() - 1]
    }

    pub fn is_repost(&self) -> bool {
        self.feed_post.is_repost()
    }

    pub fn is_pin(&self) -> bool {
        self.feed_post.is_pin()
    }

    pub fn is_reply(&self) -> bool {
        self.feed_post.reply.is_some()
    }

    pub fn reposted_by(&self) -> Option<&str> {
        self.feed_post.reposted_by()
    }

    pub fn root_uri(&self) -> &str {
        match &self.feed_post.reply {
            Some(reply) => reply.root.uri(),
            None => &self.feed_post.post.uri,
        }
    }

    pub fn key(&self) -> String {
        let at = match &self.feed_post.reason {
            Some(Reason::Repost { indexed_at, .. }) => indexed_at,
            _ => &self.feed_post.post.indexed_at,
        };
        format!(
            "slice-{}-{}",
            self.feed_post.post.uri,
            at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

impl From<FeedViewPost> for FeedSlice {
    fn from(feed_post: FeedViewPost) -> Self {
        FeedSlice::new(feed_post)
    }
}
