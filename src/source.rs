use anyhow::Result;

use crate::types::FeedViewPost;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedPage {
    pub cursor: Option<String>,
    pub feed: Vec<FeedViewPost>,
}

impl FeedPage {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_end(&self) -> bool {
        self.cursor.is_none()
    }
}

pub trait FeedSource: Send + Sync {
    /// Fetches the page after `cursor`, or the first page when `cursor` is
    /// `None`. Running out of data is an empty page, not an error.
    fn fetch(&self, cursor: Option<&str>, limit: usize) -> Result<FeedPage>;

    fn peek_latest(&self) -> Result<Option<FeedViewPost>>;
}
