//! Post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CommentView, ReactionCounts};

/// Stored post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Post as shown to readers: author name, categories and reaction counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostView {
    pub id: i64,
    pub author_id: i64,
    pub author: String,
    pub title: String,
    pub content: String,
    pub categories: Vec<String>,
    pub reactions: ReactionCounts,
    pub created_at: DateTime<Utc>,
}

/// A post together with its comments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDetail {
    pub post: PostView,
    pub comments: Vec<CommentView>,
}

/// Input for creating a post
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl CreatePostInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            categories: Vec::new(),
        }
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }
}

/// Feed filter. Category names match any-of; `author_id` and `liked_by`
/// restrict to one user's posts or to posts that user liked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub categories: Vec<String>,
    pub author_id: Option<i64>,
    pub liked_by: Option<i64>,
}

/// Maximum number of posts returned by one listing
pub const POST_LIST_LIMIT: i64 = 200;
