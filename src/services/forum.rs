//! Forum content service
//!
//! Posts, comments and categories. Listings carry author names, category
//! names and reaction counts.

use crate::db::repositories::{CategoryRepository, CommentRepository, PostRepository};
use crate::models::{
    Category, Comment, CreatePostInput, Post, PostDetail, PostFilter, PostView, ReactionTarget,
    TargetType,
};
use crate::services::error::{with_timeout, ServiceError};
use std::sync::Arc;
use std::time::Duration;

/// Feed options as requested by a client
#[derive(Debug, Clone, Default)]
pub struct FeedOptions {
    /// Any-of category filter
    pub categories: Vec<String>,
    /// Only the viewer's own posts
    pub mine: bool,
    /// Only posts the viewer liked
    pub liked: bool,
}

pub struct ForumService {
    posts: Arc<dyn PostRepository>,
    comments: Arc<dyn CommentRepository>,
    categories: Arc<dyn CategoryRepository>,
    query_timeout: Duration,
}

impl ForumService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        comments: Arc<dyn CommentRepository>,
        categories: Arc<dyn CategoryRepository>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            posts,
            comments,
            categories,
            query_timeout,
        }
    }

    /// Create a post with its categories
    pub async fn create_post(
        &self,
        author_id: i64,
        input: CreatePostInput,
    ) -> Result<Post, ServiceError> {
        let input = CreatePostInput {
            title: input.title.trim().to_string(),
            content: input.content.trim().to_string(),
            categories: input.categories,
        };
        if input.title.is_empty() {
            return Err(ServiceError::Validation("Title cannot be empty".to_string()));
        }
        if input.content.is_empty() {
            return Err(ServiceError::Validation("Content cannot be empty".to_string()));
        }

        let post = with_timeout(self.query_timeout, self.posts.create(author_id, &input)).await?;
        tracing::info!("Post {} created by user {}", post.id, author_id);
        Ok(post)
    }

    /// Feed for a viewer. `mine` and `liked` need a signed-in viewer.
    pub async fn list_posts(
        &self,
        options: FeedOptions,
        viewer: Option<i64>,
    ) -> Result<Vec<PostView>, ServiceError> {
        if (options.mine || options.liked) && viewer.is_none() {
            return Err(ServiceError::AuthenticationRequired);
        }

        let filter = PostFilter {
            categories: options.categories,
            author_id: viewer.filter(|_| options.mine),
            liked_by: viewer.filter(|_| options.liked),
        };
        with_timeout(self.query_timeout, self.posts.list(&filter)).await
    }

    /// A post with its comments
    pub async fn get_post(&self, id: i64) -> Result<PostDetail, ServiceError> {
        let post = with_timeout(self.query_timeout, self.posts.get_view(id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Post with ID {} not found", id)))?;
        let comments = with_timeout(self.query_timeout, self.comments.list_by_post(id)).await?;
        Ok(PostDetail { post, comments })
    }

    /// Comment on an existing post
    pub async fn create_comment(
        &self,
        post_id: i64,
        author_id: i64,
        content: &str,
    ) -> Result<Comment, ServiceError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ServiceError::Validation("Comment cannot be empty".to_string()));
        }
        if !with_timeout(self.query_timeout, self.posts.exists(post_id)).await? {
            return Err(ServiceError::NotFound(format!(
                "Post with ID {} not found",
                post_id
            )));
        }

        let comment = with_timeout(
            self.query_timeout,
            self.comments.create(post_id, author_id, content),
        )
        .await?;
        tracing::debug!("Comment {} added to post {}", comment.id, post_id);
        Ok(comment)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, ServiceError> {
        with_timeout(self.query_timeout, self.categories.list()).await
    }

    /// `NotFound` unless the reaction target exists
    pub async fn ensure_target_exists(&self, target: ReactionTarget) -> Result<(), ServiceError> {
        let exists = match target.target_type {
            TargetType::Post => {
                with_timeout(self.query_timeout, self.posts.exists(target.target_id)).await?
            }
            TargetType::Comment => {
                with_timeout(self.query_timeout, self.comments.exists(target.target_id)).await?
            }
        };
        if exists {
            Ok(())
        } else {
            Err(ServiceError::NotFound(format!(
                "{} with ID {} not found",
                target.target_type, target.target_id
            )))
        }
    }
}
