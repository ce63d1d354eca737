//! Data models
//!
//! Entities stored by the forum (users, sessions, posts, comments,
//! categories, reactions) and the read views built from them.

mod category;
mod comment;
mod post;
mod reaction;
mod session;
mod user;

pub use category::{normalize_category_names, Category};
pub use comment::{Comment, CommentView};
pub use post::{CreatePostInput, Post, PostDetail, PostFilter, PostView, POST_LIST_LIMIT};
pub use reaction::{
    Reaction, ReactionCounts, ReactionOutcome, ReactionTarget, ReactionValue, TargetType,
};
pub use session::Session;
pub use user::User;
