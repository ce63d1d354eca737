//! Forum - a minimal discussion board
//!
//! Accounts with cookie sessions, posts filed under categories, comments,
//! and like/dislike reactions, served as a JSON API over SQLite.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
