//! Business logic services
//!
//! Services sit between the HTTP handlers and the repositories. Every store
//! call they make is bounded by the configured query timeout.

pub mod auth;
pub mod error;
pub mod forum;
pub mod gate;
pub mod password;
pub mod rate_limiter;
pub mod reaction;
pub mod session;

pub use auth::{AuthService, LoginInput, RegisterInput};
pub use error::ServiceError;
pub use forum::{FeedOptions, ForumService};
pub use gate::RequestGate;
pub use rate_limiter::RateLimiter;
pub use reaction::ReactionLedger;
pub use session::SessionManager;
