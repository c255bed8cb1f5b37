//! Authentication module for ScholarSync

pub mod guard;
pub mod middleware;
pub mod session;

pub use guard::authorize;
pub use middleware::{require_webhook_secret, AuthError, WEBHOOK_SECRET_HEADER};
pub use session::{Identity, SessionVariables};
