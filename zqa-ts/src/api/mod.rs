//! HTTP API handlers for zqa-ts

pub mod auth;
pub mod health;
pub mod tasks;

pub use auth::{auth_middleware, Authenticator, StaticTokenAuthenticator, UserIdentity};
pub use health::health_routes;
pub use tasks::{get_results, upload_archive};
