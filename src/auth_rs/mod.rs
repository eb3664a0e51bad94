//! Minimal client for a GoTrue-compatible hosted auth service.

pub mod api;
pub mod pkce;
pub mod types;

pub use types::{AuthError, AuthSession, AuthUser, AuthorizeRequest, SignUpResponse, UserMetadata};
