use std::sync::Arc;

use async_graphql::Context;

use crate::auth_rs::AuthUser;
use crate::error::PlaylistError;
use crate::http_server::{graphql_error::GraphqlError, state::AppState};

/// The user a request's bearer token resolved to.
#[derive(Debug, Clone)]
pub struct RequestUser(pub AuthUser);

pub fn get_app_state<'a>(ctx: &Context<'a>) -> Result<&'a Arc<AppState>, GraphqlError> {
    ctx.data::<Arc<AppState>>()
        .map_err(|_| GraphqlError::FailedToGetAppState)
}

pub fn current_user<'a>(ctx: &Context<'a>) -> Option<&'a AuthUser> {
    ctx.data_opt::<RequestUser>().map(|user| &user.0)
}

pub fn require_user<'a>(ctx: &Context<'a>) -> Result<&'a AuthUser, PlaylistError> {
    current_user(ctx).ok_or(PlaylistError::AuthenticationRequired)
}
