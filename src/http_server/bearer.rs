use axum::http::{HeaderMap, header};

use crate::auth_rs::AuthUser;
use crate::error::PlaylistError;
use crate::http_server::state::AppState;
use crate::ports::auth::AuthClient;

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// The user behind the request's bearer token, if it carries one.
pub async fn request_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<AuthUser>, PlaylistError> {
    let Some(token) = bearer_token(headers) else {
        return Ok(None);
    };
    Ok(Some(state.auth.get_user(token).await?))
}

/// Like [`request_user`], but a missing or rejected token is an error.
pub async fn require_request_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthUser, PlaylistError> {
    match request_user(state, headers).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(PlaylistError::AuthenticationRequired),
        Err(PlaylistError::AuthProvider(e)) if e.is_unauthorized() => {
            Err(PlaylistError::AuthenticationRequired)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
