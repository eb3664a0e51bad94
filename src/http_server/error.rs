use axum::{
    Json,
    body::Body,
    http::{Response, StatusCode},
    response::IntoResponse,
};
use serde_json::json;

use crate::error::PlaylistError;

// A generic error report
// Produced via `Err(some_err).wrap_err("Some context")`
// or `Err(color_eyre::eyre::Report::new(SomeError))`
pub struct Report(color_eyre::Report);

impl std::fmt::Debug for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<E> From<E> for Report
where
    E: Into<color_eyre::Report>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn status_for(err: &PlaylistError) -> StatusCode {
    match err {
        PlaylistError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        PlaylistError::AuthProvider(e) if e.is_unauthorized() => StatusCode::UNAUTHORIZED,
        PlaylistError::AuthProvider(_) => StatusCode::BAD_GATEWAY,
        PlaylistError::GenerationFailed(_) | PlaylistError::MalformedResponse(_) => {
            StatusCode::BAD_GATEWAY
        }
        PlaylistError::ConstraintViolation(_) => StatusCode::CONFLICT,
        PlaylistError::NotFound(_) => StatusCode::NOT_FOUND,
        PlaylistError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PlaylistError::LocalStore(_) | PlaylistError::Storage { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// Tell axum how to convert `Report` into a response.
impl IntoResponse for Report {
    fn into_response(self) -> Response<Body> {
        let err = self.0;

        if let Some(err) = err.downcast_ref::<PlaylistError>() {
            let status = status_for(err);
            if status.is_server_error() {
                log::error!("{err:?}");
            } else {
                log::debug!("{err}");
            }
            return (
                status,
                Json(json!({ "error": err.to_string(), "code": err.code() })),
            )
                .into_response();
        }

        log::error!("{err:?}");

        // Fallback
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Something went wrong" })),
        )
            .into_response()
    }
}
