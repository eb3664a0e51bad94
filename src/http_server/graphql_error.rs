use async_graphql::{Error, ErrorExtensions};

use crate::error::PlaylistError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphqlError {
    #[error("Server error: {0}")]
    ServerError(String),
    #[error("Failed to get app state")]
    FailedToGetAppState,
    #[error("{message}")]
    Domain { code: &'static str, message: String },
}

impl Default for GraphqlError {
    fn default() -> Self {
        Self::ServerError("Unknown error".to_string())
    }
}

impl From<color_eyre::Report> for GraphqlError {
    fn from(report: color_eyre::Report) -> Self {
        // Log the full error report with trace chain for debugging
        log::error!("GraphQL error: {:#?}", report);
        Self::ServerError(report.to_string())
    }
}

impl From<PlaylistError> for GraphqlError {
    fn from(err: PlaylistError) -> Self {
        match &err {
            PlaylistError::Storage { .. } | PlaylistError::LocalStore(_) => {
                log::error!("GraphQL error: {err:?}")
            }
            _ => log::debug!("GraphQL error: {err}"),
        }
        Self::Domain {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl ErrorExtensions for GraphqlError {
    fn extend(&self) -> Error {
        Error::new(format!("{}", self)).extend_with(|_err, e| match self {
            GraphqlError::ServerError(reason) => {
                e.set("code", "SERVER_ERROR");
                e.set("reason", reason.clone());
            }
            GraphqlError::FailedToGetAppState => {
                e.set("code", "SERVER_ERROR");
                e.set("reason", "Failed to get app state".to_string());
            }
            GraphqlError::Domain { code, .. } => e.set("code", *code),
        })
    }
}

// Newtype wrapper to avoid blanket From implementation conflict for GraphqlError and async_graphql::Error
#[derive(Debug, Clone)]
pub struct GraphqlErrorWrapper(GraphqlError);

impl From<GraphqlError> for GraphqlErrorWrapper {
    fn from(err: GraphqlError) -> Self {
        Self(err)
    }
}

impl From<GraphqlErrorWrapper> for Error {
    fn from(wrapper: GraphqlErrorWrapper) -> Self {
        wrapper.0.extend()
    }
}

impl From<color_eyre::Report> for GraphqlErrorWrapper {
    fn from(report: color_eyre::Report) -> Self {
        GraphqlError::from(report).into()
    }
}

impl From<PlaylistError> for GraphqlErrorWrapper {
    fn from(err: PlaylistError) -> Self {
        GraphqlError::from(err).into()
    }
}

pub type GraphqlResult<T> = Result<T, GraphqlErrorWrapper>;
