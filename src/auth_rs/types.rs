use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("Failed to send auth request: {0}")]
    FailedToSendRequest(reqwest::Error),
    #[error("Failed to parse auth response: {0}")]
    FailedToParseResponse(reqwest::Error),
    #[error("Invalid auth service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("User creation failed")]
    UserCreationFailed,
}

impl AuthError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        AuthError::Api {
            status,
            code: None,
            message: message.into(),
        }
    }

    /// The user backed out of the provider's consent screen.
    pub fn is_cancellation(&self) -> bool {
        match self {
            AuthError::Api { message, code, .. } => {
                message.to_lowercase().contains("cancelled")
                    || code.as_deref() == Some("access_denied")
            }
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthError::Api { status: 401 | 403, .. })
    }
}

/// Profile hints the auth service keeps alongside an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(
        default,
        alias = "provider_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub spotify_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

/// Sign-up returns a full session, or only the user when email confirmation is pending.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(AuthSession),
    User(AuthUser),
}

impl SignUpResponse {
    pub fn user(&self) -> &AuthUser {
        match self {
            SignUpResponse::Session(session) => &session.user,
            SignUpResponse::User(user) => user,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRequest {
    pub provider: String,
    pub redirect_to: String,
    pub scopes: Option<String>,
    pub code_challenge: String,
    pub query_params: Vec<(String, String)>,
}

/// The service is inconsistent about which field carries the message.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ApiErrorBody {
    pub fn into_error(self, status: u16) -> AuthError {
        let message = self
            .msg
            .or(self.message)
            .or(self.error_description)
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| format!("Auth service returned status {status}"));
        AuthError::Api {
            status,
            code: self.error_code.or(self.error),
            message,
        }
    }
}
