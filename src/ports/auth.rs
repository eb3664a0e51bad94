use url::Url;

use crate::auth_rs::{
    AuthError, AuthSession, AuthUser, AuthorizeRequest, SignUpResponse, UserMetadata,
};

/// Port trait wrapping the hosted auth service.
///
/// Errors are returned as the service reported them so callers can pass them through.
/// Implementations live in `services::session::client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AuthClient: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> Result<SignUpResponse, AuthError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError>;

    fn authorize_url(&self, request: AuthorizeRequest) -> Result<Url, AuthError>;

    async fn exchange_code(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<AuthSession, AuthError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, AuthError>;

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;
}
