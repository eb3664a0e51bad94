use reqwest::Client;
use serde_json::json;
use url::Url;

use crate::auth_rs::api::{self, AuthEndpoint};
use crate::auth_rs::{
    AuthError, AuthSession, AuthUser, AuthorizeRequest, SignUpResponse, UserMetadata,
};
use crate::ports::auth::AuthClient;

pub struct AuthHttpAdapter {
    client: Client,
    endpoint: AuthEndpoint,
}

impl AuthHttpAdapter {
    pub fn new(endpoint: AuthEndpoint) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

#[async_trait::async_trait]
impl AuthClient for AuthHttpAdapter {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> Result<SignUpResponse, AuthError> {
        api::sign_up(&self.client, &self.endpoint, email, password, &metadata).await
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        api::token(
            &self.client,
            &self.endpoint,
            "password",
            json!({ "email": email, "password": password }),
        )
        .await
    }

    fn authorize_url(&self, request: AuthorizeRequest) -> Result<Url, AuthError> {
        api::authorize_url(&self.endpoint, &request)
    }

    async fn exchange_code(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<AuthSession, AuthError> {
        api::token(
            &self.client,
            &self.endpoint,
            "pkce",
            json!({ "auth_code": auth_code, "code_verifier": code_verifier }),
        )
        .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        api::token(
            &self.client,
            &self.endpoint,
            "refresh_token",
            json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        api::get_user(&self.client, &self.endpoint, access_token).await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        api::logout(&self.client, &self.endpoint, access_token).await
    }
}
