use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use crate::auth_rs::types::{
    ApiErrorBody, AuthError, AuthSession, AuthUser, AuthorizeRequest, SignUpResponse, UserMetadata,
};

/// Connection details shared by every call to the auth service.
#[derive(Debug, Clone)]
pub struct AuthEndpoint {
    pub base_url: Url,
    pub api_key: String,
}

impl AuthEndpoint {
    fn url(&self, path: &str) -> Result<Url, AuthError> {
        Ok(self.base_url.join(path)?)
    }

    fn authorize(&self, request: RequestBuilder, access_token: Option<&str>) -> RequestBuilder {
        let bearer = access_token.unwrap_or(&self.api_key);
        request
            .header("apikey", &self.api_key)
            .header("Accept", "application/json")
            .bearer_auth(bearer)
    }
}

async fn send(request: RequestBuilder) -> Result<Response, AuthError> {
    let response = request.send().await.map_err(AuthError::FailedToSendRequest)?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .json::<ApiErrorBody>()
        .await
        .unwrap_or_default();
    Err(body.into_error(status.as_u16()))
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, AuthError> {
    response
        .json::<T>()
        .await
        .map_err(AuthError::FailedToParseResponse)
}

/// Create an identity with email and password.
pub async fn sign_up(
    client: &Client,
    endpoint: &AuthEndpoint,
    email: &str,
    password: &str,
    metadata: &UserMetadata,
) -> Result<SignUpResponse, AuthError> {
    let request = client.post(endpoint.url("auth/v1/signup")?).json(&json!({
        "email": email,
        "password": password,
        "data": metadata,
    }));
    parse(send(endpoint.authorize(request, None)).await?).await
}

/// Exchange a grant for a session.
/// `grant_type` is one of `password`, `refresh_token` or `pkce`.
pub async fn token(
    client: &Client,
    endpoint: &AuthEndpoint,
    grant_type: &str,
    body: serde_json::Value,
) -> Result<AuthSession, AuthError> {
    let mut url = endpoint.url("auth/v1/token")?;
    url.query_pairs_mut().append_pair("grant_type", grant_type);

    let request = client.post(url).json(&body);
    parse(send(endpoint.authorize(request, None)).await?).await
}

pub async fn get_user(
    client: &Client,
    endpoint: &AuthEndpoint,
    access_token: &str,
) -> Result<AuthUser, AuthError> {
    let request = client.get(endpoint.url("auth/v1/user")?);
    parse(send(endpoint.authorize(request, Some(access_token))).await?).await
}

pub async fn logout(
    client: &Client,
    endpoint: &AuthEndpoint,
    access_token: &str,
) -> Result<(), AuthError> {
    let request = client.post(endpoint.url("auth/v1/logout")?);
    send(endpoint.authorize(request, Some(access_token))).await?;
    Ok(())
}

/// Build the URL the user is sent to for an OAuth sign-in.
///
/// The provider redirects back to `redirect_to` with a `code` that is exchanged
/// using the PKCE verifier matching `code_challenge`.
pub fn authorize_url(endpoint: &AuthEndpoint, request: &AuthorizeRequest) -> Result<Url, AuthError> {
    let mut url = endpoint.url("auth/v1/authorize")?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs
            .append_pair("provider", &request.provider)
            .append_pair("redirect_to", &request.redirect_to)
            .append_pair("code_challenge", &request.code_challenge)
            .append_pair("code_challenge_method", "s256");
        if let Some(scopes) = &request.scopes {
            pairs.append_pair("scopes", scopes);
        }
        for (key, value) in &request.query_params {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}
