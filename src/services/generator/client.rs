use std::time::Duration;

use color_eyre::eyre::{Context, Result};
use reqwest::Client;
use url::Url;

use crate::groq_rs::chat::create_chat_completion;
use crate::groq_rs::{ChatCompletionRequest, Completion};
use crate::ports::completion::CompletionClient;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct GroqHttpAdapter {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl GroqHttpAdapter {
    pub fn new(base_url: &str, api_key: String) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .wrap_err_with(|| format!("Invalid completion API URL: {base_url}"))?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("Failed to build completion HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl CompletionClient for GroqHttpAdapter {
    async fn complete(&self, request: ChatCompletionRequest) -> Result<Completion> {
        create_chat_completion(&self.client, &self.base_url, &self.api_key, &request).await
    }
}
