use color_eyre::eyre::Result;

use crate::groq_rs::{ChatCompletionRequest, Completion};

/// Port trait wrapping the chat-completion API used for song suggestions.
///
/// Implementations live in `services::generator::client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: ChatCompletionRequest) -> Result<Completion>;
}
