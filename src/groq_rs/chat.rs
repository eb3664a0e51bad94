use color_eyre::eyre::{Context, Result, eyre};
use reqwest::Client;
use url::Url;

use crate::groq_rs::types::{ChatCompletionRequest, ChatCompletionResponse, Completion};

/// POST `{base_url}/chat/completions` and return the first choice.
pub async fn create_chat_completion(
    client: &Client,
    base_url: &Url,
    api_key: &str,
    request: &ChatCompletionRequest,
) -> Result<Completion> {
    let url = Url::parse(&format!(
        "{}/chat/completions",
        base_url.as_str().trim_end_matches('/')
    ))
    .wrap_err("Failed to build chat completions URL")?;

    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(request)
        .send()
        .await
        .wrap_err("Failed to send chat completion request")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to get error text".to_string());
        return Err(eyre!("Completion API error {}: {}", status, body));
    }

    let body = response
        .json::<ChatCompletionResponse>()
        .await
        .wrap_err("Failed to parse chat completion response")?;

    Ok(body
        .choices
        .into_iter()
        .next()
        .map(|choice| Completion {
            content: choice.message.content,
            finish_reason: choice.finish_reason,
        })
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use crate::groq_rs::types::*;

    #[test]
    fn test_request_serialization() {
        let request = ChatCompletionRequest {
            model: "mixtral-8x7b-32768".to_string(),
            messages: vec![ChatMessage::system("be terse"), ChatMessage::user("hi")],
            temperature: 0.7,
            max_tokens: 4000,
            stop: vec!["}]".to_string()],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(value["max_tokens"], 4000);
        assert_eq!(value["stop"][0], "}]");
    }

    #[test]
    fn test_empty_stop_is_omitted() {
        let request = ChatCompletionRequest {
            model: "m".to_string(),
            messages: vec![],
            temperature: 0.0,
            max_tokens: 1,
            stop: vec![],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("stop").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"[]"},"finish_reason":"stop"}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("[]"));
        assert_eq!(parsed.choices[0].finish_reason.as_deref(), Some("stop"));
    }
}
