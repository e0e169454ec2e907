use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::Serialize;
use tracing::debug;

use crate::{
    config::OpenRouterConfig,
    errors::ProviderError,
    providers::{GenerationRequest, RawResponse, execute, nearest_ratio},
};

const SUPPORTED_RATIOS: &[&str] = &[
    "21:9", "16:9", "3:2", "4:3", "5:4", "1:1", "4:5", "3:4", "2:3", "9:16",
];

/// Chat-completion image models (OpenRouter and compatible gateways). The
/// image comes back inside the assistant message, usually as a data URL.
#[derive(Debug, Clone)]
pub struct OpenRouterImageClient {
    pub(super) http: HttpClient,
    pub(super) timeout: Duration,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenRouterImageClient {
    pub fn new(
        http: HttpClient,
        config: &OpenRouterConfig,
        model_override: Option<&str>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            timeout,
            api_key: config.api_key.clone(),
            endpoint: config.api_url.clone(),
            model: model_override
                .map(|value| value.to_string())
                .unwrap_or_else(|| config.image_model.clone()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn user_message(request: &GenerationRequest) -> String {
        let mut message = format!(
            "Generate one image. {}. Target {}x{} pixels.",
            request.prompt.trim_end_matches('.'),
            request.width,
            request.height
        );
        if !request.negative.trim().is_empty() {
            message.push_str(&format!(" Avoid: {}.", request.negative));
        }
        message
    }

    pub(super) async fn send(&self, request: &GenerationRequest) -> Result<RawResponse, ProviderError> {
        let content = Self::user_message(request);
        let messages = [ChatRequestMessage {
            role: "user",
            content,
        }];
        let payload = ChatImageRequest {
            model: &self.model,
            messages: &messages,
            modalities: &["image", "text"],
            image_config: ImageConfig {
                aspect_ratio: nearest_ratio(request.aspect, SUPPORTED_RATIOS),
            },
            seed: request.seed,
        };

        debug!(target: "provider::openrouter", model = %self.model, "requesting image");

        let builder = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload);

        execute("openrouter", builder, self.timeout).await
    }
}

#[derive(Serialize)]
struct ChatImageRequest<'a> {
    model: &'a str,
    messages: &'a [ChatRequestMessage<'a>],
    modalities: &'a [&'a str],
    image_config: ImageConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ImageConfig {
    aspect_ratio: &'static str,
}
