use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::Serialize;
use tracing::debug;

use crate::{
    config::OpenAiConfig,
    errors::ProviderError,
    providers::{GenerationRequest, RawResponse, execute},
};

#[derive(Debug, Clone)]
pub struct OpenAiImageClient {
    pub(super) http: HttpClient,
    pub(super) timeout: Duration,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiImageClient {
    pub fn new(
        http: HttpClient,
        config: &OpenAiConfig,
        model_override: Option<&str>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            timeout,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: model_override
                .map(|value| value.to_string())
                .unwrap_or_else(|| config.image_model.clone()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn is_dall_e(&self) -> bool {
        self.model.starts_with("dall-e")
    }

    /// Snaps the requested ratio onto one of the sizes the model accepts.
    pub fn size_for(&self, aspect: (u32, u32)) -> &'static str {
        let (width, height) = aspect;
        let ratio = if height == 0 {
            1.0
        } else {
            f64::from(width) / f64::from(height)
        };
        match (self.is_dall_e(), ratio) {
            (true, r) if r > 1.1 => "1792x1024",
            (true, r) if r < 0.9 => "1024x1792",
            (false, r) if r > 1.1 => "1536x1024",
            (false, r) if r < 0.9 => "1024x1536",
            _ => "1024x1024",
        }
    }

    pub(super) async fn send(&self, request: &GenerationRequest) -> Result<RawResponse, ProviderError> {
        let endpoint = format!("{}/images/generations", self.base_url);
        let prompt = if request.negative.trim().is_empty() {
            request.prompt.clone()
        } else {
            format!("{}. Avoid: {}", request.prompt, request.negative)
        };

        let payload = OpenAiImageRequest {
            model: &self.model,
            prompt: &prompt,
            n: 1,
            size: self.size_for(request.aspect),
            response_format: self.is_dall_e().then_some("b64_json"),
            output_format: (!self.is_dall_e()).then(|| request.format.wire_name()),
        };

        debug!(target: "provider::openai", model = %self.model, size = payload.size, "requesting image");

        let builder = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload);

        execute("openai", builder, self.timeout).await
    }
}

#[derive(Serialize)]
struct OpenAiImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_format: Option<&'static str>,
}
