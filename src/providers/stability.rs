use std::time::Duration;

use reqwest::{
    Client as HttpClient,
    header::ACCEPT,
    multipart::Form as MultipartForm,
};
use tracing::debug;

use crate::{
    config::StabilityConfig,
    errors::ProviderError,
    providers::{DecodeStrategy, GenerationRequest, RawResponse, execute, nearest_ratio},
};

const DEFAULT_MODEL: &str = "core";
const SUPPORTED_RATIOS: &[&str] = &[
    "21:9", "16:9", "3:2", "5:4", "1:1", "4:5", "2:3", "9:16", "9:21",
];
const MAX_SEED: u64 = 4_294_967_294;

/// Stability stable-image endpoints: multipart request, bearer auth, raw image
/// or base64 JSON reply depending on the configured strategy.
#[derive(Debug, Clone)]
pub struct StabilityClient {
    pub(super) http: HttpClient,
    pub(super) timeout: Duration,
    api_key: String,
    api_base: String,
    model: String,
    strategy: DecodeStrategy,
}

impl StabilityClient {
    pub fn new(
        http: HttpClient,
        config: &StabilityConfig,
        model_override: Option<&str>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            timeout,
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: model_override
                .map(|value| value.trim().to_lowercase())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            strategy: config.response,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn strategy(&self) -> DecodeStrategy {
        self.strategy
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v2beta/stable-image/generate/{}", self.api_base, self.model)
    }

    /// Multipart fields sent for `request`, in wire order.
    pub fn form_fields(&self, request: &GenerationRequest) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("prompt", request.prompt.clone()),
            (
                "aspect_ratio",
                nearest_ratio(request.aspect, SUPPORTED_RATIOS).to_string(),
            ),
            ("output_format", request.format.wire_name().to_string()),
        ];
        if !request.negative.trim().is_empty() {
            fields.push(("negative_prompt", request.negative.clone()));
        }
        if let Some(seed) = request.seed {
            fields.push(("seed", (seed % (MAX_SEED + 1)).to_string()));
        }
        // Only the core model takes presets.
        if self.model == "core" {
            if let Some(preset) = request.style_preset.as_deref() {
                fields.push(("style_preset", preset.to_string()));
            }
        }
        fields
    }

    pub(super) async fn send(&self, request: &GenerationRequest) -> Result<RawResponse, ProviderError> {
        let endpoint = self.endpoint();
        let form = self
            .form_fields(request)
            .into_iter()
            .fold(MultipartForm::new(), |form, (name, value)| form.text(name, value));

        debug!(
            target: "provider::stability",
            %endpoint,
            seed = ?request.seed,
            "requesting image"
        );

        let builder = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, self.strategy.accept_header())
            .multipart(form);

        execute("stability", builder, self.timeout).await
    }
}
