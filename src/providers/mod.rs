mod decode;
mod openai;
mod openrouter;
mod stability;

pub use decode::{DecodeStrategy, ImagePayload, RawResponse, decode_data_url};
pub use openai::OpenAiImageClient;
pub use openrouter::OpenRouterImageClient;
pub use stability::StabilityClient;

use std::time::Duration;

use image::DynamicImage;
use reqwest::{Client as HttpClient, RequestBuilder, header::CONTENT_TYPE};
use tracing::debug;

use crate::{
    config::{AppConfig, ProviderRoute},
    errors::{self, PipelineError, ProviderError, truncate_text},
    models::{AssetSpec, OutputFormat},
    prompt,
};

const ERROR_BODY_CHARS: usize = 512;

/// Everything a backend needs for one shot.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative: String,
    pub width: u32,
    pub height: u32,
    /// Ratio to ask for when a backend takes ratios rather than pixel sizes.
    pub aspect: (u32, u32),
    pub format: OutputFormat,
    /// `None` lets the backend pick.
    pub seed: Option<u64>,
    pub style_preset: Option<String>,
}

impl GenerationRequest {
    /// Prompt, geometry and backend options for a resolved asset. Seed `0`
    /// leaves the choice to the backend.
    pub fn for_asset(spec: &AssetSpec) -> Self {
        let prompt = prompt::build(
            spec.asset_type,
            &spec.descriptors,
            spec.style_preset.as_deref(),
        );

        Self {
            prompt: prompt.positive,
            negative: prompt.negative,
            width: spec.width,
            height: spec.height,
            aspect: generation_aspect(spec),
            format: spec.format,
            seed: (spec.seed != 0).then_some(spec.seed),
            style_preset: spec.backend_preset.clone(),
        }
    }

    /// Copy for shot `index`; a pinned seed is offset so shots differ.
    pub fn for_shot(&self, index: usize) -> Self {
        Self {
            seed: self.seed.map(|seed| seed.saturating_add(index as u64)),
            ..self.clone()
        }
    }
}

/// The configured generation backends. Each variant owns exactly one
/// request encoding and one [`DecodeStrategy`].
#[derive(Debug, Clone)]
pub enum ProviderClient {
    Stability(StabilityClient),
    OpenAi(OpenAiImageClient),
    OpenRouter(OpenRouterImageClient),
}

impl ProviderClient {
    pub fn from_route(
        route: &ProviderRoute,
        config: &AppConfig,
        http: &HttpClient,
    ) -> errors::Result<Self> {
        let timeout = config.http.timeout;
        match route.provider.as_str() {
            "stability" => {
                let cfg = config
                    .stability
                    .as_ref()
                    .ok_or(PipelineError::MissingConfig("stability.api_key"))?;
                Ok(Self::Stability(StabilityClient::new(
                    http.clone(),
                    cfg,
                    route.model.as_deref(),
                    timeout,
                )))
            }
            "openai" => {
                let cfg = config
                    .openai
                    .as_ref()
                    .ok_or(PipelineError::MissingConfig("openai.api_key"))?;
                Ok(Self::OpenAi(OpenAiImageClient::new(
                    http.clone(),
                    cfg,
                    route.model.as_deref(),
                    timeout,
                )))
            }
            "openrouter" => {
                let cfg = config
                    .openrouter
                    .as_ref()
                    .ok_or(PipelineError::MissingConfig("openrouter.api_key"))?;
                Ok(Self::OpenRouter(OpenRouterImageClient::new(
                    http.clone(),
                    cfg,
                    route.model.as_deref(),
                    timeout,
                )))
            }
            other => Err(PipelineError::InvalidConfig(format!(
                "unsupported image provider: {other}"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderClient::Stability(_) => "stability",
            ProviderClient::OpenAi(_) => "openai",
            ProviderClient::OpenRouter(_) => "openrouter",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ProviderClient::Stability(client) => client.model(),
            ProviderClient::OpenAi(client) => client.model(),
            ProviderClient::OpenRouter(client) => client.model(),
        }
    }

    pub fn strategy(&self) -> DecodeStrategy {
        match self {
            ProviderClient::Stability(client) => client.strategy(),
            ProviderClient::OpenAi(_) => DecodeStrategy::Base64Json,
            ProviderClient::OpenRouter(_) => DecodeStrategy::ChatCompletionDataUrl,
        }
    }

    fn transport(&self) -> (&HttpClient, Duration) {
        match self {
            ProviderClient::Stability(client) => (&client.http, client.timeout),
            ProviderClient::OpenAi(client) => (&client.http, client.timeout),
            ProviderClient::OpenRouter(client) => (&client.http, client.timeout),
        }
    }

    /// One shot: request, normalize the envelope, fetch if remote, decode.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<DynamicImage, ProviderError> {
        let response = match self {
            ProviderClient::Stability(client) => client.send(request).await?,
            ProviderClient::OpenAi(client) => client.send(request).await?,
            ProviderClient::OpenRouter(client) => client.send(request).await?,
        };

        let bytes = match self.strategy().normalize(self.name(), &response)? {
            ImagePayload::Inline(bytes) => bytes,
            ImagePayload::Remote(url) => {
                debug!(target: "provider", backend = self.name(), %url, "fetching remote image");
                let (http, timeout) = self.transport();
                execute(self.name(), http.get(&url), timeout)
                    .await?
                    .body
                    .to_vec()
            }
        };

        decode_bitmap(self.name(), bytes).await
    }
}

/// Sends with an explicit timeout and rejects non-2xx statuses, keeping a
/// truncated body for the error.
pub(crate) async fn execute(
    backend: &str,
    builder: RequestBuilder,
    timeout: Duration,
) -> Result<RawResponse, ProviderError> {
    let response = builder
        .timeout(timeout)
        .send()
        .await
        .map_err(|err| transport_error(backend, err, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            backend: backend.to_string(),
            status: status.as_u16(),
            body: truncate_text(&body, ERROR_BODY_CHARS),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase());
    let body = response
        .bytes()
        .await
        .map_err(|err| transport_error(backend, err, timeout))?;

    Ok(RawResponse {
        content_type,
        body,
    })
}

fn transport_error(backend: &str, err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            backend: backend.to_string(),
            seconds: timeout.as_secs(),
        }
    } else {
        ProviderError::Transport {
            backend: backend.to_string(),
            source: err,
        }
    }
}

async fn decode_bitmap(backend: &str, bytes: Vec<u8>) -> Result<DynamicImage, ProviderError> {
    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .map_err(|err| ProviderError::decode(backend, format!("decoder task failed: {err}")))?
        .map_err(|err| ProviderError::decode(backend, err.to_string()))
}

/// Default geometry asks for the asset type's native ratio; a custom size
/// asks for its own ratio.
fn generation_aspect(spec: &AssetSpec) -> (u32, u32) {
    let defaults = spec.asset_type.defaults();
    if (spec.width, spec.height) == (defaults.width, defaults.height) {
        spec.asset_type.generation_aspect()
    } else {
        (spec.width, spec.height)
    }
}

/// Closest ratio from `candidates` to `aspect`, compared as floats.
pub(crate) fn nearest_ratio<'a>(aspect: (u32, u32), candidates: &[&'a str]) -> &'a str {
    let (width, height) = aspect;
    let target = if width == 0 || height == 0 {
        1.0
    } else {
        f64::from(width) / f64::from(height)
    };

    let mut best = candidates.first().copied().unwrap_or("1:1");
    let mut best_delta = f64::MAX;
    for &candidate in candidates {
        let Some((w, h)) = candidate.split_once(':') else {
            continue;
        };
        let (Ok(w), Ok(h)) = (w.parse::<f64>(), h.parse::<f64>()) else {
            continue;
        };
        let delta = (target - w / h).abs();
        if delta < best_delta {
            best_delta = delta;
            best = candidate;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetRequest;

    #[test]
    fn shot_seeds_are_offset_only_when_pinned() {
        let request = GenerationRequest {
            prompt: "p".to_string(),
            negative: String::new(),
            width: 800,
            height: 600,
            aspect: (5, 4),
            format: OutputFormat::Webp,
            seed: Some(42),
            style_preset: None,
        };
        assert_eq!(request.for_shot(0).seed, Some(42));
        assert_eq!(request.for_shot(2).seed, Some(44));

        let random = GenerationRequest {
            seed: None,
            ..request
        };
        assert_eq!(random.for_shot(3).seed, None);
    }

    #[test]
    fn asset_request_maps_to_generation_request() {
        let spec = AssetRequest {
            seed: Some(0),
            ..AssetRequest::slider("ramen bowl", "Shinjuku", "Tokyo", "Japan")
        }
        .resolve()
        .unwrap();
        let request = GenerationRequest::for_asset(&spec);
        assert_eq!(request.aspect, (5, 4));
        assert_eq!((request.width, request.height), (800, 600));
        assert_eq!(request.seed, None);
        assert_eq!(request.style_preset.as_deref(), Some("photographic"));
        assert!(request.prompt.starts_with("close-up of ramen bowl"));

        let custom = AssetRequest {
            width: Some(1200),
            height: Some(1200),
            seed: Some(9),
            ..AssetRequest::slider("ramen bowl", "Shinjuku", "Tokyo", "Japan")
        }
        .resolve()
        .unwrap();
        let request = GenerationRequest::for_asset(&custom);
        assert_eq!(request.aspect, (1200, 1200));
        assert_eq!(request.seed, Some(9));
    }

    #[test]
    fn routes_build_configured_backends() {
        let config = AppConfig::from_toml_str(
            r#"
            [stability]
            api_key = "sk-test"
            response = "base64_json"

            [openrouter]
            api_key = "or-test"
            "#,
        )
        .unwrap();
        let http = HttpClient::new();

        let stability =
            ProviderClient::from_route(&ProviderRoute::new("Stability", None), &config, &http).unwrap();
        assert_eq!(stability.name(), "stability");
        assert_eq!(stability.model(), "core");
        assert_eq!(stability.strategy(), DecodeStrategy::Base64Json);

        let openrouter =
            ProviderClient::from_route(&ProviderRoute::new("openrouter", None), &config, &http).unwrap();
        assert_eq!(openrouter.strategy(), DecodeStrategy::ChatCompletionDataUrl);

        let missing = ProviderClient::from_route(&ProviderRoute::new("openai", None), &config, &http);
        assert!(matches!(missing, Err(PipelineError::MissingConfig("openai.api_key"))));

        let unknown = ProviderClient::from_route(&ProviderRoute::new("dreamlab", None), &config, &http);
        assert!(matches!(unknown, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn nearest_ratio_picks_closest() {
        let ratios = ["21:9", "16:9", "3:2", "5:4", "1:1", "4:5", "2:3", "9:16", "9:21"];
        assert_eq!(nearest_ratio((16, 9), &ratios), "16:9");
        assert_eq!(nearest_ratio((5, 4), &ratios), "5:4");
        assert_eq!(nearest_ratio((800, 600), &ratios), "5:4");
        assert_eq!(nearest_ratio((1080, 1920), &ratios), "9:16");
        assert_eq!(nearest_ratio((0, 0), &ratios), "1:1");
    }
}
