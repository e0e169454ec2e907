use futures_util::future::join_all;
use reqwest::Client as HttpClient;
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    errors::{PipelineError, ProviderError, Result},
    imaging::{self, GeneratedCandidate},
    models::{AssetRequest, AssetType, DeliveryResult},
    providers::{GenerationRequest, ProviderClient},
    storage::{StorageKey, StorageUploader},
    util::now_utc,
};

/// Per-asset-type backends plus the uploader, built once from config.
pub struct AssetPipeline {
    hero: ProviderClient,
    background: ProviderClient,
    slider: ProviderClient,
    uploader: StorageUploader,
}

impl AssetPipeline {
    /// Resolves every route up front so a missing key fails here rather than
    /// halfway through a request.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let storage = config
            .storage
            .as_ref()
            .ok_or(PipelineError::MissingConfig("storage.url / storage.service_key"))?;

        let http = HttpClient::builder()
            .user_agent(config.http.user_agent.clone())
            .timeout(config.http.timeout)
            .build()?;

        let route = |asset_type: AssetType| {
            ProviderClient::from_route(config.providers.route(asset_type), config, &http)
        };
        let hero = route(AssetType::Hero)?;
        let background = route(AssetType::Background)?;
        let slider = route(AssetType::Slider)?;

        let uploader = StorageUploader::new(http.clone(), storage, config.http.timeout);

        Ok(Self {
            hero,
            background,
            slider,
            uploader,
        })
    }

    pub fn provider(&self, asset_type: AssetType) -> &ProviderClient {
        match asset_type {
            AssetType::Hero => &self.hero,
            AssetType::Background => &self.background,
            AssetType::Slider => &self.slider,
        }
    }

    /// `(asset type, backend, model)` for each route, for startup logging.
    pub fn routes_overview(&self) -> Vec<(AssetType, &'static str, &str)> {
        AssetType::ALL
            .into_iter()
            .map(|asset_type| {
                let provider = self.provider(asset_type);
                (asset_type, provider.name(), provider.model())
            })
            .collect()
    }

    /// Generates, conforms, encodes and uploads one asset.
    pub async fn deliver(&self, request: AssetRequest) -> Result<DeliveryResult> {
        let spec = request.resolve()?;
        let provider = self.provider(spec.asset_type);
        info!(
            target: "pipeline",
            asset = %spec.asset_type,
            backend = provider.name(),
            model = provider.model(),
            shots = spec.shots,
            "generating asset"
        );

        let generation = GenerationRequest::for_asset(&spec);

        let candidate = self.run_shots(provider, &generation, spec.shots).await?;
        info!(
            target: "pipeline",
            shot = candidate.shot,
            area = candidate.area(),
            "candidate selected"
        );

        let (width, height, format, max_kb, quality) =
            (spec.width, spec.height, spec.format, spec.max_kb, spec.quality);
        let encoded = tokio::task::spawn_blocking(move || {
            let conformed = imaging::cover_fit(&candidate.image, width, height)?;
            imaging::encode(&conformed, format, max_kb, quality)
        })
        .await??;

        info!(
            target: "pipeline",
            size_kb = encoded.size_kb(),
            quality = ?encoded.quality,
            attempts = encoded.attempts,
            "asset encoded"
        );

        let key = StorageKey::for_asset(
            spec.trip_name.as_deref(),
            spec.trip_folder.as_deref(),
            spec.asset_type,
            spec.format,
            &now_utc(),
        );
        let content_type = encoded.content_type();
        let url = self.uploader.upload(encoded.data, &key, content_type).await?;

        Ok(DeliveryResult {
            url,
            asset_type: spec.asset_type,
            usage: spec.asset_type.usage().to_string(),
            city: spec.descriptors.city,
            country: spec.descriptors.country,
        })
    }

    /// Bare-URL form of [`deliver`](Self::deliver).
    pub async fn deliver_url(&self, request: AssetRequest) -> Result<String> {
        self.deliver(request).await.map(|result| result.url)
    }

    async fn run_shots(
        &self,
        provider: &ProviderClient,
        generation: &GenerationRequest,
        shots: usize,
    ) -> Result<GeneratedCandidate> {
        let outcomes = join_all((0..shots).map(|shot| {
            let request = generation.for_shot(shot);
            async move { (shot, provider.generate(&request).await) }
        }))
        .await;

        let mut candidates = Vec::with_capacity(shots);
        let mut last_error: Option<ProviderError> = None;
        for (shot, outcome) in outcomes {
            match outcome {
                Ok(image) => candidates.push(GeneratedCandidate::new(shot, image)),
                Err(err) => {
                    warn!(target: "pipeline", shot, error = %err, "shot failed");
                    last_error = Some(err);
                }
            }
        }

        match imaging::select_candidate(candidates) {
            Some(candidate) => Ok(candidate),
            None => Err(last_error
                .map(PipelineError::from)
                .unwrap_or_else(|| PipelineError::other("no generation shots were run"))),
        }
    }
}
