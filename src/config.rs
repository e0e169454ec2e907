use std::{env, fs, path::Path, time::Duration};

use anyhow::{Context, anyhow};
use serde::Deserialize;

use crate::{models::AssetType, providers::DecodeStrategy};

const DEFAULT_CONFIG_PATH: &str = "config/app_config.toml";
const DEFAULT_TIMEOUT_SECONDS: u64 = 180;
const DEFAULT_USER_AGENT: &str = "trip-imagery/0.1";
const DEFAULT_STABILITY_API_BASE: &str = "https://api.stability.ai";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_IMAGE_MODEL: &str = "gpt-image-1";
const DEFAULT_OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_OPENROUTER_IMAGE_MODEL: &str = "google/gemini-2.5-flash-image-preview";
const DEFAULT_BUCKET: &str = "TRIPS";
const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

#[derive(Clone, Debug)]
pub struct StabilityConfig {
    pub api_key: String,
    pub api_base: String,
    pub response: DecodeStrategy,
}

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub image_model: String,
}

#[derive(Clone, Debug)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub api_url: String,
    pub image_model: String,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Project URL; the storage API lives under `/storage/v1`.
    pub url: String,
    pub service_key: String,
    pub bucket: String,
    pub cache_control: String,
}

impl StorageConfig {
    pub fn storage_base(&self) -> String {
        format!("{}/storage/v1", self.url.trim_end_matches('/'))
    }
}

/// Loaded once at startup and shared read-only.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub stability: Option<StabilityConfig>,
    pub openai: Option<OpenAiConfig>,
    pub openrouter: Option<OpenRouterConfig>,
    pub storage: Option<StorageConfig>,
    pub providers: AssetProviders,
}

impl AppConfig {
    /// Reads `APP_CONFIG_PATH` (or the default path, which may be absent),
    /// then applies environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        match env::var("APP_CONFIG_PATH") {
            Ok(path) => Self::load_from(Path::new(&path)),
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
            }
            Err(_) => Self::from_file(FileConfig::default(), non_empty_env),
        }
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file {:?}", config_path))?;

        let file_config: FileConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {:?}", config_path))?;

        Self::from_file(file_config, non_empty_env)
    }

    /// Parses TOML without consulting the process environment.
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let file_config: FileConfig =
            toml::from_str(contents).context("failed to parse config TOML")?;
        Self::from_file(file_config, |_| None)
    }

    fn from_file(
        mut file_config: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        file_config.apply_env(&env)?;

        let http = file_config.http.unwrap_or_default().into_domain();
        let stability = file_config
            .stability
            .map(|section| section.into_domain())
            .transpose()?
            .flatten();
        let openai = file_config.openai.and_then(|section| section.into_domain());
        let openrouter = file_config
            .openrouter
            .and_then(|section| section.into_domain());
        let storage = file_config.storage.and_then(|section| section.into_domain());
        let providers = AssetProviders::from_file(file_config.providers);

        Ok(Self {
            http,
            stability,
            openai,
            openrouter,
            storage,
            providers,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    http: Option<FileHttpConfig>,
    #[serde(default)]
    stability: Option<FileStabilityConfig>,
    #[serde(default)]
    openai: Option<FileOpenAiConfig>,
    #[serde(default)]
    openrouter: Option<FileOpenRouterConfig>,
    #[serde(default)]
    storage: Option<FileStorageConfig>,
    #[serde(default)]
    providers: Option<FileAssetProviders>,
}

impl FileConfig {
    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(seconds) = env("HTTP_TIMEOUT_SECONDS") {
            let seconds = seconds
                .parse::<u64>()
                .with_context(|| format!("HTTP_TIMEOUT_SECONDS is not a number: {seconds}"))?;
            self.http.get_or_insert_with(Default::default).timeout_seconds = Some(seconds);
        }

        if let Some(api_key) = env("STABILITY_API_KEY") {
            self.stability.get_or_insert_with(Default::default).api_key = Some(api_key);
        }
        if let Some(api_base) = env("STABILITY_API_BASE") {
            self.stability.get_or_insert_with(Default::default).api_base = Some(api_base);
        }

        if let Some(api_key) = env("OPENAI_API_KEY") {
            self.openai.get_or_insert_with(Default::default).api_key = Some(api_key);
        }
        if let Some(api_key) = env("OPENROUTER_API_KEY") {
            self.openrouter.get_or_insert_with(Default::default).api_key = Some(api_key);
        }

        if let Some(url) = env("SUPABASE_URL") {
            self.storage.get_or_insert_with(Default::default).url = Some(url);
        }
        if let Some(key) = env("SUPABASE_SERVICE_KEY").or_else(|| env("SUPABASE_ANON_KEY")) {
            self.storage.get_or_insert_with(Default::default).service_key = Some(key);
        }
        if let Some(bucket) = env("SUPABASE_BUCKET") {
            self.storage.get_or_insert_with(Default::default).bucket = Some(bucket);
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileHttpConfig {
    #[serde(default)]
    timeout_seconds: Option<u64>,
    #[serde(default)]
    user_agent: Option<String>,
}

impl FileHttpConfig {
    fn into_domain(self) -> HttpConfig {
        HttpConfig {
            timeout: Duration::from_secs(
                self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS).max(1),
            ),
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileStabilityConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    api_base: Option<String>,
    #[serde(default)]
    response: Option<DecodeStrategy>,
}

impl FileStabilityConfig {
    fn into_domain(self) -> anyhow::Result<Option<StabilityConfig>> {
        let Some(api_key) = self.api_key else {
            return Ok(None);
        };

        let response = self.response.unwrap_or(DecodeStrategy::RawBinary);
        if response == DecodeStrategy::ChatCompletionDataUrl {
            return Err(anyhow!(
                "stability.response must be `raw` or `base64_json`"
            ));
        }

        Ok(Some(StabilityConfig {
            api_key,
            api_base: self
                .api_base
                .unwrap_or_else(|| DEFAULT_STABILITY_API_BASE.to_string()),
            response,
        }))
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileOpenAiConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    image_model: Option<String>,
}

impl FileOpenAiConfig {
    fn into_domain(self) -> Option<OpenAiConfig> {
        let api_key = self.api_key?;

        Some(OpenAiConfig {
            api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            image_model: self
                .image_model
                .unwrap_or_else(|| DEFAULT_OPENAI_IMAGE_MODEL.to_string()),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileOpenRouterConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    image_model: Option<String>,
}

impl FileOpenRouterConfig {
    fn into_domain(self) -> Option<OpenRouterConfig> {
        let api_key = self.api_key?;

        Some(OpenRouterConfig {
            api_key,
            api_url: self
                .api_url
                .unwrap_or_else(|| DEFAULT_OPENROUTER_API_URL.to_string()),
            image_model: self
                .image_model
                .unwrap_or_else(|| DEFAULT_OPENROUTER_IMAGE_MODEL.to_string()),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileStorageConfig {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    service_key: Option<String>,
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    cache_control: Option<String>,
}

impl FileStorageConfig {
    fn into_domain(self) -> Option<StorageConfig> {
        let url = self.url?;
        let service_key = self.service_key?;

        Some(StorageConfig {
            url,
            service_key,
            bucket: self.bucket.unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            cache_control: self
                .cache_control
                .unwrap_or_else(|| DEFAULT_CACHE_CONTROL.to_string()),
        })
    }
}

/// Which backend serves each asset type.
#[derive(Clone, Debug)]
pub struct AssetProviders {
    pub hero: ProviderRoute,
    pub background: ProviderRoute,
    pub slider: ProviderRoute,
}

impl AssetProviders {
    fn from_file(file: Option<FileAssetProviders>) -> Self {
        let file = file.unwrap_or_default();

        Self {
            hero: file
                .hero
                .and_then(FileProviderRoute::into_domain)
                .unwrap_or_else(|| ProviderRoute::new("stability", Some("ultra".to_string()))),
            background: file
                .background
                .and_then(FileProviderRoute::into_domain)
                .unwrap_or_else(|| ProviderRoute::new("stability", Some("core".to_string()))),
            slider: file
                .slider
                .and_then(FileProviderRoute::into_domain)
                .unwrap_or_else(|| ProviderRoute::new("stability", Some("core".to_string()))),
        }
    }

    pub fn route(&self, asset_type: AssetType) -> &ProviderRoute {
        match asset_type {
            AssetType::Hero => &self.hero,
            AssetType::Background => &self.background,
            AssetType::Slider => &self.slider,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProviderRoute {
    pub provider: String,
    pub model: Option<String>,
}

impl ProviderRoute {
    pub fn new(provider: impl Into<String>, model: Option<String>) -> Self {
        let provider = provider.into();
        Self {
            provider: provider.trim().to_lowercase(),
            model,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileAssetProviders {
    #[serde(default)]
    hero: Option<FileProviderRoute>,
    #[serde(default)]
    background: Option<FileProviderRoute>,
    #[serde(default)]
    slider: Option<FileProviderRoute>,
}

#[derive(Debug, Deserialize, Default)]
struct FileProviderRoute {
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

impl FileProviderRoute {
    fn into_domain(self) -> Option<ProviderRoute> {
        let provider = self.provider?;
        Some(ProviderRoute::new(provider, self.model))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
