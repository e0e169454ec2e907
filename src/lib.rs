pub mod config;
pub mod errors;
pub mod imaging;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod storage;
pub mod util;

pub use config::AppConfig;
pub use errors::{PipelineError, ProviderError, Result};
pub use models::{AssetRequest, AssetType, DeliveryResult, OutputFormat};
pub use orchestrator::AssetPipeline;
