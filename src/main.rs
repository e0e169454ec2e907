use std::{env, path::PathBuf};

use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};
use trip_imagery::{
    AppConfig, AssetPipeline, AssetRequest, PipelineError, Result,
    util::{format_utc, now_utc},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let config = AppConfig::load()?;
    let pipeline = AssetPipeline::new(&config)?;
    for (asset_type, backend, model) in pipeline.routes_overview() {
        info!(target: "pipeline", asset = %asset_type, backend, model, "route ready");
    }

    let request = read_request(env::args_os().nth(1).map(PathBuf::from)).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!(target: "pipeline", "interrupted, dropping in-flight request");
            Err(PipelineError::other("interrupted"))
        }
        outcome = pipeline.deliver(request) => match outcome {
            Ok(result) => {
                println!("{}", serde_json::to_string_pretty(&result)?);
                Ok(())
            }
            Err(err) => {
                error!(target: "pipeline", error = %err, "asset delivery failed");
                Err(err)
            }
        }
    }
}

/// Reads one request from the given file, or from stdin when no path is given.
async fn read_request(path: Option<PathBuf>) -> Result<AssetRequest> {
    let payload = match path {
        Some(path) => tokio::fs::read_to_string(&path).await?,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin().read_to_string(&mut buffer).await?;
            buffer
        }
    };

    Ok(serde_json::from_str(&payload)?)
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_timer(UtcTimer)
        .init();
}

struct UtcTimer;

impl FormatTime for UtcTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", format_utc(&now_utc(), "%Y-%m-%d %H:%M:%S%:z"))
    }
}
