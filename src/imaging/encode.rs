use image::{
    ExtendedColorType, ImageEncoder, RgbImage,
    codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder},
};
use tracing::debug;

use crate::{
    errors::{PipelineError, Result},
    imaging::ConformedImage,
    models::OutputFormat,
};

pub const QUALITY_FLOOR: u8 = 50;
pub const QUALITY_STEP: u8 = 5;
const WEBP_METHOD: i32 = 6;

#[derive(Debug, Clone)]
pub struct EncodedAsset {
    pub data: Vec<u8>,
    pub format: OutputFormat,
    /// Quality of the returned buffer; `None` for lossless PNG.
    pub quality: Option<u8>,
    /// Number of encodes performed to reach this buffer.
    pub attempts: u32,
}

impl EncodedAsset {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    pub fn size_kb(&self) -> f64 {
        self.data.len() as f64 / 1024.0
    }
}

/// Re-encodes at decreasing quality until the buffer fits `max_kb`. Below
/// the quality floor the last buffer is returned whatever its size. PNG is
/// encoded once and ignores `max_kb`.
pub fn encode(
    image: &ConformedImage,
    format: OutputFormat,
    max_kb: u32,
    initial_quality: u8,
) -> Result<EncodedAsset> {
    let rgb = image.as_rgb();

    let encode_at: fn(&RgbImage, u8) -> Result<Vec<u8>> = match format {
        OutputFormat::Jpeg => encode_jpeg,
        OutputFormat::Webp => encode_webp,
        OutputFormat::Png => {
            return Ok(EncodedAsset {
                data: encode_png(rgb)?,
                format,
                quality: None,
                attempts: 1,
            });
        }
    };

    let mut quality = initial_quality.clamp(1, 100);
    let mut attempts = 0;
    loop {
        let data = encode_at(rgb, quality)?;
        attempts += 1;

        let size_kb = data.len() as f64 / 1024.0;
        let exhausted = quality < QUALITY_FLOOR + QUALITY_STEP;
        debug!(
            target: "encoder",
            format = format.wire_name(),
            quality,
            size_kb,
            max_kb,
            "encoded candidate"
        );

        if size_kb <= f64::from(max_kb) || exhausted {
            return Ok(EncodedAsset {
                data,
                format,
                quality: Some(quality),
                attempts,
            });
        }
        quality -= QUALITY_STEP;
    }
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let width = u16::try_from(image.width())
        .map_err(|_| PipelineError::encode("JPEG width exceeds 65535"))?;
    let height = u16::try_from(image.height())
        .map_err(|_| PipelineError::encode("JPEG height exceeds 65535"))?;

    let mut data = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut data, quality);
    encoder.set_progressive(true);
    encoder.set_optimized_huffman_tables(true);
    encoder
        .encode(image.as_raw(), width, height, jpeg_encoder::ColorType::Rgb)
        .map_err(|err| PipelineError::encode(format!("JPEG: {err}")))?;
    Ok(data)
}

fn encode_webp(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut config = webp::WebPConfig::new()
        .map_err(|_| PipelineError::encode("WEBP: config init failed"))?;
    config.lossless = 0;
    config.quality = f32::from(quality);
    config.method = WEBP_METHOD;

    let encoder = webp::Encoder::from_rgb(image.as_raw(), image.width(), image.height());
    let memory = encoder
        .encode_advanced(&config)
        .map_err(|err| PipelineError::encode(format!("WEBP: {err:?}")))?;
    Ok(memory.to_vec())
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    PngEncoder::new_with_quality(&mut data, CompressionType::Best, PngFilter::Adaptive)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|err| PipelineError::encode(format!("PNG: {err}")))?;
    Ok(data)
}
