use image::{DynamicImage, GenericImageView, RgbImage, imageops::FilterType};

use crate::errors::{PipelineError, Result};

/// Resize and crop plan that covers the target and trims the overshoot evenly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverFit {
    pub resized_width: u32,
    pub resized_height: u32,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CoverFit {
    pub fn plan(source: (u32, u32), target: (u32, u32)) -> Result<Self> {
        let (iw, ih) = source;
        let (width, height) = target;
        if iw == 0 || ih == 0 || width == 0 || height == 0 {
            return Err(PipelineError::invalid_request(format!(
                "cannot fit {iw}x{ih} into {width}x{height}"
            )));
        }

        let scale = f64::max(
            f64::from(width) / f64::from(iw),
            f64::from(height) / f64::from(ih),
        );
        // Rounding can land one pixel short on the covering edge.
        let resized_width = ((f64::from(iw) * scale).round() as u32).max(width);
        let resized_height = ((f64::from(ih) * scale).round() as u32).max(height);

        Ok(Self {
            resized_width,
            resized_height,
            left: (resized_width - width) / 2,
            top: (resized_height - height) / 2,
            width,
            height,
        })
    }

    pub fn is_identity(&self, source: (u32, u32)) -> bool {
        source == (self.width, self.height)
    }
}

/// A bitmap that is exactly the requested size.
#[derive(Debug, Clone)]
pub struct ConformedImage {
    image: RgbImage,
}

impl ConformedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_rgb(self) -> RgbImage {
        self.image
    }
}

/// Cover-fit `source` into exactly `width`×`height` (Lanczos3, center crop).
pub fn cover_fit(source: &DynamicImage, width: u32, height: u32) -> Result<ConformedImage> {
    let dimensions = source.dimensions();
    let plan = CoverFit::plan(dimensions, (width, height))?;

    if plan.is_identity(dimensions) {
        return Ok(ConformedImage {
            image: source.to_rgb8(),
        });
    }

    let resized = source.resize_exact(
        plan.resized_width,
        plan.resized_height,
        FilterType::Lanczos3,
    );
    let cropped = resized.crop_imm(plan.left, plan.top, plan.width, plan.height);

    Ok(ConformedImage {
        image: cropped.to_rgb8(),
    })
}
