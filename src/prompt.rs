//! Positive/negative prompt text per asset class.
//!
//! Templates are lists of segments joined with `", "`; a segment that ends
//! up empty is dropped, so optional keyword lists never leave stray commas.

use crate::models::{AssetType, Descriptors};

const NEGATIVE_COMMON: &str = "ai artifacts, cgi, illustration, painting, blurry, soft focus, lowres, overprocessed hdr, heavy vignette, banding, color fringing, oversaturated, posterized, watermark, text, logo, frame, over/underexposed, distortion";
const NEGATIVE_BACKGROUND: &str = "busy clutter, harsh lighting, signage dominance, oversaturated, extreme bokeh, motion blur, noise, ai artifacts";
const NEGATIVE_SLIDER: &str = "glare, fingerprints, glass reflections, noisy shadows, text overlay, overprocessed hdr, ai artifacts, lowres, blur";

const HERO_LOOK: &[&str] = &[
    "authentic local life hints",
    "rich textures",
    "natural color grading",
    "golden hour soft light",
    "RAW photo",
    "full-frame DSLR",
    "24–35mm wide-angle",
    "f/5.6",
    "ISO 100",
    "1/250s",
    "daylight WB",
    "rule of thirds",
    "leading lines",
    "balanced composition",
    "photorealistic",
    "high dynamic range",
    "travel magazine",
];

const BACKGROUND_LOOK: &[&str] = &[
    "soft depth of field",
    "gentle contrast",
    "clean edges",
    "natural colors",
    "consistent lighting with hero",
    "RAW photo",
    "full-frame DSLR",
    "35–50mm",
    "f/4",
    "ISO 200",
    "1/160s",
    "photorealistic",
    "editorial travel style",
];

const SLIDER_LOOK: &[&str] = &[
    "tactile textures",
    "precise details",
    "clean background separation",
    "natural color",
    "soft directional museum lighting",
    "RAW photo",
    "full-frame DSLR",
    "90–105mm macro",
    "f/4",
    "ISO 400",
    "1/125s",
    "tripod",
    "minimal reflections",
    "polarizing filter effect",
    "photorealistic editorial detail shot",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub positive: String,
    pub negative: String,
}

pub fn build(asset_type: AssetType, descriptors: &Descriptors, style_preset: Option<&str>) -> Prompt {
    let city = descriptors.city.as_deref().unwrap_or_default();
    let country = descriptors.country.as_deref().unwrap_or_default();
    let location = words(&[city, country]);
    let keywords = descriptors.keywords.join(", ");

    let (segments, negative) = match asset_type {
        AssetType::Hero => {
            let mut segments = vec![
                location,
                "cinematic wide travel hero".to_string(),
                "immersive sense of escape".to_string(),
                "sweeping vista".to_string(),
                keywords,
            ];
            segments.extend(HERO_LOOK.iter().map(|term| term.to_string()));
            (segments, NEGATIVE_COMMON)
        }
        AssetType::Background => {
            let activity = descriptors.activity.as_deref().unwrap_or_default();
            let mut segments = vec![
                join_phrase(activity, "in", &location),
                "background to match the trip hero palette".to_string(),
                "immersive but uncluttered".to_string(),
                keywords,
            ];
            segments.extend(BACKGROUND_LOOK.iter().map(|term| term.to_string()));
            (segments, NEGATIVE_BACKGROUND)
        }
        AssetType::Slider => {
            let subject = descriptors.subject.as_deref().unwrap_or_default();
            let place = descriptors.place.as_deref().unwrap_or_default();
            let mut head = join_phrase("close-up of", "", subject);
            head = join_phrase(&head, "at", place);
            head = join_phrase(&head, "in", &location);
            let mut segments = vec![head, keywords];
            segments.extend(SLIDER_LOOK.iter().map(|term| term.to_string()));
            (segments, NEGATIVE_SLIDER)
        }
    };

    let mut positive = join_segments(&segments);
    if let Some(preset) = style_preset.map(str::trim).filter(|preset| !preset.is_empty()) {
        positive = format!("{preset} style, {positive}");
    }

    Prompt {
        positive,
        negative: negative.to_string(),
    }
}

fn join_segments(segments: &[String]) -> String {
    segments
        .iter()
        .map(|segment| segment.trim())
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn words(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `"{left} {connector} {right}"`, dropping the connector when either side is blank.
fn join_phrase(left: &str, connector: &str, right: &str) -> String {
    let (left, right) = (left.trim(), right.trim());
    match (left.is_empty(), right.is_empty()) {
        (false, false) => words(&[left, connector, right]),
        (false, true) => left.to_string(),
        (true, _) => right.to_string(),
    }
}
