use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{PipelineError, Result};

pub const MAX_SHOTS: usize = 8;
const MAX_DIMENSION: u32 = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    #[serde(alias = "HERO", alias = "Hero")]
    Hero,
    #[serde(alias = "BACKGROUND", alias = "Background")]
    Background,
    #[serde(alias = "SLIDER", alias = "Slider")]
    Slider,
}

/// Geometry and budget applied when the caller leaves a field unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetDefaults {
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub max_kb: u32,
    pub quality: u8,
    /// Preset sent to backends that take one when the caller names none.
    pub style_preset: Option<&'static str>,
}

impl AssetType {
    pub const ALL: [AssetType; 3] = [AssetType::Hero, AssetType::Background, AssetType::Slider];

    pub fn as_prefix(&self) -> &'static str {
        match self {
            AssetType::Hero => "hero",
            AssetType::Background => "background",
            AssetType::Slider => "slider",
        }
    }

    pub fn usage(&self) -> &'static str {
        self.as_prefix()
    }

    pub fn defaults(&self) -> AssetDefaults {
        match self {
            AssetType::Hero => AssetDefaults {
                width: 1920,
                height: 1080,
                format: OutputFormat::Jpeg,
                max_kb: 500,
                quality: 85,
                style_preset: None,
            },
            AssetType::Background => AssetDefaults {
                width: 1920,
                height: 1080,
                format: OutputFormat::Jpeg,
                max_kb: 400,
                quality: 80,
                style_preset: Some("photographic"),
            },
            AssetType::Slider => AssetDefaults {
                width: 800,
                height: 600,
                format: OutputFormat::Webp,
                max_kb: 150,
                quality: 80,
                style_preset: Some("photographic"),
            },
        }
    }

    /// Aspect ratio requested from backends that take a ratio rather than a
    /// pixel size. Sliders are generated wider (5:4) and cropped to 4:3.
    pub fn generation_aspect(&self) -> (u32, u32) {
        match self {
            AssetType::Hero | AssetType::Background => (16, 9),
            AssetType::Slider => (5, 4),
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_prefix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    #[serde(alias = "jpeg", alias = "jpg", alias = "JPG")]
    Jpeg,
    #[serde(alias = "webp")]
    Webp,
    #[serde(alias = "png")]
    Png,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => ".jpg",
            OutputFormat::Webp => ".webp",
            OutputFormat::Png => ".png",
        }
    }

    /// Lowercase name most generation APIs accept for `output_format`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Webp => "webp",
            OutputFormat::Png => "png",
        }
    }
}

/// Caller payload. Every optional field falls back to the asset type's
/// defaults when the request is resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRequest {
    #[serde(rename = "type", alias = "asset_type")]
    pub asset_type: AssetType,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(
        default,
        alias = "theme_keywords",
        alias = "mood_keywords",
        deserialize_with = "one_or_many"
    )]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub style_preset: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default, alias = "fmt", alias = "fmt_site")]
    pub format: Option<OutputFormat>,
    #[serde(default)]
    pub max_kb: Option<u32>,
    #[serde(default)]
    pub quality: Option<u8>,
    #[serde(default)]
    pub shots: Option<u32>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub trip_name: Option<String>,
    #[serde(default)]
    pub trip_folder: Option<String>,
}

impl AssetRequest {
    pub fn new(asset_type: AssetType) -> Self {
        Self {
            asset_type,
            city: None,
            country: None,
            subject: None,
            place: None,
            activity: None,
            keywords: Vec::new(),
            style_preset: None,
            width: None,
            height: None,
            format: None,
            max_kb: None,
            quality: None,
            shots: None,
            seed: None,
            trip_name: None,
            trip_folder: None,
        }
    }

    pub fn hero(city: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            city: Some(city.into()),
            country: Some(country.into()),
            ..Self::new(AssetType::Hero)
        }
    }

    pub fn background(
        activity: impl Into<String>,
        city: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            activity: Some(activity.into()),
            city: Some(city.into()),
            country: Some(country.into()),
            ..Self::new(AssetType::Background)
        }
    }

    pub fn slider(
        subject: impl Into<String>,
        place: impl Into<String>,
        city: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            subject: Some(subject.into()),
            place: Some(place.into()),
            city: Some(city.into()),
            country: Some(country.into()),
            ..Self::new(AssetType::Slider)
        }
    }

    /// Applies defaults and checks the descriptors the asset type needs.
    pub fn resolve(self) -> Result<AssetSpec> {
        let defaults = self.asset_type.defaults();

        let descriptors = Descriptors {
            city: clean(self.city),
            country: clean(self.country),
            subject: clean(self.subject),
            place: clean(self.place),
            activity: clean(self.activity),
            keywords: self
                .keywords
                .into_iter()
                .map(|keyword| keyword.trim().to_string())
                .filter(|keyword| !keyword.is_empty())
                .collect(),
        };

        let required: Vec<(&str, bool)> = match self.asset_type {
            AssetType::Hero => vec![
                ("city", descriptors.city.is_some()),
                ("country", descriptors.country.is_some()),
            ],
            AssetType::Background => vec![
                ("activity", descriptors.activity.is_some()),
                ("city", descriptors.city.is_some()),
                ("country", descriptors.country.is_some()),
            ],
            AssetType::Slider => vec![
                ("subject", descriptors.subject.is_some()),
                ("place", descriptors.place.is_some()),
                ("city", descriptors.city.is_some()),
                ("country", descriptors.country.is_some()),
            ],
        };
        if let Some((name, _)) = required.iter().find(|(_, present)| !present) {
            return Err(PipelineError::invalid_request(format!(
                "{} asset requires `{}`",
                self.asset_type, name
            )));
        }

        let width = self.width.unwrap_or(defaults.width);
        let height = self.height.unwrap_or(defaults.height);
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(PipelineError::invalid_request(format!(
                "target size {width}x{height} must be within 1..={MAX_DIMENSION}"
            )));
        }

        let max_kb = self.max_kb.unwrap_or(defaults.max_kb);
        if max_kb == 0 {
            return Err(PipelineError::invalid_request("max_kb must be positive"));
        }

        let style_preset = clean(self.style_preset);
        let backend_preset = style_preset
            .clone()
            .or_else(|| defaults.style_preset.map(str::to_string));

        Ok(AssetSpec {
            asset_type: self.asset_type,
            descriptors,
            style_preset,
            backend_preset,
            width,
            height,
            format: self.format.unwrap_or(defaults.format),
            max_kb,
            quality: self.quality.unwrap_or(defaults.quality).clamp(1, 100),
            shots: (self.shots.unwrap_or(1) as usize).clamp(1, MAX_SHOTS),
            seed: self.seed.unwrap_or(0),
            trip_name: clean(self.trip_name),
            trip_folder: self.trip_folder,
        })
    }
}

/// Free-text descriptors interpolated into prompts. Blank values are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptors {
    pub city: Option<String>,
    pub country: Option<String>,
    pub subject: Option<String>,
    pub place: Option<String>,
    pub activity: Option<String>,
    pub keywords: Vec<String>,
}

/// A request after defaults and validation.
#[derive(Debug, Clone)]
pub struct AssetSpec {
    pub asset_type: AssetType,
    pub descriptors: Descriptors,
    /// Caller's preset; also prefixed to the prompt.
    pub style_preset: Option<String>,
    /// Caller's preset or the asset type's default, sent as a backend field only.
    pub backend_preset: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub max_kb: u32,
    pub quality: u8,
    pub shots: usize,
    pub seed: u64,
    pub trip_name: Option<String>,
    pub trip_folder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    pub url: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub usage: String,
    pub city: Option<String>,
    pub country: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => value.split(',').map(str::to_string).collect(),
        Some(OneOrMany::Many(values)) => values,
    })
}
