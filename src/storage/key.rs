use std::{fmt, sync::LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use uuid::Uuid;

use crate::{
    models::{AssetType, OutputFormat},
    util::unix_seconds,
};

const SLUG_MAX_CHARS: usize = 80;
const SLUG_FALLBACK: &str = "trip";
const FOLDER_ID_CHARS: usize = 10;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("slug pattern is valid"));
static SEPARATOR_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("separator pattern is valid"));

/// Object address inside the bucket: `{folder}/{filename}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKey {
    pub folder: String,
    pub filename: String,
}

impl StorageKey {
    pub fn new(folder: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            filename: filename.into(),
        }
    }

    /// Key for a freshly generated asset at `now`.
    pub fn for_asset(
        trip_name: Option<&str>,
        trip_folder: Option<&str>,
        asset_type: AssetType,
        format: OutputFormat,
        now: &DateTime<Utc>,
    ) -> Self {
        Self::new(
            build_folder(trip_name, trip_folder),
            asset_filename(asset_type, format, now),
        )
    }

    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.folder.is_empty() {
            write!(f, "{}", self.filename)
        } else {
            write!(f, "{}/{}", self.folder, self.filename)
        }
    }
}

pub fn slugify(value: &str) -> String {
    let stripped = UNSAFE_CHARS.replace_all(value, "");
    let lowered = stripped.trim().to_lowercase();
    let slug = SEPARATOR_RUNS.replace_all(&lowered, "-");

    if slug.is_empty() {
        SLUG_FALLBACK.to_string()
    } else {
        slug.chars().take(SLUG_MAX_CHARS).collect()
    }
}

/// An explicit folder is used as given, minus surrounding whitespace and
/// slashes. Otherwise the trip name is slugged and suffixed with a random id.
pub fn build_folder(trip_name: Option<&str>, trip_folder: Option<&str>) -> String {
    if let Some(folder) = trip_folder
        .map(|folder| folder.trim().trim_matches('/'))
        .filter(|folder| !folder.is_empty())
    {
        return folder.to_string();
    }

    let base = slugify(trip_name.unwrap_or(SLUG_FALLBACK));
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", base, &id[..FOLDER_ID_CHARS])
}

pub fn asset_filename(asset_type: AssetType, format: OutputFormat, now: &DateTime<Utc>) -> String {
    format!(
        "{}_{}{}",
        asset_type.as_prefix(),
        unix_seconds(now),
        format.extension()
    )
}
