mod key;
mod upload;

pub use key::{StorageKey, asset_filename, build_folder, slugify};
pub use upload::StorageUploader;
