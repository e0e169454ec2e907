mod compose;
mod encode;
mod select;

pub use compose::{ConformedImage, CoverFit, cover_fit};
pub use encode::{EncodedAsset, QUALITY_FLOOR, QUALITY_STEP, encode};
pub use select::{GeneratedCandidate, select_candidate};
