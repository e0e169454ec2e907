use image::{DynamicImage, GenericImageView};

/// One successful shot, kept in memory only until selection.
#[derive(Debug, Clone)]
pub struct GeneratedCandidate {
    pub shot: usize,
    pub image: DynamicImage,
}

impl GeneratedCandidate {
    pub fn new(shot: usize, image: DynamicImage) -> Self {
        Self { shot, image }
    }

    /// Raw pixel area before any resizing.
    pub fn area(&self) -> u64 {
        let (width, height) = self.image.dimensions();
        u64::from(width) * u64::from(height)
    }
}

/// Largest decoded area wins; ties go to the lowest shot index.
pub fn select_candidate(candidates: Vec<GeneratedCandidate>) -> Option<GeneratedCandidate> {
    candidates.into_iter().reduce(|best, next| {
        let better = next.area() > best.area()
            || (next.area() == best.area() && next.shot < best.shot);
        if better { next } else { best }
    })
}
