use crate::model::EntryId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("Atlas is full: no page can accept {width}x{height} and growth/page limits are exhausted")]
    Full { width: u32, height: u32 },
    #[error("Image {width}x{height} (padded) exceeds the maximum page size {max_size}")]
    TooLarge { width: u32, height: u32, max_size: u32 },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Internal placement failure on page {page}: entry {entry} no longer fits")]
    InternalPlacementFailure { page: usize, entry: EntryId },
    #[error("Unknown entry: {0}")]
    UnknownEntry(String),
    #[error("Surface error: {0}")]
    Surface(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl AtlasError {
    /// Maps the error onto the placement status taxonomy.
    pub fn status(&self) -> PlaceStatus {
        match self {
            AtlasError::Full { .. } => PlaceStatus::Full,
            AtlasError::TooLarge { .. } => PlaceStatus::TooLarge,
            AtlasError::InvalidInput(_) | AtlasError::UnknownEntry(_) => PlaceStatus::InvalidInput,
            AtlasError::Cancelled => PlaceStatus::Cancelled,
            _ => PlaceStatus::InternalPlacementFailure,
        }
    }

    /// True for the conditions callers are expected to branch on (no page fits, image too large).
    pub fn is_capacity(&self) -> bool {
        matches!(self, AtlasError::Full { .. } | AtlasError::TooLarge { .. })
    }
}

/// Flat placement outcome, handy for progress reporting and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceStatus {
    Success,
    Full,
    TooLarge,
    InvalidInput,
    InternalPlacementFailure,
    Cancelled,
}

pub type Result<T> = std::result::Result<T, AtlasError>;
