use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Packing algorithm used by every page of an atlas.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// MaxRects-style free list, best area fit; removal merges freed space back.
    BestFitMerge,
    /// Skyline bottom-left. Fast, cannot reclaim holes without a repack.
    Skyline,
    /// Guillotine cuts with best area fit and periodic free-rect merging.
    Guillotine,
    /// Horizontal shelves. Fastest, lowest quality for mixed sizes.
    Shelf,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::BestFitMerge,
        Algorithm::Skyline,
        Algorithm::Guillotine,
        Algorithm::Shelf,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::BestFitMerge => "bestfitmerge",
            Algorithm::Skyline => "skyline",
            Algorithm::Guillotine => "guillotine",
            Algorithm::Shelf => "shelf",
        }
    }
}

impl FromStr for Algorithm {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bestfitmerge" | "maxrects" | "bfm" => Ok(Self::BestFitMerge),
            "skyline" => Ok(Self::Skyline),
            "guillotine" => Ok(Self::Guillotine),
            "shelf" => Ok(Self::Shelf),
            _ => Err(()),
        }
    }
}

/// How a full page grows before a new page is opened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GrowthStrategy {
    /// Multiply both dimensions by two, clamped to `max_size`.
    Double,
    /// Add `step` pixels to both dimensions, clamped to `max_size`.
    Linear(u32),
}

impl GrowthStrategy {
    /// Next size for a dimension, clamped to `max`.
    pub fn next(&self, current: u32, max: u32) -> u32 {
        let grown = match self {
            GrowthStrategy::Double => current.saturating_mul(2),
            GrowthStrategy::Linear(step) => current.saturating_add(*step),
        };
        grown.min(max)
    }
}

impl FromStr for GrowthStrategy {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_lowercase();
        match s.as_str() {
            "double" => Ok(Self::Double),
            _ => match s.strip_prefix("linear:") {
                Some(step) => step.trim().parse().map(Self::Linear).map_err(|_| ()),
                None => Err(()),
            },
        }
    }
}

/// Atlas configuration, fixed at construction except for `max_page_count` and `repack_on_add`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AtlasSettings {
    /// Side length of a freshly created page.
    #[serde(default = "default_initial_size")]
    pub initial_size: u32,
    /// Upper bound for page width and height.
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    /// Uniform padding reserved on every side of each entry.
    #[serde(default = "default_padding")]
    pub padding: u32,
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,
    #[serde(default = "default_growth")]
    pub growth: GrowthStrategy,
    /// -1 = unlimited, 0 = single page, N = hard cap on page count.
    #[serde(default = "default_max_page_count")]
    pub max_page_count: i32,
    /// Repack fragmented pages before growing or opening a new page.
    #[serde(default)]
    pub repack_on_add: bool,
    /// Maintain the name -> entry index.
    #[serde(default = "default_true")]
    pub enable_name_index: bool,
    /// Commit a page right after a single-item add. Batches always commit once per dirty page.
    #[serde(default = "default_true")]
    pub auto_commit: bool,
    /// Guillotine: free-list length above which a merge pass runs after placement.
    #[serde(default = "default_merge_threshold")]
    pub guillotine_merge_threshold: usize,
}

fn default_initial_size() -> u32 {
    256
}
fn default_max_size() -> u32 {
    2048
}
fn default_padding() -> u32 {
    1
}
fn default_algorithm() -> Algorithm {
    Algorithm::BestFitMerge
}
fn default_growth() -> GrowthStrategy {
    GrowthStrategy::Double
}
fn default_max_page_count() -> i32 {
    -1
}
fn default_true() -> bool {
    true
}
fn default_merge_threshold() -> usize {
    16
}

impl Default for AtlasSettings {
    fn default() -> Self {
        Self {
            initial_size: default_initial_size(),
            max_size: default_max_size(),
            padding: default_padding(),
            algorithm: default_algorithm(),
            growth: default_growth(),
            max_page_count: default_max_page_count(),
            repack_on_add: false,
            enable_name_index: true,
            auto_commit: true,
            guillotine_merge_threshold: default_merge_threshold(),
        }
    }
}

impl AtlasSettings {
    /// Validates the configuration parameters.
    ///
    /// Returns an error if sizes are zero, `initial_size > max_size`, the padding leaves
    /// no usable space on a maximal page, or linear growth has a zero step.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::AtlasError;

        if self.initial_size == 0 || self.max_size == 0 {
            return Err(AtlasError::InvalidConfig(format!(
                "page sizes must be non-zero (initial_size={}, max_size={})",
                self.initial_size, self.max_size
            )));
        }
        if self.initial_size > self.max_size {
            return Err(AtlasError::InvalidConfig(format!(
                "initial_size ({}) exceeds max_size ({})",
                self.initial_size, self.max_size
            )));
        }
        if self.padding.saturating_mul(2) >= self.max_size {
            return Err(AtlasError::InvalidConfig(format!(
                "padding ({}) * 2 leaves no usable space in a {}px page",
                self.padding, self.max_size
            )));
        }
        if self.growth == GrowthStrategy::Linear(0) {
            return Err(AtlasError::InvalidConfig(
                "linear growth step must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Maximum number of pages, `None` when unlimited.
    pub fn page_cap(&self) -> Option<usize> {
        if self.max_page_count < 0 {
            None
        } else {
            Some((self.max_page_count as usize).max(1))
        }
    }

    /// Create a fluent builder for `AtlasSettings`.
    pub fn builder() -> AtlasSettingsBuilder {
        AtlasSettingsBuilder::new()
    }
}

/// Builder for `AtlasSettings` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct AtlasSettingsBuilder {
    cfg: AtlasSettings,
}

impl AtlasSettingsBuilder {
    pub fn new() -> Self {
        Self {
            cfg: AtlasSettings::default(),
        }
    }
    pub fn initial_size(mut self, v: u32) -> Self {
        self.cfg.initial_size = v;
        self
    }
    pub fn max_size(mut self, v: u32) -> Self {
        self.cfg.max_size = v;
        self
    }
    /// Sets `initial_size` and `max_size` to the same value, disabling growth.
    pub fn fixed_size(mut self, v: u32) -> Self {
        self.cfg.initial_size = v;
        self.cfg.max_size = v;
        self
    }
    pub fn padding(mut self, v: u32) -> Self {
        self.cfg.padding = v;
        self
    }
    pub fn algorithm(mut self, v: Algorithm) -> Self {
        self.cfg.algorithm = v;
        self
    }
    pub fn growth(mut self, v: GrowthStrategy) -> Self {
        self.cfg.growth = v;
        self
    }
    pub fn max_page_count(mut self, v: i32) -> Self {
        self.cfg.max_page_count = v;
        self
    }
    pub fn repack_on_add(mut self, v: bool) -> Self {
        self.cfg.repack_on_add = v;
        self
    }
    pub fn enable_name_index(mut self, v: bool) -> Self {
        self.cfg.enable_name_index = v;
        self
    }
    pub fn auto_commit(mut self, v: bool) -> Self {
        self.cfg.auto_commit = v;
        self
    }
    pub fn guillotine_merge_threshold(mut self, v: usize) -> Self {
        self.cfg.guillotine_merge_threshold = v;
        self
    }
    pub fn build(self) -> AtlasSettings {
        self.cfg
    }
}
