use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned rectangle (pixels). `x,y` is top-left; `w,h` are sizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
    /// Exclusive right edge (`x + w`).
    pub fn right(&self) -> u32 {
        self.x + self.w
    }
    /// Exclusive bottom edge (`y + h`).
    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }
    pub fn area(&self) -> u64 {
        (self.w as u64) * (self.h as u64)
    }
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
    /// Returns true if `r` is fully inside `self`.
    pub fn contains(&self, r: &Rect) -> bool {
        r.x >= self.x && r.y >= self.y && r.right() <= self.right() && r.bottom() <= self.bottom()
    }
    /// Returns true if the interiors of the two rectangles overlap.
    pub fn intersects(&self, r: &Rect) -> bool {
        !(self.x >= r.right() || r.x >= self.right() || self.y >= r.bottom() || r.y >= self.bottom())
    }
    /// Grows the rectangle by `by` pixels on every side.
    pub fn expand(&self, by: u32) -> Rect {
        Rect::new(
            self.x.saturating_sub(by),
            self.y.saturating_sub(by),
            self.w + by * 2,
            self.h + by * 2,
        )
    }
    /// Shrinks the rectangle by `by` pixels on every side.
    pub fn inset(&self, by: u32) -> Rect {
        Rect::new(
            self.x + by,
            self.y + by,
            self.w.saturating_sub(by * 2),
            self.h.saturating_sub(by * 2),
        )
    }
}

/// Normalized texture coordinates of a rectangle within its page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Uv {
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

impl Uv {
    /// Derives UVs for `rect` on a `page_w x page_h` page.
    pub fn from_rect(rect: &Rect, page_w: u32, page_h: u32) -> Self {
        if page_w == 0 || page_h == 0 {
            return Self::default();
        }
        let (pw, ph) = (page_w as f32, page_h as f32);
        Self {
            u0: rect.x as f32 / pw,
            v0: rect.y as f32 / ph,
            u1: rect.right() as f32 / pw,
            v1: rect.bottom() as f32 / ph,
        }
    }

    /// Corner coordinates in top-left, top-right, bottom-right, bottom-left order.
    pub fn corners(&self) -> [[f32; 2]; 4] {
        [
            [self.u0, self.v0],
            [self.u1, self.v0],
            [self.u1, self.v1],
            [self.u0, self.v1],
        ]
    }
}

/// Stable entry identifier. Ids are handed out monotonically and never reused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sprite metadata carried alongside an entry (9-slice border, pivot, pixels-per-unit).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpriteMeta {
    /// Border in pixels: left, bottom, right, top.
    #[serde(default)]
    pub border: [u32; 4],
    /// Normalized pivot, (0.5, 0.5) is the center.
    #[serde(default = "default_pivot")]
    pub pivot: (f32, f32),
    #[serde(default = "default_pixels_per_unit")]
    pub pixels_per_unit: f32,
}

fn default_pivot() -> (f32, f32) {
    (0.5, 0.5)
}
fn default_pixels_per_unit() -> f32 {
    100.0
}

impl Default for SpriteMeta {
    fn default() -> Self {
        Self {
            border: [0; 4],
            pivot: default_pivot(),
            pixels_per_unit: default_pixels_per_unit(),
        }
    }
}

impl SpriteMeta {
    pub fn with_pivot(mut self, x: f32, y: f32) -> Self {
        self.pivot = (x, y);
        self
    }
    pub fn with_border(mut self, border: [u32; 4]) -> Self {
        self.border = border;
        self
    }
    pub fn with_pixels_per_unit(mut self, ppu: f32) -> Self {
        self.pixels_per_unit = ppu;
        self
    }
}

/// Handle for a packed image.
///
/// Entries are owned by the [`Atlas`](crate::atlas::Atlas); callers receive clones and use
/// [`Atlas::sync`](crate::atlas::Atlas::sync) or the `version` counter to detect moves.
/// A removed entry keeps `valid == false` forever and its id is never handed out again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub id: EntryId,
    pub name: Option<String>,
    /// Inner (unpadded) rectangle on the page.
    pub rect: Rect,
    /// `rect` normalized by the owning page's size.
    pub uv: Uv,
    pub page: usize,
    /// Incremented every time `rect`, `page` or the page size changes.
    pub version: u64,
    pub valid: bool,
    pub meta: SpriteMeta,
}

impl Entry {
    pub(crate) fn new(
        id: EntryId,
        name: Option<String>,
        rect: Rect,
        page: usize,
        page_size: (u32, u32),
        meta: SpriteMeta,
    ) -> Self {
        Self {
            id,
            name,
            rect,
            uv: Uv::from_rect(&rect, page_size.0, page_size.1),
            page,
            version: 1,
            valid: true,
            meta,
        }
    }

    /// Moves the entry and bumps its version.
    pub(crate) fn relocate(&mut self, rect: Rect, page: usize, page_size: (u32, u32)) {
        self.rect = rect;
        self.page = page;
        self.uv = Uv::from_rect(&rect, page_size.0, page_size.1);
        self.version += 1;
    }

    pub fn width(&self) -> u32 {
        self.rect.w
    }
    pub fn height(&self) -> u32 {
        self.rect.h
    }
}

/// Result of refreshing a caller-held entry snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Unchanged,
    Updated,
    Removed,
}

/// Statistics about atlas packing efficiency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AtlasStats {
    /// Total number of pages in the atlas.
    pub num_pages: usize,
    /// Number of valid entries.
    pub num_entries: usize,
    /// Sum of width * height over all pages.
    pub total_page_area: u64,
    /// Sum of entry rect areas.
    pub used_area: u64,
    /// used_area / total_page_area (0.0 to 1.0).
    pub occupancy: f64,
    pub max_page_width: u32,
    pub max_page_height: u32,
}

impl AtlasStats {
    /// Returns a human-readable summary of the statistics.
    pub fn summary(&self) -> String {
        format!(
            "Pages: {}, Entries: {}, Occupancy: {:.2}%, Total Area: {} px², Used Area: {} px²",
            self.num_pages,
            self.num_entries,
            self.occupancy * 100.0,
            self.total_page_area,
            self.used_area,
        )
    }

    /// Returns wasted space in pixels.
    pub fn wasted_area(&self) -> u64 {
        self.total_page_area.saturating_sub(self.used_area)
    }

    /// Returns wasted space as a percentage (0.0 to 100.0).
    pub fn waste_percentage(&self) -> f64 {
        if self.total_page_area > 0 {
            (self.wasted_area() as f64 / self.total_page_area as f64) * 100.0
        } else {
            0.0
        }
    }
}
