//! Saving and restoring atlas layouts.
//!
//! A snapshot records settings, page sizes and entries (rect, name, sprite metadata).
//! Pixels are not part of the snapshot; callers save page images from the surface and hand
//! them back on restore. Restored entries get fresh ids; names are preserved exactly.

use crate::atlas::{Atlas, sort_for_placement};
use crate::config::AtlasSettings;
use crate::error::{AtlasError, Result};
use crate::model::{Rect, SpriteMeta, Uv};
use crate::surface::SurfaceProvider;
use image::{RgbaImage, imageops};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageRecord {
    pub index: usize,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub page: usize,
    pub rect: Rect,
    #[serde(default)]
    pub meta: SpriteMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AtlasSnapshot {
    /// Schema version of the snapshot format; current: "1".
    pub schema_version: String,
    pub settings: AtlasSettings,
    pub pages: Vec<PageRecord>,
    pub entries: Vec<EntryRecord>,
}

impl AtlasSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

impl<S: SurfaceProvider> Atlas<S> {
    pub fn snapshot(&self) -> AtlasSnapshot {
        let pages = self
            .pages()
            .iter()
            .map(|p| PageRecord {
                index: p.index(),
                width: p.width(),
                height: p.height(),
            })
            .collect();
        let entries = self
            .entries()
            .into_iter()
            .map(|e| EntryRecord {
                name: e.name.clone(),
                page: e.page,
                rect: e.rect,
                meta: e.meta,
            })
            .collect();
        AtlasSnapshot {
            schema_version: "1".into(),
            settings: self.settings().clone(),
            pages,
            entries,
        }
    }

    /// Reads back the pixels of every page (for saving alongside a snapshot).
    pub fn page_images(&self) -> Result<Vec<RgbaImage>> {
        self.pages()
            .iter()
            .map(|p| {
                self.surface()
                    .read_pixels(p.surface(), Rect::new(0, 0, p.width(), p.height()))
            })
            .collect()
    }

    /// Rebuilds an atlas from `snapshot`.
    ///
    /// Pages are recreated at their recorded sizes and each page's entries are re-placed on it
    /// in descending area order; an entry that no longer fits there goes through the regular
    /// add path. `page_pixels(i)` supplies the saved image of page `i`; entries of pages without
    /// an image are restored geometry-only.
    pub fn restore(
        snapshot: &AtlasSnapshot,
        surface: S,
        mut page_pixels: impl FnMut(usize) -> Option<RgbaImage>,
    ) -> Result<Self> {
        let mut atlas = Atlas::new(snapshot.settings.clone(), surface)?;
        let mut page_records = snapshot.pages.clone();
        page_records.sort_by_key(|p| p.index);
        for (expected, rec) in page_records.iter().enumerate() {
            if rec.index != expected {
                return Err(AtlasError::InvalidInput(format!(
                    "snapshot pages are not contiguous (missing page {})",
                    expected
                )));
            }
            let w = rec.width.min(snapshot.settings.max_size);
            let h = rec.height.min(snapshot.settings.max_size);
            atlas.open_page(w, h)?;
        }

        let mut order: Vec<usize> = (0..snapshot.entries.len()).collect();
        sort_for_placement(&mut order, |&i| {
            let r = snapshot.entries[i].rect;
            (r.w, r.h, i as u64)
        });

        let images: Vec<Option<RgbaImage>> = (0..page_records.len()).map(&mut page_pixels).collect();
        for i in order {
            let rec = &snapshot.entries[i];
            let pixels = images
                .get(rec.page)
                .and_then(|img| img.as_ref())
                .filter(|img| rec.rect.right() <= img.width() && rec.rect.bottom() <= img.height())
                .map(|img| imageops::crop_imm(img, rec.rect.x, rec.rect.y, rec.rect.w, rec.rect.h).to_image());
            let (w, h) = (rec.rect.w, rec.rect.h);
            atlas.check_size(w, h)?;
            let proposal = atlas.page(rec.page).and_then(|p| p.propose(w, h));
            let result = match proposal {
                Some(pl) => atlas.apply(rec.page, pl, rec.name.clone(), pixels.as_ref(), rec.meta),
                None => {
                    warn!(name = ?rec.name, page = rec.page, "entry no longer fits its page, re-adding");
                    atlas.place(rec.name.clone(), w, h, pixels.as_ref(), rec.meta)
                }
            };
            result?;
        }
        atlas.commit_dirty_pages()?;
        debug!(
            pages = atlas.page_count(),
            entries = atlas.entry_count(),
            "restored atlas"
        );
        Ok(atlas)
    }

    /// Flat JSON keyed by entry name (TexturePacker-like hash), with UVs and versions.
    /// Unnamed entries are keyed by their id.
    pub fn to_json_hash(&self) -> Value {
        let mut frames = serde_json::Map::new();
        for e in self.entries() {
            let key = e.name.clone().unwrap_or_else(|| e.id.to_string());
            let (pw, ph) = self.page(e.page).map(|p| p.size()).unwrap_or((0, 0));
            let uv = Uv::from_rect(&e.rect, pw, ph);
            frames.insert(
                key,
                json!({
                    "frame": {"x": e.rect.x, "y": e.rect.y, "w": e.rect.w, "h": e.rect.h},
                    "uv": {"u0": uv.u0, "v0": uv.v0, "u1": uv.u1, "v1": uv.v1},
                    "pivot": {"x": e.meta.pivot.0, "y": e.meta.pivot.1},
                    "border": e.meta.border,
                    "pixelsPerUnit": e.meta.pixels_per_unit,
                    "page": e.page,
                    "pageSize": {"w": pw, "h": ph},
                    "version": e.version,
                }),
            );
        }
        let pages: Vec<Value> = self
            .pages()
            .iter()
            .map(|p| json!({"index": p.index(), "width": p.width(), "height": p.height()}))
            .collect();
        json!({
            "frames": frames,
            "meta": {
                "app": "dynatlas",
                "version": env!("CARGO_PKG_VERSION"),
                "format": "RGBA8888",
                "padding": self.settings().padding,
                "algorithm": self.settings().algorithm.name(),
                "pages": pages,
            }
        })
    }
}
