//! Runtime texture atlas allocator.
//!
//! - Algorithms: BestFitMerge (MaxRects best-area-fit with free-rect merging), Skyline (bottom-left),
//!   Guillotine (best-area-fit + shorter-leftover split), Shelf (best-height-fit rows)
//! - Atlas: routes images to pages, grows pages or opens new ones when full, repacks fragmented pages
//! - Entries are versioned; holders compare versions (or subscribe to events) to refresh cached UVs
//! - Batches place largest-first and commit each touched page once; an async variant yields between quanta
//! - Pixels live behind a [`SurfaceProvider`]; [`MemorySurface`] keeps RGBA pages in memory.
//!
//! Quick example:
//! ```ignore
//! use dynatlas_core::prelude::*;
//! # fn main() -> dynatlas_core::Result<()> {
//! let settings = AtlasSettings::builder()
//!     .initial_size(256)
//!     .max_size(1024)
//!     .padding(2)
//!     .algorithm(Algorithm::Skyline)
//!     .build();
//! let mut atlas = Atlas::in_memory(settings)?;
//! let img = image::RgbaImage::new(32, 32);
//! let entry = atlas.add(Some("hero"), &img)?;
//! println!("{} at {:?} uv {:?}", entry.id, entry.rect, entry.uv);
//! # Ok(()) }
//! ```

pub mod atlas;
pub mod batch;
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod packer;
pub mod page;
pub mod persist;
pub mod registry;
pub mod surface;

pub use atlas::Atlas;
pub use batch::*;
pub use config::*;
pub use error::*;
pub use events::{AtlasEvent, ListenerId};
pub use model::*;
pub use packer::{Packer, Placement, new_packer};
pub use page::Page;
pub use persist::*;
pub use registry::AtlasRegistry;
pub use surface::*;

/// Convenience prelude for common types.
/// Importing `dynatlas_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::atlas::Atlas;
    pub use crate::batch::{BatchItem, BatchItemResult, BatchProgress, BatchReport, CancelToken};
    pub use crate::config::{Algorithm, AtlasSettings, AtlasSettingsBuilder, GrowthStrategy};
    pub use crate::error::{AtlasError, PlaceStatus};
    pub use crate::events::{AtlasEvent, ListenerId};
    pub use crate::model::{AtlasStats, Entry, EntryId, EntryStatus, Rect, SpriteMeta, Uv};
    pub use crate::packer::{Packer, Placement, new_packer};
    pub use crate::page::Page;
    pub use crate::persist::AtlasSnapshot;
    pub use crate::registry::AtlasRegistry;
    pub use crate::surface::{MemorySurface, SurfaceHandle, SurfaceProvider, UpdateRegion};
}
