//! Backing pixel storage for atlas pages.
//!
//! The atlas never keeps pixel data itself; it drives a [`SurfaceProvider`] that owns one
//! surface per page. [`MemorySurface`] keeps RGBA pages in memory and is useful for tools,
//! tests, and engines that upload dirty pages on their own.

use crate::error::{AtlasError, Result};
use crate::model::Rect;
use image::{Rgba, RgbaImage, imageops};
use std::collections::HashMap;

/// Opaque handle to one page surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceHandle(pub u64);

/// Region written on a surface since its last commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRegion {
    pub handle: SurfaceHandle,
    pub rect: Rect,
}

impl UpdateRegion {
    /// Get the area of this region in pixels.
    pub fn area(&self) -> u64 {
        self.rect.area()
    }
}

/// Storage collaborator that holds the actual pixels of each page.
pub trait SurfaceProvider {
    fn allocate_page(&mut self, width: u32, height: u32) -> Result<SurfaceHandle>;
    /// Grows a surface. Pixels in the unchanged region must be preserved.
    fn resize_page(&mut self, handle: SurfaceHandle, width: u32, height: u32) -> Result<()>;
    fn write_pixels(&mut self, handle: SurfaceHandle, rect: Rect, pixels: &RgbaImage) -> Result<()>;
    /// Flushes pending writes (e.g. a GPU upload).
    fn commit(&mut self, handle: SurfaceHandle) -> Result<()>;
    fn read_pixels(&self, handle: SurfaceHandle, rect: Rect) -> Result<RgbaImage>;
    fn destroy(&mut self, handle: SurfaceHandle);
    /// Resets `rect` to the surface background. Default: writes a transparent block.
    fn clear_pixels(&mut self, handle: SurfaceHandle, rect: Rect) -> Result<()> {
        let blank = RgbaImage::new(rect.w, rect.h);
        self.write_pixels(handle, rect, &blank)
    }
    fn is_readable(&self) -> bool {
        true
    }
}

struct MemoryPage {
    image: RgbaImage,
    pending: Vec<Rect>,
    commits: usize,
}

/// In-memory RGBA page storage.
pub struct MemorySurface {
    pages: HashMap<SurfaceHandle, MemoryPage>,
    next_handle: u64,
    background_color: Rgba<u8>,
    total_commits: usize,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySurface {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            next_handle: 0,
            background_color: Rgba([0, 0, 0, 0]), // Transparent by default
            total_commits: 0,
        }
    }

    /// Set the background color for new pages and grown areas.
    pub fn with_background_color(mut self, color: Rgba<u8>) -> Self {
        self.background_color = color;
        self
    }

    /// Get a reference to the pixel data of a page.
    pub fn image(&self, handle: SurfaceHandle) -> Option<&RgbaImage> {
        self.pages.get(&handle).map(|p| &p.image)
    }

    /// Regions written since the last commit of `handle`.
    pub fn pending_regions(&self, handle: SurfaceHandle) -> Vec<UpdateRegion> {
        self.pages
            .get(&handle)
            .map(|p| {
                p.pending
                    .iter()
                    .map(|r| UpdateRegion { handle, rect: *r })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn commit_count(&self, handle: SurfaceHandle) -> usize {
        self.pages.get(&handle).map_or(0, |p| p.commits)
    }

    /// Commits across all surfaces, including destroyed ones.
    pub fn total_commits(&self) -> usize {
        self.total_commits
    }

    pub fn surface_count(&self) -> usize {
        self.pages.len()
    }

    fn page_mut(&mut self, handle: SurfaceHandle) -> Result<&mut MemoryPage> {
        self.pages
            .get_mut(&handle)
            .ok_or_else(|| AtlasError::Surface(format!("unknown surface {:?}", handle)))
    }
}

impl SurfaceProvider for MemorySurface {
    fn allocate_page(&mut self, width: u32, height: u32) -> Result<SurfaceHandle> {
        let handle = SurfaceHandle(self.next_handle);
        self.next_handle += 1;
        self.pages.insert(
            handle,
            MemoryPage {
                image: RgbaImage::from_pixel(width, height, self.background_color),
                pending: Vec::new(),
                commits: 0,
            },
        );
        Ok(handle)
    }

    fn resize_page(&mut self, handle: SurfaceHandle, width: u32, height: u32) -> Result<()> {
        let background = self.background_color;
        let page = self.page_mut(handle)?;
        let mut grown = RgbaImage::from_pixel(width, height, background);
        imageops::replace(&mut grown, &page.image, 0, 0);
        page.image = grown;
        Ok(())
    }

    fn write_pixels(&mut self, handle: SurfaceHandle, rect: Rect, pixels: &RgbaImage) -> Result<()> {
        let page = self.page_mut(handle)?;
        if rect.right() > page.image.width() || rect.bottom() > page.image.height() {
            return Err(AtlasError::Surface(format!(
                "write {:?} outside {}x{} surface",
                rect,
                page.image.width(),
                page.image.height()
            )));
        }
        if pixels.dimensions() != (rect.w, rect.h) {
            return Err(AtlasError::Surface(format!(
                "pixel block {:?} does not match rect {}x{}",
                pixels.dimensions(),
                rect.w,
                rect.h
            )));
        }
        imageops::replace(&mut page.image, pixels, rect.x as i64, rect.y as i64);
        page.pending.push(rect);
        Ok(())
    }

    fn commit(&mut self, handle: SurfaceHandle) -> Result<()> {
        let page = self.page_mut(handle)?;
        page.pending.clear();
        page.commits += 1;
        self.total_commits += 1;
        Ok(())
    }

    fn read_pixels(&self, handle: SurfaceHandle, rect: Rect) -> Result<RgbaImage> {
        let page = self
            .pages
            .get(&handle)
            .ok_or_else(|| AtlasError::Surface(format!("unknown surface {:?}", handle)))?;
        if rect.right() > page.image.width() || rect.bottom() > page.image.height() {
            return Err(AtlasError::Surface(format!("read {:?} outside surface", rect)));
        }
        Ok(imageops::crop_imm(&page.image, rect.x, rect.y, rect.w, rect.h).to_image())
    }

    fn destroy(&mut self, handle: SurfaceHandle) {
        self.pages.remove(&handle);
    }

    fn clear_pixels(&mut self, handle: SurfaceHandle, rect: Rect) -> Result<()> {
        let blank = RgbaImage::from_pixel(rect.w, rect.h, self.background_color);
        self.write_pixels(handle, rect, &blank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_preserves_content() {
        let mut s = MemorySurface::new();
        let h = s.allocate_page(4, 4).unwrap();
        let red = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        s.write_pixels(h, Rect::new(2, 2, 2, 2), &red).unwrap();
        s.resize_page(h, 8, 8).unwrap();
        let img = s.image(h).unwrap();
        assert_eq!(img.dimensions(), (8, 8));
        assert_eq!(img.get_pixel(3, 3), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(6, 6), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn commit_clears_pending_regions() {
        let mut s = MemorySurface::new();
        let h = s.allocate_page(8, 8).unwrap();
        s.write_pixels(h, Rect::new(0, 0, 2, 2), &RgbaImage::new(2, 2)).unwrap();
        assert_eq!(s.pending_regions(h).len(), 1);
        s.commit(h).unwrap();
        assert!(s.pending_regions(h).is_empty());
        assert_eq!(s.commit_count(h), 1);
    }

    #[test]
    fn out_of_bounds_write_is_rejected() {
        let mut s = MemorySurface::new();
        let h = s.allocate_page(8, 8).unwrap();
        assert!(s.write_pixels(h, Rect::new(6, 6, 4, 4), &RgbaImage::new(4, 4)).is_err());
    }
}
