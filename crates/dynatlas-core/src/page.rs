use crate::config::AtlasSettings;
use crate::model::{EntryId, Rect};
use crate::packer::{Packer, Placement, new_packer};
use crate::surface::SurfaceHandle;
use std::collections::BTreeSet;

/// One packing surface: a packer instance plus the entries placed on it.
pub struct Page {
    index: usize,
    width: u32,
    height: u32,
    packer: Box<dyn Packer>,
    entries: BTreeSet<EntryId>,
    surface: SurfaceHandle,
    /// Area of the inner rects of the entries currently on the page.
    entry_area: u64,
    dirty: bool,
    /// Set when a removal left space the packer could not reclaim, or left holes.
    fragmented: bool,
}

impl Page {
    pub(crate) fn new(
        index: usize,
        settings: &AtlasSettings,
        width: u32,
        height: u32,
        surface: SurfaceHandle,
    ) -> Self {
        Self {
            index,
            width,
            height,
            packer: new_packer(settings, width, height),
            entries: BTreeSet::new(),
            surface,
            entry_area: 0,
            dirty: false,
            fragmented: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
    pub fn surface(&self) -> SurfaceHandle {
        self.surface
    }
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
    pub fn is_fragmented(&self) -> bool {
        self.fragmented
    }
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
    pub fn entry_ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.entries.iter().copied()
    }
    pub fn contains(&self, id: EntryId) -> bool {
        self.entries.contains(&id)
    }
    pub fn packer(&self) -> &dyn Packer {
        self.packer.as_ref()
    }

    /// Fraction of the page covered by entries.
    pub fn fill_ratio(&self) -> f64 {
        let total = (self.width as u64) * (self.height as u64);
        if total == 0 {
            0.0
        } else {
            self.entry_area as f64 / total as f64
        }
    }

    /// True if the page is still below `max_size` in either dimension.
    pub fn can_grow(&self, max_size: u32) -> bool {
        self.width < max_size || self.height < max_size
    }

    /// Read-only placement candidate for an inner `w x h` rect.
    pub fn propose(&self, w: u32, h: u32) -> Option<Placement> {
        self.packer.propose(w, h)
    }

    /// Applies a proposal for `id`. Returns false if the proposal is stale.
    pub(crate) fn commit(&mut self, id: EntryId, placement: &Placement) -> bool {
        if !self.packer.commit(placement) {
            return false;
        }
        self.entries.insert(id);
        self.entry_area += placement.rect.area();
        self.dirty = true;
        true
    }

    pub fn try_place(&mut self, id: EntryId, w: u32, h: u32) -> Option<Rect> {
        let placement = self.packer.propose(w, h)?;
        self.commit(id, &placement).then_some(placement.rect)
    }

    /// Removes `id` occupying `rect`. Returns whether the packer reclaimed the space.
    pub(crate) fn remove(&mut self, id: EntryId, rect: &Rect) -> bool {
        if !self.entries.remove(&id) {
            return false;
        }
        self.entry_area = self.entry_area.saturating_sub(rect.area());
        self.fragmented = true;
        self.packer.remove(rect)
    }

    /// Drops every entry and resets the packer.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.entry_area = 0;
        self.packer.clear();
        self.fragmented = false;
        self.dirty = true;
    }

    pub(crate) fn grow(&mut self, width: u32, height: u32) {
        self.packer.resize(width, height);
        self.width = width;
        self.height = height;
        self.dirty = true;
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Empty packer of the same algorithm and size, for computing a repack off to the side.
    pub(crate) fn scratch_packer(&self) -> Box<dyn Packer> {
        let mut p = self.packer.box_clone();
        p.initialize(self.width, self.height);
        p
    }

    /// Installs a packer whose placements were computed by a repack.
    pub(crate) fn install_packer(&mut self, packer: Box<dyn Packer>) {
        self.packer = packer;
        self.fragmented = false;
        self.dirty = true;
    }
}
