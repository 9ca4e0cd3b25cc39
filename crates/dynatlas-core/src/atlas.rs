use crate::config::AtlasSettings;
use crate::error::{AtlasError, Result};
use crate::events::{AtlasEvent, EventHub, ListenerId};
use crate::model::{AtlasStats, Entry, EntryId, EntryStatus, Rect, SpriteMeta};
use crate::packer::{Placement, padded};
use crate::page::Page;
use crate::surface::{MemorySurface, SurfaceProvider};
use image::RgbaImage;
use std::collections::HashMap;
use tracing::{debug, instrument, trace, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Runtime atlas: routes images to pages, grows pages or opens new ones when full,
/// and keeps entries versioned across growth and repacks.
///
/// Repack is per page: an entry never changes `page` during [`Atlas::repack`].
pub struct Atlas<S: SurfaceProvider = MemorySurface> {
    settings: AtlasSettings,
    surface: S,
    pages: Vec<Page>,
    entries: HashMap<EntryId, Entry>,
    by_name: HashMap<String, EntryId>,
    next_id: u64,
    current_page: usize,
    events: EventHub,
}

impl Atlas<MemorySurface> {
    /// Atlas backed by in-memory RGBA pages.
    pub fn in_memory(settings: AtlasSettings) -> Result<Self> {
        Self::new(settings, MemorySurface::new())
    }
}

impl<S: SurfaceProvider> Atlas<S> {
    pub fn new(settings: AtlasSettings, surface: S) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            surface,
            pages: Vec::new(),
            entries: HashMap::new(),
            by_name: HashMap::new(),
            next_id: 0,
            current_page: 0,
            events: EventHub::default(),
        })
    }

    // ---------- queries ----------

    pub fn settings(&self) -> &AtlasSettings {
        &self.settings
    }
    pub fn surface(&self) -> &S {
        &self.surface
    }
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(&id)
    }
    pub fn contains(&self, id: EntryId) -> bool {
        self.entries.contains_key(&id)
    }
    pub fn entry_by_name(&self, name: &str) -> Option<&Entry> {
        self.by_name.get(name).and_then(|id| self.entries.get(id))
    }
    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
    /// Valid entries ordered by id.
    pub fn entries(&self) -> Vec<&Entry> {
        let mut list: Vec<&Entry> = self.entries.values().collect();
        list.sort_by_key(|e| e.id);
        list
    }
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
    pub fn fill_ratio(&self, page: usize) -> Option<f64> {
        self.pages.get(page).map(|p| p.fill_ratio())
    }

    /// Computes packing statistics for this atlas.
    pub fn stats(&self) -> AtlasStats {
        let mut total_page_area = 0u64;
        let mut max_page_width = 0u32;
        let mut max_page_height = 0u32;
        for p in &self.pages {
            total_page_area += (p.width() as u64) * (p.height() as u64);
            max_page_width = max_page_width.max(p.width());
            max_page_height = max_page_height.max(p.height());
        }
        let used_area: u64 = self.entries.values().map(|e| e.rect.area()).sum();
        let occupancy = if total_page_area > 0 {
            used_area as f64 / total_page_area as f64
        } else {
            0.0
        };
        AtlasStats {
            num_pages: self.pages.len(),
            num_entries: self.entries.len(),
            total_page_area,
            used_area,
            occupancy,
            max_page_width,
            max_page_height,
        }
    }

    /// Refreshes a caller-held entry snapshot.
    pub fn sync(&self, entry: &mut Entry) -> EntryStatus {
        match self.entries.get(&entry.id) {
            None => {
                entry.valid = false;
                EntryStatus::Removed
            }
            Some(current) if current.version != entry.version => {
                *entry = current.clone();
                EntryStatus::Updated
            }
            Some(_) => EntryStatus::Unchanged,
        }
    }

    // ---------- hot settings ----------

    pub fn set_max_page_count(&mut self, max_page_count: i32) {
        self.settings.max_page_count = max_page_count;
    }
    pub fn set_repack_on_add(&mut self, repack_on_add: bool) {
        self.settings.repack_on_add = repack_on_add;
    }

    // ---------- events ----------

    pub fn subscribe(&mut self, listener: impl FnMut(&AtlasEvent) + 'static) -> ListenerId {
        self.events.subscribe(Box::new(listener))
    }
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }
    pub fn listener_count(&self) -> usize {
        self.events.len()
    }

    // ---------- add / remove / replace ----------

    /// Packs `image` and copies its pixels onto the chosen page.
    pub fn add(&mut self, name: Option<&str>, image: &RgbaImage) -> Result<Entry> {
        self.add_with_meta(name, image, SpriteMeta::default())
    }

    pub fn add_with_meta(
        &mut self,
        name: Option<&str>,
        image: &RgbaImage,
        meta: SpriteMeta,
    ) -> Result<Entry> {
        let (w, h) = image.dimensions();
        let id = self.place(name.map(str::to_owned), w, h, Some(image), meta)?;
        self.finish_single()?;
        Ok(self.entries[&id].clone())
    }

    /// Reserves a `w x h` region without pixel data.
    pub fn reserve(&mut self, name: Option<&str>, w: u32, h: u32) -> Result<Entry> {
        let id = self.place(name.map(str::to_owned), w, h, None, SpriteMeta::default())?;
        self.finish_single()?;
        Ok(self.entries[&id].clone())
    }

    /// Removes an entry. The returned snapshot has `valid == false`; its id is retired.
    pub fn remove(&mut self, id: EntryId) -> Result<Entry> {
        let (page_index, rect) = self
            .entries
            .get(&id)
            .map(|e| (e.page, e.rect))
            .ok_or_else(|| AtlasError::UnknownEntry(id.to_string()))?;
        let handle = self.pages[page_index].surface();
        self.surface.clear_pixels(handle, rect)?;

        let Some(mut entry) = self.entries.remove(&id) else {
            return Err(AtlasError::UnknownEntry(id.to_string()));
        };
        if let Some(name) = &entry.name {
            if self.by_name.get(name) == Some(&id) {
                self.by_name.remove(name);
            }
        }
        let page = &mut self.pages[page_index];
        let reclaimed = page.remove(id, &rect);
        if !reclaimed {
            warn!(
                entry = %id,
                page = page_index,
                "space not reclaimed by packer until the page is repacked"
            );
        }
        page.mark_dirty();
        entry.valid = false;
        trace!(entry = %id, "removed");
        self.events.emit(AtlasEvent::EntryRemoved { id });
        Ok(entry)
    }

    pub fn remove_by_name(&mut self, name: &str) -> Result<Entry> {
        let id = *self
            .by_name
            .get(name)
            .ok_or_else(|| AtlasError::UnknownEntry(name.to_string()))?;
        self.remove(id)
    }

    /// Removes the entry named `name` (if any) and adds `image` under the same name.
    ///
    /// Sprite metadata of the old entry carries over. If the add fails, no entry remains for `name`.
    pub fn replace(&mut self, name: &str, image: &RgbaImage) -> Result<Entry> {
        let meta = self.evict_name(name)?.unwrap_or_default();
        self.add_with_meta(Some(name), image, meta)
    }

    /// Removes every entry and destroys all pages. Ids keep counting upwards.
    pub fn clear(&mut self) {
        let mut ids: Vec<EntryId> = self.entries.keys().copied().collect();
        ids.sort();
        self.entries.clear();
        self.by_name.clear();
        for id in ids {
            self.events.emit(AtlasEvent::EntryRemoved { id });
        }
        for page in self.pages.drain(..) {
            self.surface.destroy(page.surface());
        }
        self.current_page = 0;
        self.events.emit(AtlasEvent::PageCountChanged { count: 0 });
    }

    /// Removes every entry placed on `page`, keeping the page and its size.
    pub fn clear_page(&mut self, page: usize) -> Result<usize> {
        let p = self
            .pages
            .get_mut(page)
            .ok_or_else(|| AtlasError::InvalidInput(format!("no page {}", page)))?;
        let ids: Vec<EntryId> = p.entry_ids().collect();
        p.clear();
        let (handle, w, h) = (p.surface(), p.width(), p.height());
        for id in &ids {
            if let Some(entry) = self.entries.remove(id) {
                if let Some(name) = &entry.name {
                    if self.by_name.get(name) == Some(id) {
                        self.by_name.remove(name);
                    }
                }
            }
            self.events.emit(AtlasEvent::EntryRemoved { id: *id });
        }
        self.surface.clear_pixels(handle, Rect::new(0, 0, w, h))?;
        Ok(ids.len())
    }

    // ---------- commit ----------

    /// Commits every dirty page once. Returns the number of pages committed.
    pub fn commit_dirty_pages(&mut self) -> Result<usize> {
        let mut committed = 0;
        for page in self.pages.iter_mut() {
            if page.take_dirty() {
                self.surface.commit(page.surface())?;
                committed += 1;
            }
        }
        if committed > 0 {
            trace!(pages = committed, "committed dirty pages");
        }
        Ok(committed)
    }

    pub fn dirty_pages(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter(|p| p.is_dirty())
            .map(|p| p.index())
            .collect()
    }

    // ---------- repack ----------

    /// Repacks every page. Stops at the first page that fails; pages repacked before it stay repacked.
    #[instrument(skip_all)]
    pub fn repack(&mut self) -> Result<()> {
        for index in 0..self.pages.len() {
            self.repack_page_inner(index)?;
        }
        if self.settings.auto_commit {
            self.commit_dirty_pages()?;
        }
        Ok(())
    }

    /// Re-places every entry of `page` in descending area order.
    ///
    /// Placements are computed on a scratch packer first; on failure the page is left untouched
    /// and `InternalPlacementFailure` is returned.
    pub fn repack_page(&mut self, page: usize) -> Result<()> {
        self.repack_page_inner(page)?;
        if self.settings.auto_commit {
            self.commit_dirty_pages()?;
        }
        Ok(())
    }

    fn repack_page_inner(&mut self, index: usize) -> Result<()> {
        let page = self
            .pages
            .get(index)
            .ok_or_else(|| AtlasError::InvalidInput(format!("no page {}", index)))?;
        let mut order: Vec<(EntryId, Rect)> = page
            .entry_ids()
            .filter_map(|id| self.entries.get(&id).map(|e| (id, e.rect)))
            .collect();
        sort_for_placement(&mut order, |(id, r)| (r.w, r.h, id.0));

        // compute
        let mut scratch = page.scratch_packer();
        let mut moves: Vec<(EntryId, Rect, Rect)> = Vec::with_capacity(order.len());
        for (id, old) in &order {
            match scratch.try_place(old.w, old.h) {
                Some(new_rect) => moves.push((*id, *old, new_rect)),
                None => {
                    warn!(page = index, entry = %id, "repack could not re-place entry");
                    return Err(AtlasError::InternalPlacementFailure {
                        page: index,
                        entry: *id,
                    });
                }
            }
        }

        // move pixels: read everything before overwriting anything
        let handle = page.surface();
        let size = page.size();
        let any_moved = moves.iter().any(|(_, old, new)| old != new);
        if any_moved {
            if !self.surface.is_readable() {
                return Err(AtlasError::Surface(
                    "repack needs a readable surface to move pixels".into(),
                ));
            }
            let mut blocks = Vec::with_capacity(moves.len());
            for (_, old, _) in &moves {
                blocks.push(self.surface.read_pixels(handle, *old)?);
            }
            for (_, old, _) in &moves {
                self.surface.clear_pixels(handle, *old)?;
            }
            for ((_, _, new), block) in moves.iter().zip(blocks.iter()) {
                self.surface.write_pixels(handle, *new, block)?;
            }
        }

        // apply
        self.pages[index].install_packer(scratch);
        for (id, _, new) in &moves {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.relocate(*new, index, size);
                let version = entry.version;
                self.events.emit(AtlasEvent::EntryChanged { id: *id, version });
            }
        }
        debug!(page = index, entries = moves.len(), "repacked page");
        Ok(())
    }

    // ---------- placement core ----------

    fn finish_single(&mut self) -> Result<()> {
        if self.settings.auto_commit {
            self.commit_dirty_pages()?;
        }
        Ok(())
    }

    /// Removes the entry called `name` if one exists, returning its sprite metadata.
    pub(crate) fn evict_name(&mut self, name: &str) -> Result<Option<SpriteMeta>> {
        match self.by_name.get(name).copied() {
            Some(id) => Ok(Some(self.remove(id)?.meta)),
            None => Ok(None),
        }
    }

    pub(crate) fn check_size(&self, w: u32, h: u32) -> Result<()> {
        if w == 0 || h == 0 {
            return Err(AtlasError::InvalidInput(format!(
                "image dimensions must be non-zero, got {}x{}",
                w, h
            )));
        }
        let (pw, ph) = padded(w, h, self.settings.padding);
        if pw > self.settings.max_size || ph > self.settings.max_size {
            return Err(AtlasError::TooLarge {
                width: pw,
                height: ph,
                max_size: self.settings.max_size,
            });
        }
        Ok(())
    }

    /// Single-item placement path shared by `add`, `reserve` and batches. Does not commit.
    pub(crate) fn place(
        &mut self,
        name: Option<String>,
        w: u32,
        h: u32,
        pixels: Option<&RgbaImage>,
        meta: SpriteMeta,
    ) -> Result<EntryId> {
        self.check_size(w, h)?;
        if self.settings.enable_name_index {
            if let Some(n) = &name {
                if self.by_name.contains_key(n) {
                    return Err(AtlasError::InvalidInput(format!(
                        "name '{}' is already in use",
                        n
                    )));
                }
            }
        }
        let (page, placement) = self.locate(w, h)?;
        self.apply(page, placement, name, pixels, meta)
    }

    /// Commits exactly one proposal: writes pixels, updates page state and indices.
    pub(crate) fn apply(
        &mut self,
        page: usize,
        placement: Placement,
        name: Option<String>,
        pixels: Option<&RgbaImage>,
        meta: SpriteMeta,
    ) -> Result<EntryId> {
        let id = EntryId(self.next_id);
        let handle = self.pages[page].surface();
        if let Some(img) = pixels {
            self.surface.write_pixels(handle, placement.rect, img)?;
        }
        if !self.pages[page].commit(id, &placement) {
            return Err(AtlasError::InternalPlacementFailure { page, entry: id });
        }
        self.next_id += 1;
        let size = self.pages[page].size();
        if self.settings.enable_name_index {
            if let Some(n) = &name {
                self.by_name.insert(n.clone(), id);
            }
        }
        let entry = Entry::new(id, name, placement.rect, page, size, meta);
        trace!(entry = %id, page, rect = ?entry.rect, "placed");
        self.entries.insert(id, entry);
        self.current_page = page;
        self.events.emit(AtlasEvent::EntryAdded { id, page });
        Ok(id)
    }

    /// Finds a page for a `w x h` item: current page, other pages, repack, growth, new page.
    pub(crate) fn locate(&mut self, w: u32, h: u32) -> Result<(usize, Placement)> {
        if let Some(found) = self.propose_on_pages(w, h) {
            return Ok(found);
        }

        if self.settings.repack_on_add && self.surface.is_readable() {
            let fragmented: Vec<usize> = self
                .pages
                .iter()
                .filter(|p| p.is_fragmented())
                .map(|p| p.index())
                .collect();
            for index in fragmented {
                match self.repack_page_inner(index) {
                    Ok(()) => {}
                    Err(AtlasError::InternalPlacementFailure { entry, .. }) => {
                        debug!(page = index, %entry, "repack before add skipped");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
                if let Some(pl) = self.pages[index].propose(w, h) {
                    return Ok((index, pl));
                }
            }
        }

        if let Some(index) = self.current_index() {
            if let Some(pl) = self.grow_until_fits(index, w, h)? {
                return Ok((index, pl));
            }
        }

        if self.can_open_page() {
            let index = self.open_page(self.settings.initial_size, self.settings.initial_size)?;
            if let Some(pl) = self.pages[index].propose(w, h) {
                return Ok((index, pl));
            }
            if let Some(pl) = self.grow_until_fits(index, w, h)? {
                return Ok((index, pl));
            }
        }

        debug!(w, h, pages = self.pages.len(), "atlas full");
        Err(AtlasError::Full {
            width: w,
            height: h,
        })
    }

    fn current_index(&self) -> Option<usize> {
        if self.pages.is_empty() {
            None
        } else {
            Some(self.current_page.min(self.pages.len() - 1))
        }
    }

    /// Read-only search: the current page first, then the others in index order.
    fn propose_on_pages(&self, w: u32, h: u32) -> Option<(usize, Placement)> {
        let current = self.current_index()?;
        if let Some(pl) = self.pages[current].propose(w, h) {
            return Some((current, pl));
        }
        #[cfg(feature = "parallel")]
        {
            self.pages
                .par_iter()
                .enumerate()
                .filter(|(i, _)| *i != current)
                .find_map_first(|(i, p)| p.propose(w, h).map(|pl| (i, pl)))
        }
        #[cfg(not(feature = "parallel"))]
        {
            self.pages
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != current)
                .find_map(|(i, p)| p.propose(w, h).map(|pl| (i, pl)))
        }
    }

    fn grow_until_fits(&mut self, index: usize, w: u32, h: u32) -> Result<Option<Placement>> {
        while self.grow_page(index)? {
            if let Some(pl) = self.pages[index].propose(w, h) {
                return Ok(Some(pl));
            }
        }
        Ok(None)
    }

    fn can_open_page(&self) -> bool {
        match self.settings.page_cap() {
            None => true,
            Some(cap) => self.pages.len() < cap,
        }
    }

    pub(crate) fn open_page(&mut self, width: u32, height: u32) -> Result<usize> {
        let index = self.pages.len();
        let handle = self.surface.allocate_page(width, height)?;
        self.pages
            .push(Page::new(index, &self.settings, width, height, handle));
        debug!(page = index, width, height, "opened page");
        self.events.emit(AtlasEvent::PageCountChanged {
            count: self.pages.len(),
        });
        Ok(index)
    }

    /// Grows `index` one step. Returns false if it is already at `max_size`.
    pub fn grow_page(&mut self, index: usize) -> Result<bool> {
        let max = self.settings.max_size;
        let growth = self.settings.growth;
        let page = self
            .pages
            .get(index)
            .ok_or_else(|| AtlasError::InvalidInput(format!("no page {}", index)))?;
        if !page.can_grow(max) {
            return Ok(false);
        }
        let (w, h) = (growth.next(page.width(), max), growth.next(page.height(), max));
        let handle = page.surface();
        let ids: Vec<EntryId> = page.entry_ids().collect();
        self.surface.resize_page(handle, w, h)?;
        self.pages[index].grow(w, h);
        debug!(page = index, width = w, height = h, "grew page");
        for id in ids {
            if let Some(entry) = self.entries.get_mut(&id) {
                let rect = entry.rect;
                entry.relocate(rect, index, (w, h));
                let version = entry.version;
                self.events.emit(AtlasEvent::EntryChanged { id, version });
            }
        }
        self.events.emit(AtlasEvent::PageResized {
            page: index,
            width: w,
            height: h,
        });
        Ok(true)
    }
}

/// Sorts items by descending area, then descending longest side, then ascending sequence key.
pub(crate) fn sort_for_placement<T>(items: &mut [T], key: impl Fn(&T) -> (u32, u32, u64)) {
    items.sort_by(|a, b| {
        let (aw, ah, aseq) = key(a);
        let (bw, bh, bseq) = key(b);
        let area_a = (aw as u64) * (ah as u64);
        let area_b = (bw as u64) * (bh as u64);
        area_b
            .cmp(&area_a)
            .then_with(|| bw.max(bh).cmp(&aw.max(ah)))
            .then_with(|| aseq.cmp(&bseq))
    });
}
