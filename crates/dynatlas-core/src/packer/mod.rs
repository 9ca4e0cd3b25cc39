use crate::config::{Algorithm, AtlasSettings};
use crate::model::Rect;

pub mod guillotine;
pub mod maxrects;
pub mod shelf;
pub mod skyline;

pub use guillotine::GuillotinePacker;
pub use maxrects::MaxRectsPacker;
pub use shelf::ShelfPacker;
pub use skyline::SkylinePacker;

/// A candidate placement computed without touching free-space state.
///
/// `slot` is the padded area reserved on the page; `rect` is the inner rectangle handed to callers.
/// `hint` is an algorithm-specific index (free rect, skyline segment or shelf) used by `commit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub slot: Rect,
    pub rect: Rect,
    pub(crate) hint: usize,
}

impl Placement {
    pub(crate) fn new(slot: Rect, padding: u32, hint: usize) -> Self {
        Self {
            slot,
            rect: slot.inset(padding),
            hint,
        }
    }
}

/// A packer places rectangles into a single page.
///
/// Implementations must ensure no overlaps and reserve `padding` on every side of each rectangle.
/// `propose` is read-only; `commit` is the only path that mutates free space and consumes one
/// proposal exactly once. A stale proposal makes `commit` return false.
pub trait Packer: Send + Sync {
    fn algorithm(&self) -> Algorithm;
    /// Resets to an empty page of the given size.
    fn initialize(&mut self, width: u32, height: u32);
    fn size(&self) -> (u32, u32);
    fn padding(&self) -> u32;
    fn propose(&self, w: u32, h: u32) -> Option<Placement>;
    fn commit(&mut self, placement: &Placement) -> bool;
    /// Returns freed space for an inner rect previously returned by this packer.
    /// Returns false when the algorithm cannot reclaim arbitrary holes.
    fn remove(&mut self, rect: &Rect) -> bool;
    /// Grows the page in place. Existing placements are preserved.
    fn resize(&mut self, width: u32, height: u32);
    /// Sum of inner rect areas currently placed.
    fn used_area(&self) -> u64;
    fn supports_remove(&self) -> bool {
        true
    }
    fn box_clone(&self) -> Box<dyn Packer>;

    fn clear(&mut self) {
        let (w, h) = self.size();
        self.initialize(w, h);
    }

    fn try_place(&mut self, w: u32, h: u32) -> Option<Rect> {
        let placement = self.propose(w, h)?;
        if self.commit(&placement) {
            Some(placement.rect)
        } else {
            None
        }
    }

    fn fill_ratio(&self) -> f64 {
        let (w, h) = self.size();
        let total = (w as u64) * (h as u64);
        if total == 0 {
            0.0
        } else {
            self.used_area() as f64 / total as f64
        }
    }
}

impl Clone for Box<dyn Packer> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Creates the packer selected by `settings.algorithm` for a `width x height` page.
pub fn new_packer(settings: &AtlasSettings, width: u32, height: u32) -> Box<dyn Packer> {
    let pad = settings.padding;
    match settings.algorithm {
        Algorithm::BestFitMerge => Box::new(MaxRectsPacker::new(width, height, pad)),
        Algorithm::Skyline => Box::new(SkylinePacker::new(width, height, pad)),
        Algorithm::Guillotine => Box::new(GuillotinePacker::new(
            width,
            height,
            pad,
            settings.guillotine_merge_threshold,
        )),
        Algorithm::Shelf => Box::new(ShelfPacker::new(width, height, pad)),
    }
}

/// Padded slot size for an inner `w x h` request. Saturates at `u32::MAX`.
#[inline]
pub(crate) fn padded(w: u32, h: u32, padding: u32) -> (u32, u32) {
    let pad = padding.saturating_mul(2);
    (w.saturating_add(pad), h.saturating_add(pad))
}

/// Removes every rectangle fully contained in another one.
pub(crate) fn prune_contained(free: &mut Vec<Rect>) {
    let mut i = 0;
    while i < free.len() {
        let mut j = i + 1;
        let a = free[i];
        let mut remove_i = false;
        while j < free.len() {
            let b = free[j];
            if b.contains(&a) {
                remove_i = true;
                break;
            }
            if a.contains(&b) {
                free.remove(j);
                continue;
            }
            j += 1;
        }
        if remove_i {
            free.remove(i);
        } else {
            i += 1;
        }
    }
}

/// Merges pairs of rectangles that share one full edge, until no pair remains.
pub(crate) fn merge_adjacent(free: &mut Vec<Rect>) {
    let mut merged = true;
    while merged {
        merged = false;
        'outer: for i in 0..free.len() {
            for j in i + 1..free.len() {
                let a = free[i];
                let b = free[j];
                // horizontal merge (same y, height, contiguous in x)
                if a.y == b.y && a.h == b.h {
                    if a.right() == b.x {
                        free[i] = Rect::new(a.x, a.y, a.w + b.w, a.h);
                        free.remove(j);
                        merged = true;
                        break 'outer;
                    } else if b.right() == a.x {
                        free[i] = Rect::new(b.x, a.y, a.w + b.w, a.h);
                        free.remove(j);
                        merged = true;
                        break 'outer;
                    }
                }
                // vertical merge (same x, width, contiguous in y)
                if a.x == b.x && a.w == b.w {
                    if a.bottom() == b.y {
                        free[i] = Rect::new(a.x, a.y, a.w, a.h + b.h);
                        free.remove(j);
                        merged = true;
                        break 'outer;
                    } else if b.bottom() == a.y {
                        free[i] = Rect::new(a.x, b.y, a.w, a.h + b.h);
                        free.remove(j);
                        merged = true;
                        break 'outer;
                    }
                }
            }
        }
    }
}

/// Best-area-fit score: leftover area first, then the shorter leftover side.
#[inline]
pub(crate) fn area_fit_score(fr: &Rect, w: u32, h: u32) -> (u64, u32) {
    let leftover_area = fr.area() - (w as u64) * (h as u64);
    let short_side = (fr.w - w).min(fr.h - h);
    (leftover_area, short_side)
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::Packer;
    use crate::model::Rect;

    pub fn assert_disjoint(rects: &[Rect]) {
        for i in 0..rects.len() {
            for j in (i + 1)..rects.len() {
                assert!(
                    !rects[i].intersects(&rects[j]),
                    "overlap: {:?} vs {:?}",
                    rects[i],
                    rects[j]
                );
            }
        }
    }

    pub fn assert_inside(p: &dyn Packer, rects: &[Rect]) {
        let (w, h) = p.size();
        let page = Rect::new(0, 0, w, h);
        for r in rects {
            assert!(page.contains(r), "{:?} outside {}x{}", r, w, h);
        }
    }
}
