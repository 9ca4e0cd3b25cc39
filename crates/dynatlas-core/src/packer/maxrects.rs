use super::{Packer, Placement, area_fit_score, merge_adjacent, padded, prune_contained};
use crate::config::Algorithm;
use crate::model::Rect;

/// Best-fit merge packer (MaxRects free list, best area fit).
///
/// Free rectangles are maximal and may overlap each other; they never overlap a used slot.
#[derive(Clone)]
pub struct MaxRectsPacker {
    width: u32,
    height: u32,
    padding: u32,
    free: Vec<Rect>,
    used: Vec<Rect>,
    used_area: u64,
}

impl MaxRectsPacker {
    pub fn new(width: u32, height: u32, padding: u32) -> Self {
        Self {
            width,
            height,
            padding,
            free: vec![Rect::new(0, 0, width, height)],
            used: Vec::new(),
            used_area: 0,
        }
    }

    fn find_position(&self, w: u32, h: u32) -> Option<(usize, Rect)> {
        let mut best: Option<(usize, Rect)> = None;
        let mut best_score = (u64::MAX, u32::MAX);
        for (i, fr) in self.free.iter().enumerate() {
            if fr.w < w || fr.h < h {
                continue;
            }
            // perfect fit early-out
            if fr.w == w && fr.h == h {
                return Some((i, Rect::new(fr.x, fr.y, w, h)));
            }
            let score = area_fit_score(fr, w, h);
            if score < best_score {
                best_score = score;
                best = Some((i, Rect::new(fr.x, fr.y, w, h)));
            }
        }
        best
    }

    fn place_rect(&mut self, node: &Rect) {
        // split all free rectangles that intersect with node
        let mut new_free: Vec<Rect> = Vec::with_capacity(self.free.len() + 4);
        for fr in self.free.iter() {
            if !fr.intersects(node) {
                new_free.push(*fr);
                continue;
            }
            let ix1 = fr.x.max(node.x);
            let iy1 = fr.y.max(node.y);
            let ix2 = fr.right().min(node.right());
            let iy2 = fr.bottom().min(node.bottom());

            // above
            if iy1 > fr.y {
                new_free.push(Rect::new(fr.x, fr.y, fr.w, iy1 - fr.y));
            }
            // below
            if iy2 < fr.bottom() {
                new_free.push(Rect::new(fr.x, iy2, fr.w, fr.bottom() - iy2));
            }
            // left
            if ix1 > fr.x {
                new_free.push(Rect::new(fr.x, fr.y, ix1 - fr.x, fr.h));
            }
            // right
            if ix2 < fr.right() {
                new_free.push(Rect::new(ix2, fr.y, fr.right() - ix2, fr.h));
            }
        }
        self.free = new_free;
        prune_contained(&mut self.free);
        self.used.push(*node);
    }

    pub fn free_list_len(&self) -> usize {
        self.free.len()
    }
}

impl Packer for MaxRectsPacker {
    fn algorithm(&self) -> Algorithm {
        Algorithm::BestFitMerge
    }

    fn initialize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height, self.padding);
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn padding(&self) -> u32 {
        self.padding
    }

    fn propose(&self, w: u32, h: u32) -> Option<Placement> {
        let (pw, ph) = padded(w, h, self.padding);
        self.find_position(pw, ph)
            .map(|(idx, slot)| Placement::new(slot, self.padding, idx))
    }

    fn commit(&mut self, placement: &Placement) -> bool {
        let slot = placement.slot;
        let hinted = self
            .free
            .get(placement.hint)
            .is_some_and(|fr| fr.contains(&slot));
        if !hinted && !self.free.iter().any(|fr| fr.contains(&slot)) {
            return false;
        }
        self.place_rect(&slot);
        self.used_area += placement.rect.area();
        true
    }

    fn remove(&mut self, rect: &Rect) -> bool {
        let slot = rect.expand(self.padding);
        let Some(idx) = self.used.iter().position(|u| *u == slot) else {
            return false;
        };
        self.used.swap_remove(idx);
        self.used_area = self.used_area.saturating_sub(rect.area());
        self.free.push(slot);
        prune_contained(&mut self.free);
        merge_adjacent(&mut self.free);
        prune_contained(&mut self.free);
        true
    }

    fn resize(&mut self, width: u32, height: u32) {
        let (old_w, old_h) = (self.width, self.height);
        if width < old_w || height < old_h {
            return;
        }
        for fr in self.free.iter_mut() {
            if fr.right() == old_w {
                fr.w = width - fr.x;
            }
            if fr.bottom() == old_h {
                fr.h = height - fr.y;
            }
        }
        if width > old_w {
            self.free.push(Rect::new(old_w, 0, width - old_w, height));
        }
        if height > old_h {
            self.free.push(Rect::new(0, old_h, width, height - old_h));
        }
        self.width = width;
        self.height = height;
        prune_contained(&mut self.free);
    }

    fn used_area(&self) -> u64 {
        self.used_area
    }

    fn box_clone(&self) -> Box<dyn Packer> {
        Box::new(self.clone())
    }
}
