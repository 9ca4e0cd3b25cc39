use super::{Packer, Placement, area_fit_score, merge_adjacent, padded};
use crate::config::Algorithm;
use crate::model::Rect;

/// Guillotine packer: best area fit, one straight cut per placement.
///
/// Free rectangles are pairwise disjoint. Adjacent free rectangles sharing a full edge are
/// merged on every `remove`/`resize`, and after a placement once the free list grows past
/// `merge_threshold`.
#[derive(Clone)]
pub struct GuillotinePacker {
    width: u32,
    height: u32,
    padding: u32,
    merge_threshold: usize,
    free: Vec<Rect>,
    used: Vec<Rect>,
    used_area: u64,
}

impl GuillotinePacker {
    pub fn new(width: u32, height: u32, padding: u32, merge_threshold: usize) -> Self {
        Self {
            width,
            height,
            padding,
            merge_threshold,
            free: vec![Rect::new(0, 0, width, height)],
            used: Vec::new(),
            used_area: 0,
        }
    }

    fn choose(&self, w: u32, h: u32) -> Option<(usize, Rect)> {
        let mut best: Option<(usize, Rect)> = None;
        let mut best_score = (u64::MAX, u32::MAX);
        for (i, fr) in self.free.iter().enumerate() {
            if fr.w >= w && fr.h >= h {
                let s = area_fit_score(fr, w, h);
                if s < best_score {
                    best_score = s;
                    best = Some((i, Rect::new(fr.x, fr.y, w, h)));
                }
            }
        }
        best
    }

    /// Cuts `fr` around `placed` (anchored top-left) into a bottom and a right piece.
    /// The axis is chosen so the larger of the two pieces is as small as possible.
    fn split(fr: &Rect, placed: &Rect) -> (Option<Rect>, Option<Rect>) {
        let w_right = fr.right() - placed.right();
        let h_bottom = fr.bottom() - placed.bottom();

        let horizontal_max = ((fr.w as u64) * h_bottom as u64).max((w_right as u64) * placed.h as u64);
        let vertical_max = ((placed.w as u64) * h_bottom as u64).max((w_right as u64) * fr.h as u64);
        let split_horizontal = horizontal_max <= vertical_max;

        let (bottom, right) = if split_horizontal {
            (
                Rect::new(fr.x, placed.bottom(), fr.w, h_bottom),
                Rect::new(placed.right(), fr.y, w_right, placed.h),
            )
        } else {
            (
                Rect::new(fr.x, placed.bottom(), placed.w, h_bottom),
                Rect::new(placed.right(), fr.y, w_right, fr.h),
            )
        };
        (
            (!bottom.is_empty()).then_some(bottom),
            (!right.is_empty()).then_some(right),
        )
    }

    pub fn free_list_len(&self) -> usize {
        self.free.len()
    }
}

impl Packer for GuillotinePacker {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Guillotine
    }

    fn initialize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height, self.padding, self.merge_threshold);
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn padding(&self) -> u32 {
        self.padding
    }

    fn propose(&self, w: u32, h: u32) -> Option<Placement> {
        let (pw, ph) = padded(w, h, self.padding);
        self.choose(pw, ph)
            .map(|(idx, slot)| Placement::new(slot, self.padding, idx))
    }

    fn commit(&mut self, placement: &Placement) -> bool {
        let slot = placement.slot;
        let anchored = |fr: &Rect| fr.x == slot.x && fr.y == slot.y && fr.contains(&slot);
        let idx = match self.free.get(placement.hint) {
            Some(fr) if anchored(fr) => placement.hint,
            _ => match self.free.iter().position(anchored) {
                Some(i) => i,
                None => return false,
            },
        };
        let fr = self.free.swap_remove(idx);
        let (a, b) = Self::split(&fr, &slot);
        self.free.extend(a);
        self.free.extend(b);
        if self.free.len() > self.merge_threshold {
            merge_adjacent(&mut self.free);
        }
        self.used.push(slot);
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
        merge_adjacent(&mut self.free);
        true
    }

    fn resize(&mut self, width: u32, height: u32) {
        let (old_w, old_h) = (self.width, self.height);
        if width < old_w || height < old_h {
            return;
        }
        if width > old_w {
            self.free.push(Rect::new(old_w, 0, width - old_w, old_h));
        }
        if height > old_h {
            self.free.push(Rect::new(0, old_h, width, height - old_h));
        }
        self.width = width;
        self.height = height;
        merge_adjacent(&mut self.free);
    }

    fn used_area(&self) -> u64 {
        self.used_area
    }

    fn box_clone(&self) -> Box<dyn Packer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packer::test_util::{assert_disjoint, assert_inside};

    #[test]
    fn single_cut_minimizes_larger_piece() {
        // Placing 10x90 in 100x100: a vertical cut leaves a 90x100 right piece, a horizontal
        // cut leaves a 100x10 bottom piece and a 90x90 right piece. Horizontal wins.
        let (bottom, right) = GuillotinePacker::split(&Rect::new(0, 0, 100, 100), &Rect::new(0, 0, 10, 90));
        assert_eq!(bottom, Some(Rect::new(0, 90, 100, 10)));
        assert_eq!(right, Some(Rect::new(10, 0, 90, 90)));
    }

    #[test]
    fn free_rects_stay_disjoint() {
        let mut p = GuillotinePacker::new(128, 128, 0, 4);
        for i in 0..40u32 {
            p.try_place(5 + i % 13, 7 + i % 11);
            let free = p.free.clone();
            assert_disjoint(&free);
            for u in &p.used {
                assert!(free.iter().all(|f| !f.intersects(u)));
            }
        }
    }

    #[test]
    fn remove_merges_back_to_full_page() {
        let mut p = GuillotinePacker::new(64, 64, 0, 1000);
        let a = p.try_place(32, 64).unwrap();
        let b = p.try_place(32, 64).unwrap();
        assert!(p.remove(&a));
        assert!(p.remove(&b));
        assert_eq!(p.free_list_len(), 1);
        assert_eq!(p.try_place(64, 64), Some(Rect::new(0, 0, 64, 64)));
    }

    #[test]
    fn resize_adds_disjoint_strips() {
        let mut p = GuillotinePacker::new(32, 32, 1, 16);
        let a = p.try_place(30, 30).unwrap();
        p.resize(64, 64);
        let mut slots = vec![a.expand(1)];
        while let Some(r) = p.try_place(30, 30) {
            slots.push(r.expand(1));
        }
        assert_eq!(slots.len(), 4);
        assert_disjoint(&slots);
        assert_inside(&p, &slots);
    }
}
