use super::{Packer, Placement, padded};
use crate::config::Algorithm;
use crate::model::Rect;

const NEW_SHELF: usize = usize::MAX;

#[derive(Clone, Debug)]
struct Shelf {
    y: u32,
    h: u32,
    /// Free horizontal spans `(x, w)`, sorted by x and never adjacent.
    spans: Vec<(u32, u32)>,
}

impl Shelf {
    fn used_width(&self, page_w: u32) -> u32 {
        page_w - self.spans.iter().map(|(_, w)| *w).sum::<u32>()
    }

    fn find_span(&self, w: u32) -> Option<u32> {
        self.spans.iter().find(|(_, sw)| *sw >= w).map(|(sx, _)| *sx)
    }
}

/// Shelf packer: best height fit over open shelves, new shelves stack downwards.
#[derive(Clone)]
pub struct ShelfPacker {
    width: u32,
    height: u32,
    padding: u32,
    shelves: Vec<Shelf>,
    next_y: u32,
    used: Vec<Rect>,
    used_area: u64,
}

impl ShelfPacker {
    pub fn new(width: u32, height: u32, padding: u32) -> Self {
        Self {
            width,
            height,
            padding,
            shelves: Vec::new(),
            next_y: 0,
            used: Vec::new(),
            used_area: 0,
        }
    }

    fn choose(&self, w: u32, h: u32) -> Option<(usize, Rect)> {
        let mut best: Option<(usize, Rect)> = None;
        let mut best_waste = u32::MAX;
        for (i, sh) in self.shelves.iter().enumerate() {
            if h > sh.h || sh.h - h >= best_waste {
                continue;
            }
            if let Some(x) = sh.find_span(w) {
                best_waste = sh.h - h;
                best = Some((i, Rect::new(x, sh.y, w, h)));
            }
        }
        if best.is_some() {
            return best;
        }
        if w <= self.width && self.next_y + h <= self.height {
            return Some((NEW_SHELF, Rect::new(0, self.next_y, w, h)));
        }
        None
    }

    pub fn shelf_count(&self) -> usize {
        self.shelves.len()
    }

    /// Used width per shelf, top to bottom.
    pub fn shelf_usage(&self) -> Vec<(u32, u32, u32)> {
        self.shelves
            .iter()
            .map(|s| (s.y, s.h, s.used_width(self.width)))
            .collect()
    }

    /// Closes empty shelves at the bottom of the stack so their height can be reused.
    fn close_trailing_shelves(&mut self) {
        while let Some(last) = self.shelves.last() {
            let empty = last.spans.len() == 1 && last.spans[0] == (0, self.width);
            if !empty || last.y + last.h != self.next_y {
                break;
            }
            self.next_y = last.y;
            self.shelves.pop();
        }
    }
}

fn consume(sh: &mut Shelf, slot: &Rect) -> bool {
    let Some(i) = sh
        .spans
        .iter()
        .position(|(sx, sw)| slot.x >= *sx && slot.right() <= sx + sw)
    else {
        return false;
    };
    let (sx, sw) = sh.spans.remove(i);
    let left_w = slot.x - sx;
    let right_w = (sx + sw) - slot.right();
    if right_w > 0 {
        sh.spans.insert(i, (slot.right(), right_w));
    }
    if left_w > 0 {
        sh.spans.insert(i, (sx, left_w));
    }
    true
}

fn release(sh: &mut Shelf, x: u32, w: u32) {
    sh.spans.push((x, w));
    sh.spans.sort_by_key(|(x, _)| *x);
    let mut out: Vec<(u32, u32)> = Vec::with_capacity(sh.spans.len());
    for (x, w) in sh.spans.drain(..) {
        if let Some((lx, lw)) = out.last_mut() {
            if *lx + *lw == x {
                *lw += w;
                continue;
            }
        }
        out.push((x, w));
    }
    sh.spans = out;
}

impl Packer for ShelfPacker {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Shelf
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
        if pw > self.width || ph > self.height {
            return None;
        }
        self.choose(pw, ph)
            .map(|(idx, slot)| Placement::new(slot, self.padding, idx))
    }

    fn commit(&mut self, placement: &Placement) -> bool {
        let slot = placement.slot;
        if placement.hint == NEW_SHELF {
            if slot.y != self.next_y || slot.right() > self.width || slot.bottom() > self.height {
                return false;
            }
            let mut sh = Shelf {
                y: slot.y,
                h: slot.h,
                spans: vec![(0, self.width)],
            };
            consume(&mut sh, &slot);
            self.shelves.push(sh);
            self.next_y = slot.bottom();
        } else {
            let Some(sh) = self
                .shelves
                .iter_mut()
                .find(|s| s.y == slot.y && s.h >= slot.h)
            else {
                return false;
            };
            if !consume(sh, &slot) {
                return false;
            }
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
        let Some(sh) = self.shelves.iter_mut().find(|s| s.y == slot.y) else {
            return false;
        };
        release(sh, slot.x, slot.w);
        self.used.swap_remove(idx);
        self.used_area = self.used_area.saturating_sub(rect.area());
        self.close_trailing_shelves();
        true
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width < self.width || height < self.height {
            return;
        }
        if width > self.width {
            let old_w = self.width;
            for sh in self.shelves.iter_mut() {
                release(sh, old_w, width - old_w);
            }
        }
        self.width = width;
        self.height = height;
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
    fn prefers_shelf_with_least_wasted_height() {
        let mut p = ShelfPacker::new(100, 100, 0);
        p.try_place(50, 30).unwrap();
        p.try_place(60, 10).unwrap(); // opens a second shelf at y=30
        assert_eq!(p.shelf_count(), 2);
        // 10px tall fits both shelves; the 10px shelf wastes nothing.
        let r = p.try_place(20, 10).unwrap();
        assert_eq!(r.y, 30);
        assert_eq!(p.shelf_usage()[1], (30, 10, 80));
    }

    #[test]
    fn fails_when_stack_exceeds_height() {
        let mut p = ShelfPacker::new(32, 32, 0);
        assert!(p.try_place(32, 20).is_some());
        assert!(p.try_place(32, 13).is_none());
        assert!(p.try_place(32, 12).is_some());
    }

    #[test]
    fn removal_frees_span_and_closes_trailing_shelf() {
        let mut p = ShelfPacker::new(64, 64, 0);
        let a = p.try_place(32, 16).unwrap();
        let b = p.try_place(32, 40).unwrap();
        assert_eq!(p.shelf_count(), 2);
        assert!(p.remove(&b));
        assert_eq!(p.shelf_count(), 1);
        assert!(p.remove(&a));
        assert_eq!(p.shelf_count(), 0);
        assert_eq!(p.try_place(64, 64), Some(Rect::new(0, 0, 64, 64)));
    }

    #[test]
    fn emptied_inner_shelf_stays_open_at_its_height() {
        let mut p = ShelfPacker::new(64, 64, 0);
        let a = p.try_place(64, 16).unwrap();
        p.try_place(64, 40).unwrap();
        assert!(p.remove(&a));
        assert_eq!(p.shelf_count(), 2);
        // a taller item cannot take over the 16px band
        assert!(p.try_place(8, 20).is_none());
        assert_eq!(p.try_place(64, 16), Some(Rect::new(0, 0, 64, 16)));
    }

    #[test]
    fn resize_widens_every_shelf() {
        let mut p = ShelfPacker::new(32, 64, 1);
        let a = p.try_place(30, 10).unwrap();
        p.resize(64, 64);
        let b = p.try_place(30, 10).unwrap();
        assert_eq!(b.y, a.y);
        let slots = [a.expand(1), b.expand(1)];
        assert_disjoint(&slots);
        assert_inside(&p, &slots);
    }
}
