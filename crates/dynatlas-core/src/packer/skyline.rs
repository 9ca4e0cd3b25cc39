use super::{Packer, Placement, padded};
use crate::config::Algorithm;
use crate::model::Rect;

/// One horizontal skyline segment: `w` pixels starting at `x`, occupied from the top down to `y`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SkylineNode {
    x: u32,
    y: u32,
    w: u32,
}

impl SkylineNode {
    #[inline]
    fn right(&self) -> u32 {
        self.x + self.w
    }
}

/// Skyline packer with the bottom-left heuristic.
///
/// Segment widths always sum to the page width. Space below the skyline that ends up
/// covered is not tracked, so `remove` is unsupported; a repack rebuilds the skyline.
#[derive(Clone)]
pub struct SkylinePacker {
    width: u32,
    height: u32,
    padding: u32,
    skylines: Vec<SkylineNode>,
    used_area: u64,
}

impl SkylinePacker {
    pub fn new(width: u32, height: u32, padding: u32) -> Self {
        Self {
            width,
            height,
            padding,
            skylines: vec![SkylineNode {
                x: 0,
                y: 0,
                w: width,
            }],
            used_area: 0,
        }
    }

    fn can_put(&self, mut i: usize, w: u32, h: u32) -> Option<Rect> {
        let x = self.skylines[i].x;
        if x + w > self.width {
            return None;
        }
        let mut rect = Rect::new(x, 0, w, h);
        let mut width_left = w;
        loop {
            rect.y = rect.y.max(self.skylines[i].y);
            if rect.bottom() > self.height {
                return None;
            }
            if self.skylines[i].w >= width_left {
                return Some(rect);
            }
            width_left -= self.skylines[i].w;
            i += 1;
            if i >= self.skylines.len() {
                return None;
            }
        }
    }

    fn find_bottom_left(&self, w: u32, h: u32) -> Option<(usize, Rect)> {
        let mut best_bottom = u32::MAX;
        let mut best_width = u32::MAX;
        let mut best: Option<(usize, Rect)> = None;
        for i in 0..self.skylines.len() {
            if let Some(r) = self.can_put(i, w, h) {
                if r.bottom() < best_bottom
                    || (r.bottom() == best_bottom && self.skylines[i].w < best_width)
                {
                    best_bottom = r.bottom();
                    best_width = self.skylines[i].w;
                    best = Some((i, r));
                }
            }
        }
        best
    }

    fn split(&mut self, index: usize, rect: &Rect) {
        self.skylines.insert(
            index,
            SkylineNode {
                x: rect.x,
                y: rect.bottom(),
                w: rect.w,
            },
        );

        let i = index + 1;
        while i < self.skylines.len() {
            let prev_right = self.skylines[i - 1].right();
            if self.skylines[i].x >= prev_right {
                break;
            }
            let shrink = prev_right - self.skylines[i].x;
            if self.skylines[i].w <= shrink {
                self.skylines.remove(i);
            } else {
                self.skylines[i].x += shrink;
                self.skylines[i].w -= shrink;
                break;
            }
        }
    }

    fn merge(&mut self) {
        let mut i = 1;
        while i < self.skylines.len() {
            if self.skylines[i - 1].y == self.skylines[i].y {
                let w = self.skylines[i].w;
                self.skylines[i - 1].w += w;
                self.skylines.remove(i);
            } else {
                i += 1;
            }
        }
    }

    pub fn segment_count(&self) -> usize {
        self.skylines.len()
    }
}

impl Packer for SkylinePacker {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Skyline
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
        self.find_bottom_left(pw, ph)
            .map(|(idx, slot)| Placement::new(slot, self.padding, idx))
    }

    fn commit(&mut self, placement: &Placement) -> bool {
        let slot = placement.slot;
        let fits_at = |i: usize| self.can_put(i, slot.w, slot.h) == Some(slot);
        let index = if placement.hint < self.skylines.len() && fits_at(placement.hint) {
            placement.hint
        } else {
            match (0..self.skylines.len()).find(|&i| self.skylines[i].x == slot.x && fits_at(i)) {
                Some(i) => i,
                None => return false,
            }
        };
        self.split(index, &slot);
        self.merge();
        self.used_area += placement.rect.area();
        true
    }

    fn remove(&mut self, _rect: &Rect) -> bool {
        false
    }

    fn supports_remove(&self) -> bool {
        false
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width < self.width || height < self.height {
            return;
        }
        if width > self.width {
            self.skylines.push(SkylineNode {
                x: self.width,
                y: 0,
                w: width - self.width,
            });
            self.merge();
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

    fn widths_sum(p: &SkylinePacker) -> u32 {
        p.skylines.iter().map(|s| s.w).sum()
    }

    #[test]
    fn fills_bottom_left_first() {
        let mut p = SkylinePacker::new(100, 100, 0);
        assert_eq!(p.try_place(40, 20), Some(Rect::new(0, 0, 40, 20)));
        assert_eq!(p.try_place(40, 10), Some(Rect::new(40, 0, 40, 10)));
        // 20px left on the first row; lowest placement for a 20x5 is next to the 10px item.
        assert_eq!(p.try_place(20, 5), Some(Rect::new(80, 0, 20, 5)));
        // A 60 wide item must span segments and sits below the tallest one it covers.
        let r = p.try_place(60, 10).unwrap();
        assert_eq!(r.y, 10);
        assert_eq!(widths_sum(&p), 100);
    }

    #[test]
    fn segments_merge_on_equal_height() {
        let mut p = SkylinePacker::new(64, 64, 0);
        p.try_place(32, 16).unwrap();
        p.try_place(32, 16).unwrap();
        assert_eq!(p.segment_count(), 1);
    }

    #[test]
    fn remove_is_unsupported() {
        let mut p = SkylinePacker::new(64, 64, 0);
        let r = p.try_place(10, 10).unwrap();
        assert!(!p.remove(&r));
        assert!(!p.supports_remove());
        p.clear();
        assert_eq!(p.used_area(), 0);
        assert_eq!(p.try_place(64, 64), Some(Rect::new(0, 0, 64, 64)));
    }

    #[test]
    fn resize_extends_skyline() {
        let mut p = SkylinePacker::new(32, 32, 1);
        let a = p.try_place(30, 30).unwrap();
        assert!(p.try_place(30, 30).is_none());
        p.resize(64, 64);
        let b = p.try_place(30, 30).unwrap();
        let c = p.try_place(30, 30).unwrap();
        assert_eq!(widths_sum(&p), 64);
        let slots: Vec<Rect> = [a, b, c].iter().map(|r| r.expand(1)).collect();
        assert_disjoint(&slots);
        assert_inside(&p, &slots);
    }

    #[test]
    fn many_items_stay_disjoint() {
        let mut p = SkylinePacker::new(256, 256, 2);
        let mut slots = Vec::new();
        for i in 0..120u32 {
            if let Some(r) = p.try_place(4 + (i * 13) % 23, 4 + (i * 5) % 29) {
                slots.push(r.expand(2));
            }
        }
        assert!(!slots.is_empty());
        assert_disjoint(&slots);
        assert_inside(&p, &slots);
        assert_eq!(widths_sum(&p), 256);
    }
}
