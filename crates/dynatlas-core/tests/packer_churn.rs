use dynatlas_core::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn disjoint(rects: &[Rect]) -> bool {
    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if rects[i].intersects(&rects[j]) {
                return false;
            }
        }
    }
    true
}

fn settings_for(algorithm: Algorithm, padding: u32) -> AtlasSettings {
    AtlasSettings::builder()
        .algorithm(algorithm)
        .padding(padding)
        .build()
}

#[test]
fn packers_never_overlap_under_churn() {
    for algorithm in Algorithm::ALL {
        let padding = 2;
        let mut packer = new_packer(&settings_for(algorithm, padding), 512, 512);
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut live: Vec<Rect> = Vec::new();
        for step in 0..600 {
            if !live.is_empty() && rng.gen_bool(0.35) {
                let idx = rng.gen_range(0..live.len());
                let r = live.swap_remove(idx);
                let reclaimed = packer.remove(&r);
                assert_eq!(reclaimed, packer.supports_remove());
            } else {
                let w = rng.gen_range(4..=64);
                let h = rng.gen_range(4..=64);
                if let Some(r) = packer.try_place(w, h) {
                    assert_eq!((r.w, r.h), (w, h));
                    live.push(r);
                }
            }
            let slots: Vec<Rect> = live.iter().map(|r| r.expand(padding)).collect();
            assert!(disjoint(&slots), "{:?} overlap at step {}", algorithm, step);
            for s in &slots {
                assert!(s.right() <= 512 && s.bottom() <= 512, "{:?} out of bounds", algorithm);
            }
        }
        let live_area: u64 = live.iter().map(|r| r.area()).sum();
        if packer.supports_remove() {
            assert_eq!(packer.used_area(), live_area, "{:?}", algorithm);
        }
    }
}

#[test]
fn stale_proposal_is_rejected() {
    for algorithm in Algorithm::ALL {
        let mut packer = new_packer(&settings_for(algorithm, 0), 64, 64);
        let proposal = packer.propose(64, 32).expect("fits");
        // Proposing again does not consume anything.
        assert_eq!(packer.propose(64, 32), Some(proposal));
        assert!(packer.commit(&proposal));
        assert!(!packer.commit(&proposal), "{:?} committed twice", algorithm);
        assert_eq!(packer.used_area(), 64 * 32);
    }
}

#[test]
fn resize_preserves_placements() {
    for algorithm in Algorithm::ALL {
        let mut packer = new_packer(&settings_for(algorithm, 1), 64, 64);
        let a = packer.try_place(40, 40).expect("a");
        assert!(packer.try_place(40, 40).is_none());
        packer.resize(128, 128);
        assert_eq!(packer.size(), (128, 128));
        let b = packer.try_place(40, 40).expect("fits after resize");
        assert!(!a.expand(1).intersects(&b.expand(1)), "{:?}", algorithm);
    }
}

#[test]
fn skyline_does_not_reclaim_holes() {
    let mut packer = new_packer(&settings_for(Algorithm::Skyline, 0), 64, 64);
    let a = packer.try_place(64, 64).unwrap();
    assert!(!packer.supports_remove());
    assert!(!packer.remove(&a));
    assert!(packer.try_place(8, 8).is_none());
    packer.clear();
    assert!(packer.try_place(64, 64).is_some());
}

#[test]
fn atlas_entries_stay_disjoint_under_churn() {
    for algorithm in Algorithm::ALL {
        let settings = AtlasSettings::builder()
            .algorithm(algorithm)
            .initial_size(128)
            .max_size(256)
            .padding(1)
            .max_page_count(4)
            .repack_on_add(true)
            .build();
        let mut atlas = Atlas::in_memory(settings).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut ids: Vec<EntryId> = Vec::new();
        for _ in 0..400 {
            if !ids.is_empty() && rng.gen_bool(0.4) {
                let id = ids.swap_remove(rng.gen_range(0..ids.len()));
                atlas.remove(id).unwrap();
            } else {
                let w = rng.gen_range(2..=48);
                let h = rng.gen_range(2..=48);
                match atlas.reserve(None, w, h) {
                    Ok(e) => ids.push(e.id),
                    Err(e) => assert!(e.is_capacity(), "{:?}: {e}", algorithm),
                }
            }
        }
        assert_eq!(atlas.entry_count(), ids.len());
        for page in atlas.pages() {
            let slots: Vec<Rect> = page
                .entry_ids()
                .map(|id| atlas.entry(id).unwrap().rect.expand(1))
                .collect();
            assert!(disjoint(&slots), "{:?} page {}", algorithm, page.index());
            for s in &slots {
                assert!(s.right() <= page.width() && s.bottom() <= page.height());
            }
        }
    }
}
