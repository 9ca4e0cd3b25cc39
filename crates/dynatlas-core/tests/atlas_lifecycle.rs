use dynatlas_core::prelude::*;
use image::{Rgba, RgbaImage};

fn solid(w: u32, h: u32, c: u8) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([c, c, c, 255]))
}

fn single_page(size: u32, padding: u32) -> AtlasSettings {
    AtlasSettings::builder()
        .fixed_size(size)
        .padding(padding)
        .max_page_count(0)
        .build()
}

#[test]
fn fill_ratio_and_full_on_fixed_page() {
    let mut atlas = Atlas::in_memory(single_page(256, 2)).expect("atlas");
    for name in ["a", "b", "c"] {
        let e = atlas.add(Some(name), &solid(100, 100, 10)).expect("add");
        assert_eq!(e.page, 0);
        assert_eq!((e.width(), e.height()), (100, 100));
    }
    let fill = atlas.fill_ratio(0).unwrap();
    assert!((fill - 30_000.0 / 65_536.0).abs() < 1e-9, "fill {fill}");

    // 104px padded slots: a 2x2 grid fits, a fifth does not.
    atlas.add(Some("d"), &solid(100, 100, 20)).expect("fourth fits");
    let err = atlas.add(Some("e"), &solid(100, 100, 30)).unwrap_err();
    assert!(matches!(err, AtlasError::Full { .. }), "{err}");
    assert_eq!(err.status(), PlaceStatus::Full);
    assert_eq!(atlas.page_count(), 1);
    assert_eq!(atlas.entry_count(), 4);
}

#[test]
fn oversized_image_is_too_large() {
    let mut atlas = Atlas::in_memory(single_page(64, 1)).expect("atlas");
    let err = atlas.add(Some("big"), &solid(100, 100, 1)).unwrap_err();
    assert!(matches!(err, AtlasError::TooLarge { max_size: 64, .. }), "{err}");
    assert_eq!(atlas.page_count(), 0);

    // Padding counts towards the limit.
    let err = atlas.reserve(None, 63, 10).unwrap_err();
    assert_eq!(err.status(), PlaceStatus::TooLarge);
    atlas.reserve(None, 62, 10).expect("62 + 2 padding fits");
}

#[test]
fn dimensions_near_u32_max_are_too_large() {
    let mut atlas = Atlas::in_memory(single_page(64, 1)).expect("atlas");
    for (w, h) in [(u32::MAX, 1), (1, u32::MAX), (u32::MAX - 1, u32::MAX)] {
        let err = atlas.reserve(None, w, h).unwrap_err();
        assert_eq!(err.status(), PlaceStatus::TooLarge, "{w}x{h}");
    }
    assert_eq!(atlas.entry_count(), 0);
}

#[test]
fn zero_sized_input_rejected() {
    let mut atlas = Atlas::in_memory(AtlasSettings::default()).unwrap();
    let err = atlas.reserve(Some("z"), 0, 8).unwrap_err();
    assert_eq!(err.status(), PlaceStatus::InvalidInput);
    assert!(!atlas.contains_name("z"));
}

#[test]
fn uv_matches_rect_and_page_size() {
    let settings = AtlasSettings::builder()
        .initial_size(128)
        .max_size(512)
        .padding(1)
        .build();
    let mut atlas = Atlas::in_memory(settings).unwrap();
    for i in 0..30 {
        atlas
            .reserve(Some(format!("r{i}").as_str()), 10 + i * 3, 12 + (i * 7) % 40)
            .expect("reserve");
    }
    for e in atlas.entries() {
        let (pw, ph) = atlas.page(e.page).unwrap().size();
        assert_eq!(e.uv, Uv::from_rect(&e.rect, pw, ph));
        assert!(e.rect.right() <= pw && e.rect.bottom() <= ph);
    }
}

#[test]
fn growth_bumps_versions_and_rescales_uvs() {
    let settings = AtlasSettings::builder()
        .initial_size(64)
        .max_size(256)
        .padding(0)
        .build();
    let mut atlas = Atlas::in_memory(settings).unwrap();
    let first = atlas.add(Some("first"), &solid(60, 60, 1)).unwrap();
    assert_eq!(first.version, 1);
    assert_eq!(atlas.page(0).unwrap().size(), (64, 64));

    let second = atlas.add(Some("second"), &solid(60, 60, 2)).unwrap();
    assert_eq!(atlas.page_count(), 1);
    assert_eq!(atlas.page(0).unwrap().size(), (128, 128));
    assert_eq!(second.page, 0);

    let moved = atlas.entry(first.id).unwrap();
    assert_eq!(moved.rect, first.rect);
    assert_eq!(moved.version, 2);
    assert!((moved.uv.u1 - first.rect.right() as f32 / 128.0).abs() < f32::EPSILON);

    // Pixels survive the surface resize.
    let handle = atlas.page(0).unwrap().surface();
    let img = atlas.surface().image(handle).unwrap();
    assert_eq!(img.dimensions(), (128, 128));
    assert_eq!(img.get_pixel(first.rect.x, first.rect.y), &Rgba([1, 1, 1, 255]));
}

#[test]
fn new_page_opens_when_growth_is_exhausted() {
    let settings = AtlasSettings::builder()
        .fixed_size(64)
        .padding(0)
        .max_page_count(2)
        .build();
    let mut atlas = Atlas::in_memory(settings).unwrap();
    let a = atlas.reserve(Some("a"), 64, 64).unwrap();
    let b = atlas.reserve(Some("b"), 64, 64).unwrap();
    assert_eq!((a.page, b.page), (0, 1));
    let err = atlas.reserve(Some("c"), 8, 8).unwrap_err();
    assert!(err.is_capacity());

    atlas.set_max_page_count(-1);
    let c = atlas.reserve(Some("c"), 8, 8).unwrap();
    assert_eq!(c.page, 2);
}

#[test]
fn remove_invalidates_and_never_reuses_ids() {
    let mut atlas = Atlas::in_memory(AtlasSettings::default()).unwrap();
    let a = atlas.add(Some("a"), &solid(16, 16, 200)).unwrap();
    let removed = atlas.remove(a.id).unwrap();
    assert!(!removed.valid);
    assert!(!atlas.contains(a.id));
    assert!(!atlas.contains_name("a"));
    assert!(matches!(atlas.remove(a.id), Err(AtlasError::UnknownEntry(_))));

    // The freed area is cleared on the surface.
    let handle = atlas.page(0).unwrap().surface();
    let img = atlas.surface().image(handle).unwrap();
    assert_eq!(img.get_pixel(a.rect.x, a.rect.y)[3], 0);

    let again = atlas.add(Some("a"), &solid(16, 16, 100)).unwrap();
    assert!(again.id > a.id);
}

#[test]
fn duplicate_name_is_rejected_by_add() {
    let mut atlas = Atlas::in_memory(AtlasSettings::default()).unwrap();
    atlas.reserve(Some("dup"), 8, 8).unwrap();
    let err = atlas.reserve(Some("dup"), 8, 8).unwrap_err();
    assert_eq!(err.status(), PlaceStatus::InvalidInput);
    assert_eq!(atlas.entry_count(), 1);
}

#[test]
fn replace_keeps_meta_and_fails_cleanly_when_full() {
    let mut atlas = Atlas::in_memory(single_page(64, 0)).unwrap();
    let meta = SpriteMeta::default().with_pivot(0.0, 1.0).with_border([1, 2, 3, 4]);
    atlas
        .add_with_meta(Some("a"), &solid(32, 64, 1), meta)
        .unwrap();
    atlas.add(Some("b"), &solid(32, 64, 2)).unwrap();

    let swapped = atlas.replace("b", &solid(30, 60, 3)).unwrap();
    assert_eq!(swapped.name.as_deref(), Some("b"));
    assert_eq!((swapped.width(), swapped.height()), (30, 60));

    let replaced = atlas.replace("a", &solid(32, 32, 4)).unwrap();
    assert_eq!(replaced.meta, meta);

    // The old entry is gone even though the new image does not fit.
    let err = atlas.replace("a", &solid(48, 48, 5)).unwrap_err();
    assert!(matches!(err, AtlasError::Full { .. }), "{err}");
    assert!(!atlas.contains_name("a"));
    assert!(atlas.contains_name("b"));
}

#[test]
fn sync_reports_entry_status() {
    let settings = AtlasSettings::builder()
        .initial_size(32)
        .max_size(128)
        .padding(0)
        .build();
    let mut atlas = Atlas::in_memory(settings).unwrap();
    let mut held = atlas.reserve(Some("held"), 30, 30).unwrap();
    assert_eq!(atlas.sync(&mut held), EntryStatus::Unchanged);

    atlas.reserve(Some("other"), 30, 30).unwrap(); // forces growth
    assert_eq!(atlas.sync(&mut held), EntryStatus::Updated);
    assert_eq!(held.version, 2);
    assert_eq!(held.uv, Uv::from_rect(&held.rect, 64, 64));

    atlas.remove_by_name("held").unwrap();
    assert_eq!(atlas.sync(&mut held), EntryStatus::Removed);
    assert!(!held.valid);
}

#[test]
fn clear_and_clear_page() {
    let settings = AtlasSettings::builder().fixed_size(64).padding(0).build();
    let mut atlas = Atlas::in_memory(settings).unwrap();
    atlas.reserve(Some("p0"), 64, 64).unwrap();
    let on_second = atlas.reserve(Some("p1"), 32, 32).unwrap();
    atlas.reserve(Some("p1b"), 32, 32).unwrap();
    assert_eq!(atlas.page_count(), 2);

    assert_eq!(atlas.clear_page(1).unwrap(), 2);
    assert_eq!(atlas.page_count(), 2);
    assert_eq!(atlas.page(1).unwrap().entry_count(), 0);
    assert!(!atlas.contains(on_second.id));
    assert_eq!(atlas.names(), vec!["p0"]);

    atlas.clear();
    assert_eq!(atlas.page_count(), 0);
    assert_eq!(atlas.entry_count(), 0);
    assert_eq!(atlas.surface().surface_count(), 0);
    let fresh = atlas.reserve(Some("p0"), 8, 8).unwrap();
    assert!(fresh.id > on_second.id);
}

#[test]
fn manual_commit_when_auto_commit_is_off() {
    let settings = AtlasSettings::builder().auto_commit(false).build();
    let mut atlas = Atlas::in_memory(settings).unwrap();
    atlas.add(Some("a"), &solid(8, 8, 1)).unwrap();
    atlas.add(Some("b"), &solid(8, 8, 2)).unwrap();
    assert_eq!(atlas.surface().total_commits(), 0);
    assert_eq!(atlas.dirty_pages(), vec![0]);
    let handle = atlas.page(0).unwrap().surface();
    assert_eq!(atlas.surface().pending_regions(handle).len(), 2);

    assert_eq!(atlas.commit_dirty_pages().unwrap(), 1);
    assert_eq!(atlas.commit_dirty_pages().unwrap(), 0);
    assert_eq!(atlas.surface().commit_count(handle), 1);
    assert!(atlas.surface().pending_regions(handle).is_empty());
}

#[test]
fn stats_summarize_pages() {
    let mut atlas = Atlas::in_memory(single_page(128, 0)).unwrap();
    atlas.reserve(None, 64, 64).unwrap();
    atlas.reserve(None, 64, 64).unwrap();
    let stats = atlas.stats();
    assert_eq!(stats.num_pages, 1);
    assert_eq!(stats.num_entries, 2);
    assert_eq!(stats.used_area, 2 * 64 * 64);
    assert!((stats.occupancy - 0.5).abs() < 1e-9);
    assert!(stats.summary().starts_with("Pages: 1, Entries: 2"));
}

#[test]
fn invalid_settings_rejected_at_construction() {
    let bad = [
        AtlasSettings::builder().initial_size(0).build(),
        AtlasSettings::builder().initial_size(512).max_size(256).build(),
        AtlasSettings::builder().fixed_size(8).padding(4).build(),
        AtlasSettings::builder()
            .growth(GrowthStrategy::Linear(0))
            .build(),
    ];
    for settings in bad {
        let err = Atlas::in_memory(settings).err().expect("should fail");
        assert!(matches!(err, AtlasError::InvalidConfig(_)), "{err}");
    }
}
