//! Tile provider integration tests.
//!
//! Tests verify:
//! - Back-to-front compositing with opacity, visibility and occlusion
//! - Memoization and dirty-driven refresh
//! - Progress reporting
//! - Timestamp-guarded updates under out-of-order replies

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use tilestack::data::ArraySource;
use tilestack::geometry::unbounded_rect;
use tilestack::layer::{Layer, LayerKind};

use super::test_utils::{
    assert_close, constant, pixel, region, volume, CountingSource, Scene, ScriptedSource,
};

// =============================================================================
// Compositing
// =============================================================================

#[test]
fn test_three_layer_composite() {
    let scene = Scene::new();
    let top = scene.add_gray(constant(900, 400, 1, 50), 1.0, true);
    let middle = Arc::new(CountingSource::new(volume(900, 400, 1, |_, _, _| 100)));
    scene.add_gray(middle.clone(), 0.3, true);
    let bottom = Arc::new(CountingSource::new(volume(900, 400, 1, |_, _, _| 200)));
    scene.add_gray(bottom.clone(), 0.1, false);

    let provider = scene.provider((900, 400), 100, 2);
    provider.wait_for_tiles(unbounded_rect());
    let tiles = provider.get_tiles(unbounded_rect());
    assert_eq!(tiles.len(), 36);
    assert!(tiles.iter().all(|t| t.progress == 1.0));

    // The opaque top layer hides everything
    assert_eq!(pixel(&provider, 450.0, 200.0), Some([50, 50, 50, 255]));
    assert_eq!(middle.request_count(), 0);
    assert_eq!(bottom.request_count(), 0);

    top.set_visible(false);
    provider.wait_for_tiles(unbounded_rect());
    let px = pixel(&provider, 450.0, 200.0).unwrap();
    for c in &px[..3] {
        assert_close(*c, 100.0 * 0.3 + 255.0 * 0.7);
    }
    assert_eq!(px[3], 255);
    assert_eq!(middle.request_count(), 36);
    assert_eq!(bottom.request_count(), 0);
}

#[test]
fn test_tinted_overlay_over_gray() {
    let scene = Scene::new();
    let tint = Layer::new(
        "mask",
        LayerKind::AlphaModulated {
            tint: [255, 0, 0],
            normalize: None,
        },
    );
    scene.add(tint, constant(16, 16, 1, 255));
    scene.add_gray(constant(16, 16, 1, 0), 1.0, true);

    let provider = scene.provider((16, 16), 8, 2);
    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(pixel(&provider, 12.0, 3.0), Some([255, 0, 0, 255]));
}

#[test]
fn test_empty_stack_renders_background() {
    let scene = Scene::new();
    let provider = scene.provider((16, 16), 8, 1);

    let tiles = provider.get_tiles(unbounded_rect());
    assert_eq!(tiles.len(), 4);
    assert!(tiles.iter().all(|t| t.progress == 1.0));
    assert_eq!(pixel(&provider, 0.0, 0.0), Some([255, 255, 255, 255]));
}

// =============================================================================
// Memoization and dirty propagation
// =============================================================================

#[test]
fn test_repeated_requests_are_memoized() {
    let scene = Scene::new();
    let data = Arc::new(CountingSource::new(volume(20, 10, 1, |x, y, _| {
        (x + y) as u8
    })));
    scene.add_gray(data.clone(), 1.0, true);
    let provider = scene.provider((20, 10), 8, 2);

    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(data.request_count(), 6);

    let first = provider.get_tiles(unbounded_rect());
    let second = provider.get_tiles(unbounded_rect());
    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(data.request_count(), 6);
    for (a, b) in first.iter().zip(&second) {
        assert!(Arc::ptr_eq(a.image.as_ref().unwrap(), b.image.as_ref().unwrap()));
    }
}

#[test]
fn test_dirty_region_is_refetched() {
    let scene = Scene::new();
    let data = Arc::new(CountingSource::new(volume(20, 10, 1, |_, _, _| 10)));
    scene.add_gray(data.clone(), 1.0, true);
    let provider = scene.provider((20, 10), 8, 2);
    provider.wait_for_tiles(unbounded_rect());
    let before = provider.get_tiles(unbounded_rect());

    data.inner().fill(&region(0, 2, 0, 2), 99.0).unwrap();
    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(data.request_count(), 7);

    let after = provider.get_tiles(unbounded_rect());
    assert!(!Arc::ptr_eq(
        before[0].image.as_ref().unwrap(),
        after[0].image.as_ref().unwrap()
    ));
    assert!(Arc::ptr_eq(
        before[1].image.as_ref().unwrap(),
        after[1].image.as_ref().unwrap()
    ));
    assert_eq!(pixel(&provider, 1.0, 1.0), Some([99, 99, 99, 255]));
    assert_eq!(pixel(&provider, 5.0, 5.0), Some([10, 10, 10, 255]));
}

#[test]
fn test_changed_reports_tile_rects() {
    let scene = Scene::new();
    scene.add_gray(constant(16, 16, 1, 0), 1.0, true);
    let provider = scene.provider((16, 16), 8, 2);

    let mut changed = provider.subscribe_changed();
    provider.wait_for_tiles(unbounded_rect());

    let mut rects = HashSet::new();
    while let Ok(rect) = changed.try_recv() {
        rects.insert((rect.x0 as i64, rect.y0 as i64));
    }
    assert_eq!(rects, HashSet::from([(0, 0), (8, 0), (0, 8), (8, 8)]));
}

// =============================================================================
// Progress
// =============================================================================

#[test]
fn test_progress_tracks_pending_fetches() {
    let scene = Scene::new();
    let slow = ArraySource::new(volume(16, 16, 1, |_, _, _| 7)).with_latency(Duration::from_millis(200));
    let layer = scene.add_gray(Arc::new(slow), 1.0, true);
    let provider = scene.provider((16, 16), 8, 2);

    let tiles = provider.get_tiles(unbounded_rect());
    assert!(tiles.iter().all(|t| t.progress == 0.0));
    // Placeholders are drawn while fetches run
    assert_eq!(pixel(&provider, 1.0, 1.0), Some([255, 255, 255, 255]));

    // Hiding a layer never lowers progress
    layer.set_visible(false);
    assert!(provider
        .get_tiles(unbounded_rect())
        .iter()
        .all(|t| t.progress == 1.0));

    layer.set_visible(true);
    provider.wait_for_tiles(unbounded_rect());
    assert!(provider
        .get_tiles(unbounded_rect())
        .iter()
        .all(|t| t.progress == 1.0));
    assert_eq!(pixel(&provider, 1.0, 1.0), Some([7, 7, 7, 255]));
}

#[test]
fn test_indeterminate_source_recovers() {
    let scene = Scene::new();
    let data = Arc::new(ArraySource::new(volume(16, 16, 1, |_, _, _| 42)));
    data.set_indeterminate(true);
    scene.add_gray(data.clone(), 1.0, true);
    let provider = scene.provider((16, 16), 8, 2);

    provider.wait_for_tiles(unbounded_rect());
    assert!(provider
        .get_tiles(unbounded_rect())
        .iter()
        .all(|t| t.progress == 0.0));
    assert_eq!(provider.pending_fetches(), 0);

    data.set_indeterminate(false);
    provider.wait_for_tiles(unbounded_rect());
    assert!(provider
        .get_tiles(unbounded_rect())
        .iter()
        .all(|t| t.progress == 1.0));
    assert_eq!(pixel(&provider, 9.0, 9.0), Some([42, 42, 42, 255]));
}

#[test]
fn test_direct_source_completes_synchronously() {
    let scene = Scene::new();
    let layer = Layer::new("direct", LayerKind::Grayscale { normalize: None }).with_direct(true);
    scene.add(layer, constant(16, 16, 1, 33));
    let provider = scene.provider((16, 16), 8, 1);

    provider.request_refresh(unbounded_rect());
    assert_eq!(provider.pending_fetches(), 0);
    assert!(provider
        .get_tiles(unbounded_rect())
        .iter()
        .all(|t| t.progress == 1.0));
    assert_eq!(pixel(&provider, 15.0, 15.0), Some([33, 33, 33, 255]));
}

// =============================================================================
// Out-of-order replies
// =============================================================================

#[test]
fn test_late_reply_does_not_clobber_newer_one() {
    let scene = Scene::new();
    let data = Arc::new(ScriptedSource::new(volume(8, 8, 1, |_, _, _| 10)));
    scene.add_gray(data.clone(), 1.0, true);
    let provider = scene.provider((8, 8), 8, 2);

    data.push_delay(Duration::from_millis(300));
    provider.request_refresh(unbounded_rect());
    // Let the slow fetch read the old data
    sleep(Duration::from_millis(50));

    data.fill(&region(0, 8, 0, 8), 99.0);
    provider.wait_for_tiles(unbounded_rect());

    assert_eq!(pixel(&provider, 4.0, 4.0), Some([99, 99, 99, 255]));
    assert!(provider.get_tiles(unbounded_rect())[0].progress == 1.0);
}

#[test]
fn test_reply_older_than_dirtying_stays_dirty() {
    let scene = Scene::new();
    let data = Arc::new(ScriptedSource::new(volume(8, 8, 1, |_, _, _| 10)));
    scene.add_gray(data.clone(), 1.0, true);
    let provider = scene.provider((8, 8), 8, 1);

    data.push_delay(Duration::from_millis(200));
    provider.request_refresh(unbounded_rect());
    sleep(Duration::from_millis(50));
    data.fill(&region(0, 8, 0, 8), 99.0);
    provider.join();

    // The old image is kept, but the entry is still dirty
    let stack = provider.sources().stack_id();
    let source = provider.sources().entries()[0].source.id();
    let image = provider.cache().layer_image(&stack, source, 0).unwrap();
    assert_eq!(image.get_pixel(4, 4).0, [10, 10, 10, 255]);
    assert!(provider.cache().is_layer_dirty(&stack, source, 0));

    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(pixel(&provider, 4.0, 4.0), Some([99, 99, 99, 255]));
}
