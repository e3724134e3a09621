//! Slice navigation tests: cache generations keyed by through values.

use std::sync::Arc;
use std::time::Duration;

use tilestack::data::{ArraySource, AxisRange, Slicing};
use tilestack::geometry::unbounded_rect;
use tilestack::slicing::StackId;

use super::test_utils::{pixel, volume, CountingSource, Scene, Z};

#[test]
fn test_revisited_slice_is_shown_from_cache() {
    let scene = Scene::new();
    let data = ArraySource::new(volume(16, 16, 4, |_, _, z| (z * 10) as u8))
        .with_latency(Duration::from_millis(100));
    scene.add_gray(Arc::new(data), 1.0, true);
    let provider = scene.provider((16, 16), 8, 2);

    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(pixel(&provider, 4.0, 4.0), Some([0, 0, 0, 255]));

    scene.synced.set_through(Z, 3).unwrap();
    assert_eq!(scene.sources.stack_id(), StackId::new(&[0, 3, 0]));
    // Nothing cached for z=3 yet
    assert_eq!(pixel(&provider, 4.0, 4.0), Some([255, 255, 255, 255]));
    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(pixel(&provider, 4.0, 4.0), Some([30, 30, 30, 255]));

    // Both generations are cached
    assert!(provider.cache().composite(&StackId::new(&[0, 0, 0]), 0).is_some());
    assert!(provider.cache().composite(&StackId::new(&[0, 3, 0]), 0).is_some());

    // Going back shows the old images at once while they are refreshed
    scene.synced.set_through(Z, 0).unwrap();
    let tiles = provider.get_tiles(unbounded_rect());
    assert!(tiles.iter().all(|t| t.progress < 1.0));
    assert_eq!(pixel(&provider, 4.0, 4.0), Some([0, 0, 0, 255]));

    provider.wait_for_tiles(unbounded_rect());
    assert!(provider
        .get_tiles(unbounded_rect())
        .iter()
        .all(|t| t.progress == 1.0));
}

#[test]
fn test_edits_on_other_slices_are_ignored() {
    let scene = Scene::new();
    let data = Arc::new(CountingSource::new(volume(16, 16, 4, |_, _, _| 5)));
    scene.add_gray(data.clone(), 1.0, true);
    let provider = scene.provider((16, 16), 8, 2);
    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(data.request_count(), 4);

    let elsewhere = Slicing::new(vec![
        AxisRange::all(),
        AxisRange::all(),
        AxisRange::all(),
        AxisRange::new(2, 3),
        AxisRange::all(),
    ]);
    data.inner().fill(&elsewhere, 77.0).unwrap();
    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(data.request_count(), 4);

    scene.synced.set_through(Z, 2).unwrap();
    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(pixel(&provider, 9.0, 1.0), Some([77, 77, 77, 255]));
}

#[test]
fn test_invalid_through_is_rejected() {
    let scene = Scene::new();
    assert!(scene.synced.set_through(7, 1).is_err());
    assert!(scene.synced.set_through_all(&[0, 1]).is_err());
}
