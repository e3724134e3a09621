//! Layer stack integration tests: ordering, opacity and membership changes
//! as seen by the tile provider.

use std::sync::Arc;

use tilestack::geometry::unbounded_rect;
use tilestack::RegistrationError;

use super::test_utils::{assert_close, constant, pixel, volume, CountingSource, Scene};

fn counting(value: u8) -> Arc<CountingSource> {
    Arc::new(CountingSource::new(volume(16, 16, 1, move |_, _, _| value)))
}

#[test]
fn test_reorder_recomposites_without_fetch() {
    let scene = Scene::new();
    let dark = counting(0);
    let light = counting(200);
    scene.add_gray(dark.clone(), 0.5, true);
    scene.add_gray(light.clone(), 0.5, true);
    let provider = scene.provider((16, 16), 8, 2);

    provider.wait_for_tiles(unbounded_rect());
    assert_close(pixel(&provider, 3.0, 3.0).unwrap()[0], 113.75);
    let requests = dark.request_count() + light.request_count();

    assert!(scene.stack.move_layer(0, 1));
    provider.wait_for_tiles(unbounded_rect());
    assert_close(pixel(&provider, 3.0, 3.0).unwrap()[0], 163.75);
    assert_eq!(dark.request_count() + light.request_count(), requests);
}

#[test]
fn test_opacity_change_recomposites_without_fetch() {
    let scene = Scene::new();
    let data = counting(0);
    let layer = scene.add_gray(data.clone(), 1.0, true);
    let provider = scene.provider((16, 16), 8, 2);
    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(pixel(&provider, 3.0, 3.0), Some([0, 0, 0, 255]));

    layer.set_opacity(0.2);
    assert_close(pixel(&provider, 3.0, 3.0).unwrap()[0], 255.0 * 0.8);
    assert_eq!(data.request_count(), 4);
}

#[test]
fn test_removing_occluder_fetches_layer_below() {
    let scene = Scene::new();
    let top = scene.add_gray(constant(16, 16, 1, 10), 1.0, true);
    let below = counting(90);
    scene.add_gray(below.clone(), 1.0, true);
    let provider = scene.provider((16, 16), 8, 2);

    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(below.request_count(), 0);
    assert!(provider.cache_stats().entries > 0);

    // Size changes start over with an empty cache
    assert!(scene.stack.remove(top.id()).is_some());
    assert_eq!(provider.cache_stats().entries, 0);
    assert!(!scene.sources.is_active(top.id()));
    assert!(scene.sources.is_registered(top.id()));

    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(below.request_count(), 4);
    assert_eq!(pixel(&provider, 12.0, 12.0), Some([90, 90, 90, 255]));

    // Reinserting keeps the registration
    scene.stack.push_top(top.clone());
    assert!(scene.sources.is_active(top.id()));
    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(pixel(&provider, 12.0, 12.0), Some([10, 10, 10, 255]));
}

#[test]
fn test_deregister_drops_layer_from_composite() {
    let scene = Scene::new();
    let top = scene.add_gray(constant(16, 16, 1, 10), 1.0, true);
    scene.add_gray(constant(16, 16, 1, 90), 1.0, true);
    let provider = scene.provider((16, 16), 8, 2);
    provider.wait_for_tiles(unbounded_rect());

    let source = scene.sources.deregister(top.id()).unwrap();
    assert!(scene.sources.source_for(top.id()).is_none());
    assert_eq!(scene.sources.len(), 1);
    provider.wait_for_tiles(unbounded_rect());
    assert_eq!(pixel(&provider, 1.0, 1.0), Some([90, 90, 90, 255]));

    scene.sources.register(&top, source.clone()).unwrap();
    assert_eq!(
        scene.sources.register(&top, source),
        Err(RegistrationError::AlreadyRegistered(top.id().get()))
    );
}
