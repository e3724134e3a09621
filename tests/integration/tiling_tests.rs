//! Tiling geometry tests.

use tilestack::data::AxisRange;
use tilestack::geometry::{rect2slicing, slicing2rect, unbounded_rect, Affine, IntRect, Rect};
use tilestack::tiling::Tiling;
use tilestack::GeometryError;

#[test]
fn test_900_by_400_in_blocks_of_100() {
    let tiling = Tiling::identity((900, 400), 100).unwrap();
    assert_eq!(tiling.len(), 36);
    assert_eq!(tiling.intersected(unbounded_rect()).len(), 36);

    // Tile rects cover the scene exactly once
    let area: f64 = tiling.iter().map(|(_, r)| r.tile_rect.area()).sum();
    assert_eq!(area, 900.0 * 400.0);
}

#[test]
fn test_overlap_is_clipped_to_scene() {
    let tiling = Tiling::identity((900, 400), 100).unwrap();

    let first = tiling.tile_rects(0).unwrap();
    assert_eq!(first.tile_rect, Rect::new(0.0, 0.0, 100.0, 100.0));
    assert_eq!(first.image_rect, Rect::new(0.0, 0.0, 101.0, 101.0));
    assert_eq!(first.data_image_rect, IntRect::new(0, 0, 101, 101));

    let inner = tiling.tile_rects(10).unwrap();
    assert_eq!(inner.image_rect, Rect::new(99.0, 99.0, 201.0, 201.0));
}

#[test]
fn test_intersected_partial_and_invalid() {
    let tiling = Tiling::identity((900, 400), 100).unwrap();
    assert_eq!(tiling.intersected(Rect::new(150.0, 50.0, 250.0, 60.0)), vec![1, 2]);
    assert!(tiling.intersected(Rect::new(1000.0, 0.0, 1100.0, 10.0)).is_empty());

    // Inverted or NaN rects mean everything
    assert_eq!(tiling.intersected(Rect::new(10.0, 10.0, 0.0, 0.0)).len(), 36);
    assert_eq!(
        tiling.intersected(Rect::new(f64::NAN, 0.0, 1.0, 1.0)).len(),
        36
    );
}

#[test]
fn test_scaled_transform() {
    let tiling = Tiling::new((900, 400), Affine::scale(0.5), 100, 1).unwrap();
    assert_eq!(tiling.scene_rect(), Rect::new(0.0, 0.0, 450.0, 200.0));
    assert_eq!(tiling.len(), 10);

    let last = tiling.tile_rects(9).unwrap();
    assert_eq!(last.tile_rect, Rect::new(400.0, 100.0, 450.0, 200.0));
    assert_eq!(last.data_tile_rect, IntRect::new(800, 200, 100, 200));
}

#[test]
fn test_non_invertible_transform_fails() {
    let singular = Affine::new([1.0, 2.0, 2.0, 4.0, 0.0, 0.0]);
    assert!(matches!(
        Tiling::new((10, 10), singular, 4, 1),
        Err(GeometryError::NonInvertibleTransform { .. })
    ));
    assert_eq!(
        Tiling::identity((10, 10), 0).unwrap_err(),
        GeometryError::ZeroBlockSize
    );
}

#[test]
fn test_rect_slicing_inverses() {
    let rect = Rect::new(3.0, 4.0, 17.0, 9.0);
    let [x, y] = rect2slicing(&rect);
    assert_eq!(x, AxisRange::new(3, 17));
    assert_eq!(y, AxisRange::new(4, 9));
    assert_eq!(slicing2rect(&x, &y), rect);
}
