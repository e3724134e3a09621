//! Partition of the scene into fixed-size tiles.
//!
//! The scene is the bounding box of the 2-D slice under the data-to-scene
//! transform. It is cut into `block_size` squares, row-major, with the last
//! row and column possibly narrower. Each tile also has an image rect grown
//! by `overlap` pixels so neighbouring tiles meet without seams when the
//! scene is scaled by a fractional factor.

use crate::error::GeometryError;
use crate::geometry::{is_bounded, Affine, IntRect, Point, Rect};

/// Default tile edge length in scene pixels.
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Default overlap in scene pixels.
pub const DEFAULT_OVERLAP: usize = 1;

/// Transforms with a smaller determinant are treated as singular.
const MIN_DETERMINANT: f64 = 1e-12;

/// Precomputed rectangles of one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRects {
    /// Scene rect without overlap; used for dirty matching and placement
    pub tile_rect: Rect,
    /// Scene rect grown by the overlap, clipped to the scene
    pub image_rect: Rect,
    /// `tile_rect` in data coordinates
    pub data_tile_rect: IntRect,
    /// `image_rect` in data coordinates; this is what gets fetched
    pub data_image_rect: IntRect,
}

/// An immutable tile grid for one slice shape and transform.
#[derive(Debug, Clone)]
pub struct Tiling {
    shape: (usize, usize),
    data2scene: Affine,
    scene2data: Affine,
    block_size: usize,
    overlap: usize,
    scene_rect: Rect,
    cols: usize,
    rows: usize,
    tiles: Vec<TileRects>,
}

impl Tiling {
    /// Tile a `(width, height)` slice.
    ///
    /// # Errors
    ///
    /// Fails for a zero block size or a non-invertible transform.
    pub fn new(
        shape: (usize, usize),
        data2scene: Affine,
        block_size: usize,
        overlap: usize,
    ) -> Result<Self, GeometryError> {
        if block_size == 0 {
            return Err(GeometryError::ZeroBlockSize);
        }
        let determinant = data2scene.determinant();
        if !determinant.is_finite() || determinant.abs() < MIN_DETERMINANT {
            return Err(GeometryError::NonInvertibleTransform { determinant });
        }
        let scene2data = data2scene.inverse();

        let (w, h) = shape;
        let data_rect = Rect::new(0.0, 0.0, w as f64, h as f64);
        let scene_rect = data2scene.transform_rect_bbox(data_rect);
        let bs = block_size as f64;
        let cols = (scene_rect.width() / bs).ceil().max(0.0) as usize;
        let rows = (scene_rect.height() / bs).ceil().max(0.0) as usize;
        let bounds = IntRect::new(0, 0, w as i64, h as i64);

        let mut tiles = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let x0 = scene_rect.x0 + col as f64 * bs;
                let y0 = scene_rect.y0 + row as f64 * bs;
                let tile_rect = Rect::new(
                    x0,
                    y0,
                    (x0 + bs).min(scene_rect.x1),
                    (y0 + bs).min(scene_rect.y1),
                );
                let image_rect = tile_rect
                    .inflate(overlap as f64, overlap as f64)
                    .intersect(scene_rect);
                let to_data = |r: Rect| {
                    IntRect::enclosing(scene2data.transform_rect_bbox(r)).intersect(&bounds)
                };
                tiles.push(TileRects {
                    tile_rect,
                    image_rect,
                    data_tile_rect: to_data(tile_rect),
                    data_image_rect: to_data(image_rect),
                });
            }
        }

        Ok(Self {
            shape,
            data2scene,
            scene2data,
            block_size,
            overlap,
            scene_rect,
            cols,
            rows,
            tiles,
        })
    }

    /// Identity-mapped tiling with the default overlap.
    pub fn identity(shape: (usize, usize), block_size: usize) -> Result<Self, GeometryError> {
        Self::new(shape, Affine::IDENTITY, block_size, DEFAULT_OVERLAP)
    }

    /// The same grid parameters under a different transform.
    pub fn with_data2scene(&self, data2scene: Affine) -> Result<Self, GeometryError> {
        Self::new(self.shape, data2scene, self.block_size, self.overlap)
    }

    /// The same grid parameters for a different slice shape.
    pub fn with_shape(&self, shape: (usize, usize)) -> Result<Self, GeometryError> {
        Self::new(shape, self.data2scene, self.block_size, self.overlap)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn scene_rect(&self) -> Rect {
        self.scene_rect
    }

    pub fn data2scene(&self) -> Affine {
        self.data2scene
    }

    pub fn scene2data(&self) -> Affine {
        self.scene2data
    }

    pub fn tile_rects(&self, tile: usize) -> Option<&TileRects> {
        self.tiles.get(tile)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &TileRects)> {
        self.tiles.iter().enumerate()
    }

    /// Index of the tile containing the scene point `p`.
    pub fn tile_at(&self, p: Point) -> Option<usize> {
        let s = &self.scene_rect;
        if !(p.x >= s.x0 && p.x < s.x1 && p.y >= s.y0 && p.y < s.y1) {
            return None;
        }
        let bs = self.block_size as f64;
        let col = (((p.x - s.x0) / bs) as usize).min(self.cols.saturating_sub(1));
        let row = (((p.y - s.y0) / bs) as usize).min(self.rows.saturating_sub(1));
        Some(row * self.cols + col)
    }

    /// Tiles whose `tile_rect` overlaps `rect` with positive area.
    ///
    /// Unbounded or degenerate rectangles select every tile.
    pub fn intersected(&self, rect: Rect) -> Vec<usize> {
        if !is_bounded(&rect) {
            return (0..self.tiles.len()).collect();
        }
        let s = &self.scene_rect;
        if rect.x0 >= s.x1 || rect.x1 <= s.x0 || rect.y0 >= s.y1 || rect.y1 <= s.y0 {
            return Vec::new();
        }
        let bs = self.block_size as f64;
        let span = |lo: f64, hi: f64, origin: f64, n: usize| {
            let first = ((lo - origin) / bs).floor().max(0.0) as usize;
            let last = ((hi - origin) / bs).ceil().clamp(0.0, n as f64) as usize;
            first.min(n)..last
        };
        let cols = span(rect.x0.max(s.x0), rect.x1.min(s.x1), s.x0, self.cols);
        let rows = span(rect.y0.max(s.y0), rect.y1.min(s.y1), s.y0, self.rows);

        rows.flat_map(|row| cols.clone().map(move |col| row * self.cols + col))
            .collect()
    }

    /// Map a data-space rect (possibly unbounded) to scene space.
    pub fn data_rect_to_scene(&self, rect: Rect) -> Rect {
        if !is_bounded(&rect) {
            return rect;
        }
        self.data2scene.transform_rect_bbox(rect)
    }
}
