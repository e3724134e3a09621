//! tilestack - export one slice of a synthetic volume through the tile
//! compositing cache.
//!
//! This binary wires every component together: a 5-D volume, two layers
//! sharing synchronized slice sources, the tile provider, and a PNG writer
//! that stitches the finished tiles back into one image.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use image::{imageops, RgbaImage};
use ndarray::{ArrayD, IxDyn};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilestack::{
    config::Config,
    geometry::{unbounded_rect, Affine},
    imagesources::Normalize,
    layer::{Layer, LayerKind, LayerStack},
    slicing::{SliceProjection, SliceSource, SyncedSliceSources},
    stack::StackedImageSources,
    tile::{Tile, TileProvider},
    tiling::Tiling,
    ArraySource, DataArray,
};

/// Index of z among the along axes of an x/y projection (t, z, c).
const Z_THROUGH: usize = 1;

fn main() -> ExitCode {
    let config = Config::parse();
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let provider_config = match config.provider() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!(
        "  Volume: {}x{}x{}, slice z={}",
        config.width,
        config.height,
        config.depth,
        config.slice()
    );
    info!(
        "  Tiles: {}px, scale {}, {} workers, {}MB cache",
        provider_config.tile_size,
        config.scale,
        provider_config.workers,
        provider_config.cache_memory / (1024 * 1024)
    );

    match run(&config, provider_config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(
    config: &Config,
    provider_config: tilestack::TileProviderConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let shape = [1, config.width, config.height, config.depth, 1];
    let raw = Arc::new(ArraySource::new(raw_volume(&shape)));
    let blobs = Arc::new(ArraySource::new(blob_volume(&shape)));

    let synced = SyncedSliceSources::new(vec![0, 0, 0]);
    let raw_slice = Arc::new(SliceSource::new(raw, SliceProjection::xy())?);
    let blob_slice = Arc::new(SliceSource::new(blobs, SliceProjection::xy())?);
    synced.add(raw_slice.clone())?;
    synced.add(blob_slice.clone())?;

    let stack = Arc::new(LayerStack::new());
    let raw_layer = Arc::new(Layer::new("raw", LayerKind::Grayscale { normalize: None }));
    let overlay = Arc::new(
        Layer::new(
            "blobs",
            LayerKind::AlphaModulated {
                tint: [255, 0, 0],
                normalize: Some(Normalize::new(0.0, 1.0)),
            },
        )
        .with_opacity(config.overlay_opacity),
    );
    stack.push_top(raw_layer.clone());
    stack.push_top(overlay.clone());

    let sources = Arc::new(StackedImageSources::new(stack));
    sources.register(&raw_layer, raw_layer.create_image_source(&[raw_slice])?)?;
    sources.register(&overlay, overlay.create_image_source(&[blob_slice])?)?;
    sources.follow(&synced);
    synced.set_through(Z_THROUGH, config.slice())?;

    let tiling = Tiling::new(
        (config.width, config.height),
        Affine::scale(config.scale),
        provider_config.tile_size,
        provider_config.overlap,
    )?;
    let provider = TileProvider::new(tiling, sources, provider_config)?;

    let started = Instant::now();
    provider.wait_for_tiles(unbounded_rect());
    let tiles = provider.get_tiles(unbounded_rect());
    let stats = provider.cache_stats();
    info!(
        "Rendered {} tiles in {:.1?} ({} cache entries, {} bytes)",
        tiles.len(),
        started.elapsed(),
        stats.entries,
        stats.size
    );

    let scene = provider.tiling().scene_rect();
    let image = stitch(
        scene.width().ceil() as u32,
        scene.height().ceil() as u32,
        scene.origin().x,
        scene.origin().y,
        &tiles,
    );
    provider.join_threads();

    image.save(&config.output)?;
    info!("Wrote {}", config.output.display());
    Ok(())
}

/// Diagonal stripes that drift with z.
fn raw_volume(shape: &[usize]) -> DataArray {
    DataArray::from(ArrayD::from_shape_fn(IxDyn(shape), |ix| {
        ((ix[1] + ix[2] + 8 * ix[3]) % 256) as u8
    }))
}

/// A disc per slice, growing towards the middle of the volume.
fn blob_volume(shape: &[usize]) -> DataArray {
    let (w, h, d) = (shape[1] as f64, shape[2] as f64, shape[3] as f64);
    let (cx, cy) = (w / 2.0, h / 2.0);
    DataArray::from(ArrayD::from_shape_fn(IxDyn(shape), |ix| {
        let z = (ix[3] as f64 + 0.5) / d;
        let radius = w.min(h) * 0.4 * (1.0 - (2.0 * z - 1.0).abs());
        let dx = ix[1] as f64 - cx;
        let dy = ix[2] as f64 - cy;
        u8::from(dx * dx + dy * dy < radius * radius)
    }))
}

/// Paste each tile's own area (without overlap) into one image.
fn stitch(width: u32, height: u32, x0: f64, y0: f64, tiles: &[Tile]) -> RgbaImage {
    let mut out = RgbaImage::new(width, height);
    for tile in tiles {
        let Some(image) = &tile.image else {
            continue;
        };
        let dx = (tile.rect.x0 - tile.image_rect.x0).round() as u32;
        let dy = (tile.rect.y0 - tile.image_rect.y0).round() as u32;
        let w = tile.rect.width().ceil() as u32;
        let h = tile.rect.height().ceil() as u32;
        let part = imageops::crop_imm(&**image, dx, dy, w, h).to_image();
        imageops::replace(
            &mut out,
            &part,
            (tile.rect.x0 - x0).round() as i64,
            (tile.rect.y0 - y0).round() as i64,
        );
    }
    out
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tilestack=debug"
    } else {
        "tilestack=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
