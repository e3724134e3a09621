//! Layers and the ordered layer stack.
//!
//! A [`Layer`] carries the user-facing display state (visibility, opacity,
//! priority) and a [`LayerKind`] describing how its data is rendered. The
//! kind is matched exhaustively when the layer's image source is built, so
//! every kind carries exactly the parameters its renderer needs.
//!
//! The [`LayerStack`] orders layers top to bottom: index 0 is drawn last.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use image::Rgba;

use crate::error::RegistrationError;
use crate::imagesources::{
    AlphaModulatedImageSource, ColortableImageSource, GrayscaleImageSource, ImageSource,
    LabelEdgesImageSource, Normalize, RgbaChannel, RgbaImageSource,
};
use crate::signal::Signal;
use crate::slicing::SliceSource;
use crate::sync::{read, write};

/// Stable identity of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        LayerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}

/// How a layer turns data into colors.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    Grayscale {
        normalize: Option<Normalize>,
    },
    Colortable {
        table: Vec<Rgba<u8>>,
        normalize: Option<Normalize>,
        zero_transparent: bool,
    },
    AlphaModulated {
        tint: [u8; 3],
        normalize: Option<Normalize>,
    },
    Rgba {
        channels: [RgbaChannel; 4],
    },
    LabelEdges {
        table: Vec<Rgba<u8>>,
    },
}

impl LayerKind {
    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::Grayscale { .. } => "grayscale",
            LayerKind::Colortable { .. } => "colortable",
            LayerKind::AlphaModulated { .. } => "alpha-modulated",
            LayerKind::Rgba { .. } => "rgba",
            LayerKind::LabelEdges { .. } => "label-edges",
        }
    }

    /// Number of slice sources the kind reads from.
    pub fn slice_count(&self) -> usize {
        match self {
            LayerKind::Rgba { channels } => channels.iter().filter(|c| c.is_data()).count(),
            _ => 1,
        }
    }
}

/// A change to a layer's display state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerChange {
    Visible(bool),
    Opacity(f64),
}

#[derive(Debug, Clone, Copy)]
struct LayerState {
    visible: bool,
    opacity: f64,
}

/// One entry of the layer stack.
pub struct Layer {
    id: LayerId,
    name: String,
    kind: LayerKind,
    priority: i32,
    direct: bool,
    state: RwLock<LayerState>,
    changed: Signal<LayerChange>,
}

impl Layer {
    /// A visible, fully opaque layer.
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            id: LayerId::next(),
            name: name.into(),
            kind,
            priority: 0,
            direct: false,
            state: RwLock::new(LayerState {
                visible: true,
                opacity: 1.0,
            }),
            changed: Signal::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Render this layer on the caller's thread.
    pub fn with_direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    pub fn with_visible(self, visible: bool) -> Self {
        write(&self.state).visible = visible;
        self
    }

    pub fn with_opacity(self, opacity: f64) -> Self {
        write(&self.state).opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn visible(&self) -> bool {
        read(&self.state).visible
    }

    pub fn opacity(&self) -> f64 {
        read(&self.state).opacity
    }

    pub fn set_visible(&self, visible: bool) {
        {
            let mut state = write(&self.state);
            if state.visible == visible {
                return;
            }
            state.visible = visible;
        }
        self.changed.emit(&LayerChange::Visible(visible));
    }

    /// Set the opacity, clamped to `[0, 1]`.
    pub fn set_opacity(&self, opacity: f64) {
        let opacity = opacity.clamp(0.0, 1.0);
        {
            let mut state = write(&self.state);
            if state.opacity == opacity {
                return;
            }
            state.opacity = opacity;
        }
        self.changed.emit(&LayerChange::Opacity(opacity));
    }

    pub fn changed_signal(&self) -> &Signal<LayerChange> {
        &self.changed
    }

    /// Build the image source matching this layer's kind.
    pub fn create_image_source(
        &self,
        slices: &[Arc<SliceSource>],
    ) -> Result<Arc<dyn ImageSource>, RegistrationError> {
        let expected = self.kind.slice_count();
        if slices.len() != expected {
            return Err(RegistrationError::SourceCount {
                kind: self.kind.name(),
                expected,
                actual: slices.len(),
            });
        }

        let source: Arc<dyn ImageSource> = match &self.kind {
            LayerKind::Grayscale { normalize } => Arc::new(
                GrayscaleImageSource::new(slices[0].clone(), *normalize)
                    .with_priority(self.priority)
                    .with_direct(self.direct),
            ),
            LayerKind::Colortable {
                table,
                normalize,
                zero_transparent,
            } => Arc::new(
                ColortableImageSource::new(
                    slices[0].clone(),
                    table.clone(),
                    *normalize,
                    *zero_transparent,
                )
                .with_priority(self.priority)
                .with_direct(self.direct),
            ),
            LayerKind::AlphaModulated { tint, normalize } => Arc::new(
                AlphaModulatedImageSource::new(slices[0].clone(), *tint, *normalize)
                    .with_priority(self.priority)
                    .with_direct(self.direct),
            ),
            LayerKind::Rgba { channels } => Arc::new(
                RgbaImageSource::new(*channels, slices.to_vec())?
                    .with_priority(self.priority)
                    .with_direct(self.direct),
            ),
            LayerKind::LabelEdges { table } => Arc::new(
                LabelEdgesImageSource::new(slices[0].clone(), table.clone())
                    .with_priority(self.priority)
                    .with_direct(self.direct),
            ),
        };
        Ok(source)
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = *read(&self.state);
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind.name())
            .field("visible", &state.visible)
            .field("opacity", &state.opacity)
            .finish()
    }
}

/// A change to the layer stack's membership or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackChange {
    Inserted(usize),
    Removed(usize),
    Moved { from: usize, to: usize },
}

/// Layers in drawing order, topmost first.
#[derive(Default)]
pub struct LayerStack {
    layers: RwLock<Vec<Arc<Layer>>>,
    changed: Signal<StackChange>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at `index` (clamped to the stack length). Index 0 is the top.
    pub fn insert(&self, index: usize, layer: Arc<Layer>) -> usize {
        let index = {
            let mut layers = write(&self.layers);
            let index = index.min(layers.len());
            layers.insert(index, layer);
            index
        };
        self.changed.emit(&StackChange::Inserted(index));
        index
    }

    /// Put a layer on top.
    pub fn push_top(&self, layer: Arc<Layer>) {
        self.insert(0, layer);
    }

    /// Put a layer at the bottom.
    pub fn push_bottom(&self, layer: Arc<Layer>) {
        self.insert(usize::MAX, layer);
    }

    pub fn remove(&self, id: LayerId) -> Option<Arc<Layer>> {
        let (index, layer) = {
            let mut layers = write(&self.layers);
            let index = layers.iter().position(|l| l.id() == id)?;
            (index, layers.remove(index))
        };
        self.changed.emit(&StackChange::Removed(index));
        Some(layer)
    }

    /// Move the layer at `from` to `to`. Returns false if either is out of range.
    pub fn move_layer(&self, from: usize, to: usize) -> bool {
        {
            let mut layers = write(&self.layers);
            if from >= layers.len() || to >= layers.len() {
                return false;
            }
            if from == to {
                return true;
            }
            let layer = layers.remove(from);
            layers.insert(to, layer);
        }
        self.changed.emit(&StackChange::Moved { from, to });
        true
    }

    /// Snapshot of the layers, topmost first.
    pub fn layers(&self) -> Vec<Arc<Layer>> {
        read(&self.layers).clone()
    }

    pub fn get(&self, index: usize) -> Option<Arc<Layer>> {
        read(&self.layers).get(index).cloned()
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        read(&self.layers).iter().position(|l| l.id() == id)
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn len(&self) -> usize {
        read(&self.layers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn changed_signal(&self) -> &Signal<StackChange> {
        &self.changed
    }
}
