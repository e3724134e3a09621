use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::error::RegistrationError;
use crate::geometry::Rect;
use crate::imagesources::{ImageSource, ImageSourceId};
use crate::layer::{Layer, LayerChange, LayerId, LayerStack, StackChange};
use crate::signal::{Signal, Subscription};
use crate::slicing::{StackId, SyncedSliceSources};
use crate::sync::{lock, read, write};

// =============================================================================
// Events and entries
// =============================================================================

/// Downstream invalidation events.
#[derive(Debug, Clone, PartialEq)]
pub enum StackEvent {
    /// A registered layer was shown or hidden
    Visibility { layer: LayerId },

    /// A registered layer changed opacity
    Opacity { layer: LayerId },

    /// Layers were reordered
    Order,

    /// The set of active layers changed
    Size,

    /// An image source reported a dirty data region
    LayerDirty { source: ImageSourceId, rect: Rect },

    /// The view moved to a different slice
    StackIdChanged { old: StackId, new: StackId },
}

/// One active layer, as seen at snapshot time.
#[derive(Clone)]
pub struct StackEntry {
    pub layer: LayerId,
    pub source: Arc<dyn ImageSource>,
    pub visible: bool,
    pub opacity: f64,
    pub opaque: bool,
    /// A visible, fully opaque layer above hides this one
    pub occluded: bool,
}

impl StackEntry {
    /// Whether this layer contributes to the composite.
    pub fn is_eligible(&self) -> bool {
        self.visible && !self.occluded
    }

    fn occludes(&self) -> bool {
        self.visible && self.opacity >= 1.0 && self.opaque
    }
}

impl fmt::Debug for StackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackEntry")
            .field("layer", &self.layer)
            .field("source", &self.source.id())
            .field("visible", &self.visible)
            .field("opacity", &self.opacity)
            .field("opaque", &self.opaque)
            .field("occluded", &self.occluded)
            .finish()
    }
}

struct Registration {
    layer: Arc<Layer>,
    source: Arc<dyn ImageSource>,
    _subscriptions: [Subscription; 2],
}

// =============================================================================
// StackedImageSources
// =============================================================================

/// Maps active layers to their image sources.
///
/// A layer is active while it is both registered and a member of the layer
/// stack. Registration survives removing and re-inserting the layer, so a
/// reorder done as remove + insert keeps the binding.
pub struct StackedImageSources {
    layer_stack: Arc<LayerStack>,
    registrations: RwLock<HashMap<LayerId, Registration>>,
    stack_id: Arc<RwLock<StackId>>,
    events: Arc<Signal<StackEvent>>,
    _stack_changes: Subscription,
    following: Mutex<Option<Subscription>>,
}

impl StackedImageSources {
    pub fn new(layer_stack: Arc<LayerStack>) -> Self {
        let events: Arc<Signal<StackEvent>> = Arc::new(Signal::new());

        let stack_changes = {
            let events = events.clone();
            layer_stack
                .changed_signal()
                .subscribe(move |change: &StackChange| {
                    let event = match change {
                        StackChange::Inserted(_) | StackChange::Removed(_) => StackEvent::Size,
                        StackChange::Moved { .. } => StackEvent::Order,
                    };
                    events.emit(&event);
                })
        };

        Self {
            layer_stack,
            registrations: RwLock::new(HashMap::new()),
            stack_id: Arc::new(RwLock::new(StackId::default())),
            events,
            _stack_changes: stack_changes,
            following: Mutex::new(None),
        }
    }

    pub fn layer_stack(&self) -> &Arc<LayerStack> {
        &self.layer_stack
    }

    /// Bind `source` to `layer`.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::AlreadyRegistered`] if the layer has a source
    /// - [`RegistrationError::NotInStack`] if the layer is not in the stack
    pub fn register(
        &self,
        layer: &Arc<Layer>,
        source: Arc<dyn ImageSource>,
    ) -> Result<(), RegistrationError> {
        let id = layer.id();
        if !self.layer_stack.contains(id) {
            return Err(RegistrationError::NotInStack(id.get()));
        }

        {
            let mut registrations = write(&self.registrations);
            if registrations.contains_key(&id) {
                return Err(RegistrationError::AlreadyRegistered(id.get()));
            }

            let layer_changes = {
                let events = self.events.clone();
                layer.changed_signal().subscribe(move |change: &LayerChange| {
                    let event = match change {
                        LayerChange::Visible(_) => StackEvent::Visibility { layer: id },
                        LayerChange::Opacity(_) => StackEvent::Opacity { layer: id },
                    };
                    events.emit(&event);
                })
            };
            let source_dirty = {
                let events = self.events.clone();
                let source_id = source.id();
                source.dirty_signal().subscribe(move |rect: &Rect| {
                    events.emit(&StackEvent::LayerDirty {
                        source: source_id,
                        rect: *rect,
                    });
                })
            };

            debug!("Registered {} for {} ({})", source.id(), id, layer.name());
            registrations.insert(
                id,
                Registration {
                    layer: layer.clone(),
                    source,
                    _subscriptions: [layer_changes, source_dirty],
                },
            );
        }

        self.events.emit(&StackEvent::Size);
        Ok(())
    }

    /// Unbind a layer, returning its image source.
    pub fn deregister(&self, layer: LayerId) -> Result<Arc<dyn ImageSource>, RegistrationError> {
        let registration = write(&self.registrations)
            .remove(&layer)
            .ok_or(RegistrationError::NotRegistered(layer.get()))?;
        debug!("Deregistered {} from {}", registration.source.id(), layer);
        self.events.emit(&StackEvent::Size);
        Ok(registration.source)
    }

    pub fn is_registered(&self, layer: LayerId) -> bool {
        read(&self.registrations).contains_key(&layer)
    }

    /// Registered and currently in the stack.
    pub fn is_active(&self, layer: LayerId) -> bool {
        self.is_registered(layer) && self.layer_stack.contains(layer)
    }

    pub fn source_for(&self, layer: LayerId) -> Option<Arc<dyn ImageSource>> {
        read(&self.registrations)
            .get(&layer)
            .map(|r| r.source.clone())
    }

    /// Active layers, topmost first, with occlusion resolved.
    pub fn entries(&self) -> Vec<StackEntry> {
        let layers = self.layer_stack.layers();
        let registrations = read(&self.registrations);

        let mut occluded = false;
        let mut entries = Vec::with_capacity(registrations.len());
        for layer in layers {
            let Some(registration) = registrations.get(&layer.id()) else {
                continue;
            };
            let entry = StackEntry {
                layer: layer.id(),
                source: registration.source.clone(),
                visible: layer.visible(),
                opacity: layer.opacity(),
                opaque: registration.source.is_opaque(),
                occluded,
            };
            occluded |= entry.occludes();
            entries.push(entry);
        }
        entries
    }

    /// Index into [`entries`](Self::entries) of the first layer hiding
    /// everything below it.
    pub fn first_fully_opaque(&self) -> Option<usize> {
        self.entries().iter().position(StackEntry::occludes)
    }

    pub fn is_visible(&self, source: ImageSourceId) -> bool {
        self.entries()
            .iter()
            .any(|e| e.source.id() == source && e.visible)
    }

    pub fn is_occluded(&self, source: ImageSourceId) -> bool {
        self.entries()
            .iter()
            .any(|e| e.source.id() == source && e.occluded)
    }

    /// Number of active layers.
    pub fn len(&self) -> usize {
        let registrations = read(&self.registrations);
        self.layer_stack
            .layers()
            .iter()
            .filter(|l| registrations.contains_key(&l.id()))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stack_id(&self) -> StackId {
        read(&self.stack_id).clone()
    }

    /// Switch the cache generation.
    pub fn set_stack_id(&self, new: StackId) {
        set_stack_id(&self.stack_id, &self.events, new);
    }

    /// Track the through values of `synced`.
    pub fn follow(&self, synced: &SyncedSliceSources) {
        self.set_stack_id(synced.stack_id());

        let stack_id = self.stack_id.clone();
        let events = self.events.clone();
        let subscription = synced
            .through_changed_signal()
            .subscribe(move |(_, new): &(StackId, StackId)| {
                set_stack_id(&stack_id, &events, new.clone());
            });
        *lock(&self.following) = Some(subscription);
    }

    pub fn events(&self) -> &Signal<StackEvent> {
        &self.events
    }

    /// Layers still registered, whether or not they are in the stack.
    pub fn registered_layers(&self) -> Vec<Arc<Layer>> {
        read(&self.registrations)
            .values()
            .map(|r| r.layer.clone())
            .collect()
    }
}

fn set_stack_id(slot: &RwLock<StackId>, events: &Signal<StackEvent>, new: StackId) {
    let old = {
        let mut current = write(slot);
        if *current == new {
            return;
        }
        std::mem::replace(&mut *current, new.clone())
    };
    events.emit(&StackEvent::StackIdChanged { old, new });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imagesources::test_support::plane_slice;
    use crate::layer::LayerKind;
    use image::Rgba;

    struct Fixture {
        stack: Arc<LayerStack>,
        sources: StackedImageSources,
        events: Arc<std::sync::Mutex<Vec<StackEvent>>>,
        _sub: Subscription,
    }

    fn fixture() -> Fixture {
        let stack = Arc::new(LayerStack::new());
        let sources = StackedImageSources::new(stack.clone());
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let e = events.clone();
        let sub = sources
            .events()
            .subscribe(move |ev: &StackEvent| e.lock().unwrap().push(ev.clone()));
        Fixture {
            stack,
            sources,
            events,
            _sub: sub,
        }
    }

    fn add(f: &Fixture, kind: LayerKind) -> Arc<Layer> {
        let (_data, slice) = plane_slice(4, 4, |_, _| 0u8);
        let layer = Arc::new(Layer::new("l", kind));
        f.stack.push_bottom(layer.clone());
        let source = layer.create_image_source(&[slice]).unwrap();
        f.sources.register(&layer, source).unwrap();
        layer
    }

    fn gray() -> LayerKind {
        LayerKind::Grayscale { normalize: None }
    }

    fn tint() -> LayerKind {
        LayerKind::AlphaModulated {
            tint: [1, 2, 3],
            normalize: None,
        }
    }

    #[test]
    fn test_registration_errors() {
        let f = fixture();
        let layer = add(&f, gray());
        let (_data, slice) = plane_slice(4, 4, |_, _| 0u8);
        let source = layer.create_image_source(&[slice.clone()]).unwrap();

        assert_eq!(
            f.sources.register(&layer, source.clone()),
            Err(RegistrationError::AlreadyRegistered(layer.id().get()))
        );

        let outsider = Arc::new(Layer::new("o", gray()));
        assert_eq!(
            f.sources.register(&outsider, source),
            Err(RegistrationError::NotInStack(outsider.id().get()))
        );

        assert!(f.sources.deregister(layer.id()).is_ok());
        assert!(matches!(
            f.sources.deregister(layer.id()),
            Err(RegistrationError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_occlusion_below_opaque_layer() {
        let f = fixture();
        let top = add(&f, gray());
        let _mid = add(&f, tint());
        let _bottom = add(&f, gray());

        let entries = f.sources.entries();
        assert_eq!(entries.len(), 3);
        assert!(!entries[0].occluded);
        assert!(entries[1].occluded);
        assert!(entries[2].occluded);
        assert_eq!(f.sources.first_fully_opaque(), Some(0));

        top.set_opacity(0.5);
        let entries = f.sources.entries();
        assert!(!entries[1].occluded);
        assert!(!entries[2].occluded);
        assert_eq!(f.sources.first_fully_opaque(), Some(2));

        top.set_opacity(1.0);
        top.set_visible(false);
        assert!(!f.sources.is_occluded(entries[2].source.id()));
        assert!(!f.sources.is_visible(entries[0].source.id()));
    }

    #[test]
    fn test_translucent_kind_does_not_occlude() {
        let f = fixture();
        add(&f, tint());
        add(&f, gray());
        assert!(f.sources.entries().iter().all(|e| !e.occluded));
        assert_eq!(f.sources.first_fully_opaque(), Some(1));
    }

    #[test]
    fn test_registration_survives_reinsert() {
        let f = fixture();
        let layer = add(&f, gray());
        f.stack.remove(layer.id());
        assert!(!f.sources.is_active(layer.id()));
        assert!(f.sources.entries().is_empty());

        f.stack.push_top(layer.clone());
        assert!(f.sources.is_active(layer.id()));
        assert_eq!(f.sources.len(), 1);
    }

    #[test]
    fn test_events_reemitted() {
        let f = fixture();
        let a = add(&f, gray());
        let _b = add(&f, gray());
        f.events.lock().unwrap().clear();

        a.set_visible(false);
        a.set_opacity(0.5);
        f.stack.move_layer(0, 1);
        let source = f.sources.source_for(a.id()).unwrap();
        source.set_dirty(Rect::new(0.0, 0.0, 2.0, 2.0));

        assert_eq!(
            f.events.lock().unwrap().as_slice(),
            &[
                StackEvent::Visibility { layer: a.id() },
                StackEvent::Opacity { layer: a.id() },
                StackEvent::Order,
                StackEvent::LayerDirty {
                    source: source.id(),
                    rect: Rect::new(0.0, 0.0, 2.0, 2.0)
                },
            ]
        );
    }

    #[test]
    fn test_deregistered_source_is_silent() {
        let f = fixture();
        let a = add(&f, gray());
        let source = f.sources.deregister(a.id()).unwrap();
        f.events.lock().unwrap().clear();

        source.set_dirty(Rect::new(0.0, 0.0, 1.0, 1.0));
        a.set_visible(false);
        assert!(f.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_follow_tracks_through() {
        let f = fixture();
        let synced = SyncedSliceSources::new(vec![0, 0, 0]);
        f.sources.follow(&synced);
        assert_eq!(f.sources.stack_id(), StackId::new(&[0, 0, 0]));

        synced.set_through(1, 3).unwrap();
        assert_eq!(f.sources.stack_id(), StackId::new(&[0, 3, 0]));
        assert!(f.events.lock().unwrap().contains(&StackEvent::StackIdChanged {
            old: StackId::new(&[0, 0, 0]),
            new: StackId::new(&[0, 3, 0]),
        }));
    }

    #[test]
    fn test_colortable_with_translucent_color() {
        let f = fixture();
        add(
            &f,
            LayerKind::Colortable {
                table: vec![Rgba([0, 0, 0, 0])],
                normalize: None,
                zero_transparent: false,
            },
        );
        add(&f, gray());
        assert_eq!(f.sources.first_fully_opaque(), Some(1));
    }
}
