//! Slice sources that navigate together.

use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::ProjectionError;
use crate::signal::Signal;
use crate::sync::{read, write};

use super::source::SliceSource;

/// The through values of the current view.
///
/// Every distinct value is a separate cache generation. Going back to an
/// earlier slice produces an equal `StackId`, so its tiles are still cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StackId(Arc<[usize]>);

impl StackId {
    pub fn new(through: &[usize]) -> Self {
        StackId(Arc::from(through))
    }

    pub fn through(&self) -> &[usize] {
        &self.0
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &self.0[..])
    }
}

/// A group of [`SliceSource`]s sharing one set of through values.
///
/// Members must all use projections with the same number of along axes.
pub struct SyncedSliceSources {
    through: RwLock<Vec<usize>>,
    sources: RwLock<Vec<Arc<SliceSource>>>,
    through_changed: Signal<(StackId, StackId)>,
}

impl SyncedSliceSources {
    pub fn new(through: Vec<usize>) -> Self {
        Self {
            through: RwLock::new(through),
            sources: RwLock::new(Vec::new()),
            through_changed: Signal::new(),
        }
    }

    /// Add a member and move it to the group's through values.
    pub fn add(&self, source: Arc<SliceSource>) -> Result<(), ProjectionError> {
        let through = self.through();
        source.set_through_all(&through)?;
        write(&self.sources).push(source);
        Ok(())
    }

    /// Remove a member. Returns whether it was present.
    pub fn remove(&self, source: &Arc<SliceSource>) -> bool {
        let mut sources = write(&self.sources);
        let before = sources.len();
        sources.retain(|s| !Arc::ptr_eq(s, source));
        sources.len() != before
    }

    pub fn len(&self) -> usize {
        read(&self.sources).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn through(&self) -> Vec<usize> {
        read(&self.through).clone()
    }

    pub fn stack_id(&self) -> StackId {
        StackId::new(&read(&self.through))
    }

    /// Move one through coordinate for every member.
    pub fn set_through(&self, index: usize, value: usize) -> Result<(), ProjectionError> {
        let mut through = self.through();
        let len = through.len();
        let slot = through
            .get_mut(index)
            .ok_or(ProjectionError::ThroughIndex { index, len })?;
        if *slot == value {
            return Ok(());
        }
        *slot = value;
        self.set_through_all(&through)
    }

    /// Move every through coordinate for every member.
    pub fn set_through_all(&self, values: &[usize]) -> Result<(), ProjectionError> {
        let old = {
            let through = read(&self.through);
            if values.len() != through.len() {
                return Err(ProjectionError::ThroughLength {
                    expected: through.len(),
                    actual: values.len(),
                });
            }
            if through.as_slice() == values {
                return Ok(());
            }
            StackId::new(&through)
        };

        let sources = read(&self.sources).clone();
        for source in &sources {
            source.set_through_all(values)?;
        }
        *write(&self.through) = values.to_vec();

        let new = StackId::new(values);
        debug!("Through values moved from {} to {}", old, new);
        self.through_changed.emit(&(old, new));
        Ok(())
    }

    /// Emits `(old, new)` stack ids after members have moved.
    pub fn through_changed_signal(&self) -> &Signal<(StackId, StackId)> {
        &self.through_changed
    }
}
