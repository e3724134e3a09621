//! Slicing: 2-D planes cut out of N-d data.
//!
//! A [`SliceProjection`] picks which two axes are displayed. A
//! [`SliceSource`] applies it to a data source at the current through
//! values, and [`SyncedSliceSources`] keeps several of them on the same
//! slice while the user navigates.

mod projection;
mod source;
mod synced;

pub use projection::SliceProjection;
pub use source::{SliceRequest, SliceSource, ThroughChange};
pub use synced::{StackId, SyncedSliceSources};
