//! Tree Operation Building Blocks
//!
//! Pure pieces the services are assembled from:
//!
//! - `PositionAllocator`: turns one structural change into a write plan
//!   (no I/O, fully unit-tested)
//! - `TreeError` / `TreeResult`: the engine's error taxonomy
//! - `CancelSignal` / `CancelTrigger`: cooperative cancellation for long scans

pub mod allocator;
pub mod cancel;
pub mod error;

pub use allocator::{
    InsertPlan, MovePlan, PositionAllocator, RelocatePlan, RemovePlan, SiblingSlot, SwapPlan,
};
pub use cancel::{CancelSignal, CancelTrigger};
pub use error::{TreeError, TreeResult};
