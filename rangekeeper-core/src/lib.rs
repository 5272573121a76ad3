//! rangekeeper core library
//!
//! Reservation engine for integer units ("ports", "ids") drawn from a fixed
//! universe `[min_id, max_id)` and shared by independent processes through
//! JSON documents on disk.
//!
//! # Key Components
//!
//! - **ReservedSpace**: occupied units as sorted, disjoint, non-adjacent ranges
//! - **Allocator**: scatter allocation of N free units, lowest gaps first
//! - **Store / Transaction**: lock-guarded load, mutate, commit cycles
//! - **Projects**: documents co-mutated with the reserved space
//!
//! # Example
//!
//! ```no_run
//! use rangekeeper_core::{EngineConfig, Store, UnitRange};
//!
//! # fn main() -> rangekeeper_core::Result<()> {
//! let store = Store::open(EngineConfig::from_env()?)?;
//!
//! let allocation = store.transact(|txn| txn.allocate(6))?;
//! println!("primary unit {}", allocation.primary);
//!
//! store.transact(|txn| txn.release(&allocation.ranges().collect::<Vec<UnitRange>>()))?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod interval_set;
pub mod lock;
pub mod projects;
pub mod range;
pub mod store;

// Re-export key types at crate root for convenience
pub use allocator::{Allocation, allocate};
pub use config::{CommitMode, EngineConfig};
pub use error::{RangeError, Result};
pub use interval_set::{LayoutViolation, ReservedSpace};
pub use projects::{LoadFileChange, ProjectChanges, ProjectId, ProjectRecord};
pub use range::{UnitId, UnitRange, Universe};
pub use store::{Store, Transaction};
