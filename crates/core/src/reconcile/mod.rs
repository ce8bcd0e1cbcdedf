//! Selective change reconciliation.
//!
//! The reconciliation subsystem is responsible for:
//! 1. **Acceptance** -- tracking, per change unit, whether it will be merged.
//! 2. **Filtering** -- deriving the visible subset of a comparison.
//! 3. **Planning** -- projecting accepted changes into a minimal merge patch.
//! 4. **Sessions** -- owning the above for one comparison and driving the
//!    compare / merge round trips.

pub mod acceptance;
pub mod filter;
pub mod key;
pub mod plan;
pub mod session;

pub use acceptance::AcceptanceState;
pub use filter::{filter, FilteredView, VisibilityMode};
pub use key::{ChangeKey, ChangeKind, ParseChangeKeyError};
pub use plan::{build_plan, MergePatch};
pub use session::{MergeOutcome, ReconcileSession, Reconciler};
