//! Target layout and the duplication lock.

pub mod guard;
pub mod layout;

pub use guard::{DuplicationGuard, LockHandle, LockToken};
pub use layout::{TargetLayout, LOCKS_DIR};
