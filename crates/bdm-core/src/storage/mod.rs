//! Managed-root storage: usage accounting for admission and quarantine moves.

mod quarantine;
mod usage;

pub use quarantine::Quarantine;
pub use usage::{available_space, Admission, StorageGuard};
