//! CLI command handlers, one file per command.

mod failures;
mod reconcile;
mod run;
mod status;
mod stop;

pub use failures::run_failures;
pub use reconcile::run_reconcile;
pub use run::{run_batches, RunArgs};
pub use status::run_status;
pub use stop::run_stop;
