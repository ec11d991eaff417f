//! Pipeline entry points for the watcher.
//!
//! - `NewsWatcher`: one diff-and-notify pass, or a seed pass
//! - `run_forever`: fixed-interval scheduler with heartbeat and shutdown

pub mod schedule;
pub mod watch;

pub use schedule::{run_forever, run_until};
pub use watch::{NewsWatcher, PassOutcome, PassReport};
