pub mod fsops;
pub mod lock;
pub mod run;

pub use fsops::{delete, patch, read, write, ReadOutcome};
pub use lock::{force_release, status, LockError, WorkspaceLock};
pub use run::{run as run_command, RunOutput};
