pub mod config;
pub mod exitcode;
pub mod hash;
pub mod observe;
pub mod paths;
pub mod types;

pub use config::AppConfig;
pub use exitcode::{ErrorKind, ExitCode};
pub use hash::sha256_hex;
pub use observe::Observer;
pub use types::{
    ActionReceipt, AdjudicationResult, Claim, ClaimGroup, ClassifiedQuery, LedgerEntry, Mode,
    QueryScope, StateBlob, ToolOp, HIDDEN_SENTINEL,
};
