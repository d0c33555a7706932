use serde::{Deserialize, Serialize};

/// Process exit codes, fixed by the external interface contract. Every
/// fallible boundary maps onto one of these rather than bubbling a raw
/// panic or an ad hoc integer to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    Ok = 0,
    RouteError = 10,
    ReceiptMissing = 11,
    HashMismatch = 12,
    PolicyViolation = 13,
    StalePlan = 14,
    Timeout = 15,
    CapReached = 16,
    StubDetected = 20,
}

impl ExitCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error taxonomy shared across components (spec §7), independent of any
/// single crate's `thiserror` enum. Each component error implements
/// `Into<ErrorKind>` so `xi-cli` can map any failure to an `ExitCode`
/// without matching on component-specific types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PolicyRefusal,
    StalePlan,
    HashMismatch,
    Timeout,
    CapReached,
    RouteError,
    ReceiptMissing,
    StubDetected,
    LedgerCorruption,
    ModelFailure,
    AdjudicationHalt,
}

impl From<ErrorKind> for ExitCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::RouteError => ExitCode::RouteError,
            ErrorKind::ReceiptMissing => ExitCode::ReceiptMissing,
            ErrorKind::HashMismatch => ExitCode::HashMismatch,
            ErrorKind::PolicyRefusal => ExitCode::PolicyViolation,
            ErrorKind::StalePlan => ExitCode::StalePlan,
            ErrorKind::Timeout => ExitCode::Timeout,
            ErrorKind::CapReached => ExitCode::CapReached,
            ErrorKind::StubDetected => ExitCode::StubDetected,
            // Ledger corruption self-heals (restore-from-backup or reset to
            // GENESIS); it never reaches the operator as a distinct exit
            // code, but if surfaced directly we treat it as a routing fault.
            ErrorKind::LedgerCorruption => ExitCode::RouteError,
            ErrorKind::ModelFailure => ExitCode::RouteError,
            // AdjudicationHalt is a first-class result, not an error (spec
            // §7); callers should branch on `AdjudicationResult::Halt`
            // before ever converting to an exit code. This mapping exists
            // only so the enum stays total.
            ErrorKind::AdjudicationHalt => ExitCode::Ok,
        }
    }
}
