use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of raw bytes. Shared by the Atomic Tool Executor's
/// write verification and the Audit Ledger's chain hashing.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
