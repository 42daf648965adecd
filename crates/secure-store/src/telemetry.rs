//! Per-operation structured records
//!
//! Key names are logged as a truncated SHA-256 fingerprint. Values are never
//! passed to this module.

use std::time::Instant;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Error, ErrorCode};

/// One-way fingerprint of an identifier
pub fn fingerprint(identifier: &str) -> String {
    let digest = Sha256::digest(identifier.as_bytes());
    hex::encode(&digest[..8])
}

/// Timing and outcome record for one store operation
pub(crate) struct OpRecord {
    op: &'static str,
    key: Option<String>,
    started: Instant,
}

impl OpRecord {
    pub(crate) fn start(op: &'static str, key: Option<&str>) -> Self {
        Self {
            op,
            key: key.map(fingerprint),
            started: Instant::now(),
        }
    }

    /// Emit a success record; `outcome` names the backend or result
    pub(crate) fn ok(&self, outcome: &str) {
        debug!(
            op = self.op,
            key = self.key.as_deref().unwrap_or("-"),
            elapsed_ms = self.elapsed_ms(),
            outcome,
            "secure store operation completed"
        );
    }

    /// Emit a failure record and hand the error back
    pub(crate) fn fail(&self, err: Error) -> Error {
        let outcome = err.code().map(|c| c.as_str()).unwrap_or("INVALID_ARGUMENT");
        warn!(
            op = self.op,
            key = self.key.as_deref().unwrap_or("-"),
            elapsed_ms = self.elapsed_ms(),
            outcome,
            "secure store operation failed"
        );
        err
    }

    /// A keyring call failed but the operation continues on the file backend
    pub(crate) fn keyring_failed(&self, code: ErrorCode) {
        warn!(
            op = self.op,
            key = self.key.as_deref().unwrap_or("-"),
            code = code.as_str(),
            "keyring call failed, continuing with encrypted file fallback"
        );
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_stable_and_opaque() {
        let a = fingerprint("OPENAI_KEY");
        assert_eq!(a, fingerprint("OPENAI_KEY"));
        assert_eq!(a.len(), 16);
        assert!(!a.contains("OPENAI"));
        assert_ne!(a, fingerprint("openai_key"));
    }
}
