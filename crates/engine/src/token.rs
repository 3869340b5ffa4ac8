//! Cancellation tokens
//!
//! A token is a keyed SHA-256 digest of an event's id and creation time,
//! URL-safe base64 without padding (43 characters). It is never stored:
//! the same event always yields the same token, so a caller handing out a
//! cancel link can be checked later without any lookup table.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use velostore_core::{VeloError, VeloResult};

use crate::event::Event;

/// Length of every token
pub const TOKEN_LEN: usize = 43;

const TOKEN_VERSION: &[u8] = b"1";

/// Issues and checks cancellation tokens
#[derive(Clone)]
pub struct CancellationTokens {
    secret: Vec<u8>,
}

impl std::fmt::Debug for CancellationTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationTokens").finish_non_exhaustive()
    }
}

impl CancellationTokens {
    /// Keyed by `secret`
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Token for a stored event
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an event without an id.
    pub fn issue(&self, event: &Event) -> VeloResult<String> {
        let id = event
            .id
            .ok_or_else(|| VeloError::invalid_input("cannot issue a token for an unsaved event"))?;
        let digest = Sha256::new()
            .chain_update(TOKEN_VERSION)
            .chain_update(b":")
            .chain_update(&self.secret)
            .chain_update(b":")
            .chain_update(id.to_raw()?.to_string())
            .chain_update(b":")
            .chain_update(event.created_at.as_micros().to_string())
            .chain_update(b":")
            .chain_update(&self.secret)
            .finalize();
        Ok(URL_SAFE_NO_PAD.encode(digest))
    }

    /// Whether `token` belongs to `event`
    pub fn verify(&self, event: &Event, token: &str) -> VeloResult<bool> {
        let expected = self.issue(event)?;
        Ok(constant_time_eq(expected.as_bytes(), token.as_bytes()))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
