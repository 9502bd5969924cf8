//! Webhook authentication: hex-encoded HMAC-SHA512 of the raw request body.

use hmac::{Hmac, Mac};
use sha2::Sha512;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,
    #[error("signature does not match payload")]
    Mismatch,
    #[error("signing key rejected")]
    InvalidKey,
}

pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, SignatureError> {
    let mut mac = HmacSha512::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify(secret: &[u8], body: &[u8], signature: &str) -> Result<(), SignatureError> {
    let signature = signature.trim();
    if signature.is_empty() {
        return Err(SignatureError::Missing);
    }

    let provided = hex::decode(signature).map_err(|_| SignatureError::Mismatch)?;
    let mut mac = HmacSha512::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| SignatureError::Mismatch)
}
