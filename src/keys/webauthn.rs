//! Passkey assertion verification.

use p256::EncodedPoint;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::KeyDecodeError;
use crate::keys::UncompressedPoint;

/// Verify a WebAuthn assertion signature against a normalized device key.
///
/// The signed message is `authenticator_data ‖ SHA-256(client_data_json)`
/// per the WebAuthn spec. The signature may arrive DER-encoded or as a
/// raw 64-byte `r ‖ s` pair; both are accepted. Returns `Ok(false)` for a
/// well-formed key with a bad or malformed signature; errors only when
/// the key itself is not a valid curve point.
pub fn verify_webauthn_signature(
    key: &UncompressedPoint,
    authenticator_data: &[u8],
    client_data_json: &[u8],
    signature: &[u8],
) -> Result<bool, KeyDecodeError> {
    let point =
        EncodedPoint::from_bytes(key.as_bytes()).map_err(|e| KeyDecodeError::InvalidPoint {
            detail: e.to_string(),
        })?;
    let verifying_key =
        VerifyingKey::from_encoded_point(&point).map_err(|e| KeyDecodeError::InvalidPoint {
            detail: e.to_string(),
        })?;

    let Ok(signature) =
        Signature::from_der(signature).or_else(|_| Signature::from_slice(signature))
    else {
        return Ok(false);
    };

    let mut message = authenticator_data.to_vec();
    message.extend_from_slice(&Sha256::digest(client_data_json));

    Ok(verifying_key.verify(&message, &signature).is_ok())
}
