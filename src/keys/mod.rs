//! Device public-key normalization.
//!
//! WebAuthn registration hands us an attacker-influenced blob that is
//! either an already-uncompressed P-256 point or a COSE/CBOR key map in
//! one of several ambiguous encodings. Normalization runs an ordered
//! decoder chain (see [`decoders`]) and applies one uniform validation
//! pass to whatever the chain produces. A key that fails validation is
//! rejected outright; nothing here ever substitutes a default key.

mod decoders;
mod webauthn;

pub use webauthn::verify_webauthn_signature;

use tracing::debug;

use crate::error::KeyDecodeError;
use decoders::{
    ByteWalkDecoder, CiboriumDecoder, CoseDecoder, CoseKeyFields, MarkerScanDecoder,
    MinicborDecoder,
};

/// COSE key type for elliptic-curve keys with x/y coordinates.
const COSE_KTY_EC2: i64 = 2;
/// COSE algorithm identifier for ECDSA with SHA-256.
const COSE_ALG_ES256: i64 = -7;
/// COSE curve identifier for P-256.
const COSE_CRV_P256: i64 = 1;

/// Marker byte of an uncompressed SEC1 point.
const UNCOMPRESSED_MARKER: u8 = 0x04;

/// A 65-byte uncompressed P-256 public key: `0x04 ‖ X ‖ Y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncompressedPoint([u8; 65]);

impl UncompressedPoint {
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    fn from_coordinates(x: &[u8], y: &[u8]) -> Self {
        let mut bytes = [0u8; 65];
        bytes[0] = UNCOMPRESSED_MARKER;
        bytes[1..33].copy_from_slice(x);
        bytes[33..65].copy_from_slice(y);
        Self(bytes)
    }
}

/// Normalize an untrusted device public key into an uncompressed point.
///
/// Fast path: a 65-byte input already carrying the uncompressed marker is
/// validated and returned without invoking any CBOR decoder. Otherwise
/// the decoder chain runs in order; the first decoder to extract
/// coordinates wins and its output goes through [`validate`]. A decoder
/// that cannot parse the blob falls through to the next; a decoder that
/// parses it into *invalid* fields is terminal.
pub fn normalize(raw: &[u8]) -> Result<UncompressedPoint, KeyDecodeError> {
    if raw.len() == 65 && raw[0] == UNCOMPRESSED_MARKER {
        let fields = CoseKeyFields {
            kty: Some(COSE_KTY_EC2),
            alg: Some(COSE_ALG_ES256),
            crv: Some(COSE_CRV_P256),
            x: raw[1..33].to_vec(),
            y: raw[33..65].to_vec(),
        };
        return validate(&fields, raw);
    }

    let chain: [&dyn CoseDecoder; 4] = [
        &CiboriumDecoder,
        &MinicborDecoder,
        &ByteWalkDecoder,
        &MarkerScanDecoder,
    ];
    for decoder in chain {
        if let Some(fields) = decoder.decode(raw) {
            debug!(decoder = decoder.name(), "device key decoded");
            return validate(&fields, raw);
        }
    }

    Err(KeyDecodeError::Undecodable {
        input_hex: hex::encode(raw),
    })
}

/// Uniform validation applied regardless of which decoder produced the
/// fields. The integer fields are checked when recoverable (only the
/// last-resort marker scan loses them); the coordinates are always
/// checked for exact length and non-zero content.
fn validate(fields: &CoseKeyFields, raw: &[u8]) -> Result<UncompressedPoint, KeyDecodeError> {
    let input_hex = hex::encode(raw);

    if fields.kty.is_some_and(|kty| kty != COSE_KTY_EC2) {
        return Err(KeyDecodeError::UnsupportedKeyType {
            kty: fields.kty,
            input_hex,
        });
    }
    if fields.alg.is_some_and(|alg| alg != COSE_ALG_ES256) {
        return Err(KeyDecodeError::UnsupportedAlgorithm {
            alg: fields.alg,
            input_hex,
        });
    }
    if fields.crv.is_some_and(|crv| crv != COSE_CRV_P256) {
        return Err(KeyDecodeError::UnsupportedCurve {
            crv: fields.crv,
            input_hex,
        });
    }
    for (axis, coord) in [("x", &fields.x), ("y", &fields.y)] {
        if coord.len() != 32 {
            return Err(KeyDecodeError::BadCoordinateLength {
                axis,
                len: coord.len(),
                input_hex,
            });
        }
        if coord.iter().all(|&b| b == 0) {
            return Err(KeyDecodeError::ZeroCoordinate { axis, input_hex });
        }
    }
    Ok(UncompressedPoint::from_coordinates(&fields.x, &fields.y))
}
