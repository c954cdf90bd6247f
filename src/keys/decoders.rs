//! The ordered COSE decoder chain.
//!
//! Each decoder attempts to pull the COSE EC2 fields out of an untrusted
//! blob and answers `None` when it cannot; the normalizer tries them in
//! sequence. Two independent CBOR libraries come first as a hedge against
//! decoder bugs, then a fixed-shape byte walk that serves as ground truth
//! for the canonical WebAuthn encoding, and finally a raw marker scan
//! that ignores structure entirely.

use minicbor::data::Type;

/// COSE key-label constants (RFC 9052 §7).
pub(crate) const LABEL_KTY: i64 = 1;
pub(crate) const LABEL_ALG: i64 = 3;
pub(crate) const LABEL_CRV: i64 = -1;
pub(crate) const LABEL_X: i64 = -2;
pub(crate) const LABEL_Y: i64 = -3;

/// Fields extracted from a COSE EC2 key map. `kty`/`alg`/`crv` stay
/// `None` when the producing decoder could not recover them (only the
/// marker scanner ever leaves them unset).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct CoseKeyFields {
    pub kty: Option<i64>,
    pub alg: Option<i64>,
    pub crv: Option<i64>,
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

impl CoseKeyFields {
    fn has_coordinates(&self) -> bool {
        !self.x.is_empty() && !self.y.is_empty()
    }
}

pub(crate) trait CoseDecoder {
    fn name(&self) -> &'static str;

    /// `Some` only when both coordinates were extracted; everything else
    /// falls through to the next decoder in the chain.
    fn decode(&self, raw: &[u8]) -> Option<CoseKeyFields>;
}

/// Some decoders surface the negative COSE labels as their unsigned
/// single-byte representation (-1 → 255, -2 → 254, -3 → 253).
fn normalize_label(label: i128) -> Option<i64> {
    match label {
        255 => Some(LABEL_CRV),
        254 => Some(LABEL_X),
        253 => Some(LABEL_Y),
        other => i64::try_from(other).ok(),
    }
}

/// Structured decode via `ciborium`.
pub(crate) struct CiboriumDecoder;

impl CoseDecoder for CiboriumDecoder {
    fn name(&self) -> &'static str {
        "ciborium"
    }

    fn decode(&self, raw: &[u8]) -> Option<CoseKeyFields> {
        use ciborium::value::Value;

        let value: Value = ciborium::de::from_reader(raw).ok()?;
        let Value::Map(entries) = value else {
            return None;
        };
        if entries.is_empty() {
            return None;
        }

        let mut fields = CoseKeyFields::default();
        for (key, val) in entries {
            let Value::Integer(label) = key else {
                continue;
            };
            let Some(label) = normalize_label(i128::from(label)) else {
                continue;
            };
            match (label, val) {
                (LABEL_KTY, Value::Integer(v)) => fields.kty = i64::try_from(i128::from(v)).ok(),
                (LABEL_ALG, Value::Integer(v)) => fields.alg = i64::try_from(i128::from(v)).ok(),
                (LABEL_CRV, Value::Integer(v)) => fields.crv = i64::try_from(i128::from(v)).ok(),
                (LABEL_X, Value::Bytes(b)) => fields.x = b,
                (LABEL_Y, Value::Bytes(b)) => fields.y = b,
                _ => {}
            }
        }
        fields.has_coordinates().then_some(fields)
    }
}

/// Structured decode via `minicbor`, independent of `ciborium`.
pub(crate) struct MinicborDecoder;

impl CoseDecoder for MinicborDecoder {
    fn name(&self) -> &'static str {
        "minicbor"
    }

    fn decode(&self, raw: &[u8]) -> Option<CoseKeyFields> {
        let mut d = minicbor::Decoder::new(raw);
        let len = d.map().ok()??;
        if len == 0 {
            return None;
        }

        let mut fields = CoseKeyFields::default();
        for _ in 0..len {
            let label = match d.datatype().ok()? {
                Type::U8 | Type::U16 | Type::U32 | Type::U64 | Type::I8 | Type::I16
                | Type::I32 | Type::I64 | Type::Int => {
                    let int = d.int().ok()?;
                    normalize_label(i128::from(int))
                }
                _ => {
                    d.skip().ok()?;
                    d.skip().ok()?;
                    continue;
                }
            };
            match d.datatype().ok()? {
                Type::Bytes => {
                    let bytes = d.bytes().ok()?.to_vec();
                    match label {
                        Some(LABEL_X) => fields.x = bytes,
                        Some(LABEL_Y) => fields.y = bytes,
                        _ => {}
                    }
                }
                Type::U8 | Type::U16 | Type::U32 | Type::U64 | Type::I8 | Type::I16
                | Type::I32 | Type::I64 | Type::Int => {
                    let value = i64::try_from(d.int().ok()?).ok();
                    match label {
                        Some(LABEL_KTY) => fields.kty = value,
                        Some(LABEL_ALG) => fields.alg = value,
                        Some(LABEL_CRV) => fields.crv = value,
                        _ => {}
                    }
                }
                _ => d.skip().ok()?,
            }
        }
        fields.has_coordinates().then_some(fields)
    }
}

/// Manual byte-offset decode of the canonical 5-entry COSE EC2 map.
///
/// General CBOR decoders occasionally choke on COSE's integer-key
/// encoding; this fixed walk of the known 77-byte shape is the ground
/// truth. Expected layout:
///
/// ```text
/// a5            map(5)
/// 01 <kty>      1: key type
/// 03 <alg>      3: algorithm
/// 20 <crv>      -1: curve
/// 21 58 20 <32> -2: x coordinate
/// 22 58 20 <32> -3: y coordinate
/// ```
pub(crate) struct ByteWalkDecoder;

/// Decode a single-byte CBOR integer (small uint or small negative).
fn small_int(byte: u8) -> Option<i64> {
    match byte {
        0x00..=0x17 => Some(i64::from(byte)),
        0x20..=0x37 => Some(-1 - i64::from(byte - 0x20)),
        _ => None,
    }
}

impl CoseDecoder for ByteWalkDecoder {
    fn name(&self) -> &'static str {
        "byte-walk"
    }

    fn decode(&self, raw: &[u8]) -> Option<CoseKeyFields> {
        if raw.len() != 77 || raw[0] != 0xa5 {
            return None;
        }
        if raw[1] != 0x01 || raw[3] != 0x03 || raw[5] != 0x20 {
            return None;
        }
        if raw[7] != 0x21 || raw[8] != 0x58 || raw[9] != 0x20 {
            return None;
        }
        if raw[42] != 0x22 || raw[43] != 0x58 || raw[44] != 0x20 {
            return None;
        }
        Some(CoseKeyFields {
            kty: small_int(raw[2]),
            alg: small_int(raw[4]),
            crv: small_int(raw[6]),
            x: raw[10..42].to_vec(),
            y: raw[45..77].to_vec(),
        })
    }
}

/// Last-resort scan for the coordinate markers anywhere in the blob,
/// ignoring overall structure. Reached only after every structural
/// decoder has failed, so the integer fields are unrecoverable and stay
/// unset.
pub(crate) struct MarkerScanDecoder;

fn scan_coordinate(raw: &[u8], marker: &[u8; 3]) -> Option<Vec<u8>> {
    let pos = raw.windows(3).position(|w| w == marker)?;
    let start = pos + 3;
    raw.get(start..start + 32).map(<[u8]>::to_vec)
}

impl CoseDecoder for MarkerScanDecoder {
    fn name(&self) -> &'static str {
        "marker-scan"
    }

    fn decode(&self, raw: &[u8]) -> Option<CoseKeyFields> {
        let x = scan_coordinate(raw, &[0x21, 0x58, 0x20])?;
        let y = scan_coordinate(raw, &[0x22, 0x58, 0x20])?;
        Some(CoseKeyFields {
            kty: None,
            alg: None,
            crv: None,
            x,
            y,
        })
    }
}
