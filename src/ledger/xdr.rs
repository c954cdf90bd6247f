//! Canonical binary encoding for ledger structures.
//!
//! A minimal big-endian XDR writer covering exactly the structures this
//! pipeline produces: the contract-id hash preimage, host-function
//! invocation transactions, and signed transaction envelopes. The byte
//! layout must match the ledger's own serialization exactly; the
//! derivation and signing code hashes these bytes directly.
//!
//! Simulation artifacts (`SorobanTransactionData`, authorization entries)
//! are carried as opaque pre-encoded blobs and spliced in verbatim, so the
//! assembled envelope stays byte-faithful without this module modeling the
//! resource structures.

use crate::error::AddressError;

const ENVELOPE_TYPE_TX: u32 = 2;
const ENVELOPE_TYPE_CONTRACT_ID: u32 = 8;
const CONTRACT_ID_PREIMAGE_FROM_ADDRESS: u32 = 0;

const SC_ADDRESS_TYPE_ACCOUNT: u32 = 0;
const SC_ADDRESS_TYPE_CONTRACT: u32 = 1;

const SCV_BOOL: u32 = 0;
const SCV_U32: u32 = 3;
const SCV_U64: u32 = 5;
const SCV_I128: u32 = 10;
const SCV_BYTES: u32 = 13;
const SCV_STRING: u32 = 14;
const SCV_SYMBOL: u32 = 15;
const SCV_VEC: u32 = 16;
const SCV_ADDRESS: u32 = 18;

const OP_INVOKE_HOST_FUNCTION: u32 = 24;
const HOST_FUNCTION_TYPE_INVOKE_CONTRACT: u32 = 0;

const PRECOND_NONE: u32 = 0;
const PRECOND_TIME: u32 = 1;
const MEMO_NONE: u32 = 0;

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_i64(out: &mut Vec<u8>, v: i64) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Variable-length opaque data: length prefix plus zero padding to a
/// four-byte boundary. XDR strings share this layout.
fn put_var(out: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
    let pad = (4 - bytes.len() % 4) % 4;
    out.extend_from_slice(&[0u8; 3][..pad]);
}

/// An account or contract address as the ledger encodes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScAddress {
    Account([u8; 32]),
    Contract([u8; 32]),
}

impl ScAddress {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Account(key) => {
                put_u32(out, SC_ADDRESS_TYPE_ACCOUNT);
                // AccountID wraps an ed25519 public key discriminant.
                put_u32(out, 0);
                out.extend_from_slice(key);
            }
            Self::Contract(id) => {
                put_u32(out, SC_ADDRESS_TYPE_CONTRACT);
                out.extend_from_slice(id);
            }
        }
    }
}

/// The host-value subset the pipeline encodes as invocation arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScVal {
    Bool(bool),
    U32(u32),
    U64(u64),
    I128(i128),
    Bytes(Vec<u8>),
    String(String),
    Symbol(String),
    Vec(Vec<ScVal>),
    Address(ScAddress),
}

impl ScVal {
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Bool(b) => {
                put_u32(out, SCV_BOOL);
                put_u32(out, u32::from(*b));
            }
            Self::U32(v) => {
                put_u32(out, SCV_U32);
                put_u32(out, *v);
            }
            Self::U64(v) => {
                put_u32(out, SCV_U64);
                put_u64(out, *v);
            }
            Self::I128(v) => {
                put_u32(out, SCV_I128);
                put_i64(out, (*v >> 64) as i64);
                put_u64(out, *v as u64);
            }
            Self::Bytes(b) => {
                put_u32(out, SCV_BYTES);
                put_var(out, b);
            }
            Self::String(s) => {
                put_u32(out, SCV_STRING);
                put_var(out, s.as_bytes());
            }
            Self::Symbol(s) => {
                put_u32(out, SCV_SYMBOL);
                put_var(out, s.as_bytes());
            }
            Self::Vec(items) => {
                put_u32(out, SCV_VEC);
                // The vec arm is optional in the ledger schema.
                put_u32(out, 1);
                put_u32(out, items.len() as u32);
                for item in items {
                    item.encode(out);
                }
            }
            Self::Address(addr) => {
                put_u32(out, SCV_ADDRESS);
                addr.encode(out);
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

/// Decode an encoded boolean host value. Used to read simulate-only
/// return values such as role checks.
pub fn decode_bool(raw: &[u8]) -> Option<bool> {
    if raw.len() != 8 {
        return None;
    }
    let disc = u32::from_be_bytes(raw[0..4].try_into().ok()?);
    let val = u32::from_be_bytes(raw[4..8].try_into().ok()?);
    if disc != SCV_BOOL || val > 1 {
        return None;
    }
    Some(val == 1)
}

/// Validate a contract function symbol: at most 32 characters from
/// `[A-Za-z0-9_]`.
pub fn validate_symbol(symbol: &str) -> Result<(), AddressError> {
    let valid = !symbol.is_empty()
        && symbol.len() <= 32
        && symbol
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(AddressError::InvalidSymbol(symbol.to_string()))
    }
}

/// Hash preimage for a contract deployed from `{factory address, salt}`.
///
/// `sha256(encode(self))` is the contract id, reproducible by any party
/// holding the same network id, deployer address, and salt.
#[derive(Debug, Clone)]
pub struct ContractIdPreimage {
    pub network_id: [u8; 32],
    pub deployer: ScAddress,
    pub salt: [u8; 32],
}

impl ContractIdPreimage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(108);
        put_u32(&mut out, ENVELOPE_TYPE_CONTRACT_ID);
        out.extend_from_slice(&self.network_id);
        put_u32(&mut out, CONTRACT_ID_PREIMAGE_FROM_ADDRESS);
        self.deployer.encode(&mut out);
        out.extend_from_slice(&self.salt);
        out
    }
}

/// A single host-function invocation operation.
#[derive(Debug, Clone)]
pub struct InvokeHostFunctionOp {
    pub contract: ScAddress,
    pub function: String,
    pub args: Vec<ScVal>,
    /// Pre-encoded authorization entries from simulation, spliced verbatim.
    pub auth: Vec<Vec<u8>>,
}

impl InvokeHostFunctionOp {
    fn encode(&self, out: &mut Vec<u8>) {
        // No per-operation source account.
        put_u32(out, 0);
        put_u32(out, OP_INVOKE_HOST_FUNCTION);
        put_u32(out, HOST_FUNCTION_TYPE_INVOKE_CONTRACT);
        self.contract.encode(out);
        put_var(out, self.function.as_bytes());
        put_u32(out, self.args.len() as u32);
        for arg in &self.args {
            arg.encode(out);
        }
        put_u32(out, self.auth.len() as u32);
        for entry in &self.auth {
            out.extend_from_slice(entry);
        }
    }
}

/// A single-operation transaction against a source account.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Ed25519 public key of the source account.
    pub source: [u8; 32],
    pub fee: u32,
    pub seq_num: i64,
    /// `(min_time, max_time)` validity bounds; `None` encodes no
    /// preconditions at all.
    pub time_bounds: Option<(u64, u64)>,
    pub operation: InvokeHostFunctionOp,
    /// Pre-encoded resource footprint from simulation, spliced verbatim.
    pub soroban_data: Option<Vec<u8>>,
}

impl Transaction {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // MuxedAccount, ed25519 arm.
        put_u32(&mut out, 0);
        out.extend_from_slice(&self.source);
        put_u32(&mut out, self.fee);
        put_i64(&mut out, self.seq_num);
        match self.time_bounds {
            Some((min, max)) => {
                put_u32(&mut out, PRECOND_TIME);
                put_u64(&mut out, min);
                put_u64(&mut out, max);
            }
            None => put_u32(&mut out, PRECOND_NONE),
        }
        put_u32(&mut out, MEMO_NONE);
        // Operation count is fixed at one for this pipeline.
        put_u32(&mut out, 1);
        self.operation.encode(&mut out);
        match &self.soroban_data {
            Some(data) => {
                put_u32(&mut out, 1);
                out.extend_from_slice(data);
            }
            None => put_u32(&mut out, 0),
        }
        out
    }

    /// The payload whose SHA-256 is both the signing input and the
    /// transaction hash: `network_id ‖ envelope_type_tx ‖ transaction`.
    pub fn signature_payload(&self, network_id: &[u8; 32]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(network_id);
        put_u32(&mut out, ENVELOPE_TYPE_TX);
        out.extend_from_slice(&self.to_bytes());
        out
    }
}

/// A signature with the four-byte public-key hint the ledger uses to
/// match signatures to signers.
#[derive(Debug, Clone)]
pub struct DecoratedSignature {
    pub hint: [u8; 4],
    pub signature: [u8; 64],
}

/// Encode a signed (or, with no signatures, simulation-ready) envelope.
pub fn encode_envelope(tx: &Transaction, signatures: &[DecoratedSignature]) -> Vec<u8> {
    let mut out = Vec::new();
    put_u32(&mut out, ENVELOPE_TYPE_TX);
    out.extend_from_slice(&tx.to_bytes());
    put_u32(&mut out, signatures.len() as u32);
    for sig in signatures {
        out.extend_from_slice(&sig.hint);
        put_var(&mut out, &sig.signature);
    }
    out
}
