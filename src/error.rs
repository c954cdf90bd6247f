//! Error types for fundkey.

use serde_json::Value;

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Key decode error: {0}")]
    KeyDecode(#[from] KeyDecodeError),

    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),
}

/// Configuration-related errors.
///
/// These signal operator problems (missing secrets, malformed endpoints)
/// and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid endpoint URL for {key}: {message}")]
    InvalidEndpoint { key: String, message: String },
}

/// Failures while normalizing an untrusted COSE/CBOR device public key.
///
/// Every variant carries the full hex of the original input so a rejected
/// key can be diagnosed offline without replaying the registration.
#[derive(Debug, thiserror::Error)]
pub enum KeyDecodeError {
    #[error("no decoder could extract key fields from input {input_hex}")]
    Undecodable { input_hex: String },

    #[error("unsupported key type {kty:?} (expected EC2) in input {input_hex}")]
    UnsupportedKeyType { kty: Option<i64>, input_hex: String },

    #[error("unsupported algorithm {alg:?} (expected ES256) in input {input_hex}")]
    UnsupportedAlgorithm { alg: Option<i64>, input_hex: String },

    #[error("unsupported curve {crv:?} (expected P-256) in input {input_hex}")]
    UnsupportedCurve { crv: Option<i64>, input_hex: String },

    #[error("{axis} coordinate is {len} bytes (expected 32) in input {input_hex}")]
    BadCoordinateLength {
        axis: &'static str,
        len: usize,
        input_hex: String,
    },

    #[error("{axis} coordinate is all-zero in input {input_hex}")]
    ZeroCoordinate {
        axis: &'static str,
        input_hex: String,
    },

    #[error("public key point is not a valid curve point: {detail}")]
    InvalidPoint { detail: String },
}

/// Strkey encoding/decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("strkey is not valid base32: {0}")]
    Base32(String),

    #[error("strkey payload is {len} bytes (expected {expected})")]
    BadLength { len: usize, expected: usize },

    #[error("strkey checksum mismatch")]
    BadChecksum,

    #[error("unexpected strkey version byte {got:#04x} (expected {expected:#04x})")]
    UnexpectedVersion { got: u8, expected: u8 },

    #[error("symbol '{0}' exceeds 32 characters or contains invalid characters")]
    InvalidSymbol(String),
}

/// Transaction pipeline errors.
///
/// Everything here is fatal for the current run. The only internally
/// retried condition, a first sequence drift, never surfaces; the
/// `SequenceDrift` variant reports a drift seen *after* the one allowed
/// rebuild.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("simulation failed: {detail}")]
    Simulation { detail: String },

    #[error("simulation requires ledger state restore: {detail}")]
    RestoreRequired { detail: String },

    #[error("sequence drifted again after rebuild (built against {built}, live {live})")]
    SequenceDrift { built: i64, live: i64 },

    #[error("submission rejected with status {status}: {raw}")]
    Submission { status: String, raw: String },

    #[error("transaction {hash} failed on-chain: {result}")]
    TransactionFailed { hash: String, result: String },

    #[error("transaction {hash} not confirmed after {attempts} polls")]
    ConfirmationTimeout { hash: String, attempts: u32 },

    #[error("RPC call {method} timed out")]
    RpcTimeout { method: String },

    #[error("RPC call {method} returned error {code}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("malformed response from {method}: {raw}")]
    MalformedResponse { method: String, raw: Value },

    #[error("invalid operation: {detail}")]
    InvalidOperation { detail: String },

    #[error("account {0} not found on the ledger")]
    AccountNotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Account provisioning errors.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("factory contract {address} does not exist on-chain")]
    FactoryMissing { address: String },

    #[error("funding account {address} does not exist on-chain")]
    FundingAccountMissing { address: String },

    #[error("controller initialization failed: {0}")]
    ControllerInitFailed(#[source] PipelineError),

    #[error(transparent)]
    KeyDecode(#[from] KeyDecodeError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
