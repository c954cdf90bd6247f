//! fundkey: passkey smart-account provisioning and transaction
//! orchestration for a Soroban-style ledger.
//!
//! The crate turns a WebAuthn passkey into a controlled account contract
//! and safely submits signed operations against it:
//!
//! - [`keys`] normalizes an untrusted COSE/CBOR device public key through
//!   a layered decoder chain and verifies passkey assertions.
//! - [`ledger`] derives contract addresses deterministically, matching
//!   the ledger's own hash-preimage computation byte for byte.
//! - [`pipeline`] drives the build → simulate → assemble → sign → submit
//!   lifecycle with a single bounded sequence-drift rebuild, and
//!   serializes every caller sharing a signing key through a per-signer
//!   queue.
//! - [`provision`] orchestrates the above into idempotent account
//!   deployment; [`engagement`] records game-state events with the
//!   shared recorder account.
//!
//! Queues only serialize callers within one process. Running several
//! processes against the same signing key is unsupported and will race
//! on sequence numbers.

pub mod config;
pub mod engagement;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod pipeline;
pub mod provision;
pub mod rpc;

pub use config::Config;
pub use engagement::EngagementRecorder;
pub use error::{Error, Result};
pub use keys::{UncompressedPoint, normalize, verify_webauthn_signature};
pub use ledger::{Address, contract_address};
pub use pipeline::{
    ConfirmMode, OperationSpec, PipelineResult, SignerHandle, SignerQueue, TransactionPipeline,
};
pub use provision::{Provisioned, ProvisioningService};
pub use rpc::{HttpLedgerRpc, LedgerRpc};
