//! Transaction build → simulate → assemble → sign → submit pipeline.
//!
//! One [`TransactionPipeline::run`] call carries exactly one logical
//! transaction through the lifecycle. The only internal retry is the
//! bounded sequence-drift rebuild: after a successful simulation the
//! signer's live sequence is re-fetched, and if it moved during the dry
//! run the envelope is rebuilt from scratch against the fresh sequence,
//! exactly once. Everything else is fatal and surfaced to the caller.

mod queue;

pub use queue::SignerQueue;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signer as _, SigningKey};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{AddressError, PipelineError};
use crate::ledger::xdr::{
    DecoratedSignature, InvokeHostFunctionOp, ScVal, Transaction, encode_envelope,
    validate_symbol,
};
use crate::ledger::{Address, network_id, strkey};
use crate::rpc::horizon::HorizonClient;
use crate::rpc::{LedgerRpc, SendStatus, Simulation, TxStatus};

/// A signing identity plus the queue serializing its submissions.
///
/// The queue lives on the handle so every signer in the process gets its
/// own serialization domain automatically.
pub struct SignerHandle {
    public: [u8; 32],
    signing_key: SigningKey,
    queue: SignerQueue,
}

impl SignerHandle {
    /// Build a handle from a strkey-encoded secret seed (`S…`).
    pub fn from_seed(seed: &str) -> Result<Self, AddressError> {
        let seed_bytes = strkey::decode(strkey::VERSION_SEED, seed)?;
        let signing_key = SigningKey::from_bytes(&seed_bytes);
        Ok(Self {
            public: signing_key.verifying_key().to_bytes(),
            signing_key,
            queue: SignerQueue::new(),
        })
    }

    pub fn address(&self) -> Address {
        Address::Account(self.public)
    }

    pub fn account_id(&self) -> String {
        self.address().to_string()
    }

    pub fn queue(&self) -> &SignerQueue {
        &self.queue
    }

    /// Sign a transaction hash, decorated with the key hint the ledger
    /// uses to match signatures to signers.
    fn sign_hash(&self, hash: &[u8; 32]) -> DecoratedSignature {
        let mut hint = [0u8; 4];
        hint.copy_from_slice(&self.public[28..]);
        DecoratedSignature {
            hint,
            signature: self.signing_key.sign(hash).to_bytes(),
        }
    }
}

/// One contract invocation to run through the pipeline.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub contract: Address,
    pub function: String,
    pub args: Vec<ScVal>,
}

impl OperationSpec {
    pub fn new(
        contract: Address,
        function: impl Into<String>,
        args: Vec<ScVal>,
    ) -> Result<Self, AddressError> {
        let function = function.into();
        validate_symbol(&function)?;
        Ok(Self {
            contract,
            function,
            args,
        })
    }
}

/// Whether to poll for final inclusion after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMode {
    /// Return as soon as the network acknowledges the submission.
    Acknowledged,
    /// Poll `getTransaction` on a bounded budget until the transaction
    /// lands or the budget is exhausted.
    Confirmed,
}

/// Outcome of a completed pipeline run. Constructed once at submission
/// end and never mutated.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub hash: String,
    pub return_value: Option<Vec<u8>>,
    pub fee: u32,
}

/// Tunables for envelope construction and confirmation polling.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Fee offered before simulation resources are added, in stroops.
    pub base_fee: u32,
    /// Envelope validity window. Operations are simulated and submitted
    /// promptly, never queued for later.
    pub tx_timeout: Duration,
    pub confirm_attempts: u32,
    pub confirm_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            base_fee: 100,
            tx_timeout: Duration::from_secs(30),
            confirm_attempts: 30,
            confirm_interval: Duration::from_secs(1),
        }
    }
}

/// The build/simulate/assemble/sign/submit state machine.
pub struct TransactionPipeline {
    rpc: Arc<dyn LedgerRpc>,
    horizon: Option<HorizonClient>,
    network_id: [u8; 32],
    settings: PipelineSettings,
}

impl TransactionPipeline {
    pub fn new(
        rpc: Arc<dyn LedgerRpc>,
        network_passphrase: &str,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            rpc,
            horizon: None,
            network_id: network_id(network_passphrase),
            settings,
        }
    }

    /// Route submissions through a horizon-style endpoint instead of the
    /// RPC server. Horizon submission is synchronous, so a successful
    /// response already implies inclusion and no confirmation polling
    /// happens on this path.
    pub fn with_horizon(mut self, client: HorizonClient) -> Self {
        self.horizon = Some(client);
        self
    }

    /// Run one operation through the full lifecycle.
    ///
    /// Callers sharing a signer must go through that signer's
    /// [`SignerQueue`]; the pipeline itself only defends against the
    /// narrower race where the sequence advances mid-simulation.
    pub async fn run(
        &self,
        signer: &SignerHandle,
        op: &OperationSpec,
        confirm: ConfirmMode,
    ) -> Result<PipelineResult, PipelineError> {
        let account_id = signer.account_id();
        let mut sequence = self.rpc.get_account(&account_id).await?.sequence;
        let mut rebuilt = false;

        let (mut tx, simulation) = loop {
            let tx = self.build(signer, sequence, op);
            debug!(seq = sequence, function = %op.function, "built envelope");
            let unsigned = BASE64.encode(encode_envelope(&tx, &[]));
            let simulation = self.rpc.simulate_transaction(&unsigned).await?;

            // The dry run itself can advance the account's sequence view
            // (another submission landing, a side-effecting read). Rebuild
            // against the live sequence at most once.
            let live = self.rpc.get_account(&account_id).await?.sequence;
            if live != sequence {
                if rebuilt {
                    return Err(PipelineError::SequenceDrift {
                        built: sequence,
                        live,
                    });
                }
                warn!(built = sequence, live, "sequence drifted during simulation, rebuilding");
                sequence = live;
                rebuilt = true;
                continue;
            }
            break (tx, simulation);
        };

        self.assemble(&mut tx, &simulation);

        // Sign only after a successful simulation.
        let payload = tx.signature_payload(&self.network_id);
        let hash: [u8; 32] = Sha256::digest(&payload).into();
        let hash_hex = hex::encode(hash);
        let signature = signer.sign_hash(&hash);
        let envelope = BASE64.encode(encode_envelope(&tx, &[signature]));

        if let Some(horizon) = &self.horizon {
            horizon.submit(&envelope).await?;
            info!(hash = %hash_hex, fee = tx.fee, "transaction included via horizon");
            return Ok(PipelineResult {
                hash: hash_hex,
                return_value: simulation.return_value,
                fee: tx.fee,
            });
        }

        let send = self.rpc.send_transaction(&envelope).await?;
        if send.status != SendStatus::Pending {
            // A rejected envelope is not safe to blindly resend: the same
            // sequence number may already be consumed by a landed
            // transaction.
            return Err(PipelineError::Submission {
                status: send.status.as_str().to_string(),
                raw: send.error_result.unwrap_or_default(),
            });
        }
        info!(hash = %hash_hex, fee = tx.fee, "transaction submitted");

        let result = PipelineResult {
            hash: hash_hex,
            return_value: simulation.return_value,
            fee: tx.fee,
        };
        match confirm {
            ConfirmMode::Acknowledged => Ok(result),
            ConfirmMode::Confirmed => self.await_confirmation(result).await,
        }
    }

    /// Simulate an operation without submitting it. Read-only entry
    /// points (role checks) use this to fetch a return value.
    pub async fn simulate_read(
        &self,
        signer: &SignerHandle,
        op: &OperationSpec,
    ) -> Result<Simulation, PipelineError> {
        let sequence = self.rpc.get_account(&signer.account_id()).await?.sequence;
        let tx = self.build(signer, sequence, op);
        let unsigned = BASE64.encode(encode_envelope(&tx, &[]));
        self.rpc.simulate_transaction(&unsigned).await
    }

    fn build(&self, signer: &SignerHandle, sequence: i64, op: &OperationSpec) -> Transaction {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Transaction {
            source: signer.public,
            fee: self.settings.base_fee,
            seq_num: sequence + 1,
            time_bounds: Some((0, now + self.settings.tx_timeout.as_secs())),
            operation: InvokeHostFunctionOp {
                contract: op.contract.to_sc_address(),
                function: op.function.clone(),
                args: op.args.clone(),
                auth: Vec::new(),
            },
            soroban_data: None,
        }
    }

    /// Merge simulation output into the built envelope: the resource
    /// footprint blob, the authorization entries, and the resource fee on
    /// top of the base fee.
    fn assemble(&self, tx: &mut Transaction, simulation: &Simulation) {
        tx.soroban_data = Some(simulation.transaction_data.clone());
        tx.operation.auth = simulation.auth.clone();
        tx.fee = self
            .settings
            .base_fee
            .saturating_add(u32::try_from(simulation.min_resource_fee).unwrap_or(u32::MAX));
    }

    async fn await_confirmation(
        &self,
        result: PipelineResult,
    ) -> Result<PipelineResult, PipelineError> {
        for _ in 0..self.settings.confirm_attempts {
            tokio::time::sleep(self.settings.confirm_interval).await;
            match self.rpc.get_transaction(&result.hash).await? {
                TxStatus::NotFound => continue,
                TxStatus::Success { return_value } => {
                    info!(hash = %result.hash, "transaction confirmed");
                    return Ok(PipelineResult {
                        return_value: return_value.or(result.return_value),
                        ..result
                    });
                }
                TxStatus::Failed { result_xdr } => {
                    return Err(PipelineError::TransactionFailed {
                        hash: result.hash,
                        result: result_xdr,
                    });
                }
            }
        }
        // The true outcome is unknown; report that distinctly rather than
        // guessing either way.
        Err(PipelineError::ConfirmationTimeout {
            hash: result.hash,
            attempts: self.settings.confirm_attempts,
        })
    }
}


#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::test_support::*;
    use super::*;

    fn fast_settings() -> PipelineSettings {
        PipelineSettings {
            confirm_attempts: 3,
            confirm_interval: Duration::ZERO,
            ..PipelineSettings::default()
        }
    }

    fn pipeline(rpc: Arc<ScriptedRpc>) -> TransactionPipeline {
        TransactionPipeline::new(rpc, "Test Network ; 2026", fast_settings())
    }

    #[tokio::test]
    async fn happy_path_builds_simulates_signs_and_submits() {
        let rpc = Arc::new(ScriptedRpc::default());
        rpc.sequences.lock().unwrap().extend([41, 41]);
        rpc.simulations.lock().unwrap().push_back(ok_simulation());

        let result = pipeline(Arc::clone(&rpc))
            .run(&test_signer(), &test_operation(), ConfirmMode::Acknowledged)
            .await
            .unwrap();

        assert_eq!(result.hash.len(), 64);
        assert_eq!(result.fee, 5100);
        assert_eq!(result.return_value, Some(ScVal::Bool(true).to_bytes()));
        assert_eq!(rpc.call_count("simulate"), 1);
        assert_eq!(rpc.call_count("send"), 1);
        assert_eq!(rpc.call_count("get_transaction"), 0);
    }

    #[tokio::test]
    async fn sequence_drift_rebuilds_exactly_once() {
        let rpc = Arc::new(ScriptedRpc::default());
        // Built against 41; live check sees 43; rebuilt against 43.
        rpc.sequences.lock().unwrap().extend([41, 43, 43]);
        rpc.simulations.lock().unwrap().push_back(ok_simulation());
        rpc.simulations.lock().unwrap().push_back(ok_simulation());

        let result = pipeline(Arc::clone(&rpc))
            .run(&test_signer(), &test_operation(), ConfirmMode::Acknowledged)
            .await
            .unwrap();

        assert!(!result.hash.is_empty());
        assert_eq!(rpc.call_count("simulate"), 2);
        assert_eq!(rpc.call_count("send"), 1);
    }

    #[tokio::test]
    async fn second_drift_is_surfaced_not_looped() {
        let rpc = Arc::new(ScriptedRpc::default());
        rpc.sequences.lock().unwrap().extend([41, 43, 45, 45]);
        rpc.simulations.lock().unwrap().push_back(ok_simulation());
        rpc.simulations.lock().unwrap().push_back(ok_simulation());

        let err = pipeline(Arc::clone(&rpc))
            .run(&test_signer(), &test_operation(), ConfirmMode::Acknowledged)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::SequenceDrift { built: 43, live: 45 }
        ));
        assert_eq!(rpc.call_count("send"), 0);
    }

    #[tokio::test]
    async fn simulation_failure_never_signs_or_submits() {
        let rpc = Arc::new(ScriptedRpc::default());
        rpc.sequences.lock().unwrap().push_back(41);
        rpc.simulations
            .lock()
            .unwrap()
            .push_back(Err(PipelineError::Simulation {
                detail: "trapped".to_string(),
            }));

        let err = pipeline(Arc::clone(&rpc))
            .run(&test_signer(), &test_operation(), ConfirmMode::Acknowledged)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Simulation { .. }));
        assert_eq!(rpc.call_count("send"), 0);
    }

    #[tokio::test]
    async fn restore_required_is_surfaced_unrecovered() {
        let rpc = Arc::new(ScriptedRpc::default());
        rpc.sequences.lock().unwrap().push_back(41);
        rpc.simulations
            .lock()
            .unwrap()
            .push_back(Err(PipelineError::RestoreRequired {
                detail: "expired entries".to_string(),
            }));

        let err = pipeline(Arc::clone(&rpc))
            .run(&test_signer(), &test_operation(), ConfirmMode::Acknowledged)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RestoreRequired { .. }));
    }

    #[tokio::test]
    async fn rejected_submission_is_fatal_without_retry() {
        let rpc = Arc::new(ScriptedRpc::default());
        rpc.sequences.lock().unwrap().extend([41, 41]);
        rpc.simulations.lock().unwrap().push_back(ok_simulation());
        rpc.sends.lock().unwrap().push_back(Ok(crate::rpc::SendResult {
            status: SendStatus::TryAgainLater,
            hash: "h".to_string(),
            error_result: Some("queue full".to_string()),
        }));

        let err = pipeline(Arc::clone(&rpc))
            .run(&test_signer(), &test_operation(), ConfirmMode::Acknowledged)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Submission { ref status, .. } if status == "TRY_AGAIN_LATER"
        ));
        assert_eq!(rpc.call_count("send"), 1);
    }

    #[tokio::test]
    async fn confirmation_polls_until_success() {
        let rpc = Arc::new(ScriptedRpc::default());
        rpc.sequences.lock().unwrap().extend([41, 41]);
        rpc.simulations.lock().unwrap().push_back(ok_simulation());
        rpc.statuses.lock().unwrap().push_back(TxStatus::NotFound);
        rpc.statuses.lock().unwrap().push_back(TxStatus::Success {
            return_value: Some(ScVal::U32(9).to_bytes()),
        });

        let result = pipeline(Arc::clone(&rpc))
            .run(&test_signer(), &test_operation(), ConfirmMode::Confirmed)
            .await
            .unwrap();

        assert_eq!(result.return_value, Some(ScVal::U32(9).to_bytes()));
        assert_eq!(rpc.call_count("get_transaction"), 2);
    }

    #[tokio::test]
    async fn exhausted_polling_reports_timeout_not_failure() {
        let rpc = Arc::new(ScriptedRpc::default());
        rpc.sequences.lock().unwrap().extend([41, 41]);
        rpc.simulations.lock().unwrap().push_back(ok_simulation());

        let err = pipeline(Arc::clone(&rpc))
            .run(&test_signer(), &test_operation(), ConfirmMode::Confirmed)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::ConfirmationTimeout { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn failed_transaction_is_reported_with_result() {
        let rpc = Arc::new(ScriptedRpc::default());
        rpc.sequences.lock().unwrap().extend([41, 41]);
        rpc.simulations.lock().unwrap().push_back(ok_simulation());
        rpc.statuses.lock().unwrap().push_back(TxStatus::Failed {
            result_xdr: "AAAB".to_string(),
        });

        let err = pipeline(Arc::clone(&rpc))
            .run(&test_signer(), &test_operation(), ConfirmMode::Confirmed)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::TransactionFailed { ref result, .. } if result == "AAAB"
        ));
    }
}
