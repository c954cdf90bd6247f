//! Smart-account provisioning.
//!
//! Turns a passkey credential into a deployed account contract:
//! prerequisite checks, deterministic address prediction, an idempotent
//! short-circuit when the account already exists, and otherwise a
//! factory deployment through the pipeline under the funding signer's
//! queue.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, ProvisionError};
use crate::keys;
use crate::ledger::xdr::ScVal;
use crate::ledger::{Address, contract_address};
use crate::pipeline::{ConfirmMode, OperationSpec, SignerHandle, TransactionPipeline};
use crate::rpc::{AccountEntry, LedgerRpc};

/// Ledger key under which a live contract instance stores itself.
const CONTRACT_INSTANCE_KEY: &str = "instance";
/// Controller storage key that exists once the controller is initialized.
const CONTROLLER_ADMIN_KEY: &str = "admin";

/// Outcome of a provisioning call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub address: Address,
    pub deployed: bool,
    pub tx_hash: Option<String>,
}

/// Orchestrates key normalization, address derivation, and deployment.
pub struct ProvisioningService {
    rpc: Arc<dyn LedgerRpc>,
    pipeline: TransactionPipeline,
    funding: SignerHandle,
    factory: Address,
    controller: Address,
    network_passphrase: String,
}

impl ProvisioningService {
    pub fn new(
        rpc: Arc<dyn LedgerRpc>,
        pipeline: TransactionPipeline,
        funding: SignerHandle,
        factory: Address,
        controller: Address,
        network_passphrase: impl Into<String>,
    ) -> Self {
        Self {
            rpc,
            pipeline,
            funding,
            factory,
            controller,
            network_passphrase: network_passphrase.into(),
        }
    }

    /// Provision the account controlled by `credential_id`'s passkey.
    ///
    /// Idempotent with respect to the credential id: if the derived
    /// address already holds contract data the existing account is
    /// returned and no transaction is built. The returned address is
    /// always recomputed locally, never read back from a network
    /// response.
    pub async fn provision(
        &self,
        credential_id: &str,
        public_key: &[u8],
    ) -> Result<Provisioned, ProvisionError> {
        self.check_prerequisites().await?;

        let salt: [u8; 32] = Sha256::digest(credential_id.as_bytes()).into();
        let factory_id = self.factory.to_string();
        let predicted = contract_address(&self.network_passphrase, &factory_id, &salt)?;
        let predicted_id = predicted.to_string();
        debug!(credential_id, address = %predicted_id, "derived account address");

        if self
            .rpc
            .get_contract_data(&predicted_id, CONTRACT_INSTANCE_KEY)
            .await?
            .is_some()
        {
            info!(address = %predicted_id, "account already deployed, short-circuiting");
            return Ok(Provisioned {
                address: predicted,
                deployed: false,
                tx_hash: None,
            });
        }

        let point = keys::normalize(public_key)?;
        let deploy = OperationSpec::new(
            self.factory.clone(),
            "deploy",
            vec![
                ScVal::Bytes(salt.to_vec()),
                ScVal::String(predicted_id.clone()),
                ScVal::Bytes(point.to_vec()),
            ],
        )?;

        let result = self
            .funding
            .queue()
            .run(self.pipeline.run(&self.funding, &deploy, ConfirmMode::Confirmed))
            .await?;
        info!(address = %predicted_id, hash = %result.hash, "account deployed");

        // Recompute rather than trusting anything the network returned,
        // so the result is self-consistent with later lookups.
        let address = contract_address(&self.network_passphrase, &factory_id, &salt)?;
        Ok(Provisioned {
            address,
            deployed: true,
            tx_hash: Some(result.hash),
        })
    }

    /// Read-only account lookup, exposed to the application layer.
    pub async fn get_account_info(&self, account_id: &str) -> Result<AccountEntry, PipelineError> {
        self.rpc.get_account(account_id).await
    }

    /// Run a caller-built operation through the pipeline under the
    /// funding signer's queue.
    pub async fn execute_transaction(
        &self,
        operation: OperationSpec,
        confirm: ConfirmMode,
    ) -> Result<crate::pipeline::PipelineResult, PipelineError> {
        self.funding
            .queue()
            .run(self.pipeline.run(&self.funding, &operation, confirm))
            .await
    }

    /// Factory and funding-account checks, plus the one-shot controller
    /// initialization when the controller has no admin yet. The
    /// self-healing path runs at most once per call and never loops.
    async fn check_prerequisites(&self) -> Result<(), ProvisionError> {
        let factory_id = self.factory.to_string();
        if self
            .rpc
            .get_contract_data(&factory_id, CONTRACT_INSTANCE_KEY)
            .await?
            .is_none()
        {
            // A missing factory is a deployment problem, not a transient
            // condition.
            return Err(ProvisionError::FactoryMissing {
                address: factory_id,
            });
        }

        let funding_id = self.funding.account_id();
        match self.rpc.get_account(&funding_id).await {
            Ok(_) => {}
            Err(PipelineError::AccountNotFound(_)) => {
                return Err(ProvisionError::FundingAccountMissing {
                    address: funding_id,
                });
            }
            Err(err) => return Err(err.into()),
        }

        let controller_id = self.controller.to_string();
        if self
            .rpc
            .get_contract_data(&controller_id, CONTROLLER_ADMIN_KEY)
            .await?
            .is_none()
        {
            warn!(controller = %controller_id, "controller uninitialized, granting funding key signer authority");
            let init = OperationSpec::new(
                self.controller.clone(),
                "init",
                vec![
                    ScVal::Address(self.funding.address().to_sc_address()),
                    ScVal::U32(1),
                ],
            )?;
            self.funding
                .queue()
                .run(self.pipeline.run(&self.funding, &init, ConfirmMode::Confirmed))
                .await
                .map_err(ProvisionError::ControllerInitFailed)?;
        }
        Ok(())
    }
}
