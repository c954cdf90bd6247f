//! Game-state recording against the engagement contracts.
//!
//! Thin façades over the pipeline, each encoding one contract entry
//! point's arguments. Every write is signed by the shared recorder
//! account and therefore serialized through its queue; `has_role` is a
//! simulate-only read and submits nothing.

use tracing::debug;

use crate::error::PipelineError;
use crate::ledger::Address;
use crate::ledger::xdr::{ScVal, decode_bool};
use crate::pipeline::{
    ConfirmMode, OperationSpec, PipelineResult, SignerHandle, TransactionPipeline,
};

/// Records streaks, referrals, quests, collectibles, and role grants.
pub struct EngagementRecorder {
    pipeline: TransactionPipeline,
    recorder: SignerHandle,
    controller: Address,
    collectibles: Address,
}

fn operation(
    contract: &Address,
    function: &str,
    args: Vec<ScVal>,
) -> Result<OperationSpec, PipelineError> {
    OperationSpec::new(contract.clone(), function, args).map_err(|e| {
        PipelineError::InvalidOperation {
            detail: e.to_string(),
        }
    })
}

impl EngagementRecorder {
    pub fn new(
        pipeline: TransactionPipeline,
        recorder: SignerHandle,
        controller: Address,
        collectibles: Address,
    ) -> Self {
        Self {
            pipeline,
            recorder,
            controller,
            collectibles,
        }
    }

    async fn record(
        &self,
        op: OperationSpec,
        confirm: ConfirmMode,
    ) -> Result<PipelineResult, PipelineError> {
        debug!(function = %op.function, "recording engagement event");
        self.recorder
            .queue()
            .run(self.pipeline.run(&self.recorder, &op, confirm))
            .await
    }

    pub async fn record_streak_donation(
        &self,
        donor: &Address,
        amount: i128,
    ) -> Result<PipelineResult, PipelineError> {
        let op = operation(
            &self.controller,
            "streak_donate",
            vec![
                ScVal::Address(donor.to_sc_address()),
                ScVal::I128(amount),
            ],
        )?;
        self.record(op, ConfirmMode::Acknowledged).await
    }

    pub async fn create_referral(
        &self,
        referrer: &Address,
        referee: &Address,
    ) -> Result<PipelineResult, PipelineError> {
        let op = operation(
            &self.controller,
            "create_referral",
            vec![
                ScVal::Address(referrer.to_sc_address()),
                ScVal::Address(referee.to_sc_address()),
            ],
        )?;
        self.record(op, ConfirmMode::Acknowledged).await
    }

    pub async fn mark_onboarded(
        &self,
        account: &Address,
    ) -> Result<PipelineResult, PipelineError> {
        let op = operation(
            &self.controller,
            "mark_onboarded",
            vec![ScVal::Address(account.to_sc_address())],
        )?;
        self.record(op, ConfirmMode::Acknowledged).await
    }

    pub async fn update_quest_progress(
        &self,
        account: &Address,
        quest_id: u32,
        progress: u32,
    ) -> Result<PipelineResult, PipelineError> {
        let op = operation(
            &self.controller,
            "update_quest",
            vec![
                ScVal::Address(account.to_sc_address()),
                ScVal::U32(quest_id),
                ScVal::U32(progress),
            ],
        )?;
        self.record(op, ConfirmMode::Acknowledged).await
    }

    pub async fn mint_nft(
        &self,
        to: &Address,
        token_id: u64,
        uri: &str,
    ) -> Result<PipelineResult, PipelineError> {
        let op = operation(
            &self.collectibles,
            "mint",
            vec![
                ScVal::Address(to.to_sc_address()),
                ScVal::U64(token_id),
                ScVal::String(uri.to_string()),
            ],
        )?;
        self.record(op, ConfirmMode::Acknowledged).await
    }

    pub async fn update_nft_metadata(
        &self,
        token_id: u64,
        uri: &str,
    ) -> Result<PipelineResult, PipelineError> {
        let op = operation(
            &self.collectibles,
            "update_metadata",
            vec![ScVal::U64(token_id), ScVal::String(uri.to_string())],
        )?;
        self.record(op, ConfirmMode::Acknowledged).await
    }

    /// Role grants gate other recorder operations, so this one waits for
    /// confirmed inclusion instead of a bare acknowledgement.
    pub async fn grant_role(
        &self,
        account: &Address,
        role: &str,
    ) -> Result<PipelineResult, PipelineError> {
        let op = operation(
            &self.controller,
            "grant_role",
            vec![
                ScVal::Address(account.to_sc_address()),
                ScVal::Symbol(role.to_string()),
            ],
        )?;
        self.record(op, ConfirmMode::Confirmed).await
    }

    /// Simulate-only role check; nothing is signed or submitted.
    pub async fn has_role(&self, account: &Address, role: &str) -> Result<bool, PipelineError> {
        let op = operation(
            &self.controller,
            "has_role",
            vec![
                ScVal::Address(account.to_sc_address()),
                ScVal::Symbol(role.to_string()),
            ],
        )?;
        let simulation = self.pipeline.simulate_read(&self.recorder, &op).await?;
        let raw = simulation.return_value.unwrap_or_default();
        decode_bool(&raw).ok_or(PipelineError::MalformedResponse {
            method: "simulateTransaction".to_string(),
            raw: serde_json::Value::String(hex::encode(raw)),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::pipeline::PipelineSettings;
    use crate::pipeline::test_support::{ScriptedRpc, ok_simulation, test_signer};
    use crate::rpc::{LedgerRpc, Simulation};

    fn recorder(rpc: Arc<ScriptedRpc>) -> EngagementRecorder {
        let settings = PipelineSettings {
            confirm_attempts: 2,
            confirm_interval: Duration::ZERO,
            ..PipelineSettings::default()
        };
        let pipeline = TransactionPipeline::new(
            Arc::clone(&rpc) as Arc<dyn LedgerRpc>,
            "Test Network ; 2026",
            settings,
        );
        EngagementRecorder::new(
            pipeline,
            test_signer(),
            Address::Contract([0xc0u8; 32]),
            Address::Contract([0xd0u8; 32]),
        )
    }

    #[tokio::test]
    async fn streak_donation_submits_one_transaction() {
        let rpc = Arc::new(ScriptedRpc::default());
        rpc.sequences.lock().unwrap().push_back(5);
        rpc.simulations.lock().unwrap().push_back(ok_simulation());

        let donor = Address::Contract([0x01u8; 32]);
        let result = recorder(Arc::clone(&rpc))
            .record_streak_donation(&donor, 250_0000000)
            .await
            .unwrap();

        assert!(!result.hash.is_empty());
        assert_eq!(rpc.call_count("send"), 1);
        // Acknowledged mode never polls.
        assert_eq!(rpc.call_count("get_transaction"), 0);
    }

    #[tokio::test]
    async fn has_role_is_simulate_only() {
        let rpc = Arc::new(ScriptedRpc::default());
        rpc.sequences.lock().unwrap().push_back(5);
        rpc.simulations.lock().unwrap().push_back(Ok(Simulation {
            transaction_data: vec![0],
            min_resource_fee: 0,
            auth: vec![],
            return_value: Some(ScVal::Bool(true).to_bytes()),
            latest_ledger: 1,
        }));

        let account = Address::Contract([0x02u8; 32]);
        let granted = recorder(Arc::clone(&rpc))
            .has_role(&account, "recorder")
            .await
            .unwrap();

        assert!(granted);
        assert_eq!(rpc.call_count("send"), 0);
    }

    #[tokio::test]
    async fn has_role_rejects_non_boolean_return() {
        let rpc = Arc::new(ScriptedRpc::default());
        rpc.sequences.lock().unwrap().push_back(5);
        rpc.simulations.lock().unwrap().push_back(Ok(Simulation {
            return_value: Some(ScVal::U32(3).to_bytes()),
            ..Simulation::default()
        }));

        let account = Address::Contract([0x02u8; 32]);
        let err = recorder(Arc::clone(&rpc))
            .has_role(&account, "recorder")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn invalid_role_symbol_is_rejected_before_any_rpc() {
        let rpc = Arc::new(ScriptedRpc::default());
        let account = Address::Contract([0x02u8; 32]);

        let err = recorder(Arc::clone(&rpc))
            .grant_role(&account, "not a symbol!")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidOperation { .. }));
        assert_eq!(rpc.call_count("get_account"), 0);
    }

    #[tokio::test]
    async fn grant_role_waits_for_confirmation() {
        let rpc = Arc::new(ScriptedRpc::default());
        rpc.sequences.lock().unwrap().push_back(5);
        rpc.simulations.lock().unwrap().push_back(ok_simulation());
        rpc.statuses
            .lock()
            .unwrap()
            .push_back(crate::rpc::TxStatus::Success { return_value: None });

        let account = Address::Contract([0x02u8; 32]);
        recorder(Arc::clone(&rpc))
            .grant_role(&account, "recorder")
            .await
            .unwrap();

        assert_eq!(rpc.call_count("get_transaction"), 1);
    }
}
