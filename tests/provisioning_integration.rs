//! End-to-end provisioning tests against an in-process mock ledger.
//!
//! The mock keeps real per-account sequence counters that advance on
//! every accepted submission, so these tests exercise the same
//! sequence-number discipline the live network enforces.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use fundkey::error::PipelineError;
use fundkey::ledger::strkey;
use fundkey::ledger::xdr::ScVal;
use fundkey::pipeline::{ConfirmMode, PipelineSettings};
use fundkey::rpc::{
    AccountEntry, ContractDataEntry, LedgerRpc, SendResult, SendStatus, Simulation, TxStatus,
};
use fundkey::{
    Address, OperationSpec, ProvisioningService, SignerHandle, TransactionPipeline,
    contract_address, normalize,
};

const PASSPHRASE: &str = "Test SDF Network ; September 2015";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-process ledger: accounts with live sequences, contract data
/// entries, and a submission log.
#[derive(Default)]
struct MockLedger {
    sequences: Mutex<HashMap<String, i64>>,
    data: Mutex<HashSet<(String, String)>>,
    submissions: Mutex<Vec<String>>,
}

impl MockLedger {
    fn create_account(&self, account_id: &str, sequence: i64) {
        self.sequences
            .lock()
            .unwrap()
            .insert(account_id.to_string(), sequence);
    }

    fn put_data(&self, address: &str, key: &str) {
        self.data
            .lock()
            .unwrap()
            .insert((address.to_string(), key.to_string()));
    }

    fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    fn sequence_of(&self, account_id: &str) -> i64 {
        self.sequences.lock().unwrap()[account_id]
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn get_account(&self, account_id: &str) -> Result<AccountEntry, PipelineError> {
        self.sequences
            .lock()
            .unwrap()
            .get(account_id)
            .map(|sequence| AccountEntry {
                id: account_id.to_string(),
                sequence: *sequence,
            })
            .ok_or_else(|| PipelineError::AccountNotFound(account_id.to_string()))
    }

    async fn get_contract_data(
        &self,
        contract_address: &str,
        key: &str,
    ) -> Result<Option<ContractDataEntry>, PipelineError> {
        let exists = self
            .data
            .lock()
            .unwrap()
            .contains(&(contract_address.to_string(), key.to_string()));
        Ok(exists.then(|| ContractDataEntry {
            xdr_base64: "AAAA".to_string(),
        }))
    }

    async fn simulate_transaction(&self, _envelope_b64: &str) -> Result<Simulation, PipelineError> {
        Ok(Simulation {
            transaction_data: vec![0, 0, 0, 0],
            min_resource_fee: 40_000,
            auth: vec![vec![0, 0, 0, 0]],
            return_value: Some(ScVal::Bool(true).to_bytes()),
            latest_ledger: 100,
        })
    }

    async fn send_transaction(&self, envelope_b64: &str) -> Result<SendResult, PipelineError> {
        self.submissions
            .lock()
            .unwrap()
            .push(envelope_b64.to_string());
        // Every accepted submission consumes one sequence number for every
        // known account source; tests use one funding account.
        for sequence in self.sequences.lock().unwrap().values_mut() {
            *sequence += 1;
        }
        Ok(SendResult {
            status: SendStatus::Pending,
            hash: "acknowledged".to_string(),
            error_result: None,
        })
    }

    async fn get_transaction(&self, _hash: &str) -> Result<TxStatus, PipelineError> {
        Ok(TxStatus::Success { return_value: None })
    }
}

fn funding_signer() -> SignerHandle {
    SignerHandle::from_seed(&strkey::encode(strkey::VERSION_SEED, &[0x55u8; 32])).unwrap()
}

fn factory() -> Address {
    Address::Contract([0xf0u8; 32])
}

fn controller() -> Address {
    Address::Contract([0xc0u8; 32])
}

fn ready_ledger(funding: &SignerHandle) -> Arc<MockLedger> {
    let ledger = Arc::new(MockLedger::default());
    ledger.create_account(&funding.account_id(), 1000);
    ledger.put_data(&factory().to_string(), "instance");
    ledger.put_data(&controller().to_string(), "admin");
    ledger
}

fn service(ledger: Arc<MockLedger>, funding: SignerHandle) -> ProvisioningService {
    let settings = PipelineSettings {
        confirm_attempts: 5,
        confirm_interval: Duration::ZERO,
        ..PipelineSettings::default()
    };
    let pipeline = TransactionPipeline::new(
        Arc::clone(&ledger) as Arc<dyn LedgerRpc>,
        PASSPHRASE,
        settings,
    );
    ProvisioningService::new(ledger, pipeline, funding, factory(), controller(), PASSPHRASE)
}

/// Canonical COSE EC2 map with the given coordinates.
fn cose_key(x: [u8; 32], y: [u8; 32]) -> Vec<u8> {
    let mut blob = vec![0xa5, 0x01, 0x02, 0x03, 0x26, 0x20, 0x01, 0x21, 0x58, 0x20];
    blob.extend_from_slice(&x);
    blob.extend_from_slice(&[0x22, 0x58, 0x20]);
    blob.extend_from_slice(&y);
    blob
}

#[tokio::test]
async fn provisions_cred_123_end_to_end() {
    init_tracing();
    let funding = funding_signer();
    let ledger = ready_ledger(&funding);
    let service = service(Arc::clone(&ledger), funding);

    let key = cose_key([0x11; 32], [0x22; 32]);

    // The normalizer must produce 0x04 ‖ X ‖ Y for this key.
    let point = normalize(&key).unwrap();
    let mut expected_point = vec![0x04u8];
    expected_point.extend_from_slice(&[0x11; 32]);
    expected_point.extend_from_slice(&[0x22; 32]);
    assert_eq!(point.to_vec(), expected_point);

    let result = service.provision("cred-123", &key).await.unwrap();

    assert!(result.deployed);
    assert!(result.tx_hash.is_some());
    assert_eq!(ledger.submission_count(), 1);

    // The returned address must match an independent recomputation.
    let salt: [u8; 32] = Sha256::digest(b"cred-123").into();
    let predicted = contract_address(PASSPHRASE, &factory().to_string(), &salt).unwrap();
    assert_eq!(result.address, predicted);
}

#[tokio::test]
async fn second_provision_of_same_credential_deploys_nothing() {
    let funding = funding_signer();
    let ledger = ready_ledger(&funding);
    let service = service(Arc::clone(&ledger), funding);
    let key = cose_key([0x11; 32], [0x22; 32]);

    let first = service.provision("cred-123", &key).await.unwrap();
    assert!(first.deployed);

    // The deployment landed; the ledger now holds the account's instance.
    ledger.put_data(&first.address.to_string(), "instance");

    let second = service.provision("cred-123", &key).await.unwrap();
    assert_eq!(second.address, first.address);
    assert!(!second.deployed);
    assert!(second.tx_hash.is_none());
    assert_eq!(ledger.submission_count(), 1);
}

#[tokio::test]
async fn uncompressed_key_takes_the_fast_path() {
    let funding = funding_signer();
    let ledger = ready_ledger(&funding);
    let service = service(Arc::clone(&ledger), funding);

    let mut key = vec![0x04u8];
    key.extend_from_slice(&[0x77; 32]);
    key.extend_from_slice(&[0x88; 32]);

    let result = service.provision("cred-fast", &key).await.unwrap();
    assert!(result.deployed);
}

#[tokio::test]
async fn concurrent_provisions_serialize_on_the_funding_queue() {
    init_tracing();
    let funding = funding_signer();
    let ledger = ready_ledger(&funding);
    let funding_id = funding.account_id();
    let service = Arc::new(service(Arc::clone(&ledger), funding));

    let mut handles = Vec::new();
    for i in 0..4u8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let key = cose_key([0x10 + i; 32], [0x20 + i; 32]);
            service.provision(&format!("cred-{i}"), &key).await
        }));
    }

    let mut addresses = HashSet::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert!(result.deployed);
        addresses.insert(result.address.to_string());
    }

    // Four distinct accounts, four submissions, four consumed sequence
    // numbers; any interleaving would have produced a rejected envelope.
    assert_eq!(addresses.len(), 4);
    assert_eq!(ledger.submission_count(), 4);
    assert_eq!(ledger.sequence_of(&funding_id), 1004);
}

#[tokio::test]
async fn different_credentials_derive_different_addresses() {
    let funding = funding_signer();
    let ledger = ready_ledger(&funding);
    let service = service(Arc::clone(&ledger), funding);
    let key = cose_key([0x11; 32], [0x22; 32]);

    let a = service.provision("cred-a", &key).await.unwrap();
    let b = service.provision("cred-b", &key).await.unwrap();
    assert_ne!(a.address, b.address);
}

#[tokio::test]
async fn execute_transaction_runs_arbitrary_operations() {
    let funding = funding_signer();
    let ledger = ready_ledger(&funding);
    let service = service(Arc::clone(&ledger), funding);

    let op = OperationSpec::new(
        controller(),
        "update_quest",
        vec![
            ScVal::Address(Address::Contract([0x09u8; 32]).to_sc_address()),
            ScVal::U32(3),
            ScVal::U32(40),
        ],
    )
    .unwrap();

    let result = service
        .execute_transaction(op, ConfirmMode::Acknowledged)
        .await
        .unwrap();
    assert_eq!(result.fee, 100 + 40_000);
    assert_eq!(ledger.submission_count(), 1);
}
