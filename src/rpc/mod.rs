//! Ledger RPC client.
//!
//! The network is an external collaborator reached over JSON-RPC. The
//! [`LedgerRpc`] trait is the seam the pipeline and provisioning code
//! depend on; [`HttpLedgerRpc`] is the production implementation. Every
//! response is parsed defensively: an unexpected shape is a fatal error
//! carrying the raw JSON, never a partially-parsed best guess.

pub mod horizon;

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::PipelineError;

/// An account's on-chain identity and current sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountEntry {
    pub id: String,
    pub sequence: i64,
}

/// Contract data held at an address, opaque to this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDataEntry {
    pub xdr_base64: String,
}

/// A successful dry run: resource footprint, fee, authorization entries,
/// and the host function's return value, all as pre-encoded blobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Simulation {
    pub transaction_data: Vec<u8>,
    pub min_resource_fee: u64,
    pub auth: Vec<Vec<u8>>,
    pub return_value: Option<Vec<u8>>,
    pub latest_ledger: u32,
}

/// Submission acknowledgement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Pending,
    Duplicate,
    TryAgainLater,
    Error,
}

impl SendStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(Self::Pending),
            "DUPLICATE" => Some(Self::Duplicate),
            "TRY_AGAIN_LATER" => Some(Self::TryAgainLater),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Duplicate => "DUPLICATE",
            Self::TryAgainLater => "TRY_AGAIN_LATER",
            Self::Error => "ERROR",
        }
    }
}

/// Submission acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub status: SendStatus,
    pub hash: String,
    pub error_result: Option<String>,
}

/// Final inclusion status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    NotFound,
    Success { return_value: Option<Vec<u8>> },
    Failed { result_xdr: String },
}

/// The ledger RPC surface the pipeline depends on.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn get_account(&self, account_id: &str) -> Result<AccountEntry, PipelineError>;

    /// Fetch contract data under `key` (`"instance"` for the contract
    /// instance itself). `None` means the entry does not exist.
    async fn get_contract_data(
        &self,
        contract_address: &str,
        key: &str,
    ) -> Result<Option<ContractDataEntry>, PipelineError>;

    async fn simulate_transaction(&self, envelope_b64: &str) -> Result<Simulation, PipelineError>;

    async fn send_transaction(&self, envelope_b64: &str) -> Result<SendResult, PipelineError>;

    async fn get_transaction(&self, hash: &str) -> Result<TxStatus, PipelineError>;
}

fn malformed(method: &str, raw: Value) -> PipelineError {
    PipelineError::MalformedResponse {
        method: method.to_string(),
        raw,
    }
}

fn field<'a>(method: &str, value: &'a Value, name: &str) -> Result<&'a Value, PipelineError> {
    value
        .get(name)
        .ok_or_else(|| malformed(method, value.clone()))
}

fn str_field(method: &str, value: &Value, name: &str) -> Result<String, PipelineError> {
    field(method, value, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(method, value.clone()))
}

fn decode_b64(method: &str, value: &Value, encoded: &str) -> Result<Vec<u8>, PipelineError> {
    BASE64
        .decode(encoded)
        .map_err(|_| malformed(method, value.clone()))
}

pub(crate) fn parse_account(value: Value) -> Result<AccountEntry, PipelineError> {
    let id = str_field("getAccount", &value, "id")?;
    let sequence = str_field("getAccount", &value, "sequence")?
        .parse::<i64>()
        .map_err(|_| malformed("getAccount", value))?;
    Ok(AccountEntry { id, sequence })
}

#[derive(Debug, Deserialize)]
struct RawSimulationResult {
    auth: Option<Vec<String>>,
    xdr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSimulation {
    error: Option<String>,
    #[serde(rename = "restorePreimage")]
    restore_preimage: Option<String>,
    #[serde(rename = "transactionData")]
    transaction_data: Option<String>,
    #[serde(rename = "minResourceFee")]
    min_resource_fee: Option<String>,
    results: Option<Vec<RawSimulationResult>>,
    #[serde(rename = "latestLedger")]
    latest_ledger: Option<u32>,
}

pub(crate) fn parse_simulation(value: Value) -> Result<Simulation, PipelineError> {
    const METHOD: &str = "simulateTransaction";

    let raw: RawSimulation =
        serde_json::from_value(value.clone()).map_err(|_| malformed(METHOD, value.clone()))?;

    // A dry run that would not succeed is fatal; expired state that needs
    // restoring is surfaced as its own condition and never auto-recovered.
    if let Some(detail) = raw.error {
        return Err(PipelineError::Simulation { detail });
    }
    if let Some(preimage) = raw.restore_preimage {
        return Err(PipelineError::RestoreRequired { detail: preimage });
    }

    let transaction_data = raw
        .transaction_data
        .ok_or_else(|| malformed(METHOD, value.clone()))
        .and_then(|b64| decode_b64(METHOD, &value, &b64))?;
    let min_resource_fee = raw
        .min_resource_fee
        .unwrap_or_default()
        .parse::<u64>()
        .map_err(|_| malformed(METHOD, value.clone()))?;

    let mut auth = Vec::new();
    let mut return_value = None;
    if let Some(results) = raw.results {
        for result in results {
            for entry in result.auth.unwrap_or_default() {
                auth.push(decode_b64(METHOD, &value, &entry)?);
            }
            if let Some(xdr) = result.xdr {
                return_value = Some(decode_b64(METHOD, &value, &xdr)?);
            }
        }
    }

    Ok(Simulation {
        transaction_data,
        min_resource_fee,
        auth,
        return_value,
        latest_ledger: raw.latest_ledger.unwrap_or_default(),
    })
}

pub(crate) fn parse_send(value: Value) -> Result<SendResult, PipelineError> {
    const METHOD: &str = "sendTransaction";

    let status_raw = str_field(METHOD, &value, "status")?;
    let status =
        SendStatus::parse(&status_raw).ok_or_else(|| malformed(METHOD, value.clone()))?;
    let hash = str_field(METHOD, &value, "hash")?;
    let error_result = value
        .get("errorResult")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(SendResult {
        status,
        hash,
        error_result,
    })
}

pub(crate) fn parse_tx_status(value: Value) -> Result<TxStatus, PipelineError> {
    const METHOD: &str = "getTransaction";

    match str_field(METHOD, &value, "status")?.as_str() {
        "NOT_FOUND" => Ok(TxStatus::NotFound),
        "SUCCESS" => {
            let return_value = value
                .get("returnValue")
                .and_then(Value::as_str)
                .map(|b64| decode_b64(METHOD, &value, b64))
                .transpose()?;
            Ok(TxStatus::Success { return_value })
        }
        "FAILED" => Ok(TxStatus::Failed {
            result_xdr: value
                .get("resultXdr")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        _ => Err(malformed(METHOD, value)),
    }
}

/// JSON-RPC implementation of [`LedgerRpc`].
pub struct HttpLedgerRpc {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLedgerRpc {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, PipelineError> {
        debug!(method, "ledger rpc call");
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest(method, e))?;
        let envelope: Value = response
            .json()
            .await
            .map_err(|e| classify_reqwest(method, e))?;

        if let Some(error) = envelope.get("error") {
            return Err(PipelineError::Rpc {
                method: method.to_string(),
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown RPC error")
                    .to_string(),
            });
        }
        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| malformed(method, envelope))
    }
}

fn classify_reqwest(method: &str, err: reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        PipelineError::RpcTimeout {
            method: method.to_string(),
        }
    } else {
        PipelineError::Http(err)
    }
}

#[async_trait]
impl LedgerRpc for HttpLedgerRpc {
    async fn get_account(&self, account_id: &str) -> Result<AccountEntry, PipelineError> {
        let result = self
            .call("getAccount", json!({ "address": account_id }))
            .await?;
        parse_account(result)
    }

    async fn get_contract_data(
        &self,
        contract_address: &str,
        key: &str,
    ) -> Result<Option<ContractDataEntry>, PipelineError> {
        let result = self
            .call(
                "getContractData",
                json!({ "contract": contract_address, "key": key }),
            )
            .await;
        match result {
            Ok(Value::Null) => Ok(None),
            Ok(value) => Ok(Some(ContractDataEntry {
                xdr_base64: str_field("getContractData", &value, "xdr")?,
            })),
            // A missing entry is a normal outcome, not a failure.
            Err(PipelineError::Rpc { code: -32602, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn simulate_transaction(&self, envelope_b64: &str) -> Result<Simulation, PipelineError> {
        let result = self
            .call("simulateTransaction", json!({ "transaction": envelope_b64 }))
            .await?;
        parse_simulation(result)
    }

    async fn send_transaction(&self, envelope_b64: &str) -> Result<SendResult, PipelineError> {
        let result = self
            .call("sendTransaction", json!({ "transaction": envelope_b64 }))
            .await?;
        parse_send(result)
    }

    async fn get_transaction(&self, hash: &str) -> Result<TxStatus, PipelineError> {
        let result = self.call("getTransaction", json!({ "hash": hash })).await?;
        parse_tx_status(result)
    }
}
