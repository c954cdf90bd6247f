//! Configuration for fundkey.
//!
//! Everything resolves from environment variables (a `.env` file is
//! loaded via dotenvy when present). Signer seeds stay wrapped in
//! [`SecretString`] and are only exposed at the moment a signer handle
//! is built.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::engagement::EngagementRecorder;
use crate::error::ConfigError;
use crate::ledger::Address;
use crate::pipeline::{PipelineSettings, SignerHandle, TransactionPipeline};
use crate::provision::ProvisioningService;
use crate::rpc::HttpLedgerRpc;
use crate::rpc::horizon::HorizonClient;

const ENV_NETWORK_PASSPHRASE: &str = "FUNDKEY_NETWORK_PASSPHRASE";
const ENV_RPC_URL: &str = "FUNDKEY_RPC_URL";
const ENV_HORIZON_URL: &str = "FUNDKEY_HORIZON_URL";
const ENV_FACTORY_CONTRACT: &str = "FUNDKEY_FACTORY_CONTRACT";
const ENV_CONTROLLER_CONTRACT: &str = "FUNDKEY_CONTROLLER_CONTRACT";
const ENV_COLLECTIBLES_CONTRACT: &str = "FUNDKEY_COLLECTIBLES_CONTRACT";
const ENV_FUNDING_SEED: &str = "FUNDKEY_FUNDING_SEED";
const ENV_RECORDER_SEED: &str = "FUNDKEY_RECORDER_SEED";
const ENV_BASE_FEE: &str = "FUNDKEY_BASE_FEE";
const ENV_RPC_TIMEOUT_SECS: &str = "FUNDKEY_RPC_TIMEOUT_SECS";
const ENV_TX_TIMEOUT_SECS: &str = "FUNDKEY_TX_TIMEOUT_SECS";
const ENV_CONFIRM_ATTEMPTS: &str = "FUNDKEY_CONFIRM_ATTEMPTS";
const ENV_CONFIRM_INTERVAL_MS: &str = "FUNDKEY_CONFIRM_INTERVAL_MS";

/// Network endpoints and identity.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub passphrase: String,
    pub rpc_url: String,
    /// Optional horizon-style submission endpoint; when set, the general
    /// execution surface submits through it instead of the RPC server.
    pub horizon_url: Option<String>,
}

/// On-chain collaborator contracts.
#[derive(Debug, Clone)]
pub struct ContractsConfig {
    pub factory: Address,
    pub controller: Address,
    pub collectibles: Address,
}

/// Signing seeds, supplied as configuration secrets. Storage and
/// rotation are the operator's concern.
#[derive(Clone)]
pub struct SignerSecrets {
    pub funding_seed: SecretString,
    pub recorder_seed: SecretString,
}

impl std::fmt::Debug for SignerSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerSecrets").finish_non_exhaustive()
    }
}

/// Main configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub contracts: ContractsConfig,
    pub signers: SignerSecrets,
    pub pipeline: PipelineSettings,
    pub rpc_timeout: Duration,
}

impl Config {
    /// Resolve from the process environment, loading `.env` first.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary lookup. `from_env` delegates here; tests
    /// inject a map instead of mutating the process environment.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let network = NetworkConfig {
            passphrase: require(lookup, ENV_NETWORK_PASSPHRASE)?,
            rpc_url: validated_url(ENV_RPC_URL, require(lookup, ENV_RPC_URL)?)?,
            horizon_url: optional(lookup, ENV_HORIZON_URL)
                .map(|raw| validated_url(ENV_HORIZON_URL, raw))
                .transpose()?,
        };

        let contracts = ContractsConfig {
            factory: contract(ENV_FACTORY_CONTRACT, require(lookup, ENV_FACTORY_CONTRACT)?)?,
            controller: contract(
                ENV_CONTROLLER_CONTRACT,
                require(lookup, ENV_CONTROLLER_CONTRACT)?,
            )?,
            collectibles: contract(
                ENV_COLLECTIBLES_CONTRACT,
                require(lookup, ENV_COLLECTIBLES_CONTRACT)?,
            )?,
        };

        let signers = SignerSecrets {
            funding_seed: seed(ENV_FUNDING_SEED, require(lookup, ENV_FUNDING_SEED)?)?,
            recorder_seed: seed(ENV_RECORDER_SEED, require(lookup, ENV_RECORDER_SEED)?)?,
        };

        let defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            base_fee: parsed(lookup, ENV_BASE_FEE, defaults.base_fee)?,
            tx_timeout: Duration::from_secs(parsed(
                lookup,
                ENV_TX_TIMEOUT_SECS,
                defaults.tx_timeout.as_secs(),
            )?),
            confirm_attempts: parsed(lookup, ENV_CONFIRM_ATTEMPTS, defaults.confirm_attempts)?,
            confirm_interval: Duration::from_millis(parsed(
                lookup,
                ENV_CONFIRM_INTERVAL_MS,
                defaults.confirm_interval.as_millis() as u64,
            )?),
        };

        Ok(Self {
            network,
            contracts,
            signers,
            pipeline,
            rpc_timeout: Duration::from_secs(parsed(lookup, ENV_RPC_TIMEOUT_SECS, 10)?),
        })
    }

    fn build_rpc(&self) -> Result<Arc<HttpLedgerRpc>, crate::error::Error> {
        Ok(Arc::new(
            HttpLedgerRpc::new(self.network.rpc_url.clone(), self.rpc_timeout)
                .map_err(crate::error::Error::Pipeline)?,
        ))
    }

    fn build_pipeline(
        &self,
        rpc: Arc<HttpLedgerRpc>,
    ) -> Result<TransactionPipeline, crate::error::Error> {
        let mut pipeline =
            TransactionPipeline::new(rpc, &self.network.passphrase, self.pipeline.clone());
        if let Some(horizon_url) = &self.network.horizon_url {
            let horizon = HorizonClient::new(horizon_url.clone(), self.rpc_timeout)
                .map_err(crate::error::Error::Pipeline)?;
            pipeline = pipeline.with_horizon(horizon);
        }
        Ok(pipeline)
    }

    /// Wire up the provisioning service against the configured network.
    pub fn provisioning_service(&self) -> Result<ProvisioningService, crate::error::Error> {
        let rpc = self.build_rpc()?;
        let funding = SignerHandle::from_seed(self.signers.funding_seed.expose_secret())
            .map_err(crate::error::Error::Address)?;
        Ok(ProvisioningService::new(
            Arc::clone(&rpc) as Arc<dyn crate::rpc::LedgerRpc>,
            self.build_pipeline(rpc)?,
            funding,
            self.contracts.factory.clone(),
            self.contracts.controller.clone(),
            self.network.passphrase.clone(),
        ))
    }

    /// Wire up the engagement recorder with the recorder signing key.
    pub fn engagement_recorder(&self) -> Result<EngagementRecorder, crate::error::Error> {
        let recorder = SignerHandle::from_seed(self.signers.recorder_seed.expose_secret())
            .map_err(crate::error::Error::Address)?;
        Ok(EngagementRecorder::new(
            self.build_pipeline(self.build_rpc()?)?,
            recorder,
            self.contracts.controller.clone(),
            self.contracts.collectibles.clone(),
        ))
    }
}

fn optional(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn require(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    optional(lookup, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parsed<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(lookup, key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

fn validated_url(key: &str, raw: String) -> Result<String, ConfigError> {
    let parsed = Url::parse(&raw).map_err(|e| ConfigError::InvalidEndpoint {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEndpoint {
            key: key.to_string(),
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(raw)
}

fn contract(key: &str, raw: String) -> Result<Address, ConfigError> {
    Address::contract_from_str(&raw).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn seed(key: &str, raw: String) -> Result<SecretString, ConfigError> {
    // Validate up front so a bad seed fails at startup, not mid-request.
    SignerHandle::from_seed(&raw).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    Ok(SecretString::from(raw))
}
