//! Ledger identifiers and deterministic address derivation.

pub mod strkey;
pub mod xdr;

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::AddressError;
use crate::ledger::xdr::{ContractIdPreimage, ScAddress};

/// A parsed ledger address: an ed25519 account (`G…`) or a contract (`C…`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Account([u8; 32]),
    Contract([u8; 32]),
}

impl Address {
    /// The raw 32-byte payload.
    pub fn payload(&self) -> &[u8; 32] {
        match self {
            Self::Account(key) => key,
            Self::Contract(id) => id,
        }
    }

    pub fn to_sc_address(&self) -> ScAddress {
        match self {
            Self::Account(key) => ScAddress::Account(*key),
            Self::Contract(id) => ScAddress::Contract(*id),
        }
    }

    /// Parse a contract address, rejecting account keys.
    pub fn contract_from_str(encoded: &str) -> Result<Self, AddressError> {
        strkey::decode(strkey::VERSION_CONTRACT, encoded).map(Self::Contract)
    }

    /// Parse an account address, rejecting contract identifiers.
    pub fn account_from_str(encoded: &str) -> Result<Self, AddressError> {
        strkey::decode(strkey::VERSION_ACCOUNT, encoded).map(Self::Account)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account(key) => f.write_str(&strkey::encode(strkey::VERSION_ACCOUNT, key)),
            Self::Contract(id) => f.write_str(&strkey::encode(strkey::VERSION_CONTRACT, id)),
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, AddressError> {
        match s.as_bytes().first() {
            Some(b'G') => Self::account_from_str(s),
            _ => Self::contract_from_str(s),
        }
    }
}

/// The network identifier every derivation and signature is bound to.
pub fn network_id(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// Predict the address of a contract deployed by `factory` with `salt`.
///
/// Builds the same hash preimage the ledger uses when it executes the
/// deployment, so the address is known before any transaction exists.
/// Pure: identical inputs always produce the identical address, and a
/// malformed factory address fails before any hashing happens.
pub fn contract_address(
    network_passphrase: &str,
    factory_address: &str,
    salt: &[u8; 32],
) -> Result<Address, AddressError> {
    let factory = Address::contract_from_str(factory_address)?;
    let preimage = ContractIdPreimage {
        network_id: network_id(network_passphrase),
        deployer: factory.to_sc_address(),
        salt: *salt,
    };
    let id: [u8; 32] = Sha256::digest(preimage.to_bytes()).into();
    Ok(Address::Contract(id))
}
