// EVMPG - EVM Playground
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! The funded account that signs every playground transaction

use alloy_consensus::{SignableTransaction, Signed, TxLegacy};
use alloy_primitives::{Address, Bytes, SignatureError, TxKind, B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use thiserror::Error;

use crate::TransactionRequest;

/// Errors raised while preparing a transaction
#[derive(Debug, Error)]
pub enum WalletError {
    /// The configured key is not a valid secp256k1 secret
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// Signing failed
    #[error("failed to sign transaction: {0}")]
    Signing(#[from] alloy_signer::Error),

    /// The signature did not recover to a sender
    #[error("failed to recover transaction sender: {0}")]
    Recovery(#[from] SignatureError),
}

/// Local signer for the playground sender
#[derive(Debug, Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
}

impl Wallet {
    /// Load the signer from a raw private key
    pub fn from_private_key(key: &B256) -> Result<Self, WalletError> {
        let signer =
            PrivateKeySigner::from_bytes(key).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        Ok(Self { signer })
    }

    /// Address of the sender
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign a legacy transaction
    pub fn sign(&self, tx: TxLegacy) -> Result<Signed<TxLegacy>, WalletError> {
        let signature = self.signer.sign_hash_sync(&tx.signature_hash())?;
        Ok(tx.into_signed(signature))
    }

    /// Build, sign and unpack a transaction for the engine
    ///
    /// The caller of the returned request is the address recovered from the
    /// signature, so what runs is exactly what was signed.
    pub fn transaction(
        &self,
        chain_id: u64,
        nonce: u64,
        kind: TxKind,
        value: U256,
        data: Bytes,
        gas_limit: u64,
    ) -> Result<TransactionRequest, WalletError> {
        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price: 0,
            gas_limit,
            to: kind,
            value,
            input: data,
        };
        let signed = self.sign(tx)?;
        let caller = signed.recover_signer()?;
        let tx = signed.strip_signature();

        Ok(TransactionRequest {
            caller,
            kind: tx.to,
            value: tx.value,
            data: tx.input,
            gas_limit: tx.gas_limit,
            nonce: tx.nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use evmpg_common::DEFAULT_SENDER_PRIVATE_KEY;

    #[test]
    fn test_default_sender_address() {
        let wallet = Wallet::from_private_key(&DEFAULT_SENDER_PRIVATE_KEY).unwrap();
        assert_eq!(wallet.address(), address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"));
    }

    #[test]
    fn test_transaction_recovers_sender() {
        let wallet = Wallet::from_private_key(&DEFAULT_SENDER_PRIVATE_KEY).unwrap();
        let tx = wallet
            .transaction(1, 3, TxKind::Create, U256::from(5), Bytes::from_static(&[0x00]), 100_000)
            .unwrap();

        assert_eq!(tx.caller, wallet.address());
        assert!(tx.is_create());
        assert_eq!(tx.nonce, 3);
        assert_eq!(tx.value, U256::from(5));
        assert_eq!(tx.gas_limit, 100_000);
    }

    #[test]
    fn test_zero_key_is_rejected() {
        assert!(matches!(Wallet::from_private_key(&B256::ZERO), Err(WalletError::InvalidKey(_))));
    }
}
