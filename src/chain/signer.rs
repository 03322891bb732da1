//! Local secp256k1 signing account
//!
//! Holds the process-wide private key, derives its address, and signs
//! EIP-1559 (type 2) transactions.

use std::fmt;

use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use thiserror::Error;

use super::rlp;
use super::types::{Address, TxHash, decode_hex, keccak256};

/// EIP-2718 type byte of a dynamic-fee transaction
const EIP1559_TX_TYPE: u8 = 0x02;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("failed to sign transaction: {0}")]
    Signing(String),
}

/// Unsigned dynamic-fee transaction with an empty access list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
}

impl Eip1559Transaction {
    fn encode_fields(&self, out: &mut Vec<u8>) {
        rlp::encode_uint(self.chain_id.into(), out);
        rlp::encode_uint(self.nonce.into(), out);
        rlp::encode_uint(self.max_priority_fee_per_gas, out);
        rlp::encode_uint(self.max_fee_per_gas, out);
        rlp::encode_uint(self.gas_limit.into(), out);
        rlp::encode_bytes(self.to.as_bytes(), out);
        rlp::encode_uint(self.value, out);
        rlp::encode_bytes(&self.data, out);
        // access list
        rlp::encode_list(&[], out);
    }

    /// Hash that gets signed: `keccak256(0x02 || rlp([fields...]))`
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut fields = Vec::new();
        self.encode_fields(&mut fields);

        let mut payload = vec![EIP1559_TX_TYPE];
        rlp::encode_list(&fields, &mut payload);
        keccak256(payload)
    }
}

/// Raw bytes ready for `eth_sendRawTransaction`, plus their hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Vec<u8>,
    pub hash: TxHash,
}

/// The account that signs every write
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    /// Parse a hex private key, with or without the `0x` prefix
    pub fn from_hex(private_key: &str) -> Result<Self, SignerError> {
        let bytes = decode_hex(private_key.trim())
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(SignerError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key =
            SigningKey::from_slice(&bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;

        let point = key.verifying_key().to_encoded_point(false);
        let address = Address::from_word(&keccak256(&point.as_bytes()[1..]));

        Ok(Self { key, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn sign_hash(&self, hash: &[u8; 32]) -> Result<(Signature, RecoveryId), SignerError> {
        self.key
            .sign_prehash_recoverable(hash)
            .map_err(|e| SignerError::Signing(e.to_string()))
    }

    pub fn sign_transaction(
        &self,
        tx: &Eip1559Transaction,
    ) -> Result<SignedTransaction, SignerError> {
        let (signature, recovery_id) = self.sign_hash(&tx.signing_hash())?;
        let signature_bytes = signature.to_bytes();
        let (r, s) = signature_bytes.split_at(32);

        let mut fields = Vec::new();
        tx.encode_fields(&mut fields);
        rlp::encode_uint(u128::from(recovery_id.is_y_odd()), &mut fields);
        rlp::encode_bytes(rlp::strip_leading_zeros(r), &mut fields);
        rlp::encode_bytes(rlp::strip_leading_zeros(s), &mut fields);

        let mut raw = vec![EIP1559_TX_TYPE];
        rlp::encode_list(&fields, &mut raw);
        let hash = TxHash(keccak256(&raw));

        Ok(SignedTransaction { raw, hash })
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
