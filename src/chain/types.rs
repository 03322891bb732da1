//! Primitive chain types: addresses, transaction hashes and event logs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Keccak-256 digest of `data`
pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    let digest = Keccak256::digest(data.as_ref());
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Decode a `0x`-prefixed (or bare) hex string into bytes
pub fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.len() % 2 == 1 {
        hex::decode(format!("0{}", digits))
    } else {
        hex::decode(digits)
    }
}

/// Encode bytes as a `0x`-prefixed lowercase hex string
pub fn encode_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parse a JSON-RPC quantity (`0x`-prefixed hex, no leading zeros required)
pub fn parse_quantity(s: &str) -> Option<u128> {
    let digits = s.strip_prefix("0x")?;
    if digits.is_empty() {
        return Some(0);
    }
    u128::from_str_radix(digits, 16).ok()
}

/// Format a number as a JSON-RPC quantity
pub fn format_quantity(n: u128) -> String {
    format!("{:#x}", n)
}

/// Error returned when parsing an [`Address`] or [`TxHash`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected} hex bytes, got `{input}`")]
pub struct ParseHexError {
    expected: usize,
    input: String,
}

fn parse_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParseHexError> {
    let err = || ParseHexError {
        expected: N,
        input: s.to_string(),
    };
    let bytes = decode_hex(s.trim()).map_err(|_| err())?;
    bytes.try_into().map_err(|_| err())
}

/// 20-byte account or contract address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Address derived from the last 20 bytes of a 32-byte word
    pub fn from_word(word: &[u8; 32]) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word[12..]);
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed(s).map(Address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_hex(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 32-byte transaction hash
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl FromStr for TxHash {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed(s).map(TxHash)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_hex(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self)
    }
}

impl Serialize for TxHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A contract event log as returned by `eth_getLogs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Option<TxHash>,
}

/// Wire form of a log; quantities and byte strings are hex encoded
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcLog {
    address: Address,
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    log_index: Option<String>,
    transaction_hash: Option<TxHash>,
}

impl TryFrom<RpcLog> for Log {
    type Error = String;

    fn try_from(raw: RpcLog) -> Result<Self, Self::Error> {
        let topics = raw
            .topics
            .iter()
            .map(|t| parse_fixed::<32>(t).map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        let data = decode_hex(&raw.data).map_err(|e| format!("invalid log data: {}", e))?;
        let quantity = |field: &Option<String>, name: &str| -> Result<u64, String> {
            let value = field
                .as_deref()
                .ok_or_else(|| format!("log is missing {}", name))?;
            parse_quantity(value)
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| format!("invalid {} `{}`", name, value))
        };

        Ok(Log {
            address: raw.address,
            topics,
            data,
            block_number: quantity(&raw.block_number, "blockNumber")?,
            log_index: quantity(&raw.log_index, "logIndex")?,
            transaction_hash: raw.transaction_hash,
        })
    }
}
