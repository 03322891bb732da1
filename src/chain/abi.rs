//! Solidity ABI encoding for the contract surface we talk to
//!
//! Covers `uint256` (values limited to 64 bits) and `string`, the only types
//! the preferences contract uses. Function selectors and event topics are
//! derived from the canonical signatures with keccak-256.

use std::fmt;

use thiserror::Error;

use super::types::{Address, keccak256};

/// Selector of the standard `Error(string)` revert payload
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Selector of the standard `Panic(uint256)` revert payload
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

const WORD: usize = 32;

/// Errors raised while encoding or decoding ABI data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("unknown event `{0}`")]
    UnknownEvent(String),

    #[error("`{function}` expects {expected} arguments, got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("argument {index} of `{function}` must be {expected}, got {got}")]
    ArgumentType {
        function: String,
        index: usize,
        expected: ParamType,
        got: ParamType,
    },

    #[error("data truncated at byte offset {0}")]
    Truncated(usize),

    #[error("integer does not fit in 64 bits")]
    Overflow,

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("log topic does not match event `{0}`")]
    TopicMismatch(String),

    #[error("indexed dynamic parameter `{0}` cannot be decoded from its topic hash")]
    UnsupportedIndexed(String),
}

/// ABI parameter types understood by this module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Uint256,
    String,
}

impl ParamType {
    /// Canonical name used in signatures
    pub fn canonical(&self) -> &'static str {
        match self {
            ParamType::Uint256 => "uint256",
            ParamType::String => "string",
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ParamType::String)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical())
    }
}

/// A decoded (or to-be-encoded) ABI value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(u64),
    String(String),
}

impl Token {
    pub fn param_type(&self) -> ParamType {
        match self {
            Token::Uint(_) => ParamType::Uint256,
            Token::String(_) => ParamType::String,
        }
    }

    pub fn into_uint(self) -> Option<u64> {
        match self {
            Token::Uint(n) => Some(n),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Token::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<u64> for Token {
    fn from(n: u64) -> Self {
        Token::Uint(n)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::String(s.to_string())
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Token::String(s)
    }
}

/// A contract function: name plus input and output types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub name: String,
    pub inputs: Vec<ParamType>,
    pub outputs: Vec<ParamType>,
}

impl FunctionDescriptor {
    pub fn new(name: &str, inputs: &[ParamType], outputs: &[ParamType]) -> Self {
        Self {
            name: name.to_string(),
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
        }
    }

    /// Canonical signature, e.g. `setUserPreferences(uint256,string,string)`
    pub fn signature(&self) -> String {
        signature(&self.name, self.inputs.iter())
    }

    /// First four bytes of the keccak-256 hash of the signature
    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.signature());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    /// Encode selector and arguments as call data
    ///
    /// Argument count and types are checked against the descriptor.
    pub fn encode_call(&self, args: &[Token]) -> Result<Vec<u8>, AbiError> {
        if args.len() != self.inputs.len() {
            return Err(AbiError::ArgumentCount {
                function: self.name.clone(),
                expected: self.inputs.len(),
                got: args.len(),
            });
        }
        for (index, (expected, arg)) in self.inputs.iter().zip(args).enumerate() {
            if arg.param_type() != *expected {
                return Err(AbiError::ArgumentType {
                    function: self.name.clone(),
                    index,
                    expected: *expected,
                    got: arg.param_type(),
                });
            }
        }

        let mut data = self.selector().to_vec();
        data.extend(encode(args));
        Ok(data)
    }

    /// Decode the return data of a call
    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<Token>, AbiError> {
        decode(&self.outputs, data)
    }
}

/// A single event parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventParam {
    pub name: String,
    pub kind: ParamType,
    pub indexed: bool,
}

/// A contract event: name plus parameters in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDescriptor {
    pub name: String,
    pub params: Vec<EventParam>,
}

impl EventDescriptor {
    pub fn signature(&self) -> String {
        signature(&self.name, self.params.iter().map(|p| &p.kind))
    }

    /// Topic 0 of every log emitted for this event
    pub fn topic(&self) -> [u8; 32] {
        keccak256(self.signature())
    }

    /// Decode a log's topics and data into tokens in declaration order
    pub fn decode_log(&self, topics: &[[u8; 32]], data: &[u8]) -> Result<Vec<Token>, AbiError> {
        if topics.first() != Some(&self.topic()) {
            return Err(AbiError::TopicMismatch(self.name.clone()));
        }

        let body_types: Vec<ParamType> = self
            .params
            .iter()
            .filter(|p| !p.indexed)
            .map(|p| p.kind)
            .collect();
        let mut body = decode(&body_types, data)?.into_iter();
        let mut indexed = topics[1..].iter();

        self.params
            .iter()
            .map(|param| {
                if !param.indexed {
                    return body.next().ok_or(AbiError::Truncated(data.len()));
                }
                if param.kind.is_dynamic() {
                    return Err(AbiError::UnsupportedIndexed(param.name.clone()));
                }
                let topic = indexed
                    .next()
                    .ok_or_else(|| AbiError::TopicMismatch(self.name.clone()))?;
                word_to_u64(topic).map(Token::Uint)
            })
            .collect()
    }
}

impl EventDescriptor {
    /// `UserPreferencesUpdated(uint256 indexed fid, string country, string dietaryRestrictions)`
    pub fn user_preferences_updated() -> Self {
        let param = |name: &str, kind: ParamType, indexed: bool| EventParam {
            name: name.to_string(),
            kind,
            indexed,
        };

        Self {
            name: "UserPreferencesUpdated".to_string(),
            params: vec![
                param("fid", ParamType::Uint256, true),
                param("country", ParamType::String, false),
                param("dietaryRestrictions", ParamType::String, false),
            ],
        }
    }
}

/// The functions and events of a deployed contract
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContractInterface {
    pub functions: Vec<FunctionDescriptor>,
    pub events: Vec<EventDescriptor>,
}

impl ContractInterface {
    /// Interface of the `UserPreferences` contract
    pub fn user_preferences() -> Self {
        use ParamType::{String as Str, Uint256};

        Self {
            functions: vec![
                FunctionDescriptor::new("fidToPreferences", &[Uint256], &[Str, Str]),
                FunctionDescriptor::new("setUserPreferences", &[Uint256, Str, Str], &[]),
            ],
            events: vec![EventDescriptor::user_preferences_updated()],
        }
    }

    pub fn function(&self, name: &str) -> Result<&FunctionDescriptor, AbiError> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| AbiError::UnknownFunction(name.to_string()))
    }

    pub fn event(&self, name: &str) -> Result<&EventDescriptor, AbiError> {
        self.events
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| AbiError::UnknownEvent(name.to_string()))
    }
}

/// Which deployed contract we talk to, and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractBinding {
    pub address: Address,
    pub interface: ContractInterface,
}

fn signature<'a>(name: &str, params: impl Iterator<Item = &'a ParamType>) -> String {
    let params: Vec<&str> = params.map(ParamType::canonical).collect();
    format!("{}({})", name, params.join(","))
}

fn uint_word(n: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[24..].copy_from_slice(&n.to_be_bytes());
    word
}


/// Encode a tuple of tokens (head/tail layout, no selector)
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = WORD * tokens.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::String(s) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u64));
                tail.extend_from_slice(&uint_word(s.len() as u64));
                tail.extend_from_slice(s.as_bytes());
                let rem = tail.len() % WORD;
                if rem != 0 {
                    tail.resize(tail.len() + WORD - rem, 0);
                }
            }
            Token::Uint(n) => head.extend_from_slice(&uint_word(*n)),
        }
    }

    head.extend(tail);
    head
}

fn read_word(data: &[u8], offset: usize) -> Result<&[u8; WORD], AbiError> {
    offset
        .checked_add(WORD)
        .and_then(|end| data.get(offset..end))
        .and_then(|slice| slice.try_into().ok())
        .ok_or(AbiError::Truncated(offset))
}

fn word_to_u64(word: &[u8; WORD]) -> Result<u64, AbiError> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow);
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(low))
}

/// Decode a tuple of the given types
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    types
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            let word = read_word(data, i * WORD)?;
            if *kind == ParamType::Uint256 {
                return word_to_u64(word).map(Token::Uint);
            }

            let offset = usize::try_from(word_to_u64(word)?).map_err(|_| AbiError::Overflow)?;
            let len = usize::try_from(word_to_u64(read_word(data, offset)?)?)
                .map_err(|_| AbiError::Overflow)?;
            let start = offset + WORD;
            let bytes = start
                .checked_add(len)
                .and_then(|end| data.get(start..end))
                .ok_or(AbiError::Truncated(start))?;
            String::from_utf8(bytes.to_vec())
                .map(Token::String)
                .map_err(|_| AbiError::InvalidUtf8)
        })
        .collect()
}

/// Extract a human readable reason from revert data
///
/// Understands `Error(string)` and `Panic(uint256)` payloads; anything else
/// yields `None`.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let (selector, body) = data.split_at_checked(4)?;
    if selector == ERROR_SELECTOR {
        decode(&[ParamType::String], body)
            .ok()?
            .pop()?
            .into_string()
    } else if selector == PANIC_SELECTOR {
        let code = decode(&[ParamType::Uint256], body).ok()?.pop()?.into_uint()?;
        Some(format!("panic code {:#x}", code))
    } else {
        None
    }
}

#[cfg(test)]
#[path = "abi_tests.rs"]
mod abi_tests;
