//! Chain detection and adapter lookup.
//!
//! Detection is a pure string-shape classifier: no network calls, total over
//! all inputs. Ambiguous or malformed addresses are rejected before they can
//! reach any adapter.

use super::{ChainAdapter, ChainTag};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("address shape matches no supported chain: {0}")]
    UnsupportedAddress(String),

    #[error("no adapter registered for chain {0}")]
    UnregisteredChain(ChainTag),
}

/// Classify an address string by shape.
///
/// `0x` + 40 hex chars → EVM. A base58 string of 32..=44 chars that decodes
/// to exactly 32 bytes → Solana. Everything else is rejected.
pub fn detect_chain(address: &str) -> Result<ChainTag, SelectorError> {
    if let Some(body) = address.strip_prefix("0x") {
        if body.len() == 40 && body.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Ok(ChainTag::Evm);
        }
        return Err(SelectorError::UnsupportedAddress(address.to_string()));
    }

    if (32..=44).contains(&address.len()) {
        if let Ok(bytes) = bs58::decode(address).into_vec() {
            if bytes.len() == 32 {
                return Ok(ChainTag::Solana);
            }
        }
    }

    Err(SelectorError::UnsupportedAddress(address.to_string()))
}

// ─── AdapterRegistry ─────────────────────────────────────────────────────────

/// Registry of chain adapters, keyed by tag.
///
/// Resolution takes an explicit tag when the caller has one, or falls back to
/// address-shape detection.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<ChainTag, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapters.insert(adapter.chain_tag(), adapter);
        self
    }

    pub fn by_tag(&self, tag: ChainTag) -> Result<Arc<dyn ChainAdapter>, SelectorError> {
        self.adapters
            .get(&tag)
            .cloned()
            .ok_or(SelectorError::UnregisteredChain(tag))
    }

    pub fn by_address(&self, address: &str) -> Result<Arc<dyn ChainAdapter>, SelectorError> {
        self.by_tag(detect_chain(address)?)
    }

    pub fn tags(&self) -> impl Iterator<Item = ChainTag> + '_ {
        self.adapters.keys().copied()
    }
}
