//! Chain abstraction — the only chain-facing surface of the engine.
//!
//! A new chain family is added by implementing [`ChainAdapter`] and
//! registering it with the [`selector::AdapterRegistry`]; the orchestrator
//! never changes. Adapters perform real, irreversible chain mutations and
//! never persist anything themselves.

pub mod evm;
pub mod retry;
pub mod selector;
pub mod solana;

use crate::domain::group::Visibility;
use crate::shared::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ─── ChainTag ────────────────────────────────────────────────────────────────

/// Identifies a supported chain family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainTag {
    /// Account-model chain with deterministic program-derived addressing.
    Solana,
    /// Contract-model chain; group addresses are assigned at creation.
    Evm,
}

impl ChainTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainTag::Solana => "solana",
            ChainTag::Evm => "evm",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "solana" => Some(ChainTag::Solana),
            "evm" => Some(ChainTag::Evm),
            _ => None,
        }
    }
}

impl fmt::Display for ChainTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─── ChainError ──────────────────────────────────────────────────────────────

/// Chain-layer errors with distinguished codes.
///
/// The distinguished "effect already holds" codes (`GroupExists`,
/// `AlreadyMember`, `NotAMember`, `AlreadyTrader`, `NotATrader`) are what make
/// retries of partially-failed operations safe; the orchestrator classifies
/// them, this layer only reports them faithfully.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("a group already exists at the derived address")]
    GroupExists,

    #[error("caller is already a member of this group")]
    AlreadyMember,

    #[error("caller is not a member of this group")]
    NotAMember,

    #[error("target is already a trader")]
    AlreadyTrader,

    #[error("target is not a trader")]
    NotATrader,

    #[error("group member capacity exceeded on-chain")]
    CapacityExceeded,

    #[error("group is closed on-chain")]
    GroupClosed,

    #[error("deposit lock period is still active")]
    LockPeriodActive,

    #[error("caller is not authorized for this operation")]
    Unauthorized,

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("no group found at address {0}")]
    GroupNotFound(String),

    #[error("chain call timed out; the effect may still land")]
    Timeout,

    #[error("rpc transport error: {0}")]
    Rpc(String),

    /// Raw custom program error code, as reported by a Solana node. The
    /// adapter maps this to a semantic variant before anything else sees it.
    #[error("program error code {0}")]
    Program(u32),

    /// Raw EVM revert reason. The adapter maps this to a semantic variant
    /// before anything else sees it.
    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("malformed on-chain data: {0}")]
    Decode(String),
}

impl ChainError {
    /// Transient errors leave the outcome of a mutating call ambiguous; they
    /// are never auto-retried for mutations, only for reads.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Timeout | ChainError::Rpc(_))
    }
}

// ─── Receipts & on-chain state ───────────────────────────────────────────────

/// Result of a successful group creation on-chain.
#[derive(Debug, Clone)]
pub struct CreateReceipt {
    /// Address of the created group (derived or assigned, per chain family).
    pub address: String,
    pub transaction: String,
}

/// Result of a successful mutating call against an existing group.
#[derive(Debug, Clone)]
pub struct CallReceipt {
    pub transaction: String,
}

/// One member as the chain reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct OnChainMember {
    /// The caller identity recorded on-chain at join time.
    pub user: UserId,
    /// Chain-native wallet address, formatted for the chain family.
    pub wallet: String,
    pub is_trader: bool,
    /// Deposit in the chain's smallest native unit.
    pub contribution: u64,
}

/// Authoritative group state as read from the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct OnChainGroupState {
    pub address: String,
    pub open: bool,
    pub members: Vec<OnChainMember>,
    /// Pooled balance in the chain's smallest native unit.
    pub balance: u64,
}

impl OnChainGroupState {
    pub fn is_trader(&self, user: &UserId) -> bool {
        self.members
            .iter()
            .any(|m| &m.user == user && m.is_trader)
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.members.iter().any(|m| &m.user == user)
    }
}

// ─── ChainAdapter ────────────────────────────────────────────────────────────

/// Per-chain lifecycle operations.
///
/// All operations take an opaque caller identity; the custody layer resolves
/// it to signing capability. Mutating calls run under the adapter's timeout
/// and surface [`ChainError::Timeout`] when it elapses — the transaction may
/// still land afterwards, which is why the orchestrator never blindly
/// re-issues them.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain_tag(&self) -> ChainTag;
    fn display_name(&self) -> &'static str;
    /// Ticker of the chain's native currency, e.g. `"SOL"`.
    fn native_currency(&self) -> &'static str;

    /// Derive the address a group would occupy, without touching the chain.
    ///
    /// Returns `Some` only for account-model chains; contract-model chains
    /// cannot know the address before the creation call returns. This is the
    /// basis of the create-recovery path in the orchestrator.
    async fn derive_group_address(
        &self,
        caller: &UserId,
        name: &str,
    ) -> Result<Option<String>, ChainError>;

    async fn create_group(
        &self,
        caller: &UserId,
        name: &str,
        visibility: Visibility,
        capacity: u16,
    ) -> Result<CreateReceipt, ChainError>;

    async fn join_group(&self, caller: &UserId, address: &str) -> Result<CallReceipt, ChainError>;

    async fn leave_group(&self, caller: &UserId, address: &str) -> Result<CallReceipt, ChainError>;

    async fn close_group(&self, caller: &UserId, address: &str) -> Result<CallReceipt, ChainError>;

    async fn add_trader(
        &self,
        caller: &UserId,
        address: &str,
        target: &UserId,
    ) -> Result<CallReceipt, ChainError>;

    async fn remove_trader(
        &self,
        caller: &UserId,
        address: &str,
        target: &UserId,
    ) -> Result<CallReceipt, ChainError>;

    /// Read-only authoritative state; used by the reconciler and display
    /// collaborators. Retried transparently on transient failures.
    async fn fetch_group_state(&self, address: &str) -> Result<OnChainGroupState, ChainError>;
}
