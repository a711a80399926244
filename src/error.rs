//! Unified engine error types.
//!
//! Propagation policy: local invariant failures never reach a chain adapter;
//! idempotent-ignorable adapter errors are absorbed by the orchestrator and
//! converted to success; everything else propagates verbatim. Ambiguous
//! outcomes are always surfaced as [`LedgerError::MaybeSucceeded`] so the
//! caller knows to re-check rather than re-issue.

use crate::chain::selector::SelectorError;
use crate::chain::ChainError;
use crate::domain::group::GroupValidationError;
use crate::mirror::MirrorError;
use crate::shared::{ChatBinding, UserId};
use thiserror::Error;

/// Top-level error returned by the group ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no group is bound to chat {0}")]
    GroupNotFound(ChatBinding),

    #[error("no group found on-chain at {0}")]
    GroupMissingOnChain(String),

    #[error("user {0} is not a member of this group")]
    MemberNotFound(UserId),

    #[error("chat {0} already has a group")]
    AlreadyExists(ChatBinding),

    #[error("only the group creator may {action}")]
    PermissionDenied { action: &'static str },

    #[error("group is at member capacity")]
    CapacityExceeded,

    #[error("this group has ended")]
    GroupEnded,

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("the deposit lock period is still active")]
    LockPeriodActive,

    /// The chain call's outcome is unknown. The effect may still land;
    /// re-check the group (or run a reconcile) before re-issuing.
    #[error("{op} timed out or could not be confirmed; the on-chain effect may still land — re-check before re-issuing")]
    MaybeSucceeded {
        op: &'static str,
        #[source]
        source: ChainError,
    },

    #[error(transparent)]
    UnsupportedChain(#[from] SelectorError),

    #[error(transparent)]
    Validation(#[from] GroupValidationError),

    #[error("mirror store error: {0}")]
    Mirror(#[from] MirrorError),

    /// Unclassified chain error, propagated verbatim.
    #[error("chain error: {0}")]
    Chain(ChainError),
}
