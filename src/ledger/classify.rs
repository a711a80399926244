//! Adapter-outcome classification.
//!
//! Three classes, per operation:
//! - idempotent-ignorable: the intended effect already holds on-chain, so
//!   the operation converges the mirror and reports success;
//! - policy rejection: propagated verbatim, no mirror write;
//! - transient: the outcome is ambiguous; surfaced as "maybe succeeded" and
//!   never auto-retried (re-issuing a non-idempotent chain mutation risks
//!   duplicate effects).

use crate::chain::ChainError;
use crate::error::LedgerError;

/// The mutating lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Create,
    Join,
    Leave,
    Close,
    Promote,
    Demote,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::Join => "join",
            OpKind::Leave => "leave",
            OpKind::Close => "close",
            OpKind::Promote => "promote",
            OpKind::Demote => "demote",
        }
    }
}

/// Outcome of classifying an adapter error.
#[derive(Debug)]
pub enum Classified {
    /// The effect already holds on-chain; treat as success and converge the
    /// mirror without re-issuing the chain call.
    AlreadyApplied,
    /// Genuine failure; propagate.
    Failed(LedgerError),
}

/// Classify an adapter error for the given operation.
pub fn classify(op: OpKind, err: ChainError) -> Classified {
    // Idempotent-ignorable: each operation has exactly one "effect already
    // holds" code.
    let ignorable = matches!(
        (op, &err),
        (OpKind::Create, ChainError::GroupExists)
            | (OpKind::Join, ChainError::AlreadyMember)
            | (OpKind::Leave, ChainError::NotAMember)
            | (OpKind::Close, ChainError::GroupClosed)
            | (OpKind::Promote, ChainError::AlreadyTrader)
            | (OpKind::Demote, ChainError::NotATrader)
    );
    if ignorable {
        return Classified::AlreadyApplied;
    }

    Classified::Failed(match err {
        // Policy rejections propagate verbatim.
        ChainError::LockPeriodActive => LedgerError::LockPeriodActive,
        ChainError::Unauthorized => LedgerError::PermissionDenied {
            action: op.as_str(),
        },
        ChainError::CapacityExceeded => LedgerError::CapacityExceeded,
        ChainError::GroupClosed => LedgerError::GroupEnded,
        ChainError::InsufficientFunds(reason) => LedgerError::InsufficientFunds(reason),
        ChainError::GroupNotFound(address) => LedgerError::GroupMissingOnChain(address),

        // Ambiguous outcome: the effect may still land.
        err @ (ChainError::Timeout | ChainError::Rpc(_)) => LedgerError::MaybeSucceeded {
            op: op.as_str(),
            source: err,
        },

        // Everything else propagates unclassified.
        other => LedgerError::Chain(other),
    })
}
