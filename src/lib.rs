//! # GroupVault SDK
//!
//! A Rust SDK for the GroupVault protocol: shared on-chain group funds that
//! can live on an account-model chain (Solana) or a contract-model chain
//! (EVM), mirrored off-chain for fast reads.
//!
//! ## Architecture
//!
//! The SDK is organized in layers:
//!
//! 1. **Core** — Shared newtypes, domain models, errors (no IO)
//! 2. **Chain** — `ChainAdapter` trait + Solana/EVM adapters, chain selector
//! 3. **Custody** — Signing-capability seams; no key material in this crate
//! 4. **Mirror** — `MirrorStore` repository trait + in-memory implementation
//! 5. **Orchestration** — `GroupLedger` paired chain/mirror writes, the
//!    `Reconciler`, and TTL session state
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use groupvault_sdk::prelude::*;
//!
//! let registry = AdapterRegistry::new()
//!     .register(solana_adapter)
//!     .register(evm_adapter);
//! let ledger = GroupLedger::new(registry, store);
//!
//! let receipt = ledger
//!     .create(&caller, CreateGroup {
//!         name: "Alpha".into(),
//!         chat_binding: "-1002233445566".into(),
//!         chain: ChainTag::Solana,
//!         visibility: Visibility::Private,
//!         capacity: 5,
//!     })
//!     .await?;
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Shared newtypes used across all layers.
pub mod shared;

/// Domain modules (vertical slices).
pub mod domain;

/// Unified engine error types.
pub mod error;

// ── Layer 2: Chain ───────────────────────────────────────────────────────────

/// Chain abstraction: adapter trait, selector, per-chain implementations.
pub mod chain;

// ── Layer 3: Custody ─────────────────────────────────────────────────────────

/// Signing-capability seams resolved per caller identity.
pub mod custody;

// ── Layer 4: Mirror ──────────────────────────────────────────────────────────

/// Off-chain mirror repository.
pub mod mirror;

// ── Layer 5: Orchestration ───────────────────────────────────────────────────

/// `GroupLedger` — the primary entry point — and the `Reconciler`.
pub mod ledger;

/// TTL session state for multi-step flows.
pub mod session;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared newtypes
    pub use crate::shared::{ChatBinding, GroupId, UserId};

    // Domain types
    pub use crate::domain::group::{
        Group, GroupStatus, Member, Role, Visibility, CAPACITY_MAX, CAPACITY_MIN,
    };

    // Chain layer
    pub use crate::chain::selector::{detect_chain, AdapterRegistry, SelectorError};
    pub use crate::chain::{
        ChainAdapter, ChainError, ChainTag, OnChainGroupState, OnChainMember,
    };
    pub use crate::chain::evm::EvmAdapter;
    pub use crate::chain::retry::RetryConfig;
    pub use crate::chain::solana::SolanaAdapter;

    // Custody
    pub use crate::custody::{EvmCall, EvmSigner, SolanaSigner};

    // Mirror
    pub use crate::mirror::{InMemoryMirror, MirrorError, MirrorStore};

    // Orchestration
    pub use crate::ledger::reconcile::{ReconcileReport, Reconciler};
    pub use crate::ledger::{CreateGroup, GroupLedger, MirrorSync, OpOutcome, OpReceipt};
    pub use crate::session::SessionStore;

    // Errors
    pub use crate::error::LedgerError;
}
