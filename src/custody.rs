//! Custody seams — signing capability, resolved per caller identity.
//!
//! The engine passes an opaque [`UserId`] through these traits and never sees
//! raw key material. Implementations (an MPC service, an embedded-wallet
//! provider, a local keystore) live outside this crate; tests supply mocks.
//!
//! `sign_and_send` implementations are expected to map node-reported
//! failures into [`ChainError::Program`] (Solana custom error codes) or
//! [`ChainError::Reverted`] (EVM revert reasons) so the adapters can
//! classify them.

use crate::chain::ChainError;
use crate::shared::UserId;
use async_trait::async_trait;
use ethers::types::Address;
use solana_instruction::Instruction;
use solana_pubkey::Pubkey;

/// A prepared EVM contract call, ready to be signed and submitted.
#[derive(Debug, Clone)]
pub struct EvmCall {
    pub to: Address,
    pub data: Vec<u8>,
}

impl EvmCall {
    pub fn new(to: Address, data: Vec<u8>) -> Self {
        Self { to, data }
    }
}

/// Signing capability for the account-model chain.
#[async_trait]
pub trait SolanaSigner: Send + Sync {
    /// Resolve a caller identity to its wallet pubkey.
    async fn pubkey_for(&self, caller: &UserId) -> Result<Pubkey, ChainError>;

    /// Sign and submit a transaction built from `instructions`; returns the
    /// transaction signature as a base58 string.
    async fn sign_and_send(
        &self,
        caller: &UserId,
        instructions: Vec<Instruction>,
    ) -> Result<String, ChainError>;
}

/// Signing capability for the contract-model chain.
#[async_trait]
pub trait EvmSigner: Send + Sync {
    /// Resolve a caller identity to its wallet address.
    async fn address_for(&self, caller: &UserId) -> Result<Address, ChainError>;

    /// Sign and submit `call`; returns the transaction hash as a 0x-prefixed
    /// hex string.
    async fn sign_and_send(&self, caller: &UserId, call: EvmCall) -> Result<String, ChainError>;
}
