//! Account-model chain adapter (Solana).
//!
//! Group addresses are PDAs derived from `(name, creator)`, so they can be
//! recomputed without touching the chain. Signing is delegated to a
//! [`SolanaSigner`]; this adapter only builds instructions, submits them
//! through the signer, and reads accounts back.

pub mod instructions;
pub mod pda;
pub mod state;

use super::retry::{with_read_retry, RetryConfig};
use super::{CallReceipt, ChainAdapter, ChainError, ChainTag, CreateReceipt, OnChainGroupState};
use crate::custody::SolanaSigner;
use crate::domain::group::Visibility;
use crate::shared::UserId;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_instruction::Instruction;
use solana_pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use self::instructions::error_code;

/// Default timeout for a mutating call, end to end.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(45);

pub struct SolanaAdapter {
    rpc: Arc<RpcClient>,
    program_id: Pubkey,
    signer: Arc<dyn SolanaSigner>,
    call_timeout: Duration,
    read_retry: RetryConfig,
}

impl SolanaAdapter {
    pub fn new(rpc_url: &str, program_id: Pubkey, signer: Arc<dyn SolanaSigner>) -> Self {
        Self {
            rpc: Arc::new(RpcClient::new(rpc_url.to_string())),
            program_id,
            signer,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            read_retry: RetryConfig::default(),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_read_retry(mut self, retry: RetryConfig) -> Self {
        self.read_retry = retry;
        self
    }

    /// Map a raw custom program error code to its semantic variant.
    fn map_program_error(err: ChainError) -> ChainError {
        match err {
            ChainError::Program(code) => match code {
                error_code::GROUP_EXISTS => ChainError::GroupExists,
                error_code::ALREADY_MEMBER => ChainError::AlreadyMember,
                error_code::NOT_A_MEMBER => ChainError::NotAMember,
                error_code::ALREADY_TRADER => ChainError::AlreadyTrader,
                error_code::NOT_A_TRADER => ChainError::NotATrader,
                error_code::CAPACITY_EXCEEDED => ChainError::CapacityExceeded,
                error_code::GROUP_CLOSED => ChainError::GroupClosed,
                error_code::LOCK_PERIOD_ACTIVE => ChainError::LockPeriodActive,
                error_code::UNAUTHORIZED => ChainError::Unauthorized,
                error_code::INSUFFICIENT_CONTRIBUTION => {
                    ChainError::InsufficientFunds("contribution below minimum".to_string())
                }
                other => ChainError::Program(other),
            },
            other => other,
        }
    }

    /// Submit instructions under the call timeout; the outcome of a timed-out
    /// call stays ambiguous (no in-line retry).
    async fn submit(
        &self,
        caller: &UserId,
        instructions: Vec<Instruction>,
    ) -> Result<CallReceipt, ChainError> {
        let sent = tokio::time::timeout(
            self.call_timeout,
            self.signer.sign_and_send(caller, instructions),
        )
        .await
        .map_err(|_| ChainError::Timeout)?;

        match sent {
            Ok(transaction) => Ok(CallReceipt { transaction }),
            Err(err) => Err(Self::map_program_error(err)),
        }
    }

    fn parse_address(address: &str) -> Result<Pubkey, ChainError> {
        Pubkey::from_str(address)
            .map_err(|e| ChainError::Decode(format!("bad solana address {address}: {e}")))
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn chain_tag(&self) -> ChainTag {
        ChainTag::Solana
    }

    fn display_name(&self) -> &'static str {
        "Solana"
    }

    fn native_currency(&self) -> &'static str {
        "SOL"
    }

    async fn derive_group_address(
        &self,
        caller: &UserId,
        name: &str,
    ) -> Result<Option<String>, ChainError> {
        let creator = self.signer.pubkey_for(caller).await?;
        let (group, _) = pda::get_group_pda(name, &creator, &self.program_id);
        Ok(Some(group.to_string()))
    }

    async fn create_group(
        &self,
        caller: &UserId,
        name: &str,
        visibility: Visibility,
        capacity: u16,
    ) -> Result<CreateReceipt, ChainError> {
        let creator = self.signer.pubkey_for(caller).await?;
        let (group, _) = pda::get_group_pda(name, &creator, &self.program_id);

        let ix = instructions::build_create_group_ix(
            &creator,
            caller.as_str(),
            name,
            visibility,
            capacity,
            &self.program_id,
        );
        let receipt = self.submit(caller, vec![ix]).await?;

        Ok(CreateReceipt {
            address: group.to_string(),
            transaction: receipt.transaction,
        })
    }

    async fn join_group(&self, caller: &UserId, address: &str) -> Result<CallReceipt, ChainError> {
        let member = self.signer.pubkey_for(caller).await?;
        let group = Self::parse_address(address)?;
        let ix = instructions::build_join_group_ix(&member, caller.as_str(), &group, &self.program_id);
        self.submit(caller, vec![ix]).await
    }

    async fn leave_group(&self, caller: &UserId, address: &str) -> Result<CallReceipt, ChainError> {
        let member = self.signer.pubkey_for(caller).await?;
        let group = Self::parse_address(address)?;
        let ix = instructions::build_leave_group_ix(&member, &group, &self.program_id);
        self.submit(caller, vec![ix]).await
    }

    async fn close_group(&self, caller: &UserId, address: &str) -> Result<CallReceipt, ChainError> {
        let creator = self.signer.pubkey_for(caller).await?;
        let group = Self::parse_address(address)?;
        let ix = instructions::build_close_group_ix(&creator, &group, &self.program_id);
        self.submit(caller, vec![ix]).await
    }

    async fn add_trader(
        &self,
        caller: &UserId,
        address: &str,
        target: &UserId,
    ) -> Result<CallReceipt, ChainError> {
        let creator = self.signer.pubkey_for(caller).await?;
        let group = Self::parse_address(address)?;
        let ix = instructions::build_add_trader_ix(
            &creator,
            &group,
            target.as_str(),
            &self.program_id,
        );
        self.submit(caller, vec![ix]).await
    }

    async fn remove_trader(
        &self,
        caller: &UserId,
        address: &str,
        target: &UserId,
    ) -> Result<CallReceipt, ChainError> {
        let creator = self.signer.pubkey_for(caller).await?;
        let group = Self::parse_address(address)?;
        let ix = instructions::build_remove_trader_ix(
            &creator,
            &group,
            target.as_str(),
            &self.program_id,
        );
        self.submit(caller, vec![ix]).await
    }

    async fn fetch_group_state(&self, address: &str) -> Result<OnChainGroupState, ChainError> {
        let group = Self::parse_address(address)?;
        let rpc = self.rpc.clone();

        with_read_retry(&self.read_retry, || {
            let rpc = rpc.clone();
            async move {
                let resp = rpc
                    .get_account_with_commitment(&group, CommitmentConfig::confirmed())
                    .await
                    .map_err(|e| ChainError::Rpc(e.to_string()))?;

                let account = resp
                    .value
                    .ok_or_else(|| ChainError::GroupNotFound(group.to_string()))?;

                let decoded = state::decode_group_account(&account.data)?;
                Ok(state::to_group_state(decoded, &group, account.lamports))
            }
        })
        .await
    }
}
