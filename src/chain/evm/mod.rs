//! Contract-model chain adapter (EVM).
//!
//! A factory contract instantiates one group contract per group; the group's
//! address is assigned at creation and read back from the factory's
//! `GroupCreated` event. Unlike the account-model chain, the address cannot
//! be derived in advance, so it must be captured from the creation receipt.

pub mod calldata;

use super::retry::{with_read_retry, RetryConfig};
use super::{CallReceipt, ChainAdapter, ChainError, ChainTag, CreateReceipt, OnChainGroupState};
use crate::custody::{EvmCall, EvmSigner};
use crate::domain::group::Visibility;
use crate::shared::UserId;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, TransactionRequest, H256, U64};
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for a mutating call, including receipt polling.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct EvmAdapter {
    provider: Arc<Provider<Http>>,
    factory: Address,
    signer: Arc<dyn EvmSigner>,
    call_timeout: Duration,
    read_retry: RetryConfig,
}

impl EvmAdapter {
    pub fn new(
        rpc_url: &str,
        factory: Address,
        signer: Arc<dyn EvmSigner>,
    ) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ChainError::Rpc(format!("bad rpc url: {e}")))?;
        Ok(Self {
            provider: Arc::new(provider),
            factory,
            signer,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            read_retry: RetryConfig::default(),
        })
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_read_retry(mut self, retry: RetryConfig) -> Self {
        self.read_retry = retry;
        self
    }

    /// Map a revert reason string to its semantic variant.
    fn map_revert(err: ChainError) -> ChainError {
        match err {
            ChainError::Reverted(reason) => match reason.trim() {
                "GROUP_EXISTS" => ChainError::GroupExists,
                "ALREADY_MEMBER" => ChainError::AlreadyMember,
                "NOT_A_MEMBER" => ChainError::NotAMember,
                "ALREADY_TRADER" => ChainError::AlreadyTrader,
                "NOT_A_TRADER" => ChainError::NotATrader,
                "CAPACITY_EXCEEDED" => ChainError::CapacityExceeded,
                "GROUP_CLOSED" => ChainError::GroupClosed,
                "LOCK_ACTIVE" => ChainError::LockPeriodActive,
                "UNAUTHORIZED" => ChainError::Unauthorized,
                "INSUFFICIENT_FUNDS" => ChainError::InsufficientFunds(reason),
                _ => ChainError::Reverted(reason),
            },
            other => other,
        }
    }

    fn parse_address(address: &str) -> Result<Address, ChainError> {
        address
            .parse::<Address>()
            .map_err(|e| ChainError::Decode(format!("bad evm address {address}: {e}")))
    }

    /// Submit a call under the adapter timeout; no in-line retry.
    async fn submit(&self, caller: &UserId, call: EvmCall) -> Result<CallReceipt, ChainError> {
        let sent = tokio::time::timeout(self.call_timeout, self.signer.sign_and_send(caller, call))
            .await
            .map_err(|_| ChainError::Timeout)?;

        match sent {
            Ok(transaction) => Ok(CallReceipt { transaction }),
            Err(err) => Err(Self::map_revert(err)),
        }
    }

    /// Poll until the transaction is mined and return the created group
    /// address from the `GroupCreated` event.
    async fn await_created_address(&self, tx_hash: &str) -> Result<Address, ChainError> {
        let hash: H256 = tx_hash
            .parse()
            .map_err(|e| ChainError::Decode(format!("bad tx hash {tx_hash}: {e}")))?;
        let topic = calldata::group_created_topic();

        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))?;

            if let Some(receipt) = receipt {
                if receipt.status == Some(U64::zero()) {
                    return Err(ChainError::Reverted("creation transaction failed".into()));
                }
                return receipt
                    .logs
                    .iter()
                    .filter(|log| log.address == self.factory)
                    .find(|log| log.topics.first() == Some(&topic))
                    .and_then(|log| log.topics.get(1))
                    .map(calldata::group_address_from_topic)
                    .ok_or_else(|| {
                        ChainError::Decode("creation receipt has no GroupCreated event".into())
                    });
            }

            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain_tag(&self) -> ChainTag {
        ChainTag::Evm
    }

    fn display_name(&self) -> &'static str {
        "Ethereum"
    }

    fn native_currency(&self) -> &'static str {
        "ETH"
    }

    async fn derive_group_address(
        &self,
        _caller: &UserId,
        _name: &str,
    ) -> Result<Option<String>, ChainError> {
        // Contract addresses are assigned at creation; nothing to derive.
        Ok(None)
    }

    async fn create_group(
        &self,
        caller: &UserId,
        name: &str,
        visibility: Visibility,
        capacity: u16,
    ) -> Result<CreateReceipt, ChainError> {
        let data = calldata::create_group(
            name,
            visibility == Visibility::Private,
            capacity,
            caller.as_str(),
        );
        let call = EvmCall::new(self.factory, data);

        // The receipt wait shares the mutating-call timeout: past it, the
        // outcome is reported as ambiguous.
        let created = tokio::time::timeout(self.call_timeout, async {
            let receipt = self.signer.sign_and_send(caller, call).await?;
            let address = self.await_created_address(&receipt).await?;
            Ok::<_, ChainError>((address, receipt))
        })
        .await
        .map_err(|_| ChainError::Timeout)?;

        let (address, transaction) = created.map_err(Self::map_revert)?;
        Ok(CreateReceipt {
            address: format!("{address:#x}"),
            transaction,
        })
    }

    async fn join_group(&self, caller: &UserId, address: &str) -> Result<CallReceipt, ChainError> {
        let group = Self::parse_address(address)?;
        self.submit(caller, EvmCall::new(group, calldata::join_group(caller.as_str())))
            .await
    }

    async fn leave_group(&self, caller: &UserId, address: &str) -> Result<CallReceipt, ChainError> {
        let group = Self::parse_address(address)?;
        self.submit(caller, EvmCall::new(group, calldata::leave_group()))
            .await
    }

    async fn close_group(&self, caller: &UserId, address: &str) -> Result<CallReceipt, ChainError> {
        let group = Self::parse_address(address)?;
        self.submit(caller, EvmCall::new(group, calldata::close_group()))
            .await
    }

    async fn add_trader(
        &self,
        caller: &UserId,
        address: &str,
        target: &UserId,
    ) -> Result<CallReceipt, ChainError> {
        let group = Self::parse_address(address)?;
        self.submit(caller, EvmCall::new(group, calldata::add_trader(target.as_str())))
            .await
    }

    async fn remove_trader(
        &self,
        caller: &UserId,
        address: &str,
        target: &UserId,
    ) -> Result<CallReceipt, ChainError> {
        let group = Self::parse_address(address)?;
        self.submit(
            caller,
            EvmCall::new(group, calldata::remove_trader(target.as_str())),
        )
        .await
    }

    async fn fetch_group_state(&self, address: &str) -> Result<OnChainGroupState, ChainError> {
        let group = Self::parse_address(address)?;
        let provider = self.provider.clone();

        with_read_retry(&self.read_retry, || {
            let provider = provider.clone();
            async move {
                let tx: TypedTransaction = TransactionRequest::new()
                    .to(group)
                    .data(calldata::get_state())
                    .into();
                let raw = provider
                    .call(&tx, None)
                    .await
                    .map_err(|e| ChainError::Rpc(e.to_string()))?;

                // An address with no contract returns empty data.
                if raw.is_empty() {
                    return Err(ChainError::GroupNotFound(format!("{group:#x}")));
                }

                let balance = provider
                    .get_balance(group, None)
                    .await
                    .map_err(|e| ChainError::Rpc(e.to_string()))?;

                calldata::decode_group_state(&group, &raw, balance)
            }
        })
        .await
    }
}
