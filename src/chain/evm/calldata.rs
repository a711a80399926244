//! ABI calldata for the group factory and group contracts.

use crate::chain::{ChainError, OnChainGroupState, OnChainMember};
use crate::shared::UserId;
use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;

/// First four bytes of the keccak-256 hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Topic0 of the factory's `GroupCreated(address group, address creator)` event.
pub fn group_created_topic() -> H256 {
    H256::from(keccak256("GroupCreated(address,address)".as_bytes()))
}

fn call_data(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode(tokens));
    data
}

/// `createGroup(string name, bool isPrivate, uint16 capacity, string userId)`
/// on the factory contract.
pub fn create_group(name: &str, private: bool, capacity: u16, user_id: &str) -> Vec<u8> {
    call_data(
        "createGroup(string,bool,uint16,string)",
        &[
            Token::String(name.to_string()),
            Token::Bool(private),
            Token::Uint(U256::from(capacity)),
            Token::String(user_id.to_string()),
        ],
    )
}

/// `joinGroup(string userId)` on the group contract.
pub fn join_group(user_id: &str) -> Vec<u8> {
    call_data("joinGroup(string)", &[Token::String(user_id.to_string())])
}

/// `leaveGroup()` on the group contract.
pub fn leave_group() -> Vec<u8> {
    selector("leaveGroup()").to_vec()
}

/// `closeGroup()` on the group contract.
pub fn close_group() -> Vec<u8> {
    selector("closeGroup()").to_vec()
}

/// `addTrader(string userId)` on the group contract.
pub fn add_trader(user_id: &str) -> Vec<u8> {
    call_data("addTrader(string)", &[Token::String(user_id.to_string())])
}

/// `removeTrader(string userId)` on the group contract.
pub fn remove_trader(user_id: &str) -> Vec<u8> {
    call_data("removeTrader(string)", &[Token::String(user_id.to_string())])
}

/// `getState()` on the group contract.
pub fn get_state() -> Vec<u8> {
    selector("getState()").to_vec()
}

/// Decode the `getState()` return:
/// `(bool open, address[] wallets, string[] userIds, bool[] traderFlags,
///   uint256[] contributions)`.
pub fn decode_group_state(
    address: &Address,
    data: &[u8],
    balance: U256,
) -> Result<OnChainGroupState, ChainError> {
    let tokens = decode(
        &[
            ParamType::Bool,
            ParamType::Array(Box::new(ParamType::Address)),
            ParamType::Array(Box::new(ParamType::String)),
            ParamType::Array(Box::new(ParamType::Bool)),
            ParamType::Array(Box::new(ParamType::Uint(256))),
        ],
        data,
    )
    .map_err(|e| ChainError::Decode(format!("getState return: {e}")))?;

    let mut iter = tokens.into_iter();
    let open = iter
        .next()
        .and_then(Token::into_bool)
        .ok_or_else(|| ChainError::Decode("getState: missing open flag".into()))?;
    let wallets = expect_array(iter.next(), "wallets")?;
    let user_ids = expect_array(iter.next(), "userIds")?;
    let trader_flags = expect_array(iter.next(), "traderFlags")?;
    let contributions = expect_array(iter.next(), "contributions")?;

    if wallets.len() != user_ids.len()
        || wallets.len() != trader_flags.len()
        || wallets.len() != contributions.len()
    {
        return Err(ChainError::Decode(
            "getState: member array lengths disagree".into(),
        ));
    }

    let mut members = Vec::with_capacity(wallets.len());
    for (((wallet, user_id), is_trader), contribution) in wallets
        .into_iter()
        .zip(user_ids)
        .zip(trader_flags)
        .zip(contributions)
    {
        let wallet = wallet
            .into_address()
            .ok_or_else(|| ChainError::Decode("getState: wallet is not an address".into()))?;
        let user_id = user_id
            .into_string()
            .ok_or_else(|| ChainError::Decode("getState: userId is not a string".into()))?;
        let is_trader = is_trader
            .into_bool()
            .ok_or_else(|| ChainError::Decode("getState: trader flag is not a bool".into()))?;
        let contribution = contribution
            .into_uint()
            .ok_or_else(|| ChainError::Decode("getState: contribution is not a uint".into()))?;

        members.push(OnChainMember {
            user: UserId::from(user_id),
            wallet: format!("{wallet:#x}"),
            is_trader,
            contribution: clamp_u64(contribution),
        });
    }

    Ok(OnChainGroupState {
        address: format!("{address:#x}"),
        open,
        members,
        balance: clamp_u64(balance),
    })
}

/// Extract the created group address from a `GroupCreated` event topic.
pub fn group_address_from_topic(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

fn expect_array(token: Option<Token>, what: &str) -> Result<Vec<Token>, ChainError> {
    token
        .and_then(Token::into_array)
        .ok_or_else(|| ChainError::Decode(format!("getState: {what} is not an array")))
}

fn clamp_u64(value: U256) -> u64 {
    value.min(U256::from(u64::MAX)).as_u64()
}
