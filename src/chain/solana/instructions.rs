//! Instruction builders for the group program.

use solana_instruction::{AccountMeta, Instruction};
use solana_pubkey::Pubkey;

use super::pda::get_group_pda;
use crate::domain::group::Visibility;

// System program ID
fn system_program_id() -> Pubkey {
    solana_system_interface::program::ID
}

/// Instruction discriminators.
pub mod tag {
    pub const CREATE_GROUP: u8 = 0;
    pub const JOIN_GROUP: u8 = 1;
    pub const LEAVE_GROUP: u8 = 2;
    pub const CLOSE_GROUP: u8 = 3;
    pub const ADD_TRADER: u8 = 4;
    pub const REMOVE_TRADER: u8 = 5;
}

/// Custom error codes reported by the group program.
pub mod error_code {
    pub const GROUP_EXISTS: u32 = 6000;
    pub const ALREADY_MEMBER: u32 = 6001;
    pub const NOT_A_MEMBER: u32 = 6002;
    pub const ALREADY_TRADER: u32 = 6003;
    pub const NOT_A_TRADER: u32 = 6004;
    pub const CAPACITY_EXCEEDED: u32 = 6005;
    pub const GROUP_CLOSED: u32 = 6006;
    pub const LOCK_PERIOD_ACTIVE: u32 = 6007;
    pub const UNAUTHORIZED: u32 = 6008;
    pub const INSUFFICIENT_CONTRIBUTION: u32 = 6009;
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Create an account meta for a signer+writable account.
fn signer_mut(pubkey: Pubkey) -> AccountMeta {
    AccountMeta::new(pubkey, true)
}

/// Create an account meta for a writable account.
fn writable(pubkey: Pubkey) -> AccountMeta {
    AccountMeta::new(pubkey, false)
}

/// Create an account meta for a read-only account.
fn readonly(pubkey: Pubkey) -> AccountMeta {
    AccountMeta::new_readonly(pubkey, false)
}

/// Append a u32-length-prefixed UTF-8 string.
fn push_str(data: &mut Vec<u8>, s: &str) {
    data.extend_from_slice(&(s.len() as u32).to_le_bytes());
    data.extend_from_slice(s.as_bytes());
}

// ============================================================================
// Instruction Builders
// ============================================================================

/// Build CreateGroup instruction.
///
/// Accounts:
/// 0. creator (signer, mut) - Pays rent, becomes the group authority
/// 1. group (mut) - Group PDA derived from (name, creator)
/// 2. system_program (readonly)
pub fn build_create_group_ix(
    creator: &Pubkey,
    creator_user_id: &str,
    name: &str,
    visibility: Visibility,
    capacity: u16,
    program_id: &Pubkey,
) -> Instruction {
    let (group, _) = get_group_pda(name, creator, program_id);

    let keys = vec![
        signer_mut(*creator),
        writable(group),
        readonly(system_program_id()),
    ];

    // Data: [tag, visibility (u8), capacity (u16 LE), name (len-prefixed),
    //        creator_user_id (len-prefixed)]
    let mut data = Vec::with_capacity(8 + name.len() + creator_user_id.len());
    data.push(tag::CREATE_GROUP);
    data.push(match visibility {
        Visibility::Public => 0,
        Visibility::Private => 1,
    });
    data.extend_from_slice(&capacity.to_le_bytes());
    push_str(&mut data, name);
    push_str(&mut data, creator_user_id);

    Instruction {
        program_id: *program_id,
        accounts: keys,
        data,
    }
}

/// Build JoinGroup instruction.
///
/// Accounts:
/// 0. member (signer, mut)
/// 1. group (mut)
/// 2. system_program (readonly)
pub fn build_join_group_ix(
    member: &Pubkey,
    member_user_id: &str,
    group: &Pubkey,
    program_id: &Pubkey,
) -> Instruction {
    let keys = vec![
        signer_mut(*member),
        writable(*group),
        readonly(system_program_id()),
    ];

    // Data: [tag, member_user_id (len-prefixed)]
    let mut data = Vec::with_capacity(5 + member_user_id.len());
    data.push(tag::JOIN_GROUP);
    push_str(&mut data, member_user_id);

    Instruction {
        program_id: *program_id,
        accounts: keys,
        data,
    }
}

/// Build LeaveGroup instruction.
///
/// Accounts:
/// 0. member (signer, mut) - Receives the refunded contribution
/// 1. group (mut)
pub fn build_leave_group_ix(member: &Pubkey, group: &Pubkey, program_id: &Pubkey) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![signer_mut(*member), writable(*group)],
        data: vec![tag::LEAVE_GROUP],
    }
}

/// Build CloseGroup instruction.
///
/// Accounts:
/// 0. creator (signer, mut) - Must be the group authority
/// 1. group (mut)
pub fn build_close_group_ix(creator: &Pubkey, group: &Pubkey, program_id: &Pubkey) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![signer_mut(*creator), writable(*group)],
        data: vec![tag::CLOSE_GROUP],
    }
}

/// Build AddTrader instruction.
///
/// Accounts:
/// 0. creator (signer) - Must be the group authority
/// 1. group (mut)
pub fn build_add_trader_ix(
    creator: &Pubkey,
    group: &Pubkey,
    target_user_id: &str,
    program_id: &Pubkey,
) -> Instruction {
    // Data: [tag, target_user_id (len-prefixed)]
    let mut data = Vec::with_capacity(5 + target_user_id.len());
    data.push(tag::ADD_TRADER);
    push_str(&mut data, target_user_id);

    Instruction {
        program_id: *program_id,
        accounts: vec![signer_mut(*creator), writable(*group)],
        data,
    }
}

/// Build RemoveTrader instruction.
///
/// Accounts:
/// 0. creator (signer) - Must be the group authority
/// 1. group (mut)
pub fn build_remove_trader_ix(
    creator: &Pubkey,
    group: &Pubkey,
    target_user_id: &str,
    program_id: &Pubkey,
) -> Instruction {
    let mut data = Vec::with_capacity(5 + target_user_id.len());
    data.push(tag::REMOVE_TRADER);
    push_str(&mut data, target_user_id);

    Instruction {
        program_id: *program_id,
        accounts: vec![signer_mut(*creator), writable(*group)],
        data,
    }
}
