//! Group domain — the mirrored group/member records and their local invariants.
//!
//! The mirror is a fast off-chain copy of chain truth. Everything here is
//! validated *before* a chain call is issued; the chain remains authoritative
//! for membership existence and roles (see the reconciler).

use crate::chain::ChainTag;
use crate::shared::{ChatBinding, GroupId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest allowed member capacity.
pub const CAPACITY_MIN: u16 = 2;
/// Largest allowed member capacity.
pub const CAPACITY_MAX: u16 = 100;
/// Longest allowed group name, matching the on-chain account layout.
pub const NAME_MAX_LEN: usize = 64;

// ─── Role ────────────────────────────────────────────────────────────────────

/// Member role within a group. Traders may execute trades with pooled funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Trader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Member => write!(f, "member"),
            Role::Trader => write!(f, "trader"),
        }
    }
}

// ─── Visibility ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

// ─── GroupStatus ─────────────────────────────────────────────────────────────

/// Group lifecycle status. The transition is one-way: a group is never
/// re-opened after it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Active,
    Ended,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Active => "active",
            GroupStatus::Ended => "ended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(GroupStatus::Active),
            "ended" => Some(GroupStatus::Ended),
            _ => None,
        }
    }
}

// ─── Member ──────────────────────────────────────────────────────────────────

/// A mirrored member record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub user: UserId,
    pub role: Role,
    /// Informational mirror of the on-chain deposit, in the chain's smallest
    /// native unit.
    pub contribution: u64,
    pub joined_at: DateTime<Utc>,
}

impl Member {
    pub fn new(user: UserId, role: Role) -> Self {
        Self {
            user,
            role,
            contribution: 0,
            joined_at: Utc::now(),
        }
    }

    pub fn is_trader(&self) -> bool {
        self.role == Role::Trader
    }
}

// ─── Group ───────────────────────────────────────────────────────────────────

/// The mirrored group record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub creator: UserId,
    pub chat_binding: ChatBinding,
    pub chain: ChainTag,
    /// On-chain address, set once at creation and never overwritten.
    pub address: String,
    pub visibility: Visibility,
    pub status: GroupStatus,
    pub capacity: u16,
    /// Optimistic-concurrency counter; bumped by every member-list write.
    pub version: u64,
    pub members: Vec<Member>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// Build a fresh group record with the creator seated as a trader.
    pub fn new(
        name: String,
        creator: UserId,
        chat_binding: ChatBinding,
        chain: ChainTag,
        address: String,
        visibility: Visibility,
        capacity: u16,
    ) -> Self {
        let creator_member = Member::new(creator.clone(), Role::Trader);
        Self {
            id: GroupId::generate(),
            name,
            creator,
            chat_binding,
            chain,
            address,
            visibility,
            status: GroupStatus::Active,
            capacity,
            version: 0,
            members: vec![creator_member],
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == GroupStatus::Active
    }

    pub fn is_creator(&self, user: &UserId) -> bool {
        &self.creator == user
    }

    pub fn member(&self, user: &UserId) -> Option<&Member> {
        self.members.iter().find(|m| &m.user == user)
    }

    pub fn is_member(&self, user: &UserId) -> bool {
        self.member(user).is_some()
    }

    pub fn has_capacity(&self) -> bool {
        (self.members.len() as u16) < self.capacity
    }
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// Rejects group parameters before any chain call is issued.
#[derive(Debug, PartialEq, Eq)]
pub enum GroupValidationError {
    NameMissing,
    NameTooLong { len: usize },
    CapacityOutOfRange { capacity: u16 },
}

impl fmt::Display for GroupValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupValidationError::NameMissing => write!(f, "Missing group name"),
            GroupValidationError::NameTooLong { len } => {
                write!(f, "Group name too long: {len} > {NAME_MAX_LEN}")
            }
            GroupValidationError::CapacityOutOfRange { capacity } => write!(
                f,
                "Capacity {capacity} outside allowed range {CAPACITY_MIN}..={CAPACITY_MAX}"
            ),
        }
    }
}

impl std::error::Error for GroupValidationError {}

/// Validate creation parameters.
pub fn validate_group_params(name: &str, capacity: u16) -> Result<(), GroupValidationError> {
    if name.trim().is_empty() {
        return Err(GroupValidationError::NameMissing);
    }
    if name.len() > NAME_MAX_LEN {
        return Err(GroupValidationError::NameTooLong { len: name.len() });
    }
    if !(CAPACITY_MIN..=CAPACITY_MAX).contains(&capacity) {
        return Err(GroupValidationError::CapacityOutOfRange { capacity });
    }
    Ok(())
}
