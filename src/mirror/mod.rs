//! Mirror store — the off-chain repository of group records.
//!
//! The engine never issues raw queries; it only calls this interface.
//! Writes are single-document updates relying on the store's own atomicity;
//! member-list updates are compare-and-swap on the group's `version` field.

pub mod memory;

use crate::domain::group::{Group, GroupStatus, Member};
use crate::shared::{ChatBinding, GroupId, UserId};
use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryMirror;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("no mirrored group with id {0}")]
    NotFound(GroupId),

    #[error("chat binding {0} already has a group")]
    DuplicateBinding(ChatBinding),

    #[error("version conflict on group {id}: expected {expected}, found {found}")]
    VersionConflict {
        id: GroupId,
        expected: u64,
        found: u64,
    },

    #[error("mirror backend error: {0}")]
    Backend(String),
}

/// Repository interface over persisted group records.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    async fn find_by_chat_binding(
        &self,
        binding: &ChatBinding,
    ) -> Result<Option<Group>, MirrorError>;

    async fn find_by_address(&self, address: &str) -> Result<Option<Group>, MirrorError>;

    async fn find_by_user(&self, user: &UserId) -> Result<Vec<Group>, MirrorError>;

    /// Insert a new group record. Fails with [`MirrorError::DuplicateBinding`]
    /// if the chat binding is already taken.
    async fn save(&self, group: &Group) -> Result<(), MirrorError>;

    /// Replace the member list if the stored version matches
    /// `expected_version`; returns the new version on success.
    async fn update_members(
        &self,
        id: &GroupId,
        expected_version: u64,
        members: &[Member],
    ) -> Result<u64, MirrorError>;

    /// One-way status update (active → ended).
    async fn update_status(&self, id: &GroupId, status: GroupStatus) -> Result<(), MirrorError>;
}
