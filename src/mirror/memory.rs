//! In-memory mirror store.
//!
//! Used by tests and by single-process deployments that can afford to rebuild
//! the mirror from chain truth on restart (the reconciler makes that cheap).

use super::{MirrorError, MirrorStore};
use crate::domain::group::{Group, GroupStatus, Member};
use crate::shared::{ChatBinding, GroupId, UserId};
use async_lock::RwLock;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct InMemoryMirror {
    groups: Arc<RwLock<HashMap<GroupId, Group>>>,
}

impl InMemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MirrorStore for InMemoryMirror {
    async fn find_by_chat_binding(
        &self,
        binding: &ChatBinding,
    ) -> Result<Option<Group>, MirrorError> {
        let groups = self.groups.read().await;
        Ok(groups.values().find(|g| &g.chat_binding == binding).cloned())
    }

    async fn find_by_address(&self, address: &str) -> Result<Option<Group>, MirrorError> {
        let groups = self.groups.read().await;
        Ok(groups.values().find(|g| g.address == address).cloned())
    }

    async fn find_by_user(&self, user: &UserId) -> Result<Vec<Group>, MirrorError> {
        let groups = self.groups.read().await;
        Ok(groups
            .values()
            .filter(|g| g.is_member(user))
            .cloned()
            .collect())
    }

    async fn save(&self, group: &Group) -> Result<(), MirrorError> {
        let mut groups = self.groups.write().await;
        let binding_taken = groups
            .values()
            .any(|g| g.chat_binding == group.chat_binding && g.id != group.id);
        if binding_taken {
            return Err(MirrorError::DuplicateBinding(group.chat_binding.clone()));
        }
        groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn update_members(
        &self,
        id: &GroupId,
        expected_version: u64,
        members: &[Member],
    ) -> Result<u64, MirrorError> {
        let mut groups = self.groups.write().await;
        let group = groups.get_mut(id).ok_or(MirrorError::NotFound(*id))?;
        if group.version != expected_version {
            return Err(MirrorError::VersionConflict {
                id: *id,
                expected: expected_version,
                found: group.version,
            });
        }
        group.members = members.to_vec();
        group.version += 1;
        Ok(group.version)
    }

    async fn update_status(&self, id: &GroupId, status: GroupStatus) -> Result<(), MirrorError> {
        let mut groups = self.groups.write().await;
        let group = groups.get_mut(id).ok_or(MirrorError::NotFound(*id))?;
        // One-way transition: an ended group stays ended.
        if group.status != GroupStatus::Ended {
            group.status = status;
        }
        Ok(())
    }
}
