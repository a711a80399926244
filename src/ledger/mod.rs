//! `GroupLedger` — the orchestration core.
//!
//! Every mutating operation runs the same sequence: validate local invariants
//! (fail fast, before any chain IO), perform the on-chain effect through the
//! selected adapter, classify the outcome, then write the mirror. The chain
//! write is authoritative; the mirror write may lag behind it, and that drift
//! window is reported honestly (`MirrorSync::Pending`) and closed by the
//! [`reconcile::Reconciler`].

pub mod classify;
pub mod reconcile;

use crate::chain::selector::AdapterRegistry;
use crate::chain::{ChainAdapter, ChainTag};
use crate::domain::group::{
    validate_group_params, Group, GroupStatus, Member, Role, Visibility,
};
use crate::error::LedgerError;
use crate::mirror::{MirrorError, MirrorStore};
use crate::shared::{ChatBinding, UserId};

use self::classify::{classify, Classified, OpKind};
use std::sync::Arc;

/// Bounded mirror CAS retries after a confirmed chain effect. The chain call
/// is never re-issued by these retries.
const MIRROR_CAS_ATTEMPTS: u32 = 3;

// ─── Results ─────────────────────────────────────────────────────────────────

/// How the requested effect came to hold on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    /// This call performed the chain mutation.
    Applied,
    /// The effect already held on-chain; no new mutation was issued.
    AlreadyApplied,
}

/// Whether the mirror caught up with the chain within this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorSync {
    Synced,
    /// On-chain succeeded, local state not yet updated. Resolved by the next
    /// reconcile.
    Pending,
}

/// Unified, chain-agnostic result of a lifecycle operation.
///
/// Chain-specific extras stay optional so no chain leaks into required
/// fields.
#[derive(Debug, Clone)]
pub struct OpReceipt {
    /// The group as this operation left it (best local knowledge).
    pub group: Group,
    pub outcome: OpOutcome,
    /// Transaction reference, when a chain mutation was issued.
    pub transaction: Option<String>,
    pub mirror: MirrorSync,
    pub chain: ChainTag,
}

/// Parameters for [`GroupLedger::create`].
#[derive(Debug, Clone)]
pub struct CreateGroup {
    pub name: String,
    pub chat_binding: ChatBinding,
    pub chain: ChainTag,
    pub visibility: Visibility,
    pub capacity: u16,
}

// ─── GroupLedger ─────────────────────────────────────────────────────────────

/// The only component callers use for group lifecycle operations.
#[derive(Clone)]
pub struct GroupLedger {
    adapters: AdapterRegistry,
    store: Arc<dyn MirrorStore>,
}

impl GroupLedger {
    pub fn new(adapters: AdapterRegistry, store: Arc<dyn MirrorStore>) -> Self {
        Self { adapters, store }
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// Build the reconciler sharing this ledger's adapters and store.
    pub fn reconciler(&self) -> reconcile::Reconciler {
        reconcile::Reconciler::new(self.adapters.clone(), self.store.clone())
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub async fn group_by_binding(
        &self,
        binding: &ChatBinding,
    ) -> Result<Option<Group>, LedgerError> {
        Ok(self.store.find_by_chat_binding(binding).await?)
    }

    pub async fn groups_for_user(&self, user: &UserId) -> Result<Vec<Group>, LedgerError> {
        Ok(self.store.find_by_user(user).await?)
    }

    // ── Create ───────────────────────────────────────────────────────────

    pub async fn create(
        &self,
        caller: &UserId,
        params: CreateGroup,
    ) -> Result<OpReceipt, LedgerError> {
        validate_group_params(&params.name, params.capacity)?;
        if self
            .store
            .find_by_chat_binding(&params.chat_binding)
            .await?
            .is_some()
        {
            return Err(LedgerError::AlreadyExists(params.chat_binding));
        }

        let adapter = self.adapters.by_tag(params.chain)?;

        match adapter
            .create_group(caller, &params.name, params.visibility, params.capacity)
            .await
        {
            Ok(receipt) => {
                let group = Group::new(
                    params.name,
                    caller.clone(),
                    params.chat_binding,
                    params.chain,
                    receipt.address,
                    params.visibility,
                    params.capacity,
                );
                let mirror = self.save_new_group(&group).await?;
                tracing::info!(
                    group = %group.id,
                    address = %group.address,
                    chain = %group.chain,
                    "group created"
                );
                Ok(OpReceipt {
                    group,
                    outcome: OpOutcome::Applied,
                    transaction: Some(receipt.transaction),
                    mirror,
                    chain: params.chain,
                })
            }
            // A failed send may still have landed; on the account-model
            // chain the address is derivable, so look before erroring out.
            Err(err) if matches!(err, crate::chain::ChainError::GroupExists) || err.is_transient() => {
                if let Some(receipt) = self
                    .try_recover_create(&*adapter, caller, &params)
                    .await?
                {
                    return Ok(receipt);
                }
                match classify(OpKind::Create, err) {
                    // Exists on-chain but the address is not derivable
                    // (contract-model chain): surface as a conflict rather
                    // than minting a duplicate.
                    Classified::AlreadyApplied => {
                        Err(LedgerError::AlreadyExists(params.chat_binding))
                    }
                    Classified::Failed(e) => Err(e),
                }
            }
            Err(err) => match classify(OpKind::Create, err) {
                Classified::AlreadyApplied => Err(LedgerError::AlreadyExists(params.chat_binding)),
                Classified::Failed(e) => Err(e),
            },
        }
    }

    /// Re-derive the expected address and check whether the group landed
    /// on-chain despite the apparent failure. Completes the mirror write if
    /// it did.
    async fn try_recover_create(
        &self,
        adapter: &dyn ChainAdapter,
        caller: &UserId,
        params: &CreateGroup,
    ) -> Result<Option<OpReceipt>, LedgerError> {
        let derived = match adapter.derive_group_address(caller, &params.name).await {
            Ok(Some(address)) => address,
            Ok(None) => return Ok(None),
            Err(err) => {
                tracing::debug!(error = %err, "create recovery: address derivation failed");
                return Ok(None);
            }
        };

        let state = match adapter.fetch_group_state(&derived).await {
            Ok(state) => state,
            Err(_) => return Ok(None),
        };

        tracing::info!(
            address = %derived,
            "create recovery: group found on-chain, completing mirror write"
        );

        let mut group = Group::new(
            params.name.clone(),
            caller.clone(),
            params.chat_binding.clone(),
            params.chain,
            derived,
            params.visibility,
            params.capacity,
        );
        // Seed the member list from chain truth rather than assumption.
        group.members = state
            .members
            .iter()
            .map(|m| {
                let role = if m.is_trader { Role::Trader } else { Role::Member };
                let mut member = Member::new(m.user.clone(), role);
                member.contribution = m.contribution;
                member
            })
            .collect();

        let mirror = self.save_new_group(&group).await?;
        Ok(Some(OpReceipt {
            group,
            outcome: OpOutcome::AlreadyApplied,
            transaction: None,
            mirror,
            chain: params.chain,
        }))
    }

    async fn save_new_group(&self, group: &Group) -> Result<MirrorSync, LedgerError> {
        match self.store.save(group).await {
            Ok(()) => Ok(MirrorSync::Synced),
            Err(MirrorError::DuplicateBinding(binding)) => {
                Err(LedgerError::AlreadyExists(binding))
            }
            Err(err) => {
                // Chain succeeded; the record will be rebuilt by reconcile.
                tracing::warn!(
                    group = %group.id,
                    error = %err,
                    "group created on-chain but mirror save failed"
                );
                Ok(MirrorSync::Pending)
            }
        }
    }

    // ── Join ─────────────────────────────────────────────────────────────

    pub async fn join(
        &self,
        caller: &UserId,
        binding: &ChatBinding,
    ) -> Result<OpReceipt, LedgerError> {
        let group = self.load_active(binding).await?;
        if group.is_member(caller) {
            return Ok(Self::noop_receipt(group));
        }
        if !group.has_capacity() {
            return Err(LedgerError::CapacityExceeded);
        }

        let adapter = self.adapters.by_tag(group.chain)?;
        let (outcome, transaction) =
            match adapter.join_group(caller, &group.address).await {
                Ok(receipt) => (OpOutcome::Applied, Some(receipt.transaction)),
                Err(err) => match classify(OpKind::Join, err) {
                    Classified::AlreadyApplied => (OpOutcome::AlreadyApplied, None),
                    Classified::Failed(e) => return Err(e),
                },
            };

        let joiner = caller.clone();
        let (group, mirror) = self
            .write_members(group, move |g| {
                let mut members = g.members.clone();
                if !members.iter().any(|m| m.user == joiner) {
                    members.push(Member::new(joiner.clone(), Role::Member));
                }
                members
            })
            .await;

        tracing::info!(group = %group.id, user = %caller, ?outcome, "member joined");
        Ok(OpReceipt {
            chain: group.chain,
            group,
            outcome,
            transaction,
            mirror,
        })
    }

    // ── Leave ────────────────────────────────────────────────────────────

    pub async fn leave(
        &self,
        caller: &UserId,
        binding: &ChatBinding,
    ) -> Result<OpReceipt, LedgerError> {
        let group = self.load_active(binding).await?;
        if !group.is_member(caller) {
            return Err(LedgerError::MemberNotFound(caller.clone()));
        }
        if group.is_creator(caller) {
            // The creator's exit path is `close`.
            return Err(LedgerError::PermissionDenied { action: "leave" });
        }

        let adapter = self.adapters.by_tag(group.chain)?;
        let (outcome, transaction) =
            match adapter.leave_group(caller, &group.address).await {
                Ok(receipt) => (OpOutcome::Applied, Some(receipt.transaction)),
                Err(err) => match classify(OpKind::Leave, err) {
                    Classified::AlreadyApplied => (OpOutcome::AlreadyApplied, None),
                    Classified::Failed(e) => return Err(e),
                },
            };

        let leaver = caller.clone();
        let (group, mirror) = self
            .write_members(group, move |g| {
                g.members
                    .iter()
                    .filter(|m| m.user != leaver)
                    .cloned()
                    .collect()
            })
            .await;

        tracing::info!(group = %group.id, user = %caller, ?outcome, "member left");
        Ok(OpReceipt {
            chain: group.chain,
            group,
            outcome,
            transaction,
            mirror,
        })
    }

    // ── Close ────────────────────────────────────────────────────────────

    pub async fn close(
        &self,
        caller: &UserId,
        binding: &ChatBinding,
    ) -> Result<OpReceipt, LedgerError> {
        let group = self.load_active(binding).await?;
        if !group.is_creator(caller) {
            return Err(LedgerError::PermissionDenied { action: "close" });
        }

        let adapter = self.adapters.by_tag(group.chain)?;
        let (outcome, transaction) =
            match adapter.close_group(caller, &group.address).await {
                Ok(receipt) => (OpOutcome::Applied, Some(receipt.transaction)),
                Err(err) => match classify(OpKind::Close, err) {
                    Classified::AlreadyApplied => (OpOutcome::AlreadyApplied, None),
                    Classified::Failed(e) => return Err(e),
                },
            };

        let mut group = group;
        let mirror = match self.store.update_status(&group.id, GroupStatus::Ended).await {
            Ok(()) => MirrorSync::Synced,
            Err(err) => {
                tracing::warn!(
                    group = %group.id,
                    error = %err,
                    "group closed on-chain but mirror status update failed"
                );
                MirrorSync::Pending
            }
        };
        group.status = GroupStatus::Ended;

        tracing::info!(group = %group.id, ?outcome, "group closed");
        Ok(OpReceipt {
            chain: group.chain,
            group,
            outcome,
            transaction,
            mirror,
        })
    }

    // ── Promote / Demote ─────────────────────────────────────────────────

    pub async fn promote(
        &self,
        caller: &UserId,
        binding: &ChatBinding,
        target: &UserId,
    ) -> Result<OpReceipt, LedgerError> {
        let group = self.load_active(binding).await?;
        if !group.is_creator(caller) {
            return Err(LedgerError::PermissionDenied { action: "promote" });
        }
        let member = group
            .member(target)
            .ok_or_else(|| LedgerError::MemberNotFound(target.clone()))?;
        if member.role == Role::Trader {
            return Ok(Self::noop_receipt(group));
        }

        let adapter = self.adapters.by_tag(group.chain)?;
        let (outcome, transaction) =
            match adapter.add_trader(caller, &group.address, target).await {
                Ok(receipt) => (OpOutcome::Applied, Some(receipt.transaction)),
                Err(err) => match classify(OpKind::Promote, err) {
                    Classified::AlreadyApplied => (OpOutcome::AlreadyApplied, None),
                    Classified::Failed(e) => return Err(e),
                },
            };

        let (group, mirror) = self.write_role(group, target, Role::Trader).await;
        tracing::info!(group = %group.id, user = %target, "member promoted to trader");
        Ok(OpReceipt {
            chain: group.chain,
            group,
            outcome,
            transaction,
            mirror,
        })
    }

    pub async fn demote(
        &self,
        caller: &UserId,
        binding: &ChatBinding,
        target: &UserId,
    ) -> Result<OpReceipt, LedgerError> {
        let group = self.load_active(binding).await?;
        if !group.is_creator(caller) {
            return Err(LedgerError::PermissionDenied { action: "demote" });
        }
        if group.is_creator(target) {
            // The creator's trader role is permanent.
            return Err(LedgerError::PermissionDenied { action: "demote the creator" });
        }
        let member = group
            .member(target)
            .ok_or_else(|| LedgerError::MemberNotFound(target.clone()))?;
        if member.role == Role::Member {
            return Ok(Self::noop_receipt(group));
        }

        let adapter = self.adapters.by_tag(group.chain)?;
        let (outcome, transaction) =
            match adapter.remove_trader(caller, &group.address, target).await {
                Ok(receipt) => (OpOutcome::Applied, Some(receipt.transaction)),
                Err(err) => match classify(OpKind::Demote, err) {
                    Classified::AlreadyApplied => (OpOutcome::AlreadyApplied, None),
                    Classified::Failed(e) => return Err(e),
                },
            };

        let (group, mirror) = self.write_role(group, target, Role::Member).await;
        tracing::info!(group = %group.id, user = %target, "trader demoted to member");
        Ok(OpReceipt {
            chain: group.chain,
            group,
            outcome,
            transaction,
            mirror,
        })
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    async fn load_active(&self, binding: &ChatBinding) -> Result<Group, LedgerError> {
        let group = self
            .store
            .find_by_chat_binding(binding)
            .await?
            .ok_or_else(|| LedgerError::GroupNotFound(binding.clone()))?;
        if !group.is_active() {
            return Err(LedgerError::GroupEnded);
        }
        Ok(group)
    }

    fn noop_receipt(group: Group) -> OpReceipt {
        OpReceipt {
            chain: group.chain,
            group,
            outcome: OpOutcome::AlreadyApplied,
            transaction: None,
            mirror: MirrorSync::Synced,
        }
    }

    /// Apply an idempotent member-list mutation under optimistic concurrency.
    ///
    /// The chain effect is already confirmed when this runs: on a version
    /// conflict the group is re-read and the mutation recomputed, never the
    /// chain call. Exhausted retries leave the mirror pending for reconcile.
    async fn write_members<F>(&self, group: Group, mutate: F) -> (Group, MirrorSync)
    where
        F: Fn(&Group) -> Vec<Member>,
    {
        let mut current = group;
        for attempt in 0..MIRROR_CAS_ATTEMPTS {
            let members = mutate(&current);
            match self
                .store
                .update_members(&current.id, current.version, &members)
                .await
            {
                Ok(version) => {
                    current.members = members;
                    current.version = version;
                    return (current, MirrorSync::Synced);
                }
                Err(MirrorError::VersionConflict { .. }) => {
                    tracing::debug!(
                        group = %current.id,
                        attempt,
                        "mirror version conflict, re-reading"
                    );
                    match self.store.find_by_address(&current.address).await {
                        Ok(Some(fresh)) => current = fresh,
                        _ => break,
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        group = %current.id,
                        error = %err,
                        "chain effect confirmed but mirror write failed"
                    );
                    current.members = members;
                    return (current, MirrorSync::Pending);
                }
            }
        }
        tracing::warn!(
            group = %current.id,
            "mirror write still conflicting after retries; leaving for reconcile"
        );
        let members = mutate(&current);
        current.members = members;
        (current, MirrorSync::Pending)
    }

    async fn write_role(
        &self,
        group: Group,
        target: &UserId,
        role: Role,
    ) -> (Group, MirrorSync) {
        let target = target.clone();
        self.write_members(group, move |g| {
            g.members
                .iter()
                .map(|m| {
                    let mut m = m.clone();
                    if m.user == target {
                        m.role = role;
                    }
                    m
                })
                .collect()
        })
        .await
    }
}
