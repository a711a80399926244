//! End-to-end ledger tests against a scripted in-process chain.
//!
//! The mock adapter keeps authoritative "on-chain" state in memory and can be
//! told to fail the next mutating call, optionally after the effect has
//! already landed — the partial-failure shape the recovery paths exist for.

use groupvault_sdk::prelude::*;

use async_trait::async_trait;
use groupvault_sdk::chain::{CallReceipt, CreateReceipt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// ─── Mock chain ──────────────────────────────────────────────────────────────

#[derive(Clone)]
struct MockGroup {
    creator: UserId,
    capacity: u16,
    open: bool,
    members: Vec<OnChainMember>,
}

/// Failure to inject into the next mutating call.
struct InjectedFailure {
    error: ChainError,
    /// Apply the chain effect before failing (a send that landed despite the
    /// error the caller saw).
    effect_lands: bool,
}

struct MockChain {
    tag: ChainTag,
    /// Account-model chains can derive addresses; contract-model cannot.
    derivable: bool,
    groups: Mutex<HashMap<String, MockGroup>>,
    next_failure: Mutex<Option<InjectedFailure>>,
    mutating_calls: AtomicU32,
    created: AtomicU32,
}

impl MockChain {
    fn account_model() -> Self {
        Self {
            tag: ChainTag::Solana,
            derivable: true,
            groups: Mutex::new(HashMap::new()),
            next_failure: Mutex::new(None),
            mutating_calls: AtomicU32::new(0),
            created: AtomicU32::new(0),
        }
    }

    fn contract_model() -> Self {
        Self {
            tag: ChainTag::Evm,
            derivable: false,
            ..Self::account_model()
        }
    }

    fn derived(&self, caller: &UserId, name: &str) -> String {
        format!("{}:{}:{}", self.tag, name, caller)
    }

    fn fail_next(&self, error: ChainError, effect_lands: bool) {
        *self.next_failure.lock().unwrap() = Some(InjectedFailure { error, effect_lands });
    }

    fn calls(&self) -> u32 {
        self.mutating_calls.load(Ordering::SeqCst)
    }

    /// Returns the injected error if one is pending. `effect` has already run
    /// when `effect_lands` was requested.
    fn take_failure(&self, effect_landed: bool) -> Option<ChainError> {
        let mut slot = self.next_failure.lock().unwrap();
        match slot.take() {
            Some(f) if f.effect_lands == effect_landed => Some(f.error),
            Some(f) => {
                *slot = Some(f);
                None
            }
            None => None,
        }
    }

    /// Mutate the authoritative state directly, bypassing the ledger (drift).
    fn tamper<F: FnOnce(&mut MockGroup)>(&self, address: &str, f: F) {
        let mut groups = self.groups.lock().unwrap();
        f(groups.get_mut(address).expect("no such mock group"));
    }
}

fn member(user: &UserId, is_trader: bool) -> OnChainMember {
    OnChainMember {
        user: user.clone(),
        wallet: format!("wallet-{user}"),
        is_trader,
        contribution: 0,
    }
}

#[async_trait]
impl ChainAdapter for MockChain {
    fn chain_tag(&self) -> ChainTag {
        self.tag
    }

    fn display_name(&self) -> &'static str {
        "Mock"
    }

    fn native_currency(&self) -> &'static str {
        "MCK"
    }

    async fn derive_group_address(
        &self,
        caller: &UserId,
        name: &str,
    ) -> Result<Option<String>, ChainError> {
        Ok(self.derivable.then(|| self.derived(caller, name)))
    }

    async fn create_group(
        &self,
        caller: &UserId,
        name: &str,
        _visibility: Visibility,
        capacity: u16,
    ) -> Result<CreateReceipt, ChainError> {
        self.mutating_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure(false) {
            return Err(err);
        }

        let address = if self.derivable {
            self.derived(caller, name)
        } else {
            format!("contract-{}", self.created.fetch_add(1, Ordering::SeqCst))
        };

        {
            let mut groups = self.groups.lock().unwrap();
            if groups.contains_key(&address) {
                return Err(ChainError::GroupExists);
            }
            groups.insert(
                address.clone(),
                MockGroup {
                    creator: caller.clone(),
                    capacity,
                    open: true,
                    members: vec![member(caller, true)],
                },
            );
        }

        if let Some(err) = self.take_failure(true) {
            return Err(err);
        }
        Ok(CreateReceipt {
            address,
            transaction: format!("tx-create-{caller}"),
        })
    }

    async fn join_group(&self, caller: &UserId, address: &str) -> Result<CallReceipt, ChainError> {
        self.mutating_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure(false) {
            return Err(err);
        }

        {
            let mut groups = self.groups.lock().unwrap();
            let group = groups
                .get_mut(address)
                .ok_or_else(|| ChainError::GroupNotFound(address.to_string()))?;
            if !group.open {
                return Err(ChainError::GroupClosed);
            }
            if group.members.iter().any(|m| &m.user == caller) {
                return Err(ChainError::AlreadyMember);
            }
            if group.members.len() as u16 >= group.capacity {
                return Err(ChainError::CapacityExceeded);
            }
            group.members.push(member(caller, false));
        }

        if let Some(err) = self.take_failure(true) {
            return Err(err);
        }
        Ok(CallReceipt {
            transaction: format!("tx-join-{caller}"),
        })
    }

    async fn leave_group(&self, caller: &UserId, address: &str) -> Result<CallReceipt, ChainError> {
        self.mutating_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure(false) {
            return Err(err);
        }

        let mut groups = self.groups.lock().unwrap();
        let group = groups
            .get_mut(address)
            .ok_or_else(|| ChainError::GroupNotFound(address.to_string()))?;
        let before = group.members.len();
        group.members.retain(|m| &m.user != caller);
        if group.members.len() == before {
            return Err(ChainError::NotAMember);
        }
        Ok(CallReceipt {
            transaction: format!("tx-leave-{caller}"),
        })
    }

    async fn close_group(&self, caller: &UserId, address: &str) -> Result<CallReceipt, ChainError> {
        self.mutating_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure(false) {
            return Err(err);
        }

        let mut groups = self.groups.lock().unwrap();
        let group = groups
            .get_mut(address)
            .ok_or_else(|| ChainError::GroupNotFound(address.to_string()))?;
        if &group.creator != caller {
            return Err(ChainError::Unauthorized);
        }
        if !group.open {
            return Err(ChainError::GroupClosed);
        }
        group.open = false;
        Ok(CallReceipt {
            transaction: "tx-close".to_string(),
        })
    }

    async fn add_trader(
        &self,
        caller: &UserId,
        address: &str,
        target: &UserId,
    ) -> Result<CallReceipt, ChainError> {
        self.mutating_calls.fetch_add(1, Ordering::SeqCst);
        let mut groups = self.groups.lock().unwrap();
        let group = groups
            .get_mut(address)
            .ok_or_else(|| ChainError::GroupNotFound(address.to_string()))?;
        if &group.creator != caller {
            return Err(ChainError::Unauthorized);
        }
        let m = group
            .members
            .iter_mut()
            .find(|m| &m.user == target)
            .ok_or(ChainError::NotAMember)?;
        if m.is_trader {
            return Err(ChainError::AlreadyTrader);
        }
        m.is_trader = true;
        Ok(CallReceipt {
            transaction: "tx-promote".to_string(),
        })
    }

    async fn remove_trader(
        &self,
        caller: &UserId,
        address: &str,
        target: &UserId,
    ) -> Result<CallReceipt, ChainError> {
        self.mutating_calls.fetch_add(1, Ordering::SeqCst);
        let mut groups = self.groups.lock().unwrap();
        let group = groups
            .get_mut(address)
            .ok_or_else(|| ChainError::GroupNotFound(address.to_string()))?;
        if &group.creator != caller {
            return Err(ChainError::Unauthorized);
        }
        let m = group
            .members
            .iter_mut()
            .find(|m| &m.user == target)
            .ok_or(ChainError::NotAMember)?;
        if !m.is_trader {
            return Err(ChainError::NotATrader);
        }
        m.is_trader = false;
        Ok(CallReceipt {
            transaction: "tx-demote".to_string(),
        })
    }

    async fn fetch_group_state(&self, address: &str) -> Result<OnChainGroupState, ChainError> {
        let groups = self.groups.lock().unwrap();
        let group = groups
            .get(address)
            .ok_or_else(|| ChainError::GroupNotFound(address.to_string()))?;
        Ok(OnChainGroupState {
            address: address.to_string(),
            open: group.open,
            members: group.members.clone(),
            balance: 0,
        })
    }
}

// ─── Faulty mirror ───────────────────────────────────────────────────────────

/// Mirror wrapper that can fail or race the next write, for exercising the
/// chain-succeeded-mirror-lagging paths.
struct FaultyMirror {
    inner: InMemoryMirror,
    fail_next_save: AtomicBool,
    fail_next_member_write: AtomicBool,
    /// While set, every member-list write loses its CAS race.
    conflict_member_writes: AtomicBool,
    /// A concurrent writer that slips this user into the group bound to the
    /// chat right before the next member-list write.
    intruder: Mutex<Option<(ChatBinding, UserId)>>,
}

impl FaultyMirror {
    fn new() -> Self {
        Self {
            inner: InMemoryMirror::new(),
            fail_next_save: AtomicBool::new(false),
            fail_next_member_write: AtomicBool::new(false),
            conflict_member_writes: AtomicBool::new(false),
            intruder: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MirrorStore for FaultyMirror {
    async fn find_by_chat_binding(
        &self,
        binding: &ChatBinding,
    ) -> Result<Option<Group>, MirrorError> {
        self.inner.find_by_chat_binding(binding).await
    }

    async fn find_by_address(&self, address: &str) -> Result<Option<Group>, MirrorError> {
        self.inner.find_by_address(address).await
    }

    async fn find_by_user(&self, user: &UserId) -> Result<Vec<Group>, MirrorError> {
        self.inner.find_by_user(user).await
    }

    async fn save(&self, group: &Group) -> Result<(), MirrorError> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(MirrorError::Backend("mirror unavailable".into()));
        }
        self.inner.save(group).await
    }

    async fn update_members(
        &self,
        id: &GroupId,
        expected_version: u64,
        members: &[Member],
    ) -> Result<u64, MirrorError> {
        if self.fail_next_member_write.swap(false, Ordering::SeqCst) {
            return Err(MirrorError::Backend("mirror unavailable".into()));
        }
        if self.conflict_member_writes.load(Ordering::SeqCst) {
            return Err(MirrorError::VersionConflict {
                id: *id,
                expected: expected_version,
                found: expected_version + 1,
            });
        }
        let intruder = self.intruder.lock().unwrap().take();
        if let Some((binding, user)) = intruder {
            let group = self
                .inner
                .find_by_chat_binding(&binding)
                .await?
                .expect("intruder target missing");
            let mut raced = group.members.clone();
            raced.push(Member::new(user, Role::Member));
            self.inner
                .update_members(&group.id, group.version, &raced)
                .await?;
        }
        self.inner.update_members(id, expected_version, members).await
    }

    async fn update_status(&self, id: &GroupId, status: GroupStatus) -> Result<(), MirrorError> {
        self.inner.update_status(id, status).await
    }
}

struct FaultyHarness {
    chain: Arc<MockChain>,
    store: Arc<FaultyMirror>,
    ledger: GroupLedger,
}

fn faulty_harness(chain: MockChain) -> FaultyHarness {
    let chain = Arc::new(chain);
    let registry = AdapterRegistry::new().register(chain.clone());
    let store = Arc::new(FaultyMirror::new());
    FaultyHarness {
        chain: chain.clone(),
        store: store.clone(),
        ledger: GroupLedger::new(registry, store),
    }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

struct Harness {
    chain: Arc<MockChain>,
    store: Arc<InMemoryMirror>,
    ledger: GroupLedger,
}

fn harness(chain: MockChain) -> Harness {
    let chain = Arc::new(chain);
    let registry = AdapterRegistry::new().register(chain.clone());
    let store = Arc::new(InMemoryMirror::new());
    Harness {
        chain: chain.clone(),
        store: store.clone(),
        ledger: GroupLedger::new(registry, store),
    }
}

fn create_params(binding: &str, chain: ChainTag) -> CreateGroup {
    CreateGroup {
        name: "Alpha".to_string(),
        chat_binding: ChatBinding::from(binding),
        chain,
        visibility: Visibility::Private,
        capacity: 5,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

/// The worked scenario: create at capacity 5, fill it, overflow, promote,
/// demote, and reconcile cleanly at each checkpoint.
#[tokio::test]
async fn full_lifecycle_scenario() {
    let h = harness(MockChain::account_model());
    let creator = UserId::from("C");
    let binding = ChatBinding::from("-100");

    let receipt = h
        .ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();
    assert_eq!(receipt.outcome, OpOutcome::Applied);
    assert_eq!(receipt.mirror, MirrorSync::Synced);
    assert!(receipt.transaction.is_some());

    let reconciler = h.ledger.reconciler();
    let report = reconciler.reconcile(&receipt.group).await.unwrap();
    assert!(report.is_clean());

    // Creator counts toward capacity; four more fill the group.
    for user in ["A", "B", "D", "E"] {
        let r = h.ledger.join(&UserId::from(user), &binding).await.unwrap();
        assert_eq!(r.outcome, OpOutcome::Applied);
    }
    let group = h
        .ledger
        .group_by_binding(&binding)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(group.members.len(), 5);

    // The 6th join is rejected locally, before any chain call.
    let calls_before = h.chain.calls();
    let err = h.ledger.join(&UserId::from("F"), &binding).await.unwrap_err();
    assert!(matches!(err, LedgerError::CapacityExceeded));
    assert_eq!(h.chain.calls(), calls_before);

    // Promote then demote restores the original role.
    let promoted = h
        .ledger
        .promote(&creator, &binding, &UserId::from("A"))
        .await
        .unwrap();
    assert_eq!(
        promoted.group.member(&UserId::from("A")).unwrap().role,
        Role::Trader
    );
    let demoted = h
        .ledger
        .demote(&creator, &binding, &UserId::from("A"))
        .await
        .unwrap();
    assert_eq!(
        demoted.group.member(&UserId::from("A")).unwrap().role,
        Role::Member
    );

    let report = reconciler.reconcile(&demoted.group).await.unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn join_is_idempotent() {
    let h = harness(MockChain::account_model());
    let creator = UserId::from("C");
    let binding = ChatBinding::from("-100");
    h.ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();

    let joiner = UserId::from("A");
    let first = h.ledger.join(&joiner, &binding).await.unwrap();
    assert_eq!(first.outcome, OpOutcome::Applied);

    // Second join short-circuits on the mirror: no error, no chain call.
    let calls = h.chain.calls();
    let second = h.ledger.join(&joiner, &binding).await.unwrap();
    assert_eq!(second.outcome, OpOutcome::AlreadyApplied);
    assert_eq!(h.chain.calls(), calls);
    assert_eq!(
        second
            .group
            .members
            .iter()
            .filter(|m| m.user == joiner)
            .count(),
        1
    );
}

/// Drifted mirror: the member is on-chain but missing locally. The chain's
/// `AlreadyMember` code converges the mirror instead of erroring.
#[tokio::test]
async fn join_converges_a_drifted_mirror() {
    let h = harness(MockChain::account_model());
    let creator = UserId::from("C");
    let binding = ChatBinding::from("-100");
    let created = h
        .ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();
    let joiner = UserId::from("A");
    h.ledger.join(&joiner, &binding).await.unwrap();

    // Drop the member from the mirror only.
    let group = h
        .ledger
        .group_by_binding(&binding)
        .await
        .unwrap()
        .unwrap();
    let without_a: Vec<_> = group
        .members
        .iter()
        .filter(|m| m.user != joiner)
        .cloned()
        .collect();
    h.store
        .update_members(&group.id, group.version, &without_a)
        .await
        .unwrap();

    // Re-join: chain says AlreadyMember, mirror is re-converged.
    let receipt = h.ledger.join(&joiner, &binding).await.unwrap();
    assert_eq!(receipt.outcome, OpOutcome::AlreadyApplied);
    assert!(receipt.group.is_member(&joiner));

    let report = h
        .ledger
        .reconciler()
        .reconcile(&created.group)
        .await
        .unwrap();
    assert!(report.is_clean());
}

/// Deterministic addressing: the same (name, creator) resolves to the same
/// address, and a second create does not mint a duplicate on-chain group.
#[tokio::test]
async fn create_is_deterministic_on_the_account_model_chain() {
    let h = harness(MockChain::account_model());
    let creator = UserId::from("C");

    let first = h
        .ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();

    // Same name+creator, different chat binding: the chain reports the group
    // exists and the engine recovers the derived address.
    let second = h
        .ledger
        .create(&creator, create_params("-200", ChainTag::Solana))
        .await
        .unwrap();
    assert_eq!(second.outcome, OpOutcome::AlreadyApplied);
    assert_eq!(second.group.address, first.group.address);
    assert!(second.transaction.is_none());
}

/// A create whose send "fails" after the transaction landed is recovered by
/// re-deriving the address and reading the chain.
#[tokio::test]
async fn create_recovers_from_a_landed_but_failed_send() {
    let h = harness(MockChain::account_model());
    let creator = UserId::from("C");
    h.chain
        .fail_next(ChainError::Rpc("connection reset mid-send".into()), true);

    let receipt = h
        .ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();
    assert_eq!(receipt.outcome, OpOutcome::AlreadyApplied);
    assert!(receipt.group.is_member(&creator));
    assert_eq!(
        receipt.group.member(&creator).unwrap().role,
        Role::Trader
    );

    // The mirror record exists and reconciles cleanly.
    let report = h.ledger.reconciler().reconcile(&receipt.group).await.unwrap();
    assert!(report.is_clean());
}

/// On the contract-model chain the address is not derivable, so the same
/// failure stays ambiguous.
#[tokio::test]
async fn create_failure_stays_ambiguous_without_derivable_address() {
    let h = harness(MockChain::contract_model());
    let creator = UserId::from("C");
    h.chain
        .fail_next(ChainError::Rpc("connection reset mid-send".into()), true);

    let err = h
        .ledger
        .create(&creator, create_params("-100", ChainTag::Evm))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::MaybeSucceeded { op: "create", .. }
    ));
}

#[tokio::test]
async fn close_fences_all_further_mutations() {
    let h = harness(MockChain::account_model());
    let creator = UserId::from("C");
    let binding = ChatBinding::from("-100");
    h.ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();
    h.ledger.join(&UserId::from("A"), &binding).await.unwrap();

    // Non-creator cannot close, and no chain call is made.
    let calls = h.chain.calls();
    let err = h
        .ledger
        .close(&UserId::from("A"), &binding)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::PermissionDenied { action: "close" }));
    assert_eq!(h.chain.calls(), calls);

    let closed = h.ledger.close(&creator, &binding).await.unwrap();
    assert_eq!(closed.group.status, GroupStatus::Ended);

    // Every further mutating call fails with the domain error before the
    // adapter is reached.
    let calls = h.chain.calls();
    for result in [
        h.ledger.join(&UserId::from("F"), &binding).await,
        h.ledger.leave(&UserId::from("A"), &binding).await,
        h.ledger
            .promote(&creator, &binding, &UserId::from("A"))
            .await,
        h.ledger.close(&creator, &binding).await,
    ] {
        assert!(matches!(result.unwrap_err(), LedgerError::GroupEnded));
    }
    assert_eq!(h.chain.calls(), calls);
}

#[tokio::test]
async fn timeout_is_surfaced_as_maybe_succeeded() {
    let h = harness(MockChain::account_model());
    let creator = UserId::from("C");
    let binding = ChatBinding::from("-100");
    h.ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();

    h.chain.fail_next(ChainError::Timeout, false);
    let err = h
        .ledger
        .join(&UserId::from("A"), &binding)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::MaybeSucceeded { op: "join", .. }));

    // No mirror write happened for the ambiguous outcome.
    let group = h
        .ledger
        .group_by_binding(&binding)
        .await
        .unwrap()
        .unwrap();
    assert!(!group.is_member(&UserId::from("A")));
}

#[tokio::test]
async fn lock_period_rejection_propagates_on_leave() {
    let h = harness(MockChain::account_model());
    let creator = UserId::from("C");
    let binding = ChatBinding::from("-100");
    h.ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();
    h.ledger.join(&UserId::from("A"), &binding).await.unwrap();

    h.chain.fail_next(ChainError::LockPeriodActive, false);
    let err = h
        .ledger
        .leave(&UserId::from("A"), &binding)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::LockPeriodActive));

    // Still a member in the mirror.
    let group = h
        .ledger
        .group_by_binding(&binding)
        .await
        .unwrap()
        .unwrap();
    assert!(group.is_member(&UserId::from("A")));
}

#[tokio::test]
async fn creator_cannot_leave_or_be_demoted() {
    let h = harness(MockChain::account_model());
    let creator = UserId::from("C");
    let binding = ChatBinding::from("-100");
    h.ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();

    let calls = h.chain.calls();
    assert!(matches!(
        h.ledger.leave(&creator, &binding).await.unwrap_err(),
        LedgerError::PermissionDenied { action: "leave" }
    ));
    assert!(matches!(
        h.ledger.demote(&creator, &binding, &creator).await.unwrap_err(),
        LedgerError::PermissionDenied { .. }
    ));
    assert_eq!(h.chain.calls(), calls);
}

/// Drift injected behind the ledger's back is repaired by reconcile, which
/// reports the number of corrections and then converges to zero.
#[tokio::test]
async fn reconcile_repairs_role_and_existence_drift() {
    let h = harness(MockChain::account_model());
    let creator = UserId::from("C");
    let binding = ChatBinding::from("-100");
    let created = h
        .ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();
    h.ledger.join(&UserId::from("A"), &binding).await.unwrap();

    // On-chain, A became a trader and a member B appeared; the mirror saw
    // neither.
    h.chain.tamper(&created.group.address, |g| {
        g.members
            .iter_mut()
            .find(|m| m.user == UserId::from("A"))
            .unwrap()
            .is_trader = true;
        g.members.push(OnChainMember {
            user: UserId::from("B"),
            wallet: "wallet-B".into(),
            is_trader: false,
            contribution: 30,
        });
    });

    let group = h
        .ledger
        .group_by_binding(&binding)
        .await
        .unwrap()
        .unwrap();
    let reconciler = h.ledger.reconciler();
    let report = reconciler.reconcile(&group).await.unwrap();
    assert_eq!(report.corrected, 2);

    let repaired = h
        .ledger
        .group_by_binding(&binding)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        repaired.member(&UserId::from("A")).unwrap().role,
        Role::Trader
    );
    let b = repaired.member(&UserId::from("B")).unwrap();
    assert_eq!(b.contribution, 30);

    // Fixed point: a second pass corrects nothing.
    let report = reconciler.reconcile(&repaired).await.unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn reconcile_ends_a_group_closed_on_chain() {
    let h = harness(MockChain::account_model());
    let creator = UserId::from("C");
    let binding = ChatBinding::from("-100");
    let created = h
        .ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();

    h.chain.tamper(&created.group.address, |g| g.open = false);

    let report = h
        .ledger
        .reconciler()
        .reconcile(&created.group)
        .await
        .unwrap();
    assert!(report.status_corrected);

    let group = h
        .ledger
        .group_by_binding(&binding)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(group.status, GroupStatus::Ended);
}

#[tokio::test]
async fn duplicate_chat_binding_is_rejected_before_the_chain() {
    let h = harness(MockChain::account_model());
    let creator = UserId::from("C");
    h.ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();

    let calls = h.chain.calls();
    let err = h
        .ledger
        .create(&UserId::from("other"), create_params("-100", ChainTag::Solana))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyExists(_)));
    assert_eq!(h.chain.calls(), calls);
}

/// Chain write confirmed, mirror write fails: the operation still succeeds,
/// reports the drift window, and the reconciler closes it.
#[tokio::test]
async fn join_reports_pending_when_the_mirror_write_fails() {
    let h = faulty_harness(MockChain::account_model());
    let creator = UserId::from("C");
    let binding = ChatBinding::from("-100");
    h.ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();

    let calls = h.chain.calls();
    h.store.fail_next_member_write.store(true, Ordering::SeqCst);
    let receipt = h.ledger.join(&UserId::from("A"), &binding).await.unwrap();
    assert_eq!(receipt.outcome, OpOutcome::Applied);
    assert_eq!(receipt.mirror, MirrorSync::Pending);
    assert!(receipt.group.is_member(&UserId::from("A")));
    // Exactly one chain call; the failed mirror write never re-issues it.
    assert_eq!(h.chain.calls(), calls + 1);

    // The stored record still lags behind the chain.
    let stale = h
        .ledger
        .group_by_binding(&binding)
        .await
        .unwrap()
        .unwrap();
    assert!(!stale.is_member(&UserId::from("A")));

    let report = h.ledger.reconciler().reconcile(&stale).await.unwrap();
    assert_eq!(report.corrected, 1);
    let repaired = h
        .ledger
        .group_by_binding(&binding)
        .await
        .unwrap()
        .unwrap();
    assert!(repaired.is_member(&UserId::from("A")));
}

/// Same drift window on create: the group exists on-chain, the save failed,
/// and the receipt says so instead of erroring.
#[tokio::test]
async fn create_reports_pending_when_the_mirror_save_fails() {
    let h = faulty_harness(MockChain::account_model());
    let creator = UserId::from("C");
    h.store.fail_next_save.store(true, Ordering::SeqCst);

    let receipt = h
        .ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();
    assert_eq!(receipt.outcome, OpOutcome::Applied);
    assert_eq!(receipt.mirror, MirrorSync::Pending);

    // Nothing landed in the mirror.
    assert!(h
        .ledger
        .group_by_binding(&ChatBinding::from("-100"))
        .await
        .unwrap()
        .is_none());
}

/// A concurrent writer lands between the chain call and the mirror write.
/// The version conflict is resolved by re-reading and retrying the mirror
/// write only; both writes survive and the chain call is not re-issued.
#[tokio::test]
async fn join_retries_the_mirror_write_after_a_version_conflict() {
    let h = faulty_harness(MockChain::account_model());
    let creator = UserId::from("C");
    let binding = ChatBinding::from("-100");
    h.ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();

    *h.store.intruder.lock().unwrap() = Some((binding.clone(), UserId::from("Z")));
    let calls = h.chain.calls();
    let receipt = h.ledger.join(&UserId::from("A"), &binding).await.unwrap();
    assert_eq!(receipt.outcome, OpOutcome::Applied);
    assert_eq!(receipt.mirror, MirrorSync::Synced);
    assert_eq!(h.chain.calls(), calls + 1);
    assert!(receipt.group.is_member(&UserId::from("A")));
    assert!(receipt.group.is_member(&UserId::from("Z")));

    let stored = h
        .ledger
        .group_by_binding(&binding)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_member(&UserId::from("A")));
    assert!(stored.is_member(&UserId::from("Z")));
}

/// A reconcile pass that loses every CAS race reports zero corrections
/// rather than claiming repairs it never persisted.
#[tokio::test]
async fn reconcile_reports_nothing_corrected_when_every_write_conflicts() {
    let h = faulty_harness(MockChain::account_model());
    let creator = UserId::from("C");
    let created = h
        .ledger
        .create(&creator, create_params("-100", ChainTag::Solana))
        .await
        .unwrap();

    // Real drift on-chain, but the corrective write keeps losing.
    h.chain.tamper(&created.group.address, |g| {
        g.members.push(member(&UserId::from("B"), false));
    });
    h.store.conflict_member_writes.store(true, Ordering::SeqCst);
    let report = h.ledger.reconciler().reconcile(&created.group).await.unwrap();
    assert_eq!(report.corrected, 0);

    // The drift is still there for the next pass to repair.
    h.store.conflict_member_writes.store(false, Ordering::SeqCst);
    let report = h.ledger.reconciler().reconcile(&created.group).await.unwrap();
    assert_eq!(report.corrected, 1);
}
