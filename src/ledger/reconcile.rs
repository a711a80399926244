//! Reconciliation — re-deriving mirror state from chain truth.
//!
//! The chain is authoritative for member existence, roles, contributions and
//! the open/ended status; the mirror is only ever patched toward it, never
//! the reverse. The routine is read-only with respect to the chain and
//! converges to a fixed point, so it is safe to run repeatedly and
//! concurrently.

use crate::chain::selector::AdapterRegistry;
use crate::chain::OnChainGroupState;
use crate::domain::group::{Group, GroupStatus, Member, Role};
use crate::error::LedgerError;
use crate::mirror::{MirrorError, MirrorStore};

use std::sync::Arc;

/// Bounded CAS retries for the corrective mirror write.
const RECONCILE_CAS_ATTEMPTS: u32 = 3;

/// Outcome of one reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Member records corrected (added, dropped, role or contribution fixed).
    pub corrected: u32,
    /// Whether the mirror status was forced to Ended.
    pub status_corrected: bool,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.corrected == 0 && !self.status_corrected
    }
}

pub struct Reconciler {
    adapters: AdapterRegistry,
    store: Arc<dyn MirrorStore>,
}

impl Reconciler {
    pub fn new(adapters: AdapterRegistry, store: Arc<dyn MirrorStore>) -> Self {
        Self { adapters, store }
    }

    /// Fetch authoritative on-chain state and patch the mirror to match.
    /// Returns how much was corrected.
    pub async fn reconcile(&self, group: &Group) -> Result<ReconcileReport, LedgerError> {
        let adapter = self.adapters.by_tag(group.chain)?;
        let state = adapter
            .fetch_group_state(&group.address)
            .await
            .map_err(LedgerError::Chain)?;

        let mut report = ReconcileReport::default();
        let mut current = group.clone();

        for attempt in 0..RECONCILE_CAS_ATTEMPTS {
            let (members, corrected) = Self::corrected_members(&current, &state);
            if corrected == 0 {
                break;
            }

            match self
                .store
                .update_members(&current.id, current.version, &members)
                .await
            {
                // Only persisted corrections are reported; a pass that loses
                // every CAS race leaves the drift for the next one.
                Ok(_) => {
                    report.corrected = corrected;
                    break;
                }
                Err(MirrorError::VersionConflict { .. }) => {
                    tracing::debug!(
                        group = %current.id,
                        attempt,
                        "reconcile hit a concurrent write, re-reading"
                    );
                    match self.store.find_by_address(&current.address).await? {
                        Some(fresh) => current = fresh,
                        None => break,
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        if !state.open && current.status == GroupStatus::Active {
            self.store
                .update_status(&current.id, GroupStatus::Ended)
                .await?;
            report.status_corrected = true;
        }

        if !report.is_clean() {
            tracing::info!(
                group = %group.id,
                corrected = report.corrected,
                status_corrected = report.status_corrected,
                "reconciled mirror against chain"
            );
        }
        Ok(report)
    }

    /// Compute the converged member list and how many records needed fixing.
    fn corrected_members(group: &Group, state: &OnChainGroupState) -> (Vec<Member>, u32) {
        let mut corrected = 0u32;
        let mut members = Vec::with_capacity(state.members.len());

        for on_chain in &state.members {
            let role = if on_chain.is_trader {
                Role::Trader
            } else {
                Role::Member
            };
            match group.member(&on_chain.user) {
                Some(mirrored) => {
                    let mut m = mirrored.clone();
                    if m.role != role {
                        m.role = role;
                        corrected += 1;
                    }
                    if m.contribution != on_chain.contribution {
                        m.contribution = on_chain.contribution;
                        corrected += 1;
                    }
                    members.push(m);
                }
                None => {
                    // Present on-chain, missing in the mirror.
                    let mut m = Member::new(on_chain.user.clone(), role);
                    m.contribution = on_chain.contribution;
                    members.push(m);
                    corrected += 1;
                }
            }
        }

        // Mirrored members the chain does not know are dropped.
        corrected += group
            .members
            .iter()
            .filter(|m| !state.contains(&m.user))
            .count() as u32;

        (members, corrected)
    }
}
