//! Promotion XP grants and the correction of the roster's spurious wound entries.
//!
//! Granting a defeated troop the XP it needs for its next upgrade goes through the roster's
//! raw count API. The roster answers a full-XP re-add by creating a wounded copy of the
//! source troop and a wounded entry for the upgrade target, neither of which should exist.
//! Each grant therefore records an [`Expectation`]; when the roster reports the mutation for
//! the upgrade target, the correction routine pops it and removes both artefacts.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::{LedgerError, RosterError};
use crate::host::{
    CountsChange, CountsMutation, RosterId, RosterObserver, TroopRoster, UpgradeCostModel,
};
use crate::troop::{CombatantTemplate, TroopId};

/// A roster side effect we caused and still have to undo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    pub roster: RosterId,
    pub upgrade_target: TroopId,
    pub source: TroopId,
    pub expected_xp: i32,
}

type LedgerKey = (RosterId, TroopId);

/// Pending expectations, keyed by `(roster, upgrade target)`.
#[derive(Debug, Default)]
pub struct ExpectationLedger {
    entries: Mutex<IndexMap<LedgerKey, Expectation>>,
}

impl ExpectationLedger {
    fn lock(&self) -> MutexGuard<'_, IndexMap<LedgerKey, Expectation>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn expect(&self, expectation: Expectation) -> Result<(), LedgerError> {
        let key = (expectation.roster, expectation.upgrade_target.clone());
        let mut entries = self.lock();
        if entries.contains_key(&key) {
            return Err(LedgerError::AlreadyPending {
                roster: key.0,
                target: key.1,
            });
        }
        entries.insert(key, expectation);
        Ok(())
    }

    pub fn contains(&self, roster: RosterId, target: &TroopId) -> bool {
        self.lock().contains_key(&(roster, target.clone()))
    }

    pub fn pop(&self, roster: RosterId, target: &TroopId) -> Option<Expectation> {
        self.lock().shift_remove(&(roster, target.clone()))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Expectation> {
        self.lock().values().cloned().collect()
    }
}

/// Marks the current thread as correcting; released on every exit path when dropped.
///
/// Only re-entry from the same thread is refused. Corrections on other threads proceed.
struct CorrectionGuard<'a> {
    active: &'a Mutex<HashSet<ThreadId>>,
    thread: ThreadId,
}

impl<'a> CorrectionGuard<'a> {
    fn acquire(active: &'a Mutex<HashSet<ThreadId>>) -> Option<Self> {
        let thread = thread::current().id();
        let entered = active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(thread);
        entered.then_some(CorrectionGuard { active, thread })
    }
}

impl Drop for CorrectionGuard<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.thread);
    }
}

/// Which wounded entry of the source troop a correction removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Wounded entry whose XP matched the granted amount.
    Exact(usize),
    /// Fallback: wounded entry with some other XP.
    Stray(usize),
    Nothing,
}

#[derive(Debug, Default)]
pub struct PromotionReconciler {
    ledger: ExpectationLedger,
    correcting: Mutex<HashSet<ThreadId>>,
}

impl PromotionReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> &ExpectationLedger {
        &self.ledger
    }

    pub fn pending(&self) -> usize {
        self.ledger.len()
    }

    pub fn clear(&self) {
        self.ledger.clear();
    }

    /// Give one healthy copy of `source` exactly the XP its first upgrade costs.
    ///
    /// Returns false, leaving the roster untouched, when the troop is missing, has no
    /// healthy copies, has no upgrade path, or the upgrade costs nothing.
    pub fn grant_upgrade_xp(
        &self,
        roster: &mut dyn TroopRoster,
        source: &CombatantTemplate,
        model: &dyn UpgradeCostModel,
    ) -> bool {
        let Some(index) = roster.index_of(&source.id) else {
            return false;
        };
        let healthy = match (roster.number_at(index), roster.wounded_at(index)) {
            (Ok(number), Ok(wounded)) => number - wounded,
            _ => return false,
        };
        if healthy <= 0 {
            return false;
        }
        let Some(target) = source.first_upgrade_target() else {
            return false;
        };
        let xp = model.xp_cost(roster.id(), &source.id, target);
        if xp <= 0 {
            return false;
        }

        let expectation = Expectation {
            roster: roster.id(),
            upgrade_target: target.clone(),
            source: source.id.clone(),
            expected_xp: xp,
        };
        if let Err(e) = self.ledger.expect(expectation) {
            debug!(error = %e, "grant skipped");
            return false;
        }

        // The roster may report (and we may correct) the artefacts before this returns.
        let taken = roster.add_to_counts(
            CountsMutation::new(source.id.clone(), -1)
                .keep_depleted()
                .at(index),
        );
        if let Err(e) = taken {
            warn!(troop = %source.id, error = %e, "could not take a copy for promotion");
            self.ledger.pop(roster.id(), target);
            return false;
        }

        let returned = roster.add_to_counts(
            CountsMutation::new(source.id.clone(), 1)
                .xp(xp)
                .at(index),
        );
        if let Err(e) = returned {
            warn!(troop = %source.id, error = %e, "could not return promoted copy");
            self.ledger.pop(roster.id(), target);
            if let Err(e) = roster.add_to_counts(CountsMutation::new(source.id.clone(), 1)) {
                warn!(troop = %source.id, error = %e, "promoted copy lost");
            }
            return false;
        }

        debug!(troop = %source.id, %target, xp, "granted promotion xp");
        true
    }

    /// Reacts to a roster mutation. Only a successful mutation of a troop we expect, in the
    /// roster we expect it in, triggers a correction; nested calls on the correcting thread
    /// are ignored.
    pub fn on_counts_changed(&self, roster: &mut dyn TroopRoster, change: &CountsChange) {
        let Ok(&touched) = change.outcome.as_ref() else {
            return;
        };
        let Some(_guard) = CorrectionGuard::acquire(&self.correcting) else {
            return;
        };
        let Some(expectation) = self.ledger.pop(roster.id(), &change.troop) else {
            return;
        };

        if let Err(e) = correct(roster, touched, change, &expectation) {
            warn!(error = %e, "promotion correction failed; dropping all pending corrections");
            self.ledger.clear();
        }
    }
}

impl RosterObserver for PromotionReconciler {
    fn on_counts_changed(&self, roster: &mut dyn TroopRoster, change: &CountsChange) {
        PromotionReconciler::on_counts_changed(self, roster, change);
    }
}

fn correct(
    roster: &mut dyn TroopRoster,
    touched: usize,
    change: &CountsChange,
    expectation: &Expectation,
) -> Result<Removal, RosterError> {
    // Undo the single copy the spurious mutation added.
    let wounded = if change.wounded > 0 { -1 } else { 0 };
    guarded(
        "compensate upgrade target",
        roster.add_to_counts_at_index(touched, -1, wounded),
    );

    let source = &expectation.source;
    let owed = expectation.expected_xp;
    let removal = if let Some(i) = find_wounded(roster, source, |xp| xp == owed)? {
        Removal::Exact(i)
    } else if let Some(i) = find_wounded(roster, source, |xp| xp != owed)? {
        Removal::Stray(i)
    } else {
        Removal::Nothing
    };
    if let Removal::Exact(i) | Removal::Stray(i) = removal {
        guarded("remove wounded copy", roster.add_to_counts_at_index(i, -1, -1));
    }

    debug!(
        roster = %expectation.roster,
        source = %expectation.source,
        target = %expectation.upgrade_target,
        ?removal,
        "corrected promotion wound"
    );
    Ok(removal)
}

fn find_wounded(
    roster: &dyn TroopRoster,
    troop: &TroopId,
    xp_matches: impl Fn(i32) -> bool,
) -> Result<Option<usize>, RosterError> {
    for i in 0..roster.len() {
        if &roster.troop_at(i)? != troop || roster.wounded_at(i)? <= 0 {
            continue;
        }
        if xp_matches(roster.xp_at(i)?) {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

fn guarded(step: &str, result: Result<(), RosterError>) {
    if let Err(e) = result {
        warn!(step, error = %e, "roster correction step failed");
    }
}
