//! Campaign-side flow around a duel: validate the pick, open a session, build the duel,
//! and hand defeated troops to the promotion reconciler once the mission is over.

use tracing::info;

use crate::duel::{DuelLineup, DuelStateMachine};
use crate::error::SelectionError;
use crate::host::{Notifier, TroopRoster, UpgradeCostModel};
use crate::promotion::PromotionReconciler;
use crate::settings::DuelSettings;
use crate::troop::{CombatantTemplate, TroopId};

/// One line the player moved over on the selection screen.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterPick {
    pub template: CombatantTemplate,
    pub number: u32,
    pub wounded: u32,
}

impl RosterPick {
    pub fn healthy(template: CombatantTemplate, number: u32) -> Self {
        Self {
            template,
            number,
            wounded: 0,
        }
    }
}

/// A validated pick, expanded to one entry per unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TroopSelection {
    pub troops: Vec<CombatantTemplate>,
    pub companions: Vec<CombatantTemplate>,
}

impl TroopSelection {
    pub fn len(&self) -> usize {
        self.troops.len() + self.companions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn validate_selection(
    picks: &[RosterPick],
    max: usize,
) -> Result<TroopSelection, SelectionError> {
    let picks: Vec<&RosterPick> = picks.iter().filter(|p| p.number > 0).collect();
    let count: usize = picks.iter().map(|p| p.number as usize).sum();
    if count < 1 {
        return Err(SelectionError::Empty);
    }
    if count > max {
        return Err(SelectionError::TooMany { max });
    }
    if picks.iter().any(|p| p.wounded > 0) {
        return Err(SelectionError::Wounded);
    }

    let mut selection = TroopSelection::default();
    for pick in picks {
        for _ in 0..pick.number {
            if pick.template.is_companion() {
                selection.companions.push(pick.template.clone());
            } else {
                selection.troops.push(pick.template.clone());
            }
        }
    }
    Ok(selection)
}

/// Present while a training duel owns the arena mission.
///
/// Hooks that would otherwise run the arena's built-in practice fight take a reference to
/// the session (or `None`) instead of reading a global flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuelSession {
    id: u64,
}

impl DuelSession {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Default)]
pub struct DuelOrchestrator {
    settings: DuelSettings,
    selection: Option<TroopSelection>,
    session: Option<DuelSession>,
    sessions_opened: u64,
}

impl DuelOrchestrator {
    pub fn new(settings: DuelSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &DuelSettings {
        &self.settings
    }

    pub fn session(&self) -> Option<&DuelSession> {
        self.session.as_ref()
    }

    pub fn selection(&self) -> Option<&TroopSelection> {
        self.selection.as_ref()
    }

    /// Called when the selection screen's Done button is pressed. Refusals are shown to the
    /// player and keep the screen open (`false`).
    pub fn select<N: Notifier + ?Sized>(&mut self, picks: &[RosterPick], notifier: &mut N) -> bool {
        match validate_selection(picks, self.settings.max_training_troops) {
            Ok(selection) => {
                self.selection = Some(selection);
                true
            }
            Err(e) => {
                notifier.message(&e.to_string());
                false
            }
        }
    }

    /// Open a session and build the duel for the pending selection, if there is one.
    pub fn begin(&mut self, player: CombatantTemplate) -> Option<DuelStateMachine> {
        let selection = self.selection.take()?;
        self.sessions_opened += 1;
        self.session = Some(DuelSession {
            id: self.sessions_opened,
        });
        info!(
            session = self.sessions_opened,
            troops = selection.troops.len(),
            companions = selection.companions.len(),
            "training duel starting"
        );
        let lineup = DuelLineup::new(player, selection.troops).with_companions(selection.companions);
        Some(DuelStateMachine::new(lineup, self.settings.clone()))
    }

    /// Close the session and grant promotion XP for every defeated troop.
    ///
    /// Returns the troops whose grant succeeded, in defeat order.
    pub fn conclude<N: Notifier + ?Sized>(
        &mut self,
        duel: &DuelStateMachine,
        roster: &mut dyn TroopRoster,
        reconciler: &PromotionReconciler,
        model: &dyn UpgradeCostModel,
        notifier: &mut N,
    ) -> Vec<TroopId> {
        self.session = None;
        let mut promoted = Vec::new();
        for troop in duel.defeated_troops() {
            if reconciler.grant_upgrade_xp(roster, troop, model) {
                notifier.message(&format!("{} is ready for promotion!", troop.name));
                promoted.push(troop.id.clone());
            }
        }
        info!(
            outcome = ?duel.outcome(),
            defeated = duel.defeated_troops().len(),
            promoted = promoted.len(),
            "training duel concluded"
        );
        promoted
    }
}
