//! Lifecycle of a single training duel.
//!
//! ```text
//! AwaitingPlayerSpawn ─▶ Active ─▶ VictoryPending
//!                          │             │
//!                          └─▶ PlayerDown ◀┘ ─▶ Ended
//! ```
//!
//! Transitions only move forward. The host drives `tick` once per frame and reports agent
//! removals through `on_combatant_removed`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DuelError;
use crate::factory::CombatantFactory;
use crate::host::{ArenaHost, MissionControl, Notifier, Simulation};
use crate::settings::{Attribution, DuelSettings};
use crate::spawn::{MarkerSet, SpawnPlan, SpawnResolver};
use crate::troop::{AgentId, CombatantHandle, CombatantTemplate, Controller, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelState {
    AwaitingPlayerSpawn,
    Active,
    VictoryPending,
    PlayerDown,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelOutcome {
    Undecided,
    Victory,
    Defeat,
}

/// Who is fighting, as handed over by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct DuelLineup {
    pub player: CombatantTemplate,
    pub troops: Vec<CombatantTemplate>,
    pub companions: Vec<CombatantTemplate>,
}

impl DuelLineup {
    pub fn new(player: CombatantTemplate, troops: Vec<CombatantTemplate>) -> Self {
        Self {
            player,
            troops,
            companions: Vec::new(),
        }
    }

    pub fn with_companions(mut self, companions: Vec<CombatantTemplate>) -> Self {
        self.companions = companions;
        self
    }
}

#[derive(Debug)]
pub struct DuelStateMachine {
    settings: DuelSettings,
    lineup: DuelLineup,
    state: DuelState,
    started: bool,
    plan: Option<SpawnPlan>,
    player: Option<CombatantHandle>,
    combatants: Vec<CombatantHandle>,
    defeated: Vec<CombatantTemplate>,
    death_timer: Option<f32>,
    victory_shown: bool,
}

impl DuelStateMachine {
    pub fn new(lineup: DuelLineup, settings: DuelSettings) -> Self {
        Self {
            settings,
            lineup,
            state: DuelState::AwaitingPlayerSpawn,
            started: false,
            plan: None,
            player: None,
            combatants: Vec::new(),
            defeated: Vec::new(),
            death_timer: None,
            victory_shown: false,
        }
    }

    pub fn state(&self) -> DuelState {
        self.state
    }

    pub fn outcome(&self) -> DuelOutcome {
        if self.victory_shown {
            DuelOutcome::Victory
        } else if self.state >= DuelState::PlayerDown {
            DuelOutcome::Defeat
        } else {
            DuelOutcome::Undecided
        }
    }

    /// Templates of enemies the player (or the player's team) took down, in report order.
    pub fn defeated_troops(&self) -> &[CombatantTemplate] {
        &self.defeated
    }

    pub fn plan(&self) -> Option<&SpawnPlan> {
        self.plan.as_ref()
    }

    pub fn player(&self) -> Option<&CombatantHandle> {
        self.player.as_ref()
    }

    /// AI combatants, allies first, then enemies in troop order.
    pub fn combatants(&self) -> &[CombatantHandle] {
        &self.combatants
    }

    pub fn death_timer(&self) -> Option<f32> {
        self.death_timer
    }

    /// Resolve spawn points and place everyone. Only the first call does anything.
    ///
    /// Without a main agent nothing is placed and the duel never leaves
    /// `AwaitingPlayerSpawn`.
    pub fn start<H: ArenaHost + ?Sized>(&mut self, host: &mut H) -> Result<(), DuelError> {
        if self.started {
            return Ok(());
        }
        self.started = true;

        let markers = MarkerSet::from_scene(&*host, &self.settings.markers);
        let fallback_origin = host.main_agent().and_then(|a| host.position(a));
        let resolver = SpawnResolver::new(self.settings.fallback_layout, self.settings.fallback_radius);
        let plan = resolver.resolve(&markers, fallback_origin, self.lineup.troops.len(), |p| {
            host.ground_height(p)
        });
        debug!(
            player_source = ?plan.player_source(),
            enemy_source = ?plan.enemy_source(),
            slots = plan.enemies().len(),
            "resolved spawn plan"
        );

        if host.main_agent().is_none() {
            debug!("no main agent; duel will not start");
            self.plan = Some(plan);
            return Err(DuelError::NoMainAgent);
        }

        let factory = CombatantFactory::for_duel(&self.lineup.player, &self.lineup.troops);
        let player = factory.place_player(host, &self.lineup.player, plan.player())?;
        let player_pos = plan.player().position;

        let ally_slots = resolver.ally_slots(
            plan.player(),
            self.lineup.companions.len(),
            self.settings.ally_radius,
            |p| host.ground_height(p),
        );
        for (template, slot) in self.lineup.companions.iter().zip(&ally_slots) {
            let handle = factory.place(host, template, slot, Side::Ally, Controller::Ai);
            self.combatants.push(handle);
        }

        for (i, template) in self.lineup.troops.iter().enumerate() {
            let slot = plan.enemy_slot(i).facing(player_pos);
            let handle = factory.place(host, template, &slot, Side::Enemy, Controller::Ai);
            self.combatants.push(handle);
        }

        self.player = Some(player);
        self.plan = Some(plan);
        Ok(())
    }

    /// Advance one simulation frame.
    pub fn tick<H>(&mut self, dt: f32, host: &mut H) -> DuelState
    where
        H: Simulation + Notifier + MissionControl + ?Sized,
    {
        match self.state {
            DuelState::Ended => {}
            DuelState::AwaitingPlayerSpawn => {
                if self.player.as_ref().is_some_and(|p| host.is_active(p.agent)) {
                    self.transition(DuelState::Active);
                }
            }
            DuelState::PlayerDown => self.advance_death_timer(dt, host),
            DuelState::Active | DuelState::VictoryPending => {
                if self.player_is_down(&*host) {
                    self.death_timer = Some(0.0);
                    self.transition(DuelState::PlayerDown);
                    self.advance_death_timer(dt, host);
                } else if self.state == DuelState::Active && !self.enemies_remaining(&*host) {
                    host.quick_information(
                        &self.settings.victory_text,
                        self.settings.victory_banner_ms,
                    );
                    self.victory_shown = true;
                    self.transition(DuelState::VictoryPending);
                }
            }
        }
        self.state
    }

    /// The host removed `affected`; `affector` dealt the final blow, if anyone did.
    pub fn on_combatant_removed(&mut self, affected: AgentId, affector: Option<AgentId>) {
        if self.state == DuelState::Ended {
            return;
        }
        let Some(victim) = self.combatants.iter().find(|h| h.agent == affected) else {
            return;
        };
        if victim.side != Side::Enemy {
            return;
        }
        if !affector.is_some_and(|a| self.attributed_to_player(a)) {
            return;
        }
        debug!(troop = %victim.template.id, agent = %affected, "enemy defeated");
        self.defeated.push(victim.template.clone());
    }

    fn attributed_to_player(&self, affector: AgentId) -> bool {
        let is_player = self.player.as_ref().is_some_and(|p| p.agent == affector);
        match self.settings.attribution {
            Attribution::PlayerOnly => is_player,
            Attribution::PlayerTeam => {
                is_player
                    || self
                        .combatants
                        .iter()
                        .any(|h| h.agent == affector && h.side.is_player_team())
            }
        }
    }

    fn player_is_down<S: Simulation + ?Sized>(&self, sim: &S) -> bool {
        let Some(player) = &self.player else {
            return true;
        };
        match sim.status(player.agent) {
            Some(status) => status.is_down(),
            None => true,
        }
    }

    fn enemies_remaining<S: Simulation + ?Sized>(&self, sim: &S) -> bool {
        self.combatants
            .iter()
            .any(|h| h.side == Side::Enemy && sim.is_active(h.agent))
    }

    fn advance_death_timer<H: MissionControl + ?Sized>(&mut self, dt: f32, host: &mut H) {
        let elapsed = self.death_timer.unwrap_or(0.0) + dt;
        self.death_timer = Some(elapsed);
        if elapsed >= self.settings.death_delay_secs {
            self.transition(DuelState::Ended);
            host.switch_to_menu(&self.settings.return_menu);
            host.end_mission();
        }
    }

    fn transition(&mut self, next: DuelState) {
        debug!(from = ?self.state, to = ?next, "duel state");
        self.state = next;
    }
}
