//! In-memory stand-ins for the game: an arena scene with agents, a party roster that
//! reproduces the spurious-wound behaviour of the real one, a tier-based upgrade cost model,
//! and a seeded skirmish that decides who hits whom.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use glam::{Vec2, Vec3};
use indexmap::IndexMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::RosterError;
use crate::geometry::{DEFAULT_FORWARD, Frame};
use crate::host::{
    AgentState, AgentStatus, CountsChange, CountsMutation, MissionControl, Notifier, RosterId,
    RosterObserver, SceneQuery, Simulation, SpawnRequest, TroopRoster, UpgradeCostModel,
    WatchState,
};
use crate::troop::{AgentId, CombatantTemplate, Controller, Side, TroopId};

pub const FULL_HEALTH: f32 = 100.0;

/* ---------------- arena ---------------- */

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ground {
    Flat(f32),
    /// Height rises by `gradient` per unit of horizontal travel.
    Slope { base: f32, gradient: Vec2 },
}

impl Default for Ground {
    fn default() -> Self {
        Ground::Flat(0.0)
    }
}

impl Ground {
    pub fn height_at(&self, p: Vec3) -> f32 {
        match *self {
            Ground::Flat(h) => h,
            Ground::Slope { base, gradient } => base + gradient.x * p.x + gradient.y * p.y,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxAgent {
    pub troop: TroopId,
    pub name: String,
    pub side: Side,
    pub controller: Controller,
    pub position: Vec3,
    pub look: Vec3,
    pub health: f32,
    pub state: AgentState,
    pub mounted: bool,
    pub morale: f32,
    pub watch: WatchState,
}

#[derive(Debug, Default)]
pub struct SandboxArena {
    markers: IndexMap<String, Vec<Frame>>,
    ground: Ground,
    agents: IndexMap<AgentId, SandboxAgent>,
    main_agent: Option<AgentId>,
    next_agent: u32,
    pub messages: Vec<String>,
    pub banners: Vec<(String, u32)>,
    pub menu: Option<String>,
    pub mission_ended: bool,
}

impl SandboxArena {
    pub fn new(ground: Ground) -> Self {
        Self {
            ground,
            ..Self::default()
        }
    }

    pub fn with_marker(mut self, tag: &str, frame: Frame) -> Self {
        self.add_marker(tag, frame);
        self
    }

    pub fn add_marker(&mut self, tag: &str, frame: Frame) {
        self.markers.entry(tag.to_string()).or_default().push(frame);
    }

    /// The agent the arena mission puts the player in before any duel logic runs.
    pub fn with_main_agent(mut self, position: Vec3) -> Self {
        let visitor = CombatantTemplate::new("arena_visitor", "Visitor").main_hero();
        let id = self.insert(&visitor, Side::Player, Controller::Human, position, AgentState::Active);
        self.main_agent = Some(id);
        self
    }

    fn insert(
        &mut self,
        template: &CombatantTemplate,
        side: Side,
        controller: Controller,
        position: Vec3,
        state: AgentState,
    ) -> AgentId {
        self.next_agent += 1;
        let id = AgentId(self.next_agent);
        self.agents.insert(
            id,
            SandboxAgent {
                troop: template.id.clone(),
                name: template.name.clone(),
                side,
                controller,
                position,
                look: DEFAULT_FORWARD,
                health: FULL_HEALTH,
                state,
                mounted: false,
                morale: 50.0,
                watch: WatchState::Patrolling,
            },
        );
        id
    }

    /// One simulation step: freshly spawned agents become active.
    pub fn advance(&mut self) {
        for agent in self.agents.values_mut() {
            if agent.state == AgentState::Spawning {
                agent.state = AgentState::Active;
            }
        }
    }

    pub fn agent(&self, id: AgentId) -> Option<&SandboxAgent> {
        self.agents.get(&id)
    }

    pub fn agents(&self) -> impl Iterator<Item = (AgentId, &SandboxAgent)> {
        self.agents.iter().map(|(id, a)| (*id, a))
    }

    pub fn active_on(&self, side: Side) -> Vec<AgentId> {
        self.agents
            .iter()
            .filter(|(_, a)| a.side == side && a.state == AgentState::Active)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn kill(&mut self, id: AgentId) {
        if let Some(agent) = self.agents.get_mut(&id) {
            agent.health = 0.0;
            agent.state = AgentState::Killed;
        }
    }

    /// Returns true if the blow was fatal.
    pub fn damage(&mut self, id: AgentId, amount: f32) -> bool {
        let Some(agent) = self.agents.get_mut(&id) else {
            return false;
        };
        agent.health = (agent.health - amount).max(0.0);
        if agent.health <= 0.0 {
            agent.state = AgentState::Killed;
            return true;
        }
        false
    }

    pub fn revive(&mut self, id: AgentId) {
        if let Some(agent) = self.agents.get_mut(&id) {
            agent.health = FULL_HEALTH;
            agent.state = AgentState::Active;
        }
    }
}

impl SceneQuery for SandboxArena {
    fn find_marker(&self, tag: &str) -> Option<Frame> {
        self.markers.get(tag).and_then(|m| m.first().copied())
    }

    fn find_markers(&self, tag: &str) -> Vec<Frame> {
        self.markers.get(tag).cloned().unwrap_or_default()
    }

    fn ground_height(&self, position: Vec3) -> f32 {
        self.ground.height_at(position)
    }
}

impl Simulation for SandboxArena {
    fn spawn(&mut self, request: SpawnRequest<'_>) -> AgentId {
        let id = self.insert(
            request.template,
            request.side,
            request.controller,
            request.position,
            AgentState::Spawning,
        );
        if let Some(agent) = self.agents.get_mut(&id) {
            agent.mounted = request.mounted;
            agent.look = request.direction.extend(0.0).try_normalize().unwrap_or(DEFAULT_FORWARD);
        }
        id
    }

    fn main_agent(&self) -> Option<AgentId> {
        self.main_agent
    }

    fn set_main_agent(&mut self, agent: AgentId) {
        self.main_agent = Some(agent);
    }

    fn status(&self, agent: AgentId) -> Option<AgentStatus> {
        self.agents.get(&agent).map(|a| AgentStatus {
            state: a.state,
            health: a.health,
        })
    }

    fn position(&self, agent: AgentId) -> Option<Vec3> {
        self.agents.get(&agent).map(|a| a.position)
    }

    fn fade_out(&mut self, agent: AgentId) {
        self.agents.shift_remove(&agent);
        if self.main_agent == Some(agent) {
            self.main_agent = None;
        }
    }

    fn teleport(&mut self, agent: AgentId, position: Vec3) {
        if let Some(a) = self.agents.get_mut(&agent) {
            a.position = position;
        }
    }

    fn set_controller(&mut self, agent: AgentId, controller: Controller) {
        if let Some(a) = self.agents.get_mut(&agent) {
            a.controller = controller;
        }
    }

    fn set_watch_state(&mut self, agent: AgentId, state: WatchState) {
        if let Some(a) = self.agents.get_mut(&agent) {
            a.watch = state;
        }
    }

    fn set_morale(&mut self, agent: AgentId, morale: f32) {
        if let Some(a) = self.agents.get_mut(&agent) {
            a.morale = morale;
        }
    }

    fn set_look_direction(&mut self, agent: AgentId, direction: Vec3) {
        if let Some(a) = self.agents.get_mut(&agent) {
            a.look = direction;
        }
    }
}

impl Notifier for SandboxArena {
    fn message(&mut self, text: &str) {
        self.messages.push(text.to_string());
    }

    fn quick_information(&mut self, text: &str, duration_ms: u32) {
        self.banners.push((text.to_string(), duration_ms));
    }
}

impl MissionControl for SandboxArena {
    fn switch_to_menu(&mut self, menu: &str) {
        self.menu = Some(menu.to_string());
    }

    fn end_mission(&mut self) {
        self.mission_ended = true;
    }
}

/* ---------------- roster ---------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterElement {
    pub troop: TroopId,
    pub number: i32,
    #[serde(default)]
    pub wounded: i32,
    #[serde(default)]
    pub xp: i32,
}

/// How faithfully the roster reproduces the real one's upgrade artefacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WoundQuirk {
    Off,
    /// Artefacts appear during the mutation that grants XP.
    #[default]
    Immediate,
    /// Artefacts appear on the next `settle()`.
    Deferred,
}

#[derive(Debug, Clone)]
struct Artefact {
    source: TroopId,
    target: TroopId,
    xp: i32,
}

pub struct SandboxRoster {
    id: RosterId,
    elements: Vec<RosterElement>,
    upgrades: HashMap<TroopId, TroopId>,
    quirk: WoundQuirk,
    deferred: Vec<Artefact>,
    observers: Vec<Arc<dyn RosterObserver>>,
}

impl fmt::Debug for SandboxRoster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxRoster")
            .field("id", &self.id)
            .field("elements", &self.elements)
            .field("quirk", &self.quirk)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl SandboxRoster {
    pub fn new(id: RosterId, elements: Vec<RosterElement>) -> Self {
        Self {
            id,
            elements,
            upgrades: HashMap::new(),
            quirk: WoundQuirk::default(),
            deferred: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Learn upgrade paths; only troops with one produce artefacts.
    pub fn with_upgrades<'a>(mut self, templates: impl IntoIterator<Item = &'a CombatantTemplate>) -> Self {
        for t in templates {
            if let Some(target) = t.first_upgrade_target() {
                self.upgrades.insert(t.id.clone(), target.clone());
            }
        }
        self
    }

    pub fn with_quirk(mut self, quirk: WoundQuirk) -> Self {
        self.quirk = quirk;
        self
    }

    pub fn subscribe(&mut self, observer: Arc<dyn RosterObserver>) {
        self.observers.push(observer);
    }

    pub fn elements(&self) -> &[RosterElement] {
        &self.elements
    }

    pub fn headcount(&self, troop: &TroopId) -> i32 {
        self.elements
            .iter()
            .filter(|e| &e.troop == troop)
            .map(|e| e.number)
            .sum()
    }

    pub fn wounded_count(&self, troop: &TroopId) -> i32 {
        self.elements
            .iter()
            .filter(|e| &e.troop == troop)
            .map(|e| e.wounded)
            .sum()
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Let deferred artefacts land.
    pub fn settle(&mut self) {
        let pending = std::mem::take(&mut self.deferred);
        for artefact in pending {
            self.inject(artefact);
        }
    }

    fn inject(&mut self, artefact: Artefact) {
        // A loose wounded copy of the source, carrying the granted XP.
        self.elements.push(RosterElement {
            troop: artefact.source,
            number: 1,
            wounded: 1,
            xp: artefact.xp,
        });
        // The wounded upgrade target goes through the ordinary, reported path.
        let mutation = CountsMutation::new(artefact.target, 1)
            .wounded(1)
            .xp(artefact.xp);
        let _ = self.mutate(mutation, false);
    }

    fn mutate(&mut self, m: CountsMutation, with_quirk: bool) -> Result<usize, RosterError> {
        let outcome = self.apply(&m);
        self.emit(CountsChange {
            troop: m.troop.clone(),
            count: m.count,
            wounded: m.wounded,
            xp: m.xp,
            outcome: outcome.clone(),
        });

        if with_quirk && outcome.is_ok() && m.count > 0 && m.xp > 0 {
            if let Some(target) = self.upgrades.get(&m.troop).cloned() {
                let artefact = Artefact {
                    source: m.troop.clone(),
                    target,
                    xp: m.xp,
                };
                match self.quirk {
                    WoundQuirk::Off => {}
                    WoundQuirk::Immediate => self.inject(artefact),
                    WoundQuirk::Deferred => self.deferred.push(artefact),
                }
            }
        }
        outcome
    }

    fn apply(&mut self, m: &CountsMutation) -> Result<usize, RosterError> {
        let existing = match m.index {
            Some(i) if self.elements.get(i).is_some_and(|e| e.troop == m.troop) => Some(i),
            _ => self.elements.iter().position(|e| e.troop == m.troop),
        };

        let index = match existing {
            Some(i) => i,
            None if m.count > 0 => {
                let at = m.index.unwrap_or(self.elements.len()).min(self.elements.len());
                self.elements.insert(
                    at,
                    RosterElement {
                        troop: m.troop.clone(),
                        number: 0,
                        wounded: 0,
                        xp: 0,
                    },
                );
                at
            }
            None => return Err(RosterError::UnknownTroop(m.troop.clone())),
        };

        self.change_counts(index, m.count, m.wounded, m.remove_depleted)?;
        if let Some(e) = self.elements.get_mut(index) {
            e.xp = (e.xp + m.xp).max(0);
        }
        Ok(index)
    }

    fn change_counts(
        &mut self,
        index: usize,
        count: i32,
        wounded: i32,
        remove_depleted: bool,
    ) -> Result<(), RosterError> {
        let len = self.elements.len();
        let e = self
            .elements
            .get_mut(index)
            .ok_or(RosterError::IndexOutOfRange { index, len })?;
        let number = e.number + count;
        let hurt = e.wounded + wounded;
        if number < 0 || hurt < 0 || hurt > number {
            let err = RosterError::InvalidCounts {
                troop: e.troop.clone(),
                number,
                wounded: hurt,
            };
            if e.number == 0 {
                // drop the placeholder a failed insert left behind
                self.elements.remove(index);
            }
            return Err(err);
        }
        e.number = number;
        e.wounded = hurt;
        if number == 0 && remove_depleted {
            self.elements.remove(index);
        }
        Ok(())
    }

    fn emit(&mut self, change: CountsChange) {
        let observers = self.observers.clone();
        for observer in observers {
            observer.on_counts_changed(self, &change);
        }
    }

    fn element(&self, index: usize) -> Result<&RosterElement, RosterError> {
        self.elements.get(index).ok_or(RosterError::IndexOutOfRange {
            index,
            len: self.elements.len(),
        })
    }
}

impl TroopRoster for SandboxRoster {
    fn id(&self) -> RosterId {
        self.id
    }

    fn len(&self) -> usize {
        self.elements.len()
    }

    fn troop_at(&self, index: usize) -> Result<TroopId, RosterError> {
        self.element(index).map(|e| e.troop.clone())
    }

    fn number_at(&self, index: usize) -> Result<i32, RosterError> {
        self.element(index).map(|e| e.number)
    }

    fn wounded_at(&self, index: usize) -> Result<i32, RosterError> {
        self.element(index).map(|e| e.wounded)
    }

    fn xp_at(&self, index: usize) -> Result<i32, RosterError> {
        self.element(index).map(|e| e.xp)
    }

    fn add_to_counts(&mut self, mutation: CountsMutation) -> Result<usize, RosterError> {
        self.mutate(mutation, true)
    }

    fn add_to_counts_at_index(
        &mut self,
        index: usize,
        count: i32,
        wounded: i32,
    ) -> Result<(), RosterError> {
        let troop = self.element(index)?.troop.clone();
        let outcome = self.change_counts(index, count, wounded, true);
        self.emit(CountsChange {
            troop,
            count,
            wounded,
            xp: 0,
            outcome: outcome.clone().map(|_| index),
        });
        outcome
    }

    fn add_xp_to_troop(&mut self, troop: &TroopId, xp: i32) -> Result<(), RosterError> {
        let e = self
            .elements
            .iter_mut()
            .find(|e| &e.troop == troop)
            .ok_or_else(|| RosterError::UnknownTroop(troop.clone()))?;
        e.xp = (e.xp + xp).max(0);
        Ok(())
    }
}

/* ---------------- upgrade costs ---------------- */

/// XP needed to upgrade out of each tier; the last tier has nowhere to go.
pub const UPGRADE_XP_BY_TIER: [i32; 7] = [80, 200, 400, 700, 1100, 1600, 0];

#[derive(Debug, Clone, Default)]
pub struct TierCostModel {
    tiers: HashMap<TroopId, u8>,
}

impl TierCostModel {
    pub fn from_templates<'a>(templates: impl IntoIterator<Item = &'a CombatantTemplate>) -> Self {
        Self {
            tiers: templates
                .into_iter()
                .map(|t| (t.id.clone(), t.tier))
                .collect(),
        }
    }
}

impl UpgradeCostModel for TierCostModel {
    fn xp_cost(&self, _roster: RosterId, troop: &TroopId, _target: &TroopId) -> i32 {
        let tier = self.tiers.get(troop).copied().unwrap_or(0) as usize;
        UPGRADE_XP_BY_TIER.get(tier).copied().unwrap_or(0)
    }
}

/* ---------------- skirmish ---------------- */

/// An agent left the fight; `affector` landed the final blow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalReport {
    pub affected: AgentId,
    pub affector: Option<AgentId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkirmishOdds {
    /// Chance per exchange that the player fells an enemy.
    pub player_hit: f64,
    /// Chance per exchange that each companion fells an enemy.
    pub ally_hit: f64,
    /// Chance per exchange that each standing enemy lands a blow on the player.
    pub enemy_hit: f64,
    pub enemy_damage_min: f32,
    pub enemy_damage_max: f32,
}

impl Default for SkirmishOdds {
    fn default() -> Self {
        Self {
            player_hit: 0.45,
            ally_hit: 0.3,
            enemy_hit: 0.2,
            enemy_damage_min: 8.0,
            enemy_damage_max: 24.0,
        }
    }
}

/// Seeded stand-in for the game's combat AI.
#[derive(Debug, Clone)]
pub struct Skirmish {
    rng: ChaCha8Rng,
    odds: SkirmishOdds,
}

impl Skirmish {
    pub fn from_seed(seed: u64, odds: SkirmishOdds) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            odds,
        }
    }

    /// One round of blows. Returns the removals the simulation would report.
    pub fn exchange(&mut self, arena: &mut SandboxArena) -> Vec<RemovalReport> {
        let mut reports = Vec::new();
        let Some(player) = arena.main_agent().filter(|p| arena.is_active(*p)) else {
            return reports;
        };

        let mut strikers = vec![(player, self.odds.player_hit)];
        strikers.extend(arena.active_on(Side::Ally).into_iter().map(|a| (a, self.odds.ally_hit)));
        for (striker, chance) in strikers {
            let enemies = arena.active_on(Side::Enemy);
            if enemies.is_empty() {
                break;
            }
            if self.rng.gen_bool(chance) {
                let victim = enemies[self.rng.gen_range(0..enemies.len())];
                arena.kill(victim);
                reports.push(RemovalReport {
                    affected: victim,
                    affector: Some(striker),
                });
            }
        }

        for enemy in arena.active_on(Side::Enemy) {
            if !arena.is_active(player) {
                break;
            }
            if self.rng.gen_bool(self.odds.enemy_hit) {
                let dmg = self
                    .rng
                    .gen_range(self.odds.enemy_damage_min..=self.odds.enemy_damage_max);
                if arena.damage(player, dmg) {
                    reports.push(RemovalReport {
                        affected: player,
                        affector: Some(enemy),
                    });
                }
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recruit() -> CombatantTemplate {
        CombatantTemplate::new("recruit", "Recruit")
            .with_tier(1)
            .with_upgrade("footman")
    }

    fn roster(quirk: WoundQuirk) -> SandboxRoster {
        let start = vec![RosterElement {
            troop: TroopId::from("recruit"),
            number: 3,
            wounded: 0,
            xp: 0,
        }];
        SandboxRoster::new(RosterId(1), start)
            .with_upgrades([&recruit()])
            .with_quirk(quirk)
    }

    #[test]
    fn xp_grant_leaves_both_artefacts() {
        let mut r = roster(WoundQuirk::Immediate);
        r.add_to_counts(CountsMutation::new(TroopId::from("recruit"), 1).xp(200))
            .unwrap();

        let footman = TroopId::from("footman");
        let recruit = TroopId::from("recruit");
        assert_eq!(r.headcount(&recruit), 5);
        assert_eq!(r.wounded_count(&recruit), 1);
        assert_eq!(r.headcount(&footman), 1);
        assert_eq!(r.wounded_count(&footman), 1);
        assert!(r.elements().iter().any(|e| e.troop == recruit && e.wounded == 1 && e.xp == 200));
    }

    #[test]
    fn new_troops_land_where_the_mutation_asks() {
        let mut r = roster(WoundQuirk::Off);
        let front = r.add_to_counts(CountsMutation::new(TroopId::from("looter"), 2).at(0)).unwrap();
        let back = r.add_to_counts(CountsMutation::new(TroopId::from("militia"), 1)).unwrap();

        assert_eq!((front, back), (0, 2));
        let order: Vec<_> = r.elements().iter().map(|e| e.troop.as_str()).collect();
        assert_eq!(order, ["looter", "recruit", "militia"]);
    }

    #[test]
    fn deferred_artefacts_wait_for_settle() {
        let mut r = roster(WoundQuirk::Deferred);
        r.add_to_counts(CountsMutation::new(TroopId::from("recruit"), 1).xp(200))
            .unwrap();
        assert_eq!(r.len(), 1);
        r.settle();
        assert_eq!(r.len(), 3);
        assert!(!r.has_deferred());
    }

    #[test]
    fn invalid_counts_are_rejected_untouched() {
        let mut r = roster(WoundQuirk::Off);
        let err = r.add_to_counts_at_index(0, 0, 4).unwrap_err();
        assert!(matches!(err, RosterError::InvalidCounts { .. }));
        assert_eq!(r.number_at(0), Ok(3));
        assert!(matches!(
            r.add_to_counts(CountsMutation::new(TroopId::from("ghost"), -1)),
            Err(RosterError::UnknownTroop(_))
        ));
        assert_eq!(r.xp_at(4), Err(RosterError::IndexOutOfRange { index: 4, len: 1 }));
    }

    #[test]
    fn skirmish_is_deterministic_per_seed() {
        let run = |seed| {
            let mut arena = SandboxArena::new(Ground::Flat(0.0)).with_main_agent(Vec3::ZERO);
            for i in 0..3 {
                let t = recruit();
                let id = arena.spawn(SpawnRequest {
                    template: &t,
                    side: Side::Enemy,
                    controller: Controller::Ai,
                    position: Vec3::new(i as f32, 5.0, 0.0),
                    direction: Vec2::Y,
                    mounted: false,
                    civilian_equipment: false,
                });
                assert_eq!(arena.agent(id).map(|a| a.state), Some(AgentState::Spawning));
            }
            arena.advance();
            let mut skirmish = Skirmish::from_seed(seed, SkirmishOdds::default());
            (0..30)
                .flat_map(|_| skirmish.exchange(&mut arena))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(5), run(5));
    }

    #[test]
    fn slope_ground_height() {
        let g = Ground::Slope {
            base: 2.0,
            gradient: Vec2::new(0.5, -1.0),
        };
        assert_eq!(g.height_at(Vec3::new(2.0, 1.0, 99.0)), 2.0);
    }
}
