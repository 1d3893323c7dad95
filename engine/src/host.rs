//! Interfaces the surrounding game supplies.
//!
//! The duel core never owns the scene, the agents or the party roster. It talks to them
//! through these traits; `crate::sandbox` provides an in-memory implementation of all of
//! them for tests and the command-line harness.

use std::fmt;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::RosterError;
use crate::geometry::Frame;
use crate::troop::{AgentId, CombatantTemplate, Controller, Side, TroopId};

/* ---------------- scene ---------------- */

pub trait SceneQuery {
    fn find_marker(&self, tag: &str) -> Option<Frame>;
    fn find_markers(&self, tag: &str) -> Vec<Frame>;
    fn ground_height(&self, position: Vec3) -> f32;
}

/* ---------------- agents ---------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Placed but not yet simulated.
    Spawning,
    Active,
    Unconscious,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentStatus {
    pub state: AgentState,
    pub health: f32,
}

impl AgentStatus {
    pub fn is_down(&self) -> bool {
        self.state == AgentState::Killed || self.health <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchState {
    Patrolling,
    Cautious,
    Alarmed,
}

/// Everything the simulation needs for a single placement call.
#[derive(Debug, Clone)]
pub struct SpawnRequest<'a> {
    pub template: &'a CombatantTemplate,
    pub side: Side,
    pub controller: Controller,
    pub position: Vec3,
    pub direction: Vec2,
    pub mounted: bool,
    pub civilian_equipment: bool,
}

pub trait Simulation {
    fn spawn(&mut self, request: SpawnRequest<'_>) -> AgentId;

    fn main_agent(&self) -> Option<AgentId>;
    fn set_main_agent(&mut self, agent: AgentId);

    /// `None` once the agent has been removed from the simulation.
    fn status(&self, agent: AgentId) -> Option<AgentStatus>;
    fn position(&self, agent: AgentId) -> Option<Vec3>;

    fn is_active(&self, agent: AgentId) -> bool {
        self.status(agent)
            .is_some_and(|s| s.state == AgentState::Active)
    }

    fn fade_out(&mut self, agent: AgentId);
    fn teleport(&mut self, agent: AgentId, position: Vec3);

    fn set_controller(&mut self, agent: AgentId, controller: Controller);
    fn set_watch_state(&mut self, agent: AgentId, state: WatchState);
    fn set_morale(&mut self, agent: AgentId, morale: f32);
    fn set_look_direction(&mut self, agent: AgentId, direction: Vec3);
}

/* ---------------- UI and mission flow ---------------- */

pub trait Notifier {
    /// Short transient line in the message log.
    fn message(&mut self, text: &str);
    /// Larger centered banner.
    fn quick_information(&mut self, text: &str, duration_ms: u32);
}

pub trait MissionControl {
    fn switch_to_menu(&mut self, menu: &str);
    fn end_mission(&mut self);
}

/// Everything a running duel touches.
pub trait ArenaHost: SceneQuery + Simulation + Notifier + MissionControl {}

impl<T> ArenaHost for T where T: SceneQuery + Simulation + Notifier + MissionControl + ?Sized {}

/* ---------------- roster ---------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RosterId(pub u32);

impl fmt::Display for RosterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "roster#{}", self.0)
    }
}

/// Arguments of a raw count mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountsMutation {
    pub troop: TroopId,
    pub count: i32,
    pub wounded: i32,
    pub xp: i32,
    pub remove_depleted: bool,
    /// Element to apply to; `None` lets the roster find (or append) the troop's element.
    pub index: Option<usize>,
}

impl CountsMutation {
    pub fn new(troop: TroopId, count: i32) -> Self {
        Self {
            troop,
            count,
            wounded: 0,
            xp: 0,
            remove_depleted: true,
            index: None,
        }
    }

    pub fn wounded(mut self, wounded: i32) -> Self {
        self.wounded = wounded;
        self
    }

    pub fn xp(mut self, xp: i32) -> Self {
        self.xp = xp;
        self
    }

    pub fn keep_depleted(mut self) -> Self {
        self.remove_depleted = false;
        self
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

/// Emitted by a roster synchronously after each raw count mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountsChange {
    pub troop: TroopId,
    pub count: i32,
    pub wounded: i32,
    pub xp: i32,
    /// Index of the element the mutation touched, or why it failed.
    pub outcome: Result<usize, RosterError>,
}

pub trait TroopRoster {
    fn id(&self) -> RosterId;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn troop_at(&self, index: usize) -> Result<TroopId, RosterError>;
    /// Total units of the element, wounded included.
    fn number_at(&self, index: usize) -> Result<i32, RosterError>;
    fn wounded_at(&self, index: usize) -> Result<i32, RosterError>;
    fn xp_at(&self, index: usize) -> Result<i32, RosterError>;

    fn index_of(&self, troop: &TroopId) -> Option<usize> {
        (0..self.len()).find(|&i| self.troop_at(i).is_ok_and(|t| &t == troop))
    }

    fn add_to_counts(&mut self, mutation: CountsMutation) -> Result<usize, RosterError>;
    fn add_to_counts_at_index(
        &mut self,
        index: usize,
        count: i32,
        wounded: i32,
    ) -> Result<(), RosterError>;
    fn add_xp_to_troop(&mut self, troop: &TroopId, xp: i32) -> Result<(), RosterError>;
}

/// Subscriber to a roster's mutation events.
pub trait RosterObserver: Send + Sync {
    fn on_counts_changed(&self, roster: &mut dyn TroopRoster, change: &CountsChange);
}

pub trait UpgradeCostModel {
    fn xp_cost(&self, roster: RosterId, troop: &TroopId, target: &TroopId) -> i32;
}
