use std::fmt;

use serde::{Deserialize, Serialize};

/// String identity of a unit template, e.g. `imperial_recruit`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TroopId(pub String);

impl TroopId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TroopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TroopId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub civilian: bool,
}

/// Immutable description of something that can be placed into the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatantTemplate {
    pub id: TroopId,
    pub name: String,
    #[serde(default)]
    pub tier: u8,
    #[serde(default)]
    pub is_hero: bool,
    #[serde(default)]
    pub is_main_hero: bool,
    #[serde(default)]
    pub loadout: Loadout,
    #[serde(default)]
    pub can_mount: bool,
    #[serde(default)]
    pub upgrade_targets: Vec<TroopId>,
}

impl CombatantTemplate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: TroopId::new(id),
            name: name.into(),
            tier: 0,
            is_hero: false,
            is_main_hero: false,
            loadout: Loadout::default(),
            can_mount: false,
            upgrade_targets: Vec::new(),
        }
    }

    pub fn with_tier(mut self, tier: u8) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_upgrade(mut self, target: impl Into<String>) -> Self {
        self.upgrade_targets.push(TroopId::new(target));
        self
    }

    pub fn mounted(mut self) -> Self {
        self.can_mount = true;
        self
    }

    pub fn hero(mut self) -> Self {
        self.is_hero = true;
        self
    }

    pub fn main_hero(mut self) -> Self {
        self.is_hero = true;
        self.is_main_hero = true;
        self
    }

    /// Only the first upgrade path is ever granted.
    pub fn first_upgrade_target(&self) -> Option<&TroopId> {
        self.upgrade_targets.first()
    }

    /// Heroes other than the player's own character fight at the player's side.
    pub fn is_companion(&self) -> bool {
        self.is_hero && !self.is_main_hero
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Player,
    Ally,
    Enemy,
}

impl Side {
    pub fn is_player_team(self) -> bool {
        matches!(self, Side::Player | Side::Ally)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Controller {
    Human,
    Ai,
}

/// Opaque id of an agent living in the host simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// A placed combatant. Valid only for the duel that created it.
#[derive(Debug, Clone, PartialEq)]
pub struct CombatantHandle {
    pub agent: AgentId,
    pub side: Side,
    pub controller: Controller,
    pub template: CombatantTemplate,
}
