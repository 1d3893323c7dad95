//! Arena training duels: pick troops from the party, fight them in the arena, and have the
//! ones the player beats come back ready for promotion.

pub mod duel;
pub mod error;
pub mod factory;
pub mod geometry;
pub mod host;
pub mod interception;
pub mod orchestrator;
pub mod promotion;
pub mod sandbox;
pub mod scenario;
pub mod settings;
pub mod spawn;
pub mod troop;

pub use duel::{DuelLineup, DuelOutcome, DuelState, DuelStateMachine};
pub use error::{DuelError, LedgerError, RosterError, SelectionError};
pub use factory::CombatantFactory;
pub use geometry::Frame;
pub use host::{
    AgentState, AgentStatus, ArenaHost, CountsChange, CountsMutation, MissionControl, Notifier,
    RosterId, RosterObserver, SceneQuery, Simulation, SpawnRequest, TroopRoster,
    UpgradeCostModel, WatchState,
};
pub use interception::ArenaPolicy;
pub use orchestrator::{DuelOrchestrator, DuelSession, RosterPick, TroopSelection, validate_selection};
pub use promotion::{Expectation, ExpectationLedger, PromotionReconciler, Removal};
pub use settings::{Attribution, DuelSettings, MarkerTags};
pub use spawn::{FallbackLayout, MarkerSet, SpawnPlan, SpawnResolver, SpawnSlot, SpawnSource};
pub use troop::{AgentId, CombatantHandle, CombatantTemplate, Controller, Side, TroopId};
