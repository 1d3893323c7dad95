use tracing::debug;

use crate::error::DuelError;
use crate::geometry::planar;
use crate::host::{Simulation, SpawnRequest, WatchState};
use crate::spawn::SpawnSlot;
use crate::troop::{CombatantHandle, CombatantTemplate, Controller, Side};

pub const MAX_MORALE: f32 = 100.0;

/// Turns resolved slots into agents, one placement call per combatant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatantFactory {
    mounts_permitted: bool,
}

impl CombatantFactory {
    pub fn new(mounts_permitted: bool) -> Self {
        Self { mounts_permitted }
    }

    /// Riding is allowed only when the player and at least one opponent can ride.
    pub fn for_duel(player: &CombatantTemplate, opponents: &[CombatantTemplate]) -> Self {
        Self::new(player.can_mount && opponents.iter().any(|t| t.can_mount))
    }

    pub fn mounts_permitted(&self) -> bool {
        self.mounts_permitted
    }

    /// Place the player's combatant in place of the simulation's current main agent.
    pub fn place_player<S: Simulation + ?Sized>(
        &self,
        sim: &mut S,
        template: &CombatantTemplate,
        slot: &SpawnSlot,
    ) -> Result<CombatantHandle, DuelError> {
        let current = sim.main_agent().ok_or(DuelError::NoMainAgent)?;
        if sim.is_active(current) {
            sim.fade_out(current);
        }
        let handle = self.place(sim, template, slot, Side::Player, Controller::Human);
        sim.set_main_agent(handle.agent);
        Ok(handle)
    }

    /// `slot.forward` becomes both the initial direction and the look direction.
    pub fn place<S: Simulation + ?Sized>(
        &self,
        sim: &mut S,
        template: &CombatantTemplate,
        slot: &SpawnSlot,
        side: Side,
        controller: Controller,
    ) -> CombatantHandle {
        let mounted = self.mounts_permitted && template.can_mount;
        let agent = sim.spawn(SpawnRequest {
            template,
            side,
            controller,
            position: slot.position,
            direction: planar(slot.forward),
            mounted,
            civilian_equipment: false,
        });

        sim.set_controller(agent, controller);
        if controller == Controller::Ai {
            sim.set_watch_state(agent, WatchState::Alarmed);
            sim.set_morale(agent, MAX_MORALE);
        }
        sim.set_look_direction(agent, slot.forward);

        debug!(
            %agent,
            troop = %template.id,
            ?side,
            mounted,
            x = slot.position.x,
            y = slot.position.y,
            z = slot.position.z,
            "placed combatant"
        );

        CombatantHandle {
            agent,
            side,
            controller,
            template: template.clone(),
        }
    }
}
