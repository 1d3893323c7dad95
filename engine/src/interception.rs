//! Decides whether the arena's built-in practice fight may run.
//!
//! The host calls these hooks from its own practice-fight controller and passes the current
//! duel session explicitly.

use tracing::debug;

use crate::host::{SceneQuery, Simulation};
use crate::orchestrator::DuelSession;
use crate::settings::MarkerTags;

#[derive(Debug, Clone, Default)]
pub struct ArenaPolicy {
    markers: MarkerTags,
}

impl ArenaPolicy {
    pub fn new(markers: MarkerTags) -> Self {
        Self { markers }
    }

    pub fn should_run_builtin_spawn(&self, session: Option<&DuelSession>) -> bool {
        session.is_none()
    }

    pub fn should_run_builtin_tick(&self, session: Option<&DuelSession>) -> bool {
        session.is_none()
    }

    /// After the built-in controller has started, move the main agent onto the first generic
    /// marker so it does not stand in the spectator stands. Returns whether it moved.
    pub fn after_builtin_start<H>(&self, session: Option<&DuelSession>, host: &mut H) -> bool
    where
        H: SceneQuery + Simulation + ?Sized,
    {
        if session.is_none() {
            return false;
        }
        let Some(agent) = host.main_agent() else {
            return false;
        };
        let Some(marker) = host.find_markers(&self.markers.generic).into_iter().next() else {
            return false;
        };
        debug!(%agent, "re-anchoring main agent after built-in start");
        host.teleport(agent, marker.origin);
        true
    }
}
