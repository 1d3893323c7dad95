use thiserror::Error;

use crate::host::RosterId;
use crate::troop::TroopId;

/// Environment faults raised while setting a duel up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DuelError {
    #[error("simulation has no main agent to replace")]
    NoMainAgent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("roster index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("troop {0} is not in the roster")]
    UnknownTroop(TroopId),

    #[error("mutation would leave {troop} with {number} units and {wounded} wounded")]
    InvalidCounts {
        troop: TroopId,
        number: i32,
        wounded: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("a correction for {target} in roster {roster} is already pending")]
    AlreadyPending { roster: RosterId, target: TroopId },
}

/// Reasons a troop pick is refused. The display text is shown to the player verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("Select at least one troop.")]
    Empty,

    #[error("You cannot select more than {max} troops.")]
    TooMany { max: usize },

    #[error("You cannot send wounded troops into training fights.")]
    Wounded,
}
