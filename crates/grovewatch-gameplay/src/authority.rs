//! Simulation authority.
//!
//! Exactly one side of a session (the server) may mutate health, agent and
//! respawn state. Replicas observe notifications only. Mutators check the
//! context they were called from and quietly drop the call otherwise.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which side of the session a piece of state lives on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Authority {
    /// Authoritative simulation (single writer).
    #[default]
    Server,
    /// Observer mirroring the server's notifications.
    Replica,
}

impl Authority {
    /// Returns true if this side may mutate simulation state.
    #[must_use]
    pub const fn is_authoritative(self) -> bool {
        matches!(self, Self::Server)
    }

    /// Gate for mutators. Logs and returns false on a replica.
    pub fn permits(self, operation: &'static str) -> bool {
        if self.is_authoritative() {
            true
        } else {
            warn!(operation, "ignoring mutation from non-authoritative context");
            false
        }
    }
}
