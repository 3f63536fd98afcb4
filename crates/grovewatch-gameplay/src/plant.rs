//! Plant lifecycle for turrets.
//!
//! Every turret is a plant. A wild plant is `Neutral` and unowned. A player
//! can pick it up, carry it around and place it inside their own base, which
//! hands ownership to them and arms the turret. A placed plant can be picked
//! up again by its owner only.
//!
//! ```text
//! Neutral --pickup--> Carried --place--> Placed
//!    ^                   |                  |
//!    +-------release-----+      <--pickup---+ (owner only)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use grovewatch_common::{EntityId, OwnerId};

use crate::authority::Authority;

/// Errors from plant transitions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlantError {
    /// Caller is not the authority
    #[error("Plant transitions are server-only")]
    NotAuthoritative,
    /// Entity is not a plant
    #[error("Not a plant: {0}")]
    NotAPlant(EntityId),
    /// Carrier is too far from the plant
    #[error("Plant {plant} is {distance:.2} away, pickup range is {range:.2}")]
    OutOfRange {
        /// Plant entity
        plant: EntityId,
        /// Horizontal distance to the carrier
        distance: f32,
        /// Allowed range
        range: f32,
    },
    /// Plant is carried, or placed by someone else
    #[error("Plant {0} cannot be picked up")]
    NotPickable(EntityId),
    /// Carrier already holds a plant
    #[error("Carrier {0} already holds a plant")]
    HandsFull(EntityId),
    /// Carrier holds nothing, or not this plant
    #[error("Carrier {0} is not carrying a plant")]
    NotCarrying(EntityId),
    /// Carrier is not standing inside one of its own bases
    #[error("Carrier {0} is not inside its own base")]
    NoBase(EntityId),
    /// Carrier cannot act (dead, despawned)
    #[error("Carrier {0} is not available")]
    CarrierDown(EntityId),
}

/// Result type for plant transitions.
pub type PlantResult<T> = Result<T, PlantError>;

/// Where a plant is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlantState {
    /// Lying in the world, unowned
    Neutral,
    /// Held by a player
    Carried {
        /// Carrying player
        carrier: EntityId,
    },
    /// Planted in a base; the turret is armed
    Placed,
}

/// Plant handling tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantConfig {
    /// How close a player must be to pick a plant up
    pub pickup_range: f32,
    /// Radius of a base around its life fruit
    pub base_radius: f32,
    /// How far in front of the carrier a plant is set down
    pub place_offset: f32,
    /// Height above the carrier while carried
    pub carry_height: f32,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            pickup_range: 3.0,
            base_radius: 6.0,
            place_offset: 1.0,
            carry_height: 1.5,
        }
    }
}

/// Lifecycle state of one plant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plant {
    state: PlantState,
    authority: Authority,
}

impl Plant {
    /// A wild plant waiting to be picked up.
    #[must_use]
    pub const fn wild() -> Self {
        Self {
            state: PlantState::Neutral,
            authority: Authority::Server,
        }
    }

    /// A plant already placed in a base.
    #[must_use]
    pub const fn placed() -> Self {
        Self {
            state: PlantState::Placed,
            authority: Authority::Server,
        }
    }

    /// Builder: set which side owns this plant.
    #[must_use]
    pub fn with_authority(mut self, authority: Authority) -> Self {
        self.authority = authority;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> PlantState {
        self.state
    }

    /// True if the turret should track and fire.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        matches!(self.state, PlantState::Placed)
    }

    /// Player holding this plant.
    #[must_use]
    pub const fn carrier(&self) -> Option<EntityId> {
        match self.state {
            PlantState::Carried { carrier } => Some(carrier),
            _ => None,
        }
    }

    /// Neutral plants can be taken by anyone, placed ones only by their owner.
    #[must_use]
    pub fn can_be_picked_up_by(&self, plant_owner: OwnerId, carrier_owner: OwnerId) -> bool {
        match self.state {
            PlantState::Neutral => true,
            PlantState::Placed => plant_owner == carrier_owner,
            PlantState::Carried { .. } => false,
        }
    }

    /// Takes the plant into `carrier`'s hands.
    pub fn pickup(
        &mut self,
        plant: EntityId,
        carrier: EntityId,
        plant_owner: OwnerId,
        carrier_owner: OwnerId,
    ) -> PlantResult<()> {
        if !self.authority.permits("plant_pickup") {
            return Err(PlantError::NotAuthoritative);
        }
        if !self.can_be_picked_up_by(plant_owner, carrier_owner) {
            return Err(PlantError::NotPickable(plant));
        }
        self.state = PlantState::Carried { carrier };
        debug!(%plant, %carrier, "plant picked up");
        Ok(())
    }

    /// Lets go of the plant; it becomes neutral again.
    pub fn release(&mut self, plant: EntityId, carrier: EntityId) -> PlantResult<()> {
        if !self.authority.permits("plant_release") {
            return Err(PlantError::NotAuthoritative);
        }
        if self.carrier() != Some(carrier) {
            return Err(PlantError::NotCarrying(carrier));
        }
        self.state = PlantState::Neutral;
        debug!(%plant, %carrier, "plant released");
        Ok(())
    }

    /// Plants it. The caller has already checked the base.
    pub fn place(&mut self, plant: EntityId, carrier: EntityId) -> PlantResult<()> {
        if !self.authority.permits("plant_place") {
            return Err(PlantError::NotAuthoritative);
        }
        if self.carrier() != Some(carrier) {
            return Err(PlantError::NotCarrying(carrier));
        }
        self.state = PlantState::Placed;
        debug!(%plant, %carrier, "plant placed");
        Ok(())
    }
}

impl Default for Plant {
    fn default() -> Self {
        Self::wild()
    }
}
