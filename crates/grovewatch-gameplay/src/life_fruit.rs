//! Life fruit: a player-owned object that keeps its owner in the game.
//!
//! While at least one of an owner's fruits stands, the owner may respawn.
//! When the last one dies the owner's eligibility is revoked.

use ahash::AHashMap;
use tracing::info;

use grovewatch_common::{EntityId, OwnerId};

use crate::respawn::SessionContext;

/// Registry of planted life fruits.
#[derive(Debug, Default)]
pub struct LifeFruits {
    owners: AHashMap<EntityId, OwnerId>,
}

impl LifeFruits {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `fruit` for `owner` and marks the owner eligible.
    pub fn plant(&mut self, fruit: EntityId, owner: OwnerId, session: &SessionContext) {
        self.owners.insert(fruit, owner);
        session.set_eligibility(owner, true);
        info!(%fruit, %owner, "life fruit planted");
    }

    /// Owner of `fruit`.
    #[must_use]
    pub fn owner_of(&self, fruit: EntityId) -> Option<OwnerId> {
        self.owners.get(&fruit).copied()
    }

    /// Checks if `fruit` is a registered life fruit.
    #[must_use]
    pub fn contains(&self, fruit: EntityId) -> bool {
        self.owners.contains_key(&fruit)
    }

    /// True if damage to `victim` comes from the fruit's own owner.
    #[must_use]
    pub fn is_self_damage(&self, victim: EntityId, attacker_owner: Option<OwnerId>) -> bool {
        matches!(
            (self.owner_of(victim), attacker_owner),
            (Some(owner), Some(attacker)) if owner == attacker
        )
    }

    /// Handles the death of `fruit`. Revokes eligibility once the owner has none left.
    ///
    /// Returns the owner if `fruit` was registered.
    pub fn on_death(&mut self, fruit: EntityId, session: &SessionContext) -> Option<OwnerId> {
        let owner = self.owners.remove(&fruit)?;
        if self.owners.values().any(|o| *o == owner) {
            info!(%fruit, %owner, "life fruit lost, owner has more");
        } else {
            info!(%fruit, %owner, "last life fruit lost, respawn revoked");
            session.set_eligibility(owner, false);
        }
        Some(owner)
    }

    /// Number of registered fruits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Returns true if no fruit is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Forgets every fruit.
    pub fn clear(&mut self) {
        self.owners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::Authority;

    #[test]
    fn test_planting_grants_eligibility() {
        let session = SessionContext::new(Authority::Server);
        session.set_eligibility(OwnerId::new(4), false);
        let mut fruits = LifeFruits::new();

        fruits.plant(EntityId::new(1, 0), OwnerId::new(4), &session);

        assert!(session.is_eligible(OwnerId::new(4)));
        assert_eq!(fruits.owner_of(EntityId::new(1, 0)), Some(OwnerId::new(4)));
    }

    #[test]
    fn test_last_fruit_revokes() {
        let session = SessionContext::new(Authority::Server);
        let mut fruits = LifeFruits::new();
        let owner = OwnerId::new(2);
        fruits.plant(EntityId::new(1, 0), owner, &session);
        fruits.plant(EntityId::new(2, 0), owner, &session);

        assert_eq!(fruits.on_death(EntityId::new(1, 0), &session), Some(owner));
        assert!(session.is_eligible(owner));

        fruits.on_death(EntityId::new(2, 0), &session);
        assert!(!session.is_eligible(owner));
        assert!(fruits.is_empty());
        assert_eq!(fruits.on_death(EntityId::new(2, 0), &session), None);
    }

    #[test]
    fn test_self_damage() {
        let session = SessionContext::new(Authority::Server);
        let mut fruits = LifeFruits::new();
        let fruit = EntityId::new(1, 0);
        fruits.plant(fruit, OwnerId::new(3), &session);

        assert!(fruits.is_self_damage(fruit, Some(OwnerId::new(3))));
        assert!(!fruits.is_self_damage(fruit, Some(OwnerId::new(4))));
        assert!(!fruits.is_self_damage(fruit, None));
        assert!(!fruits.is_self_damage(EntityId::new(9, 0), Some(OwnerId::new(3))));
    }
}
