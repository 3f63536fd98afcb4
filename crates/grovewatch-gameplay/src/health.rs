//! Health component.
//!
//! Holds current/max vitality for any damageable entity. All mutation goes
//! through [`Health::apply_damage`], [`Health::heal`], [`Health::set_health`]
//! and [`Health::revive`], each gated on [`Authority`]. Death is edge-triggered:
//! `Died` is published on the transition into zero and never again until a
//! revive.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use grovewatch_common::EntityId;

use crate::authority::Authority;
use crate::events::{EventBus, Notification};

/// Result of a damage call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DamageOutcome {
    /// Health actually removed
    pub applied: f32,
    /// True if this call caused the death
    pub died: bool,
}

impl DamageOutcome {
    /// True if the call changed anything.
    #[must_use]
    pub fn landed(&self) -> bool {
        self.applied > 0.0
    }
}

/// Vitality of a damageable entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    current: f32,
    max: f32,
    dead: bool,
    authority: Authority,
    /// Entities to tell when this one dies. Drained on death.
    #[serde(skip)]
    death_subscribers: Vec<EntityId>,
}

impl Health {
    /// Creates full health with the given maximum.
    ///
    /// Non-positive or non-finite maximums fall back to 1.
    #[must_use]
    pub fn new(max: f32) -> Self {
        let max = if max.is_finite() && max > 0.0 { max } else { 1.0 };
        Self {
            current: max,
            max,
            dead: false,
            authority: Authority::Server,
            death_subscribers: Vec::new(),
        }
    }

    /// Builder: set which side owns this component.
    #[must_use]
    pub fn with_authority(mut self, authority: Authority) -> Self {
        self.authority = authority;
        self
    }

    /// Current health.
    #[must_use]
    pub const fn current(&self) -> f32 {
        self.current
    }

    /// Maximum health.
    #[must_use]
    pub const fn max(&self) -> f32 {
        self.max
    }

    /// True once health has reached zero and until revived.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.dead
    }

    /// Current health as a fraction of max.
    #[must_use]
    pub fn fraction(&self) -> f32 {
        self.current / self.max
    }

    /// Side this component belongs to.
    #[must_use]
    pub const fn authority(&self) -> Authority {
        self.authority
    }

    /// Reassigns the owning side (used when an entity enters a simulation).
    pub fn set_authority(&mut self, authority: Authority) {
        self.authority = authority;
    }

    /// Applies damage on behalf of `attacker`.
    ///
    /// Damage is rounded up to whole points. No-op on a replica, when already
    /// dead, or when `amount` is not positive.
    pub fn apply_damage(
        &mut self,
        victim: EntityId,
        amount: f32,
        attacker: Option<EntityId>,
        events: &EventBus,
    ) -> DamageOutcome {
        if !self.authority.permits("apply_damage") {
            return DamageOutcome::default();
        }
        if self.dead || amount.is_nan() || amount <= 0.0 {
            return DamageOutcome::default();
        }

        let before = self.current;
        self.current = (self.current - amount.ceil()).clamp(0.0, self.max);
        let applied = before - self.current;

        debug!(%victim, applied, current = self.current, "damage applied");
        events.publish(Notification::Damaged {
            victim,
            attacker,
            amount: applied,
        });
        self.publish_changed(victim, events);

        let died = self.enter_death_if_empty(victim, attacker, events);
        DamageOutcome { applied, died }
    }

    /// Restores up to `amount` health. Dead entities need [`Health::revive`].
    ///
    /// Returns the amount actually healed.
    pub fn heal(&mut self, entity: EntityId, amount: f32, events: &EventBus) -> f32 {
        if !self.authority.permits("heal") {
            return 0.0;
        }
        if self.dead || amount.is_nan() || amount <= 0.0 {
            return 0.0;
        }
        let before = self.current;
        self.current = (self.current + amount).clamp(0.0, self.max);
        let healed = self.current - before;
        if healed > 0.0 {
            self.publish_changed(entity, events);
        }
        healed
    }

    /// Sets health directly, clamped to `[0, max]`.
    ///
    /// Setting a living entity to zero kills it; returns true in that case.
    pub fn set_health(&mut self, entity: EntityId, value: f32, events: &EventBus) -> bool {
        if !self.authority.permits("set_health") {
            return false;
        }
        if self.dead || value.is_nan() {
            return false;
        }
        let clamped = value.clamp(0.0, self.max);
        if (clamped - self.current).abs() > f32::EPSILON {
            self.current = clamped;
            self.publish_changed(entity, events);
        }
        self.enter_death_if_empty(entity, None, events)
    }

    /// Resets to full health and clears the dead flag. Does not publish `Damaged`.
    pub fn revive(&mut self, entity: EntityId, events: &EventBus) {
        if !self.authority.permits("revive") {
            return;
        }
        self.current = self.max;
        self.dead = false;
        info!(%entity, "revived");
        self.publish_changed(entity, events);
        events.publish(Notification::Revived { entity });
    }

    /// Mirrors a replicated value. Only meaningful on a replica.
    pub fn sync(&mut self, current: f32, max: f32) {
        if self.authority.is_authoritative() {
            return;
        }
        if max.is_finite() && max > 0.0 {
            self.max = max;
        }
        self.current = current.clamp(0.0, self.max);
        self.dead = self.current <= 0.0;
    }

    /// Registers `subscriber` for this entity's death. Returns false if already registered.
    pub fn subscribe_death(&mut self, subscriber: EntityId) -> bool {
        if self.death_subscribers.contains(&subscriber) {
            return false;
        }
        self.death_subscribers.push(subscriber);
        true
    }

    /// Removes `subscriber`. Returns false if it was not registered.
    pub fn unsubscribe_death(&mut self, subscriber: EntityId) -> bool {
        let before = self.death_subscribers.len();
        self.death_subscribers.retain(|s| *s != subscriber);
        self.death_subscribers.len() != before
    }

    /// Current death subscribers.
    #[must_use]
    pub fn death_subscribers(&self) -> &[EntityId] {
        &self.death_subscribers
    }

    /// Takes the subscriber list, leaving it empty.
    pub fn take_death_subscribers(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.death_subscribers)
    }

    fn enter_death_if_empty(
        &mut self,
        victim: EntityId,
        attacker: Option<EntityId>,
        events: &EventBus,
    ) -> bool {
        if self.dead || self.current > 0.0 {
            return false;
        }
        self.dead = true;
        info!(%victim, ?attacker, "died");
        events.publish(Notification::Died { victim, attacker });
        true
    }

    fn publish_changed(&self, entity: EntityId, events: &EventBus) {
        events.publish(Notification::HealthChanged {
            entity,
            current: self.current,
            max: self.max,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn died_count(events: &[Notification]) -> usize {
        events
            .iter()
            .filter(|n| matches!(n, Notification::Died { .. }))
            .count()
    }

    #[test]
    fn test_overkill_kills_once() {
        let bus = EventBus::default();
        let victim = EntityId::new(1, 0);
        let attacker = EntityId::new(2, 0);
        let mut health = Health::new(100.0);

        let outcome = health.apply_damage(victim, 150.0, Some(attacker), &bus);

        assert!(outcome.died);
        assert!((health.current() - 0.0).abs() < f32::EPSILON);
        assert!(health.is_dead());
        let events = bus.drain();
        assert_eq!(died_count(&events), 1);
        assert!(events.contains(&Notification::Died {
            victim,
            attacker: Some(attacker)
        }));
    }

    #[test]
    fn test_damage_rounds_up() {
        let bus = EventBus::default();
        let mut health = Health::new(100.0);
        let outcome = health.apply_damage(EntityId::new(1, 0), 0.2, None, &bus);
        assert!((outcome.applied - 1.0).abs() < f32::EPSILON);
        assert!((health.current() - 99.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_non_positive_damage_is_noop() {
        let bus = EventBus::default();
        let mut health = Health::new(50.0);
        let id = EntityId::new(1, 0);
        assert!(!health.apply_damage(id, 0.0, None, &bus).landed());
        assert!(!health.apply_damage(id, -5.0, None, &bus).landed());
        assert!(!health.apply_damage(id, f32::NAN, None, &bus).landed());
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_damaged_fires_without_death() {
        let bus = EventBus::default();
        let mut health = Health::new(50.0);
        let id = EntityId::new(1, 0);
        health.apply_damage(id, 10.0, None, &bus);
        let events = bus.drain();
        assert!(matches!(events[0], Notification::Damaged { amount, .. } if (amount - 10.0).abs() < f32::EPSILON));
        assert_eq!(died_count(&events), 0);
    }

    #[test]
    fn test_replica_cannot_mutate() {
        let bus = EventBus::default();
        let id = EntityId::new(1, 0);
        let mut health = Health::new(100.0).with_authority(Authority::Replica);

        assert!(!health.apply_damage(id, 30.0, None, &bus).landed());
        assert!(health.heal(id, 10.0, &bus) <= 0.0);
        assert!(!health.set_health(id, 0.0, &bus));
        health.revive(id, &bus);

        assert!((health.current() - 100.0).abs() < f32::EPSILON);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_replica_sync_mirrors_values() {
        let mut health = Health::new(100.0).with_authority(Authority::Replica);
        health.sync(0.0, 120.0);
        assert!(health.is_dead());
        assert!((health.max() - 120.0).abs() < f32::EPSILON);
        health.sync(120.0, 120.0);
        assert!(!health.is_dead());
    }

    #[test]
    fn test_server_ignores_sync() {
        let mut health = Health::new(100.0);
        health.sync(0.0, 100.0);
        assert!(!health.is_dead());
    }

    #[test]
    fn test_revive_restores_without_damaged() {
        let bus = EventBus::default();
        let id = EntityId::new(1, 0);
        let mut health = Health::new(40.0);
        health.apply_damage(id, 40.0, None, &bus);
        bus.drain();

        health.revive(id, &bus);

        assert!(!health.is_dead());
        assert!((health.current() - 40.0).abs() < f32::EPSILON);
        let events = bus.drain();
        assert!(events
            .iter()
            .all(|n| !matches!(n, Notification::Damaged { .. })));
        assert!(events.contains(&Notification::Revived { entity: id }));
    }

    #[test]
    fn test_heal_does_not_raise_the_dead() {
        let bus = EventBus::default();
        let id = EntityId::new(1, 0);
        let mut health = Health::new(10.0);
        health.apply_damage(id, 10.0, None, &bus);
        assert!(health.heal(id, 5.0, &bus) <= 0.0);
        assert!(health.is_dead());
    }

    #[test]
    fn test_set_health_to_zero_kills() {
        let bus = EventBus::default();
        let id = EntityId::new(1, 0);
        let mut health = Health::new(10.0);
        assert!(health.set_health(id, -3.0, &bus));
        assert!(health.is_dead());
        assert_eq!(died_count(&bus.drain()), 1);
    }

    #[test]
    fn test_death_subscription_is_deduplicated() {
        let mut health = Health::new(10.0);
        let agent = EntityId::new(4, 0);
        assert!(health.subscribe_death(agent));
        assert!(!health.subscribe_death(agent));
        assert_eq!(health.death_subscribers(), &[agent]);
        assert!(health.unsubscribe_death(agent));
        assert!(!health.unsubscribe_death(agent));
        assert!(health.take_death_subscribers().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Damage(f32),
        Heal(f32),
        Set(f32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-20.0f32..200.0).prop_map(Op::Damage),
            (-20.0f32..200.0).prop_map(Op::Heal),
            (-50.0f32..300.0).prop_map(Op::Set),
        ]
    }

    proptest! {
        #[test]
        fn prop_current_stays_in_bounds(max in 1.0f32..500.0, ops in prop::collection::vec(op_strategy(), 0..64)) {
            let bus = EventBus::new(1024);
            let id = EntityId::new(1, 0);
            let mut health = Health::new(max);
            for op in ops {
                match op {
                    Op::Damage(v) => { health.apply_damage(id, v, None, &bus); }
                    Op::Heal(v) => { health.heal(id, v, &bus); }
                    Op::Set(v) => { health.set_health(id, v, &bus); }
                }
                prop_assert!(health.current() >= 0.0);
                prop_assert!(health.current() <= health.max());
                bus.drain();
            }
        }

        #[test]
        fn prop_died_fires_once(max in 1.0f32..200.0, hits in prop::collection::vec(0.1f32..300.0, 1..40)) {
            let bus = EventBus::new(1024);
            let id = EntityId::new(1, 0);
            let mut health = Health::new(max);
            let mut deaths = 0;
            for hit in hits {
                if health.apply_damage(id, hit, None, &bus).died {
                    deaths += 1;
                }
            }
            let events = bus.drain();
            prop_assert_eq!(died_count(&events), deaths);
            prop_assert!(deaths <= 1);
            prop_assert_eq!(deaths == 1, health.is_dead());
        }
    }
}
