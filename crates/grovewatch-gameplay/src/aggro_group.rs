//! Aggro groups: agents that alert each other.
//!
//! When one member acquires a target, every other active member hears about
//! it within the same tick. The originator is always skipped, and receivers
//! do not re-broadcast, so a single alert never fans out more than once.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use grovewatch_common::{EntityId, GroupId};

/// Delivery side of a group alert.
pub trait AggroReceiver {
    /// True if `member` should receive alerts right now.
    fn is_active(&self, member: EntityId) -> bool;
    /// Delivers the alert to one member.
    fn on_group_aggro_triggered(&mut self, member: EntityId, source: EntityId, target: EntityId);
}

/// A set of agents sharing alert state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggroGroup {
    id: GroupId,
    members: Vec<EntityId>,
}

impl AggroGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            members: Vec::new(),
        }
    }

    /// Group identifier.
    #[must_use]
    pub const fn id(&self) -> GroupId {
        self.id
    }

    /// Adds `agent`. Returns false if it was already a member.
    pub fn register(&mut self, agent: EntityId) -> bool {
        if self.members.contains(&agent) {
            return false;
        }
        self.members.push(agent);
        true
    }

    /// Removes `agent`. Returns false if it was not a member.
    pub fn unregister(&mut self, agent: EntityId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| *m != agent);
        before != self.members.len()
    }

    /// Checks membership.
    #[must_use]
    pub fn contains(&self, agent: EntityId) -> bool {
        self.members.contains(&agent)
    }

    /// Members in registration order.
    #[must_use]
    pub fn members(&self) -> &[EntityId] {
        &self.members
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Alerts every active member except `source` that `source` acquired `target`.
    ///
    /// Returns the number of members notified.
    pub fn notify_group_aggro<R: AggroReceiver + ?Sized>(
        &self,
        source: EntityId,
        target: EntityId,
        receiver: &mut R,
    ) -> usize {
        let mut notified = 0;
        for &member in &self.members {
            if member == source || !receiver.is_active(member) {
                continue;
            }
            receiver.on_group_aggro_triggered(member, source, target);
            notified += 1;
        }
        tracing::debug!(%source, %target, notified, "group aggro");
        notified
    }
}

/// All aggro groups of a session.
#[derive(Debug, Default)]
pub struct AggroGroups {
    groups: AHashMap<GroupId, AggroGroup>,
    next_id: u32,
}

impl AggroGroups {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty group.
    pub fn create(&mut self) -> GroupId {
        let id = GroupId::new(self.next_id);
        self.next_id += 1;
        self.groups.insert(id, AggroGroup::new(id));
        id
    }

    /// Looks up a group.
    #[must_use]
    pub fn get(&self, id: GroupId) -> Option<&AggroGroup> {
        self.groups.get(&id)
    }

    /// Adds `agent` to group `id`. Returns false if the group is unknown or already has it.
    pub fn register(&mut self, id: GroupId, agent: EntityId) -> bool {
        self.groups
            .get_mut(&id)
            .is_some_and(|group| group.register(agent))
    }

    /// Removes `agent` from group `id`.
    pub fn unregister(&mut self, id: GroupId, agent: EntityId) -> bool {
        self.groups
            .get_mut(&id)
            .is_some_and(|group| group.unregister(agent))
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if there are no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Drops every group.
    pub fn clear(&mut self) {
        self.groups.clear();
    }
}
