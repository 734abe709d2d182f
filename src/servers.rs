use crate::types::{AgentId, Time};

/// Where the next admitted agent sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub index: usize,
    /// the occupant that will be overwritten, if the pool was full
    pub displaced: Option<AgentId>,
}

/// Tracks which agent sits on each server.
///
/// A slot keeps its occupant until another agent is assigned to it.
#[derive(Debug, Clone)]
pub struct ServerPool {
    slots: Vec<Option<AgentId>>,
}

impl ServerPool {
    pub fn new(nb: usize) -> Self {
        Self { slots: vec![None; nb] }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn occupants(&self) -> &[Option<AgentId>] {
        &self.slots
    }

    /// The first empty slot, otherwise the slot of the occupant departing first.
    ///
    /// Ties go to the lowest slot index. Nothing is cleared here.
    pub fn next_slot_and_occupant_to_replace(&self, departure_of: impl Fn(AgentId) -> Time) -> Option<Slot> {
        if let Some(index) = self.slots.iter().position(Option::is_none) {
            return Some(Slot { index, displaced: None });
        }
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, occupant)| occupant.map(|agent| (index, agent)))
            .min_by(|(_, a), (_, b)| departure_of(*a).cmp(&departure_of(*b)))
            .map(|(index, agent)| Slot {
                index,
                displaced: Some(agent),
            })
    }

    pub fn assign(&mut self, slot: usize, agent: AgentId) {
        debug_assert!(
            !self.slots.contains(&Some(agent)),
            "agent {} already holds a server",
            agent
        );
        self.slots[slot] = Some(agent);
    }
}
