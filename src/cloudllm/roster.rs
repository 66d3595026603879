//! The registry of agent cards: directory prompt rendering and name
//! resolution. Grounded on the reference scheduler's roster, including its
//! specific replace-on-duplicate behavior (see [`Roster::register`]).

use crate::cloudllm::card::AgentCard;

/// Default role name used by [`Roster::coordinator`] to find the
/// well-known routing fallback.
pub const DEFAULT_COORDINATOR_ROLE: &str = "coordinator";

/// Cardinality breakdown surfaced for diagnostics/logging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterStats {
    pub total_agents: usize,
    pub by_role: Vec<(String, usize)>,
}

/// A mapping from agent name to [`AgentCard`], preserving insertion order
/// for directory rendering.
#[derive(Debug, Default)]
pub struct Roster {
    cards: Vec<AgentCard>,
}

impl Roster {
    pub fn new() -> Self {
        Roster { cards: Vec::new() }
    }

    /// Register a card. If a card with the same name already exists, it is
    /// removed and the new card is appended — replacement moves the entry
    /// to the end of directory-rendering order rather than replacing it
    /// in place, matching the source this scheduler is modeled on. A
    /// warning is logged on replacement.
    pub fn register(&mut self, card: AgentCard) {
        if let Some(pos) = self.cards.iter().position(|c| c.name == card.name) {
            log::warn!("roster: replacing existing agent card '{}'", card.name);
            self.cards.remove(pos);
        }
        self.cards.push(card);
    }

    /// Remove a card by name. Tolerates the card not being present.
    pub fn unregister(&mut self, name: &str) {
        self.cards.retain(|c| c.name != name);
    }

    pub fn get(&self, name: &str) -> Option<&AgentCard> {
        self.cards.iter().find(|c| c.name == name)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.cards.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn all_cards(&self) -> &[AgentCard] {
        &self.cards
    }

    pub fn agents_by_role<'a>(&'a self, role: &str) -> Vec<&'a AgentCard> {
        self.cards.iter().filter(|c| c.role == role).collect()
    }

    /// The first card whose role matches `coordinator_role`
    /// (`"coordinator"` by default).
    pub fn coordinator(&self, coordinator_role: &str) -> Option<&AgentCard> {
        self.cards.iter().find(|c| c.role == coordinator_role)
    }

    /// Multi-line enumeration of every card: name, role, description, in
    /// directory order.
    pub fn directory_prompt(&self) -> String {
        self.cards
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {} ({}): {}", i + 1, c.name, c.role, c.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn stats(&self) -> RosterStats {
        let mut by_role: Vec<(String, usize)> = Vec::new();
        for card in &self.cards {
            match by_role.iter_mut().find(|(role, _)| role == &card.role) {
                Some((_, count)) => *count += 1,
                None => by_role.push((card.role.clone(), 1)),
            }
        }
        RosterStats {
            total_agents: self.cards.len(),
            by_role,
        }
    }
}
