/// Player state: location, inventory, flags, and the command log used for
/// action-loop detection.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::command::Command;
use super::node::NodeId;

pub const DEFAULT_PLAYER_NAME: &str = "Traveler";
pub const DEFAULT_START_LOCATION: &str = "the beginning";

/// Point-in-time copy of the player's observable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub location: String,
    pub inventory: Vec<String>,
    pub visited_locations: Vec<String>,
    pub choice_count: usize,
}

/// The player. `current_location` is always a member of
/// `visited_locations`; flag and variable names are stored lowercased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPlayer")]
pub struct Player {
    pub name: String,
    inventory: Vec<String>,
    current_location: String,
    visited_locations: FxHashSet<String>,
    choice_history: Vec<NodeId>,
    action_history: Vec<Command>,
    state_history: Vec<PlayerState>,
    flags: HashMap<String, bool>,
    variables: HashMap<String, serde_json::Value>,
}

/// Deserialization shape; normalised into [`Player`] so restored players
/// keep the same invariants as fresh ones.
#[derive(Deserialize)]
struct RawPlayer {
    name: String,
    #[serde(default)]
    inventory: Vec<String>,
    current_location: String,
    #[serde(default)]
    visited_locations: FxHashSet<String>,
    #[serde(default)]
    choice_history: Vec<NodeId>,
    #[serde(default)]
    action_history: Vec<Command>,
    #[serde(default)]
    state_history: Vec<PlayerState>,
    #[serde(default)]
    flags: HashMap<String, bool>,
    #[serde(default)]
    variables: HashMap<String, serde_json::Value>,
}

impl From<RawPlayer> for Player {
    fn from(raw: RawPlayer) -> Self {
        let mut visited_locations = raw.visited_locations;
        visited_locations.insert(raw.current_location.clone());
        Self {
            name: raw.name,
            inventory: raw.inventory,
            current_location: raw.current_location,
            visited_locations,
            choice_history: raw.choice_history,
            action_history: raw.action_history,
            state_history: raw.state_history,
            flags: raw
                .flags
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
            variables: raw
                .variables
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
        }
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new(DEFAULT_PLAYER_NAME, DEFAULT_START_LOCATION)
    }
}

impl Player {
    pub fn new(name: impl Into<String>, start_location: impl Into<String>) -> Self {
        let current_location = start_location.into();
        let mut visited_locations = FxHashSet::default();
        visited_locations.insert(current_location.clone());
        let mut player = Self {
            name: name.into(),
            inventory: Vec::new(),
            current_location,
            visited_locations,
            choice_history: Vec::new(),
            action_history: Vec::new(),
            state_history: Vec::new(),
            flags: HashMap::new(),
            variables: HashMap::new(),
        };
        player.save_state();
        player
    }

    pub fn current_location(&self) -> &str {
        &self.current_location
    }

    pub fn inventory(&self) -> &[String] {
        &self.inventory
    }

    pub fn visited_locations(&self) -> &FxHashSet<String> {
        &self.visited_locations
    }

    pub fn has_visited(&self, location: &str) -> bool {
        self.visited_locations.contains(location)
            || self
                .visited_locations
                .iter()
                .any(|visited| visited.eq_ignore_ascii_case(location))
    }

    pub fn choice_history(&self) -> &[NodeId] {
        &self.choice_history
    }

    pub fn action_history(&self) -> &[Command] {
        &self.action_history
    }

    pub fn state_history(&self) -> &[PlayerState] {
        &self.state_history
    }

    /// Add an item. Membership is case-insensitive; returns `false` if an
    /// item of the same name is already held.
    pub fn add_item(&mut self, item: &str) -> bool {
        if self.has_item(item) {
            return false;
        }
        self.inventory.push(item.to_string());
        true
    }

    /// Remove an item by case-insensitive name.
    pub fn remove_item(&mut self, item: &str) -> bool {
        match self.position_of(item) {
            Some(index) => {
                self.inventory.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn has_item(&self, item: &str) -> bool {
        self.position_of(item).is_some()
    }

    fn position_of(&self, item: &str) -> Option<usize> {
        let wanted = item.to_lowercase();
        self.inventory
            .iter()
            .position(|held| held.to_lowercase() == wanted)
    }

    pub fn move_to(&mut self, location: impl Into<String>) {
        self.current_location = location.into();
        self.visited_locations.insert(self.current_location.clone());
        self.save_state();
    }

    pub fn record_choice(&mut self, node_id: NodeId, command: Command) {
        self.choice_history.push(node_id);
        self.action_history.push(command);
        self.save_state();
    }

    pub fn set_flag(&mut self, name: &str, value: bool) {
        self.flags.insert(name.to_lowercase(), value);
    }

    /// Unset flags read as `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.flags
            .get(&name.to_lowercase())
            .copied()
            .unwrap_or(false)
    }

    pub fn set_variable(&mut self, name: &str, value: impl Into<serde_json::Value>) {
        self.variables.insert(name.to_lowercase(), value.into());
    }

    pub fn variable(&self, name: &str) -> Option<&serde_json::Value> {
        self.variables.get(&name.to_lowercase())
    }

    /// Capture the current state onto the state log.
    pub fn save_state(&mut self) {
        let state = self.snapshot();
        self.state_history.push(state);
    }

    pub fn snapshot(&self) -> PlayerState {
        let mut visited: Vec<String> = self.visited_locations.iter().cloned().collect();
        visited.sort();
        PlayerState {
            location: self.current_location.clone(),
            inventory: self.inventory.clone(),
            visited_locations: visited,
            choice_count: self.choice_history.len(),
        }
    }

    /// Verb names of every recorded command, `"unknown"` where none parsed.
    pub fn action_pattern(&self) -> Vec<&'static str> {
        self.action_history.iter().map(|c| c.verb_name()).collect()
    }

    /// Returns the repeating verb pattern when the last `window` verbs equal
    /// the `window` verbs before them.
    pub fn detect_action_loop(&self, window: usize) -> Option<Vec<String>> {
        if window == 0 || self.action_history.len() < window * 2 {
            return None;
        }
        let pattern = self.action_pattern();
        let recent = &pattern[pattern.len() - window..];
        let previous = &pattern[pattern.len() - window * 2..pattern.len() - window];
        if recent == previous {
            Some(recent.iter().map(|v| v.to_string()).collect())
        } else {
            None
        }
    }

    /// Human-readable summary for the `status` command.
    pub fn status_text(&self) -> String {
        let inventory = if self.inventory.is_empty() {
            "nothing".to_string()
        } else {
            self.inventory.join(", ")
        };
        format!(
            "Name: {}\nLocation: {}\nInventory: {}\nPlaces visited: {}\nChoices made: {}",
            self.name,
            self.current_location,
            inventory,
            self.visited_locations.len(),
            self.choice_history.len()
        )
    }
}
