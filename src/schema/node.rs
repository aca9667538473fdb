use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::player::Player;

/// Newtype wrapper for story node IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// A fresh random (v4) id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build a v4 id from caller-supplied random bytes, so a seeded RNG
    /// yields the same ids on every run.
    pub fn from_random_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }

    /// First eight hex digits, for display.
    pub fn short(&self) -> String {
        let mut s = self.0.simple().to_string();
        s.truncate(8);
        s
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Narrative role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    #[default]
    Narrative,
    Choice,
    Consequence,
    Paradox,
    LoopBreak,
    Surreal,
}

/// Availability predicate attached to a choice, evaluated against the
/// player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ChoiceCondition {
    #[default]
    Always,
    HasItem(String),
    FlagSet(String),
    HasVisited(String),
    Not(Box<ChoiceCondition>),
    All(Vec<ChoiceCondition>),
    Any(Vec<ChoiceCondition>),
}

impl ChoiceCondition {
    pub fn evaluate(&self, player: &Player) -> bool {
        match self {
            Self::Always => true,
            Self::HasItem(item) => player.has_item(item),
            Self::FlagSet(flag) => player.flag(flag),
            Self::HasVisited(location) => player.has_visited(location),
            Self::Not(inner) => !inner.evaluate(player),
            Self::All(conditions) => conditions.iter().all(|c| c.evaluate(player)),
            Self::Any(conditions) => conditions.iter().any(|c| c.evaluate(player)),
        }
    }
}

/// A selectable option attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Display text.
    pub text: String,
    /// Optional destination. Dangling references are tolerated.
    #[serde(default)]
    pub target_node_id: Option<NodeId>,
    /// Command string this choice represents, e.g. `"go north"`.
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub condition: ChoiceCondition,
    /// Declared effects. Carried and persisted, never applied.
    #[serde(default)]
    pub consequences: HashMap<String, serde_json::Value>,
}

impl Choice {
    pub fn new(text: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target_node_id: None,
            action: action.into(),
            condition: ChoiceCondition::Always,
            consequences: HashMap::new(),
        }
    }

    pub fn with_target(mut self, target: NodeId) -> Self {
        self.target_node_id = Some(target);
        self
    }

    pub fn with_condition(mut self, condition: ChoiceCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_consequence(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.consequences.insert(key.into(), value);
        self
    }

    pub fn is_available(&self, player: &Player) -> bool {
        self.condition.evaluate(player)
    }
}

/// One entry in a node's rewrite log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRecord {
    pub reason: String,
    /// 1-based ordinal of this rewrite on its node.
    pub rewrite_number: u32,
}

/// A unit of narrative: text, choices, provenance and rewrite history.
///
/// `original_text` is captured on the first rewrite and never changes
/// afterwards; `rewrite_count` always equals the rewrite log length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryNode {
    pub id: NodeId,
    pub text: String,
    #[serde(default)]
    pub node_type: NodeType,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    previous_node_ids: Vec<NodeId>,
    #[serde(default)]
    tags: FxHashSet<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    original_text: Option<String>,
    #[serde(default)]
    rewrite_count: u32,
    #[serde(default)]
    rewrite_history: Vec<RewriteRecord>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub required_items: Vec<String>,
    #[serde(default)]
    pub grants_items: Vec<String>,
}

impl StoryNode {
    pub fn new(text: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            text: text.into(),
            node_type: NodeType::Narrative,
            choices: Vec::new(),
            previous_node_ids: Vec::new(),
            tags: FxHashSet::default(),
            metadata: HashMap::new(),
            original_text: None,
            rewrite_count: 0,
            rewrite_history: Vec::new(),
            location: location.into(),
            required_items: Vec::new(),
            grants_items: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.node_type = node_type;
        self
    }

    pub fn with_choices(mut self, choices: Vec<Choice>) -> Self {
        self.choices = choices;
        self
    }

    pub fn with_predecessor(mut self, id: NodeId) -> Self {
        self.add_predecessor(id);
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.add_tag(tag);
        self
    }

    pub fn add_choice(&mut self, choice: Choice) {
        self.choices.push(choice);
    }

    /// Remove the first choice whose action matches, case-insensitively.
    pub fn remove_choice(&mut self, action: &str) -> Option<Choice> {
        let index = self
            .choices
            .iter()
            .position(|c| c.action.eq_ignore_ascii_case(action))?;
        Some(self.choices.remove(index))
    }

    pub fn choice_by_action(&self, action: &str) -> Option<&Choice> {
        self.choices
            .iter()
            .find(|c| c.action.eq_ignore_ascii_case(action))
    }

    /// Choices whose condition holds for `player`, in declaration order.
    pub fn available_choices(&self, player: &Player) -> Vec<&Choice> {
        self.choices
            .iter()
            .filter(|c| c.is_available(player))
            .collect()
    }

    /// Record a predecessor. Duplicates are ignored.
    pub fn add_predecessor(&mut self, id: NodeId) {
        if !self.previous_node_ids.contains(&id) {
            self.previous_node_ids.push(id);
        }
    }

    pub fn previous_node_ids(&self) -> &[NodeId] {
        &self.previous_node_ids
    }

    pub fn add_tag(&mut self, tag: &str) {
        self.tags.insert(tag.to_lowercase());
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag.to_lowercase())
    }

    pub fn tags(&self) -> &FxHashSet<String> {
        &self.tags
    }

    /// Replace the node's text, keeping the very first text ever held.
    pub fn rewrite(&mut self, new_text: impl Into<String>, reason: impl Into<String>) {
        if self.original_text.is_none() {
            self.original_text = Some(std::mem::take(&mut self.text));
        }
        self.text = new_text.into();
        self.rewrite_count += 1;
        self.rewrite_history.push(RewriteRecord {
            reason: reason.into(),
            rewrite_number: self.rewrite_count,
        });
    }

    pub fn is_rewritten(&self) -> bool {
        self.rewrite_count > 0
    }

    pub fn original_text(&self) -> Option<&str> {
        self.original_text.as_deref()
    }

    pub fn rewrite_count(&self) -> u32 {
        self.rewrite_count
    }

    pub fn rewrite_history(&self) -> &[RewriteRecord] {
        &self.rewrite_history
    }

    /// A fresh node sharing this node's text, location and choices, with
    /// this node as its only predecessor.
    pub fn clone_as_successor(&self) -> StoryNode {
        let mut next = StoryNode::new(self.text.clone(), self.location.clone())
            .with_type(self.node_type)
            .with_choices(self.choices.clone())
            .with_predecessor(self.id);
        next.tags = self.tags.clone();
        next
    }
}
