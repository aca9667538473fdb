use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::node::NodeId;

/// Kinds of narrative paradox. `NarrativeBreak` and `CausalParadox` are
/// part of the vocabulary but nothing raises them yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParadoxType {
    TemporalLoop,
    Contradiction,
    ImpossibleState,
    NarrativeBreak,
    CausalParadox,
}

impl ParadoxType {
    /// Stable upper-snake name, used as rewrite reason and template key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TemporalLoop => "TEMPORAL_LOOP",
            Self::Contradiction => "CONTRADICTION",
            Self::ImpossibleState => "IMPOSSIBLE_STATE",
            Self::NarrativeBreak => "NARRATIVE_BREAK",
            Self::CausalParadox => "CAUSAL_PARADOX",
        }
    }
}

impl std::fmt::Display for ParadoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A detected paradox. Severity is always in `1..=10`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParadox")]
pub struct Paradox {
    pub paradox_type: ParadoxType,
    pub description: String,
    pub affected_nodes: Vec<NodeId>,
    pub trigger_action: String,
    severity: u8,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct RawParadox {
    paradox_type: ParadoxType,
    description: String,
    #[serde(default)]
    affected_nodes: Vec<NodeId>,
    #[serde(default)]
    trigger_action: String,
    severity: u8,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

impl TryFrom<RawParadox> for Paradox {
    type Error = String;

    fn try_from(raw: RawParadox) -> Result<Self, Self::Error> {
        if !(1..=10).contains(&raw.severity) {
            return Err(format!(
                "paradox severity must be in 1..=10, got {}",
                raw.severity
            ));
        }
        Ok(Self {
            paradox_type: raw.paradox_type,
            description: raw.description,
            affected_nodes: raw.affected_nodes,
            trigger_action: raw.trigger_action,
            severity: raw.severity,
            metadata: raw.metadata,
        })
    }
}

impl Paradox {
    /// # Panics
    ///
    /// Panics if `severity` is outside `1..=10`.
    pub fn new(paradox_type: ParadoxType, description: impl Into<String>, severity: u8) -> Self {
        assert!(
            (1..=10).contains(&severity),
            "paradox severity must be in 1..=10, got {}",
            severity
        );
        Self {
            paradox_type,
            description: description.into(),
            affected_nodes: Vec::new(),
            trigger_action: String::new(),
            severity,
            metadata: HashMap::new(),
        }
    }

    pub fn with_affected_nodes(mut self, nodes: Vec<NodeId>) -> Self {
        self.affected_nodes = nodes;
        self
    }

    pub fn with_trigger(mut self, action: impl Into<String>) -> Self {
        self.trigger_action = action.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn severity(&self) -> u8 {
        self.severity
    }

    /// String-valued metadata entry, if present.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}
