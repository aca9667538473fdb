/// Append-only story history with loop and contradiction detection.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::schema::node::NodeId;

/// Entries scanned backwards when looking for a contradiction.
pub const DEFAULT_CONTRADICTION_HORIZON: usize = 20;

/// One step of history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub node_id: NodeId,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub state_hash: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl HistoryEntry {
    /// The `target` recorded in metadata, if any.
    pub fn target(&self) -> Option<&str> {
        self.metadata.get("target").and_then(|v| v.as_str())
    }
}

/// How a contradiction rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    /// Both actions must name the same non-empty target.
    SameTarget,
    /// The opposing action anywhere in the horizon is enough.
    Sequence,
}

/// A pair of mutually contradicting action prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContradictionRule {
    pub first: &'static str,
    pub second: &'static str,
    pub scope: RuleScope,
}

impl ContradictionRule {
    pub const fn new(first: &'static str, second: &'static str, scope: RuleScope) -> Self {
        Self {
            first,
            second,
            scope,
        }
    }

    /// The prefix opposing `action`, if `action` starts with either side.
    fn opposite(&self, action: &str) -> Option<&'static str> {
        if action.starts_with(self.first) {
            Some(self.second)
        } else if action.starts_with(self.second) {
            Some(self.first)
        } else {
            None
        }
    }
}

pub const CONTRADICTION_RULES: [ContradictionRule; 5] = [
    ContradictionRule::new("take", "drop", RuleScope::SameTarget),
    ContradictionRule::new("open", "close", RuleScope::SameTarget),
    ContradictionRule::new("go north", "go south", RuleScope::Sequence),
    ContradictionRule::new("go east", "go west", RuleScope::Sequence),
    ContradictionRule::new("attack", "talk", RuleScope::SameTarget),
];

/// A detected contradiction between the current action and an earlier one.
#[derive(Debug, Clone, PartialEq)]
pub struct Contradiction {
    pub scope: RuleScope,
    pub current_action: String,
    pub previous_action: String,
    pub target: Option<String>,
    pub rule: ContradictionRule,
}

impl Contradiction {
    /// Flatten into paradox metadata. `old_state`/`new_state` carry the
    /// previous and current actions for resolution templates.
    pub fn to_metadata(&self) -> HashMap<String, Value> {
        let kind = match self.scope {
            RuleScope::SameTarget => "contradiction",
            RuleScope::Sequence => "sequence_contradiction",
        };
        let mut metadata = HashMap::new();
        metadata.insert("type".into(), Value::from(kind));
        metadata.insert("current_action".into(), Value::from(self.current_action.clone()));
        metadata.insert("previous_action".into(), Value::from(self.previous_action.clone()));
        metadata.insert(
            "rule".into(),
            Value::from(vec![self.rule.first, self.rule.second]),
        );
        if let Some(target) = &self.target {
            metadata.insert("target".into(), Value::from(target.clone()));
        }
        metadata.insert("old_state".into(), Value::from(self.previous_action.clone()));
        metadata.insert("new_state".into(), Value::from(self.current_action.clone()));
        metadata
    }
}

/// Deterministic digest of a JSON state value. Object keys are sorted at
/// every depth; array order is significant.
pub fn hash_state(state: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(state, &mut canonical);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Ordered history plus the set of every state hash it contains.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawHistory")]
pub struct HistoryTracker {
    entries: Vec<HistoryEntry>,
    #[serde(skip)]
    state_hashes: FxHashSet<String>,
    #[serde(skip)]
    horizon: usize,
}

#[derive(Deserialize)]
struct RawHistory {
    #[serde(default)]
    entries: Vec<HistoryEntry>,
}

impl From<RawHistory> for HistoryTracker {
    fn from(raw: RawHistory) -> Self {
        let state_hashes = raw.entries.iter().map(|e| e.state_hash.clone()).collect();
        Self {
            entries: raw.entries,
            state_hashes,
            horizon: DEFAULT_CONTRADICTION_HORIZON,
        }
    }
}

impl Default for HistoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for HistoryTracker {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl HistoryTracker {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            state_hashes: FxHashSet::default(),
            horizon: DEFAULT_CONTRADICTION_HORIZON,
        }
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn set_horizon(&mut self, horizon: usize) {
        self.horizon = horizon;
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn add_entry(
        &mut self,
        node_id: NodeId,
        action: impl Into<String>,
        state: &Value,
        metadata: HashMap<String, Value>,
    ) -> &HistoryEntry {
        let state_hash = hash_state(state);
        self.state_hashes.insert(state_hash.clone());
        self.entries.push(HistoryEntry {
            node_id,
            action: action.into(),
            timestamp: Utc::now(),
            state_hash,
            metadata,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.state_hashes.clear();
    }

    pub fn has_seen(&self, state: &Value) -> bool {
        self.state_hashes.contains(&hash_state(state))
    }

    /// Index of the first entry recorded in exactly this state.
    pub fn detect_loop(&self, state: &Value) -> Option<usize> {
        let hash = hash_state(state);
        if !self.state_hashes.contains(&hash) {
            return None;
        }
        self.entries.iter().position(|e| e.state_hash == hash)
    }

    /// Shortest repeating run of node ids at the end of history.
    ///
    /// For each length `L` in `2..=window/2`, compares the last `L` node
    /// ids against the `L` before them. Needs at least `window` entries.
    pub fn detect_node_loop(&self, window: usize) -> Option<Vec<NodeId>> {
        if window < 4 || self.entries.len() < window {
            return None;
        }
        let recent: Vec<NodeId> = self.entries[self.entries.len() - window..]
            .iter()
            .map(|e| e.node_id)
            .collect();

        (2..=window / 2).find_map(|len| {
            let tail = &recent[recent.len() - len..];
            let before = &recent[recent.len() - len * 2..recent.len() - len];
            (tail == before).then(|| tail.to_vec())
        })
    }

    /// First contradiction between `action` and an entry within the horizon.
    pub fn detect_contradiction(&self, action: &str, target: Option<&str>) -> Option<Contradiction> {
        let action = action.to_lowercase();
        let target = target.map(str::to_lowercase).filter(|t| !t.is_empty());
        let start = self.entries.len().saturating_sub(self.horizon);
        let window = &self.entries[start..];

        for rule in CONTRADICTION_RULES.iter() {
            let Some(opposite) = rule.opposite(&action) else {
                continue;
            };
            for entry in window.iter().rev() {
                let previous = entry.action.to_lowercase();
                if !previous.starts_with(opposite) {
                    continue;
                }
                match rule.scope {
                    RuleScope::SameTarget => {
                        let previous_target = entry
                            .target()
                            .map(str::to_lowercase)
                            .filter(|t| !t.is_empty());
                        if target.is_some() && target == previous_target {
                            return Some(Contradiction {
                                scope: RuleScope::SameTarget,
                                current_action: action,
                                previous_action: entry.action.clone(),
                                target,
                                rule: *rule,
                            });
                        }
                    }
                    RuleScope::Sequence => {
                        return Some(Contradiction {
                            scope: RuleScope::Sequence,
                            current_action: action,
                            previous_action: entry.action.clone(),
                            target,
                            rule: *rule,
                        });
                    }
                }
            }
        }
        None
    }

    /// Actions of the last `n` entries, oldest first.
    pub fn get_recent_actions(&self, n: usize) -> Vec<&str> {
        let start = self.entries.len().saturating_sub(n);
        self.entries[start..].iter().map(|e| e.action.as_str()).collect()
    }

    pub fn get_visited_nodes(&self) -> FxHashSet<NodeId> {
        self.entries.iter().map(|e| e.node_id).collect()
    }

    pub fn get_node_visit_count(&self, id: NodeId) -> usize {
        self.entries.iter().filter(|e| e.node_id == id).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target_meta(target: &str) -> HashMap<String, Value> {
        let mut meta = HashMap::new();
        meta.insert("target".to_string(), json!(target));
        meta
    }

    #[test]
    fn hash_ignores_key_order() {
        let a = json!({"location": "void", "inventory": ["key"], "n": 1});
        let b = json!({"n": 1, "inventory": ["key"], "location": "void"});
        assert_eq!(hash_state(&a), hash_state(&b));
        assert_eq!(hash_state(&a).len(), 64);
    }

    #[test]
    fn hash_respects_list_order() {
        let a = json!({"inventory": ["key", "orb"]});
        let b = json!({"inventory": ["orb", "key"]});
        assert_ne!(hash_state(&a), hash_state(&b));
    }

    #[test]
    fn detect_loop_returns_first_index() {
        let mut history = HistoryTracker::new();
        let s1 = json!({"location": "a", "choices": 0});
        let s2 = json!({"location": "b", "choices": 1});
        history.add_entry(NodeId::new(), "look", &s1, HashMap::new());
        history.add_entry(NodeId::new(), "go", &s2, HashMap::new());
        history.add_entry(NodeId::new(), "look", &s1, HashMap::new());

        let reordered = json!({"choices": 0, "location": "a"});
        assert_eq!(history.detect_loop(&reordered), Some(0));
        assert_eq!(history.detect_loop(&json!({"location": "c"})), None);
        assert!(history.has_seen(&s2));
    }

    #[test]
    fn node_loop_found() {
        let mut history = HistoryTracker::new();
        let ids = [NodeId::new(), NodeId::new(), NodeId::new()];
        for id in ids.iter().chain(ids.iter()) {
            history.add_entry(*id, "look", &json!({}), HashMap::new());
        }
        assert_eq!(history.detect_node_loop(6), Some(ids.to_vec()));
    }

    #[test]
    fn node_loop_absent_for_distinct_nodes() {
        let mut history = HistoryTracker::new();
        for _ in 0..6 {
            history.add_entry(NodeId::new(), "look", &json!({}), HashMap::new());
        }
        assert_eq!(history.detect_node_loop(6), None);
    }

    #[test]
    fn node_loop_needs_full_window() {
        let mut history = HistoryTracker::new();
        let (a, b) = (NodeId::new(), NodeId::new());
        for id in [a, b, a, b] {
            history.add_entry(id, "look", &json!({}), HashMap::new());
        }
        assert_eq!(history.detect_node_loop(10), None);
        assert_eq!(history.detect_node_loop(4), Some(vec![a, b]));
    }

    #[test]
    fn same_target_contradiction() {
        let mut history = HistoryTracker::new();
        history.add_entry(NodeId::new(), "take sword", &json!({}), target_meta("sword"));

        let found = history.detect_contradiction("drop sword", Some("sword")).unwrap();
        assert_eq!(found.scope, RuleScope::SameTarget);
        assert_eq!(found.previous_action, "take sword");
        assert_eq!(found.target.as_deref(), Some("sword"));

        assert!(history.detect_contradiction("take shield", Some("shield")).is_none());
        assert!(history.detect_contradiction("drop shield", Some("shield")).is_none());
    }

    #[test]
    fn same_target_needs_targets() {
        let mut history = HistoryTracker::new();
        history.add_entry(NodeId::new(), "open", &json!({}), HashMap::new());
        assert!(history.detect_contradiction("close", None).is_none());
    }

    #[test]
    fn sequence_contradiction_ignores_target() {
        let mut history = HistoryTracker::new();
        history.add_entry(NodeId::new(), "go north", &json!({}), HashMap::new());
        let found = history.detect_contradiction("Go South", None).unwrap();
        assert_eq!(found.scope, RuleScope::Sequence);
        assert_eq!(found.current_action, "go south");

        let meta = found.to_metadata();
        assert_eq!(meta["type"], json!("sequence_contradiction"));
        assert_eq!(meta["old_state"], json!("go north"));
        assert_eq!(meta["new_state"], json!("go south"));
    }

    #[test]
    fn contradiction_horizon_forgets_old_entries() {
        let mut history = HistoryTracker::new().with_horizon(3);
        history.add_entry(NodeId::new(), "go east", &json!({}), HashMap::new());
        for _ in 0..3 {
            history.add_entry(NodeId::new(), "look", &json!({}), HashMap::new());
        }
        assert!(history.detect_contradiction("go west", None).is_none());
        history.set_horizon(4);
        assert!(history.detect_contradiction("go west", None).is_some());
    }

    #[test]
    fn read_projections() {
        let mut history = HistoryTracker::new();
        let a = NodeId::new();
        history.add_entry(a, "look", &json!({}), HashMap::new());
        history.add_entry(NodeId::new(), "go north", &json!({}), HashMap::new());
        history.add_entry(a, "listen", &json!({}), HashMap::new());

        assert_eq!(history.get_recent_actions(2), vec!["go north", "listen"]);
        assert_eq!(history.get_recent_actions(10).len(), 3);
        assert_eq!(history.get_visited_nodes().len(), 2);
        assert_eq!(history.get_node_visit_count(a), 2);

        history.clear();
        assert!(history.is_empty());
        assert!(!history.has_seen(&json!({})));
    }

    #[test]
    fn restore_rebuilds_hash_set() {
        let mut history = HistoryTracker::new();
        let state = json!({"location": "the garden"});
        history.add_entry(NodeId::new(), "look", &state, target_meta("flowers"));

        let json = serde_json::to_string(&history).unwrap();
        let back: HistoryTracker = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
        assert_eq!(back.detect_loop(&state), Some(0));
        assert_eq!(back.entries()[0].target(), Some("flowers"));
    }
}
