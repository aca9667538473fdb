/// The story loop: Command → paradox check → resolution or advancement.
///
/// Owns the graph, player and history, and is the only thing that
/// mutates them.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::config::{ConfigError, EngineConfig};
use crate::core::generator::{EventOdds, StoryGenerator};
use crate::core::graph::StoryGraph;
use crate::core::history::HistoryTracker;
use crate::core::persist::StorySnapshot;
use crate::core::template::{TemplateError, TemplateSet};
use crate::schema::command::{Command, CommandParser, Verb};
use crate::schema::node::{Choice, NodeId, NodeType, StoryNode};
use crate::schema::paradox::{Paradox, ParadoxType};
use crate::schema::player::Player;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("current node {0} is not in the story graph")]
    MissingCurrentNode(NodeId),
}

const PICKUP_LINE: &str = "\n\nYou notice something interesting and pick it up.";

const HELP_TEXT: &str = "\
INFINITE STORY LOOP - HELP

MOVEMENT:
  go [direction]  - Move in a direction (north, south, east, west)

ACTIONS:
  look            - Examine your surroundings
  take [item]     - Pick up an item
  drop [item]     - Drop an item from your inventory
  use [item]      - Use an item
  talk [target]   - Talk to someone or something

SYSTEM:
  status / i      - View your status and inventory
  help / ?        - Show this help message
  map             - View story history and loops
  save            - Save your current game
  load            - Load a saved game
  quit / q        - Exit the game

TIPS:
  - Try different actions to explore the narrative
  - Contradictory actions may create paradoxes
  - The story rewrites itself to maintain continuity
  - Embrace the surreal and expect the unexpected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Story,
    System,
    Paradox,
    Quit,
    Save,
    Load,
    Error,
}

/// What the caller should show after one input. Text is raw; wrapping and
/// colouring are left to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub text: String,
    #[serde(default)]
    pub choices: Vec<String>,
    /// Set for `Paradox` responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paradox_type: Option<ParadoxType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    /// Set for `Story` responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Response {
    pub fn new(kind: ResponseKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            choices: Vec::new(),
            paradox_type: None,
            severity: None,
            location: None,
        }
    }

    pub fn is_paradox(&self) -> bool {
        self.kind == ResponseKind::Paradox
    }
}

/// The narrative state machine. Built via `StoryLoop::builder()`.
#[derive(Debug)]
pub struct StoryLoop {
    graph: StoryGraph,
    current_node_id: NodeId,
    player: Player,
    history: HistoryTracker,
    generator: StoryGenerator,
    config: EngineConfig,
    rng: StdRng,
    paradox_count: u32,
    rewrite_count: u32,
    last_paradox: Option<Paradox>,
}

/// Builder for constructing a `StoryLoop`.
#[derive(Default)]
pub struct StoryLoopBuilder {
    seed: Option<u64>,
    config: Option<EngineConfig>,
    config_path: Option<String>,
    templates: Option<TemplateSet>,
    templates_path: Option<String>,
    player: Option<Player>,
}

impl StoryLoopBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the config from a RON file, replacing any set directly.
    pub fn config_path(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    /// Provide templates directly (for testing without files).
    pub fn with_templates(mut self, templates: TemplateSet) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Merge a RON template pack over the base templates.
    pub fn templates_path(mut self, path: &str) -> Self {
        self.templates_path = Some(path.to_string());
        self
    }

    /// Start with this player instead of one made from the config.
    pub fn player(mut self, player: Player) -> Self {
        self.player = Some(player);
        self
    }

    fn prepare(&mut self) -> Result<(EngineConfig, StoryGenerator, StdRng), EngineError> {
        let config = match &self.config_path {
            Some(path) => EngineConfig::load_from_ron(Path::new(path))?,
            None => self.config.take().unwrap_or_default(),
        };
        config.validate()?;

        let mut templates = match self.templates.take() {
            Some(templates) => templates,
            None => TemplateSet::builtin()?,
        };
        if let Some(path) = &self.templates_path {
            templates.merge(TemplateSet::load_from_ron(Path::new(path))?);
        }
        templates.validate()?;

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let generator = StoryGenerator::new(templates, EventOdds::from(&config));
        Ok((config, generator, rng))
    }

    /// Build a new story, starting at the player's location.
    pub fn build(mut self) -> Result<StoryLoop, EngineError> {
        let (config, generator, mut rng) = self.prepare()?;
        let player = self
            .player
            .take()
            .unwrap_or_else(|| Player::new(config.player_name.clone(), config.start_location.clone()));

        let start = player.current_location().to_string();
        let intro = generator.generate_intro(&start, &mut rng);
        let start_id = random_node_id(&mut rng);
        let mut graph = StoryGraph::new();
        graph.add_node(
            StoryNode::new(intro, start.clone())
                .with_id(start_id)
                .with_choices(opening_choices()),
        );
        info!(location = %start, "story initialized");

        let history = HistoryTracker::new().with_horizon(config.contradiction_horizon);
        Ok(StoryLoop {
            graph,
            current_node_id: start_id,
            player,
            history,
            generator,
            config,
            rng,
            paradox_count: 0,
            rewrite_count: 0,
            last_paradox: None,
        })
    }

    /// Resume a story from a snapshot. Fails if the snapshot's current node
    /// is not in its graph.
    pub fn restore(mut self, snapshot: StorySnapshot) -> Result<StoryLoop, EngineError> {
        let (config, generator, rng) = self.prepare()?;
        if !snapshot.story_graph.contains(snapshot.current_node_id) {
            return Err(EngineError::MissingCurrentNode(snapshot.current_node_id));
        }
        let mut history = snapshot.history;
        history.set_horizon(config.contradiction_horizon);
        info!(
            nodes = snapshot.story_graph.len(),
            paradoxes = snapshot.paradox_count,
            "story restored"
        );
        Ok(StoryLoop {
            graph: snapshot.story_graph,
            current_node_id: snapshot.current_node_id,
            player: snapshot.player,
            history,
            generator,
            config,
            rng,
            paradox_count: snapshot.paradox_count,
            rewrite_count: snapshot.rewrite_count,
            last_paradox: None,
        })
    }
}

fn opening_choices() -> Vec<Choice> {
    vec![
        Choice::new("Walk towards the light", "go north"),
        Choice::new("Follow the shadows", "go south"),
        Choice::new("Listen to the whispers", "listen"),
        Choice::new("Question your existence", "think"),
    ]
}

fn random_node_id(rng: &mut StdRng) -> NodeId {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    NodeId::from_random_bytes(bytes)
}

/// Action template family for a command. Freeform input is keyed by its
/// first word so "listen" or "think" find their own text.
fn template_key(command: &Command) -> &str {
    match command.verb {
        Some(Verb::Freeform) => command
            .target
            .as_deref()
            .and_then(|t| t.split_whitespace().next())
            .unwrap_or("go"),
        Some(verb) => verb.as_str(),
        None => "go",
    }
}

impl StoryLoop {
    pub fn builder() -> StoryLoopBuilder {
        StoryLoopBuilder::default()
    }

    /// Parse raw input and process it.
    pub fn process_input(&mut self, input: &str) -> Response {
        self.process_command(CommandParser::parse(input))
    }

    /// Process one parsed command. System commands answer immediately;
    /// anything else either resolves a paradox or advances the story.
    pub fn process_command(&mut self, command: Command) -> Response {
        let Some(verb) = command.verb else {
            return Response::new(ResponseKind::Error, "The story waits for you to do something.");
        };
        if command.is_command {
            return self.handle_system_command(verb);
        }
        if let Some(paradox) = self.detect_paradox(&command) {
            return self.resolve_paradox(paradox);
        }
        self.advance_story(command)
    }

    fn handle_system_command(&self, verb: Verb) -> Response {
        match verb {
            Verb::Help => Response::new(ResponseKind::System, HELP_TEXT),
            Verb::Status => Response::new(ResponseKind::System, self.player.status_text()),
            Verb::Map => Response::new(ResponseKind::System, self.map_text()),
            Verb::Quit => Response::new(
                ResponseKind::Quit,
                "The story folds itself away, waiting for another time...",
            ),
            Verb::Save => Response::new(ResponseKind::Save, "Saving story state..."),
            Verb::Load => Response::new(ResponseKind::Load, "Loading story state..."),
            other => Response::new(ResponseKind::Error, format!("Unknown command: {}", other)),
        }
    }

    /// Check `command` against the paradox rules, in priority order:
    /// repeated verbs, repeated nodes, contradicting actions, using an
    /// item the player does not hold.
    pub fn detect_paradox(&self, command: &Command) -> Option<Paradox> {
        let trigger = command.original.as_str();

        if let Some(pattern) = self.player.detect_action_loop(self.config.action_loop_window) {
            return Some(
                Paradox::new(
                    ParadoxType::TemporalLoop,
                    format!(
                        "You find yourself repeating the same actions: {}",
                        pattern.join(", ")
                    ),
                    6,
                )
                .with_trigger(trigger)
                .with_metadata("loop_pattern", json!(pattern)),
            );
        }

        if let Some(nodes) = self.history.detect_node_loop(self.config.node_loop_window) {
            let ids: Vec<String> = nodes.iter().map(|id| id.to_string()).collect();
            return Some(
                Paradox::new(
                    ParadoxType::TemporalLoop,
                    "The story seems to be repeating itself...",
                    7,
                )
                .with_affected_nodes(nodes)
                .with_trigger(trigger)
                .with_metadata("node_pattern", json!(ids)),
            );
        }

        let action = command.action_text();
        if let Some(contradiction) = self
            .history
            .detect_contradiction(&action, command.target.as_deref())
        {
            let mut paradox = Paradox::new(
                ParadoxType::Contradiction,
                "Your action contradicts a previous choice...",
                8,
            )
            .with_trigger(trigger);
            paradox.metadata = contradiction.to_metadata();
            return Some(paradox);
        }

        if command.verb == Some(Verb::Use) {
            if let Some(item) = command.target.as_deref().filter(|t| !t.is_empty()) {
                if !self.player.has_item(item) {
                    return Some(
                        Paradox::new(
                            ParadoxType::ImpossibleState,
                            format!("You try to use {}, but you don't have it... or do you?", item),
                            5,
                        )
                        .with_trigger(trigger)
                        .with_metadata("missing_item", json!(item)),
                    );
                }
            }
        }

        None
    }

    /// Resolve a paradox: rewrite every affected node that still exists,
    /// then move to a new resolution node. The triggering action is not
    /// recorded on the player.
    pub fn resolve_paradox(&mut self, paradox: Paradox) -> Response {
        self.paradox_count += 1;
        warn!(
            paradox_type = %paradox.paradox_type,
            severity = paradox.severity(),
            count = self.paradox_count,
            "{}",
            paradox.description
        );

        let text = self
            .generator
            .generate_paradox_resolution(&paradox, &self.player, &mut self.rng);

        for id in &paradox.affected_nodes {
            self.rewrite_node(*id, paradox.paradox_type);
        }

        let id = random_node_id(&mut self.rng);
        let node = StoryNode::new(text, self.player.current_location())
            .with_id(id)
            .with_type(NodeType::Paradox)
            .with_predecessor(self.current_node_id)
            .with_choices(StoryGenerator::post_paradox_choices(paradox.paradox_type));
        let mut response = Response::new(ResponseKind::Paradox, node.text.clone());
        response.choices = node.choices.iter().map(|c| c.text.clone()).collect();
        response.paradox_type = Some(paradox.paradox_type);
        response.severity = Some(paradox.severity());

        self.graph.add_node(node);
        self.current_node_id = id;

        let mut metadata = HashMap::new();
        metadata.insert("paradox".to_string(), json!(paradox.description));
        let state = self.state_snapshot();
        self.history.add_entry(
            id,
            format!("paradox_resolution:{}", paradox.paradox_type),
            &state,
            metadata,
        );

        self.last_paradox = Some(paradox);
        response
    }

    /// Append a paradox annotation to a node. Missing nodes are skipped.
    fn rewrite_node(&mut self, id: NodeId, paradox_type: ParadoxType) -> bool {
        let Some(node) = self.graph.get_node_mut(id) else {
            debug!(node = %id.short(), "skipping rewrite of missing node");
            return false;
        };
        let annotation = match paradox_type {
            ParadoxType::TemporalLoop => {
                "[The narrative shifts subtly. This moment is different now, though you can't quite say how.]"
            }
            ParadoxType::Contradiction => {
                "[Reality rewrites itself. The contradiction resolves into a strange new truth that somehow makes sense.]"
            }
            _ => "[The story adjusts itself...]",
        };
        let new_text = format!("{}\n\n{}", node.text, annotation);
        node.rewrite(new_text, paradox_type.name());
        self.rewrite_count += 1;
        debug!(node = %id.short(), reason = %paradox_type, "node rewritten");
        true
    }

    fn advance_story(&mut self, command: Command) -> Response {
        self.player.record_choice(self.current_node_id, command.clone());

        let target = command.target.as_deref();
        let location = if command.verb == Some(Verb::Go) {
            let direction = CommandParser::direction(target);
            self.generator
                .location_for_direction(direction.as_deref(), &mut self.rng)
        } else {
            self.player.current_location().to_string()
        };

        let mut text = self.generator.generate_action_text(
            template_key(&command),
            target,
            &location,
            &mut self.rng,
        );
        let choices = self
            .generator
            .generate_choices(&location, &self.player, &mut self.rng);
        let granted = self.generator.roll_item_grant(&mut self.rng);
        if granted.is_some() {
            text.push_str(PICKUP_LINE);
        }

        let id = random_node_id(&mut self.rng);
        let mut node = StoryNode::new(text, location.clone())
            .with_id(id)
            .with_predecessor(self.current_node_id)
            .with_choices(choices);
        node.grants_items.extend(granted);
        let grants = node.grants_items.clone();

        self.graph.add_node(node);
        self.current_node_id = id;
        self.player.move_to(location.clone());
        for item in &grants {
            if self.player.add_item(item) {
                info!(item = %item, "player received item");
            }
        }

        let mut metadata = HashMap::new();
        metadata.insert(
            "verb".to_string(),
            command.verb.map_or(Value::Null, |v| json!(v.as_str())),
        );
        metadata.insert(
            "target".to_string(),
            command.target.as_ref().map_or(Value::Null, |t| json!(t)),
        );
        let state = self.state_snapshot();
        self.history
            .add_entry(id, command.original.clone(), &state, metadata);
        info!(location = %location, node = %id.short(), "story advanced");

        let mut response = Response::new(ResponseKind::Story, self.current_text());
        response.choices = self.current_choices();
        response.location = Some(location);
        response
    }

    /// State hashed into history: location, sorted inventory, current node
    /// and number of choices made.
    fn state_snapshot(&self) -> Value {
        let mut inventory = self.player.inventory().to_vec();
        inventory.sort();
        json!({
            "location": self.player.current_location(),
            "inventory": inventory,
            "node_id": self.current_node_id,
            "choice_count": self.player.choice_history().len(),
        })
    }

    pub fn current_node(&self) -> Option<&StoryNode> {
        self.graph.get_node(self.current_node_id)
    }

    pub fn current_node_id(&self) -> NodeId {
        self.current_node_id
    }

    pub fn current_text(&self) -> String {
        self.current_node()
            .map(|n| n.text.clone())
            .unwrap_or_else(|| "The story has not yet begun...".to_string())
    }

    /// Choices at the current node the player can take right now.
    pub fn available_choices(&self) -> Vec<&Choice> {
        self.current_node()
            .map(|n| n.available_choices(&self.player))
            .unwrap_or_default()
    }

    pub fn current_choices(&self) -> Vec<String> {
        self.available_choices()
            .into_iter()
            .map(|c| c.text.clone())
            .collect()
    }

    pub fn graph(&self) -> &StoryGraph {
        &self.graph
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn history(&self) -> &HistoryTracker {
        &self.history
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn paradox_count(&self) -> u32 {
        self.paradox_count
    }

    pub fn rewrite_count(&self) -> u32 {
        self.rewrite_count
    }

    /// Most recent paradox handled in this session.
    pub fn last_paradox(&self) -> Option<&Paradox> {
        self.last_paradox.as_ref()
    }

    pub fn help_text() -> &'static str {
        HELP_TEXT
    }

    pub fn map_text(&self) -> String {
        let mut visited: Vec<&String> = self.player.visited_locations().iter().collect();
        visited.sort();

        let mut lines = vec!["STORY MAP".to_string(), String::new(), "VISITED LOCATIONS:".to_string()];
        for location in visited {
            let marker = if location == self.player.current_location() {
                "→"
            } else {
                " "
            };
            lines.push(format!("  {} {}", marker, location));
        }
        lines.push(String::new());
        lines.push("STATISTICS:".to_string());
        lines.push(format!("  Choices made: {}", self.player.choice_history().len()));
        lines.push(format!("  Paradoxes encountered: {}", self.paradox_count));
        lines.push(format!("  Story rewrites: {}", self.rewrite_count));
        lines.push(format!("  Story nodes created: {}", self.graph.len()));
        lines.join("\n")
    }

    /// Full copy of the persistent state.
    pub fn snapshot(&self) -> StorySnapshot {
        StorySnapshot {
            story_graph: self.graph.clone(),
            current_node_id: self.current_node_id,
            player: self.player.clone(),
            history: self.history.clone(),
            paradox_count: self.paradox_count,
            rewrite_count: self.rewrite_count,
        }
    }
}
