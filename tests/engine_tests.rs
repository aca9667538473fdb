/// Engine integration tests: scripted sessions through the public API.

use infinite_story::core::config::EngineConfig;
use infinite_story::core::engine::{ResponseKind, StoryLoop};
use infinite_story::schema::node::{NodeId, StoryNode};
use infinite_story::schema::paradox::ParadoxType;
use serde_json::json;
use std::collections::HashMap;

fn quiet_config() -> EngineConfig {
    EngineConfig {
        resolution_surreal_chance: 0.0,
        loop_break_surreal_chance: 0.0,
        advance_surreal_chance: 0.0,
        item_grant_chance: 0.0,
        ..EngineConfig::default()
    }
}

fn game(seed: u64) -> StoryLoop {
    StoryLoop::builder()
        .seed(seed)
        .config(quiet_config())
        .build()
        .unwrap()
}

#[test]
fn help_is_a_system_response() {
    let mut game = game(1);
    let before = game.current_node_id();

    let response = game.process_input("help");
    assert_eq!(response.kind, ResponseKind::System);
    assert_eq!(response.text, StoryLoop::help_text());
    assert_eq!(game.current_node_id(), before);
    assert!(game.history().is_empty());
}

#[test]
fn go_north_advances_to_a_northern_location() {
    let mut game = game(2);
    let start = game.current_node_id();

    let response = game.process_input("go north");
    assert_eq!(response.kind, ResponseKind::Story);
    assert_ne!(game.current_node_id(), start);
    assert_eq!(game.graph().len(), 2);

    let location = response.location.unwrap();
    assert!(["the library", "the clock tower", "the void"].contains(&location.as_str()));
    assert_eq!(game.player().current_location(), location);
    assert!(game.player().has_visited("the beginning"));
    assert_eq!(game.player().choice_history(), &[start]);
    assert_eq!(game.history().len(), 1);
}

#[test]
fn walking_back_and_forth_causes_paradoxes() {
    let mut game = game(3);
    let mut paradoxes = Vec::new();
    for _ in 0..4 {
        for input in ["go north", "go south"] {
            let response = game.process_input(input);
            if response.is_paradox() {
                paradoxes.push(response.paradox_type.unwrap());
            }
        }
    }

    assert!(game.paradox_count() >= 1);
    assert_eq!(game.paradox_count() as usize, paradoxes.len());
    assert_eq!(paradoxes[0], ParadoxType::Contradiction);
}

#[test]
fn using_a_missing_item_is_impossible() {
    let mut game = game(4);
    let response = game.process_input("use silver compass");

    assert_eq!(response.kind, ResponseKind::Paradox);
    assert_eq!(response.paradox_type, Some(ParadoxType::ImpossibleState));
    assert_eq!(response.severity, Some(5));

    let paradox = game.last_paradox().unwrap();
    assert_eq!(paradox.metadata_str("missing_item"), Some("silver compass"));
    // The attempt is not recorded as a player action.
    assert!(game.player().action_history().is_empty());
}

#[test]
fn take_then_drop_contradicts_on_same_item() {
    let mut game = game(5);
    assert_eq!(game.process_input("take lantern").kind, ResponseKind::Story);

    let response = game.process_input("drop lantern");
    assert_eq!(response.paradox_type, Some(ParadoxType::Contradiction));
    assert_eq!(response.severity, Some(8));

    let paradox = game.last_paradox().unwrap();
    assert_eq!(paradox.metadata_str("type"), Some("contradiction"));
    assert_eq!(paradox.metadata_str("target"), Some("lantern"));
}

#[test]
fn dropping_something_else_is_fine() {
    let mut game = game(6);
    game.process_input("take lantern");
    let response = game.process_input("drop feather");
    assert_eq!(response.kind, ResponseKind::Story);
    assert_eq!(game.paradox_count(), 0);
}

#[test]
fn node_loop_in_restored_history_rewrites_the_loop() {
    let game = game(7);
    let mut snapshot = game.snapshot();

    let a = NodeId::from_random_bytes([1; 16]);
    let b = NodeId::from_random_bytes([2; 16]);
    snapshot
        .story_graph
        .add_node(StoryNode::new("A quiet hallway.", "the hallway").with_id(a));
    snapshot
        .story_graph
        .add_node(StoryNode::new("A quieter hallway.", "the hallway").with_id(b));
    for i in 0..10 {
        let id = if i % 2 == 0 { a } else { b };
        snapshot
            .history
            .add_entry(id, "look", &json!({ "step": i }), HashMap::new());
    }

    let mut game = StoryLoop::builder()
        .seed(7)
        .config(quiet_config())
        .restore(snapshot)
        .unwrap();
    let response = game.process_input("look");

    assert_eq!(response.paradox_type, Some(ParadoxType::TemporalLoop));
    assert_eq!(response.severity, Some(7));
    assert_eq!(game.last_paradox().unwrap().affected_nodes, vec![a, b]);
    assert_eq!(game.rewrite_count(), 2);

    let rewritten = game.graph().get_node(a).unwrap();
    assert!(rewritten.is_rewritten());
    assert_eq!(rewritten.original_text(), Some("A quiet hallway."));
    assert_eq!(rewritten.rewrite_history()[0].reason, "TEMPORAL_LOOP");
}

#[test]
fn repeated_looking_is_an_action_loop() {
    let mut game = game(8);
    for _ in 0..10 {
        assert_eq!(game.process_input("look").kind, ResponseKind::Story);
    }

    let response = game.process_input("look");
    assert_eq!(response.paradox_type, Some(ParadoxType::TemporalLoop));
    assert_eq!(response.severity, Some(6));

    // The verb history is unchanged, so the loop is still there.
    let again = game.process_input("look");
    assert_eq!(again.paradox_type, Some(ParadoxType::TemporalLoop));
    assert_eq!(again.severity, Some(6));
    assert_eq!(game.paradox_count(), 2);
}

#[test]
fn overlay_templates_change_the_world() {
    let mut game = StoryLoop::builder()
        .seed(9)
        .config(quiet_config())
        .templates_path("tests/fixtures/clockwork.ron")
        .build()
        .unwrap();
    assert!(game.current_text().starts_with("Gears turn overhead in"));

    let response = game.process_input("go north");
    assert_eq!(response.location.as_deref(), Some("the gearworks"));

    let response = game.process_input("whistle");
    assert_eq!(response.kind, ResponseKind::Story);
    assert!(response.text.contains("a spring uncoils"));
}

#[test]
fn missing_config_file_fails_to_build() {
    let result = StoryLoop::builder()
        .config_path("tests/fixtures/does_not_exist.ron")
        .build();
    assert!(result.is_err());
}

#[test]
fn seeded_sessions_replay_identically() {
    let script = ["go north", "look", "take candle", "go east", "talk stranger"];
    let play = || {
        let mut game = game(10);
        let texts: Vec<String> = script.iter().map(|s| game.process_input(s).text).collect();
        (texts, game.current_node_id())
    };
    assert_eq!(play(), play());
}
