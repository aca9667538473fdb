/// Template pack tests: the built-in pack and RON overlays.

use infinite_story::core::generator::{EventOdds, StoryGenerator};
use infinite_story::core::template::{TemplateError, TemplateSet};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

#[test]
fn builtin_pack_is_clean() {
    let templates = TemplateSet::builtin().unwrap();
    templates.validate().unwrap();
    assert!(templates.unknown_fields().is_empty());
    assert!(templates.undescribed_destinations().is_empty());

    assert_eq!(templates.intro.len(), 3);
    assert_eq!(templates.paradox_resolution["default"].len(), 3);
    assert_eq!(templates.loop_break.len(), 3);
    assert!(templates.items.contains(&"ancient map".to_string()));
}

#[test]
fn overlay_merges_over_builtin() {
    let mut templates = TemplateSet::builtin().unwrap();
    let overlay = TemplateSet::load_from_ron(Path::new("tests/fixtures/clockwork.ron")).unwrap();
    assert!(overlay.validate().is_err());

    templates.merge(overlay);
    templates.validate().unwrap();

    assert_eq!(templates.intro.len(), 1);
    assert_eq!(templates.directions["north"], vec!["the gearworks".to_string()]);
    assert!(templates.directions.contains_key("south"));
    assert!(templates.actions.contains_key("whistle"));
    assert!(templates.actions.contains_key("go"));
    assert!(templates.locations.contains_key("the gearworks"));
    assert!(templates.locations.contains_key("the library"));
}

#[test]
fn unknown_field_is_reported() {
    let templates = TemplateSet::load_from_ron(Path::new("tests/fixtures/broken_field.ron")).unwrap();
    assert_eq!(
        templates.unknown_fields(),
        vec![("intro".to_string(), "trinket".to_string())]
    );
}

#[test]
fn partial_pack_names_missing_section() {
    let templates = TemplateSet::parse_ron("(intro: [\"Hello, {location}.\"])").unwrap();
    match templates.validate() {
        Err(TemplateError::MissingSection(section)) => {
            assert_eq!(section, "paradox_resolution.default");
        }
        other => panic!("expected missing section, got {:?}", other),
    }
}

#[test]
fn unbalanced_template_fails_to_parse() {
    let result = TemplateSet::parse_ron("(intro: [\"You stand in {location.\"])");
    assert!(matches!(result, Err(TemplateError::Parse(_))));
}

#[test]
fn generator_uses_overlay_locations() {
    let mut templates = TemplateSet::builtin().unwrap();
    templates.merge(TemplateSet::load_from_ron(Path::new("tests/fixtures/clockwork.ron")).unwrap());
    let generator = StoryGenerator::new(templates, EventOdds::never());
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..5 {
        assert_eq!(
            generator.location_for_direction(Some("north"), &mut rng),
            "the gearworks"
        );
    }
    let text = generator.generate_action_text("whistle", None, "the gearworks", &mut rng);
    assert_eq!(
        text,
        "You whistle, and somewhere in the gearworks a spring uncoils in answer."
    );
}
