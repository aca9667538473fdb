/// Story text and choice synthesis from the template pack.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::config::EngineConfig;
use crate::core::template::{Fields, Template, TemplateError, TemplateSet};
use crate::schema::node::{Choice, ChoiceCondition};
use crate::schema::paradox::{Paradox, ParadoxType};
use crate::schema::player::{Player, DEFAULT_START_LOCATION};

const CARDINALS: [&str; 4] = ["north", "south", "east", "west"];

const RESOLUTION: &str = "both states exist in superposition until observed";

/// The map choice only shows once the player holds this item.
pub const MAP_ITEM: &str = "ancient map";

/// Probabilities of the optional flourishes added to generated text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventOdds {
    pub resolution_surreal: f64,
    pub loop_break_surreal: f64,
    pub advance_surreal: f64,
    pub item_grant: f64,
}

impl Default for EventOdds {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EventOdds {
    fn from(config: &EngineConfig) -> Self {
        Self {
            resolution_surreal: config.resolution_surreal_chance,
            loop_break_surreal: config.loop_break_surreal_chance,
            advance_surreal: config.advance_surreal_chance,
            item_grant: config.item_grant_chance,
        }
    }
}

impl EventOdds {
    /// Odds with every random flourish switched off.
    pub fn never() -> Self {
        Self {
            resolution_surreal: 0.0,
            loop_break_surreal: 0.0,
            advance_surreal: 0.0,
            item_grant: 0.0,
        }
    }
}

/// Produces narrative strings and choice sets. Holds no story state; all
/// randomness comes from the caller's RNG.
#[derive(Debug, Clone)]
pub struct StoryGenerator {
    templates: TemplateSet,
    odds: EventOdds,
}

impl StoryGenerator {
    pub fn new(templates: TemplateSet, odds: EventOdds) -> Self {
        Self { templates, odds }
    }

    /// Generator over the built-in pack with default odds.
    pub fn builtin() -> Result<Self, TemplateError> {
        Ok(Self::new(TemplateSet::builtin()?, EventOdds::default()))
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn odds(&self) -> EventOdds {
        self.odds
    }

    /// Known locations in name order.
    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.templates.locations.keys().map(String::as_str)
    }

    pub fn location_description(&self, location: &str) -> Option<&str> {
        self.templates.locations.get(location).map(String::as_str)
    }

    pub fn generate_intro(&self, location: &str, rng: &mut StdRng) -> String {
        let description = self
            .location_description(location)
            .map(str::to_string)
            .unwrap_or_else(|| format!("a place called {}", location));
        let mut fields = Fields::new();
        fields.insert("location", &description);
        pick(&self.templates.intro, rng)
            .map(|t| t.render(&fields))
            .unwrap_or_else(|| description.clone())
    }

    /// Resolution text for `paradox`. Draws from the shared `default`
    /// templates plus any keyed by the paradox type.
    pub fn generate_paradox_resolution(
        &self,
        paradox: &Paradox,
        player: &Player,
        rng: &mut StdRng,
    ) -> String {
        let candidates: Vec<&Template> = ["default", paradox.paradox_type.name()]
            .iter()
            .filter_map(|key| self.templates.paradox_resolution.get(*key))
            .flatten()
            .collect();

        let mut fields = Fields::new();
        fields.insert("contradiction", &paradox.trigger_action);
        fields.insert("resolution", RESOLUTION);
        fields.insert("location", player.current_location());
        for key in ["old_state", "new_state", "missing_item"] {
            if let Some(value) = paradox.metadata_str(key) {
                fields.insert(key, value);
            }
        }

        let text = candidates
            .choose(rng)
            .map(|t| t.render(&fields))
            .unwrap_or_else(|| paradox.description.clone());
        self.with_surreal(text, self.odds.resolution_surreal, rng)
    }

    pub fn generate_loop_break(&self, rng: &mut StdRng) -> String {
        let text = pick(&self.templates.loop_break, rng)
            .map(|t| t.render(&Fields::new()))
            .unwrap_or_default();
        self.with_surreal(text, self.odds.loop_break_surreal, rng)
    }

    /// Two to four distinct compass moves, a location-specific action, the
    /// map (only usable while holding it), and "Look around".
    pub fn generate_choices(&self, location: &str, _player: &Player, rng: &mut StdRng) -> Vec<Choice> {
        let count = rng.gen_range(2..=CARDINALS.len());
        let mut choices: Vec<Choice> = CARDINALS
            .choose_multiple(rng, count)
            .map(|dir| Choice::new(format!("Go {}", dir), format!("go {}", dir)))
            .collect();

        if location.contains("library") {
            choices.push(Choice::new("Read a book", "read book"));
        } else if location.contains("market") {
            choices.push(Choice::new("Browse the wares", "browse"));
        } else if location.contains("mirror") {
            choices.push(Choice::new("Touch the mirror", "touch mirror"));
        }

        choices.push(
            Choice::new("Consult the ancient map", "consult map")
                .with_condition(ChoiceCondition::HasItem(MAP_ITEM.to_string())),
        );
        choices.push(Choice::new("Look around", "look"));
        choices
    }

    /// Fixed follow-up choices offered after a paradox resolves.
    pub fn post_paradox_choices(paradox_type: ParadoxType) -> Vec<Choice> {
        let mut choices = vec![
            Choice::new("Accept the new reality", "accept"),
            Choice::new("Question what just happened", "question"),
        ];
        match paradox_type {
            ParadoxType::TemporalLoop => {
                choices.push(Choice::new("Try to break the cycle", "break cycle"))
            }
            ParadoxType::Contradiction => {
                choices.push(Choice::new("Embrace the contradiction", "embrace"))
            }
            _ => {}
        }
        choices.push(Choice::new("Move on", "go forward"));
        choices
    }

    /// Scene text for an action. Unknown keys use the `go` family.
    pub fn generate_action_text(
        &self,
        key: &str,
        target: Option<&str>,
        location: &str,
        rng: &mut StdRng,
    ) -> String {
        let family = self
            .templates
            .actions
            .get(key)
            .or_else(|| self.templates.actions.get("go"));

        let title = title_case(location);
        let description = capitalize(self.location_description(location).unwrap_or(location));
        let mut fields = Fields::new();
        fields.insert("location", location);
        fields.insert("location_title", &title);
        fields.insert("location_description", &description);
        if let Some(target) = target {
            fields.insert("target", target);
        }

        let text = family
            .and_then(|templates| pick(templates, rng))
            .map(|t| t.render(&fields))
            .unwrap_or_else(|| format!("You find yourself in {}.", location));
        self.with_surreal(text, self.odds.advance_surreal, rng)
    }

    /// A destination for `direction`, or any known location when the
    /// direction leads nowhere in particular.
    pub fn location_for_direction(&self, direction: Option<&str>, rng: &mut StdRng) -> String {
        if let Some(destinations) = direction.and_then(|d| self.templates.directions.get(d)) {
            if let Some(location) = destinations.choose(rng) {
                return location.clone();
            }
        }
        let all: Vec<&str> = self.locations().collect();
        all.choose(rng)
            .map(|l| l.to_string())
            .unwrap_or_else(|| DEFAULT_START_LOCATION.to_string())
    }

    /// Occasionally hand out an item.
    pub fn roll_item_grant(&self, rng: &mut StdRng) -> Option<String> {
        if rng.gen::<f64>() < self.odds.item_grant {
            self.templates.items.choose(rng).cloned()
        } else {
            None
        }
    }

    pub fn surreal_event(&self, rng: &mut StdRng) -> Option<&str> {
        self.templates.surreal_events.choose(rng).map(String::as_str)
    }

    fn with_surreal(&self, mut text: String, chance: f64, rng: &mut StdRng) -> String {
        if rng.gen::<f64>() < chance {
            if let Some(event) = self.surreal_event(rng) {
                text.push_str("\n\n");
                text.push_str(event);
            }
        }
        text
    }
}

fn pick<'a>(templates: &'a [Template], rng: &mut StdRng) -> Option<&'a Template> {
    templates.choose(rng)
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn title_case(text: &str) -> String {
    text.split(' ').map(capitalize).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use serde_json::json;

    fn generator(odds: EventOdds) -> StoryGenerator {
        StoryGenerator::new(TemplateSet::builtin().unwrap(), odds)
    }

    fn rendered(templates: &[Template], fields: &Fields<'_>) -> Vec<String> {
        templates.iter().map(|t| t.render(fields)).collect()
    }

    #[test]
    fn intro_uses_description() {
        let gen = generator(EventOdds::never());
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10 {
            let text = gen.generate_intro("the void", &mut rng);
            assert!(text.contains("pure nothingness that somehow contains everything"));
        }
    }

    #[test]
    fn intro_names_unknown_place() {
        let gen = generator(EventOdds::never());
        let mut rng = StdRng::seed_from_u64(2);
        let text = gen.generate_intro("unknown place", &mut rng);
        assert!(text.contains("a place called unknown place"));
    }

    #[test]
    fn loop_break_from_candidate_set() {
        let gen = generator(EventOdds::never());
        let candidates = rendered(&gen.templates().loop_break, &Fields::new());
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10 {
            assert!(candidates.contains(&gen.generate_loop_break(&mut rng)));
        }
    }

    #[test]
    fn surreal_line_appended_when_certain() {
        let mut odds = EventOdds::never();
        odds.loop_break_surreal = 1.0;
        let gen = generator(odds);
        let mut rng = StdRng::seed_from_u64(4);
        let text = gen.generate_loop_break(&mut rng);
        let (_, event) = text.split_once("\n\n").unwrap();
        assert!(gen.templates().surreal_events.iter().any(|e| e == event));
    }

    #[test]
    fn resolution_fills_contradiction_states() {
        let gen = generator(EventOdds::never());
        let player = Player::default();
        let paradox = Paradox::new(ParadoxType::Contradiction, "contradiction", 8)
            .with_trigger("go south")
            .with_metadata("old_state", json!("go north"))
            .with_metadata("new_state", json!("go south"));
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            let text = gen.generate_paradox_resolution(&paradox, &player, &mut rng);
            assert!(!text.contains('{'), "unrendered field in: {}", text);
        }
    }

    #[test]
    fn resolution_defaults_without_metadata() {
        let gen = generator(EventOdds::never());
        let player = Player::default();
        let paradox = Paradox::new(ParadoxType::NarrativeBreak, "odd", 3);
        let mut fields = Fields::new();
        fields.insert("resolution", RESOLUTION);
        fields.insert("location", "the beginning");
        let candidates = rendered(&gen.templates().paradox_resolution["default"], &fields);

        let mut rng = StdRng::seed_from_u64(6);
        for _ in 0..10 {
            let text = gen.generate_paradox_resolution(&paradox, &player, &mut rng);
            assert!(candidates.contains(&text), "unexpected: {}", text);
        }
    }

    #[test]
    fn choices_have_expected_shape() {
        let gen = generator(EventOdds::never());
        let player = Player::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let choices = gen.generate_choices("the library", &player, &mut rng);
            let moves: Vec<&Choice> = choices
                .iter()
                .filter(|c| c.action.starts_with("go "))
                .collect();
            assert!((2..=4).contains(&moves.len()));
            let mut actions: Vec<&str> = moves.iter().map(|c| c.action.as_str()).collect();
            actions.dedup();
            assert_eq!(actions.len(), moves.len());
            assert!(choices.iter().any(|c| c.text == "Read a book"));
            assert_eq!(choices.last().map(|c| c.action.as_str()), Some("look"));
        }
    }

    #[test]
    fn map_choice_gated_on_item() {
        let gen = generator(EventOdds::never());
        let mut player = Player::default();
        let mut rng = StdRng::seed_from_u64(8);
        let choices = gen.generate_choices("the market", &player, &mut rng);
        let map = choices.iter().find(|c| c.action == "consult map").unwrap();
        assert!(!map.is_available(&player));
        player.add_item(MAP_ITEM);
        assert!(map.is_available(&player));
        assert!(choices.iter().any(|c| c.action == "browse"));
    }

    #[test]
    fn post_paradox_choices_by_type() {
        let temporal = StoryGenerator::post_paradox_choices(ParadoxType::TemporalLoop);
        let actions: Vec<&str> = temporal.iter().map(|c| c.action.as_str()).collect();
        assert_eq!(actions, vec!["accept", "question", "break cycle", "go forward"]);

        let contradiction = StoryGenerator::post_paradox_choices(ParadoxType::Contradiction);
        assert_eq!(contradiction[2].text, "Embrace the contradiction");

        let impossible = StoryGenerator::post_paradox_choices(ParadoxType::ImpossibleState);
        assert_eq!(impossible.len(), 3);
    }

    #[test]
    fn action_text_falls_back_to_go() {
        let gen = generator(EventOdds::never());
        let mut fields = Fields::new();
        fields.insert("location", "the garden");
        fields.insert("location_title", "The Garden");
        fields.insert(
            "location_description",
            "Flowers bloom in colors that don't exist, narrating forgotten tales",
        );
        fields.insert("target", "sideways");
        let candidates = rendered(&gen.templates().actions["go"], &fields);

        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..10 {
            let text = gen.generate_action_text("dance", Some("sideways"), "the garden", &mut rng);
            assert!(candidates.contains(&text), "unexpected: {}", text);
        }
    }

    #[test]
    fn look_text_capitalizes_description() {
        let gen = generator(EventOdds::never());
        let mut rng = StdRng::seed_from_u64(10);
        let seen: Vec<String> = (0..20)
            .map(|_| gen.generate_action_text("look", None, "the void", &mut rng))
            .collect();
        assert!(seen
            .iter()
            .all(|t| t.contains("Pure nothingness") || t.contains("details of the void")));
    }

    #[test]
    fn direction_mapping() {
        let gen = generator(EventOdds::never());
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let north = gen.location_for_direction(Some("north"), &mut rng);
            assert!(["the library", "the clock tower", "the void"].contains(&north.as_str()));
            let anywhere = gen.location_for_direction(Some("sideways"), &mut rng);
            assert!(gen.location_description(&anywhere).is_some());
        }
    }

    #[test]
    fn item_grants_follow_odds() {
        let mut rng = StdRng::seed_from_u64(12);
        let never = generator(EventOdds::never());
        assert!((0..20).all(|_| never.roll_item_grant(&mut rng).is_none()));

        let mut odds = EventOdds::never();
        odds.item_grant = 1.0;
        let always = generator(odds);
        for _ in 0..20 {
            let item = always.roll_item_grant(&mut rng).unwrap();
            assert!(always.templates().items.contains(&item));
        }
    }

    #[test]
    fn seeded_output_repeats() {
        let gen = generator(EventOdds::default());
        let mut a = StdRng::seed_from_u64(99);
        let mut b = StdRng::seed_from_u64(99);
        assert_eq!(gen.generate_intro("the market", &mut a), gen.generate_intro("the market", &mut b));
        assert_eq!(gen.generate_loop_break(&mut a), gen.generate_loop_break(&mut b));
    }

    #[test]
    fn title_and_capitalize() {
        assert_eq!(title_case("the mirror hall"), "The Mirror Hall");
        assert_eq!(capitalize("pure nothingness"), "Pure nothingness");
        assert_eq!(capitalize(""), "");
    }
}
