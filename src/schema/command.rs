/// Player command parsing: canonical verbs, alias tables and direction
/// resolution.

use serde::{Deserialize, Serialize};

/// Canonical verbs understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Go,
    Take,
    Drop,
    Look,
    Talk,
    Use,
    Open,
    Close,
    Attack,
    Help,
    Status,
    Quit,
    Save,
    Load,
    Map,
    /// No known verb was found; the whole input is the target.
    Freeform,
}

/// Alias table, searched in order. The first word of the input that
/// matches any alias selects the verb.
const VERB_ALIASES: &[(Verb, &[&str])] = &[
    (Verb::Go, &["go", "walk", "move", "travel", "head"]),
    (Verb::Take, &["take", "pick", "grab", "get", "collect"]),
    (Verb::Drop, &["drop", "put", "leave", "discard"]),
    (Verb::Look, &["look", "examine", "inspect", "observe", "see"]),
    (Verb::Talk, &["talk", "speak", "ask", "tell", "say"]),
    (Verb::Use, &["use", "activate", "operate", "interact"]),
    (Verb::Open, &["open", "unlock"]),
    (Verb::Close, &["close", "shut", "lock"]),
    (Verb::Attack, &["attack", "fight", "hit", "strike"]),
    (Verb::Help, &["help", "?", "commands"]),
    (Verb::Status, &["status", "inventory", "inv", "i"]),
    (Verb::Quit, &["quit", "exit", "q"]),
    (Verb::Save, &["save"]),
    (Verb::Load, &["load", "restore"]),
    (Verb::Map, &["map", "history"]),
];

/// Words stripped from the front of a target.
const PREPOSITIONS: &[&str] = &["to", "at", "with", "on", "in", "from", "the", "a", "an"];

const DIRECTION_ALIASES: &[(&str, &[&str])] = &[
    ("north", &["north", "n", "up"]),
    ("south", &["south", "s", "down"]),
    ("east", &["east", "e", "right"]),
    ("west", &["west", "w", "left"]),
    ("northeast", &["northeast", "ne"]),
    ("northwest", &["northwest", "nw"]),
    ("southeast", &["southeast", "se"]),
    ("southwest", &["southwest", "sw"]),
];

impl Verb {
    /// Lowercase canonical name, e.g. `"go"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::Take => "take",
            Self::Drop => "drop",
            Self::Look => "look",
            Self::Talk => "talk",
            Self::Use => "use",
            Self::Open => "open",
            Self::Close => "close",
            Self::Attack => "attack",
            Self::Help => "help",
            Self::Status => "status",
            Self::Quit => "quit",
            Self::Save => "save",
            Self::Load => "load",
            Self::Map => "map",
            Self::Freeform => "freeform",
        }
    }

    /// System verbs are answered immediately and never advance the story.
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            Self::Help | Self::Status | Self::Quit | Self::Save | Self::Load | Self::Map
        )
    }

    fn from_alias(word: &str) -> Option<Verb> {
        VERB_ALIASES
            .iter()
            .find(|(_, aliases)| aliases.contains(&word))
            .map(|(verb, _)| *verb)
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured player command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub verb: Option<Verb>,
    pub target: Option<String>,
    /// The raw input, trimmed but otherwise untouched.
    pub original: String,
    pub is_command: bool,
}

impl Command {
    /// `"<verb> <target>"`, the text contradiction rules are matched against.
    pub fn action_text(&self) -> String {
        let verb = self.verb.map(|v| v.as_str()).unwrap_or("");
        let target = self.target.as_deref().unwrap_or("");
        format!("{} {}", verb, target).trim().to_string()
    }

    pub fn verb_name(&self) -> &'static str {
        self.verb.map(|v| v.as_str()).unwrap_or("unknown")
    }
}

/// Parses raw player input into structured commands.
pub struct CommandParser;

impl CommandParser {
    /// Parse raw input into a [`Command`].
    ///
    /// The first word matching any verb alias selects the verb; everything
    /// after it, minus leading prepositions and articles, becomes the
    /// target. Input with no recognised verb becomes `Freeform` with the
    /// whole lowercased input as target. Empty input has no verb.
    pub fn parse(input: &str) -> Command {
        let original = input.trim().to_string();
        let cleaned = original.to_lowercase();

        if cleaned.is_empty() {
            return Command {
                verb: None,
                target: None,
                original,
                is_command: false,
            };
        }

        let words: Vec<&str> = cleaned.split_whitespace().collect();
        let found = words
            .iter()
            .enumerate()
            .find_map(|(i, word)| Verb::from_alias(word).map(|verb| (i, verb)));

        let Some((verb_index, verb)) = found else {
            return Command {
                verb: Some(Verb::Freeform),
                target: Some(cleaned),
                original,
                is_command: false,
            };
        };

        let mut rest = &words[verb_index + 1..];
        while let Some(first) = rest.first() {
            if PREPOSITIONS.contains(first) {
                rest = &rest[1..];
            } else {
                break;
            }
        }
        let target = if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        };

        Command {
            verb: Some(verb),
            target,
            original,
            is_command: verb.is_system(),
        }
    }

    /// Resolve a free-text target to a compass direction.
    ///
    /// Unrecognised text passes through lowercased and trimmed.
    pub fn direction(target: Option<&str>) -> Option<String> {
        let target = target?.trim().to_lowercase();
        let resolved = DIRECTION_ALIASES
            .iter()
            .find(|(_, aliases)| aliases.contains(&target.as_str()))
            .map(|(direction, _)| direction.to_string());
        Some(resolved.unwrap_or(target))
    }
}
