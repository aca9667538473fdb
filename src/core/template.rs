/// Story text templates: parsing, rendering, and the RON data pack that
/// supplies every narrative string the generator draws from.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("template pack has no entries for '{0}'")]
    MissingSection(String),
}

/// Field names templates may reference.
pub const KNOWN_FIELDS: &[&str] = &[
    "location",
    "location_title",
    "location_description",
    "target",
    "old_state",
    "new_state",
    "contradiction",
    "resolution",
    "missing_item",
];

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateSegment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// Field interpolation: `{name}` or `{name|fallback}`.
    Field {
        name: String,
        default: Option<String>,
    },
}

/// A parsed template: a sequence of segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub segments: Vec<TemplateSegment>,
}

/// Values substituted into templates, keyed by field name.
pub type Fields<'a> = HashMap<&'static str, &'a str>;

impl Template {
    /// Parse a template string into a sequence of segments.
    ///
    /// Syntax:
    /// - `{field}` → `Field` with no fallback
    /// - `{field|fallback text}` → `Field` rendered as the fallback when the
    ///   value is missing or empty
    /// - `{{` / `}}` → literal braces
    /// - Everything else → `Literal`
    pub fn parse(input: &str) -> Result<Template, TemplateError> {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            if chars[i] == '{' {
                if i + 1 < len && chars[i + 1] == '{' {
                    literal_buf.push('{');
                    i += 2;
                    continue;
                }

                if !literal_buf.is_empty() {
                    segments.push(TemplateSegment::Literal(std::mem::take(&mut literal_buf)));
                }

                let start = i + 1;
                let mut end = start;
                let mut closed = false;
                while end < len {
                    match chars[end] {
                        '{' => {
                            return Err(TemplateError::Parse(
                                "nested braces are not allowed".to_string(),
                            ))
                        }
                        '}' => {
                            closed = true;
                            break;
                        }
                        _ => end += 1,
                    }
                }
                if !closed {
                    return Err(TemplateError::Parse("unclosed brace".to_string()));
                }

                let content: String = chars[start..end].iter().collect();
                segments.push(Self::parse_field(&content)?);
                i = end + 1;
            } else if chars[i] == '}' {
                if i + 1 < len && chars[i + 1] == '}' {
                    literal_buf.push('}');
                    i += 2;
                    continue;
                }
                return Err(TemplateError::Parse(
                    "unmatched closing brace".to_string(),
                ));
            } else {
                literal_buf.push(chars[i]);
                i += 1;
            }
        }

        if !literal_buf.is_empty() {
            segments.push(TemplateSegment::Literal(literal_buf));
        }

        Ok(Template { segments })
    }

    fn parse_field(content: &str) -> Result<TemplateSegment, TemplateError> {
        let (name, default) = match content.split_once('|') {
            Some((name, default)) => (name.trim(), Some(default.to_string())),
            None => (content.trim(), None),
        };
        if name.is_empty() {
            return Err(TemplateError::Parse("empty braces".to_string()));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(TemplateError::Parse(format!(
                "invalid field name '{}'",
                name
            )));
        }
        Ok(TemplateSegment::Field {
            name: name.to_string(),
            default,
        })
    }

    /// Render with the given field values. A field with no value and no
    /// fallback is written back out as `{name}`.
    pub fn render(&self, fields: &Fields<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::Field { name, default } => {
                    let value = fields.get(name.as_str()).filter(|v| !v.is_empty());
                    match (value, default) {
                        (Some(value), _) => out.push_str(value),
                        (None, Some(default)) => out.push_str(default),
                        (None, None) => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                }
            }
        }
        out
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            TemplateSegment::Field { name, .. } => Some(name.as_str()),
            TemplateSegment::Literal(_) => None,
        })
    }
}

/// Every narrative string the generator can produce, keyed by context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateSet {
    pub intro: Vec<Template>,
    /// Keyed by paradox type name; `"default"` applies to every type.
    pub paradox_resolution: BTreeMap<String, Vec<Template>>,
    pub loop_break: Vec<Template>,
    pub surreal_events: Vec<String>,
    /// Location name → description.
    pub locations: BTreeMap<String, String>,
    /// Verb or freeform keyword → action text.
    pub actions: BTreeMap<String, Vec<Template>>,
    /// Compass direction → reachable locations.
    pub directions: BTreeMap<String, Vec<String>>,
    /// Items a new scene may hand to the player.
    pub items: Vec<String>,
}

// The RON pack holds raw strings; templates are parsed on load.

#[derive(Debug, Deserialize)]
struct RonTemplateSet {
    #[serde(default)]
    intro: Vec<String>,
    #[serde(default)]
    paradox_resolution: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    loop_break: Vec<String>,
    #[serde(default)]
    surreal_events: Vec<String>,
    #[serde(default)]
    locations: BTreeMap<String, String>,
    #[serde(default)]
    actions: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    directions: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    items: Vec<String>,
}

const BUILTIN_TEMPLATES: &str = include_str!("../../story_data/templates.ron");

fn parse_all(texts: Vec<String>) -> Result<Vec<Template>, TemplateError> {
    texts.iter().map(|t| Template::parse(t)).collect()
}

fn parse_keyed(
    map: BTreeMap<String, Vec<String>>,
) -> Result<BTreeMap<String, Vec<Template>>, TemplateError> {
    map.into_iter()
        .map(|(key, texts)| Ok((key, parse_all(texts)?)))
        .collect()
}

impl TemplateSet {
    /// The pack compiled into the crate.
    pub fn builtin() -> Result<TemplateSet, TemplateError> {
        Self::parse_ron(BUILTIN_TEMPLATES)
    }

    /// Load a template pack from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<TemplateSet, TemplateError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a template pack from a RON string. Sections may be omitted;
    /// use [`TemplateSet::validate`] before handing a partial pack to the
    /// generator.
    pub fn parse_ron(input: &str) -> Result<TemplateSet, TemplateError> {
        let raw: RonTemplateSet = ron::from_str(input)?;
        Ok(TemplateSet {
            intro: parse_all(raw.intro)?,
            paradox_resolution: parse_keyed(raw.paradox_resolution)?,
            loop_break: parse_all(raw.loop_break)?,
            surreal_events: raw.surreal_events,
            locations: raw.locations,
            actions: parse_keyed(raw.actions)?,
            directions: raw.directions,
            items: raw.items,
        })
    }

    /// Merge another pack into this one. Non-empty lists and keyed entries
    /// from `other` replace those in `self`.
    pub fn merge(&mut self, other: TemplateSet) {
        if !other.intro.is_empty() {
            self.intro = other.intro;
        }
        if !other.loop_break.is_empty() {
            self.loop_break = other.loop_break;
        }
        if !other.surreal_events.is_empty() {
            self.surreal_events = other.surreal_events;
        }
        if !other.items.is_empty() {
            self.items = other.items;
        }
        self.paradox_resolution.extend(other.paradox_resolution);
        self.locations.extend(other.locations);
        self.actions.extend(other.actions);
        self.directions.extend(other.directions);
    }

    /// Check that every section the generator draws from has entries.
    pub fn validate(&self) -> Result<(), TemplateError> {
        let missing = |name: &str| Err(TemplateError::MissingSection(name.to_string()));
        if self.intro.is_empty() {
            return missing("intro");
        }
        if self
            .paradox_resolution
            .get("default")
            .map_or(true, |t| t.is_empty())
        {
            return missing("paradox_resolution.default");
        }
        if self.loop_break.is_empty() {
            return missing("loop_break");
        }
        if self.surreal_events.is_empty() {
            return missing("surreal_events");
        }
        if self.locations.is_empty() {
            return missing("locations");
        }
        if self.actions.get("go").map_or(true, |t| t.is_empty()) {
            return missing("actions.go");
        }
        if self.items.is_empty() {
            return missing("items");
        }
        Ok(())
    }

    /// `(section, field)` for every field reference not in [`KNOWN_FIELDS`].
    pub fn unknown_fields(&self) -> Vec<(String, String)> {
        let mut found = Vec::new();
        let mut check = |section: String, templates: &[Template]| {
            for template in templates {
                for name in template.field_names() {
                    if !KNOWN_FIELDS.contains(&name) {
                        found.push((section.clone(), name.to_string()));
                    }
                }
            }
        };
        check("intro".to_string(), &self.intro);
        check("loop_break".to_string(), &self.loop_break);
        for (key, templates) in &self.paradox_resolution {
            check(format!("paradox_resolution.{}", key), templates);
        }
        for (key, templates) in &self.actions {
            check(format!("actions.{}", key), templates);
        }
        found
    }

    /// Every location any direction can lead to that has no description.
    pub fn undescribed_destinations(&self) -> Vec<&str> {
        let mut missing: Vec<&str> = self
            .directions
            .values()
            .flatten()
            .filter(|loc| !self.locations.contains_key(loc.as_str()))
            .map(|loc| loc.as_str())
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields<'a>(pairs: &[(&'static str, &'a str)]) -> Fields<'a> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn parse_literal_only() {
        let t = Template::parse("The void hums.").unwrap();
        assert_eq!(
            t.segments,
            vec![TemplateSegment::Literal("The void hums.".to_string())]
        );
    }

    #[test]
    fn parse_field_with_fallback() {
        let t = Template::parse("You reach for {target|something}.").unwrap();
        assert_eq!(t.segments.len(), 3);
        assert!(matches!(
            &t.segments[1],
            TemplateSegment::Field { name, default: Some(d) } if name == "target" && d == "something"
        ));
    }

    #[test]
    fn parse_escaped_braces() {
        let t = Template::parse("{{literal}}").unwrap();
        assert_eq!(t.render(&Fields::new()), "{literal}");
    }

    #[test]
    fn parse_errors() {
        assert!(Template::parse("{}").is_err());
        assert!(Template::parse("{a{b}}").is_err());
        assert!(Template::parse("{open").is_err());
        assert!(Template::parse("close}").is_err());
        assert!(Template::parse("{bad name}").is_err());
    }

    #[test]
    fn render_uses_value_then_fallback() {
        let t = Template::parse("You speak to {target|the silence}.").unwrap();
        assert_eq!(
            t.render(&fields(&[("target", "the owl")])),
            "You speak to the owl."
        );
        assert_eq!(t.render(&fields(&[("target", "")])), "You speak to the silence.");
        assert_eq!(t.render(&Fields::new()), "You speak to the silence.");
    }

    #[test]
    fn render_missing_field_is_verbatim() {
        let t = Template::parse("Enter {location}.").unwrap();
        assert_eq!(t.render(&Fields::new()), "Enter {location}.");
    }

    #[test]
    fn builtin_pack_is_complete() {
        let set = TemplateSet::builtin().unwrap();
        set.validate().unwrap();
        assert!(set.unknown_fields().is_empty());
        assert!(set.undescribed_destinations().is_empty());
        assert_eq!(set.surreal_events.len(), 15);
        assert_eq!(set.locations.len(), 8);
        assert_eq!(set.intro.len(), 3);
    }

    #[test]
    fn partial_pack_fails_validation() {
        let set = TemplateSet::parse_ron(r#"(intro: ["Hello {location}."])"#).unwrap();
        assert!(matches!(
            set.validate(),
            Err(TemplateError::MissingSection(section)) if section == "paradox_resolution.default"
        ));
    }

    #[test]
    fn merge_overrides_sections() {
        let mut base = TemplateSet::builtin().unwrap();
        let overlay = TemplateSet::parse_ron(
            r#"(
                intro: ["A new dawn in {location}."],
                locations: { "the attic": "dust older than the house" },
            )"#,
        )
        .unwrap();
        base.merge(overlay);

        assert_eq!(base.intro.len(), 1);
        assert!(base.locations.contains_key("the attic"));
        assert!(base.locations.contains_key("the void"));
        assert_eq!(base.loop_break.len(), 3);
    }

    #[test]
    fn unknown_fields_reported() {
        let set = TemplateSet::parse_ron(r#"(loop_break: ["The {weather} turns."])"#).unwrap();
        assert_eq!(
            set.unknown_fields(),
            vec![("loop_break".to_string(), "weather".to_string())]
        );
    }
}
