/// Template Linter: validates a story template pack.
///
/// Usage: template_linter [<pack.ron>] [--overlay]
///
/// With no path the built-in pack is checked. `--overlay` merges the file
/// over the built-in pack first, the way the engine loads extra templates.

use infinite_story::core::template::{TemplateSet, KNOWN_FIELDS};
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("Usage: template_linter [<pack.ron>] [--overlay]");
        process::exit(0);
    }

    let overlay = args.iter().any(|a| a == "--overlay");
    let path = args.iter().skip(1).find(|a| !a.starts_with("--"));

    let templates = match load(path.map(String::as_str), overlay) {
        Ok(templates) => templates,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    let (errors, warnings) = lint_templates(&templates);

    println!("\n=== Template Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    process::exit(if errors.is_empty() { 0 } else { 1 });
}

fn load(path: Option<&str>, overlay: bool) -> Result<TemplateSet, String> {
    let builtin = || TemplateSet::builtin().map_err(|e| format!("built-in pack: {}", e));
    let Some(path) = path else {
        println!("Checking built-in template pack");
        return builtin();
    };

    let file = TemplateSet::load_from_ron(Path::new(path))
        .map_err(|e| format!("failed to load '{}': {}", path, e))?;
    println!("Loaded: {}", path);

    if overlay {
        let mut base = builtin()?;
        base.merge(file);
        Ok(base)
    } else {
        Ok(file)
    }
}

fn lint_templates(templates: &TemplateSet) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if let Err(e) = templates.validate() {
        errors.push(e.to_string());
    }

    for (section, field) in templates.unknown_fields() {
        errors.push(format!(
            "{} references unknown field '{{{}}}' (known: {})",
            section,
            field,
            KNOWN_FIELDS.join(", ")
        ));
    }

    for location in templates.undescribed_destinations() {
        warnings.push(format!(
            "direction destination '{}' has no location description",
            location
        ));
    }

    for key in ["take", "look", "talk"] {
        if !templates.actions.contains_key(key) {
            warnings.push(format!(
                "no '{}' action templates; '{}' will fall back to 'go'",
                key, key
            ));
        }
    }

    for (direction, destinations) in &templates.directions {
        if destinations.is_empty() {
            warnings.push(format!(
                "direction '{}' leads nowhere; a random location will be used",
                direction
            ));
        }
    }

    if !templates.paradox_resolution.contains_key("TEMPORAL_LOOP")
        && !templates.paradox_resolution.contains_key("CONTRADICTION")
    {
        warnings.push("no type-specific paradox resolutions; only defaults will be used".to_string());
    }

    (errors, warnings)
}
