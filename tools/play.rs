/// Play: interactive shell for the story loop.
///
/// Usage: play [--seed <n>] [--saves <dir>] [--config <path>] [--templates <path>] [--name <name>]
///
/// Type commands like "go north" or "take lantern", or the number of a
/// listed choice. `help` lists commands; `quit` exits.
/// Set RUST_LOG (e.g. RUST_LOG=infinite_story=debug) to see engine logs.

use infinite_story::core::engine::{Response, ResponseKind, StoryLoop, StoryLoopBuilder};
use infinite_story::core::persist::StateManager;
use infinite_story::schema::player::Player;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

struct Options {
    seed: Option<u64>,
    saves: String,
    config: Option<String>,
    templates: Option<String>,
    name: Option<String>,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let options = parse_args(&args);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let mut game = match builder_for(&options).build() {
        Ok(game) => game,
        Err(e) => {
            eprintln!("ERROR: Failed to start story: {}", e);
            std::process::exit(1);
        }
    };
    let mut saves = StateManager::new(&options.saves);

    println!("=== INFINITE STORY ===");
    if let Some(seed) = options.seed {
        println!("Seed: {}", seed);
    }
    println!("Type 'help' for commands.\n");
    println!("{}\n", game.current_text());
    print_choices(&game.current_choices());

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let input = resolve_choice_number(&game, line).unwrap_or_else(|| line.to_string());
        let response = game.process_input(&input);

        match response.kind {
            ResponseKind::Quit => {
                println!("{}", response.text);
                break;
            }
            ResponseKind::Save => {
                println!("{}", response.text);
                match saves.save(&game.snapshot(), None) {
                    Ok(path) => println!("Saved to {}", path.display()),
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            ResponseKind::Load => {
                println!("{}", response.text);
                if let Some(restored) = load_latest(&saves, &options) {
                    game = restored;
                    println!("\n{}\n", game.current_text());
                    print_choices(&game.current_choices());
                }
            }
            ResponseKind::Story | ResponseKind::Paradox => {
                print_response(&response);
                if let Some(path) = saves.auto_save(&game) {
                    println!("(auto-saved to {})", path.display());
                }
            }
            ResponseKind::System | ResponseKind::Error => {
                println!("{}\n", response.text);
            }
        }
    }

    println!(
        "\nChoices made: {}  Paradoxes: {}  Rewrites: {}",
        game.player().choice_history().len(),
        game.paradox_count(),
        game.rewrite_count()
    );
}

fn parse_args(args: &[String]) -> Options {
    let mut options = Options {
        seed: None,
        saves: "saves".to_string(),
        config: None,
        templates: None,
        name: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" if i + 1 < args.len() => {
                i += 1;
                options.seed = args[i].parse().ok();
                if options.seed.is_none() {
                    eprintln!("WARNING: Ignoring invalid seed '{}'", args[i]);
                }
            }
            "--saves" if i + 1 < args.len() => {
                i += 1;
                options.saves = args[i].clone();
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                options.config = Some(args[i].clone());
            }
            "--templates" if i + 1 < args.len() => {
                i += 1;
                options.templates = Some(args[i].clone());
            }
            "--name" if i + 1 < args.len() => {
                i += 1;
                options.name = Some(args[i].clone());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }
    options
}

fn builder_for(options: &Options) -> StoryLoopBuilder {
    let mut builder = StoryLoop::builder();
    if let Some(seed) = options.seed {
        builder = builder.seed(seed);
    }
    if let Some(path) = &options.config {
        builder = builder.config_path(path);
    }
    if let Some(path) = &options.templates {
        builder = builder.templates_path(path);
    }
    if let Some(name) = &options.name {
        builder = builder.player(Player::new(
            name.clone(),
            infinite_story::schema::player::DEFAULT_START_LOCATION,
        ));
    }
    builder
}

/// Map "2" to the action of the second available choice.
fn resolve_choice_number(game: &StoryLoop, input: &str) -> Option<String> {
    let n: usize = input.parse().ok()?;
    let choices = game.available_choices();
    let choice = choices.get(n.checked_sub(1)?)?;
    Some(choice.action.clone())
}

fn load_latest(saves: &StateManager, options: &Options) -> Option<StoryLoop> {
    let available = saves.list_saves();
    let Some(newest) = available.first() else {
        println!("No saves found in {}", saves.save_directory().display());
        return None;
    };
    println!("Saves:");
    for info in &available {
        println!("  {}  ({})", info.filename, info.saved_at.format("%Y-%m-%d %H:%M:%S"));
    }

    let snapshot = match saves.try_load(&newest.filename) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            println!("ERROR: Failed to load {}: {}", newest.filename, e);
            return None;
        }
    };
    match builder_for(options).restore(snapshot) {
        Ok(game) => {
            println!("Loaded {}", newest.filename);
            Some(game)
        }
        Err(e) => {
            println!("ERROR: {}", e);
            None
        }
    }
}

fn print_response(response: &Response) {
    if let (Some(paradox), Some(severity)) = (response.paradox_type, response.severity) {
        println!("\n*** PARADOX: {} (severity {}) ***", paradox, severity);
    }
    println!("\n{}\n", response.text);
    print_choices(&response.choices);
}

fn print_choices(choices: &[String]) {
    if choices.is_empty() {
        return;
    }
    println!("Choices:");
    for (i, choice) in choices.iter().enumerate() {
        println!("  {}. {}", i + 1, choice);
    }
    println!();
}

fn print_usage() {
    println!("Play: interactive shell for the story loop.");
    println!();
    println!("Usage: play [--seed <n>] [--saves <dir>] [--config <path>] [--templates <path>] [--name <name>]");
    println!();
    println!("  --seed <n>          RNG seed for a reproducible story");
    println!("  --saves <dir>       Save directory (default: saves)");
    println!("  --config <path>     Engine config RON file");
    println!("  --templates <path>  Template pack merged over the built-in one");
    println!("  --name <name>       Player name (default: Traveler)");
}
