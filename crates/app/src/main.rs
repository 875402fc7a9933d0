mod demo;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use mission_terminal_core::audio::{ThemeRendition, ToneTable, THEME};
use mission_terminal_core::{AppConfig, Gesture, SceneId, TerminalError, TokioClock, ToneAnalyzer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> mission_terminal_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            speed,
            declined,
            gesture,
        } => run_walkthrough(config.as_deref(), speed, declined, &gesture).await,
        Commands::Graph { config, from } => print_graph(config.as_deref(), from.as_deref()),
        Commands::Preview {
            sound,
            sample_rate,
            config,
        } => preview_sound(&sound, sample_rate, config.as_deref()),
        Commands::Config => {
            println!("{}", AppConfig::default().to_json_pretty()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> mission_terminal_core::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

async fn run_walkthrough(
    config: Option<&Path>,
    speed: f64,
    declined: bool,
    gesture: &str,
) -> mission_terminal_core::Result<()> {
    if !TokioClock::SPEED_RANGE.contains(&speed) {
        return Err(TerminalError::InvalidInput("speed must be between 0.01 and 1000"));
    }
    let gesture: Gesture = gesture.parse()?;
    let config = load_config(config)?;
    tracing::info!(speed, declined, gesture = gesture.event_name(), "starting walkthrough");

    let report = demo::Terminal::build(&config, speed).run(declined, gesture).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_graph(config: Option<&Path>, only_from: Option<&str>) -> mission_terminal_core::Result<()> {
    let config = load_config(config)?;
    let graph = &config.scenes.graph;
    let initial: &SceneId = &config.scenes.initial;
    let only_from = only_from.map(|scene| graph.resolve(scene)).transpose()?;

    println!("initial: {initial}");
    for (from, to) in graph.edges() {
        if only_from.as_ref().is_some_and(|scene| scene != from) {
            continue;
        }
        println!("{from} -> {to} [{}]", config.scenes.cues.transition_cue(from, to));
    }
    Ok(())
}

fn preview_sound(
    sound: &str,
    sample_rate: Option<u32>,
    config: Option<&Path>,
) -> mission_terminal_core::Result<()> {
    let config = load_config(config)?;
    let definition = config.catalog.resolve(sound)?;
    let mut analyzer = ToneAnalyzer::new(sample_rate.unwrap_or(config.audio.sample_rate));

    let analysis = if definition.name == THEME {
        analyzer.analyze_theme(&ThemeRendition::mission(config.audio.theme_drop()))?
    } else {
        analyzer.analyze_tone(&ToneTable::default().resolve(sound))?
    };
    tracing::debug!(sound, ?analysis, "rendered preview");

    let output = serde_json::json!({
        "sound": definition,
        "analysis": analysis,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Scripted audio-visual mission terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the whole experience on a headless stage and print a report.
    Run {
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Clock speed factor; 10 plays the walkthrough ten times faster.
        #[arg(short, long, default_value_t = 1.0)]
        speed: f64,
        /// Decline the mission instead of accepting it.
        #[arg(long)]
        declined: bool,
        /// Event name of the operator gesture that unlocks audio.
        #[arg(long, default_value = "keydown")]
        gesture: String,
    },
    /// Print the scene transition graph with its cues.
    Graph {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Only list the transitions leaving this scene.
        #[arg(long)]
        from: Option<String>,
    },
    /// Render a cataloged sound through the synthesizer and analyse it.
    Preview {
        /// Catalog name of the sound.
        sound: String,
        /// Defaults to the configured audio sample rate.
        #[arg(long)]
        sample_rate: Option<u32>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the default configuration as JSON.
    Config,
}
