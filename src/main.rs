use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;
use tracing::{info, warn};

use stitch_pip::config::{Config, PlayerSize};
use stitch_pip::pip::PageEvent;
use stitch_pip::router::{self, KeyInput};
use stitch_pip::sim::{Scenario, SimFrame};

/// One replayed step of a `run` invocation
#[derive(Debug)]
enum Step {
    Command(router::Command),
    Key(KeyInput),
    Event(PageEvent),
    /// The user closes the document window from its title bar
    CloseWindow,
}

impl std::str::FromStr for Step {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let (head, arg) = match raw.split_once(':') {
            Some((head, arg)) => (head, Some(arg)),
            None => (raw, None),
        };

        let step = match (head, arg) {
            ("toggle", index) => Step::Command(router::Command::TogglePip {
                target_index: index.map(|i| i.parse::<usize>()).transpose()?,
                frame_id: None,
            }),
            ("close", None) => Step::Command(router::Command::ClosePip),
            ("size", Some(size)) => Step::Command(router::Command::UpdateSize {
                size: size.parse::<PlayerSize>()?,
            }),
            ("metadata", None) => Step::Command(router::Command::GetVideoMetadata),
            ("key", Some(chord)) => Step::Key(KeyInput::parse(chord)),
            ("cmd", Some(json)) => Step::Command(serde_json::from_str(json)?),
            ("hide", None) => Step::Event(PageEvent::VisibilityChanged { hidden: true }),
            ("show", None) => Step::Event(PageEvent::VisibilityChanged { hidden: false }),
            ("close-window", None) => Step::CloseWindow,
            _ => return Err(anyhow!("Unknown step: {}", raw)),
        };
        Ok(step)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let matches = Command::new("Stitch PiP")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Picture-in-Picture session manager for web video, driven against simulated pages")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .global(true)
                .action(clap::ArgAction::SetTrue)
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("locate")
                .about("List significant videos and the primary one")
                .arg(Arg::new("scenario").value_name("FILE").required(true))
        )
        .subcommand(
            Command::new("run")
                .about("Replay commands against a scenario and print the PiP state")
                .arg(Arg::new("scenario").value_name("FILE").required(true))
                .arg(
                    Arg::new("steps")
                        .value_name("STEP")
                        .help("toggle[:index], close, size:<s>, key:<chord>, cmd:<json>, metadata, hide, show, close-window")
                        .num_args(1..)
                        .required(true)
                )
        )
        .subcommand(
            Command::new("config")
                .about("Show the effective configuration")
                .arg(
                    Arg::new("save")
                        .long("save")
                        .value_name("FILE")
                        .help("Write the effective configuration as TOML")
                )
        )
        .get_matches();

    let filter = if matches.get_flag("verbose") {
        "stitch_pip=debug,info"
    } else {
        "stitch_pip=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });
    config.validate()?;

    match matches.subcommand() {
        Some(("locate", sub)) => locate(sub, &config),
        Some(("run", sub)) => run(sub, &config).await,
        Some(("config", sub)) => show_config(sub, &config),
        _ => Err(anyhow!("No subcommand given")),
    }
}

fn load_scenario(matches: &ArgMatches) -> Result<Scenario> {
    let path = matches
        .get_one::<String>("scenario")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("Scenario file required"))?;
    info!("📄 Loading scenario {}", path.display());
    Scenario::load(&path)
}

fn locate(matches: &ArgMatches, config: &Config) -> Result<()> {
    let scenario = load_scenario(matches)?;
    let frame = SimFrame::from_scenario(0, &scenario, config);
    let locator = frame.context.locator();

    let candidates = locator.locate_all();
    println!("🔍 {} significant video(s) on {}", candidates.len(), scenario.url);
    for handle in &candidates {
        println!(
            "  #{} {:?} {}x{} in {:?} (paused: {}, t={:.1}s)",
            handle.index,
            handle.node,
            handle.rect.width,
            handle.rect.height,
            handle.context,
            handle.media.paused,
            handle.media.current_time
        );
    }

    match locator.locate_primary() {
        Some(primary) => println!("🎯 Primary: {:?}", primary.node),
        None => println!("📭 No primary video"),
    }
    Ok(())
}

async fn run(matches: &ArgMatches, config: &Config) -> Result<()> {
    let scenario = load_scenario(matches)?;
    let steps = matches
        .get_many::<String>("steps")
        .map(|values| values.map(|raw| raw.parse::<Step>()).collect::<Result<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();

    let frame = SimFrame::from_scenario(0, &scenario, config);
    println!(
        "🚀 Replaying {} step(s) on {} at {}",
        steps.len(),
        scenario.url,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    for (i, step) in steps.iter().enumerate() {
        let outcome = match step {
            Step::Command(command) => format!("{:?}", frame.command(command.clone()).await),
            Step::Key(input) => format!("handled: {}", frame.key(input).await),
            Step::Event(event) => {
                frame.context.handle_event(event.clone()).await;
                frame.pump().await;
                "delivered".to_string()
            }
            Step::CloseWindow => match frame.platform.open_window() {
                Some((window, _)) => {
                    frame.platform.user_close_window(window);
                    frame.pump().await;
                    "window closed".to_string()
                }
                None => "no window open".to_string(),
            },
        };
        println!("{:>3}. {:?} -> {} [state: {:?}]", i + 1, step, outcome, frame.context.state());
        if let Some(toast) = frame.context.overlays().current_toast() {
            println!("     💬 {}", toast);
        }
    }

    println!("📊 Final state: {:?}", frame.context.state());
    println!("📊 Surface requests: {:?}", frame.platform.attempts());
    Ok(())
}

fn show_config(matches: &ArgMatches, config: &Config) -> Result<()> {
    println!("{}", config.summary());
    if let Some(path) = matches.get_one::<String>("save") {
        config.save(path)?;
    }
    Ok(())
}
