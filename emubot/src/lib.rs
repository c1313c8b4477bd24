pub mod assets;
pub mod config;
pub mod context;
pub mod controls;
pub mod diagnose;
pub mod error;
pub mod farming;
pub mod launcher;
pub mod logging;
pub mod matcher;
pub mod schedule;
pub mod screenshots;

pub use crate::{
    config::{Config, Target},
    context::BotContext,
    controls::Controls,
    error::BotError,
};

use {
    crate::{
        assets::list_images,
        config::DEFAULT_CONFIG_PATH,
        error::is_stop,
        farming::{Farmer, Routine, StopReason},
    },
    anyhow::{bail, Context as _},
    clap::{Parser, Subcommand},
    std::path::{Path, PathBuf},
    strum::IntoEnumIterator,
    tracing::{info, warn},
};

/// Template-matching automation for a game running in an Android emulator.
#[derive(Parser)]
#[command(version, about)]
pub struct Args {
    /// Path to the JSON configuration file.
    #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    /// Don't listen for the pause and stop hotkeys.
    #[clap(long)]
    pub no_hotkeys: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the emulator and open the game.
    Launch,
    /// Collect rewards by watching ads.
    Farm {
        #[clap(long)]
        routine: Option<Routine>,
        #[clap(long)]
        max_rewards: Option<u32>,
    },
    /// Launch and farm every day at the configured times.
    Schedule,
    /// Save a screenshot of the primary monitor.
    Screenshot { name: Option<String> },
    /// Save a screenshot with every visible target framed.
    Detect,
    /// Check how well a template matches the current screen.
    Diagnose {
        /// Target name (e.g. `watch_ad`) or path of an image or template directory.
        target: String,
    },
    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    /// List targets and their template images.
    Targets,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Write the default configuration.
    Init {
        /// Overwrite an existing file.
        #[clap(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
    /// Check the configuration for invalid values.
    Validate,
}

pub fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let loaded = Config::load(&args.config)?;
    let config_missing = loaded.is_none();
    let config = loaded.unwrap_or_default();

    match args.command {
        Command::Config { action } => return config_command(action, &args.config, &config),
        Command::Targets => {
            print_targets(&config)?;
            return Ok(());
        }
        _ => {}
    }

    let _log_guards = logging::init(&config.log_dir)?;
    if config_missing {
        warn!(
            "config file {:?} not found, using defaults (see `emubot config init`)",
            args.config
        );
    }
    config.ensure_valid()?;

    let controls = Controls::new();
    let ctx = BotContext::new(config, controls.clone())?;
    let long_running = matches!(
        args.command,
        Command::Launch | Command::Farm { .. } | Command::Schedule
    );
    if long_running && ctx.config().hotkeys.enabled && !args.no_hotkeys {
        let (pause, stop) = ctx.config().hotkeys.keys()?;
        controls.spawn_hotkey_listener(ctx.screen_context().clone(), pause, stop);
    }

    match run_command(&ctx, args.command) {
        Err(err) if is_stop(&err) => {
            info!("stopped by user");
            Ok(())
        }
        result => result,
    }
}

fn run_command(ctx: &BotContext, command: Command) -> anyhow::Result<()> {
    let config = ctx.config();
    match command {
        Command::Launch => launcher::launch(ctx)?,
        Command::Farm {
            routine,
            max_rewards,
        } => {
            let routine = routine.unwrap_or(config.schedule.routine);
            let max_rewards = max_rewards.unwrap_or(config.farming.max_rewards);
            let summary = Farmer::new(ctx, routine).farm(max_rewards);
            if summary.stop_reason == StopReason::TooManyFailures {
                bail!("farming failed: {}", summary);
            }
        }
        Command::Schedule => schedule::run(ctx)?,
        Command::Screenshot { name } => {
            let path = ctx.screenshot(name.as_deref().unwrap_or("screenshot"))?;
            println!("{}", path.display());
        }
        Command::Detect => {
            let (path, found) = ctx.annotated_screenshot("detect")?;
            for hit in &found {
                println!(
                    "{:<16} {:>5} {:>5}  score {:.3}",
                    hit.target.to_string(),
                    hit.point.0,
                    hit.point.1,
                    hit.matched.score
                );
            }
            println!("{} target(s) visible, saved {}", found.len(), path.display());
        }
        Command::Diagnose { target } => {
            print!("{}", diagnose::diagnose(ctx, &target)?);
        }
        Command::Config { .. } | Command::Targets => unreachable!("handled without a bot context"),
    }
    Ok(())
}

fn config_command(action: ConfigCommand, path: &Path, config: &Config) -> anyhow::Result<()> {
    match action {
        ConfigCommand::Init { force } => {
            if path.try_exists()? && !force {
                bail!("{:?} already exists, use --force to overwrite it", path);
            }
            Config::default()
                .save(path)
                .with_context(|| format!("failed to write {:?}", path))?;
            println!("wrote default configuration to {}", path.display());
        }
        ConfigCommand::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigCommand::Validate => {
            let issues = config.validate();
            if !issues.is_empty() {
                for issue in &issues {
                    println!("{issue}");
                }
                bail!("found {} issue(s) in {:?}", issues.len(), path);
            }
            println!("configuration is valid");
        }
    }
    Ok(())
}

fn print_targets(config: &Config) -> anyhow::Result<()> {
    for target in Target::iter() {
        let path = config.target_path(target);
        let status = if path.is_dir() {
            format!("{} image(s)", list_images(&path)?.len())
        } else if path.is_file() {
            "1 image".to_string()
        } else {
            "missing".to_string()
        };
        println!("{:<16} {:<12} {}", target.to_string(), status, path.display());
    }
    Ok(())
}

#[test]
fn cli_parses() {
    use clap::CommandFactory;

    Args::command().debug_assert();

    let args = Args::try_parse_from([
        "emubot",
        "--config",
        "bot.json",
        "--no-hotkeys",
        "farm",
        "--routine",
        "rest",
        "--max-rewards",
        "3",
    ])
    .unwrap();
    assert_eq!(args.config, Path::new("bot.json"));
    assert!(args.no_hotkeys);
    assert!(matches!(
        args.command,
        Command::Farm {
            routine: Some(Routine::Rest),
            max_rewards: Some(3)
        }
    ));

    let args = Args::try_parse_from(["emubot", "diagnose", "close_ad"]).unwrap();
    assert_eq!(args.config, Path::new(DEFAULT_CONFIG_PATH));
    assert!(matches!(args.command, Command::Diagnose { target } if target == "close_ad"));

    assert!(Args::try_parse_from(["emubot", "farm", "--routine", "nap"]).is_err());
}
