//! CLI Entry Point for the Gomer SDK
//!
//! Drives a robot from the command line:
//! - `check`: connect, verify the firmware and print its version
//! - `light`, `turn`, `move`, `say`: common one-shot commands
//! - `raw`: submit any opcode with hand-picked parameters
//! - `show-config`: print the effective configuration
//!
//! # Usage
//!
//! ```bash
//! gomer --config config/gomer.toml check
//! gomer turn --angle 90
//! gomer --mock raw 1021 --param 1=1
//! ```
//!
//! `--mock` runs against an in-memory robot instead of the network.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gomer::config::{GomerConfig, DEFAULT_CONFIG_PATH};
use gomer::{logging, BlockMode, Robot};
use gomer_driver_mock::{MockDevice, Timing};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "gomer")]
#[command(about = "Command-line control for the Gomer robot", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use a simulated robot instead of connecting over the network
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, verify the firmware and print its version
    Check,

    /// Switch the light on or off
    Light {
        #[arg(value_enum)]
        state: LightState,
    },

    /// Turn in place
    Turn {
        /// Degrees, -360..=360; positive turns left
        #[arg(long, allow_hyphen_values = true)]
        angle: i64,
        /// 1..=3
        #[arg(long, default_value = "2")]
        speed: i64,
        /// Milliseconds, 0..=10000
        #[arg(long, default_value = "5000")]
        timeout: i64,
    },

    /// Move straight
    Move {
        /// -1000..=1000; negative moves backward
        #[arg(long, allow_hyphen_values = true)]
        distance: i64,
        #[arg(long, default_value = "2")]
        speed: i64,
        #[arg(long, default_value = "5000")]
        timeout: i64,
    },

    /// Speak a sentence
    Say {
        text: String,
        /// Sound file the speech is stored in on the robot
        #[arg(long, default_value = "say")]
        filename: String,
    },

    /// Submit an arbitrary operation and print the result fields
    Raw {
        /// Opcode, e.g. 1021 for an infrared read
        opcode: i64,
        /// Numeric parameter as SLOT=VALUE, repeatable
        #[arg(long = "param", value_parser = parse_slot::<i64>)]
        params: Vec<(usize, i64)>,
        /// String parameter as SLOT=VALUE, repeatable
        #[arg(long = "text", value_parser = parse_slot::<String>)]
        texts: Vec<(usize, String)>,
        #[arg(long, value_enum, default_value = "all")]
        block: Block,
        /// Group the operation belongs to
        #[arg(long)]
        group: Option<String>,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum LightState {
    On,
    Off,
}

#[derive(Clone, Copy, ValueEnum)]
enum Block {
    Never,
    Auto,
    All,
}

impl From<Block> for BlockMode {
    fn from(block: Block) -> Self {
        match block {
            Block::Never => BlockMode::Never,
            Block::Auto => BlockMode::Auto,
            Block::All => BlockMode::All,
        }
    }
}

fn parse_slot<T>(arg: &str) -> Result<(usize, T), String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let (slot, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected SLOT=VALUE, got '{}'", arg))?;
    let slot: usize = slot.parse().map_err(|e| format!("bad slot '{}': {}", slot, e))?;
    if !(1..=5).contains(&slot) {
        return Err(format!("slot must be in 1..=5, got {}", slot));
    }
    let value = value
        .parse()
        .map_err(|e| format!("bad value '{}': {}", value, e))?;
    Ok((slot, value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = GomerConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    config.validate().context("validating configuration")?;
    logging::init_from_config(&config).context("initializing logging")?;

    if let Commands::ShowConfig = cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let robot = if cli.mock {
        config.link.settle_delay_ms = 0;
        let (device, inbound) = MockDevice::builder().timing(Timing::realistic()).build();
        Robot::with_transport(config, Arc::new(device), inbound)
            .await
            .context("starting simulated robot")?
    } else {
        let address = config.link.address.clone();
        Robot::connect(config)
            .await
            .with_context(|| format!("connecting to robot at {}", address))?
    };

    let outcome = run(&robot, cli.command).await;
    robot.shutdown().await.context("closing link")?;
    outcome
}

async fn run(robot: &Robot, command: Commands) -> Result<()> {
    match command {
        Commands::Check => {
            println!("Firmware {}", robot.firmware());
        }
        Commands::Light { state } => {
            let sensors = robot.sensors();
            match state {
                LightState::On => sensors.light_on().await?,
                LightState::Off => sensors.light_off().await?,
            }
        }
        Commands::Turn {
            angle,
            speed,
            timeout,
        } => {
            robot
                .wheel()
                .turn(speed, angle, timeout, BlockMode::All)
                .await?;
        }
        Commands::Move {
            distance,
            speed,
            timeout,
        } => {
            robot
                .wheel()
                .move_straight(speed, distance, timeout, BlockMode::All)
                .await?;
        }
        Commands::Say { text, filename } => {
            let player = robot.player();
            player.tts(&text, &filename).await?;
            player.play_file(&filename).await?;
        }
        Commands::Raw {
            opcode,
            params,
            texts,
            block,
            group,
        } => {
            let dispatcher = robot.dispatcher();
            let mut descriptor = dispatcher.descriptor(opcode);
            for (slot, value) in params {
                descriptor = descriptor.param(slot, value);
            }
            for (slot, value) in texts {
                descriptor = descriptor.text(slot, value);
            }
            let result = dispatcher
                .submit(descriptor, group.as_deref(), block.into())
                .await
                .with_context(|| format!("submitting opcode {}", opcode))?;
            match result {
                Some(fields) => println!("{}", serde_json::to_string_pretty(&fields)?),
                None => println!("Acknowledged"),
            }
        }
        Commands::ShowConfig => bail!("show-config does not need a robot"),
    }
    Ok(())
}
