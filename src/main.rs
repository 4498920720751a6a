//! Minibot Station - operator console for a fleet of small robots
//!
//! Headless front end over the network core: reads operator commands from
//! stdin and streams controller frames to paired peers.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use minibot_station::config::{self, Config};
use minibot_station::console::{ConsoleCommand, Pairings, HELP};
use minibot_station::input::{InputSource, NeutralInput};
use minibot_station::protocol::{self, Mode};
use minibot_station::{CommandDispatcher, Station, StationEvent};

/// Minibot Station - discover robots and drive them over UDP
#[derive(Parser)]
#[command(name = "station")]
#[command(author = "Minibot Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Discover minibots on the LAN and send them modes, stops and controller input", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the station (default discovery port unless overridden)
    Run {
        /// Discovery port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface address to bind to
        #[arg(short, long)]
        bind: Option<IpAddr>,

        /// First channel handed out to peers
        #[arg(long)]
        base_channel: Option<u16>,

        /// Mode to start in (standby, active, autonomous)
        #[arg(short, long)]
        mode: Option<Mode>,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show protocol information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    match cli.command {
        Commands::Run {
            port,
            bind,
            base_channel,
            mode,
        } => {
            if let Some(port) = port {
                config.network.discovery_port = port;
            }
            if bind.is_some() {
                config.network.bind_address = bind;
            }
            if let Some(base_channel) = base_channel {
                config.network.base_channel = base_channel;
            }
            if let Some(mode) = mode {
                config.control.initial_mode = mode;
            }
            run_station(config).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_protocol_info(&config);
        }
    }

    Ok(())
}

/// Run the station until the operator quits or Ctrl+C
async fn run_station(config: Config) -> anyhow::Result<()> {
    let mut station = Station::bind(config.station_config())?;
    let mut events = station
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("event receiver already taken"))?;
    station.start()?;

    let dispatcher = station.dispatcher();
    let mut pairings = config.initial_pairings();
    let mut input: Box<dyn InputSource> = Box::new(NeutralInput::new(config.input.devices.clone()));

    let mut tick = tokio::time::interval(config.control.tick_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    println!("\n========================================");
    println!("  Minibot Station Running");
    println!("========================================");
    let station_config = station.config();
    println!("  Listening: {}", station.local_addr());
    println!("  Base Channel: {}", station_config.base_channel);
    println!("  Liveness: {}s", station_config.liveness_window.as_secs());
    println!("  Mode: {}", station_config.initial_mode);
    println!("  Pairings: {}", pairings.len());
    for device in input.devices() {
        let name = input.device_name(device).unwrap_or_else(|| device.to_string());
        println!("  Device {}: {}", device, name);
    }
    println!("========================================");
    println!("\nType 'help' for commands. Press Ctrl+C to stop.\n");

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if !handle_event(event, &mut pairings) {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match line.parse::<ConsoleCommand>() {
                        Ok(command) => {
                            if !handle_command(command, &dispatcher, &mut pairings, input.as_ref()).await? {
                                break;
                            }
                        }
                        Err(e) => println!("{}", e),
                    },
                    Ok(None) => {
                        tracing::debug!("stdin closed, console input disabled");
                        stdin_open = false;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }
            _ = tick.tick() => {
                match input.poll().await {
                    Ok(samples) => {
                        for (peer_id, sample) in pairings.frames(&samples) {
                            dispatcher.send_control_frame(peer_id, sample).await;
                        }
                    }
                    Err(e) => tracing::warn!("Input poll failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    station.shutdown().await?;
    tracing::info!("Station stopped");

    Ok(())
}

/// Returns false once the station has stopped
fn handle_event(event: StationEvent, pairings: &mut Pairings) -> bool {
    match event {
        StationEvent::Started { local_addr } => {
            tracing::info!("Listening for announcements on {}", local_addr);
        }
        StationEvent::PeerDiscovered {
            peer_id,
            address,
            channel,
        } => {
            println!("+ Peer {} ({}) on channel {}", peer_id, address, channel);
        }
        StationEvent::PeerEvicted { peer_id } => {
            if pairings.drop_peer(&peer_id) {
                tracing::info!("Pairing for {} released", peer_id);
            }
            println!("- Peer {} timed out", peer_id);
        }
        StationEvent::ModeChanged { mode } => {
            tracing::info!("Mode is now {}", mode);
        }
        StationEvent::StopChanged { engaged } => {
            tracing::info!("Emergency stop {}", if engaged { "engaged" } else { "released" });
        }
        StationEvent::Stopped => return false,
    }
    true
}

/// Returns false when the operator asked to quit
async fn handle_command(
    command: ConsoleCommand,
    dispatcher: &CommandDispatcher,
    pairings: &mut Pairings,
    input: &dyn InputSource,
) -> anyhow::Result<bool> {
    match command {
        ConsoleCommand::SetMode(mode) => {
            let sent = dispatcher.set_mode(mode).await;
            println!("Mode {} sent to {} peer(s)", mode, sent);
        }
        ConsoleCommand::Stop(engage) => {
            let sent = dispatcher.set_stop(engage).await;
            println!(
                "Stop {} ({} datagram(s))",
                if engage { "engaged" } else { "released" },
                sent
            );
        }
        ConsoleCommand::ToggleStop => {
            let engaged = dispatcher.toggle_stop().await;
            println!("Stop {}", if engaged { "engaged" } else { "released" });
        }
        ConsoleCommand::Pair { peer_id, device } => {
            let known = dispatcher
                .snapshot()
                .await
                .iter()
                .any(|peer| peer.id == peer_id);
            if !known {
                println!("Note: {} has not announced itself yet", peer_id);
            }
            let Some(name) = input.device_name(device) else {
                println!("No input device {}", device);
                return Ok(true);
            };
            if let Some(previous) = pairings.pair(peer_id.clone(), device) {
                println!("{} moved from device {} to {} ({})", peer_id, previous, device, name);
            } else {
                println!("{} paired with device {} ({})", peer_id, device, name);
            }
        }
        ConsoleCommand::Unpair { peer_id } => match pairings.unpair(&peer_id) {
            Some(device) => println!("{} released device {}", peer_id, device),
            None => println!("{} was not paired", peer_id),
        },
        ConsoleCommand::Peers => {
            let snapshot = dispatcher.snapshot().await;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        ConsoleCommand::Refresh => {
            let forgotten = dispatcher.refresh().await;
            pairings.clear();
            println!("Forgot {} peer(s)", forgotten.len());
        }
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => return Ok(false),
    }
    Ok(true)
}

/// Print protocol and configuration information
fn print_protocol_info(config: &Config) {
    println!("Minibot Station Information");
    println!("===========================\n");

    println!("Discovery Port: {}", config.network.discovery_port);
    println!("Base Channel: {}", config.network.base_channel);
    println!("Liveness Window: {}s", config.network.liveness_window_secs);
    println!("Control Rate: {} Hz", config.control.tick_hz);
    println!("Control Frame: {} bytes", protocol::CONTROL_FRAME_LEN);

    println!("\nWire Format:");
    println!("  {}<id>:<ip>[:<port>]   peer -> station", protocol::ANNOUNCE_PREFIX);
    println!("  {}<id>:<channel>         station -> peer", protocol::ASSIGN_PREFIX);
    println!("  <id>:<mode>                  station -> peer");
    println!("  {} / {}                station -> peer", protocol::STOP_TOKEN, protocol::RESUME_TOKEN);

    if let Some(dir) = dirs::config_dir() {
        println!("\nConfig File: {}", dir.join("minibot-station/config.toml").display());
    }
}
