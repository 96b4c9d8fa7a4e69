//! deck-cli: drives the relay deck engine from a terminal.
//!
//! ## Subcommands
//!
//! - `run`: attach the engine to a host (bridge socket or built-in simulator)
//!   and run the cooperative tick loop, logging state transitions
//! - `state`: one-shot state pull, printed as JSON

use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use deck_core::clock::SystemClock;
use deck_core::engine::DeckEngine;
use deck_core::host::{bridge::BridgeHost, sim::SimHost, HostAdapter};

#[derive(Parser)]
#[command(name = "deck-cli")]
#[command(about = "Relay deck control surface")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine loop against a host
    Run {
        /// Use the built-in simulator instead of the bridge socket
        #[arg(long)]
        sim: bool,

        /// Tick interval in milliseconds
        #[arg(long, default_value_t = 50)]
        interval_ms: u64,

        /// Stop after this many ticks (default: run forever)
        #[arg(long)]
        ticks: Option<u64>,
    },

    /// Pull one snapshot and print it as JSON
    State {
        /// Use the built-in simulator instead of the bridge socket
        #[arg(long)]
        sim: bool,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            sim,
            interval_ms,
            ticks,
        } => {
            if sim {
                run(SimHost::new(SystemClock), interval_ms, ticks);
            } else {
                match BridgeHost::from_env() {
                    Ok(host) => run(host, interval_ms, ticks),
                    Err(err) => {
                        error!(error = %err, "failed to resolve bridge host");
                        std::process::exit(1);
                    }
                }
            }
        }
        Commands::State { sim } => {
            if sim {
                print_state(SimHost::new(SystemClock));
            } else {
                match BridgeHost::from_env() {
                    Ok(host) => print_state(host),
                    Err(err) => {
                        error!(error = %err, "failed to resolve bridge host");
                        std::process::exit(1);
                    }
                }
            }
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run<A: HostAdapter>(adapter: A, interval_ms: u64, ticks: Option<u64>) {
    let mut engine = DeckEngine::new(adapter, SystemClock);
    engine.attach();
    info!("engine attached; probing for host");

    let mut last_scene: Option<String> = None;
    let mut last_relay: Option<bool> = None;
    let mut last_pipe: Option<String> = None;
    let mut remaining = ticks;

    loop {
        engine.tick();

        if let Some(state) = engine.snapshot() {
            let scene = state.scenes.active_scene_id.clone();
            if scene != last_scene {
                let name = scene
                    .as_deref()
                    .and_then(|id| {
                        state
                            .scenes
                            .items
                            .iter()
                            .find(|scene| scene.id == id)
                            .map(|scene| scene.name.clone())
                    })
                    .unwrap_or_else(|| "none".to_string());
                info!(scene = %name, "active scene changed");
                last_scene = scene;
            }

            let relay = Some(state.relay.active);
            if relay != last_relay {
                info!(
                    active = state.relay.active,
                    status = deck_core::snapshot::relay_display_status(&state.relay),
                    "relay state changed"
                );
                last_relay = relay;
            }

            let pipe = Some(format!("{:?}", state.pipe.status));
            if pipe != last_pipe {
                info!(status = ?state.pipe.status, "pipe status changed");
                last_pipe = pipe;
            }
        }
        if let Some(err) = engine.relay_error() {
            error!(error = %err, "relay error");
        }

        if let Some(left) = remaining.as_mut() {
            if *left == 0 {
                break;
            }
            *left -= 1;
        }
        thread::sleep(Duration::from_millis(interval_ms));
    }

    engine.detach();
    info!("engine detached");
}

fn print_state<A: HostAdapter>(mut adapter: A) {
    match adapter.pull() {
        Some(state) => match serde_json::to_string_pretty(&state) {
            Ok(json) => println!("{}", json),
            Err(err) => {
                error!(error = %err, "failed to serialize snapshot");
                std::process::exit(1);
            }
        },
        None => {
            error!("host unreachable");
            std::process::exit(1);
        }
    }
}
