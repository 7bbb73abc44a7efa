//! Conquest session runner.
//!
//! Hosts or joins a multiplayer match over TCP. The host owns the
//! lobby and relays every action; each peer runs its own simulation
//! and stays in lockstep by applying the same actions.
//!
//! # Usage
//!
//! ```bash
//! # Open a lobby on the default port
//! cargo run -p conquest_net -- host --name Wren
//!
//! # Join from another machine
//! cargo run -p conquest_net -- join 192.168.0.10:7777 --name Piet
//! ```
//!
//! Both ends read commands from stdin, one per line. The host accepts
//! `start`, `say <text>`, `send <source> <target> <percent>`, and
//! `quit`; a joined peer accepts the same minus `start`. Logs go to
//! stderr.

use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use conquest_core::action::Action;
use conquest_core::faction::FactionId;
use conquest_core::map::LayoutConfig;
use conquest_core::rng::SimRng;
use conquest_core::simulation::{ConquestSim, TICK_MS};
use conquest_net::client::{ClientEvent, ClientReader, ClientSession, ClientWriter};
use conquest_net::error::{NetError, Result};
use conquest_net::host::{HostCommand, HostHandle, HostSession};
use conquest_net::wire::PeerProfile;
use conquest_net::NetConfig;

#[derive(Parser)]
#[command(name = "conquest_net")]
#[command(about = "Host or join a conquest match over TCP")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a lobby and relay the match
    Host {
        /// Port to listen on
        #[arg(short, long, default_value = "7777")]
        port: u16,

        /// Display name shown in the roster
        #[arg(short, long, default_value = "host")]
        name: String,

        /// Avatar glyph shown next to the name
        #[arg(long, default_value = "♞")]
        glyph: String,

        /// Layout seed for the generated map
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Join a hosted lobby
    Join {
        /// Host address, e.g. 192.168.0.10:7777
        addr: String,

        /// Display name shown in the roster
        #[arg(short, long, default_value = "player")]
        name: String,

        /// Avatar glyph shown next to the name
        #[arg(long, default_value = "♜")]
        glyph: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout stays free for the player.
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    let outcome = match cli.command {
        Commands::Host {
            port,
            name,
            glyph,
            seed,
        } => run_host(port, name, glyph, seed).await,
        Commands::Join { addr, name, glyph } => run_join(&addr, name, glyph).await,
    };

    if let Err(err) = outcome {
        eprintln!("session ended: {err}");
        std::process::exit(1);
    }
}

/// Host a session: open the lobby, drive the hub, feed it console
/// commands until it shuts down.
async fn run_host(port: u16, name: String, glyph: String, seed: u64) -> Result<()> {
    let config = NetConfig {
        port,
        ..NetConfig::default()
    };
    let layout = LayoutConfig {
        seed,
        ..LayoutConfig::default()
    };
    let (session, handle) = HostSession::bind(config, PeerProfile::new(name, glyph), layout).await?;
    eprintln!("hosting on {}", session.local_addr()?);
    eprintln!("commands: start | say <text> | send <source> <target> <percent> | quit");

    tokio::select! {
        result = session.run() => result,
        result = host_console(handle) => result,
    }
}

/// Read host console commands from stdin until quit or EOF.
async fn host_console(handle: HostHandle) -> Result<()> {
    let mut seeds = SimRng::new(entropy_seed());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(command) = parse_host_command(&line, &mut seeds) {
            let shutdown = matches!(command, HostCommand::Shutdown);
            handle.command(command).await?;
            if shutdown {
                break;
            }
        }
    }
    Ok(())
}

fn parse_host_command(line: &str, seeds: &mut SimRng) -> Option<HostCommand> {
    let line = line.trim();
    let mut parts = line.split_whitespace();
    match parts.next()? {
        "start" => Some(HostCommand::StartMatch),
        "quit" | "exit" => Some(HostCommand::Shutdown),
        "say" => line
            .strip_prefix("say")
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(|text| HostCommand::Chat(text.to_string())),
        "send" => match parse_send(&mut parts, seeds) {
            Some(action) => Some(HostCommand::Dispatch(action)),
            None => {
                eprintln!("usage: send <source> <target> <percent>");
                None
            }
        },
        other => {
            eprintln!("unknown command: {other}");
            None
        }
    }
}

/// Join a session: sit in the lobby, then run a lockstep simulation
/// from the start snapshot, relaying our own dispatches to the host.
async fn run_join(addr: &str, name: String, glyph: String) -> Result<()> {
    let (session, roster) = ClientSession::connect(addr, PeerProfile::new(name, glyph)).await?;
    eprintln!("{}", session.status());
    print_roster(&roster);

    let (reader, mut writer) = session.split();
    // Frames are pumped through a channel so console input can be
    // awaited alongside them without abandoning a half-read frame.
    let (inbox_tx, mut inbox) = mpsc::channel(64);
    tokio::spawn(pump_events(reader, inbox_tx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // Lobby phase: chat until the host starts the match.
    let snapshot = loop {
        tokio::select! {
            event = inbox.recv() => match event {
                Some(Ok(ClientEvent::Start(snapshot))) => break snapshot,
                Some(Ok(ClientEvent::Roster(peers))) => print_roster(&peers),
                Some(Ok(ClientEvent::Chat { from, text })) => eprintln!("[{from}] {text}"),
                Some(Ok(ClientEvent::Action { .. })) => {}
                Some(Err(err)) => return Err(err),
                None => return Err(NetError::Disconnected),
            },
            line = lines.next_line() => match line? {
                Some(line) => {
                    let line = line.trim();
                    if line == "quit" {
                        writer.leave().await?;
                        return Ok(());
                    }
                    if !line.is_empty() {
                        writer.send_chat(line).await?;
                    }
                }
                None => {
                    writer.leave().await?;
                    return Ok(());
                }
            },
        }
    };

    let faction = snapshot.assigned_faction;
    let mut sim = ConquestSim::from_snapshot(&snapshot);
    eprintln!(
        "match started: {} strongholds, you are faction {faction}",
        snapshot.strongholds.len()
    );
    eprintln!("commands: send <source> <target> <percent> | say <text> | hash | quit");

    let mut seeds = SimRng::new(entropy_seed());
    let mut ticker = tokio::time::interval(Duration::from_millis(TICK_MS));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let events = sim.tick();
                if let Some(winner) = events.winner {
                    if winner.0 == faction {
                        eprintln!("victory: faction {winner} holds the map");
                    } else {
                        eprintln!("defeat: faction {winner} holds the map");
                    }
                    break;
                }
            }
            event = inbox.recv() => match event {
                Some(Ok(ClientEvent::Action { faction: issuer, action })) => {
                    if let Err(err) = sim.apply_action(FactionId(issuer), &action) {
                        tracing::warn!(issuer, %err, "relayed action rejected");
                    }
                }
                Some(Ok(ClientEvent::Chat { from, text })) => eprintln!("[{from}] {text}"),
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    eprintln!("connection lost: {err}");
                    break;
                }
                None => {
                    eprintln!("connection lost");
                    break;
                }
            },
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !match_command(&line, faction, &mut sim, &mut writer, &mut seeds).await? {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    writer.leave().await.ok();
    Ok(())
}

/// Forward inbound events into a channel the select loop can poll.
async fn pump_events(mut reader: ClientReader, inbox: mpsc::Sender<Result<ClientEvent>>) {
    loop {
        match reader.next_event().await {
            Ok(event) => {
                if inbox.send(Ok(event)).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                let _ = inbox.send(Err(err)).await;
                return;
            }
        }
    }
}

/// Handle one console line during the match. Returns `false` on quit.
async fn match_command(
    line: &str,
    faction: u8,
    sim: &mut ConquestSim,
    writer: &mut ClientWriter,
    seeds: &mut SimRng,
) -> Result<bool> {
    let line = line.trim();
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("send") => {
            if let Some(action) = parse_send(&mut parts, seeds) {
                // Apply locally first; only actions the simulation
                // accepts are worth relaying.
                match sim.apply_action(FactionId(faction), &action) {
                    Ok(_) => writer.send_action(faction, action).await?,
                    Err(err) => eprintln!("rejected: {err}"),
                }
            } else {
                eprintln!("usage: send <source> <target> <percent>");
            }
        }
        Some("say") => {
            if let Some(text) = line.strip_prefix("say").map(str::trim) {
                if !text.is_empty() {
                    writer.send_chat(text).await?;
                }
            }
        }
        Some("hash") => {
            eprintln!("tick {} hash {:016x}", sim.get_tick(), sim.state_hash());
        }
        Some("quit") => return Ok(false),
        Some(other) => eprintln!("unknown command: {other}"),
        None => {}
    }
    Ok(true)
}

fn parse_send(parts: &mut std::str::SplitWhitespace<'_>, seeds: &mut SimRng) -> Option<Action> {
    let source = parts.next()?.parse().ok()?;
    let target = parts.next()?.parse().ok()?;
    let percentage = parts.next()?.parse().ok()?;
    Some(Action::SendUnits {
        source,
        target,
        percentage,
        seed: seeds.next_u64(),
    })
}

fn print_roster(peers: &[PeerProfile]) {
    eprintln!("lobby roster:");
    for peer in peers {
        eprintln!("  {} {}", peer.avatar_glyph, peer.display_name);
    }
}

/// Seed for this peer's dispatch seed stream. Wall-clock entropy is
/// fine here: the seed travels inside each action, so peers never need
/// to agree on it.
fn entropy_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0x5EED_CA5E, |d| d.as_secs() ^ u64::from(d.subsec_nanos()))
}
