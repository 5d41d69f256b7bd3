//! Interactive operator driver for the Chord overlay.
//!
//! This binary hosts zero or more local nodes inside one process (each
//! bound to its own port on the same IP) and drives them through a
//! line-oriented command loop. The menu/dispatch logic here is explicitly
//! out of the core per the specification — it is a thin collaborator over
//! `chord::Overlay`'s public API.

use std::io::Write;

use clap::Parser;
use log::{error, info, LevelFilter};
use tokio::io::{AsyncBufReadExt, BufReader};

use chord::identifier::HashRingKey;
use chord::{ChordError, Config, Key, Overlay};

/// Process-wide startup configuration. One process hosts a family of
/// nodes sharing the same IP and the same protocol tunables; individual
/// nodes are distinguished by port.
#[derive(Parser, Debug)]
#[command(name = "chord-node", about = "Run an interactive Chord overlay host")]
struct StartupArgs {
    /// IP address every locally hosted node binds to and advertises.
    #[arg(long, default_value = "127.0.0.1")]
    ip: String,

    #[arg(long, default_value_t = 3)]
    max_node_init_retries: u32,
    #[arg(long, default_value_t = 5)]
    max_transport_retries: u32,
    #[arg(long, default_value_t = 5)]
    max_file_publish_retries: u32,
    #[arg(long, default_value_t = 2_500)]
    periodic_interval_ms: u64,
    #[arg(long, default_value_t = 3)]
    max_successor_number: usize,
    #[arg(long, default_value_t = 5_000)]
    rpc_timeout_ms: u64,
    #[arg(long)]
    dev_mode: bool,

    /// trace, debug, info, warn, or error.
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// One line of operator input, parsed the same way the process-wide args
/// are: a tiny `clap` grammar reused per command instead of a hand-rolled
/// tokenizer.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
enum ReplCommand {
    /// Create and join a new local node on `port` (random bootstrap peer
    /// chosen among already-hosted local nodes; alone if none exist yet).
    CreateNode { port: u16 },
    /// Gracefully remove the local node hosted on `port`.
    LeaveNode { port: u16 },
    /// Publish `value` under the key `hash(name)` through an arbitrary
    /// local node.
    Publish { name: String, value: String },
    /// Look up the value published under `hash(name)`.
    Lookup { name: String },
    /// Delete whatever is stored under `hash(name)`.
    Delete { name: String },
    /// List every locally hosted node's port and ring id, ordered by id.
    PrintRing,
    /// Print predecessor/successor-list/alone status for one local node.
    /// Requires `--dev-mode`. `--json` prints the snapshot as JSON instead
    /// of the plain-text listing.
    PrintNodeStatus {
        port: u16,
        #[arg(long)]
        json: bool,
    },
    /// Exit the process, leaving every hosted node gracefully first.
    Exit,
}

fn level_filter(name: &str) -> LevelFilter {
    match name.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = StartupArgs::parse();
    simple_logger::SimpleLogger::new()
        .env()
        .with_level(level_filter(&args.log_level))
        .init()
        .unwrap();

    let config = Config::try_new(
        args.max_node_init_retries,
        args.max_transport_retries,
        args.max_file_publish_retries,
        args.periodic_interval_ms,
        args.max_successor_number,
        args.rpc_timeout_ms,
        args.dev_mode,
    )?;

    let dev_mode = args.dev_mode;
    let mut overlay = Overlay::new(args.ip.clone(), config);
    info!("chord-node ready on {}; type a command or `help`", args.ip);

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("chord> ");
        std::io::stdout().flush().ok();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let tokens = match shell_words_split(line) {
            Ok(t) => t,
            Err(e) => {
                println!("ERROR: {e}");
                continue;
            }
        };

        let command = match ReplCommand::try_parse_from(&tokens) {
            Ok(c) => c,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match command {
            ReplCommand::CreateNode { port } => match overlay.join(port).await {
                Ok(()) => println!("node created on port {port}"),
                Err(e) => report(e),
            },
            ReplCommand::LeaveNode { port } => match overlay.leave(port).await {
                Ok(()) => println!("node on port {port} left"),
                Err(e) => report(e),
            },
            ReplCommand::Publish { name, value } => match overlay.publish(&name, value).await {
                Ok(key) => println!("published {name} as key {key}"),
                Err(e) => report(e),
            },
            ReplCommand::Lookup { name } => {
                let key = Key::hash(&name);
                match overlay.lookup(key).await {
                    Ok(Some(value)) => println!("{value}"),
                    Ok(None) => println!("not found"),
                    Err(e) => report(e),
                }
            }
            ReplCommand::Delete { name } => {
                let key = Key::hash(&name);
                match overlay.delete(key).await {
                    Ok(()) => println!("deleted"),
                    Err(e) => report(e),
                }
            }
            ReplCommand::PrintRing => {
                for (port, id) in overlay.print_ring() {
                    println!("port {port}: id {id}");
                }
            }
            ReplCommand::PrintNodeStatus { port, json } => {
                if !dev_mode {
                    println!("ERROR: print-node-status requires --dev-mode (debug/introspection surface is disabled by default)");
                    continue;
                }
                match overlay.node_summary(port) {
                    Ok(summary) if json => match serde_json::to_string_pretty(&summary) {
                        Ok(rendered) => println!("{rendered}"),
                        Err(e) => error!("failed to render node status as json: {e}"),
                    },
                    Ok(summary) => {
                        println!("self: {}", summary.self_info);
                        println!("alone: {}", summary.alone);
                        println!(
                            "predecessor: {}",
                            summary.predecessor.map(|p| p.to_string()).unwrap_or_else(|| "none".into())
                        );
                        for (i, s) in summary.successor_list.iter().enumerate() {
                            println!("successor[{i}]: {s}");
                        }
                        match overlay.node_finger_table(port) {
                            Ok(fingers) => {
                                for (i, finger) in fingers.iter().enumerate() {
                                    match finger {
                                        Some(f) => println!("finger[{}]: {f}", i + 1),
                                        None => println!("finger[{}]: unset", i + 1),
                                    }
                                }
                            }
                            Err(e) => report(e),
                        }
                    }
                    Err(e) => report(e),
                }
            }
            ReplCommand::Exit => break,
        }
    }

    overlay.leave_all().await;
    info!("goodbye");
    Ok(())
}

fn report(err: ChordError) {
    if err.is_not_found() {
        println!("not found");
    } else {
        error!("{err}");
        println!("ERROR: {err}");
    }
}

/// Minimal whitespace/quote-aware splitter for REPL input, just enough to
/// let `publish` take a quoted value containing spaces.
fn shell_words_split(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated quote".to_string());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}
