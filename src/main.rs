//! STRATA - Interactive Shell
//! A small REPL over one Strata data directory.
//!
//! Environment:
//! - `STRATA_DATA_DIR`: storage directory (default `./data`)
//! - `STRATA_MEMTABLE_CAPACITY`: entries buffered before a flush (default 100)
//! - `RUST_LOG`: log filter for `env_logger`

use std::io::{self, BufRead, Write};

use strata::config::Config;
use strata::engine::Strata;
use strata::error::{Result, StrataError};
use strata::types::Value;

fn config_from_env() -> Result<Config> {
    let mut config = Config::default();
    if let Ok(dir) = std::env::var("STRATA_DATA_DIR") {
        config.data_dir = dir.into();
    }
    if let Ok(raw) = std::env::var("STRATA_MEMTABLE_CAPACITY") {
        let capacity = raw.parse().map_err(|_| {
            StrataError::Config(format!("STRATA_MEMTABLE_CAPACITY is not a number: {:?}", raw))
        })?;
        config = config.with_memtable_capacity(capacity);
    }
    Ok(config)
}

/// Interpret shell input as JSON when possible, otherwise as a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::Str(raw.to_string()))
}

/// Split a `set <key> <value>` line into key and value, keeping the value
/// text exactly as typed apart from surrounding whitespace.
fn split_key_value(args: &str) -> Option<(&str, &str)> {
    let (key, value) = args.trim_start().split_once(char::is_whitespace)?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some((key, value))
}

fn print_banner() {
    println!();
    println!("  ╔═══════════════════════════════════════════╗");
    println!("  ║           STRATA Storage Engine           ║");
    println!("  ║        Embedded LSM Key-Value Store       ║");
    println!("  ╚═══════════════════════════════════════════╝");
    println!();
    println!("  Commands:");
    println!("    set <key> <value>  - Store a value (JSON or plain text)");
    println!("    get <key>          - Retrieve a value by key");
    println!("    del <key>          - Delete a key");
    println!("    flush              - Write the MemTable to a new segment");
    println!("    compact            - Merge all segments into one");
    println!("    scan               - List all live key-value pairs");
    println!("    info               - Show engine statistics");
    println!("    exit               - Flush and shut down");
    println!();
}

fn run() -> Result<()> {
    let mut engine = Strata::open(config_from_env()?)?;
    print_banner();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    loop {
        print!("strata> ");
        stdout.flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0].to_lowercase().as_str() {
            "set" | "put" => {
                let args = line.trim_start()[parts[0].len()..].trim_end();
                let Some((key, raw)) = split_key_value(args) else {
                    println!("  Usage: set <key> <value>");
                    continue;
                };
                match engine.put(key, parse_value(raw)) {
                    Ok(()) => println!("  OK"),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "get" => {
                if parts.len() < 2 {
                    println!("  Usage: get <key>");
                    continue;
                }
                match engine.get(parts[1]) {
                    Ok(Some(value)) => println!("  {}", value),
                    Ok(None) => println!("  (nil)"),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "del" | "delete" => {
                if parts.len() < 2 {
                    println!("  Usage: del <key>");
                    continue;
                }
                match engine.delete(parts[1]) {
                    Ok(()) => println!("  OK (deleted)"),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "flush" => match engine.flush() {
                Ok(()) => println!("  OK ({} segments)", engine.segment_count()),
                Err(e) => println!("  ERROR: {}", e),
            },
            "compact" => match engine.compact() {
                Ok(()) => println!("  OK ({} segments)", engine.segment_count()),
                Err(e) => println!("  ERROR: {}", e),
            },
            "scan" | "list" => match engine.scan() {
                Ok(entries) if entries.is_empty() => println!("  (empty)"),
                Ok(entries) => {
                    for (key, value) in &entries {
                        println!("  {} -> {}", key, value);
                    }
                    println!("  ({} entries)", entries.len());
                }
                Err(e) => println!("  ERROR: {}", e),
            },
            "info" | "stats" => {
                println!("  Directory:       {}", engine.data_dir().display());
                println!(
                    "  MemTable:        {}/{} entries",
                    engine.memtable_len(),
                    engine.config().memtable_capacity
                );
                println!("  Generations:     {:?}", engine.generations());
                println!("  Next generation: {}", engine.next_generation());
                println!("{}", engine.metrics().report());
            }
            "exit" | "quit" | "q" => {
                println!("  Shutting down STRATA...");
                break;
            }
            _ => {
                println!("  Unknown command: '{}'. Type 'exit' to quit.", parts[0]);
            }
        }
    }

    engine.close()
}

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        eprintln!("[ERROR] {}", err);
        std::process::exit(1);
    }
}
