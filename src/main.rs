//! Dllbridge console
//!
//! Line-oriented development driver for the native extension bridge. It
//! stands in for the embedding script REPL: `load`, `unload`, `reload`,
//! `list`, and `call` map directly onto the extension API surface, which is
//! where all the actual behavior lives.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use dllbridge::api::ExtensionHost;
use dllbridge::config::ConsoleConfig;
use dllbridge::script::ScriptValue;

#[derive(Parser)]
#[command(name = "dllbridge")]
#[command(version)]
#[command(about = "Native extension bridge console", long_about = None)]
struct Cli {
    /// Configuration file (default: discover console.toml upward from cwd)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Additional library search path (repeatable)
    #[arg(long = "search-path")]
    search_paths: Vec<PathBuf>,

    /// Library to load before the first command (repeatable)
    #[arg(long = "load")]
    preload: Vec<String>,

    /// Command script to execute instead of reading stdin
    script: Option<PathBuf>,
}

enum Outcome {
    Continue,
    Quit,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConsoleConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ConsoleConfig::load_or_default(),
    };

    let mut host = ExtensionHost::new();
    for path in config.extensions.search_paths {
        host.add_search_path(path);
    }
    for path in &cli.search_paths {
        host.add_search_path(path.clone());
    }

    for spec in config.extensions.preload.iter().chain(cli.preload.iter()) {
        match host.load_dll(spec) {
            Ok(names) => println!("{names}"),
            Err(e) => eprintln!("{}: {}", e.kind(), e),
        }
    }

    match &cli.script {
        Some(path) => run_script(&mut host, path),
        None => run_interactive(&mut host),
    }
}

fn run_script(host: &mut ExtensionHost, path: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    for line in content.lines() {
        if let Outcome::Quit = execute(host, line) {
            break;
        }
    }
    Ok(())
}

fn run_interactive(host: &mut ExtensionHost) -> Result<()> {
    println!("dllbridge console (type 'help' for commands)");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if let Outcome::Quit = execute(host, &line) {
            break;
        }
    }
    Ok(())
}

fn execute(host: &mut ExtensionHost, line: &str) -> Outcome {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
        return Outcome::Continue;
    }

    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    let result = match (command, rest.as_slice()) {
        ("quit", _) | ("exit", _) => return Outcome::Quit,
        ("help", _) => {
            print_help(host);
            Ok(None)
        }
        ("list", _) => {
            for record in host.registry().records() {
                let age = record
                    .loaded_at()
                    .elapsed()
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                println!(
                    "{} (version {}, {} exports, loaded {age}s ago)",
                    record.canonical_path().display(),
                    record.version(),
                    record.export_names().len()
                );
            }
            Ok(None)
        }
        ("load", [spec]) => host.load_dll(spec).map(Some),
        ("unload", [spec]) => host.unload_dll(spec).map(Some),
        ("reload", [spec]) => host.reload_dll(spec).map(Some),
        ("call", [name, args @ ..]) => {
            let args: Vec<ScriptValue> = args.iter().map(|a| parse_arg(a)).collect();
            host.call(name, &args).map(Some)
        }
        _ => {
            eprintln!("unrecognized command: {line} (try 'help')");
            Ok(None)
        }
    };

    match result {
        Ok(Some(value)) => println!("{value}"),
        Ok(None) => {}
        // Bridge errors are catchable script values, so the console reports
        // them and keeps going.
        Err(e) => eprintln!("{}: {}", e.kind(), e),
    }
    Outcome::Continue
}

/// Parse one call argument the way the script side would type it.
fn parse_arg(token: &str) -> ScriptValue {
    match token {
        "true" => ScriptValue::Bool(true),
        "false" => ScriptValue::Bool(false),
        "undefined" => ScriptValue::Undefined,
        _ => {
            if let Ok(n) = token.parse::<f64>() {
                ScriptValue::Number(n)
            } else {
                ScriptValue::string(token.trim_matches('"'))
            }
        }
    }
}

fn print_help(host: &ExtensionHost) {
    println!("commands:");
    println!("  load <path|name>     load a native library and bind its exports");
    println!("  unload <path|name>   unload a library and withdraw its exports");
    println!("  reload <path|name>   hot-reload a library from disk");
    println!("  list                 show loaded libraries");
    println!("  call <fn> [args...]  call a bound export");
    println!("  help, quit");

    let mut any = false;
    for record in host.registry().records() {
        if !any {
            println!("bound exports:");
            any = true;
        }
        for binding in record.bindings() {
            if binding.description.is_empty() {
                println!("  {}", binding.signature);
            } else {
                println!("  {}  ({})", binding.signature, binding.description);
            }
        }
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dllbridge=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
