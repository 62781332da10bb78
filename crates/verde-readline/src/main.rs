use std::borrow::Cow::{self, Borrowed, Owned};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context as LineContext, Editor, Helper};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use verde_application::{TurnResponse, VerdeApp};
use verde_core::session::Phase;
use verde_infrastructure::paths::DEFAULT_KNOWLEDGE_DIR;

mod commands;

use commands::{COMMANDS, Command};

const SESSION_ID: &str = "cli-session";

#[derive(Parser)]
#[command(name = "verde")]
#[command(about = "VERDE - conversational early-stage building design assistant", long_about = None)]
struct Cli {
    /// Knowledge directory shared with the predictor and the geometry host
    #[arg(long, short, default_value = DEFAULT_KNOWLEDGE_DIR)]
    knowledge: PathBuf,

    /// Log at debug level regardless of VERDE_LOG
    #[arg(long, short)]
    verbose: bool,
}

/// CLI helper for rustyline that provides completion, highlighting, and hints.
#[derive(Clone)]
struct CliHelper {
    commands: Vec<String>,
}

impl CliHelper {
    fn new() -> Self {
        Self {
            commands: COMMANDS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Helper for CliHelper {}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &LineContext<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];

        if line.starts_with('/') {
            let candidates: Vec<Pair> = self
                .commands
                .iter()
                .filter(|cmd| cmd.starts_with(line))
                .map(|cmd| Pair {
                    display: cmd.clone(),
                    replacement: cmd.clone(),
                })
                .collect();
            Ok((0, candidates))
        } else {
            Ok((0, vec![]))
        }
    }
}

impl Highlighter for CliHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for CliHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &LineContext<'_>) -> Option<String> {
        let line = &line[..pos];

        if line.starts_with('/') && !line.contains(' ') {
            self.commands
                .iter()
                .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
                .map(|cmd| cmd[line.len()..].to_string())
        } else {
            None
        }
    }
}

impl Validator for CliHelper {}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("VERDE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_turn(turn: &TurnResponse) {
    let color = |line: &str| match turn.phase {
        Phase::One => line.bright_blue(),
        Phase::Two => line.bright_green(),
    };
    for line in turn.response.lines() {
        println!("{}", color(line));
    }
    if turn.trigger_geometry_generation {
        println!("{}", "geometry request written for the host".bright_black());
    }
    if let Some(version) = turn.version {
        println!("{}", format!("saved {}", version).bright_magenta());
    }
    if let Some(error) = &turn.error {
        println!("{}", format!("[{}] {}", turn.state, error).yellow());
    }
    println!();
}

/// The Verde REPL.
///
/// Bootstraps the application from the knowledge directory, starts the
/// watcher and the phase-gate synchronizer, then runs one orchestrator turn
/// per input line. Slash commands inspect the session and the version store.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // ===== Backend Initialization =====
    let app = VerdeApp::from_knowledge_dir(&cli.knowledge).with_context(|| {
        format!("Failed to open knowledge directory {}", cli.knowledge.display())
    })?;
    let orchestrator = app.orchestrator();
    let turn_timeout = Duration::from_secs(app.config().llm.timeout_secs.saturating_add(5));

    let cancel = CancellationToken::new();
    let background = app.start_background(cancel.clone());

    // ===== REPL Setup =====
    let helper = CliHelper::new();
    let mut rl = Editor::new().context("Failed to start line editor")?;
    rl.set_helper(Some(helper));

    println!("{}", "=== Verde ===".bright_magenta().bold());
    println!(
        "{}",
        format!("Knowledge directory: {}", app.paths().root().display()).bright_black()
    );
    println!("{}", "Type '/help' for commands, or 'quit' to exit.".bright_black());
    println!();

    print_turn(&orchestrator.handle_turn(SESSION_ID, "").await);

    // ===== Main REPL Loop =====
    loop {
        let readline = rl.readline(">> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();

                if trimmed == "quit" || trimmed == "exit" {
                    println!("{}", "Goodbye!".bright_green());
                    break;
                }

                if trimmed.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(&line);

                if trimmed.starts_with('/') {
                    match Command::parse(trimmed) {
                        Ok(command) => {
                            if let Err(e) = command.run(&orchestrator, SESSION_ID).await {
                                eprintln!("{}", format!("Error: {:#}", e).red());
                            }
                        }
                        Err(message) => println!("{}", message.yellow()),
                    }
                    continue;
                }

                println!("{}", format!("> {}", trimmed).green());

                match timeout(turn_timeout, orchestrator.handle_turn(SESSION_ID, trimmed)).await {
                    Ok(turn) => print_turn(&turn),
                    Err(_) => println!("{}", "Error: Request timed out.".red()),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'quit' to exit.".yellow());
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        }
    }

    // Stop the watcher and synchronizer
    cancel.cancel();
    for handle in background {
        let _ = handle.await;
    }

    Ok(())
}
