//! Shared canvas state CLI.
//!
//! Applies agent mutation calls to a persisted session document under
//! `.canvas/`, printing one JSON snapshot line per committed change.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use canvas::core::types::SessionKey;
use canvas::dispatch::MutationCall;
use canvas::exit_codes;
use canvas::io::broadcast::JsonLinesBroadcaster;
use canvas::io::init::{CanvasPaths, InitOptions, init_canvas};
use canvas::io::persistence::{Backend, StatePersistence};
use canvas::session::{Engine, TurnRequest};
use canvas::validate::{SessionValidation, validate_session};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(
    name = "canvas",
    version,
    about = "Shared canvas state for agent/UI sessions"
)]
struct Cli {
    /// Project root containing `.canvas/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.canvas/` with a default config.
    Init {
        /// Overwrite existing config files.
        #[arg(short, long)]
        force: bool,
    },
    /// Run one turn: reconcile the incoming state, then apply the calls in order.
    Apply {
        #[arg(long)]
        session: String,
        /// JSON file with an array of `{name, args}` calls, or a `{state, calls}` turn.
        #[arg(long)]
        calls: PathBuf,
        /// JSON file with the state handed over by the host.
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Print the session document (the initial template if none is persisted).
    Show {
        #[arg(long)]
        session: String,
    },
    /// Replace the session document with the initial template.
    Reset {
        #[arg(long)]
        session: String,
    },
    /// Check the persisted session against the schema and invariants.
    Validate {
        #[arg(long)]
        session: String,
    },
}

fn main() {
    canvas::logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Apply {
            session,
            calls,
            state,
        } => cmd_apply(&cli.root, &session, &calls, state.as_deref()),
        Command::Show { session } => cmd_show(&cli.root, &session),
        Command::Reset { session } => cmd_reset(&cli.root, &session),
        Command::Validate { session } => cmd_validate(&cli.root, &session),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_canvas(root, &InitOptions { force })?;
    println!("{}", paths.canvas_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_apply(root: &Path, session: &str, calls: &Path, state: Option<&Path>) -> Result<i32> {
    let key = parse_key(session)?;
    let mut request = read_turn(calls)?;
    if let Some(path) = state {
        request.state = Some(read_json(path)?);
    }

    let engine = open_engine(root)?;
    let mut session = engine.open_session(&key)?;
    let response = engine.run_turn(&mut session, &request)?;

    let mut stdout = io::stdout().lock();
    let line = serde_json::to_string(&response.outcomes).context("serialize outcomes")?;
    writeln!(stdout, "{line}").context("write outcomes")?;

    if response.outcomes.iter().all(|outcome| outcome.applied) {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::REJECTED)
    }
}

fn cmd_show(root: &Path, session: &str) -> Result<i32> {
    let key = parse_key(session)?;
    let engine = open_engine(root)?;
    let state = engine
        .persistence()
        .get(&key)
        .with_context(|| format!("load session {key}"))?
        .unwrap_or_default();
    let mut payload = serde_json::to_string_pretty(&state).context("serialize state")?;
    payload.push('\n');
    io::stdout()
        .lock()
        .write_all(payload.as_bytes())
        .context("write state")?;
    Ok(exit_codes::OK)
}

fn cmd_reset(root: &Path, session: &str) -> Result<i32> {
    let key = parse_key(session)?;
    let engine = open_engine(root)?;
    let mut session = engine.open_session(&key)?;
    engine.reset_session(&mut session)?;
    Ok(exit_codes::OK)
}

fn cmd_validate(root: &Path, session: &str) -> Result<i32> {
    let key = parse_key(session)?;
    match validate_session(root, &key)? {
        SessionValidation::Missing => {
            println!("session {key}: not persisted");
            Ok(exit_codes::OK)
        }
        SessionValidation::Loaded { violations } if violations.is_empty() => {
            println!("session {key}: ok");
            Ok(exit_codes::OK)
        }
        SessionValidation::Loaded { violations } => {
            println!("session {key}: invariant violations:\n- {}", violations.join("\n- "));
            Ok(exit_codes::INCONSISTENT)
        }
    }
}

fn open_engine(root: &Path) -> Result<Engine<Backend, JsonLinesBroadcaster<io::Stdout>>> {
    let paths = CanvasPaths::new(root);
    let config = paths.load_config().context("load config.toml")?;
    Ok(Engine::new(
        Backend::from_config(root, &config),
        JsonLinesBroadcaster::new(io::stdout()),
        config.guard.policy,
    ))
}

fn parse_key(raw: &str) -> Result<SessionKey> {
    SessionKey::new(raw).map_err(|err| anyhow!(err))
}

/// Accept either a bare array of calls or a full `{state, calls}` turn.
fn read_turn(path: &Path) -> Result<TurnRequest> {
    let value = read_json(path)?;
    if value.is_array() {
        let calls: Vec<MutationCall> = serde_json::from_value(value)
            .with_context(|| format!("parse calls {}", path.display()))?;
        return Ok(TurnRequest { state: None, calls });
    }
    serde_json::from_value(value).with_context(|| format!("parse turn {}", path.display()))
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["canvas", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_apply_with_state() {
        let cli = Cli::parse_from([
            "canvas",
            "--root",
            "/tmp/project",
            "apply",
            "--session",
            "demo",
            "--calls",
            "calls.json",
            "--state",
            "state.json",
        ]);
        let Command::Apply {
            session,
            calls,
            state,
        } = cli.command
        else {
            panic!("expected apply");
        };
        assert_eq!(session, "demo");
        assert_eq!(calls, PathBuf::from("calls.json"));
        assert_eq!(state, Some(PathBuf::from("state.json")));
        assert_eq!(cli.root, PathBuf::from("/tmp/project"));
    }

    #[test]
    fn read_turn_accepts_bare_call_arrays() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("calls.json");
        fs::write(&path, r#"[{"name": "complete_plan"}]"#).expect("write");
        let turn = read_turn(&path).expect("turn");
        assert_eq!(turn.calls.len(), 1);
        assert_eq!(turn.calls[0].args, Value::Null);
        assert_eq!(turn.state, None);
    }
}
