mod attendance;
mod calendar;
mod csv_io;
mod dates;
mod db;
mod error;
mod ics;
mod import;
mod ipc;
mod reports;
mod roster;
mod tracing_setup;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use crate::tracing_setup::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(
    name = "attendanced",
    version,
    about = "School attendance sidecar speaking JSON lines over stdin/stdout"
)]
struct Cli {
    /// Workspace directory to open at startup (holds attendance.sqlite3)
    #[arg(long, global = true, env = "ATTENDANCED_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// School name used in export titles
    #[arg(
        long,
        global = true,
        env = "ATTENDANCED_SCHOOL_NAME",
        default_value = "School"
    )]
    school_name: String,

    /// Debug logging (RUST_LOG still wins when set)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer requests on stdin until it closes (default)
    Serve,
    /// Create or migrate the workspace database and exit
    InitDb,
    /// Create the admin account if it does not exist yet
    CreateAdmin {
        #[arg(long, default_value = "admin")]
        username: String,
        #[arg(long)]
        password: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&TracingConfig { debug: cli.debug }).ok();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cli.workspace.as_deref(), cli.school_name),
        Commands::InitDb => {
            let workspace = require_workspace(cli.workspace.as_deref())?;
            db::open_db(workspace)?;
            info!(workspace = %workspace.display(), "database ready");
            Ok(())
        }
        Commands::CreateAdmin { username, password } => {
            let workspace = require_workspace(cli.workspace.as_deref())?;
            let conn = db::open_db(workspace)?;
            let created = roster::ensure_admin(&conn, &username, &password)
                .with_context(|| format!("failed to create admin user {username}"))?;
            if created {
                info!(%username, "admin user created");
            } else {
                info!(%username, "admin user already exists");
            }
            Ok(())
        }
    }
}

fn require_workspace(workspace: Option<&Path>) -> Result<&Path> {
    workspace.context("--workspace (or ATTENDANCED_WORKSPACE) is required for this command")
}

fn serve(workspace: Option<&Path>, school_name: String) -> Result<()> {
    let mut state = ipc::AppState::new(school_name);
    if let Some(path) = workspace {
        state.db = Some(db::open_db(path)?);
        state.workspace = Some(path.to_path_buf());
        info!(workspace = %path.display(), "workspace opened");
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer with; reply anyway so the caller is not left waiting.
                warn!(error = %e, "unparseable request line");
                let _ = writeln!(
                    stdout,
                    "{}",
                    json!({ "ok": false, "error": { "code": "bad_json", "message": e.to_string() } })
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    Ok(())
}
