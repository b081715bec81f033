//! lparctl - run commands on an HMC/IVM console and manage the partition
//! UUID table.
//!
//! ```bash
//! lparctl --target phyp://hscroot@hmc01/Server-8203-E4A exec 'lssyscfg -r sys -F name'
//! lparctl exec-int 'lssyscfg -r lpar -m sys1 -F lpar_id | wc -l'
//! lparctl table list --json
//! lparctl table add 7
//! lparctl table remove 7
//! ```

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use lparctl_core::auth::AuthPrompt;
use lparctl_core::config::{Config, LogFormat};
use lparctl_core::connection::Connection;
use lparctl_core::logging::{LogConfig, init_logging};
use lparctl_core::target::Target;
use uuid::Uuid;

/// Run console commands and manage stable partition UUIDs over SSH
#[derive(Parser, Debug)]
#[command(name = "lparctl", version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/lparctl/lparctl.toml)
    #[arg(long, global = true, env = "LPARCTL_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Console target, e.g. phyp://user@host/managed_system
    #[arg(short, long, global = true, env = "LPARCTL_TARGET", value_name = "URI")]
    target: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log format (pretty or json)
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a command and print its output; exits with the remote exit code
    Exec {
        /// Command text, passed to the console shell verbatim
        command: String,
    },

    /// Run a command and print the integer on its first output line
    ExecInt { command: String },

    /// Inspect or edit the partition UUID table
    Table {
        #[command(subcommand)]
        action: TableCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TableCommand {
    /// List table entries
    List {
        /// Emit every entry, tombstones included, as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the UUID of a partition
    Lookup { id: i32 },

    /// Record a UUID for a partition, generating one unless given
    Add {
        id: i32,
        #[arg(long)]
        uuid: Option<Uuid>,
    },

    /// Tombstone every entry for a partition
    Remove { id: i32 },
}

/// Reads the username from stdin and the password without echo.
struct TerminalPrompt;

impl AuthPrompt for TerminalPrompt {
    fn username(&self, host: &str) -> Option<String> {
        eprint!("Username for {host}: ");
        io::stderr().flush().ok()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).ok()?;
        let name = line.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    fn password(&self, username: &str, host: &str) -> Option<String> {
        rpassword::prompt_password(format!("Password for {username}@{host}: ")).ok()
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            if let Some(hint) = err
                .downcast_ref::<lparctl_core::Error>()
                .and_then(lparctl_core::Error::remediation)
            {
                eprintln!("hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load(cli.config.as_deref()).map_err(lparctl_core::Error::from)?;

    let log_config = LogConfig {
        level: cli.log_level.unwrap_or_else(|| config.logging.level.clone()),
        format: cli.log_format.unwrap_or(config.logging.format),
        file: config.logging.file.clone(),
    };
    init_logging(&log_config).context("failed to initialize logging")?;

    let Some(uri) = cli.target.or_else(|| config.connection.target.clone()) else {
        bail!("no target given; pass --target or set connection.target in lparctl.toml");
    };
    let target = Target::parse(&uri)?;

    let prompt = TerminalPrompt;
    let prompt = io::stdin()
        .is_terminal()
        .then_some(&prompt as &dyn AuthPrompt);
    let mut conn = Connection::open(&config, target, prompt)?;

    let code = dispatch(&mut conn, cli.command)?;
    conn.close()?;
    Ok(code)
}

fn dispatch(conn: &mut Connection, command: Command) -> Result<ExitCode> {
    let mut stdout = io::stdout().lock();
    match command {
        Command::Exec { command } => {
            let out = conn.execute(&command)?;
            stdout.write_all(&out.output)?;
            stdout.flush()?;
            return Ok(ExitCode::from(u8::try_from(out.exit_code).unwrap_or(u8::MAX)));
        }
        Command::ExecInt { command } => {
            writeln!(stdout, "{}", conn.execute_expect_int(&command)?)?;
        }
        Command::Table { action } => match action {
            TableCommand::List { json: true } => {
                writeln!(stdout, "{}", serde_json::to_string_pretty(conn.entries())?)?;
            }
            TableCommand::List { json: false } => {
                for entry in conn.entries().iter().filter(|e| !e.is_tombstone()) {
                    writeln!(stdout, "{}\t{}", entry.id, entry.uuid)?;
                }
            }
            TableCommand::Lookup { id } => {
                writeln!(stdout, "{}", conn.lookup_uuid(id)?)?;
            }
            TableCommand::Add { id, uuid } => {
                writeln!(stdout, "{}", conn.add_uuid(id, uuid)?)?;
            }
            TableCommand::Remove { id } => {
                let removed = conn.remove_uuid(id)?;
                if removed == 0 {
                    eprintln!("no entry for partition {id}");
                }
            }
        },
    }
    Ok(ExitCode::SUCCESS)
}
