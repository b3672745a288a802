//! SISREC CLI - Command-line front end for the access core
//!
//! Logs in against the backend, keeps the session on disk between runs and
//! answers the same questions the router and the pages ask.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use sisrec_auth::client::HttpAuthBackend;
use sisrec_auth::session::{FileStorage, SessionStore};
use sisrec_auth::{
    AccessGuard, AccountStatus, Capability, GuardOutcome, PendingDestination, PermissionSet, Role,
    RouteRequirements,
};
use sisrec_auth::auth::CAPABILITY_TABLE;
use sisrec_core::{init_logging, log_operation_start, LoggingConfig, SisrecConfig};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable read when `login` gets no `--password`
const PASSWORD_ENV: &str = "SISREC_PASSWORD";

#[derive(Parser)]
#[command(name = "sisrec")]
#[command(about = "Session and access checks for the SISREC reception system")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and keep the session for later commands
    Login {
        email: String,

        /// Password; falls back to SISREC_PASSWORD, then to a prompt
        #[arg(short, long)]
        password: Option<String>,
    },

    /// End the current session
    Logout,

    /// Show the current session
    Whoami {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate the route guard for a path
    CheckRoute {
        /// Requested path, e.g. /usuarios
        path: String,

        /// Roles allowed on the route (comma separated, empty = any)
        #[arg(long, value_delimiter = ',')]
        roles: Vec<Role>,

        /// Account statuses allowed on the route (default: active)
        #[arg(long, value_delimiter = ',')]
        statuses: Vec<AccountStatus>,

        /// Treat the path as a public-only page (login, sign-up)
        #[arg(long)]
        public: bool,

        /// Deep link requested before landing on the public page
        #[arg(long, requires = "public")]
        from: Option<String>,
    },

    /// Check a single capability for the current session
    Can { capability: Capability },

    /// List capabilities
    Capabilities {
        /// Print the whole role table instead of the current session's grants
        #[arg(long)]
        table: bool,
    },

    /// Configuration management
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Validate the configuration
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(SisrecConfig::default_path);
    let config = SisrecConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?
        .with_env_overrides();

    let logging_config = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        config.logging.clone()
    };
    init_logging(&logging_config).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    debug!("Using configuration at {}", config_path.display());

    run(cli.command, &config, &config_path).await
}

/// Wire config → storage → backend → store, once per process
fn build_store(config: &SisrecConfig) -> anyhow::Result<Arc<SessionStore>> {
    config.validate()?;

    let storage = Arc::new(FileStorage::new(config.storage.resolved_session_file())?);
    let backend = Arc::new(HttpAuthBackend::new(&config.backend)?);
    info!("Backend at {}", backend.base_url());

    Ok(Arc::new(SessionStore::new(storage, backend, config)))
}

async fn run(command: Commands, config: &SisrecConfig, config_path: &Path) -> anyhow::Result<()> {
    // Config commands must work even when the configuration does not validate
    let store = match &command {
        Commands::Config {
            show,
            init,
            validate,
        } => return handle_config(config, config_path, *show, *init, *validate),
        _ => build_store(config)?,
    };
    store.restore().await;

    match command {
        Commands::Login { email, password } => {
            log_operation_start!("cli_login", email = %email);
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };

            let result = store.login(&email, &password).await;
            if !result.success {
                return Err(anyhow!(result
                    .error
                    .unwrap_or_else(|| sisrec_auth::messages::GENERIC_LOGIN_ERROR.to_string())));
            }

            let snapshot = store.snapshot().await;
            if let Some(identity) = snapshot.identity() {
                println!("Logged in as {}", identity.display_string());
            }
        }

        Commands::Logout => {
            let was_authenticated = store.is_authenticated().await;
            // Always run, so leftovers from a broken session are cleared too
            store.logout().await;
            if was_authenticated {
                println!("Logged out");
            } else {
                println!("No active session");
            }
        }

        Commands::Whoami { json } => {
            let snapshot = store.snapshot().await;
            match snapshot.identity() {
                Some(identity) if json => println!("{}", serde_json::to_string_pretty(identity)?),
                Some(identity) => println!("{}", identity.display_string()),
                None if json => println!("null"),
                None => println!("Not logged in"),
            }
        }

        Commands::CheckRoute {
            path,
            roles,
            statuses,
            public,
            from,
        } => {
            let guard = AccessGuard::new(config.routes.clone());
            let snapshot = store.snapshot().await;

            let outcome = if public {
                let pending = from.map(PendingDestination::new);
                guard.public_only(&snapshot, pending.as_ref())
            } else {
                let mut requirements = RouteRequirements::roles(roles);
                if !statuses.is_empty() {
                    requirements = requirements.with_allowed_statuses(statuses);
                }
                guard.require_auth(&snapshot, &path, &requirements)
            };

            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !matches!(outcome, GuardOutcome::Render) {
                std::process::exit(2);
            }
        }

        Commands::Can { capability } => {
            let permissions = store.permissions().await;
            let granted = permissions.can(capability);
            println!("{}: {}", capability, if granted { "yes" } else { "no" });
            if !granted {
                std::process::exit(1);
            }
        }

        Commands::Capabilities { table } => {
            if table {
                print_table();
            } else {
                let permissions = store.permissions().await;
                print_granted(&permissions);
            }
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

fn print_granted(permissions: &PermissionSet) {
    match permissions.role() {
        Some(role) => println!("Capabilities for {}:", role),
        None => {
            println!("Not logged in");
            return;
        }
    }
    for capability in permissions.granted() {
        println!("  {}", capability);
    }
}

fn print_table() {
    for (capability, roles, requires_active) in CAPABILITY_TABLE {
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        println!(
            "{:<28} {}{}",
            capability.to_string(),
            roles.join(", "),
            if *requires_active { " (active accounts only)" } else { "" }
        );
    }
}

fn read_password() -> anyhow::Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }

    print!("Password: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(anyhow!("Password must not be empty"));
    }
    Ok(password)
}

fn handle_config(
    config: &SisrecConfig,
    config_path: &Path,
    show: bool,
    init: bool,
    validate: bool,
) -> anyhow::Result<()> {
    if init {
        SisrecConfig::default().save_to_file(config_path)?;
        println!("Configuration initialized at: {}", config_path.display());
    }

    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    if validate {
        config.validate()?;
        println!("Configuration is valid");
    }

    if !(init || show || validate) {
        println!("Nothing to do; use --init, --show or --validate");
    }

    Ok(())
}
