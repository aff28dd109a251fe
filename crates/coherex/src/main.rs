use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use config::{Config, Environment, File, FileFormat};
use log::{LevelFilter, debug, info};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use coherex::agent::AgentRepository;
use coherex::api::{AppState, create_router};
use coherex::db::Database;
use coherex::execution::ExecutionRepository;
use coherex::reaper;
use coherex::sandbox::{HttpSandboxExecutor, SandboxExecutor, SimulatedExecutor};
use coherex::session::{SessionRepository, SessionService, SessionServiceConfig};

const APP_NAME: &str = "coherex";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_main(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("resolved config file: {}", ctx.paths.config_file.display());

    match cli.command {
        Command::Serve(cmd) => async_main(ctx, cmd),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Coherex - agent session orchestration server.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve(ServeCommand),
    /// Create config directories and a default config file
    Init(InitCommand),
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Address to bind
    #[arg(long, value_name = "HOST")]
    host: Option<String>,
    /// Port to bind
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,
    /// Override the database path
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,
    /// Run against the simulated sandbox executor (no remote service)
    #[arg(long)]
    simulate: bool,
}

#[derive(Debug, Clone, Args)]
struct InitCommand {
    /// Overwrite an existing config file
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct AppConfig {
    server: ServerConfig,
    database: DatabaseConfig,
    sandbox: SandboxConfig,
    sessions: SessionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ServerConfig {
    host: String,
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8460,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct DatabaseConfig {
    /// Database file path. Defaults to <data dir>/coherex.db.
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct SandboxConfig {
    /// Base URL of the remote sandbox service.
    base_url: String,
    /// API key for the sandbox service.
    api_key: String,
    /// HTTP request timeout; provisioning can take minutes on a cold pool.
    provision_timeout_secs: u64,
    /// Sandbox lifetime ceiling passed on provisioning.
    lifetime_secs: u64,
    /// Fall back to simulation mode when provisioning fails.
    simulation_fallback: bool,
    /// Use the in-memory simulated executor instead of the remote service.
    simulate: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:49160".to_string(),
            api_key: String::new(),
            provision_timeout_secs: 180,
            lifetime_secs: 300,
            simulation_fallback: true,
            simulate: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct SessionsConfig {
    /// Inactivity before an active session is demoted to idle.
    idle_after_secs: u64,
    /// Inactivity before an idle session is hibernated.
    hibernate_after_secs: u64,
    /// Reaper pass interval.
    reap_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_after_secs: 10 * 60,
            hibernate_after_secs: 60 * 60,
            reap_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
struct AppPaths {
    config_file: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    fn resolve(config_override: Option<&PathBuf>) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .map(|d| d.join(APP_NAME))
            .ok_or_else(|| anyhow!("could not determine config directory"))?;
        let data_dir = dirs::data_dir()
            .map(|d| d.join(APP_NAME))
            .ok_or_else(|| anyhow!("could not determine data directory"))?;

        let config_file = config_override
            .cloned()
            .unwrap_or_else(|| config_dir.join("config.toml"));

        Ok(Self {
            config_file,
            data_dir,
        })
    }
}

#[derive(Debug)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::resolve(common.config.as_ref())?;
        let config = load_config(&paths)?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        let level = if self.common.quiet {
            LevelFilter::Error
        } else {
            match self.common.verbose {
                0 => LevelFilter::Info,
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        };

        env_logger::Builder::from_env(env_logger::Env::default())
            .filter_level(level)
            .try_init()
            .ok();

        // The API layer emits tracing events; give them a subscriber too.
        let tracing_level = match level {
            LevelFilter::Error => "error",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            _ => "trace",
        };
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(tracing_level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .ok();

        Ok(())
    }
}

fn load_config(paths: &AppPaths) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if paths.config_file.exists() {
        builder = builder.add_source(
            File::from(paths.config_file.clone()).format(FileFormat::Toml),
        );
    }

    builder = builder.add_source(
        Environment::with_prefix("COHEREX")
            .separator("__")
            .try_parsing(true),
    );

    builder
        .build()
        .context("loading configuration")?
        .try_deserialize()
        .context("parsing configuration")
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.paths.config_file.exists() && !cmd.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            ctx.paths.config_file.display()
        ));
    }

    if let Some(parent) = ctx.paths.config_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory: {}", parent.display()))?;
    }

    let default = toml::to_string_pretty(&AppConfig::default())
        .context("serializing default config")?;
    std::fs::write(&ctx.paths.config_file, default)
        .with_context(|| format!("writing config to {}", ctx.paths.config_file.display()))?;

    info!("Wrote default config to {}", ctx.paths.config_file.display());
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            println!(
                "{}",
                toml::to_string_pretty(&ctx.config).context("serializing config")?
            );
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

// ============================================================================
// Serve
// ============================================================================

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    info!("Starting coherex server...");

    let db_path = cmd
        .database
        .clone()
        .or_else(|| ctx.config.database.path.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| ctx.paths.data_dir.join("coherex.db"));
    info!("Database path: {}", db_path.display());
    let database = Database::new(&db_path).await?;

    let sandbox_cfg = &ctx.config.sandbox;
    let executor: Arc<dyn SandboxExecutor> = if cmd.simulate || sandbox_cfg.simulate {
        info!("Sandbox executor: simulated (no remote service)");
        Arc::new(SimulatedExecutor::new())
    } else {
        info!("Sandbox executor: {}", sandbox_cfg.base_url);
        Arc::new(
            HttpSandboxExecutor::new(
                sandbox_cfg.base_url.clone(),
                sandbox_cfg.api_key.clone(),
                Duration::from_secs(sandbox_cfg.provision_timeout_secs),
            )
            .map_err(|e| anyhow!("building sandbox client: {}", e))?,
        )
    };

    let sessions_cfg = &ctx.config.sessions;
    let service_config = SessionServiceConfig {
        sandbox_timeout_seconds: sandbox_cfg.lifetime_secs,
        idle_after: Duration::from_secs(sessions_cfg.idle_after_secs),
        hibernate_after: Duration::from_secs(sessions_cfg.hibernate_after_secs),
    };

    let sessions = SessionService::new(
        SessionRepository::new(database.pool().clone()),
        executor.clone(),
        service_config,
    );
    let agents = AgentRepository::new(database.pool().clone());
    let executions = ExecutionRepository::new(database.pool().clone());

    let mut state = AppState::new(sessions, agents, executions, executor)
        .with_sandbox_timeout(sandbox_cfg.lifetime_secs);
    if !sandbox_cfg.simulation_fallback {
        state = state.without_simulation_fallback();
    }

    let reaper_handle = reaper::spawn(
        state.sessions.clone(),
        Duration::from_secs(sessions_cfg.reap_interval_secs.max(1)),
    );

    let router = create_router(state);

    let host = cmd.host.unwrap_or_else(|| ctx.config.server.host.clone());
    let port = cmd.port.unwrap_or(ctx.config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", host, port))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    reaper_handle.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Failed to install ctrl-c handler: {:?}", e);
    }
}
