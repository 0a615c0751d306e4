//! Command-line front end for the freecloud storage engine.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use freecloud::config::{default_config_path, Config};
use freecloud::logging;
use freecloud::model::{NodeId, NodeType, Share, ShareMode, User, UserId};
use freecloud::{Managers, PersistenceBackend, PluginRegistry};
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "freecloud",
    version,
    about = "Personal cloud storage engine",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "Configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "FREECLOUD_DB",
        help = "Graph database file, overrides persistence.path"
    )]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and install its schema.
    Init {
        #[arg(long, help = "Also write the effective configuration to disk")]
        write_config: bool,
    },
    /// Keep the backend open and sweep expired sessions until Ctrl-C.
    Serve,
    /// Manage accounts.
    #[command(subcommand)]
    User(UserCommand),
    /// List a folder.
    Ls(PathCmd),
    /// Create a folder.
    Mkdir(PathCmd),
    /// Create an empty file.
    Touch(PathCmd),
    /// Share a node with another user.
    Share(ShareCmd),
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Register a user and open a first session.
    Add(UserAddCmd),
}

#[derive(Args, Debug)]
struct UserAddCmd {
    #[arg(long)]
    email: String,
    #[arg(long, default_value = "")]
    first_name: String,
    #[arg(long, default_value = "")]
    last_name: String,
    #[arg(long, value_name = "HASH", help = "Password hash, stored as given")]
    password_hash: String,
}

#[derive(Args, Debug)]
struct PathCmd {
    #[arg(long, value_name = "USER_ID")]
    user: String,
    #[arg(value_name = "PATH", default_value = "/")]
    path: String,
}

#[derive(Args, Debug)]
struct ShareCmd {
    #[arg(long, value_name = "USER_ID", help = "Owner of the node")]
    user: String,
    #[arg(long, value_name = "NODE_ID")]
    node: String,
    #[arg(long = "with", value_name = "USER_ID")]
    shared_with: String,
    #[arg(long, value_enum, default_value_t = ModeArg::Read)]
    mode: ModeArg,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ModeArg {
    Read,
    ReadWrite,
}

impl From<ModeArg> for ShareMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Read => ShareMode::Read,
            ModeArg::ReadWrite => ShareMode::ReadWrite,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.clone())?;
    if let Some(db) = cli.db {
        config.persistence.path = Some(db);
    }
    logging::init(&config.logging);

    let registry = PluginRegistry::with_defaults();
    let backend = registry.initialize(&config.persistence)?;
    let managers = Managers::new(&*backend, config.auth.clone());
    let result = dispatch(cli.command, cli.config, &config, &*backend, &managers).await;
    PluginRegistry::shutdown(&*backend);
    result
}

async fn dispatch(
    command: Command,
    config_path: Option<PathBuf>,
    config: &Config,
    backend: &dyn PersistenceBackend,
    managers: &Managers,
) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Init { write_config } => {
            let mut written = None;
            if write_config {
                let target = config_path
                    .or_else(default_config_path)
                    .ok_or("no configuration directory available")?;
                config.persist(&target)?;
                written = Some(target);
            }
            let db = config.persistence.database_path()?;
            emit(&json!({
                "backend": backend.name(),
                "database": db,
                "config": written,
            }))?;
        }
        Command::Serve => serve(config, managers).await?,
        Command::User(UserCommand::Add(cmd)) => {
            let user = User::new(cmd.first_name, cmd.last_name, cmd.email, cmd.password_hash);
            let (user, session) = managers.auth.create_user(user)?;
            emit(&json!({ "user": user, "session": session }))?;
        }
        Command::Ls(cmd) => {
            let user = UserId::new(cmd.user);
            let folder = managers.nodes.get_by_path(&user, &cmd.path)?;
            let children = managers.nodes.list_by_id(&user, &folder.id)?;
            emit(&json!({ "node": folder, "children": children }))?;
        }
        Command::Mkdir(cmd) => create(managers, NodeType::Folder, cmd)?,
        Command::Touch(cmd) => create(managers, NodeType::File, cmd)?,
        Command::Share(cmd) => {
            let share = Share {
                node_id: NodeId::new(cmd.node),
                owner_id: UserId::new(cmd.user.clone()),
                shared_with_id: UserId::new(cmd.shared_with),
                mode: cmd.mode.into(),
            };
            let created = managers.shares.create_share(&UserId::new(cmd.user), &share)?;
            emit(&json!({ "share": share, "created": created }))?;
        }
    }
    Ok(())
}

fn create(managers: &Managers, node_type: NodeType, cmd: PathCmd) -> Result<(), Box<dyn Error>> {
    let user = UserId::new(cmd.user);
    let (node, created) = managers
        .nodes
        .create_node_by_path(&user, node_type, &cmd.path)?;
    emit(&json!({ "node": node, "created": created }))
}

async fn serve(config: &Config, managers: &Managers) -> Result<(), Box<dyn Error>> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cleanup = freecloud::manager::spawn_session_cleanup(
        Arc::clone(&managers.auth),
        config.auth.session_cleanup_interval(),
        shutdown_rx,
    );
    info!("serving, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);
    cleanup.await?;
    Ok(())
}

fn emit(value: &serde_json::Value) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
