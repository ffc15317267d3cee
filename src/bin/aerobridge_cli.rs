//! AeroBridge CLI - drive a configured remote from the shell
//!
//! Usage:
//!   aerobridge-cli ls [path] [--json]      List a directory
//!   aerobridge-cli cat <path>              Print an object
//!   aerobridge-cli put <local> <remote>    Upload a file
//!   aerobridge-cli mv <from> <to>          Move or rename
//!   aerobridge-cli encrypt <ini-file>      Seal a plain INI config
//!
//! The config password is read from `AEROBRIDGE_PASSWORD`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tokio::io::AsyncWriteExt;

use aerobridge::{Adapter, AdapterOptions, ConfigStore, EntryKind, FileManager};

const PASSWORD_ENV: &str = "AEROBRIDGE_PASSWORD";

#[derive(Parser)]
#[command(
    name = "aerobridge-cli",
    about = "AeroBridge CLI - file operations on an encrypted-config remote",
    version
)]
struct Cli {
    /// Config file (default: <config dir>/aerobridge/aerobridge.conf)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Remote to use, e.g. `work:` or `:memory:` (default: first config section)
    #[arg(long, global = true)]
    storage: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List directory contents
    Ls {
        #[arg(default_value = "")]
        path: String,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write an object to stdout
    Cat { path: String },
    /// Create a directory
    Mkdir { path: String },
    /// Remove a file or directory tree
    Rm { path: String },
    /// Move or rename
    Mv { from: String, to: String },
    /// Upload a local file
    Put { local: PathBuf, remote: String },
    /// Create an empty object
    Touch { path: String },
    /// List the remotes defined in the config
    Sections,
    /// Encrypt a plain INI file with the config password and print the result
    Encrypt { file: PathBuf },
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("aerobridge").join("aerobridge.conf"))
}

fn password_from_env() -> SecretString {
    SecretString::from(std::env::var(PASSWORD_ENV).unwrap_or_default())
}

async fn read_config(path: Option<PathBuf>) -> Result<String> {
    let explicit = path.is_some();
    let Some(path) = path.or_else(default_config_path) else {
        return Ok(String::new());
    };
    match tokio::fs::read_to_string(&path).await {
        Ok(blob) => Ok(blob),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Ok(String::new()),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    match cli.command {
        Commands::Encrypt { file } => encrypt(&file).await,
        command => {
            let blob = read_config(cli.config).await?;
            let mut options = AdapterOptions::new(blob, password_from_env());
            options.storage = cli.storage;
            let adapter = Adapter::init(options)?;
            run(&adapter, command).await
        }
    }
}

async fn encrypt(file: &Path) -> Result<()> {
    let plain = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let (store, loaded) = ConfigStore::load(&plain, &SecretString::from(String::new()));
    loaded.context("parsing plain config")?;
    println!("{}", store.serialize_encrypted(&password_from_env())?);
    Ok(())
}

async fn run(adapter: &Adapter, command: Commands) -> Result<()> {
    match command {
        Commands::Ls { path, json } => {
            let entries = adapter.ls(&path).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in entries {
                    let marker = if entry.kind == EntryKind::Directory { "/" } else { "" };
                    println!("{:>12}  {}{}", entry.size, entry.name, marker);
                }
            }
        }
        Commands::Cat { path } => {
            let mut reader = adapter.cat(&path).await?;
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut reader, &mut stdout).await?;
            stdout.flush().await?;
        }
        Commands::Mkdir { path } => adapter.mkdir(&path).await?,
        Commands::Rm { path } => adapter.rm(&path).await?,
        Commands::Mv { from, to } => adapter.mv(&from, &to).await?,
        Commands::Put { local, remote } => {
            let mut file = tokio::fs::File::open(&local)
                .await
                .with_context(|| format!("opening {}", local.display()))?;
            adapter.save(&remote, &mut file).await?;
        }
        Commands::Touch { path } => adapter.touch(&path).await?,
        Commands::Sections => {
            let sections = adapter.config().section_list();
            if sections.is_empty() {
                bail!("config defines no remotes");
            }
            for section in sections {
                println!("{}", section);
            }
        }
        Commands::Encrypt { file } => encrypt(&file).await?,
    }
    Ok(())
}
