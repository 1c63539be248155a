//! SealVault CLI - command line interface over the vault engine.
//!
//! Every command prints JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use sealvault_common::UserId;
use sealvault_vault::{EngineConfig, EntryPatch, NewEntry, SearchQuery, VaultEngine};

/// Environment variable read instead of prompting for the user secret.
const SECRET_ENV: &str = "SEALVAULT_SECRET";

#[derive(Parser)]
#[command(name = "sealvault")]
#[command(about = "SealVault - Encrypted vault storage with tiered fallback")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for blob files and the local key-value store.
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Never contact the remote blob network.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct UserArg {
    /// User identifier.
    #[arg(short, long)]
    user: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty vault, replacing any existing one.
    Create {
        #[command(flatten)]
        user: UserArg,
    },

    /// Add an entry. The entry password is prompted for unless given.
    Add {
        #[command(flatten)]
        user: UserArg,

        #[arg(long)]
        title: String,

        #[arg(long)]
        username: String,

        #[arg(long)]
        password: Option<String>,

        /// Tag, repeatable.
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Update fields of an entry.
    Update {
        #[command(flatten)]
        user: UserArg,

        /// Entry id.
        #[arg(long)]
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        username: Option<String>,

        /// Prompt for a new entry password.
        #[arg(long)]
        new_password: bool,

        /// Replace all tags, repeatable.
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Remove an entry.
    Remove {
        #[command(flatten)]
        user: UserArg,

        /// Entry id.
        #[arg(long)]
        id: String,
    },

    /// List entries with passwords redacted.
    List {
        #[command(flatten)]
        user: UserArg,
    },

    /// Search entries by title, username and tags.
    Search {
        #[command(flatten)]
        user: UserArg,

        /// Matches title or username.
        text: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        username: Option<String>,

        /// Entry must carry any of these tags, repeatable.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Show vault statistics.
    Stats {
        #[command(flatten)]
        user: UserArg,
    },

    /// Export the vault as JSON.
    Export {
        #[command(flatten)]
        user: UserArg,

        /// Include plaintext passwords.
        #[arg(long)]
        include_passwords: bool,

        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Drop a user's registry entry. The sealed vault blob is left in storage.
    Forget {
        #[command(flatten)]
        user: UserArg,
    },

    /// Check vault consistency.
    Verify {
        #[command(flatten)]
        user: UserArg,
    },

    /// Show storage tier reachability.
    Status,

    /// Inspect or clear the local fallback cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached items, newest first.
    List,
    /// Show cache statistics.
    Stats,
    /// Drop every cached item.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli)?;
    let engine = VaultEngine::from_config(&config)
        .map_err(friendly)
        .context("Failed to start vault engine")?;

    match cli.command {
        Commands::Create { user } => cmd_create(&engine, &user).await,

        Commands::Add {
            user,
            title,
            username,
            password,
            tags,
            url,
            notes,
        } => {
            let password = match password {
                Some(password) => password,
                None => prompt("Entry password: ")?.to_string(),
            };
            let entry = NewEntry {
                title,
                username,
                password,
                tags,
                url,
                notes,
            };
            cmd_add(&engine, &user, entry).await
        }

        Commands::Update {
            user,
            id,
            title,
            username,
            new_password,
            tags,
            url,
            notes,
        } => {
            let password = if new_password {
                Some(prompt("New entry password: ")?.to_string())
            } else {
                None
            };
            let patch = EntryPatch {
                title,
                username,
                password,
                tags: (!tags.is_empty()).then_some(tags),
                url,
                notes,
            };
            cmd_update(&engine, &user, &id, patch).await
        }

        Commands::Remove { user, id } => cmd_remove(&engine, &user, &id).await,

        Commands::List { user } => cmd_list(&engine, &user).await,

        Commands::Search {
            user,
            text,
            title,
            username,
            tags,
        } => {
            let query = SearchQuery {
                text,
                title,
                username,
                tags,
            };
            cmd_search(&engine, &user, &query).await
        }

        Commands::Stats { user } => cmd_stats(&engine, &user).await,

        Commands::Export {
            user,
            include_passwords,
            output,
        } => cmd_export(&engine, &user, include_passwords, output.as_deref()).await,

        Commands::Verify { user } => cmd_verify(&engine, &user).await,

        Commands::Forget { user } => cmd_forget(&engine, &user).await,

        Commands::Status => print_json(&engine.store().status().await),

        Commands::Cache { action } => cmd_cache(&engine, action),
    }
}

/// Resolve configuration from flags.
///
/// Without `--config`, or with an explicit `--data-dir`, blobs and the
/// key-value store live under the data directory.
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if cli.config.is_none() || cli.data_dir.is_some() {
        let dir = match &cli.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .context("No data directory on this platform; pass --data-dir")?
                .join("sealvault"),
        };
        config = config.with_data_dir(dir);
    }

    if cli.offline {
        config = config.offline();
    }

    Ok(config)
}

/// Collapse engine errors to the text shown to users.
fn friendly(err: sealvault_common::Error) -> anyhow::Error {
    debug!(error = %err, "Operation failed");
    anyhow::anyhow!(err.user_message())
}

fn parse_user(arg: &UserArg) -> Result<UserId> {
    UserId::new(arg.user.as_str()).map_err(friendly)
}

/// Prompt for a secret securely.
fn prompt(message: &str) -> Result<Zeroizing<String>> {
    let secret = rpassword::prompt_password(message).context("Failed to read password")?;
    Ok(Zeroizing::new(secret))
}

/// User secret from the environment, or prompted.
fn user_secret() -> Result<Zeroizing<String>> {
    let secret = match std::env::var(SECRET_ENV) {
        Ok(secret) => Zeroizing::new(secret),
        Err(_) => prompt("Vault secret: ")?,
    };
    if secret.is_empty() {
        anyhow::bail!("Secret cannot be empty");
    }
    Ok(secret)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_create(engine: &VaultEngine, user: &UserArg) -> Result<()> {
    let user = parse_user(user)?;

    let secret = if std::env::var(SECRET_ENV).is_ok() {
        user_secret()?
    } else {
        let secret = prompt("New vault secret: ")?;
        let confirm = prompt("Confirm secret: ")?;
        if *secret != *confirm {
            anyhow::bail!("Secrets do not match");
        }
        if secret.is_empty() {
            anyhow::bail!("Secret cannot be empty");
        }
        secret
    };

    let vault = engine
        .manager()
        .create_vault(&user, &secret)
        .await
        .map_err(friendly)?;
    print_json(&vault.metadata)
}

async fn cmd_add(engine: &VaultEngine, user: &UserArg, entry: NewEntry) -> Result<()> {
    let user = parse_user(user)?;
    let secret = user_secret()?;

    let mut added = engine
        .manager()
        .add_entry(&user, &secret, entry)
        .await
        .map_err(friendly)?;
    added.password = sealvault_vault::REDACTED.to_string();
    print_json(&added)
}

async fn cmd_update(
    engine: &VaultEngine,
    user: &UserArg,
    id: &str,
    patch: EntryPatch,
) -> Result<()> {
    if patch.is_empty() {
        anyhow::bail!("Nothing to update");
    }
    let user = parse_user(user)?;
    let secret = user_secret()?;

    let mut updated = engine
        .manager()
        .update_entry(&user, &secret, id, patch)
        .await
        .map_err(friendly)?;
    updated.password = sealvault_vault::REDACTED.to_string();
    print_json(&updated)
}

async fn cmd_remove(engine: &VaultEngine, user: &UserArg, id: &str) -> Result<()> {
    let user = parse_user(user)?;
    let secret = user_secret()?;

    engine
        .manager()
        .remove_entry(&user, &secret, id)
        .await
        .map_err(friendly)?;
    print_json(&serde_json::json!({ "removed": id }))
}

async fn cmd_list(engine: &VaultEngine, user: &UserArg) -> Result<()> {
    let user = parse_user(user)?;
    let secret = user_secret()?;

    let export = engine
        .manager()
        .export_vault(&user, &secret, false)
        .await
        .map_err(friendly)?;
    print_json(&export.entries)
}

async fn cmd_search(engine: &VaultEngine, user: &UserArg, query: &SearchQuery) -> Result<()> {
    let user = parse_user(user)?;
    let secret = user_secret()?;

    let mut hits = engine
        .manager()
        .search_entries(&user, &secret, query)
        .await
        .map_err(friendly)?;
    for hit in &mut hits {
        hit.password = sealvault_vault::REDACTED.to_string();
    }
    print_json(&hits)
}

async fn cmd_stats(engine: &VaultEngine, user: &UserArg) -> Result<()> {
    let user = parse_user(user)?;
    let secret = user_secret()?;

    let stats = engine
        .manager()
        .get_stats(&user, &secret)
        .await
        .map_err(friendly)?;
    print_json(&stats)
}

async fn cmd_export(
    engine: &VaultEngine,
    user: &UserArg,
    include_passwords: bool,
    output: Option<&Path>,
) -> Result<()> {
    let user = parse_user(user)?;
    let secret = user_secret()?;

    let export = engine
        .manager()
        .export_vault(&user, &secret, include_passwords)
        .await
        .map_err(friendly)?;

    match output {
        Some(path) => {
            let json = Zeroizing::new(serde_json::to_string_pretty(&export)?);
            std::fs::write(path, json.as_bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_json(&serde_json::json!({
                "exported": export.entries.len(),
                "path": path,
                "includes_passwords": include_passwords,
            }))
        }
        None => print_json(&export),
    }
}

async fn cmd_verify(engine: &VaultEngine, user: &UserArg) -> Result<()> {
    let user = parse_user(user)?;
    let secret = user_secret()?;

    let report = engine
        .manager()
        .validate_integrity(&user, &secret)
        .await
        .map_err(friendly)?;
    print_json(&report)?;

    if !report.is_valid {
        anyhow::bail!("Vault has {} integrity issue(s)", report.issues.len());
    }
    Ok(())
}

async fn cmd_forget(engine: &VaultEngine, user: &UserArg) -> Result<()> {
    let user = parse_user(user)?;
    let existed = engine.manager().forget_user(&user).await.map_err(friendly)?;
    print_json(&serde_json::json!({ "user": user, "forgotten": existed }))
}

fn cmd_cache(engine: &VaultEngine, action: CacheAction) -> Result<()> {
    let cache = engine
        .store()
        .cache()
        .context("No local cache tier configured")?;

    match action {
        CacheAction::List => print_json(&cache.list_items()),
        CacheAction::Stats => print_json(&cache.stats()),
        CacheAction::Clear => {
            let cleared = cache.stats().item_count;
            cache.clear().map_err(friendly)?;
            print_json(&serde_json::json!({ "cleared": cleared }))
        }
    }
}
