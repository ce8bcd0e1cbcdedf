//! csvreconcile command-line client.
//!
//! Uploads datasets to the dataset service, compares a candidate file
//! against an original, lets the user accept or reject each change, and
//! merges the accepted changes into a new version of the original.

mod render;
mod review;
mod style;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use csvreconcile_core::api::ApiClient;
use csvreconcile_core::config::AppConfig;
use csvreconcile_core::credential::CredentialStore;
use csvreconcile_core::errors::{ConfigError, TransportError};
use csvreconcile_core::reconcile::{ChangeKey, Reconciler, VisibilityMode};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Selective CSV/XLSX change reconciliation.
#[derive(Parser, Debug)]
#[command(
    name = "csvreconcile",
    version,
    about = "Review and merge changes between CSV/XLSX datasets"
)]
struct Cli {
    /// Path to the TOML configuration file. Defaults to
    /// `<config dir>/csvreconcile/config.toml`.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path. Defaults to the configuration path.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate the configuration file.
    Validate,

    /// Log in and remember the session.
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Create an account and remember the session.
    Register {
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Forget the saved session.
    Logout,

    /// Show the logged-in account.
    Whoami,

    /// List stored files.
    Files,

    /// Upload a CSV or XLSX file.
    Upload {
        path: PathBuf,

        /// Mark the file as an original (comparison base).
        #[arg(long)]
        original: bool,
    },

    /// Download a stored file.
    Download {
        id: String,

        /// Write to this path instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare a candidate file against an original and print the changes.
    Compare {
        original: String,
        candidate: String,

        /// Only show records with accepted changes.
        #[arg(long)]
        pending_only: bool,

        /// Print the changes as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Interactively accept or reject changes, then merge.
    Review { original: String, candidate: String },

    /// Merge every change except the rejected ones.
    Merge {
        original: String,
        candidate: String,

        /// Change to leave out, e.g. `field:7:email`, `add:9`, `del:3`. Copy
        /// the key as printed; a `:` inside an id or field name reads `\:`.
        #[arg(long = "reject", value_name = "KEY")]
        reject: Vec<ChangeKey>,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = match cli.config.clone().or_else(AppConfig::default_path) {
        Some(path) => path,
        None => {
            eprintln!("Error: no configuration directory found; pass --config");
            return ExitCode::FAILURE;
        }
    };
    let config = AppConfig::load_or_default(&config_path);
    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "warn".into());

    // Minimal logging for CLI
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command, &config_path, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if needs_login(&e) {
                eprintln!("Run `csvreconcile login` first.");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(
    command: Commands,
    config_path: &Path,
    config: Result<AppConfig, ConfigError>,
) -> Result<()> {
    match command {
        Commands::Init { output } => cmd_init(output.as_deref().unwrap_or(config_path)),
        Commands::Validate => cmd_validate(config_path),
        command => {
            let config = config.context("failed to load configuration")?;
            let mut remote = Remote::connect(&config)?;
            let outcome = dispatch(&mut remote, command).await;
            remote.forget_rejected_login();
            outcome
        }
    }
}

async fn dispatch(remote: &mut Remote, command: Commands) -> Result<()> {
    match command {
        Commands::Login { username } => cmd_auth(remote, username, false).await,
        Commands::Register { username } => cmd_auth(remote, username, true).await,
        Commands::Logout => cmd_logout(remote),
        Commands::Whoami => cmd_whoami(remote).await,
        Commands::Files => cmd_files(remote).await,
        Commands::Upload { path, original } => cmd_upload(remote, &path, original).await,
        Commands::Download { id, output } => cmd_download(remote, &id, output.as_deref()).await,
        Commands::Compare {
            original,
            candidate,
            pending_only,
            json,
        } => cmd_compare(remote, &original, &candidate, pending_only, json).await,
        Commands::Review {
            original,
            candidate,
        } => cmd_review(remote, &original, &candidate).await,
        Commands::Merge {
            original,
            candidate,
            reject,
            yes,
        } => cmd_merge(remote, &original, &candidate, &reject, yes).await,
        Commands::Init { .. } | Commands::Validate => Ok(()),
    }
}

fn needs_login(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<TransportError>()
            .is_some_and(TransportError::requires_login)
    })
}

// ---------------------------------------------------------------------------
// Connection helpers
// ---------------------------------------------------------------------------

/// A service connection plus the store its login came from.
struct Remote {
    reconciler: Reconciler<ApiClient>,
    store: CredentialStore,
    saved_login: bool,
}

impl Remote {
    fn connect(config: &AppConfig) -> Result<Self> {
        let store = match config.session.credential_file {
            Some(ref path) => CredentialStore::new(path),
            None => CredentialStore::new(
                CredentialStore::default_path().context("failed to locate credential file")?,
            ),
        };

        let mut client = ApiClient::from_config(&config.api).context("failed to create API client")?;
        let mut saved_login = false;
        if !client.is_authenticated() {
            if let Some(saved) = store.load().context("failed to read saved login")? {
                client.set_credential(saved.credential);
                saved_login = true;
            }
        }

        Ok(Self {
            reconciler: Reconciler::new(client),
            store,
            saved_login,
        })
    }

    fn client(&mut self) -> &mut ApiClient {
        self.reconciler.service_mut()
    }

    /// Remove a saved login that the service has rejected.
    fn forget_rejected_login(&self) {
        if !self.saved_login || self.reconciler.service().is_authenticated() {
            return;
        }
        match self.store.clear() {
            Ok(()) => eprintln!(
                "{}",
                style::warn("Saved login was rejected by the service and has been removed.")
            ),
            Err(e) => warn!(error = %e, "failed to remove rejected login"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config subcommands
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# csvreconcile configuration

[api]
base_url = "http://127.0.0.1:3600/api"
timeout_secs = 30
# Bearer token from the environment; overrides the saved login when set.
# token_env = "CSVRECONCILE_TOKEN"

[session]
# credential_file = "/home/me/.config/csvreconcile/credential.json"

[logging]
level = "warn"
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).context("failed to create config directory")?;
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Set api.base_url to your dataset service");
    println!("  2. Validate with: csvreconcile validate --config {}", output.display());
    println!("  3. Log in with: csvreconcile login");

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => println!("  [OK] All fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Service URL   : {}", config.api.base_url);
    println!("  Timeout       : {}s", config.api.timeout_secs);
    println!(
        "  Env token     : {}",
        match (&config.api.token_env, &config.api.token) {
            (None, _) => "not configured",
            (Some(_), Some(_)) => "set",
            (Some(_), None) => "NOT SET",
        }
    );
    println!(
        "  Credential    : {}",
        config
            .session
            .credential_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "default location".into())
    );
    println!("  Log level     : {}", config.logging.level);
    println!();
    println!("Configuration is valid.");

    Ok(())
}

// ---------------------------------------------------------------------------
// Account subcommands
// ---------------------------------------------------------------------------

async fn cmd_auth(remote: &mut Remote, username: Option<String>, register: bool) -> Result<()> {
    let username = match username {
        Some(u) => u,
        None => Input::new()
            .with_prompt("Username")
            .interact_text()
            .context("failed to read username")?,
    };
    let mut prompt = Password::new().with_prompt("Password");
    if register {
        prompt = prompt.with_confirmation("Repeat password", "Passwords do not match");
    }
    let password = prompt.interact().context("failed to read password")?;

    let spinner = style::spinner(if register { "Registering..." } else { "Logging in..." });
    let user = if register {
        remote.client().register(&username, &password).await
    } else {
        remote.client().login(&username, &password).await
    };
    spinner.finish_and_clear();
    let user = user.context(if register { "registration failed" } else { "login failed" })?;

    if let Some(credential) = remote.reconciler.service().credential() {
        remote
            .store
            .save(credential, Some(&user.username))
            .context("failed to save login")?;
    }
    println!("{}", style::success(&format!("Logged in as {}", user.username)));
    Ok(())
}

fn cmd_logout(remote: &mut Remote) -> Result<()> {
    remote.client().logout();
    remote.store.clear().context("failed to remove saved login")?;
    remote.saved_login = false;
    println!("{}", style::success("Logged out"));
    Ok(())
}

async fn cmd_whoami(remote: &mut Remote) -> Result<()> {
    let user = remote
        .client()
        .current_user()
        .await
        .context("failed to fetch account")?;
    println!("{}", user.username);
    if let Some(saved) = remote.store.load().context("failed to read saved login")? {
        println!(
            "{}",
            style::dim(&format!(
                "logged in since {}",
                saved.saved_at.format("%Y-%m-%d %H:%M UTC")
            ))
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// File subcommands
// ---------------------------------------------------------------------------

async fn cmd_files(remote: &mut Remote) -> Result<()> {
    let spinner = style::spinner("Fetching files...");
    let files = remote.reconciler.refresh_files().await;
    spinner.finish_and_clear();
    let files = files.context("failed to list files")?;

    if files.is_empty() {
        println!("No files uploaded yet.");
        return Ok(());
    }

    println!("{}", render::files_table(files));
    println!();
    println!("{} file(s)", files.len());
    Ok(())
}

async fn cmd_upload(remote: &mut Remote, path: &Path, original: bool) -> Result<()> {
    let spinner = style::spinner(format!("Uploading {}...", path.display()));
    let file = remote.client().upload_path(path, original).await;
    spinner.finish_and_clear();
    let file = file.with_context(|| format!("failed to upload {}", path.display()))?;

    println!(
        "{}",
        style::success(&format!(
            "Uploaded {} as {} ({})",
            file.name,
            file.id,
            if file.is_original { "original" } else { "comparison" }
        ))
    );
    Ok(())
}

async fn cmd_download(remote: &mut Remote, id: &str, output: Option<&Path>) -> Result<()> {
    let bytes = remote
        .reconciler
        .download(id)
        .await
        .with_context(|| format!("failed to download file '{}'", id))?;

    match output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "{}",
                style::success(&format!("Wrote {} bytes to {}", bytes.len(), path.display()))
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("failed to write to stdout")?;
            stdout.flush().context("failed to write to stdout")?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reconciliation subcommands
// ---------------------------------------------------------------------------

async fn start_session(remote: &mut Remote, original: &str, candidate: &str) -> Result<()> {
    let spinner = style::spinner("Comparing files...");
    let started = remote.reconciler.compare(original, candidate).await.map(|_| ());
    spinner.finish_and_clear();
    started.with_context(|| format!("failed to compare '{}' against '{}'", candidate, original))
}

async fn cmd_compare(
    remote: &mut Remote,
    original: &str,
    candidate: &str,
    pending_only: bool,
    json: bool,
) -> Result<()> {
    start_session(remote, original, candidate).await?;
    let session = remote
        .reconciler
        .session_mut()
        .context("comparison produced no session")?;
    if pending_only {
        session.set_mode(VisibilityMode::ShowPendingOnly);
    }
    let view = session.view()?;

    if json {
        let out = serde_json::to_string_pretty(&render::view_json(session.result(), &view))?;
        println!("{}", out);
        return Ok(());
    }

    let summary = session.result().summary();
    println!(
        "{}",
        style::header(&format!(
            "{} changed records, {} additions, {} deletions (id column: {})",
            summary.differences_count,
            summary.additions_count,
            summary.deletions_count,
            session.result().id_column()
        ))
    );
    let units = render::visible_units(session.result(), session.state(), &view);
    if units.is_empty() {
        println!("{}", style::success("The files are identical."));
    } else {
        println!("{}", render::units_table(&units));
    }
    Ok(())
}

async fn cmd_review(remote: &mut Remote, original: &str, candidate: &str) -> Result<()> {
    start_session(remote, original, candidate).await?;
    review::run(&mut remote.reconciler).await
}

async fn cmd_merge(
    remote: &mut Remote,
    original: &str,
    candidate: &str,
    reject: &[ChangeKey],
    yes: bool,
) -> Result<()> {
    start_session(remote, original, candidate).await?;
    let session = remote
        .reconciler
        .session_mut()
        .context("comparison produced no session")?;
    for key in reject {
        session
            .set(key, false)
            .with_context(|| format!("cannot reject '{}'", key))?;
    }

    let plan = session.plan()?;
    println!(
        "{}",
        style::header(&format!(
            "Merging {} of {} change(s) into {}",
            plan.unit_count(),
            session.result().unit_count(),
            original
        ))
    );
    if !yes {
        let proceed = Confirm::new()
            .with_prompt("Proceed?")
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !proceed {
            remote.reconciler.discard_session();
            println!("Aborted.");
            return Ok(());
        }
    }

    let spinner = style::spinner("Applying merge...");
    let outcome = remote.reconciler.merge().await;
    spinner.finish_and_clear();
    let outcome = outcome.context("merge failed")?;

    println!(
        "{}",
        style::success(&format!("Merged into new file {}", outcome.new_file_id))
    );
    if !outcome.refreshed {
        println!("{}", style::warn("Could not refresh the file list."));
    }
    Ok(())
}
