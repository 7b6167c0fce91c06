//! explain - tenant-scoped storage, audit and search from the command line.

use anyhow::Context;
use clap::{Parser, Subcommand};
use explain_client::config::get_configuration;
use explain_client::models::{JobProgress, UploadFile};
use explain_client::services::identity::LoginOutcome;
use explain_client::services::session::ExpiryWatcher;
use explain_client::AppContext;
use explain_core::observability::init_tracing;
use secrecy::Secret;
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "explain")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in with email and password
    Login {
        /// Defaults to the remembered email
        #[arg(long)]
        email: Option<String>,

        #[arg(long, env = "EXPLAIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Required when the account must set a new password
        #[arg(long, env = "EXPLAIN_NEW_PASSWORD", hide_env_values = true)]
        new_password: Option<String>,

        /// Remember the email for the next login
        #[arg(long)]
        remember: bool,
    },

    /// Sign out and clear the organization selection
    Logout,

    /// Show the signed-in user and current organization
    Whoami,

    /// List organizations granted to the signed-in user
    Orgs,

    /// Switch the current organization
    Use {
        /// Organization id, e.g. "acme"
        organization: String,
    },

    /// Run an audit over a project folder
    Audit {
        project: String,

        /// Only parse the general ledger
        #[arg(long)]
        ledger_only: bool,
    },

    /// List folders under a path
    Ls {
        #[arg(default_value = "")]
        path: String,
    },

    /// List files under a prefix
    Files { path: String },

    /// Create a folder
    Mkdir { path: String },

    /// Upload a local file into a folder
    Upload {
        path: String,
        file: PathBuf,

        #[arg(long)]
        content_type: Option<String>,
    },

    /// Delete a file by key
    Rm { key: String },

    /// Delete a folder and everything under it
    Rmdir { path: String },

    /// Search indexed documents
    Search {
        query: String,

        /// Defaults to the current organization
        #[arg(long)]
        company: Option<String>,
    },

    /// Search index maintenance
    #[command(subcommand)]
    Index(IndexCommands),
}

#[derive(Subcommand, Debug)]
enum IndexCommands {
    /// Report processed and unprocessed files under a prefix
    Check { prefix: String },

    /// Remove indexed files under a prefix
    Delete { prefix: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        "explain-client",
        &settings.telemetry.log_level,
        settings.telemetry.otlp_endpoint.as_deref(),
    );

    let cancel = CancellationToken::new();
    let ctx = AppContext::build(&settings, cancel.clone()).await?;

    let watcher = ExpiryWatcher::spawn(
        ctx.session.clone(),
        ctx.clock.clone(),
        settings.session.token_check_interval(),
        cancel.child_token(),
    );

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let result = run(&ctx, cli.command).await;

    cancel.cancel();
    if let Err(e) = watcher.await {
        tracing::warn!(error = %e, "Expiry watcher ended abnormally");
    }

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}

async fn run(ctx: &AppContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Login {
            email,
            password,
            new_password,
            remember,
        } => login(ctx, email, password, new_password, remember).await,
        Commands::Logout => {
            ctx.auth.logout()?;
            println!("Signed out");
            Ok(())
        }
        Commands::Whoami => {
            let profile = ctx.session.tokens().profile()?;
            let organization = ctx.session.tenants().current();
            print_json(&serde_json::json!({
                "name": profile.name,
                "email": profile.email,
                "organization": organization,
                "expired": ctx.session.tokens().is_expired(ctx.clock.now()),
            }))
        }
        Commands::Orgs => {
            let token = ctx.session.tokens().id_token()?;
            let current = ctx.session.tenants().current();
            for organization in ctx.session.tenants().available(&token) {
                let marker = if current.as_ref().is_some_and(|c| c.id == organization.id) {
                    "*"
                } else {
                    " "
                };
                println!("{} {:<20} {}", marker, organization.id, organization.display_name);
            }
            Ok(())
        }
        Commands::Use { organization } => {
            let token = ctx.session.tokens().id_token()?;
            let selected = ctx.session.tenants().select(&token, &organization)?;
            println!("Using {} ({})", selected.display_name, selected.id);
            Ok(())
        }
        Commands::Audit {
            project,
            ledger_only,
        } => {
            let on_progress = |progress: &JobProgress| print_progress(progress);
            if ledger_only {
                let result = ctx
                    .audit
                    .run_general_ledger_audit(&project, Some(&on_progress))
                    .await?;
                print_json(&result)
            } else {
                let result = ctx.audit.run_audit(&project, Some(&on_progress)).await?;
                print_json(&result)
            }
        }
        Commands::Ls { path } => print_json(&ctx.storage.list_folders(&path).await?),
        Commands::Files { path } => print_json(&ctx.storage.list_files(&path).await?),
        Commands::Mkdir { path } => {
            ctx.storage.create_folder(&path).await?;
            println!("Created {}", path);
            Ok(())
        }
        Commands::Upload {
            path,
            file,
            content_type,
        } => {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .with_context(|| format!("{} has no file name", file.display()))?;
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            ctx.storage
                .upload_file(
                    &path,
                    UploadFile {
                        name,
                        content_type,
                        bytes,
                    },
                )
                .await?;
            println!("Uploaded {} to {}", file.display(), path);
            Ok(())
        }
        Commands::Rm { key } => {
            ctx.storage.delete_file(&key).await?;
            println!("Deleted {}", key);
            Ok(())
        }
        Commands::Rmdir { path } => {
            ctx.storage.delete_folder(&path).await?;
            println!("Deleted {}", path);
            Ok(())
        }
        Commands::Search { query, company } => {
            let company = match company {
                Some(company) => company,
                None => ctx.session.tenants().organization_id()?,
            };
            print_json(&ctx.search.search(&query, &company).await?)
        }
        Commands::Index(IndexCommands::Check { prefix }) => {
            print_json(&ctx.index.check_files(&prefix).await?)
        }
        Commands::Index(IndexCommands::Delete { prefix }) => {
            print_json(&ctx.index.delete_files(&prefix).await?)
        }
    }
}

async fn login(
    ctx: &AppContext,
    email: Option<String>,
    password: Option<String>,
    new_password: Option<String>,
    remember: bool,
) -> anyhow::Result<()> {
    let email = email
        .or_else(|| ctx.session.tokens().remembered_email())
        .context("No email given and none remembered; pass --email")?;
    let password = match password {
        Some(password) => password,
        None => prompt_secret(&format!("Password for {}: ", email))?,
    };

    let outcome = ctx
        .auth
        .login(&email, &Secret::new(password), remember)
        .await?;

    let outcome = match outcome {
        LoginOutcome::NewPasswordRequired(challenge) => {
            let new_password = match new_password {
                Some(new_password) => new_password,
                None => prompt_secret("A new password is required: ")?,
            };
            ctx.auth
                .complete_new_password(&challenge, &Secret::new(new_password))
                .await?
        }
        signed_in => signed_in,
    };

    match outcome {
        LoginOutcome::SignedIn(profile) => {
            println!("Signed in as {} <{}>", profile.name, profile.email);
            match ctx.session.tenants().current() {
                Some(organization) => println!("Organization: {}", organization.display_name),
                None => println!("No organizations are assigned to this account"),
            }
            Ok(())
        }
        LoginOutcome::NewPasswordRequired(_) => {
            anyhow::bail!("The identity provider asked for another password change")
        }
    }
}

/// Read a secret from the terminal with echo disabled.
fn prompt_secret(label: &str) -> anyhow::Result<String> {
    rpassword::prompt_password(label).context("Failed to read password from the terminal")
}

fn print_progress(progress: &JobProgress) {
    let percentage = progress
        .progress_percentage
        .map(|p| format!("{:>5.1}%", p))
        .unwrap_or_else(|| "    -".to_string());
    let message = progress.status_message().unwrap_or_default();
    eprintln!("[{}] {} {}", progress.job, percentage, message);
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
