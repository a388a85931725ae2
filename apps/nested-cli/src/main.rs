use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use nested::contract::model::{
    Asset, ProfileFields, ProjectDraft, ProjectPatch, Session, UserId,
};
use nested::contract::validation::{validate_edu_email, validate_username_format};
use nested::contract::NestedApi;
use nested::{NestedConfig, NestedModule};
use runtime::{AppConfig, CliArgs};

/// Nested - profiles and project listings with an offline-capable store
#[derive(Parser)]
#[command(name = "nested")]
#[command(about = "Nested - profiles and project listings with an offline-capable store")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Act as this user (omit for an anonymous session)
    #[arg(short, long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check configuration and report the storage mode
    Check,
    /// Validate a university email address
    ValidateEmail { email: String },
    /// Validate a username against the format rules
    ValidateUsername { username: String },
    /// Ask the backend whether a username is free
    UsernameAvailable { username: String },
    /// Ask the backend whether an email is already registered
    EmailAvailable { email: String },
    /// Read or write the current user's profile
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Manage project listings
    #[command(subcommand)]
    Project(ProjectCommand),
    /// List published projects
    Discover,
    /// Upload a profile picture
    Avatar { file: PathBuf },
    /// Upload a project icon
    ProjectIcon { id: Uuid, file: PathBuf },
    /// Delete the current user's projects and profile
    DeleteAccount,
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Show a profile (the current user's unless --of is given)
    Show {
        #[arg(long)]
        of: Option<String>,
    },
    /// Save profile fields
    Save(ProfileArgs),
    /// Coalesce several JSON edits through the autosaver and save once
    Edit {
        #[arg(required = true)]
        edits: Vec<String>,
    },
}

#[derive(Args)]
struct ProfileArgs {
    /// Fields as a JSON object; flags below override matching keys
    #[arg(long)]
    json: Option<String>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    university: Option<String>,
    #[arg(long)]
    bio: Option<String>,
    /// Comma-separated skills
    #[arg(long, value_delimiter = ',')]
    skills: Option<Vec<String>>,
}

impl ProfileArgs {
    fn into_fields(self) -> Result<ProfileFields> {
        let mut fields: ProfileFields = match &self.json {
            Some(raw) => serde_json::from_str(raw).context("--json is not a valid profile object")?,
            None => ProfileFields::default(),
        };
        if self.username.is_some() {
            fields.username = self.username;
        }
        if self.first_name.is_some() {
            fields.first_name = self.first_name;
        }
        if self.last_name.is_some() {
            fields.last_name = self.last_name;
        }
        if self.university.is_some() {
            fields.university = self.university;
        }
        if self.bio.is_some() {
            fields.bio = self.bio;
        }
        if self.skills.is_some() {
            fields.skills = self.skills;
        }
        Ok(fields)
    }
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Create a project from a JSON draft
    Create { json: String },
    /// Patch a project with a JSON object
    Update { id: Uuid, json: String },
    Show { id: Uuid },
    /// List the current user's projects
    List,
    Delete { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    if cli.command.is_none() && !cli.print_config {
        bail!("a subcommand is required (see --help)");
    }
    if let Some(path) = &cli.config {
        if !path.is_file() {
            bail!("config file not found: {}", path.display());
        }
    }

    // Load configuration (normalized home_dir is applied inside)
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.as_ref().cloned().unwrap_or_default();
    runtime::logging::init_logging_from_config(&logging_config, Path::new(&config.home_dir));

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let Some(command) = cli.command else {
        return Ok(());
    };

    let module_cfg: NestedConfig = config.module_config("nested")?;
    let module = NestedModule::init(module_cfg, &config.home_path())?;
    let session = match cli.user {
        Some(id) => Session::authenticated(UserId::new(id)),
        None => Session::anonymous(),
    };
    tracing::debug!(user = ?session.user_id(), "Nested CLI starting");

    run(&config, &module, session, command).await
}

async fn run(
    config: &AppConfig,
    module: &NestedModule,
    session: Session,
    command: Commands,
) -> Result<()> {
    let api: Arc<dyn NestedApi> = module.client();
    let session = &session;
    match command {
        Commands::Check => check_config(config, api.as_ref()),
        Commands::ValidateEmail { email } => print_json(&validity(validate_edu_email(&email).err())),
        Commands::ValidateUsername { username } => {
            print_json(&validity(validate_username_format(&username)))
        }
        Commands::UsernameAvailable { username } => {
            print_json(&api.check_username_available(session, &username).await?)
        }
        Commands::EmailAvailable { email } => print_json(&api.check_email_available(&email).await?),
        Commands::Profile(ProfileCommand::Show { of: None }) => {
            print_json(&api.load_profile(session).await?)
        }
        Commands::Profile(ProfileCommand::Show { of: Some(id) }) => {
            print_json(&api.load_profile_of(&UserId::new(id)).await?)
        }
        Commands::Profile(ProfileCommand::Save(args)) => {
            print_json(&api.save_profile(session, args.into_fields()?).await?)
        }
        Commands::Profile(ProfileCommand::Edit { edits }) => {
            edit_profile(module, session.clone(), edits).await
        }
        Commands::Project(ProjectCommand::Create { json }) => {
            let draft: ProjectDraft =
                serde_json::from_str(&json).context("not a valid project draft")?;
            print_json(&api.create_project(session, draft).await?)
        }
        Commands::Project(ProjectCommand::Update { id, json }) => {
            let patch: ProjectPatch =
                serde_json::from_str(&json).context("not a valid project patch")?;
            print_json(&api.update_project(session, id, patch).await?)
        }
        Commands::Project(ProjectCommand::Show { id }) => {
            print_json(&api.load_project(session, id).await?)
        }
        Commands::Project(ProjectCommand::List) => print_json(&api.list_my_projects(session).await?),
        Commands::Project(ProjectCommand::Delete { id }) => {
            api.delete_project(session, id).await?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        Commands::Discover => print_json(&api.discover_projects(session).await?),
        Commands::Avatar { file } => {
            let (url, outcome) = api.upload_avatar(session, read_asset(&file)?).await?;
            print_json(&serde_json::json!({ "asset": url, "profile": outcome }))
        }
        Commands::ProjectIcon { id, file } => {
            let (url, outcome) = api.upload_project_icon(session, id, read_asset(&file)?).await?;
            print_json(&serde_json::json!({ "asset": url, "project": outcome }))
        }
        Commands::DeleteAccount => {
            api.delete_account(session).await?;
            print_json(&serde_json::json!({ "deleted": true }))
        }
    }
}

async fn edit_profile(module: &NestedModule, session: Session, edits: Vec<String>) -> Result<()> {
    let autosaver = module.autosaver(session);
    for raw in &edits {
        let fields: ProfileFields =
            serde_json::from_str(raw).with_context(|| format!("not a valid profile edit: {raw}"))?;
        autosaver.schedule(fields);
    }
    match autosaver.flush().await {
        Some(outcome) => print_json(&outcome.map_err(nested::contract::error::NestedError::from)?),
        None => print_json(&serde_json::json!({ "status": "nothing_to_save" })),
    }
}

fn check_config(config: &AppConfig, api: &dyn NestedApi) -> Result<()> {
    tracing::info!("Checking configuration...");
    println!("Configuration check passed");
    println!(
        "Storage mode: {}",
        if api.is_remote_configured() {
            "remote + local cache"
        } else {
            "local only"
        }
    );
    println!("{}", config.to_yaml()?);
    Ok(())
}

#[derive(Serialize)]
struct Validity {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn validity<E: std::fmt::Display>(error: Option<E>) -> Validity {
    Validity {
        valid: error.is_none(),
        error: error.map(|e| e.to_string()),
    }
}

fn read_asset(path: &Path) -> Result<Asset> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let mime_type = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    };
    Ok(Asset {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        mime_type: mime_type.to_string(),
        bytes,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
