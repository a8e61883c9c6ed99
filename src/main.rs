use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

mod app;
mod keybindings;
mod ui;

use app::{App, AppEvent};
use keybindings::KeybindingRegistry;
use redeguara::backend::{AuthClient, Backend, GroupVisibility};
use redeguara::compose::{Attachment, MediaKind, PostDraft};
use redeguara::config::{password_from_env, Config, ENV_PASSWORD};

/// Get the config directory path (~/.config/redeguara/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("redeguara"))
}

#[derive(Parser, Debug)]
#[command(name = "redeguara", about = "Terminal client for the RedeGuara social network")]
struct Args {
    /// Config file (default: ~/.config/redeguara/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Sign in with this e-mail; the password is read from REDEGUARA_PASSWORD
    #[arg(long)]
    email: Option<String>,

    /// Publish a post with this text and exit
    #[arg(long, value_name = "TEXT")]
    post: Option<String>,

    /// Attach an image or video to --post (repeatable)
    #[arg(long, value_name = "FILE", requires = "post")]
    attach: Vec<PathBuf>,

    /// Duration of the attached video in seconds
    #[arg(long, value_name = "SECS", requires = "post")]
    video_seconds: Option<f64>,

    /// Create an account for --email (password from REDEGUARA_PASSWORD) and exit
    #[arg(long, requires = "email")]
    sign_up: bool,

    /// Display name for --sign-up
    #[arg(long, requires = "sign_up")]
    name: Option<String>,

    /// List groups, optionally matching SEARCH, and exit
    #[arg(long, value_name = "SEARCH", num_args = 0..=1, default_missing_value = "")]
    groups: Option<String>,

    /// Posts per feed page
    #[arg(long)]
    page_size: Option<usize>,
}

/// Create the config directory with user-only permissions.
fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
    }

    // SEC-007: Set directory permissions on Unix (user-only access)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }
    Ok(())
}

/// Log to a file in the config directory, and only when RUST_LOG is set:
/// the terminal belongs to the UI.
fn init_logging(config_dir: &Path) -> Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        return Ok(());
    }
    let log_path = config_dir.join("redeguara.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Publish `text` with `attachments` and print the stored post's link.
async fn publish_from_cli(
    auth: &AuthClient,
    config: &Config,
    text: &str,
    attachments: &[PathBuf],
    video_seconds: Option<f64>,
) -> Result<()> {
    let mut draft = PostDraft::new(text);
    for path in attachments {
        let mut attachment = Attachment::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if attachment.kind() == Some(MediaKind::Video) {
            if let Some(secs) = video_seconds {
                let duration = Duration::try_from_secs_f64(secs)
                    .context("--video-seconds must be a non-negative number")?;
                attachment = attachment.with_duration(duration);
            }
        }
        draft
            .attach(attachment)
            .with_context(|| format!("Cannot attach {}", path.display()))?;
    }

    let viewer = auth.viewer();
    let post = draft
        .publish(auth.backend(), viewer.as_ref())
        .await
        .context("Failed to publish post")?;

    let links = redeguara::util::ShareLinks::new(&config.site_url);
    println!("Published: {}", links.direct_url(&post));
    Ok(())
}

/// Print the groups matching `search`, one per line.
async fn list_groups(backend: &Backend, search: &str) -> Result<()> {
    let search = Some(search).filter(|s| !s.trim().is_empty());
    let groups = backend
        .fetch_groups(search)
        .await
        .context("Failed to load groups")?;
    if groups.is_empty() {
        println!("No groups found");
    }
    for group in &groups {
        let visibility = match group.visibility {
            GroupVisibility::Private => "private",
            _ => "public",
        };
        println!(
            "{} [{visibility}] {} members, {}",
            redeguara::util::single_line(&group.name),
            group.member_count(),
            group.owner_label()
        );
        if let Some(description) = group.description.as_deref().filter(|d| !d.trim().is_empty()) {
            println!("    {}", redeguara::util::single_line(description));
        }
    }
    Ok(())
}

/// Create an account and report whether it still needs confirming.
async fn sign_up_from_cli(auth: &AuthClient, email: &str, name: Option<&str>) -> Result<()> {
    let password = password_from_env()
        .with_context(|| format!("{ENV_PASSWORD} must hold the new account's password"))?;
    match auth
        .sign_up(email, &password, name)
        .await
        .context("Sign-up failed")?
    {
        Some(session) => println!("Account created, signed in as {}", session.display_name()),
        None => println!("Account created; confirm the address sent to {email} before signing in"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = get_config_dir()?;
    ensure_config_dir(&config_dir)?;
    init_logging(&config_dir)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        .with_env_overrides();
    if let Some(page_size) = args.page_size {
        config.page_size = page_size.max(1);
    }
    if args.email.is_some() {
        config.email = args.email.clone();
    }
    tracing::debug!(?config, "Configuration loaded");

    let backend = Backend::new(&config.supabase_url, config.anon_key()?)
        .context("Failed to create backend client")?;
    let auth = AuthClient::new(backend);

    if let Some(search) = &args.groups {
        return list_groups(auth.backend(), search).await;
    }
    if args.sign_up {
        let email = config.email.as_deref().context("--sign-up needs --email")?;
        return sign_up_from_cli(&auth, email, args.name.as_deref()).await;
    }

    if let Some(email) = &config.email {
        match password_from_env() {
            Some(password) => {
                let session = auth
                    .sign_in(email, &password)
                    .await
                    .context("Sign-in failed")?;
                tracing::info!(user_id = %session.user_id, "Signed in at startup");
            }
            None => {
                eprintln!("Warning: {ENV_PASSWORD} is not set; continuing without signing in");
            }
        }
    }

    if let Some(text) = &args.post {
        return publish_from_cli(&auth, &config, text, &args.attach, args.video_seconds).await;
    }

    let mut keybindings = KeybindingRegistry::new();
    for warning in keybindings.apply_overrides(&config.keybindings) {
        tracing::warn!(warning = %warning, "Ignoring keybinding override");
        eprintln!("Warning: {warning}");
    }

    let mut app = App::new(&config, auth.clone(), keybindings);

    // Create event channel for background tasks
    let (event_tx, event_rx) = mpsc::channel::<AppEvent>(64);

    // Forward auth changes into the event loop
    let mut subscription = auth.subscribe();
    let auth_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            if auth_tx.send(AppEvent::Auth(event)).await.is_err() {
                break;
            }
        }
    });

    ui::run(&mut app, event_tx, event_rx).await?;

    println!("Até logo!");
    Ok(())
}
