use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::collections::HashSet;
use std::io::{BufRead, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use upwatch::api::ApiClient;
use upwatch::app::{Action, ActionError, Dashboard, Row};
use upwatch::config::Config;
use upwatch::notify::{ConsoleSink, NotificationSink};
use upwatch::session::{FileTokenStore, SessionManager, TokenStore};
use upwatch::store::FilterState;

/// Get the config directory path (~/.config/upwatch/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("upwatch"))
}

fn ensure_private_dir(dir: &std::path::Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).context("Failed to create config directory")?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "upwatch", about = "Command-line client for the uptime monitoring dashboard")]
struct Args {
    /// Config file (default: ~/.config/upwatch/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Backend URL, overriding config and UPWATCH_BASE_URL
    #[arg(long, value_name = "URL", global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Register {
        username: String,
        email: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Log in and remember the session
    Login {
        username: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Check that the stored session is still valid
    Whoami,
    /// List monitored sites
    List {
        /// Only sites that are currently down
        #[arg(long)]
        down: bool,
    },
    /// Start monitoring a site
    Add { url: String },
    /// Add many sites from newline- or comma-separated text
    Import {
        /// Input file; stdin when omitted or "-"
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Stop monitoring one or more sites
    Delete {
        #[arg(required = true, value_name = "ID")]
        ids: Vec<i64>,
    },
    /// Re-check every site now and show the result
    Refresh,
    /// Get a code for linking the account to the Telegram bot
    LinkTelegram,
}

fn read_password(given: Option<String>) -> Result<SecretString> {
    let password = match given {
        Some(p) => p,
        None => {
            eprint!("Password: ");
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Failed to read password from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(SecretString::from(password))
}

fn read_import(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read import file: {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read urls from stdin")?;
            Ok(text)
        }
    }
}

/// Drop repeated ids, keeping first-seen order.
fn distinct_ids(ids: Vec<i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn print_rows(rows: &[Row<'_>]) {
    if rows.is_empty() {
        println!("No sites.");
        return;
    }
    for row in rows {
        let site = row.site;
        let status = site
            .last_status
            .map(|s| s.as_str())
            .unwrap_or("-");
        let checked = site
            .last_checked_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!("{:>6}  {:<7}  {:<23}  {}", site.id, status, checked, site.url);
    }
}

/// Restore the stored session or explain how to get one.
async fn require_session(dashboard: &Dashboard) -> Result<()> {
    if !dashboard.session().verify_session().await {
        bail!("Not logged in. Run `upwatch login <username>` first.");
    }
    Ok(())
}

async fn run(args: Args, dashboard: &mut Dashboard) -> Result<Result<(), ActionError>> {
    let outcome = match args.command {
        Command::Register {
            username,
            email,
            password,
        } => {
            let password = read_password(password)?;
            dashboard
                .dispatch(Action::Register {
                    username,
                    email,
                    password,
                })
                .await
        }
        Command::Login { username, password } => {
            let password = read_password(password)?;
            dashboard
                .dispatch(Action::Login { username, password })
                .await
                .map(|()| println!("{} sites monitored", dashboard.store().sites().len()))
        }
        Command::Logout => {
            let result = dashboard.dispatch(Action::Logout).await;
            println!("Logged out");
            result
        }
        Command::Whoami => {
            let result = dashboard.dispatch(Action::Startup).await;
            if dashboard.session().is_logged_in() {
                println!(
                    "Logged in to {} ({} sites)",
                    dashboard.session().api().base_url(),
                    dashboard.store().sites().len()
                );
            } else {
                println!("Not logged in");
            }
            result
        }
        Command::List { down } => {
            require_session(dashboard).await?;
            let mut result = dashboard.dispatch(Action::Reload).await;
            if down && result.is_ok() {
                result = dashboard
                    .dispatch(Action::SetFilter(FilterState::DownOnly))
                    .await;
            }
            print_rows(&dashboard.rows());
            result
        }
        Command::Add { url } => {
            require_session(dashboard).await?;
            dashboard.dispatch(Action::AddSite(url)).await
        }
        Command::Import { file } => {
            let text = read_import(file)?;
            require_session(dashboard).await?;
            dashboard.dispatch(Action::AddMany(text)).await
        }
        Command::Delete { ids } => {
            require_session(dashboard).await?;
            let ids = distinct_ids(ids);
            if let [id] = ids.as_slice() {
                dashboard.dispatch(Action::DeleteSite(*id)).await
            } else {
                if let Err(e) = dashboard.dispatch(Action::Reload).await {
                    return Ok(Err(e));
                }
                for id in &ids {
                    if dashboard.store().contains(*id) {
                        dashboard.dispatch(Action::Toggle(*id)).await?;
                    } else {
                        eprintln!("No site with id {id}, skipping");
                    }
                }
                if dashboard.selection().is_empty() {
                    bail!("None of the given ids exist");
                }
                dashboard.dispatch(Action::DeleteSelected).await
            }
        }
        Command::Refresh => {
            require_session(dashboard).await?;
            let result = dashboard.dispatch(Action::RefreshStatuses).await;
            if result.is_ok() {
                print_rows(&dashboard.rows());
            }
            result
        }
        Command::LinkTelegram => {
            require_session(dashboard).await?;
            dashboard.dispatch(Action::LinkTelegram).await
        }
    };
    Ok(outcome)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    ensure_private_dir(&config_dir)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        .with_env_overrides()
        .with_base_url_override(args.base_url.clone(), "--base-url");
    let base_url = config.validate()?;

    let api = ApiClient::new(base_url, config.request_timeout())
        .context("Failed to build HTTP client")?;
    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(
        config.token_path(&config_dir.join("token")),
    ));
    let sink: Arc<dyn NotificationSink> = Arc::new(ConsoleSink);
    let session = Arc::new(SessionManager::new(api, tokens, sink.clone()));
    let mut dashboard = Dashboard::new(session, sink);

    match run(args, &mut dashboard).await? {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            // Already shown to the user by the notification sink
            tracing::debug!(error = %e, "Command failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
