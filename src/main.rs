use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::str::FromStr;

use version_gate_lib::constants::HTTP_UPGRADE_REQUIRED;
use version_gate_lib::logger::setup_logger;
use version_gate_lib::updater::{evaluate, Platform, VersionPolicy};
use version_gate_lib::{run_login_flow, Settings};

#[derive(Parser)]
#[command(name = "version-gate", version, about = "Desktop client version gate")]
struct Cli {
    /// Settings file, defaults to the platform config directory
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log directory, defaults to the platform data directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handle a login response and run the update flow if it was a version rejection
    Login {
        /// File holding the response body
        body: PathBuf,
        #[arg(long, default_value_t = HTTP_UPGRADE_REQUIRED)]
        status: u16,
    },
    /// Evaluate a client version against a policy file
    Evaluate {
        version: String,
        /// JSON version policy
        #[arg(long)]
        policy: PathBuf,
        /// Defaults to the platform this binary runs on
        #[arg(long)]
        platform: Option<String>,
    },
    /// Set one setting, the value is JSON
    Config { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings_path = match cli.settings {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    let mut settings = Settings::load(&settings_path)?;
    rust_i18n::set_locale(&settings.interface_language);

    if let Err(e) = setup_logger(cli.log_dir) {
        eprintln!("{}", e);
    }

    match cli.command {
        Command::Login { body, status } => {
            let body = std::fs::read_to_string(&body)
                .with_context(|| format!("reading login response {:?}", body))?;

            let manager = run_login_flow(&settings, status, &body, |event, snapshot| {
                info!(
                    "{} phase={} progress={}",
                    event, snapshot.phase, snapshot.state.download_progress
                );
            })
            .await?;

            match manager {
                Some(manager) => {
                    let snapshot = serde_json::to_string_pretty(&manager.snapshot())?;
                    println!("{}", snapshot);
                    if let Some(e) = &manager.state().error {
                        error!("Update did not complete: {}", e);
                        bail!("update did not complete: {}", e);
                    }
                }
                None => println!("Login accepted"),
            }
        }
        Command::Evaluate {
            version,
            policy,
            platform,
        } => {
            let policy: VersionPolicy = serde_json::from_str(
                &std::fs::read_to_string(&policy)
                    .with_context(|| format!("reading policy {:?}", policy))?,
            )?;
            let platform = match platform {
                Some(p) => Platform::from_str(&p)
                    .map_err(|_| anyhow::anyhow!("unknown platform '{}'", p))?,
                None => Platform::current(),
            };

            let decision = evaluate(&version, platform, &policy);
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Command::Config { key, value } => {
            let value: serde_json::Value =
                serde_json::from_str(&value).with_context(|| format!("parsing value for {}", key))?;
            settings.set_config(&key, &value)?;
            settings.save(&settings_path)?;
            info!("Saved {} to {:?}", key, settings_path);
        }
    }

    Ok(())
}
