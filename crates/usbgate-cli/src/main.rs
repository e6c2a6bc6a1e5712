#![deny(unsafe_code)]

//! usbgate CLI — exercises the accessory client against a running server.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use usbgate_core::{AccessoryManager, StatusKey, STATUS_DISCONNECTED};

/// usbgate — client for the platform USB accessory server.
#[derive(Parser)]
#[command(name = "usbgate", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "usbgate.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the attached accessory's identity.
    Info {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Check whether this application holds accessory permission.
    CheckPermission,

    /// Request accessory permission and wait for the host's decision.
    RequestPermission,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up tracing subscriber with verbosity level
    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Info { json } => cmd_info(&cli.config, json).await?,
        Commands::CheckPermission => cmd_check_permission(&cli.config).await?,
        Commands::RequestPermission => cmd_request_permission(&cli.config).await?,
        Commands::Config { show } => cmd_config(&cli.config, show).await?,
    }

    Ok(())
}

/// Build a session from the config file. The CLI has no platform
/// key-value integration, so the status key is a standalone channel.
async fn manager(config_path: &Path) -> Result<AccessoryManager> {
    let config = load_config(config_path).await?;
    let (_status_tx, status) = StatusKey::channel(STATUS_DISCONNECTED);
    Ok(AccessoryManager::new(config, status))
}

async fn cmd_info(config_path: &Path, json: bool) -> Result<()> {
    let manager = manager(config_path).await?;
    let list = manager.attached().await?;

    let Some(acc) = list.first() else {
        println!("No accessory attached.");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(acc)?);
    } else {
        println!("manufacturer: {}", acc.manufacturer());
        println!("model:        {}", acc.model());
        println!("description:  {}", acc.description());
        println!("version:      {}", acc.version());
        println!("uri:          {}", acc.uri());
        println!("serial:       {}", acc.serial());
    }
    Ok(())
}

async fn cmd_check_permission(config_path: &Path) -> Result<()> {
    let manager = manager(config_path).await?;
    let list = manager.attached().await?;
    let Some(acc) = list.first() else {
        println!("No accessory attached.");
        return Ok(());
    };

    let mut acc = acc.clone();
    let granted = manager.has_permission(&mut acc).await?;
    println!(
        "Permission for {} ({}): {}",
        acc.model(),
        acc.serial(),
        if granted { "granted" } else { "not granted" }
    );
    Ok(())
}

async fn cmd_request_permission(config_path: &Path) -> Result<()> {
    let mut manager = manager(config_path).await?;
    let list = manager.attached().await?;
    let Some(acc) = list.first() else {
        println!("No accessory attached.");
        return Ok(());
    };

    info!(model = acc.model(), "requesting accessory permission");
    manager
        .request_permission(acc.clone(), |acc, granted| {
            println!(
                "Host {} permission for {} ({})",
                if granted { "granted" } else { "denied" },
                acc.model(),
                acc.serial()
            );
        })
        .await?;

    println!("Waiting for the host's decision...");
    match manager.dispatch_permission_response().await? {
        Some(_) => Ok(()),
        None => {
            println!("The server sent an unrecognized notification; no decision.");
            Ok(())
        }
    }
}

async fn cmd_config(config_path: &Path, show: bool) -> Result<()> {
    let config = load_config(config_path).await?;
    if show {
        println!("server socket:  {}", config.sockets.server_path);
        println!("notify socket:  {}", config.sockets.notify_path);
        println!("notify mode:    0o{:o}", config.sockets.notify_mode);
        println!("device node:    {}", config.platform.device_node);
        println!("emulated:       {}", config.platform.emulated);
        println!(
            "app id:         {}",
            config.client.app_id.as_deref().unwrap_or("(from executable)")
        );
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<usbgate_config::AppConfig> {
    if path.exists() {
        usbgate_config::AppConfig::load(path)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(usbgate_config::AppConfig::default())
    }
}
