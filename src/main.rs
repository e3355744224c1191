//! Redactor CLI entrypoint.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use redactor::config::Config;
use redactor::gateway::{self, AppState};
use redactor::model::{PluginId, TokenId};

#[derive(Parser)]
#[command(about = "Coordinates redaction of personal data across plugins", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen address, overrides the config file
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Manage plugins
    Plugin {
        #[command(subcommand)]
        command: PluginCommands,
    },

    /// Manage access tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Manage access grants
    Access {
        #[command(subcommand)]
        command: AccessCommands,
    },

    /// Print the effective configuration
    ShowConfig,
}

#[derive(Subcommand)]
enum PluginCommands {
    /// Register a plugin
    Add {
        /// Plugin type, e.g. Dummy or Rest
        #[arg(long = "type")]
        plugin_type: String,

        #[arg(long)]
        name: String,

        /// Plugin config as JSON
        #[arg(long, default_value = "{}")]
        config: String,
    },

    /// List registered plugins
    List,
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Create a token and print its credential once
    Create {
        #[arg(short, long)]
        description: String,
    },
}

#[derive(Subcommand)]
enum AccessCommands {
    /// Allow a token to act on a plugin
    Grant {
        #[arg(long)]
        token: TokenId,

        #[arg(long)]
        plugin: PluginId,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { listen } => {
            if let Some(listen) = listen {
                config.gateway.listen = listen;
            }
            tracing::info!(
                listen = %config.gateway.listen,
                database = %config.database.path.display(),
                plugin_types = ?config.plugins.enabled,
                "Starting redactor"
            );
            let state = AppState::from_config(&config)?;
            gateway::serve(state, &config.gateway).await
        }

        Commands::Plugin { command } => {
            let state = AppState::from_config(&config)?;
            match command {
                PluginCommands::Add {
                    plugin_type,
                    name,
                    config: raw,
                } => {
                    let plugin_config: serde_json::Value =
                        serde_json::from_str(&raw).context("--config must be valid JSON")?;
                    let plugin = state
                        .catalog
                        .create_plugin(&plugin_type, &name, plugin_config)
                        .await?;
                    println!("{}", serde_json::to_string_pretty(&plugin)?);
                }
                PluginCommands::List => {
                    for plugin in state.catalog.list_plugins().await? {
                        println!("{}\t{}\t{}", plugin.id, plugin.plugin_type, plugin.name);
                    }
                }
            }
            Ok(())
        }

        Commands::Token {
            command: TokenCommands::Create { description },
        } => {
            let state = AppState::from_config(&config)?;
            let issued = state.catalog.create_token(&description).await?;
            eprintln!("Store this credential now; it cannot be shown again.");
            println!("{}", issued.credential);
            Ok(())
        }

        Commands::Access {
            command: AccessCommands::Grant { token, plugin },
        } => {
            let state = AppState::from_config(&config)?;
            state.catalog.grant_access(token, plugin).await?;
            println!("Granted token {token} access to plugin {plugin}");
            Ok(())
        }

        Commands::ShowConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
