//! Tether - remote execution target registry
//!
//! Usage:
//!   tether list                      # Show known servers
//!   tether add dev@build:22 --name Build
//!   tether default dev@build:22      # Make it the default target
//!   tether check dev@build:22        # Connect and report status
//!   tether remove dev@build:22

mod probe;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_core::context::AppContext;
use tether_core::env::ExecutionEnvironment;
use tether_core::registry::{AddServerOptions, Listing, ServerRegistry};
use tether_core::server::{ServerRecord, StatusLevel, StatusMessage};
use tether_core::services::Services;

use crate::probe::TcpProbe;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Remote execution target registry", long_about = None)]
struct Cli {
    /// Configuration directory (defaults to the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Seconds to wait when probing a server
    #[arg(long, global = true, default_value_t = 5)]
    connect_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show known servers
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Register a remote server
    Add {
        /// Target as user@host[:port]
        target: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Sync strategy id (see `tether strategies`)
        #[arg(long)]
        strategy: Option<String>,
        /// Make it the default server
        #[arg(long)]
        default: bool,
        /// Connect and run setup right away
        #[arg(long)]
        connect: bool,
        /// Enable X11 forwarding
        #[arg(long)]
        x11: bool,
    },

    /// Forget a remote server
    Remove {
        /// Target as user@host[:port]
        target: String,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Set the default server
    Default {
        /// Target as user@host[:port], or `local`
        target: String,
    },

    /// Connect to a server and report its status
    Check {
        /// Target as user@host[:port]
        target: String,
    },

    /// List available sync strategies
    Strategies,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether_core=info,tether_cli=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let probe = TcpProbe::new(Duration::from_secs(cli.connect_timeout));
    let services = Services::new(Arc::new(probe));
    let ctx = match cli.config_dir {
        Some(dir) => AppContext::load(dir, services)?,
        None => AppContext::with_defaults(services)?,
    };

    let healthy = run(&ctx, cli.command)?;
    ctx.flush().context("Failed to save server list")?;

    if !healthy {
        std::process::exit(1);
    }
    Ok(())
}

/// Returns false when the command ran but found a problem worth a non-zero
/// exit status.
fn run(ctx: &AppContext, command: Commands) -> Result<bool> {
    let registry = ctx.registry();
    match command {
        Commands::List { format } => run_list(registry, format)?,
        Commands::Add {
            target,
            name,
            strategy,
            default,
            connect,
            x11,
        } => {
            let env = parse_target(&target)?;
            if let Some(id) = &strategy
                && !registry.services().strategies().contains(id)
            {
                anyhow::bail!(
                    "Unknown sync strategy: {}. Available: {}",
                    id,
                    registry.services().strategies().ids().join(", ")
                );
            }

            let mut options = AddServerOptions::new(env)
                .as_default(default)
                .with_connect(connect)
                .with_x11_forwarding(x11);
            if let Some(name) = name {
                options = options.with_display_name(name);
            }
            if let Some(id) = strategy {
                options = options.with_sync_strategy(id);
            }

            let record = registry.add_server(options);
            println!(
                "{} Added {} ({})",
                style("✓").green(),
                style(record.display_name()).bold(),
                record.env()
            );
            if connect {
                return Ok(print_status(&record.status_message()));
            }
        }
        Commands::Remove { target, yes } => run_remove(registry, &target, yes)?,
        Commands::Default { target } => {
            let record = listed(registry, &parse_target(&target)?)?;
            registry.set_default_record(&record);
            println!(
                "{} Default server is now {}",
                style("✓").green(),
                style(record.display_name()).bold()
            );
        }
        Commands::Check { target } => {
            let env = parse_target(&target)?;
            let record = registry.get_or_create(&env);
            return Ok(match record.validate(true) {
                Some(message) => print_status(&message),
                None => print_status(&record.status_message()),
            });
        }
        Commands::Strategies => {
            for strategy in registry.services().strategies().all() {
                println!(
                    "{:<8} {}",
                    style(strategy.id()).cyan(),
                    strategy.display_name()
                );
            }
        }
    }
    Ok(true)
}

fn parse_target(target: &str) -> Result<ExecutionEnvironment> {
    target
        .parse::<ExecutionEnvironment>()
        .with_context(|| format!("Invalid target '{target}'"))
}

fn listed(registry: &ServerRegistry, env: &ExecutionEnvironment) -> Result<Arc<ServerRecord>> {
    match registry.lookup(env) {
        Some(Listing::Committed(record)) => Ok(record),
        _ => anyhow::bail!("{} is not a known server", env),
    }
}

fn run_list(registry: &ServerRegistry, format: OutputFormat) -> Result<()> {
    let default = registry.default_record();
    let servers = registry.servers();

    match format {
        OutputFormat::Table => {
            println!(
                "  {:<24} {:<32} {:<14} {}",
                style("NAME").bold(),
                style("TARGET").bold(),
                style("STATE").bold(),
                style("SYNC").bold()
            );
            for record in servers.iter() {
                let marker = if **record == *default { "*" } else { " " };
                println!(
                    "{} {:<24} {:<32} {:<14} {}",
                    style(marker).green(),
                    record.display_name(),
                    record.env(),
                    record.state(),
                    record.sync_strategy().as_deref().unwrap_or("-")
                );
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> = servers
                .iter()
                .map(|record| {
                    let profile = record.host_profile();
                    serde_json::json!({
                        "name": record.display_name(),
                        "target": record.env().to_string(),
                        "local": record.is_local(),
                        "default": **record == *default,
                        "state": record.state().to_string(),
                        "sync_strategy": record.sync_strategy(),
                        "x11_forwarding": record.x11_forwarding(),
                        "os": profile.os_family.map(|os| os.to_string()),
                        "cpu": profile.cpu_family.map(|cpu| cpu.to_string()),
                        "os_version": profile.os_version,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }
    Ok(())
}

fn run_remove(registry: &ServerRegistry, target: &str, yes: bool) -> Result<()> {
    let env = parse_target(target)?;
    if env.is_local() {
        anyhow::bail!("The local machine cannot be removed");
    }
    let record = listed(registry, &env)?;

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Remove {} ({})?", record.display_name(), env))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted");
            return Ok(());
        }
    }

    let remaining: Vec<_> = registry
        .remote_servers()
        .into_iter()
        .filter(|server| server.env() != &env)
        .collect();
    let current_default = registry.default_record();
    let default = if *current_default == *record {
        registry.local()
    } else {
        current_default
    };

    registry.set(&remaining, &default);
    registry.save();
    println!("{} Removed {}", style("✓").green(), env);
    Ok(())
}

/// Print a status line; returns false for errors.
fn print_status(message: &StatusMessage) -> bool {
    match message.level {
        StatusLevel::Info => {
            println!("{} {}", style("✓").green(), message.text);
            true
        }
        StatusLevel::Warning => {
            println!("{} {}", style("⚠").yellow(), message.text);
            true
        }
        StatusLevel::Error => {
            println!("{} {}", style("✗").red(), message.text);
            false
        }
    }
}
