//! extsys CLI - Main entry point

mod builtin;
mod cli;

use clap::{Parser, Subcommand};
use extsys_core::plugin::PluginDiscovery;
use extsys_core::PluginManager;
use extsys_foundation::HostConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// extsys - plugin host for the extension system
#[derive(Parser, Debug)]
#[command(name = "extsys")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Host configuration file (defaults to .extsys/config.json + global config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Additional plugin search path (repeatable)
    #[arg(long = "plugin-path")]
    plugin_paths: Vec<PathBuf>,

    /// User settings file (enabled/disabled plugins)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Shut down right after startup instead of waiting for Ctrl-C
    #[arg(long)]
    exit_after_init: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Plugin manager options, e.g. `-- -noload Git -profile`
    #[arg(last = true)]
    plugin_args: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List discovered plugins with their state
    List,
    /// Print plugin manager and plugin options
    Options,
    /// Run the plugin host (default)
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (-trace <file> redirects output)
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    match cli::trace_file(&args.plugin_args) {
        Some(path) => {
            let file = std::fs::File::create(&path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .init();
        }
    }

    // Load configuration
    let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut config = match &args.config {
        Some(path) => HostConfig::load_from(path)?,
        None => HostConfig::load(&working_dir).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config: {}", e);
            HostConfig::default()
        }),
    };
    if config.plugin_paths.is_empty() && args.plugin_paths.is_empty() {
        config.plugin_paths = PluginDiscovery::with_default_paths(&working_dir)
            .search_paths()
            .to_vec();
    }
    for path in &args.plugin_paths {
        if !config.plugin_paths.contains(path) {
            config.plugin_paths.push(path.clone());
        }
    }
    if let Some(settings) = &args.settings {
        config.user_settings = Some(settings.clone());
    }

    let manager = PluginManager::from_config(&config)?;
    builtin::register(&manager);
    manager.set_plugin_paths(config.plugin_paths.clone()).await;

    match args.command.unwrap_or(Command::Run) {
        Command::List => list_plugins_cmd(&manager),
        Command::Options => {
            println!("Plugin manager options:");
            print!("{}", manager.format_options(4, 40));
            print!("{}", manager.format_plugin_options(4, 40));
            Ok(())
        }
        Command::Run => cli::run(&manager, &args.plugin_args, args.exit_after_init).await,
    }
}

/// List discovered plugins
fn list_plugins_cmd(manager: &PluginManager) -> anyhow::Result<()> {
    let plugins = manager.plugins();
    if plugins.is_empty() {
        println!("No plugins found.");
        return Ok(());
    }

    println!("\nPlugins ({})\n", manager.platform_name());
    println!(
        "{:<20} {:<10} {:<12} {:<8} {}",
        "Name", "Version", "State", "Enabled", "Error"
    );
    println!("{}", "-".repeat(80));

    for (category, specs) in manager.plugin_collections() {
        if !category.is_empty() {
            println!("[{}]", category);
        }
        for spec in specs {
            let enabled = if spec.is_effectively_enabled() { "yes" } else { "no" };
            let error = spec.error_string();
            let error_display = match error.lines().next() {
                Some(line) if line.chars().count() > 40 => {
                    format!("{}...", line.chars().take(37).collect::<String>())
                }
                Some(line) => line.to_string(),
                None => String::new(),
            };
            println!(
                "{:<20} {:<10} {:<12} {:<8} {}",
                spec.name(),
                spec.version(),
                spec.state().to_string(),
                enabled,
                error_display
            );
        }
    }

    println!();
    Ok(())
}
