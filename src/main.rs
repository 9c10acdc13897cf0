use anyhow::Result;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use tokenrelay::cli::{Cli, Commands, ConfigAction};
use tokenrelay::config::Config;
use tokenrelay::diagnostics::{print_report, run_checks};
use tokenrelay::server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli);

    match cli.command {
        None => {
            run_server(cli.config.as_deref(), None).await?;
        }
        Some(Commands::Serve { bind }) => {
            run_server(cli.config.as_deref(), bind).await?;
        }
        Some(Commands::Check) => {
            let config = load_config(cli.config.as_deref())?;
            if !print_report(&run_checks(&config)) {
                eprintln!("{}", "Required settings are missing".red());
                std::process::exit(1);
            }
            println!("{}", "Configuration OK".green());
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "tokenrelay",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over `-q` / `-v`.
fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tokenrelay={}", cli.log_level())));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/tokenrelay/config.toml)
/// 3. Built-in defaults
///
/// Environment variables override whatever was loaded.
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

async fn run_server(custom_path: Option<&std::path::Path>, bind: Option<String>) -> Result<()> {
    let mut config = load_config(custom_path)?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    tracing::info!(version = %tokenrelay::version_string(), "Starting tokenrelay");
    if let Err(e) = config.upstream.chat_credentials() {
        tracing::warn!("{e}; /api/generate will fail until configured");
    }
    if let Err(e) = config.upstream.transcription_credentials() {
        tracing::warn!("{e}; /api/transcribe will fail until configured");
    }

    server::serve(config, server::shutdown_signal()).await?;
    Ok(())
}

/// Handle config subcommands.
fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
) -> Result<()> {
    match action {
        ConfigAction::Path => {
            let path = custom_path
                .map(std::path::Path::to_path_buf)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
            if !path.exists() {
                eprintln!("{}", "(file does not exist, defaults are used)".dimmed());
            }
        }
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.redacted().to_toml()?);
        }
        ConfigAction::Dump => {
            print!("{}", Config::template());
        }
    }
    Ok(())
}
