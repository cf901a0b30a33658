//! Lectern - lecture-plan generation from the command line

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use lectern::{
    config::{ConfigManager, LoggingConfig, ServerConfig},
    llm::LlmProviderFactory,
    planning::{validator, LecturePlanPipeline, PlanRequest},
    server::{run_serve, AppState},
    utils::errors::{ConfigError, LecternError},
    Result,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Lectern: structured lecture plans from a topic, an audience and a duration
#[derive(Parser)]
#[command(name = "lectern")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config file's
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a lecture plan
    Generate {
        /// Lecture topic
        #[arg(short, long)]
        topic: String,
        /// Audience level, e.g. Undergraduate or Graduate
        #[arg(short, long)]
        audience: Option<String>,
        /// Lecture length in hours
        #[arg(short, long)]
        duration: i64,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        /// Write the plan here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a stored plan document against the lecture-plan schema
    Validate {
        /// JSON or YAML plan document
        file: PathBuf,
        /// Require duration_minutes to equal this many hours
        #[arg(long)]
        hours: Option<i64>,
    },
    /// Serve the generation endpoint over HTTP
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Offline commands must work without a readable config file
    let manager = match &cli.command {
        Commands::Validate { .. } | Commands::Config { action: ConfigAction::Init { .. } } => None,
        _ => Some(ConfigManager::load(cli.config.clone())?),
    };

    let log_level = cli.log_level.clone().unwrap_or_else(|| {
        manager
            .as_ref()
            .map(|m| m.config().logging.level.clone())
            .unwrap_or_else(|| LoggingConfig::default().level)
    });
    init_logging(&log_level)?;

    info!("Starting Lectern v{}", lectern::VERSION);

    match cli.command {
        Commands::Validate { file, hours } => validate_file(&file, hours),
        Commands::Config {
            action: ConfigAction::Init { force },
        } => init_config(cli.config, force),
        Commands::Generate {
            topic,
            audience,
            duration,
            format,
            output,
        } => {
            let manager = loaded(manager)?;
            generate(&manager, topic, audience, duration, format, output).await
        }
        Commands::Serve { bind, port } => serve(&loaded(manager)?, bind, port).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => show_config(&loaded(manager)?),
    }
}

fn loaded(manager: Option<ConfigManager>) -> Result<ConfigManager> {
    manager.ok_or_else(|| LecternError::not_found("configuration"))
}

/// Initialize logging
fn init_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level)
        .map_err(|e| LecternError::unknown(format!("Invalid log level: {}", e)))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LecternError::unknown(format!("Failed to set logger: {}", e)))?;

    Ok(())
}

fn build_pipeline(manager: &ConfigManager) -> Result<LecturePlanPipeline> {
    let config = manager.config();
    config.validate()?;
    let provider = LlmProviderFactory::create_provider(&config.provider_settings())?;
    info!(
        provider = provider.provider_name(),
        model = provider.model(),
        "language model provider ready"
    );
    Ok(LecturePlanPipeline::new(provider, config.pipeline_config()))
}

async fn generate(
    manager: &ConfigManager,
    topic: String,
    audience: Option<String>,
    duration: i64,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let audience = audience.or_else(|| Some(manager.config().pipeline.default_audience.clone()));
    let request = PlanRequest::new(topic, audience, duration)?;
    let pipeline = build_pipeline(manager)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling generation");
            trigger.cancel();
        }
    });

    let outcome = match pipeline.run(request, cancel).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            for entry in e.error_log() {
                eprintln!("  {} {}", "-".dimmed(), entry);
            }
            return Err(e.into());
        }
    };

    for entry in &outcome.error_log {
        eprintln!("{} {}", "note:".yellow(), entry);
    }

    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&outcome.plan)?,
        OutputFormat::Yaml => serde_yaml::to_string(&outcome.plan)?,
    };

    match output {
        Some(path) => {
            fs::write(&path, rendered).map_err(|e| LecternError::file_system(&path, e))?;
            eprintln!(
                "{} Plan for '{}' written to {} ({} agenda items, {} attempt(s))",
                "✓".green(),
                outcome.plan.title,
                path.display(),
                outcome.plan.agenda.len(),
                outcome.detail_attempts
            );
        }
        None => println!("{}", rendered),
    }

    Ok(())
}

fn validate_file(path: &Path, hours: Option<i64>) -> Result<()> {
    let content = fs::read_to_string(path).map_err(|e| LecternError::file_system(path, e))?;

    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    let document: serde_json::Value = if is_yaml {
        serde_yaml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };

    let expected_minutes = match hours {
        Some(h) => Some(h.checked_mul(60).ok_or_else(|| {
            LecternError::validation("hours", format!("{} hours is out of range", h))
        })?),
        None => None,
    };

    match validator::validate_document(&document, expected_minutes) {
        Ok(plan) => {
            println!(
                "{} {} is a valid lecture plan: '{}', {} agenda items, {} minutes",
                "✓".green(),
                path.display(),
                plan.title,
                plan.agenda.len(),
                plan.duration_minutes
            );
            Ok(())
        }
        Err(reason) => {
            println!("{} {} is not a valid lecture plan", "✗".red(), path.display());
            Err(LecternError::validation("plan", reason))
        }
    }
}

async fn serve(manager: &ConfigManager, bind: Option<String>, port: Option<u16>) -> Result<()> {
    let config = manager.config();
    let pipeline = build_pipeline(manager)?;
    let state = AppState::new(Arc::new(pipeline), config.pipeline.default_audience.clone());

    let server = ServerConfig {
        bind: bind.unwrap_or_else(|| config.server.bind.clone()),
        port: port.unwrap_or(config.server.port),
    };
    run_serve(state, &server).await
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let written = ConfigManager::init(path, force)?;
    println!("{} Configuration written to {}", "✓".green(), written.display());
    println!();
    println!("Next steps:");
    println!("   1. Pick a provider: set active_provider to \"ollama\" or \"openrouter\"");
    println!("   2. For OpenRouter, export OPENROUTER_API_KEY");
    println!("   3. Generate: lectern generate --topic \"Graph Theory\" --duration 2");
    Ok(())
}

fn show_config(manager: &ConfigManager) -> Result<()> {
    let mut config = manager.config().clone();
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("********".to_string());
        }
    }

    let text = toml::to_string_pretty(&config).map_err(|e| ConfigError::SerializeError { source: e })?;
    println!("# {}", manager.config_path().display());
    println!("{}", text);

    let status = match manager.config().validate() {
        Ok(()) => "valid".green(),
        Err(e) => format!("invalid: {}", e).as_str().red(),
    };
    eprintln!("Configuration is {}", status);
    Ok(())
}
