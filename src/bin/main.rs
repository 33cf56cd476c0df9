//! Inference gateway CLI - run one call against a local inference worker
//!
//! Usage:
//!   inference-gateway [--config <file>] call --kind <kind> --prompt <text> [--context <json>]
//!   inference-gateway summarize <text> [--max-words <n>]
//!   inference-gateway translate <text> --to <lang> [--from <lang>]
//!   inference-gateway sentiment <text>
//!   inference-gateway keywords <text> [--limit <n>]
//!   inference-gateway check-config
//!
//! Examples:
//!   inference-gateway call --kind generate --prompt "Write a haiku about rust"
//!   inference-gateway summarize "$(cat notes.txt)" --max-words 50
//!   inference-gateway --model ./models/tiny.gguf sentiment "What a great day"

use clap::{Parser, Subcommand};
use inference_gateway::config::{parse_duration, Settings, SettingsError};
use inference_gateway::gateway::{CallSettings, Gateway};
use inference_gateway::worker::CallKind;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "inference-gateway")]
#[command(about = "Run calls against an out-of-process inference worker")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $INFERENCE_GATEWAY_CONFIG, ./gateway.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model file, overriding the configured one
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,

    /// Per-call deadline, e.g. "30s" or "2m"
    #[arg(short, long, global = true)]
    timeout: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a raw call and print the worker's payload
    Call {
        /// Call kind (search, recommend, generate, analyze, translate, summarize)
        #[arg(short, long, value_parser = parse_kind)]
        kind: CallKind,

        #[arg(short, long)]
        prompt: String,

        /// Context object as JSON
        #[arg(long)]
        context: Option<String>,
    },

    /// Summarize a text
    Summarize {
        text: String,

        #[arg(long, default_value_t = 100)]
        max_words: usize,
    },

    /// Translate a text
    Translate {
        text: String,

        /// Target language
        #[arg(long)]
        to: String,

        /// Source language (detected if omitted)
        #[arg(long)]
        from: Option<String>,
    },

    /// Analyze the sentiment of a text
    Sentiment { text: String },

    /// Extract keywords from a text
    Keywords {
        text: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Validate the configuration without starting a worker
    CheckConfig,
}

fn parse_kind(s: &str) -> Result<CallKind, String> {
    CallKind::parse(s).ok_or_else(|| {
        let known: Vec<&str> = CallKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown kind '{}' (expected one of: {})", s, known.join(", "))
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::CheckConfig => cmd_check_config(&settings),
        command => cmd_run(&settings, cli.timeout.as_deref(), command).await,
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, SettingsError> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    if let Some(model) = &cli.model {
        settings.worker.model = model.display().to_string();
    }
    Ok(settings)
}

fn cmd_check_config(settings: &Settings) -> ExitCode {
    match settings.gateway_config() {
        Ok(config) => {
            println!("Configuration is valid");
            println!("  worker:          {}", config.command.display());
            println!("  model:           {}", config.model_path.display());
            println!("  startup timeout: {:?}", config.startup_timeout);
            println!("  max pending:     {}", config.max_pending);
            if let Err(e) = config.launch_spec().validate() {
                println!("  warning:         {}", e);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn cmd_run(settings: &Settings, timeout: Option<&str>, command: Commands) -> ExitCode {
    let config = match settings.gateway_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut call_settings = CallSettings::new();
    if let Some(timeout) = timeout {
        match parse_duration(timeout) {
            Ok(deadline) => call_settings = call_settings.with_deadline(deadline),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let gateway = Gateway::new(config);
    if let Err(e) = gateway.initialize().await {
        eprintln!("Error starting worker: {}", e);
        gateway.shutdown().await;
        return ExitCode::FAILURE;
    }

    let result = run_command(&gateway, &call_settings, command).await;
    gateway.shutdown().await;

    match result {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_command(
    gateway: &Gateway,
    settings: &CallSettings,
    command: Commands,
) -> Result<Value, Box<dyn std::error::Error>> {
    let capabilities = match settings.deadline {
        Some(deadline) => gateway.capabilities().with_deadline(deadline),
        None => gateway.capabilities(),
    };

    let output = match command {
        Commands::Call {
            kind,
            prompt,
            context,
        } => {
            let context = context
                .map(|raw| serde_json::from_str::<Value>(&raw))
                .transpose()?;
            gateway
                .call(kind, prompt, context, settings)
                .await?
                .unwrap_or(Value::Null)
        }
        Commands::Summarize { text, max_words } => {
            to_json(capabilities.summarize_text(&text, max_words).await?)?
        }
        Commands::Translate { text, to, from } => {
            to_json(capabilities.translate_text(&text, &to, from.as_deref()).await?)?
        }
        Commands::Sentiment { text } => to_json(capabilities.analyze_sentiment(&text).await?)?,
        Commands::Keywords { text, limit } => {
            to_json(capabilities.extract_keywords(&text, limit).await?)?
        }
        Commands::CheckConfig => Value::Null,
    };

    Ok(output)
}

fn to_json<T: Serialize>(value: T) -> serde_json::Result<Value> {
    serde_json::to_value(value)
}
