use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use wolfbot::chat::{spawn_event_logger, Bot, SlackConfig, SlackSocketMode};
use wolfbot::config::{load_env_file, ConfigError, Credentials, Settings};
use wolfbot::knowledge::{KnowledgeQueryEngine, ReportOptions, UnitSystem, WolframClient, WolframConfig};
use wolfbot::nlu::{EntityExtractor, WitClient, WitConfig};
use wolfbot::{register_commands, QueryPipeline};

#[derive(Parser, Debug)]
#[command(name = "wolfbot-gateway")]
#[command(version)]
#[command(about = "Slack bot answering questions through Wit.ai and Wolfram|Alpha")]
struct Cli {
    /// key=value file pre-loaded into the environment (existing variables win)
    #[arg(long, env = "WOLFBOT_ENV_FILE", default_value = ".env")]
    env_file: PathBuf,

    /// Settings file (TOML format)
    #[arg(long, env = "WOLFBOT_CONFIG")]
    config: Option<PathBuf>,

    /// NLU result path holding the refined search query
    #[arg(long)]
    entity_path: Option<String>,

    /// Unit system for answers (metric or imperial)
    #[arg(long)]
    units: Option<UnitSystem>,

    #[arg(long)]
    spoken_max_chars: Option<usize>,

    /// Report section rendered by the full query command
    #[arg(long)]
    primary_section: Option<usize>,

    /// Command event queue capacity (oldest events dropped when full)
    #[arg(long)]
    event_buffer: Option<usize>,

    #[arg(long)]
    http_timeout_secs: Option<u64>,
}

impl Cli {
    /// Priority: CLI > settings file > defaults
    fn settings(&self) -> Result<Settings, ConfigError> {
        let mut settings = match &self.config {
            Some(path) => {
                info!("[Gateway] Using settings from {}", path.display());
                Settings::load(path)?
            }
            None => Settings::default(),
        };

        if let Some(entity_path) = &self.entity_path {
            settings.entity_path = entity_path.clone();
        }
        if let Some(units) = self.units {
            settings.units = units;
        }
        if let Some(max_chars) = self.spoken_max_chars {
            settings.spoken_max_chars = max_chars;
        }
        if let Some(index) = self.primary_section {
            settings.primary_section = index;
        }
        if let Some(buffer) = self.event_buffer {
            settings.event_buffer = buffer;
        }
        if let Some(timeout) = self.http_timeout_secs {
            settings.http_timeout_secs = timeout;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wolfbot=info,wolfbot_gateway=info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("[Gateway] Fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    load_env_file(&cli.env_file)?;
    let credentials = Credentials::from_env()?;
    let settings = cli.settings()?;
    let timeout = Duration::from_secs(settings.http_timeout_secs);

    let nlu = Arc::new(WitClient::new(WitConfig {
        access_token: credentials.wit_ai_token.clone(),
        api_version: settings.wit_api_version.clone(),
        base_url: None,
        timeout,
    })?);
    let knowledge = Arc::new(WolframClient::new(WolframConfig {
        app_id: credentials.wolfram_app_id.clone(),
        base_url: None,
        timeout,
    })?);

    let extractor = EntityExtractor::new(nlu, settings.entity_path.clone());
    let engine = KnowledgeQueryEngine::new(knowledge)
        .with_units(settings.units)
        .with_spoken_max_chars(settings.spoken_max_chars)
        .with_report_options(ReportOptions {
            units: Some(settings.units),
        })
        .with_primary_section(settings.primary_section);
    let pipeline = Arc::new(QueryPipeline::new(extractor, engine));

    let mut bot = Bot::new(settings.event_buffer);
    register_commands(&mut bot, pipeline).context("registering commands")?;

    let cancel = CancellationToken::new();
    let logger = spawn_event_logger(bot.command_events(), cancel.clone());

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("[Gateway] Interrupt received, shutting down");
            interrupt.cancel();
        }
    });

    let source = Arc::new(SlackSocketMode::new(SlackConfig {
        bot_token: credentials.slack_bot_token.clone(),
        app_token: credentials.slack_app_token.clone(),
        api_base: None,
        timeout,
    })?);

    info!(
        "[Gateway] Starting ({} units, section {}, event buffer {})",
        settings.units, settings.primary_section, settings.event_buffer
    );
    let result = bot.listen(source, cancel.clone()).await;

    cancel.cancel();
    if let Ok(stats) = logger.await {
        info!(
            "[Gateway] Event log: {} logged, {} dropped",
            stats.logged, stats.dropped
        );
    }

    result.context("chat transport stopped")?;
    Ok(())
}
