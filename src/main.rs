mod cli;
mod console;

use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use opsy_config::{Config, LoggingConfig};
use opsy_core::Agent;
use opsy_tools::{ToolRegistry, ToolRunner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = opsy_config::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    init_logging(cli.verbose, &config.logging)?;

    match &cli.command {
        Some(Commands::ShowConfig) => show_config(config),
        Some(Commands::Tools) => list_tools(&config),
        None => {
            let task = cli.read_task()?;
            run_task(task, Arc::new(config)).await
        }
    }
}

async fn run_task(task: String, config: Arc<Config>) -> anyhow::Result<()> {
    let model = opsy_model::from_config(&config.anthropic).context("configuring model backend")?;
    let (bus, receivers) = opsy_core::channel(config.agent.channel_capacity);
    let agent = Arc::new(Agent::new(Arc::from(model), Arc::new(config.agent.clone()), bus));

    let runner: Arc<dyn ToolRunner> = agent.clone();
    let tools = load_tools(&config, Some(runner))?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling run");
                cancel.cancel();
            }
        });
    }

    let printer = tokio::spawn(console::drain(receivers));
    let report = agent.run(&task, &tools, cancel).await;
    // Closed channels end the printer should no terminal status arrive.
    drop(tools);
    drop(agent);
    let _ = printer.await;

    match report.error {
        None => Ok(()),
        Some(e) => Err(anyhow::Error::new(e).context("run failed")),
    }
}

fn load_tools(config: &Config, runner: Option<Arc<dyn ToolRunner>>) -> anyhow::Result<ToolRegistry> {
    let dir = config.tools.directory_path();
    let tools_config = Arc::new(config.tools.clone());
    if !dir.exists() {
        warn!(dir = %dir.display(), "tool directory does not exist, only the exec tool is available");
        return Ok(ToolRegistry::with_exec(tools_config));
    }
    let tools = ToolRegistry::load(&dir, tools_config, runner)
        .with_context(|| format!("loading tools from {}", dir.display()))?;
    info!(tools = ?tools.names(), "tools ready");
    Ok(tools)
}

fn show_config(mut config: Config) -> anyhow::Result<()> {
    if config.anthropic.api_key.is_some() {
        config.anthropic.api_key = Some("<redacted>".into());
    }
    print!("{}", serde_yaml::to_string(&config).context("serializing configuration")?);
    Ok(())
}

fn list_tools(config: &Config) -> anyhow::Result<()> {
    let tools = load_tools(config, None)?;
    let width = tools.names().iter().map(String::len).max().unwrap_or(4);
    for name in tools.names() {
        let tool = tools.get(&name)?;
        println!("{name:<width$}  {}  {}", tool.display_name(), tool.description());
    }
    Ok(())
}

fn init_logging(verbosity: u8, logging: &LoggingConfig) -> anyhow::Result<()> {
    let level = match verbosity {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, stderr_layer) = match logging.file_path() {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            let layer = fmt::layer().with_target(false).with_ansi(false).with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => (None, Some(fmt::layer().with_target(false).with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(filter)
        .init();
    Ok(())
}
