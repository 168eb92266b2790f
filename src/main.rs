//! Convoy - multi-agent coding assistant
//!
//! Main entry point for the CLI application. The hidden `worker` subcommand is
//! what the coordinator launches for each sub-agent.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use convoy::agent::{run_worker, WorkerSpec};
use convoy::llm::ChatClient;
use convoy::swarm::AgentStatus;
use convoy::{Config, Repl};
use tracing_subscriber::EnvFilter;

/// Convoy - multi-agent coding assistant
#[derive(Parser, Debug)]
#[command(name = "convoy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model name sent to the endpoint
    #[arg(long, short = 'm', global = true)]
    model: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Directory shared with sub-agents (agents, message queue, tasks)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// Single prompt mode (non-interactive)
    #[arg(long, short = 'p')]
    prompt: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run as a sub-agent (launched by the coordinator)
    #[command(hide = true)]
    Worker {
        /// Task prompt
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Print the default configuration, or write it with --save
    Config {
        #[arg(long)]
        save: bool,
    },
}

fn init_tracing(debug: bool) {
    let fallback = if debug { "convoy=debug" } else { "info" };
    let filter = EnvFilter::try_from_env("CONVOY_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Build configuration
    let mut config = Config::load();

    // Apply CLI overrides
    if let Some(model) = args.model {
        config.llm.model = model;
    }

    if let Some(base_url) = args.base_url {
        config.llm.base_url = base_url;
    }

    if let Some(state_dir) = args.state_dir {
        config.swarm.state_dir = state_dir;
    }

    if args.debug {
        config.agent.debug = true;
    }

    init_tracing(config.agent.debug);

    match args.command {
        Some(Command::Worker { prompt }) => {
            let spec = WorkerSpec::from_env(
                prompt.join(" "),
                &config.swarm.state_dir,
                config.agent.sub_agent_max_iterations,
            )?;
            let provider = Arc::new(ChatClient::from_config(&config.llm)?);
            let result = run_worker(provider, &spec).await?;
            if result.status == AgentStatus::Error {
                std::process::exit(1);
            }
            return Ok(());
        }
        Some(Command::Config { save }) => {
            if save {
                let path = config.save()?;
                println!("Wrote {}", path.display());
            } else {
                println!("# {}", Config::config_file().display());
                println!("{}", Config::default_config_toml());
            }
            return Ok(());
        }
        None => {}
    }

    // Single prompt mode
    if let Some(prompt) = args.prompt {
        let outcome = convoy::cli::run_once(&config, &prompt).await?;
        if !outcome.is_completed() {
            std::process::exit(1);
        }
        return Ok(());
    }

    // Interactive REPL mode
    let mut repl = Repl::with_config(config)?;
    repl.run().await?;

    Ok(())
}
