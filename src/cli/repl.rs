//! Interactive REPL for Convoy
//!
//! The coordinator's main loop. User input races the heartbeat: whichever comes
//! first becomes the next turn of the conversation.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::agent::prompts::system_prompt;
use crate::agent::{AgentEvent, EventSink, RunOutcome, Session};
use crate::cli::commands::{handle_command, CommandResult};
use crate::core::{Config, Result};
use crate::llm::{ChatClient, LlmProvider};
use crate::swarm::heartbeat::InputFuture;
use crate::swarm::{
    ActivityFeed, AgentIdentity, AgentManager, HeartbeatMonitor, HeartbeatRace, InputSource,
    Mailbox, MqMessage, StatusChange, Turn, COORDINATOR_ID,
};
use crate::tools::{ToolContext, ToolRegistry};

const PROMPT: &str = "You: ";

/// Lines from stdin, read on a dedicated thread
pub struct StdinInput {
    lines: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl StdinInput {
    /// Start the reader thread
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "stopped reading stdin");
                        break;
                    }
                }
            }
        });
        Self {
            lines: Arc::new(Mutex::new(rx)),
        }
    }
}

impl InputSource for StdinInput {
    fn next_input(&mut self) -> InputFuture {
        print_prompt();
        let lines = self.lines.clone();
        Box::pin(async move { lines.lock().await.recv().await })
    }
}

fn print_prompt() {
    print!("{}", PROMPT);
    let _ = io::stdout().flush();
}

/// Prints loop events to the terminal
pub struct TerminalSink {
    debug: bool,
}

impl TerminalSink {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl EventSink for TerminalSink {
    fn emit(&self, event: AgentEvent) {
        match event {
            AgentEvent::IterationStart { iteration } => {
                if self.debug {
                    eprintln!("\n--- iteration {} ---", iteration);
                }
            }
            AgentEvent::Content { content } => {
                print!("{}", content);
                let _ = io::stdout().flush();
            }
            AgentEvent::Reasoning { content } => {
                eprint!("\x1b[2m{}\x1b[0m", content);
            }
            AgentEvent::ToolCallDetected { .. } => {}
            AgentEvent::ToolStart { name, args } => {
                eprintln!("\n[tool] {} {}", name, args);
            }
            AgentEvent::ToolResult { name, result } => {
                let shown: String = result.chars().take(300).collect();
                let more = if shown.len() < result.len() { "..." } else { "" };
                eprintln!("[ok]   {} {}{}", name, shown, more);
            }
            AgentEvent::ToolError { name, error } => {
                eprintln!("[err]  {} {}", name, error);
            }
            AgentEvent::Done { .. } => println!(),
            AgentEvent::Error { content } => eprintln!("\nError: {}", content),
            AgentEvent::ContextUpdate {
                model,
                tokens_used,
                max_tokens,
            } => {
                if self.debug {
                    eprintln!("[context] {} {}/{} tokens", model, tokens_used, max_tokens);
                }
            }
        }
    }
}

/// Prints swarm activity seen by the heartbeat
pub struct TerminalFeed;

impl ActivityFeed for TerminalFeed {
    fn message(&self, message: &MqMessage) {
        eprintln!("\n[mq] {} -> {}: {}", message.from, message.to, message.body);
    }

    fn status(&self, change: &StatusChange) {
        eprintln!("\n[agents] {}", change);
    }
}

/// Coordinator session over the shared state directory
fn coordinator_session(config: &Config, max_iterations: usize) -> Result<(Session, Arc<AgentManager>)> {
    let provider: Arc<dyn LlmProvider> = Arc::new(ChatClient::from_config(&config.llm)?);
    let manager = Arc::new(AgentManager::from_config(config)?);
    let ctx = ToolContext::new(AgentIdentity::coordinator(), &config.swarm.state_dir);
    let tools = Arc::new(ToolRegistry::for_coordinator(&ctx, manager.clone()));
    let prompt = config
        .agent
        .system_prompt
        .clone()
        .unwrap_or_else(|| system_prompt(&config.swarm.state_dir));

    Ok((Session::new(provider, tools, prompt, max_iterations), manager))
}

/// Run one prompt non-interactively with the single-shot iteration ceiling
pub async fn run_once(config: &Config, prompt: &str) -> Result<RunOutcome> {
    let (mut session, _manager) =
        coordinator_session(config, config.agent.single_shot_max_iterations)?;
    let sink = TerminalSink::new(config.agent.debug);
    Ok(session.run(prompt, &sink).await)
}

/// Interactive REPL (Read-Eval-Print Loop)
pub struct Repl {
    config: Config,
    session: Session,
    manager: Arc<AgentManager>,
    mailbox: Mailbox,
}

impl Repl {
    /// Create a REPL with custom configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let (session, manager) = coordinator_session(&config, config.agent.max_iterations)?;
        let mailbox = Mailbox::new(&config.swarm.state_dir);
        Ok(Self {
            config,
            session,
            manager,
            mailbox,
        })
    }

    /// Run the REPL until input closes or the user exits
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();

        let mut monitor = HeartbeatMonitor::new(
            COORDINATOR_ID,
            self.mailbox.clone(),
            self.manager.store().clone(),
        );
        monitor.prime();
        let mut race = HeartbeatRace::new(
            StdinInput::spawn(),
            monitor,
            self.config.swarm.heartbeat_interval(),
        );
        let sink = TerminalSink::new(self.config.agent.debug);
        let feed = TerminalFeed;

        loop {
            match race.next_turn(&feed).await {
                Turn::Closed => {
                    println!("\nGoodbye!");
                    break;
                }
                Turn::Notification(text) => {
                    println!("\n{}\n", text);
                    self.session.run(&text, &sink).await;
                    print_prompt();
                }
                Turn::User(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match handle_command(&line, &mut self.session, &self.manager, &self.mailbox) {
                        CommandResult::Exit => {
                            println!("\nGoodbye!");
                            break;
                        }
                        CommandResult::Clear => println!("Conversation cleared.\n"),
                        CommandResult::Handled(output) => println!("{}\n", output),
                        CommandResult::Continue(input) => {
                            println!();
                            self.session.run(&input, &sink).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Print the startup banner
    fn print_banner(&self) {
        println!("Convoy - multi-agent coding assistant");
        println!("Endpoint:  {}", self.config.llm.base_url);
        println!("Model:     {}", self.config.llm.model);
        println!("State dir: {}", self.config.swarm.state_dir.display());
        println!("Tools:     {}", self.session.tools().names().join(", "));
        println!();
        println!("Commands: /help, /agents, /inbox, /clear, /exit");
        println!("─────────────────────────────────────────────");
    }
}
