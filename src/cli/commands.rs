//! CLI commands
//!
//! Slash commands that can be executed in the REPL.

use crate::agent::Session;
use crate::swarm::{AgentManager, Mailbox, COORDINATOR_ID};

/// Result of parsing a command
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Continue processing as normal input
    Continue(String),
    /// Command was handled, show output
    Handled(String),
    /// Exit the REPL
    Exit,
    /// History was cleared
    Clear,
}

/// Parse and handle special commands
pub fn handle_command(
    input: &str,
    session: &mut Session,
    manager: &AgentManager,
    mailbox: &Mailbox,
) -> CommandResult {
    let input = input.trim();
    let Some(command) = input.strip_prefix('/') else {
        return match input {
            "exit" | "quit" => CommandResult::Exit,
            _ => CommandResult::Continue(input.to_string()),
        };
    };
    let cmd = command.split_whitespace().next().unwrap_or("").to_lowercase();

    match cmd.as_str() {
        "exit" | "quit" | "q" => CommandResult::Exit,

        "clear" | "reset" => {
            session.reset();
            CommandResult::Clear
        }

        "help" | "?" => CommandResult::Handled(help_text()),

        "agents" => CommandResult::Handled(agents_table(manager)),

        "inbox" => {
            let messages = mailbox.read_since(COORDINATOR_ID, None);
            if messages.is_empty() {
                return CommandResult::Handled("No messages.".to_string());
            }
            let lines: Vec<String> = messages
                .iter()
                .map(|m| format!("[{}] {} -> {}: {}", m.id, m.from, m.to, m.body))
                .collect();
            CommandResult::Handled(lines.join("\n"))
        }

        _ => CommandResult::Handled(format!(
            "Unknown command: /{}. Type /help for available commands.",
            cmd
        )),
    }
}

/// Status table of every spawned agent
fn agents_table(manager: &AgentManager) -> String {
    let records = manager.list_all();
    if records.is_empty() {
        return "No agents spawned.".to_string();
    }

    let mut lines = vec![format!("{:<6} {:<10} {}", "ID", "STATUS", "PROMPT")];
    lines.extend(records.iter().map(|r| {
        format!(
            "{:<6} {:<10} {}",
            r.id,
            r.status.to_string(),
            crate::swarm::store::preview(&r.prompt, 60)
        )
    }));
    lines.join("\n")
}

/// Generate help text
fn help_text() -> String {
    r#"Convoy Commands:
─────────────────────────────────────────────
  /help, /?        Show this help message
  /agents          Show spawned sub-agents and their status
  /inbox           Show messages addressed to the coordinator
  /clear           Reset history to the system prompt
  /exit, /quit     Exit Convoy

Keyboard Shortcuts:
  Ctrl+D           Exit Convoy

Tips:
  - Sub-agent messages and status changes arrive as system notifications
  - Anything else you type is sent to the model
─────────────────────────────────────────────"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Message, Result, ToolDefinition};
    use crate::llm::{DeltaCallback, LlmProvider, LlmResponse};
    use crate::swarm::{AgentRecord, WorkerCommand};
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Silent;

    #[async_trait]
    impl LlmProvider for Silent {
        async fn chat_stream(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _on_delta: DeltaCallback<'_>,
        ) -> Result<LlmResponse> {
            Ok(LlmResponse::text("silent", ""))
        }

        fn model(&self) -> &str {
            "silent"
        }

        fn max_tokens(&self) -> u32 {
            1
        }

        fn name(&self) -> &str {
            "silent"
        }
    }

    fn fixtures(dir: &std::path::Path) -> (Session, AgentManager, Mailbox) {
        let session = Session::new(Arc::new(Silent), Arc::new(ToolRegistry::new()), "sys", 3);
        let manager = AgentManager::new(dir, WorkerCommand::from_argv(&["true".to_string()]).unwrap());
        (session, manager, Mailbox::new(dir))
    }

    #[test]
    fn test_plain_input_continues() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, manager, mailbox) = fixtures(dir.path());
        assert_eq!(
            handle_command("  list the files ", &mut session, &manager, &mailbox),
            CommandResult::Continue("list the files".into())
        );
        assert_eq!(
            handle_command("/exit", &mut session, &manager, &mailbox),
            CommandResult::Exit
        );
    }

    #[tokio::test]
    async fn test_clear_resets_history() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, manager, mailbox) = fixtures(dir.path());
        session.run("hello", &crate::agent::NullSink).await;
        assert_eq!(session.conversation().len(), 2);

        assert_eq!(
            handle_command("/clear", &mut session, &manager, &mailbox),
            CommandResult::Clear
        );
        assert!(session.conversation().is_empty());
    }

    #[test]
    fn test_agents_and_inbox() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, manager, mailbox) = fixtures(dir.path());

        let id = manager.store().allocate().unwrap();
        manager
            .store()
            .write_record(&AgentRecord::running(&id, "index the repo", None))
            .unwrap();
        mailbox.send("a001", COORDINATOR_ID, "halfway there").unwrap();
        mailbox.send("a001", "a002", "not for main").unwrap();

        let CommandResult::Handled(table) =
            handle_command("/agents", &mut session, &manager, &mailbox)
        else {
            panic!("expected output");
        };
        assert!(table.contains("a001"));
        assert!(table.contains("running"));

        let CommandResult::Handled(inbox) =
            handle_command("/inbox", &mut session, &manager, &mailbox)
        else {
            panic!("expected output");
        };
        assert!(inbox.contains("halfway there"));
        assert!(!inbox.contains("not for main"));
    }
}
