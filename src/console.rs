//! Line-oriented terminal front end. Free text is a command for the
//! assistant; lines starting with `/` drive the rest of the UI.

use std::process::Command;

use anyhow::Context;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

use crate::assistant::{Notice, UserInput};
use crate::backend::CommandResult;
use crate::history::CommandHistoryItem;
use crate::logger::{SharedLogger, with_logger};
use crate::presentation::{PresentationState, Stage};
use crate::status::BackendStatus;

pub const HELP: &str = "\
Type a command and press enter, or:
  /voice                  speak a command
  /close                  close the result
  /yes, /no               accept or decline opening WhatsApp
  /agent <id> <command>   run a command through a specific agent
  /agents                 list the available agents
  /history                show the recent commands
  /status                 show the backend status
  /quit                   leave";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Input(UserInput),
    Status,
    Help,
    Quit,
}

/// `None` for blank lines.
#[must_use]
pub fn parse_line(line: &str) -> Option<ConsoleCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(ConsoleCommand::Input(UserInput::Submit(line.to_owned())));
    };

    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let command = match name.to_lowercase().as_str() {
        "voice" => ConsoleCommand::Input(UserInput::StartVoice),
        "close" => ConsoleCommand::Input(UserInput::Dismiss),
        "yes" => ConsoleCommand::Input(UserInput::ConfirmHandoff),
        "no" => ConsoleCommand::Input(UserInput::DeclineHandoff),
        "agents" => ConsoleCommand::Input(UserInput::ListAgents),
        "history" => ConsoleCommand::Input(UserInput::ShowHistory),
        "agent" => match args.trim().split_once(char::is_whitespace) {
            Some((agent_id, command)) if !command.trim().is_empty() => {
                ConsoleCommand::Input(UserInput::SelectAgent {
                    agent_id: agent_id.to_owned(),
                    command: command.trim().to_owned(),
                })
            }
            _ => ConsoleCommand::Help,
        },
        "status" => ConsoleCommand::Status,
        "quit" | "exit" => ConsoleCommand::Quit,
        _ => ConsoleCommand::Help,
    };
    Some(command)
}

/// Reads stdin until EOF or `/quit`. Dropping `inputs` on return stops the
/// assistant.
pub async fn read_commands(
    inputs: mpsc::Sender<UserInput>,
    status: watch::Receiver<BackendStatus>,
    logger: SharedLogger,
) -> anyhow::Result<()> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Some(ConsoleCommand::Input(input)) => {
                if inputs.send(input).await.is_err() {
                    break;
                }
            }
            Some(ConsoleCommand::Status) => println!("{}", status.borrow().label()),
            Some(ConsoleCommand::Help) => println!("{HELP}"),
            Some(ConsoleCommand::Quit) => break,
            None => (),
        }
    }

    with_logger(&logger, |l| l.debug("Stopped reading commands"));
    Ok(())
}

/// Prints what changed between two published states.
#[must_use]
pub fn transitions(prev: &PresentationState, next: &PresentationState) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(agent) = next
        .current_agent_id
        .as_ref()
        .filter(|_| next.current_agent_id != prev.current_agent_id)
    {
        lines.push(format!("Agent: {agent}"));
    }
    if next.is_listening && !prev.is_listening {
        lines.push("Listening...".to_owned());
    }
    if next.is_processing && !prev.is_processing {
        lines.push("Processing...".to_owned());
    }
    let result_changed = !prev.show_results || next.last_result != prev.last_result;
    let fresh_result = next
        .last_result
        .as_ref()
        .filter(|_| next.show_results && result_changed);
    if let Some(result) = fresh_result {
        lines.push(banner(result));
    }
    if next.show_whatsapp_popup && !prev.show_whatsapp_popup {
        lines.push("Open WhatsApp with this message? /yes or /no".bold().to_string());
    }
    if next.stage == Stage::Dismissed && prev.stage != Stage::Dismissed {
        lines.push("Closed".dimmed().to_string());
    }

    lines
}

#[must_use]
pub fn banner(result: &CommandResult) -> String {
    let mark = if result.success {
        "✓".green()
    } else {
        "✗".red()
    };
    let mut line = format!(
        "{mark} {} ({} / {})",
        result.message, result.agent_used, result.intent
    );
    if let Some(err) = result.error_message() {
        line.push_str(&format!(" error: {err}"));
    }
    line
}

#[must_use]
pub fn history_lines(items: &[CommandHistoryItem]) -> Vec<String> {
    if items.is_empty() {
        return vec!["No commands yet".to_owned()];
    }
    items
        .iter()
        .map(|item| {
            format!(
                "{} {} -> {}",
                item.timestamp.dimmed(),
                item.command,
                item.result.message
            )
        })
        .collect()
}

pub async fn render_states(mut states: watch::Receiver<PresentationState>) {
    let mut prev = states.borrow_and_update().clone();
    while states.changed().await.is_ok() {
        let next = states.borrow_and_update().clone();
        for line in transitions(&prev, &next) {
            println!("{line}");
        }
        prev = next;
    }
}

pub async fn render_status(mut status: watch::Receiver<BackendStatus>) {
    while status.changed().await.is_ok() {
        let current = *status.borrow_and_update();
        let label = match current {
            BackendStatus::Online => current.label().green(),
            BackendStatus::Offline => current.label().red(),
            BackendStatus::Checking => current.label().normal(),
        };
        println!("{label}");
    }
}

pub async fn render_notices(mut notices: mpsc::UnboundedReceiver<Notice>, logger: SharedLogger) {
    while let Some(notice) = notices.recv().await {
        match notice {
            Notice::Feedback(message) => println!("{}", message.yellow()),
            Notice::Transcript(text) => println!("You said: {text}"),
            Notice::Agents(agents) => println!("Agents: {}", agents.join(", ")),
            Notice::History(items) => {
                for line in history_lines(&items) {
                    println!("{line}");
                }
            }
            Notice::OpenLink(link) => {
                println!("Opening {link}");
                if let Err(err) = open_link(&link).await {
                    with_logger(&logger, |l| l.error(&format!("{err:#}")));
                }
            }
        }
    }
}

/// Hands the link to the desktop's default handler and waits for the
/// handler to exit.
pub async fn open_link(link: &str) -> anyhow::Result<()> {
    let mut command = opener();
    command.arg(link);
    run_opener(command)
        .await
        .with_context(|| format!("Failed to open {link}"))
}

fn opener() -> Command {
    #[cfg(target_os = "macos")]
    let command = Command::new("open");
    #[cfg(target_os = "windows")]
    let command = {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    };
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let command = Command::new("xdg-open");
    command
}

/// Runs on the blocking pool so the child is always waited on.
async fn run_opener(mut command: Command) -> anyhow::Result<()> {
    let status = tokio::task::spawn_blocking(move || command.status()).await??;
    anyhow::ensure!(status.success(), "opener exited with {status}");
    Ok(())
}
