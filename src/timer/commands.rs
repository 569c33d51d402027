use std::str::FromStr;

use crate::{
    db::{models::category::DEFAULT_CATEGORY_COLOR, CategoryInput, LogEntry},
    timer::{format_mmss, LogOutcome, TimerController, TimerStatus},
    AppState,
};

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Pause,
    Resume,
    Toggle,
    Message(String),
    Log(String),
    Status,
    Logs(Option<String>),
    Tags,
    Categories,
    AddCategory { name: String, color: Option<String> },
    DeleteLog(i64),
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word {
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "pause" => Ok(Command::Pause),
            "resume" => Ok(Command::Resume),
            "toggle" => Ok(Command::Toggle),
            "msg" => Ok(Command::Message(rest.to_string())),
            "log" if rest.is_empty() => Err("Usage: log <text>".to_string()),
            "log" => Ok(Command::Log(rest.to_string())),
            "status" => Ok(Command::Status),
            "logs" if rest.is_empty() => Ok(Command::Logs(None)),
            "logs" => Ok(Command::Logs(Some(rest.to_string()))),
            "tags" => Ok(Command::Tags),
            "categories" => Ok(Command::Categories),
            "category" => parse_category(rest),
            "delete-log" => rest
                .parse()
                .map(Command::DeleteLog)
                .map_err(|_| format!("Invalid log id: {rest}")),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            _ => Err(format!("Unknown command: {line}")),
        }
    }
}

fn parse_category(rest: &str) -> Result<Command, String> {
    let mut words = rest.split_whitespace();
    match (words.next(), words.next(), words.next(), words.next()) {
        (Some("add"), Some(name), color, None) => Ok(Command::AddCategory {
            name: name.to_string(),
            color: color.map(str::to_string),
        }),
        _ => Err("Usage: category add <name> [#RRGGBB]".to_string()),
    }
}

pub const HELP: &str = "\
commands:
  start | stop | pause | resume | toggle
  msg <text>              set the message logged when this study ends
  log <text>              log now (queued as the message while running)
  status
  logs [#tag|query]
  tags | categories
  category add <name> [#RRGGBB]
  delete-log <id>
  quit";

pub enum Reply {
    Text(String),
    Quit,
}

fn controller_from_state(state: &AppState) -> TimerController {
    state.timer.clone()
}

pub async fn execute(state: &AppState, command: Command) -> Result<Reply, String> {
    let controller = controller_from_state(state);

    let text = match command {
        Command::Start => {
            let session = controller
                .start_session()
                .await
                .map_err(|e| e.to_string())?;
            format!(
                "{} started ({})",
                session.phase.as_str(),
                format_mmss(session.total_secs)
            )
        }
        Command::Stop => match controller.stop_session().await {
            LogOutcome::Saved(id) => format!("Stopped; saved log #{id}"),
            LogOutcome::Failed(err) => format!("Stopped; log not saved: {err}"),
            LogOutcome::NotRequired => "Stopped".to_string(),
        },
        Command::Pause => pause_reply(controller.pause().await, "Paused"),
        Command::Resume => pause_reply(controller.resume().await, "Resumed"),
        Command::Toggle => match controller.toggle_pause().await {
            Some(true) => "Paused".to_string(),
            Some(false) => "Resumed".to_string(),
            None => "No active session".to_string(),
        },
        Command::Message(text) => {
            controller.set_log_message(text.clone()).await;
            if text.is_empty() {
                "Message cleared".to_string()
            } else {
                format!("Message set: {text}")
            }
        }
        Command::Log(text) => match controller
            .submit_message(&text)
            .await
            .map_err(|e| e.to_string())?
        {
            Some(entry) => format!("Saved log #{}", entry.id),
            None => "Message queued for this study session".to_string(),
        },
        Command::Status => {
            let snapshot = controller.snapshot().await;
            let session = &snapshot.session;
            let mut text = match session.status {
                TimerStatus::Running | TimerStatus::Paused => format!(
                    "{} {} [{:?}] pomodoro #{}",
                    session.phase.as_str(),
                    format_mmss(session.remaining_secs),
                    session.status,
                    snapshot.cycle_counter
                ),
                TimerStatus::Idle | TimerStatus::Finished => {
                    format!("{:?}, cycle {:?}", session.status, snapshot.cycle)
                }
            };
            if !snapshot.pending_message.is_empty() {
                text.push_str(&format!("\nmessage: {}", snapshot.pending_message));
            }
            text
        }
        Command::Logs(filter) => {
            let logs = match filter.as_deref() {
                None => state.db.get_logs().await,
                Some(tag) if tag.starts_with('#') => state.db.get_logs_by_tag(tag).await,
                Some(query) => state.db.search_logs(query).await,
            }
            .map_err(|e| e.to_string())?;
            render_logs(&logs)
        }
        Command::Tags => {
            let tags = state.db.get_tags().await.map_err(|e| e.to_string())?;
            if tags.is_empty() {
                "No tags".to_string()
            } else {
                tags.iter()
                    .map(|tag| format!("#{} (category {})", tag.name, tag.category_id))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::Categories => {
            let categories = state
                .db
                .get_categories()
                .await
                .map_err(|e| e.to_string())?;
            categories
                .iter()
                .map(|category| format!("{:>3} {} {}", category.id, category.color, category.name))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::AddCategory { name, color } => {
            let input = CategoryInput {
                name,
                description: String::new(),
                color: color.unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
            };
            let category = state
                .db
                .create_category(input)
                .await
                .map_err(|e| e.to_string())?;
            format!("Created category {} ({})", category.name, category.id)
        }
        Command::DeleteLog(id) => {
            state
                .db
                .soft_delete_log(id)
                .await
                .map_err(|e| e.to_string())?;
            format!("Deleted log #{id}")
        }
        Command::Help => HELP.to_string(),
        Command::Quit => return Ok(Reply::Quit),
    };

    Ok(Reply::Text(text))
}

fn pause_reply(changed: bool, done: &str) -> String {
    if changed {
        done.to_string()
    } else {
        "Nothing to do".to_string()
    }
}

fn render_logs(logs: &[LogEntry]) -> String {
    if logs.is_empty() {
        return "No logs".to_string();
    }
    logs.iter()
        .map(|log| {
            format!(
                "#{} {} ({}m) {}",
                log.id,
                log.start_date.format("%Y-%m-%d %H:%M"),
                log.duration_secs() / 60,
                log.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
