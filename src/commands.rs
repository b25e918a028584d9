//! Line commands of the terminal client and the handlers behind them.

use crate::auth::Identity;
use crate::constants::{Category, Language, Scenario};
use crate::models::{ChatEvent, ChatRequest, HistoryEntry, Message, Report, Role};
use crate::routes::Route;
use crate::state::AppState;
use anyhow::anyhow;
use futures::StreamExt;
use std::io::Write;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  /start <language> <scenario>   begin a new practice conversation
  /report                        generate feedback for the current conversation
  /history                       list past conversations
  /show <id>                     print a past conversation
  /delete <id>                   delete a past conversation
  /clear                         delete all past conversations
  /register <email> <password>   create an account
  /login <email> <password>      sign in
  /logout                        sign out
  /migrate                       upload conversations kept on this device
  /health                        check the server
  /scenarios                     list languages and scenarios
  /help                          show this text
  /quit                          exit
Anything else is sent to your conversation partner. Ctrl-C stops a reply.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: /{0} (try /help)")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("{0}")]
    InvalidArgument(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { language: Language, scenario: Scenario },
    Report,
    History,
    Show(String),
    Delete(String),
    Clear,
    Register { email: String, password: String },
    Login { email: String, password: String },
    Logout,
    Migrate,
    Health,
    Scenarios,
    Help,
    Quit,
    Say(String),
}

impl Command {
    /// Parses one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Command::Say(line.to_string())));
        };

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        let command = match (name, args.as_slice()) {
            ("start", [language, scenario]) => Command::Start {
                language: language.parse().map_err(CommandError::InvalidArgument)?,
                scenario: scenario.parse().map_err(CommandError::InvalidArgument)?,
            },
            ("start", _) => return Err(CommandError::Usage("/start <language> <scenario>")),
            ("report", []) => Command::Report,
            ("history", []) => Command::History,
            ("show", [id]) => Command::Show(id.to_string()),
            ("show", _) => return Err(CommandError::Usage("/show <id>")),
            ("delete", [id]) => Command::Delete(id.to_string()),
            ("delete", _) => return Err(CommandError::Usage("/delete <id>")),
            ("clear", []) => Command::Clear,
            ("register", [email, password]) => Command::Register {
                email: email.to_string(),
                password: password.to_string(),
            },
            ("register", _) => return Err(CommandError::Usage("/register <email> <password>")),
            ("login", [email, password]) => Command::Login {
                email: email.to_string(),
                password: password.to_string(),
            },
            ("login", _) => return Err(CommandError::Usage("/login <email> <password>")),
            ("logout", []) => Command::Logout,
            ("migrate", []) => Command::Migrate,
            ("health", []) => Command::Health,
            ("scenarios", []) => Command::Scenarios,
            ("help", []) => Command::Help,
            ("quit" | "exit", []) => Command::Quit,
            (
                "report" | "history" | "clear" | "logout" | "migrate" | "health" | "scenarios"
                | "help" | "quit" | "exit",
                _,
            ) => return Err(CommandError::InvalidArgument(format!("/{} takes no arguments", name))),
            (other, _) => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Quit,
}

/// Reads commands from stdin until `/quit`, end of input or Ctrl-C at the prompt.
pub async fn repl(state: &AppState) -> anyhow::Result<()> {
    let mut out = std::io::stdout();
    writeln!(out, "LinguaEcho. Type /help for commands.")?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        write!(out, "{}> ", prompt(state).await)?;
        out.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            writeln!(out)?;
            break;
        };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                writeln!(out, "{}", e)?;
                continue;
            }
        };
        match execute(state, command, &mut out).await {
            Ok(Outcome::Quit) => break,
            Ok(Outcome::Continue) => {}
            Err(e) => writeln!(out, "Error: {:#}", e)?,
        }
    }
    Ok(())
}

async fn prompt(state: &AppState) -> String {
    let session = state.session.lock().await;
    match (session.language(), session.scenario()) {
        (Some(language), Some(scenario)) => format!("{}/{}", language, scenario),
        _ => state.current_route().await.name().to_string(),
    }
}

pub async fn execute(
    state: &AppState,
    command: Command,
    out: &mut dyn Write,
) -> anyhow::Result<Outcome> {
    log::debug!("Executing {:?}", command);
    match command {
        Command::Start { language, scenario } => start(state, language, scenario, out).await?,
        Command::Say(text) => say(state, &text, out).await?,
        Command::Report => report(state, out).await?,
        Command::History => history(state, out).await?,
        Command::Show(id) => show(state, &id, out).await?,
        Command::Delete(id) => {
            let identity = state.identity().await;
            state.history.lock().await.delete(identity, &id).await?;
            writeln!(out, "Deleted {}", id)?;
        }
        Command::Clear => {
            let identity = state.identity().await;
            state.history.lock().await.clear(identity).await;
            writeln!(out, "History cleared")?;
        }
        Command::Register { email, password } => {
            state.auth.lock().await.register(&email, &password).await?;
            signed_in(state, out).await?;
        }
        Command::Login { email, password } => {
            state.auth.lock().await.login(&email, &password).await?;
            signed_in(state, out).await?;
        }
        Command::Logout => {
            state.auth.lock().await.logout().await;
            state.history.lock().await.load(Identity::Anonymous).await;
            writeln!(out, "Signed out")?;
        }
        Command::Migrate => migrate(state, out).await?,
        Command::Health => {
            let health = state.api.check_health().await?;
            writeln!(out, "Server at {} is {}", state.api.base_url(), health.status)?;
        }
        Command::Scenarios => scenarios(out)?,
        Command::Help => writeln!(out, "{}", HELP)?,
        Command::Quit => return Ok(Outcome::Quit),
    }
    Ok(Outcome::Continue)
}

async fn start(
    state: &AppState,
    language: Language,
    scenario: Scenario,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let session_id = state.session.lock().await.start(language, scenario);
    state.navigate(Route::Conversation).await;
    let info = scenario.info();
    writeln!(
        out,
        "Started {} in {} (session {})",
        info.title.get(language),
        language.label(),
        session_id
    )?;
    writeln!(out, "{}", info.description.get(language))?;
    Ok(())
}

async fn say(state: &AppState, text: &str, out: &mut dyn Write) -> anyhow::Result<()> {
    let request = {
        let mut session = state.session.lock().await;
        let request = session
            .chat_request(text)
            .map_err(|_| anyhow!("Start a conversation first with /start <language> <scenario>"))?;
        session.add_message(Role::User, text)?;
        session.set_loading(true);
        session.set_streaming(true)?;
        request
    };

    let relayed = relay_reply(state, &request, out).await;

    // Whatever arrived before an error or a cancel is kept as the reply
    let mut session = state.session.lock().await;
    let reply = session.streaming_content().to_string();
    session.set_streaming(false)?;
    session.set_loading(false);
    if !reply.is_empty() {
        session.add_message(Role::Assistant, reply)?;
    }
    relayed
}

async fn relay_reply(
    state: &AppState,
    request: &ChatRequest,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let mut events = state.api.send_message_streamed(request).await?;
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            _ = &mut interrupt => {
                state.api.cancel_stream();
                log::info!("Reply for session {} cancelled", request.session_id);
                writeln!(out, " [stopped]")?;
                return Ok(());
            }
            event = events.next() => match event {
                Some(Ok(ChatEvent::Chunk { content })) => {
                    write!(out, "{}", content)?;
                    out.flush()?;
                    state.session.lock().await.accumulate_streamed_content(&content)?;
                }
                Some(Ok(ChatEvent::Done { .. })) | None => {
                    writeln!(out)?;
                    return Ok(());
                }
                Some(Ok(ChatEvent::Error { message })) => {
                    writeln!(out)?;
                    return Err(anyhow!(message));
                }
                Some(Err(e)) => {
                    writeln!(out)?;
                    return Err(e.into());
                }
            }
        }
    }
}

async fn report(state: &AppState, out: &mut dyn Write) -> anyhow::Result<()> {
    let (request, conversation) = {
        let mut session = state.session.lock().await;
        if !session.has_conversation() {
            return Err(anyhow!("Nothing to report yet; say something first"));
        }
        let prepared = (session.report_request()?, session.conversation_data()?);
        session.set_loading(true);
        prepared
    };

    let generated = state.api.generate_report(&request).await;
    state.session.lock().await.set_loading(false);
    let report = generated?;

    let identity = state.identity().await;
    state
        .history
        .lock()
        .await
        .save(identity, &conversation, Some(report.clone()))
        .await;
    state
        .navigate(Route::Report {
            session_id: conversation.session_id.to_string(),
        })
        .await;
    render_report(&report, out)?;
    Ok(())
}

async fn history(state: &AppState, out: &mut dyn Write) -> anyhow::Result<()> {
    let identity = state.identity().await;
    let mut history = state.history.lock().await;
    history.load(identity).await;
    state.navigate(Route::History).await;

    if history.entries().is_empty() {
        writeln!(out, "No past conversations")?;
        return Ok(());
    }
    for entry in history.entries() {
        render_entry_line(entry, out)?;
    }
    Ok(())
}

async fn show(state: &AppState, id: &str, out: &mut dyn Write) -> anyhow::Result<()> {
    let identity = state.identity().await;
    let entry = state.history.lock().await.get_conversation(identity, id).await?;
    let Some(entry) = entry else {
        return Err(anyhow!("No conversation with id {}", id));
    };

    render_entry_line(&entry, out)?;
    for message in &entry.messages {
        render_message(message, out)?;
    }
    if let Some(report) = &entry.report {
        render_report(report, out)?;
    }
    Ok(())
}

async fn signed_in(state: &AppState, out: &mut dyn Write) -> anyhow::Result<()> {
    let email = state
        .auth
        .lock()
        .await
        .user_email()
        .unwrap_or_default()
        .to_string();
    let mut history = state.history.lock().await;
    history.load(Identity::Authenticated).await;
    writeln!(out, "Signed in as {}", email)?;

    let local = history.all_local_entries().await.len();
    if local > 0 {
        writeln!(
            out,
            "{} conversation(s) are stored on this device; /migrate uploads them",
            local
        )?;
    }
    Ok(())
}

async fn migrate(state: &AppState, out: &mut dyn Write) -> anyhow::Result<()> {
    if state.identity().await != Identity::Authenticated {
        return Err(anyhow!("Sign in before migrating conversations"));
    }

    let mut history = state.history.lock().await;
    let entries = history.all_local_entries().await;
    if entries.is_empty() {
        writeln!(out, "Nothing to migrate")?;
        return Ok(());
    }

    let summary = state.auth.lock().await.migrate_local_data(&entries).await?;
    history.clear_all_local_entries().await;
    history.load(Identity::Authenticated).await;
    writeln!(
        out,
        "{} ({} conversation(s))",
        summary.message, summary.migrated_count
    )?;
    Ok(())
}

fn scenarios(out: &mut dyn Write) -> anyhow::Result<()> {
    let languages: Vec<&str> = Language::ALL.iter().map(|l| l.as_str()).collect();
    writeln!(out, "Languages: {}", languages.join(", "))?;
    for category in Category::ALL {
        writeln!(
            out,
            "{} / {}",
            category.label(Language::English),
            category.label(Language::Japanese)
        )?;
        for scenario in Scenario::in_category(category) {
            let info = scenario.info();
            writeln!(
                out,
                "  {:<18} {} / {}",
                scenario.as_str(),
                info.title.english,
                info.title.japanese
            )?;
        }
    }
    Ok(())
}

fn render_entry_line(entry: &HistoryEntry, out: &mut dyn Write) -> std::io::Result<()> {
    let turns = entry
        .messages
        .iter()
        .filter(|message| message.role == Role::User)
        .count();
    writeln!(
        out,
        "{}  {}  {}/{}  {} turn(s){}",
        entry.id,
        entry.timestamp,
        entry.language,
        entry.scenario,
        turns,
        if entry.report.is_some() { "  [report]" } else { "" }
    )
}

fn render_message(message: &Message, out: &mut dyn Write) -> std::io::Result<()> {
    let speaker = match message.role {
        Role::User => "you",
        Role::Assistant => "partner",
    };
    writeln!(out, "  {:>7}: {}", speaker, message.content)
}

fn render_report(report: &Report, out: &mut dyn Write) -> std::io::Result<()> {
    let overview = &report.overview;
    writeln!(
        out,
        "Report: {} turn(s), {} word(s)",
        overview.turns, overview.word_count
    )?;
    if !report.grammar_errors.is_empty() {
        writeln!(out, "Grammar:")?;
        for issue in &report.grammar_errors {
            writeln!(out, "  {} -> {}", issue.error, issue.correction)?;
            writeln!(out, "    {}", issue.explanation)?;
        }
    }
    if !report.vocabulary_issues.is_empty() {
        writeln!(out, "Vocabulary:")?;
        for issue in &report.vocabulary_issues {
            writeln!(out, "  {} -> {}", issue.original, issue.suggestion)?;
            writeln!(out, "    {}", issue.explanation)?;
        }
    }
    if !report.naturalness.is_empty() {
        writeln!(out, "Naturalness:")?;
        for issue in &report.naturalness {
            writeln!(out, "  {} -> {} ({})", issue.unnatural, issue.natural, issue.context)?;
        }
    }
    for praise in &report.positive_feedback {
        writeln!(out, "  + {}", praise)?;
    }
    Ok(())
}
