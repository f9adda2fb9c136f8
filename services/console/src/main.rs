mod speech;

use crate::speech::{ConsoleSpeech, NoSpeechInput};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::fmt::time::ChronoLocal;
use tutor_core::config::{AppConfig, ConfigStore, ProviderKind};
use tutor_core::message::MessageRole;
use tutor_core::provider::{ProviderRegistry, gemini, gemini::GeminiProvider};
use tutor_core::{SessionEvent, SessionOptions, SessionUpdate, TutorSession, TutorState};

#[derive(Parser)]
#[command(version, about = "Learn a topic from AI Sir in the terminal")]
struct Cli {
    /// Topic to start with; otherwise type one at the prompt
    topic: Option<String>,

    /// Where the tutor settings are kept
    #[arg(long, default_value = "tutor_config.json")]
    settings: PathBuf,

    /// Pause between whiteboard steps, in milliseconds
    #[arg(long, default_value_t = 800)]
    pacing_ms: u64,

    /// Simulated speaking speed
    #[arg(long, default_value_t = 150)]
    words_per_minute: u64,

    /// Gemini model used for lectures
    #[arg(long, default_value = gemini::DEFAULT_MODEL)]
    model: String,

    #[arg(long, default_value_t = tracing::Level::WARN)]
    log_level: tracing::Level,
}

/// A line typed by the student.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Pause,
    Resume,
    Quit,
    Ask(String),
    Nothing,
}

fn parse_line(line: &str) -> Input {
    match line.trim() {
        "" => Input::Nothing,
        "/pause" => Input::Pause,
        "/resume" => Input::Resume,
        "/quit" | "/exit" => Input::Quit,
        text => Input::Ask(text.to_string()),
    }
}

/// The part of `current` not yet printed, given the board as last printed.
fn whiteboard_delta<'a>(printed: &str, current: &'a str) -> Option<&'a str> {
    if current.is_empty() {
        return None;
    }
    match current.strip_prefix(printed) {
        Some(rest) if rest.trim().is_empty() => None,
        Some(rest) => Some(rest),
        None => Some(current),
    }
}

fn render(update: SessionUpdate, printed: &mut String) {
    match update {
        SessionUpdate::WhiteboardChanged { content, .. } => {
            if let Some(delta) = whiteboard_delta(printed, &content) {
                println!("📋 {}", delta.trim());
            }
            *printed = content;
        }
        SessionUpdate::StateChanged { state, progress } => match (state, progress) {
            (TutorState::Teaching, Some((cursor, total))) => {
                println!("[teaching {}/{}]", (cursor + 1).min(total), total)
            }
            (TutorState::Paused, _) => println!("[paused] type /resume to continue"),
            (state, _) => println!("[{state}]"),
        },
        SessionUpdate::MessageAppended(message) => match message.role {
            MessageRole::User => {}
            MessageRole::System => println!("⚠ {}", message.content),
            MessageRole::Assistant => {
                let label = message.label().unwrap_or("Response");
                println!("{label}: {}", message.display_text());
            }
        },
        SessionUpdate::Notice(text) => println!("⚠ {text}"),
        SessionUpdate::ComposerChanged { .. } => {}
    }
}

/// Prints updates until the session drops its sender. Returns the board as
/// last printed.
async fn print_updates(mut updates: mpsc::UnboundedReceiver<SessionUpdate>) -> String {
    let mut printed = String::new();
    while let Some(update) = updates.recv().await {
        render(update, &mut printed);
    }
    printed
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Parse Command-Line Arguments ---
    let args = Cli::parse();
    dotenvy::dotenv().ok();

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 3. Settings ---
    let seed = AppConfig {
        gemini_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
        ..AppConfig::default()
    };
    let settings =
        Arc::new(ConfigStore::load(&args.settings, seed).context("Failed to load tutor settings")?);
    tracing::info!(path = %settings.path().display(), "Tutor settings loaded.");

    // --- 4. Session ---
    let providers = ProviderRegistry::new()
        .with(ProviderKind::Gemini, Arc::new(GeminiProvider::new(args.model.clone())));
    let options = SessionOptions {
        pacing: Duration::from_millis(args.pacing_ms),
        ..SessionOptions::default()
    };
    let (session, channels) = TutorSession::new(
        settings.clone(),
        providers,
        Arc::new(ConsoleSpeech::new(args.words_per_minute)),
        Arc::new(NoSpeechInput),
        options,
    );
    let events = session.sender();
    let runtime = tokio::spawn(session.run(channels.events));

    let printer = tokio::spawn(print_updates(channels.updates));

    println!(
        "Namaste {}! Ask about a topic, /pause, /resume or /quit.",
        settings.current().user_name
    );

    // --- 5. Read the Student's Input ---
    if let Some(topic) = args.topic {
        ask(&events, topic);
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else { break };
                match parse_line(&line) {
                    Input::Quit => break,
                    Input::Pause => { events.send(SessionEvent::Interrupt).ok(); }
                    Input::Resume => { events.send(SessionEvent::Resume).ok(); }
                    Input::Ask(text) => ask(&events, text),
                    Input::Nothing => {}
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // --- 6. Shutdown ---
    events.send(SessionEvent::Shutdown).ok();
    drop(events);
    runtime.await.context("Session task failed")?;
    printer.await.context("Update printer failed")?;
    Ok(())
}

fn ask(events: &mpsc::UnboundedSender<SessionEvent>, text: String) {
    events.send(SessionEvent::SetDraft(text)).ok();
    events.send(SessionEvent::Submit).ok();
}
