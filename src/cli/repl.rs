use super::commands::{Command, HELP_TEXT, is_command_line, parse_command};
use crate::chat::{ChatSession, ChatSettings, send_with_fallback};
use crate::llm::provider::{ChatRole, LlmProvider};
use crate::trace::SessionTrace;
use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

pub const BANNER: &str = "Gemini REPL. Type 'exit' or 'quit' to stop.";
pub const PROMPT: &str = "> ";

pub struct ReplState<P> {
    pub provider: P,
    pub session: ChatSession,
    pub primary_model: String,
    pub fallback_models: Vec<String>,
    pub settings: ChatSettings,
    pub trace: SessionTrace,
}

impl<P> ReplState<P> {
    pub fn new(
        provider: P,
        primary_model: String,
        fallback_models: Vec<String>,
        settings: ChatSettings,
        trace: SessionTrace,
    ) -> Self {
        Self {
            provider,
            session: ChatSession::new(primary_model.as_str(), settings.clone()),
            primary_model,
            fallback_models,
            settings,
            trace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LineOutcome {
    Exit,
    Skip,
    Reply(String),
    Info(String),
    Failure(String),
}

pub async fn run_repl<P: LlmProvider>(state: &mut ReplState<P>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!("{BANNER}");

    loop {
        println!();
        match rl.readline(PROMPT) {
            Ok(line) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    let _ = rl.add_history_entry(trimmed);
                }

                match handle_line(state, trimmed).await {
                    LineOutcome::Exit => break,
                    LineOutcome::Skip => continue,
                    LineOutcome::Reply(text) | LineOutcome::Info(text) => println!("{text}"),
                    LineOutcome::Failure(message) => eprintln!("{message}"),
                }
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!();
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

pub(crate) async fn handle_line<P: LlmProvider>(
    state: &mut ReplState<P>,
    line: &str,
) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Skip;
    }
    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        return LineOutcome::Exit;
    }
    if is_command_line(line) {
        return match parse_command(line) {
            Ok(command) => run_command(state, command),
            Err(err) => LineOutcome::Failure(err.message().to_string()),
        };
    }

    state.trace.log_user_input(line);
    let err = match state.session.send_message(&state.provider, line).await {
        Ok(text) => return reply(state, text),
        Err(err) => err,
    };

    if !err.is_model_not_found() {
        return failure(state, &err);
    }

    let previous_model = state.session.model().to_string();
    match send_with_fallback(
        &state.provider,
        line,
        &state.primary_model,
        &state.fallback_models,
        &state.settings,
    )
    .await
    {
        Ok((session, text)) => {
            if session.model() != previous_model {
                state.trace.log_fallback(&previous_model, session.model());
            }
            state.session = session;
            reply(state, text)
        }
        Err(err) => failure(state, &err),
    }
}

fn reply<P>(state: &ReplState<P>, text: String) -> LineOutcome {
    state.trace.log_reply(&text);
    LineOutcome::Reply(text)
}

fn failure<P>(state: &ReplState<P>, err: &dyn std::error::Error) -> LineOutcome {
    let message = format!("Request failed: {err}");
    state.trace.log_error(&message);
    LineOutcome::Failure(message)
}

fn run_command<P>(state: &mut ReplState<P>, command: Command) -> LineOutcome {
    match command {
        Command::Help => LineOutcome::Info(HELP_TEXT.to_string()),
        Command::Clear => {
            state.session.clear();
            LineOutcome::Info("Conversation cleared.".to_string())
        }
        Command::Model => LineOutcome::Info(format!("Model: {}", state.session.model())),
        Command::History(limit) => LineOutcome::Info(format_history(&state.session, limit)),
        Command::Trace => LineOutcome::Info(format!(
            "Trace file: {}",
            state.trace.file_path().display()
        )),
    }
}

fn format_history(session: &ChatSession, limit: Option<usize>) -> String {
    let history = session.history();
    if history.is_empty() {
        return "No conversation history yet.".to_string();
    }

    let skip = limit.map_or(0, |n| history.len().saturating_sub(n));
    history
        .iter()
        .skip(skip)
        .map(|message| {
            let who = match message.role {
                ChatRole::User => "you",
                ChatRole::Model => "gemini",
            };
            format!("{who}: {}", message.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::{LineOutcome, ReplState, handle_line};
    use crate::chat::test_support::{FakeProvider, not_found, settings};
    use crate::llm::provider::{ChatMessage, LlmError};
    use crate::trace::SessionTrace;
    use std::fs;
    use tempfile::TempDir;

    fn state_with(responses: Vec<Result<&str, LlmError>>) -> (ReplState<FakeProvider>, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let trace = SessionTrace::create_in_dir("repl-test", dir.path()).expect("trace");
        let state = ReplState::new(
            FakeProvider::new(responses),
            "primary".to_string(),
            vec!["fb-1".to_string(), "fb-2".to_string()],
            settings(),
            trace,
        );
        (state, dir)
    }

    fn trace_text(state: &ReplState<FakeProvider>) -> String {
        fs::read_to_string(state.trace.file_path()).expect("read trace")
    }

    #[tokio::test]
    async fn exit_words_and_blank_lines_do_not_reach_provider() {
        let (mut state, _dir) = state_with(vec![]);

        assert_eq!(handle_line(&mut state, "   ").await, LineOutcome::Skip);
        assert_eq!(handle_line(&mut state, "exit").await, LineOutcome::Exit);
        assert_eq!(handle_line(&mut state, "QUIT").await, LineOutcome::Exit);
        assert_eq!(handle_line(&mut state, "  Exit  ").await, LineOutcome::Exit);
        assert!(state.provider.seen_requests().is_empty());
    }

    #[tokio::test]
    async fn prompts_share_one_conversation() {
        let (mut state, _dir) = state_with(vec![Ok("Hi Sam"), Ok("Your name is Sam")]);

        assert_eq!(
            handle_line(&mut state, "my name is Sam").await,
            LineOutcome::Reply("Hi Sam".to_string())
        );
        assert_eq!(
            handle_line(&mut state, "what is my name?").await,
            LineOutcome::Reply("Your name is Sam".to_string())
        );

        let seen = state.provider.seen_requests();
        assert_eq!(seen[1].messages.len(), 3);
        assert_eq!(seen[1].messages[1], ChatMessage::model("Hi Sam"));

        let trace = trace_text(&state);
        assert!(trace.contains("[ai.in      ] my name is Sam"));
        assert!(trace.contains("[ai.out     ] Your name is Sam"));
    }

    #[tokio::test]
    async fn provider_failure_is_reported_and_loop_continues() {
        let (mut state, _dir) = state_with(vec![
            Err(LlmError::HttpStatus {
                status: 500,
                body: "provider down".to_string(),
            }),
            Ok("recovered"),
        ]);

        assert_eq!(
            handle_line(&mut state, "first").await,
            LineOutcome::Failure(
                "Request failed: provider request failed with status 500: provider down"
                    .to_string()
            )
        );
        assert_eq!(
            handle_line(&mut state, "second").await,
            LineOutcome::Reply("recovered".to_string())
        );
        assert_eq!(state.provider.seen_models(), vec!["primary", "primary"]);
        assert!(trace_text(&state).contains("[ai.err     ] Request failed"));
    }

    #[tokio::test]
    async fn model_not_found_switches_session_to_fallback() {
        let (mut state, _dir) = state_with(vec![
            Err(not_found("primary")),
            Err(not_found("primary")),
            Err(not_found("fb-1")),
            Ok("from fb-2"),
            Ok("still fb-2"),
        ]);

        assert_eq!(
            handle_line(&mut state, "hello").await,
            LineOutcome::Reply("from fb-2".to_string())
        );
        assert_eq!(state.session.model(), "fb-2");

        assert_eq!(
            handle_line(&mut state, "again").await,
            LineOutcome::Reply("still fb-2".to_string())
        );
        assert_eq!(
            state.provider.seen_models(),
            vec!["primary", "primary", "fb-1", "fb-2", "fb-2"]
        );
        assert!(trace_text(&state).contains("[ai.fallback] primary -> fb-2"));
    }

    #[tokio::test]
    async fn failed_fallback_reports_primary_error() {
        let (mut state, _dir) = state_with(vec![
            Err(not_found("primary")),
            Err(not_found("primary")),
            Err(not_found("fb-1")),
            Err(not_found("fb-2")),
        ]);

        match handle_line(&mut state, "hello").await {
            LineOutcome::Failure(message) => {
                assert!(message.starts_with("Request failed:"));
                assert!(message.contains("models/primary is not found"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(state.session.model(), "primary");
    }

    #[tokio::test]
    async fn commands_manage_the_conversation() {
        let (mut state, _dir) = state_with(vec![Ok("pong")]);

        assert_eq!(
            handle_line(&mut state, "/history").await,
            LineOutcome::Info("No conversation history yet.".to_string())
        );
        handle_line(&mut state, "ping").await;
        assert_eq!(
            handle_line(&mut state, "/history").await,
            LineOutcome::Info("you: ping\ngemini: pong".to_string())
        );
        assert_eq!(
            handle_line(&mut state, "/history 1").await,
            LineOutcome::Info("gemini: pong".to_string())
        );
        assert_eq!(
            handle_line(&mut state, "/model").await,
            LineOutcome::Info("Model: primary".to_string())
        );
        assert_eq!(
            handle_line(&mut state, "/clear").await,
            LineOutcome::Info("Conversation cleared.".to_string())
        );
        assert!(state.session.history().is_empty());

        match handle_line(&mut state, "/trace").await {
            LineOutcome::Info(text) => assert!(text.starts_with("Trace file: ")),
            other => panic!("expected trace info, got {other:?}"),
        }
        assert_eq!(
            handle_line(&mut state, "/nope").await,
            LineOutcome::Failure("unknown command '/nope'. Try /help".to_string())
        );
        assert_eq!(state.provider.seen_requests().len(), 1);
    }
}
