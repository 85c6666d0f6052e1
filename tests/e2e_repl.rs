#![cfg(unix)]

use expectrl::{Eof, Regex, Session, WaitStatus};
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EXPECT_TIMEOUT: Duration = Duration::from_secs(5);

struct Repl {
    session: Session,
    _dirs: [TempDir; 3],
}

fn spawn_repl(server: &MockServer) -> Repl {
    let home = tempfile::tempdir().expect("home tempdir");
    let config_home = tempfile::tempdir().expect("XDG_CONFIG_HOME tempdir");
    let state_home = tempfile::tempdir().expect("XDG_STATE_HOME tempdir");

    let mut command = Command::new(env!("CARGO_BIN_EXE_gemini_chat"));
    command
        .current_dir(home.path())
        .env_remove("GOOGLE_API_KEY")
        .env_remove("GEMINI_MODEL")
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", config_home.path())
        .env("XDG_STATE_HOME", state_home.path())
        .env("GEMINI_API_KEY", "test-key")
        .env("GEMINI_BASE_URL", server.uri())
        .args(["--model", "gemini-test"]);

    let mut session = Session::spawn(command).expect("spawn gemini_chat in PTY");
    session.set_expect_timeout(Some(EXPECT_TIMEOUT));
    session
        .expect("Gemini REPL. Type 'exit' or 'quit' to stop.")
        .expect("banner");
    session.expect(Regex("> ")).expect("first prompt");

    Repl {
        session,
        _dirs: [home, config_home, state_home],
    }
}

fn expect_clean_exit(repl: &mut Repl) {
    repl.session.expect(Eof).expect("process exits");
    let status = repl.session.get_process().wait().expect("wait for exit");
    assert!(
        matches!(status, WaitStatus::Exited(_, 0)),
        "unexpected exit status: {status:?}"
    );
}

fn reply_body(text: &str) -> String {
    serde_json::json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
    })
    .to_string()
}

fn mock_server(mocks: Vec<Mock>) -> (tokio::runtime::Runtime, MockServer) {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let server = rt.block_on(MockServer::start());
    rt.block_on(async {
        for mock in mocks {
            mock.mount(&server).await;
        }
    });
    (rt, server)
}

#[test]
fn repl_exits_on_quit_keyword() {
    let (_rt, server) = mock_server(vec![]);
    let mut repl = spawn_repl(&server);

    repl.session.send_line("quit").expect("quit line");
    expect_clean_exit(&mut repl);
}

#[test]
fn repl_exits_on_end_of_input() {
    let (_rt, server) = mock_server(vec![]);
    let mut repl = spawn_repl(&server);

    repl.session.send([4u8]).expect("send Ctrl-D");
    expect_clean_exit(&mut repl);
}

#[test]
fn repl_exits_cleanly_on_interrupt() {
    let (_rt, server) = mock_server(vec![]);
    let mut repl = spawn_repl(&server);

    repl.session.send([3u8]).expect("send Ctrl-C");
    expect_clean_exit(&mut repl);
}

#[test]
fn repl_keeps_conversation_history_across_prompts() {
    let (_rt, server) = mock_server(vec![
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(body_string_contains("remember the number 42"))
            .and(body_string_contains("what number?"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(reply_body("It was 42."), "application/json"),
            )
            .expect(1),
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(body_string_contains("remember the number 42"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(reply_body("Noted."), "application/json"),
            )
            .expect(1),
    ]);
    let mut repl = spawn_repl(&server);

    repl.session
        .send_line("remember the number 42")
        .expect("first prompt");
    repl.session.expect("Noted.").expect("first reply");
    repl.session.expect(Regex("> ")).expect("prompt again");

    repl.session.send_line("what number?").expect("second prompt");
    repl.session.expect("It was 42.").expect("second reply");

    repl.session.send_line("/history").expect("history command");
    repl.session
        .expect("you: remember the number 42")
        .expect("history lists first turn");

    repl.session.send_line("exit").expect("exit line");
    repl.session.expect(Eof).expect("process exits");
}

#[test]
fn repl_reports_failure_then_recovers() {
    let (_rt, server) = mock_server(vec![
        Mock::given(method("POST"))
            .and(body_string_contains("first question"))
            .respond_with(ResponseTemplate::new(500).set_body_string("provider down"))
            .expect(1),
        Mock::given(method("POST"))
            .and(body_string_contains("second question"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(reply_body("Recovered answer"), "application/json"),
            )
            .expect(1),
    ]);
    let mut repl = spawn_repl(&server);

    repl.session.send_line("first question").expect("first prompt");
    repl.session
        .expect("Request failed: provider request failed with status 500")
        .expect("failure message");

    repl.session
        .send_line("second question")
        .expect("second prompt");
    repl.session
        .expect("Recovered answer")
        .expect("recovered reply");

    repl.session.send_line("quit").expect("quit line");
    repl.session.expect(Eof).expect("process exits");
}
