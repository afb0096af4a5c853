//! Session controller tests against the in-memory PTY provider

mod common;

use common::{drain, eventually, next_event, test_config, within};
use serde_json::json;
use shell_pane::core::config::Config;
use shell_pane::core::events::{EventSender, HostEvent, NoticeKind};
use shell_pane::core::state::PanelState;
use shell_pane::pty::{MockPty, MockPtyProvider, PtyStatus};
use shell_pane::session::{SessionController, SessionPhase};
use shell_pane::terminal::{BufferSerializer, ContainerGeometry, TerminalBuffer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Harness {
    session: SessionController,
    provider: Arc<MockPtyProvider>,
    events: mpsc::UnboundedReceiver<HostEvent>,
}

impl Harness {
    fn new(config: Config) -> Self {
        Self::with_provider(config, MockPtyProvider::new())
    }

    fn with_provider(config: Config, provider: MockPtyProvider) -> Self {
        let provider = Arc::new(provider);
        let (host, events) = EventSender::channel();
        let session = SessionController::new(config, provider.clone(), Arc::new(host));
        Self {
            session,
            provider,
            events,
        }
    }

    /// Attach `state` and wait for the mock process to be up
    async fn attach(&mut self, state: PanelState) -> MockPty {
        assert!(self.session.attach(&state.to_value()));
        let mock = within(self.provider.next_spawned()).await.unwrap();
        let pty = self.session.pty().unwrap().clone();
        eventually("process running", || pty.status() == PtyStatus::Running).await;
        mock
    }

    async fn wait_for_line(&self, text: &str) {
        let buffer = self.session.buffer();
        eventually(text, || buffer.lock().line_texts().iter().any(|l| l.contains(text))).await;
    }

    fn lines(&self) -> Vec<String> {
        self.session.buffer().lock().line_texts()
    }
}

fn shell_state() -> PanelState {
    PanelState::new("/bin/bash", "/tmp", vec!["-l".into()])
}

#[tokio::test]
async fn test_fresh_session_skips_banner_and_clears_once() {
    let mut harness = Harness::new(test_config());
    let mock = harness.attach(shell_state()).await;

    mock.send_stdout("CONHOST BANNER");
    mock.send_stdout("prompt$ ");
    mock.send_stdout("\x1b[31mred\x1b[0m");
    harness.wait_for_line("prompt$ red").await;

    let lines = harness.lines();
    assert!(lines.iter().all(|l| !l.contains("BANNER")));
    let buffer = harness.session.buffer();
    assert_eq!(buffer.lock().visible_texts()[0], "prompt$ red");
    // The clear pushed the blank screen into scrollback instead of erasing it
    assert_eq!(buffer.lock().total_lines(), 25);
}

#[tokio::test]
async fn test_without_banner_first_chunk_is_kept() {
    let mut config = test_config();
    config.terminal.skip_startup_banner = Some(false);
    let mut harness = Harness::new(config);
    let mock = harness.attach(shell_state()).await;

    mock.send_stdout("first chunk");
    harness.wait_for_line("first chunk").await;
}

#[tokio::test]
async fn test_restored_session_forwards_every_chunk() {
    let mut previous = TerminalBuffer::detached(60, 10);
    for i in 0..30 {
        previous.advance_bytes(format!("old output {}\r\n", i).as_bytes());
    }
    let mut state = shell_state();
    state.serial = Some(BufferSerializer::serialize(&mut previous));

    let mut harness = Harness::new(test_config());
    let mock = harness.attach(state).await;
    assert_eq!(mock.initial_size(), (60, 10));

    mock.send_stdout("first live chunk");
    harness.wait_for_line("first live chunk").await;

    let lines = harness.lines();
    assert_eq!(lines[0], "old output 0");
    assert!(lines.iter().any(|l| l == "old output 29"));
    let buffer = harness.session.buffer();
    assert_eq!((buffer.lock().columns(), buffer.lock().rows()), (60, 10));
}

#[tokio::test]
async fn test_snapshot_round_trip_through_sessions() {
    let mut config = test_config();
    config.terminal.skip_startup_banner = Some(false);
    let mut first = Harness::new(config.clone());
    let mock = first.attach(shell_state()).await;
    for i in 0..40 {
        mock.send_stdout(format!("row {}\r\n", i));
    }
    first.wait_for_line("row 39").await;

    let state = first.session.get_persistable_state();
    let original = first.lines();
    first.session.close();

    let snapshot = state.serial.clone().unwrap();
    let mut second = Harness::new(config);
    assert!(second.session.attach(&state.to_value()));

    assert_eq!(second.lines(), original);
    let buffer = second.session.buffer();
    assert_eq!(
        (buffer.lock().columns(), buffer.lock().rows()),
        (snapshot.columns, snapshot.rows)
    );
}

#[tokio::test]
async fn test_old_state_without_serial_restores_empty() {
    let mut harness = Harness::new(test_config());
    let value = json!({
        "__type": PanelState::TYPE,
        "executable": "/bin/zsh",
        "cwd": "/tmp",
        "args": []
    });
    assert!(harness.session.attach(&value));
    assert_eq!(harness.session.phase(), SessionPhase::Live);
    assert!(harness.lines().iter().all(|l| l.is_empty()));
}

#[tokio::test]
async fn test_resize_burst_applies_last_dimensions() {
    let mut harness = Harness::new(test_config());
    let mock = harness.attach(shell_state()).await;

    // 8x16 cells with 8px padding on each side
    for (columns, rows) in [(90u16, 30u16), (100, 35), (120, 40)] {
        let geometry = ContainerGeometry::new(columns as f32 * 8.0 + 16.0, rows as f32 * 16.0 + 16.0);
        harness.session.on_ui_resize(geometry);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    harness.session.on_ui_resize(ContainerGeometry::new(0.0, 0.0));
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(mock.resizes(), vec![(120, 40)]);
    let buffer = harness.session.buffer();
    assert_eq!((buffer.lock().columns(), buffer.lock().rows()), (120, 40));
    assert!(drain(&mut harness.events).contains(&HostEvent::SaveLayout));
}

#[tokio::test]
async fn test_resize_after_exit_still_resizes_buffer() {
    let mut harness = Harness::new(test_config());
    let mock = harness.attach(shell_state()).await;

    mock.exit(0);
    assert_eq!(next_event(&mut harness.events).await, HostEvent::ClosePanel);

    harness.session.request_resize(50, 12);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(mock.resizes().is_empty());
    let buffer = harness.session.buffer();
    assert_eq!((buffer.lock().columns(), buffer.lock().rows()), (50, 12));
}

#[tokio::test]
async fn test_clean_exit_gives_timed_notice() {
    let mut harness = Harness::new(test_config());
    let mock = harness.attach(shell_state()).await;

    mock.exit(0);
    assert_eq!(next_event(&mut harness.events).await, HostEvent::ClosePanel);
    match next_event(&mut harness.events).await {
        HostEvent::Notice(notice) => {
            assert_eq!(notice.kind, NoticeKind::TerminalExited { code: 0 });
            assert_eq!(notice.timeout, Some(Duration::from_millis(1000)));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(harness.session.phase(), SessionPhase::Closed);
}

#[tokio::test]
async fn test_failed_exit_gives_persistent_notice() {
    let mut harness = Harness::new(test_config());
    let mock = harness.attach(shell_state()).await;

    mock.exit(2);
    assert_eq!(next_event(&mut harness.events).await, HostEvent::ClosePanel);
    match next_event(&mut harness.events).await {
        HostEvent::Notice(notice) => {
            assert_eq!(notice.kind, NoticeKind::TerminalExited { code: 2 });
            assert!(notice.is_persistent());
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_configured_success_codes() {
    let mut config = test_config();
    config.notices.success_exit_codes = vec![0, 130];
    let mut harness = Harness::new(config);
    let mock = harness.attach(shell_state()).await;

    mock.exit(130);
    assert_eq!(next_event(&mut harness.events).await, HostEvent::ClosePanel);
    match next_event(&mut harness.events).await {
        HostEvent::Notice(notice) => assert!(!notice.is_persistent()),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_spawn_failure_closes_with_error_notice() {
    let mut harness = Harness::with_provider(test_config(), MockPtyProvider::failing("no such shell"));
    assert!(harness.session.attach(&shell_state().to_value()));

    assert_eq!(next_event(&mut harness.events).await, HostEvent::ClosePanel);
    match next_event(&mut harness.events).await {
        HostEvent::Notice(notice) => {
            assert!(matches!(notice.kind, NoticeKind::SpawnFailed { .. }));
            assert!(notice.to_string().contains("no such shell"));
            assert!(notice.is_persistent());
        }
        other => panic!("unexpected event {:?}", other),
    }
    // Teardown of a session whose process never started
    harness.session.close();
    harness.session.close();
}

#[tokio::test]
async fn test_teardown_is_idempotent() {
    let mut harness = Harness::new(test_config());
    let mock = harness.attach(shell_state()).await;

    harness.session.close();
    harness.session.close();
    eventually("process killed", || mock.has_exited()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(mock.kill_count(), 1);
    assert_eq!(harness.session.phase(), SessionPhase::Closed);
    // Closing the panel ourselves raises no exit notice
    let events = drain(&mut harness.events);
    assert!(events.iter().all(|e| matches!(e, HostEvent::SaveLayout)));
}

#[tokio::test]
async fn test_output_written_before_teardown_reaches_buffer() {
    let mut config = test_config();
    config.terminal.skip_startup_banner = Some(false);
    config.terminal.clear_on_start = false;
    let mut harness = Harness::new(config);
    let mock = harness.attach(shell_state()).await;

    for i in 0..50 {
        mock.send_stdout(format!("late {}\r\n", i));
    }
    harness.session.close();
    eventually("process killed", || mock.has_exited()).await;
    harness.wait_for_line("late 49").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let lines = harness.lines();
    assert!((0..50).all(|i| lines.contains(&format!("late {}", i))));
    assert_eq!(harness.session.phase(), SessionPhase::Closed);
    let state = harness.session.get_persistable_state();
    assert!(state.serial.unwrap().data.contains("late 49"));

    // Draining after teardown neither notifies nor asks for another save
    let events = drain(&mut harness.events);
    assert!(events.iter().all(|e| matches!(e, HostEvent::SaveLayout)));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(drain(&mut harness.events).is_empty());
}

#[tokio::test]
async fn test_malformed_and_duplicate_attach_are_ignored() {
    let mut harness = Harness::new(test_config());
    assert!(!harness.session.attach(&json!({"__type": "some-other-panel", "url": "x"})));
    assert!(!harness.session.attach(&json!({"executable": "/bin/sh"})));
    assert_eq!(harness.provider.spawn_count(), 0);
    assert_eq!(harness.session.phase(), SessionPhase::Uninitialized);

    let mock = harness.attach(shell_state()).await;
    assert!(!harness.session.attach(&PanelState::new("/bin/zsh", "/", vec![]).to_value()));
    assert!(!harness.session.attach(&json!(42)));

    assert_eq!(harness.provider.spawn_count(), 1);
    assert_eq!(harness.session.phase(), SessionPhase::Live);
    assert_eq!(harness.session.state().executable, "/bin/bash");
    assert_eq!(mock.request().executable, "/bin/bash");
}

#[tokio::test]
async fn test_persistable_state_is_always_fresh() {
    let mut config = test_config();
    config.terminal.skip_startup_banner = Some(false);
    config.terminal.clear_on_start = false;
    let mut harness = Harness::new(config);

    let before = harness.session.get_persistable_state();
    assert!(before.serial.is_some());

    let mock = harness.attach(shell_state()).await;
    mock.send_stdout("hello snapshot");
    harness.wait_for_line("hello snapshot").await;

    let state = harness.session.get_persistable_state();
    assert_eq!(state.executable, "/bin/bash");
    assert_eq!(state.args, vec!["-l".to_string()]);
    assert!(state.serial.unwrap().data.contains("hello snapshot"));
}

#[tokio::test]
async fn test_output_requests_debounced_save() {
    let mut harness = Harness::new(test_config());
    let mock = harness.attach(shell_state()).await;

    for i in 0..10 {
        mock.send_stdout(format!("chunk {}", i));
    }
    harness.wait_for_line("chunk 9").await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let saves = drain(&mut harness.events)
        .into_iter()
        .filter(|e| *e == HostEvent::SaveLayout)
        .count();
    assert!(saves >= 1 && saves < 9, "saves = {}", saves);
}

#[tokio::test]
async fn test_input_reaches_stdin() {
    let mut harness = Harness::new(test_config());
    let mock = harness.attach(shell_state()).await;

    harness.session.send_input("ls -la\r");
    eventually("input forwarded", || mock.stdin() == b"ls -la\r").await;
}

#[tokio::test]
async fn test_stderr_bypasses_filter() {
    let mut harness = Harness::new(test_config());
    let mock = harness.attach(shell_state()).await;

    mock.send_stderr("warning: from stderr");
    harness.wait_for_line("warning: from stderr").await;
}

#[tokio::test]
async fn test_emulator_replies_forwarded_to_shell() {
    let mut config = test_config();
    config.terminal.skip_startup_banner = Some(false);
    let mut harness = Harness::new(config);
    let mock = harness.attach(shell_state()).await;

    // Cursor position request
    mock.send_stdout("\x1b[6n");
    eventually("cursor report", || mock.stdin().starts_with(b"\x1b[")).await;
}

#[tokio::test]
async fn test_html_export() {
    let mut config = test_config();
    config.terminal.skip_startup_banner = Some(false);
    let mut harness = Harness::new(config);
    let mock = harness.attach(shell_state()).await;

    mock.send_stdout("a < b && \x1b[32mok\x1b[0m");
    harness.wait_for_line("a < b").await;

    let html = harness.session.export_html();
    assert!(html.contains("a &lt; b &amp;&amp; "));
    assert!(html.contains(">ok</span>"));
    assert_eq!(harness.session.export_file_name(), "bash.html");
}
