//! PTY handle lifecycle tests

mod common;

use common::{eventually, within};
use parking_lot::Mutex;
use shell_pane::pty::{
    MockPtyProvider, PtyChunk, PtyControl, PtyError, PtyExit, PtyHandle, PtyOutput, PtyProvider,
    PtySize, PtyStatus, PtyStream, SpawnRequest, SpawnedPty,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

fn size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn request() -> SpawnRequest {
    SpawnRequest::new("/bin/sh", "/tmp", vec![])
}

/// Provider that holds every spawn until the test opens the gate
struct GatedProvider {
    inner: MockPtyProvider,
    gate: Mutex<std_mpsc::Receiver<()>>,
}

impl GatedProvider {
    fn new() -> (Arc<Self>, std_mpsc::Sender<()>) {
        let (tx, rx) = std_mpsc::channel();
        let provider = Arc::new(Self {
            inner: MockPtyProvider::new(),
            gate: Mutex::new(rx),
        });
        (provider, tx)
    }
}

impl PtyProvider for GatedProvider {
    fn spawn(&self, request: &SpawnRequest, size: PtySize) -> Result<SpawnedPty, PtyError> {
        let _ = self.gate.lock().recv();
        self.inner.spawn(request, size)
    }
}

/// Control whose resizes wait until the test drops the gate's sender
struct GatedControl {
    inner: Box<dyn PtyControl>,
    entered: Arc<AtomicBool>,
    gate: Mutex<std_mpsc::Receiver<()>>,
}

impl PtyControl for GatedControl {
    fn resize(&self, size: PtySize) -> Result<(), PtyError> {
        self.entered.store(true, Ordering::SeqCst);
        let _ = self.gate.lock().recv();
        self.inner.resize(size)
    }

    fn kill(&self) -> Result<(), PtyError> {
        self.inner.kill()
    }
}

/// Provider whose spawns wait for a gate and whose controls resize slowly
struct SlowResizeProvider {
    spawn_gate: GatedProvider,
    entered: Arc<AtomicBool>,
    resize_gate: Mutex<Option<std_mpsc::Receiver<()>>>,
}

impl SlowResizeProvider {
    fn new() -> (Arc<Self>, std_mpsc::Sender<()>, std_mpsc::Sender<()>) {
        let (spawn_tx, spawn_rx) = std_mpsc::channel();
        let (resize_tx, resize_rx) = std_mpsc::channel();
        let provider = Arc::new(Self {
            spawn_gate: GatedProvider {
                inner: MockPtyProvider::new(),
                gate: Mutex::new(spawn_rx),
            },
            entered: Arc::new(AtomicBool::new(false)),
            resize_gate: Mutex::new(Some(resize_rx)),
        });
        (provider, spawn_tx, resize_tx)
    }

    fn mock(&self) -> &MockPtyProvider {
        &self.spawn_gate.inner
    }
}

impl PtyProvider for SlowResizeProvider {
    fn spawn(&self, request: &SpawnRequest, size: PtySize) -> Result<SpawnedPty, PtyError> {
        let mut spawned = self.spawn_gate.spawn(request, size)?;
        if let Some(gate) = self.resize_gate.lock().take() {
            spawned.control = Box::new(GatedControl {
                inner: spawned.control,
                entered: self.entered.clone(),
                gate: Mutex::new(gate),
            });
        }
        Ok(spawned)
    }
}

async fn collect(mut output: PtyOutput) -> Vec<PtyChunk> {
    let mut chunks = Vec::new();
    while let Some(chunk) = within(output.recv()).await {
        chunks.push(chunk);
    }
    chunks
}

#[tokio::test]
async fn test_output_in_order_then_exit() {
    let provider = Arc::new(MockPtyProvider::new());
    let (handle, output) = PtyHandle::spawn(provider.clone(), request(), size(80, 24));
    let mock = within(provider.next_spawned()).await.unwrap();
    assert_eq!(mock.initial_size(), (80, 24));
    assert_eq!(mock.request().executable, "/bin/sh");

    for i in 0..20 {
        mock.send_stdout(format!("chunk {};", i));
    }
    mock.exit(3);

    let text: String = collect(output)
        .await
        .into_iter()
        .map(|chunk| String::from_utf8(chunk.data).unwrap())
        .collect();
    let expected: String = (0..20).map(|i| format!("chunk {};", i)).collect();
    assert_eq!(text, expected);

    assert_eq!(within(handle.outcome()).await, PtyExit::Exited(3));
    assert_eq!(handle.status(), PtyStatus::Exited(3));
    assert!(!handle.is_alive());
}

#[tokio::test]
async fn test_outcome_awaited_late_still_resolves() {
    let provider = Arc::new(MockPtyProvider::new());
    let (handle, _output) = PtyHandle::spawn(provider.clone(), request(), size(80, 24));
    let mock = within(provider.next_spawned()).await.unwrap();

    mock.exit(0);
    eventually("exit settled", || handle.status().is_terminal()).await;

    // Registered after the fact, more than once
    assert_eq!(within(handle.outcome()).await, PtyExit::Exited(0));
    assert_eq!(within(handle.clone().outcome()).await, PtyExit::Exited(0));
}

#[tokio::test]
async fn test_stderr_is_separate_stream() {
    let provider = Arc::new(MockPtyProvider::new());
    let (_handle, output) = PtyHandle::spawn(provider.clone(), request(), size(80, 24));
    let mock = within(provider.next_spawned()).await.unwrap();

    mock.send_stderr("oops");
    mock.exit(1);

    let chunks = collect(output).await;
    assert_eq!(
        chunks,
        vec![PtyChunk {
            stream: PtyStream::Stderr,
            data: b"oops".to_vec()
        }]
    );
}

#[tokio::test]
async fn test_spawn_failure_settles_errored() {
    let provider = Arc::new(MockPtyProvider::failing("exec format error"));
    let (handle, output) = PtyHandle::spawn(provider.clone(), request(), size(80, 24));

    match within(handle.outcome()).await {
        PtyExit::Errored(cause) => assert!(cause.contains("exec format error")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(collect(output).await.is_empty());

    // Everything is a quiet no-op afterwards
    assert!(handle.write(b"ignored").is_ok());
    assert!(handle.resize(100, 30).await.is_ok());
    handle.kill();
    handle.kill();
    assert!(matches!(handle.status(), PtyStatus::Errored(_)));
}

#[tokio::test]
async fn test_input_queued_while_starting() {
    let (provider, gate) = GatedProvider::new();
    let (handle, _output) = PtyHandle::spawn(provider.clone(), request(), size(80, 24));

    assert_eq!(handle.status(), PtyStatus::Starting);
    handle.write(b"echo ").unwrap();
    handle.write(b"queued\n").unwrap();

    gate.send(()).unwrap();
    let mock = within(provider.inner.next_spawned()).await.unwrap();
    eventually("queued input flushed", || mock.stdin() == b"echo queued\n").await;

    handle.write(b"more\n").unwrap();
    assert_eq!(mock.stdin(), b"echo queued\nmore\n");
    handle.kill();
}

#[tokio::test]
async fn test_resize_while_starting_applied_on_start() {
    let (provider, gate) = GatedProvider::new();
    let (handle, _output) = PtyHandle::spawn(provider.clone(), request(), size(80, 24));

    handle.resize(132, 43).await.unwrap();
    assert_eq!(handle.size(), (132, 43));

    gate.send(()).unwrap();
    let mock = within(provider.inner.next_spawned()).await.unwrap();
    eventually("running", || handle.status() == PtyStatus::Running).await;
    assert_eq!(mock.resizes(), vec![(132, 43)]);

    handle.resize(100, 30).await.unwrap();
    assert_eq!(mock.resizes(), vec![(132, 43), (100, 30)]);
    handle.kill();
}

#[tokio::test]
async fn test_resize_landing_while_start_applies_size() {
    let (provider, spawn_gate, resize_gate) = SlowResizeProvider::new();
    let (handle, _output) = PtyHandle::spawn(provider.clone(), request(), size(80, 24));

    handle.resize(100, 30).await.unwrap();
    spawn_gate.send(()).unwrap();
    let mock = within(provider.mock().next_spawned()).await.unwrap();
    eventually("start applying the stored size", || {
        provider.entered.load(Ordering::SeqCst)
    })
    .await;

    // Lands after start read the size but before the control is installed
    let late = handle.clone();
    let resizing = tokio::task::spawn_blocking(move || {
        tokio::runtime::Handle::current().block_on(late.resize(120, 40))
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(resize_gate);
    within(resizing).await.unwrap().unwrap();

    eventually("running", || handle.status() == PtyStatus::Running).await;
    assert_eq!(handle.size(), (120, 40));
    assert_eq!(mock.resizes().last(), Some(&(120, 40)));
    handle.kill();
}

#[tokio::test]
async fn test_kill_while_starting() {
    let (provider, gate) = GatedProvider::new();
    let (handle, _output) = PtyHandle::spawn(provider.clone(), request(), size(80, 24));

    handle.kill();
    gate.send(()).unwrap();
    let mock = within(provider.inner.next_spawned()).await.unwrap();

    assert!(matches!(within(handle.outcome()).await, PtyExit::Exited(_)));
    assert_eq!(mock.kill_count(), 1);
}

#[tokio::test]
async fn test_kill_is_idempotent() {
    let provider = Arc::new(MockPtyProvider::new());
    let (handle, _output) = PtyHandle::spawn(provider.clone(), request(), size(80, 24));
    let mock = within(provider.next_spawned()).await.unwrap();
    eventually("running", || handle.status() == PtyStatus::Running).await;

    handle.kill();
    let outcome = within(handle.outcome()).await;
    handle.kill();
    handle.kill();

    assert_eq!(outcome, PtyExit::Exited(shell_pane::pty::mock::KILLED_EXIT_CODE));
    assert_eq!(mock.kill_count(), 1);
}

#[tokio::test]
async fn test_resize_after_exit_is_noop() {
    let provider = Arc::new(MockPtyProvider::new());
    let (handle, _output) = PtyHandle::spawn(provider.clone(), request(), size(80, 24));
    let mock = within(provider.next_spawned()).await.unwrap();

    mock.exit(0);
    within(handle.outcome()).await;
    assert!(handle.resize(120, 40).await.is_ok());
    assert!(mock.resizes().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_native_shell_round_trip() {
    use shell_pane::pty::NativePtyProvider;

    let request = SpawnRequest::new(
        "/bin/sh",
        "",
        vec!["-c".into(), "echo native-ok; exit 3".into()],
    );
    let (handle, output) = PtyHandle::spawn(Arc::new(NativePtyProvider), request, size(80, 24));

    let text: String = collect(output)
        .await
        .into_iter()
        .map(|chunk| String::from_utf8_lossy(&chunk.data).into_owned())
        .collect();
    assert!(text.contains("native-ok"));
    assert_eq!(within(handle.outcome()).await, PtyExit::Exited(3));
}
