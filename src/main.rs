//! ShellPane - Entry Point
//!
//! Headless host for a single terminal session. Restores the previous
//! session's scrollback from the layout file, forwards stdin to the shell and
//! persists the layout whenever the session asks for it. On exit the visible
//! rows are printed, and `--export-html` writes the buffer next to the layout.

use anyhow::{Context, Result};
use shell_pane::{
    core::{
        config::Config,
        events::{EventSender, HostEvent},
        layout::LayoutStore,
        state::PanelState,
    },
    pty::NativePtyProvider,
    session::SessionController,
};
use std::io::Read;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Read raw stdin on a blocking thread
fn spawn_stdin_reader(tx: mpsc::UnboundedSender<Vec<u8>>) {
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut buffer = [0u8; 1024];
        loop {
            match stdin.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buffer[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("stdin read error: {}", e);
                    break;
                }
            }
        }
    });
}

fn save(store: &LayoutStore, session: &mut SessionController) {
    let state = session.get_persistable_state();
    match store.save_panel(&state) {
        Ok(()) => debug!("Layout saved to {:?}", store.path()),
        Err(e) => error!("Failed to save layout: {:#}", e),
    }
}

fn initial_state(store: &LayoutStore, config: &Config) -> PanelState {
    let restored = match store.load() {
        Ok(layout) => layout.terminal_panels().into_iter().next(),
        Err(e) => {
            warn!("Ignoring unreadable layout: {:#}", e);
            None
        }
    };
    restored.unwrap_or_else(|| {
        PanelState::new(
            config.shell.resolved_executable(),
            config.shell.cwd.clone(),
            config.shell.args.clone(),
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting ShellPane");

    let export_html = std::env::args().any(|arg| arg == "--export-html");

    let config = Config::load()?;
    info!("Configuration loaded");

    let store = LayoutStore::open_default()?;
    let state = initial_state(&store, &config);
    info!("Opening {}", state.display_name());

    let (host, mut events) = EventSender::channel();
    let mut session = SessionController::new(config, Arc::new(NativePtyProvider), Arc::new(host));
    if !session.attach(&state.to_value()) {
        anyhow::bail!("Failed to attach terminal session");
    }

    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    spawn_stdin_reader(input_tx);

    loop {
        tokio::select! {
            Some(event) = events.recv() => match event {
                HostEvent::SaveLayout => save(&store, &mut session),
                HostEvent::ClosePanel => {
                    save(&store, &mut session);
                    break;
                }
                HostEvent::Notice(notice) => {
                    if notice.is_persistent() {
                        warn!("{}", notice);
                    } else {
                        info!("{}", notice);
                    }
                }
            },
            Some(data) = input_rx.recv() => session.send_input(data),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                save(&store, &mut session);
                break;
            }
        }
    }

    session.close();

    // Notices raised while closing
    while let Ok(event) = events.try_recv() {
        if let HostEvent::Notice(notice) = event {
            info!("{}", notice);
        }
    }

    for line in session.buffer().lock().visible_texts() {
        println!("{}", line);
    }

    if export_html {
        let path = store.path().with_file_name(session.export_file_name());
        std::fs::write(&path, session.export_html())
            .with_context(|| format!("Failed to write HTML export: {:?}", path))?;
        info!("Exported buffer to {:?}", path);
    }

    Ok(())
}
