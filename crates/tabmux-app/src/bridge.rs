//! The command loop: reads JSON lines from stdin and dispatches them.
//!
//! Replies and session events share one outbound queue (see
//! [`crate::event_pump`]). End of input is treated as the window closing
//! followed by quit.

use std::io::BufRead;
use std::sync::Arc;

use tabmux_pty::ShutdownReport;
use tokio::sync::mpsc;

use crate::commands::{history, settings, tabs, terminal};
use crate::ipc::{self, Command, Event};
use crate::state::AppState;
use crate::tabs::CreateTabOptions;

const STDIN_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Read stdin on a dedicated OS thread. Stdin reads block and cannot be
/// cancelled, so the thread is left detached when the loop quits.
pub fn spawn_stdin_reader() -> std::io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(STDIN_QUEUE);
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("stdin read failed: {e}");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

/// Run until `quit` or end of input, then tear every session down.
pub async fn run(state: Arc<AppState>, mut lines: mpsc::Receiver<String>) -> ShutdownReport {
    loop {
        let Some(line) = lines.recv().await else {
            log::info!("input closed");
            window_closed(&state, None);
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match ipc::parse_command(line) {
            Ok(command) => command,
            Err(e) => {
                log::warn!("ignoring malformed command: {e}");
                state.emit(Event::Error {
                    message: format!("Invalid command: {e}"),
                });
                continue;
            }
        };
        if dispatch(&state, command) == Flow::Quit {
            break;
        }
    }

    quit(&state).await
}

/// Handle one command, emitting its reply if it has one.
pub fn dispatch(state: &Arc<AppState>, command: Command) -> Flow {
    let reply: Result<Option<Event>, String> = match command {
        Command::Create { id, cwd } => Ok(Some(terminal::create(state, &id, &cwd))),
        Command::Input { id, data } => {
            terminal::input(state, &id, &data);
            Ok(None)
        }
        Command::Resize { id, cols, rows } => {
            terminal::resize(state, &id, cols, rows);
            Ok(None)
        }
        Command::Close { id } => {
            terminal::close(state, &id);
            Ok(None)
        }
        Command::OpenTab {
            path,
            name,
            resume,
            skip_history,
        } => {
            let options = CreateTabOptions {
                name,
                resume,
                skip_history,
            };
            Ok(Some(tabs::open(state, &path, options)))
        }
        Command::CloseTab { id } => Ok(Some(tabs::close(state, &id))),
        Command::ActivateTab { id } => Ok(Some(tabs::activate(state, &id))),
        Command::NextTab => Ok(Some(tabs::next(state))),
        Command::PrevTab => Ok(Some(tabs::prev(state))),
        Command::SwitchTab { index } => Ok(Some(tabs::switch(state, index))),
        Command::CloseAllTabs => Ok(Some(tabs::close_all(state))),
        Command::ListTabs => Ok(Some(tabs::list(state))),
        Command::HistoryGet => history::get(state).map(Some),
        Command::HistoryUpdate { id, title } => history::update(state, &id, &title).map(Some),
        Command::HistoryClear => history::clear(state).map(Some),
        Command::SettingsGet | Command::IsFirstTime => settings::get(state).map(Some),
        Command::SettingsSet { settings: patch } => settings::set(state, &patch).map(Some),
        Command::WindowClosed { bounds } => {
            window_closed(state, bounds);
            Ok(None)
        }
        Command::Quit => return Flow::Quit,
    };

    match reply {
        Ok(Some(event)) => state.emit(event),
        Ok(None) => {}
        Err(message) => {
            log::warn!("{message}");
            state.emit(Event::Error { message });
        }
    }
    Flow::Continue
}

fn window_closed(state: &AppState, bounds: Option<tabmux_db::WindowBounds>) {
    if state.is_quitting() {
        return;
    }
    if let Some(bounds) = bounds {
        if let Err(e) = settings::save_window_bounds(state, bounds) {
            log::warn!("{e}");
        }
    }
    state.close_window();
    log::info!("window closed, {} sessions detached", state.manager.len());
}

/// Invalidate every target, then hang up all sessions and kill whatever
/// outlives the grace period.
async fn quit(state: &Arc<AppState>) -> ShutdownReport {
    if !state.begin_quit() {
        return ShutdownReport::default();
    }
    log::info!("quitting");
    state.close_window();

    let manager = Arc::clone(&state.manager);
    let grace = state.config.grace_period();
    let report = match tokio::task::spawn_blocking(move || manager.shutdown(grace)).await {
        Ok(report) => report,
        Err(e) => {
            log::error!("session shutdown failed: {e}");
            ShutdownReport::default()
        }
    };

    // Sessions are gone already; this only empties the tab list.
    let mut tabs = state.tabs.lock();
    if !tabs.is_empty() {
        log::debug!("dropping {} tabs", tabs.len());
        tabs.close_all_tabs();
    }
    drop(tabs);
    state.forget_all_titles();
    report
}
