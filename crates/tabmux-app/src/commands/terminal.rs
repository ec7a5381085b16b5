//! Session commands: create, write to, resize and close a PTY session.
//!
//! Failures never surface as errors on the wire: a failed create replies
//! with a null result, everything else is logged and dropped.

use std::sync::Arc;

use crate::ipc::Event;
use crate::state::AppState;

/// Spawn a session `id` in `cwd`, delivering to the current window.
pub fn create(state: &AppState, id: &str, cwd: &str) -> Event {
    let window = state.window();
    let result = match state.manager.create_session(id, cwd, Some(&window)) {
        Ok(info) => Some(info.into()),
        Err(e) => {
            log::warn!("failed to create session {id}: {e}");
            None
        }
    };
    Event::Created {
        id: id.to_string(),
        result,
    }
}

/// Forward user input, and let the tab's title capture see it.
pub fn input(state: &AppState, id: &str, data: &str) {
    if state.is_quitting() {
        return;
    }
    state.manager.write_input(id, data.as_bytes());

    if let Some(title) = state.capture_title(id, data) {
        log::debug!("tab {id} titled {title:?}");
        state.tabs.lock().update_tab_title(id, &title);
    }
}

pub fn resize(state: &AppState, id: &str, cols: u16, rows: u16) {
    if state.is_quitting() {
        return;
    }
    state.manager.resize(id, cols, rows);
}

pub fn close(state: &AppState, id: &str) {
    state.manager.close_session(id);
    state.forget_title(id);
}

/// Type the assistant command into a new tab once its shell had time to
/// start, then arm title capture.
pub fn schedule_launch(state: &Arc<AppState>, tab_id: String, resume: bool) {
    let Some(line) = state.config.launch_line(resume) else {
        return;
    };
    let launch_delay = state.config.launch_delay();
    let ready_delay = state.config.ready_delay();
    let state = Arc::downgrade(state);

    tokio::spawn(async move {
        tokio::time::sleep(launch_delay).await;
        {
            let Some(state) = state.upgrade() else {
                return;
            };
            if state.is_quitting() || !state.manager.registry().contains(&tab_id) {
                return;
            }
            log::debug!("launching assistant in tab {tab_id}");
            state.manager.write_input(&tab_id, line.as_bytes());
        }
        if resume {
            return;
        }

        tokio::time::sleep(ready_delay).await;
        if let Some(state) = state.upgrade() {
            state.arm_title(&tab_id);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::test_support::{drain, state_with};
    use crate::title::TitleCapture;
    use std::time::Duration;
    use tabmux_pty::testing::FakeSpawner;

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[test]
    fn test_create_replies_with_pid() {
        let spawner = FakeSpawner::new();
        let (state, _rx) = state_with(&spawner, AppConfig::default());

        let reply = create(&state, "t1", "/tmp");

        let pid = spawner.last().unwrap().pid();
        assert_eq!(
            reply,
            Event::Created {
                id: "t1".to_string(),
                result: Some(crate::ipc::CreatedSession {
                    id: "t1".to_string(),
                    pid
                }),
            }
        );
    }

    #[test]
    fn test_failed_create_replies_null() {
        let spawner = FakeSpawner::new();
        let (state, _rx) = state_with(&spawner, AppConfig::default());

        create(&state, "t1", "/tmp");
        let duplicate = create(&state, "t1", "/tmp");
        assert_eq!(
            duplicate,
            Event::Created {
                id: "t1".to_string(),
                result: None
            }
        );

        spawner.fail_next_spawn("boom");
        assert!(matches!(
            create(&state, "t2", "/tmp"),
            Event::Created { result: None, .. }
        ));
    }

    #[test]
    fn test_output_reaches_event_queue() {
        let spawner = FakeSpawner::new();
        let (state, mut rx) = state_with(&spawner, AppConfig::default());

        create(&state, "t1", "/tmp");
        let process = spawner.last().unwrap();
        process.emit_output("prompt$ ");
        process.exit(0);

        assert_eq!(
            drain(&mut rx),
            vec![
                Event::Output {
                    id: "t1".to_string(),
                    data: "prompt$ ".to_string()
                },
                Event::Exit {
                    id: "t1".to_string(),
                    exit_code: 0
                },
            ]
        );
    }

    #[test]
    fn test_input_and_resize_ignored_while_quitting() {
        let spawner = FakeSpawner::new();
        let (state, _rx) = state_with(&spawner, AppConfig::default());
        create(&state, "t1", "/tmp");

        input(&state, "t1", "ls\r");
        state.begin_quit();
        input(&state, "t1", "late");
        resize(&state, "t1", 100, 40);

        let process = spawner.last().unwrap();
        assert_eq!(process.written(), "ls\r");
        assert!(process.resizes().is_empty());
    }

    #[test]
    fn test_close_stops_delivery() {
        let spawner = FakeSpawner::new();
        let (state, mut rx) = state_with(&spawner, AppConfig::default());
        create(&state, "t1", "/tmp");

        close(&state, "t1");
        let process = spawner.last().unwrap();
        process.emit_output("after close");
        process.exit(0);

        assert!(process.was_terminated());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_launch_types_assistant_command() {
        let spawner = FakeSpawner::new();
        let config = AppConfig {
            launch_delay_ms: 0,
            ready_delay_ms: 0,
            ..AppConfig::default()
        };
        let (state, _rx) = state_with(&spawner, config);
        create(&state, "t1", "/tmp");
        state.track_title("t1", TitleCapture::new());

        schedule_launch(&state, "t1".to_string(), false);

        let process = spawner.last().unwrap();
        assert!(wait_for(|| process.written() == "claude\n").await);
        // Title capture is armed once the assistant had time to start.
        assert!(
            wait_for(|| {
                state.capture_title("t1", "q");
                state.capture_title("t1", "\r").is_some()
            })
            .await
        );
    }

    #[tokio::test]
    async fn test_resumed_launch_continues_conversation() {
        let spawner = FakeSpawner::new();
        let config = AppConfig {
            launch_delay_ms: 0,
            ..AppConfig::default()
        };
        let (state, _rx) = state_with(&spawner, config);
        create(&state, "t1", "/tmp");

        schedule_launch(&state, "t1".to_string(), true);

        let process = spawner.last().unwrap();
        assert!(wait_for(|| process.written() == "claude --continue\n").await);
    }

    #[tokio::test]
    async fn test_launch_skipped_for_closed_session() {
        let spawner = FakeSpawner::new();
        let config = AppConfig {
            launch_delay_ms: 20,
            ..AppConfig::default()
        };
        let (state, _rx) = state_with(&spawner, config);
        create(&state, "t1", "/tmp");

        schedule_launch(&state, "t1".to_string(), false);
        close(&state, "t1");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(spawner.last().unwrap().written(), "");
    }
}
