//! Tab commands. Every one of them replies with the full tab list.

use std::sync::Arc;

use crate::commands::terminal;
use crate::ipc::Event;
use crate::state::AppState;
use crate::tabs::CreateTabOptions;
use crate::title::TitleCapture;

pub fn list(state: &AppState) -> Event {
    let tabs = state.tabs.lock();
    Event::Tabs {
        tabs: tabs.tabs().to_vec(),
        active_tab_id: tabs.active_tab().map(|tab| tab.id.clone()),
    }
}

/// Open a tab on `path` and start its session. Emits `created` for the new
/// session before the tab list reply.
pub fn open(state: &Arc<AppState>, path: &str, options: CreateTabOptions) -> Event {
    let tab = state.tabs.lock().create_tab(path, options);
    log::info!("opened tab {} on {}", tab.id, tab.path);

    let capture = if tab.resume || tab.history_id.is_none() {
        TitleCapture::finished()
    } else {
        TitleCapture::new()
    };
    state.track_title(&tab.id, capture);

    let created = terminal::create(state, &tab.id, &tab.path);
    let started = matches!(created, Event::Created { result: Some(_), .. });
    state.emit(created);
    if started {
        terminal::schedule_launch(state, tab.id.clone(), tab.resume);
    }

    list(state)
}

pub fn close(state: &AppState, id: &str) -> Event {
    if state.tabs.lock().close_tab(id) {
        state.forget_title(id);
    }
    list(state)
}

pub fn activate(state: &AppState, id: &str) -> Event {
    state.tabs.lock().set_active_tab(id);
    list(state)
}

pub fn next(state: &AppState) -> Event {
    state.tabs.lock().next_tab();
    list(state)
}

pub fn prev(state: &AppState) -> Event {
    state.tabs.lock().prev_tab();
    list(state)
}

pub fn switch(state: &AppState, index: usize) -> Event {
    state.tabs.lock().switch_to_tab(index);
    list(state)
}

pub fn close_all(state: &AppState) -> Event {
    state.tabs.lock().close_all_tabs();
    state.forget_all_titles();
    list(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::test_support::{drain, state_with};
    use tabmux_pty::testing::FakeSpawner;

    fn quiet_config() -> AppConfig {
        AppConfig {
            assistant_command: None,
            ..AppConfig::default()
        }
    }

    fn tab_ids(event: &Event) -> (Vec<String>, Option<String>) {
        match event {
            Event::Tabs {
                tabs,
                active_tab_id,
            } => (
                tabs.iter().map(|t| t.id.clone()).collect(),
                active_tab_id.clone(),
            ),
            other => panic!("expected tabs, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_then_close_round_trip() {
        let spawner = FakeSpawner::new();
        let (state, mut rx) = state_with(&spawner, quiet_config());

        let reply = open(&state, "/tmp", CreateTabOptions::default());
        let (ids, active) = tab_ids(&reply);
        assert_eq!(ids.len(), 1);
        assert_eq!(active.as_ref(), Some(&ids[0]));

        // The session shares the tab's id.
        let process = spawner.last().unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![Event::Created {
                id: ids[0].clone(),
                result: Some(crate::ipc::CreatedSession {
                    id: ids[0].clone(),
                    pid: process.pid()
                }),
            }]
        );
        assert!(state.manager.registry().contains(&ids[0]));

        let reply = close(&state, &ids[0]);
        assert_eq!(tab_ids(&reply), (Vec::new(), None));
        assert!(process.was_terminated());
        assert!(state.manager.is_empty());
    }

    #[tokio::test]
    async fn test_open_records_history() {
        let spawner = FakeSpawner::new();
        let (state, _rx) = state_with(&spawner, quiet_config());

        open(&state, "/work/alpha", CreateTabOptions::default());
        open(
            &state,
            "/work/beta",
            CreateTabOptions {
                resume: true,
                skip_history: true,
                ..CreateTabOptions::default()
            },
        );

        let items = tabmux_db::history::list(&state.db.lock()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "alpha");
    }

    #[tokio::test]
    async fn test_navigation_replies() {
        let spawner = FakeSpawner::new();
        let (state, _rx) = state_with(&spawner, quiet_config());

        open(&state, "/a", CreateTabOptions::default());
        let (ids, _) = tab_ids(&open(&state, "/b", CreateTabOptions::default()));

        assert_eq!(tab_ids(&next(&state)).1.as_ref(), Some(&ids[0]));
        assert_eq!(tab_ids(&prev(&state)).1.as_ref(), Some(&ids[1]));
        assert_eq!(tab_ids(&switch(&state, 0)).1.as_ref(), Some(&ids[0]));
        assert_eq!(tab_ids(&activate(&state, &ids[1])).1.as_ref(), Some(&ids[1]));

        let reply = close_all(&state);
        assert_eq!(tab_ids(&reply), (Vec::new(), None));
        assert!(spawner.spawned().iter().all(|p| p.was_terminated()));
    }

    #[tokio::test]
    async fn test_first_line_names_history_entry() {
        let spawner = FakeSpawner::new();
        let config = AppConfig {
            launch_delay_ms: 0,
            ready_delay_ms: 0,
            ..AppConfig::default()
        };
        let (state, _rx) = state_with(&spawner, config);

        let (ids, _) = tab_ids(&open(&state, "/work/alpha", CreateTabOptions::default()));
        let id = ids[0].clone();

        let process = spawner.last().unwrap();
        for _ in 0..200 {
            if process.written() == "claude\n" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(process.written(), "claude\n");
        // Let the capture arm after the (zero) ready delay.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        for chunk in ["why ", "is", " CI red", "\r"] {
            terminal::input(&state, &id, chunk);
        }

        let items = tabmux_db::history::list(&state.db.lock()).unwrap();
        assert_eq!(items[0].title, "why is CI red");
    }
}
