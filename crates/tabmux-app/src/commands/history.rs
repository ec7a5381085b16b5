//! History commands: the list of recently opened folders.

use crate::ipc::Event;
use crate::state::AppState;

pub fn get(state: &AppState) -> Result<Event, String> {
    let items = tabmux_db::history::list(&state.db.lock())
        .map_err(|e| format!("Failed to load history: {e}"))?;
    Ok(Event::History { items })
}

/// Rename a history entry. Unknown ids are ignored.
pub fn update(state: &AppState, id: &str, title: &str) -> Result<Event, String> {
    tabmux_db::history::update_title(&state.db.lock(), id, title)
        .map_err(|e| format!("Failed to update history: {e}"))?;
    get(state)
}

pub fn clear(state: &AppState) -> Result<Event, String> {
    tabmux_db::history::clear(&state.db.lock())
        .map_err(|e| format!("Failed to clear history: {e}"))?;
    Ok(Event::History { items: Vec::new() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::test_support::state_with;
    use tabmux_pty::testing::FakeSpawner;

    fn items(event: Event) -> Vec<tabmux_db::HistoryItem> {
        match event {
            Event::History { items } => items,
            other => panic!("expected history, got {other:?}"),
        }
    }

    #[test]
    fn test_update_and_clear() {
        let (state, _rx) = state_with(&FakeSpawner::new(), AppConfig::default());
        let item = tabmux_db::history::add(&state.db.lock(), "/work/repo").unwrap();

        let listed = items(update(&state, &item.id, "new title").unwrap());
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "new title");

        // Unknown ids leave the list alone.
        assert_eq!(items(update(&state, "missing", "x").unwrap()), listed);

        assert!(items(clear(&state).unwrap()).is_empty());
        assert!(items(get(&state).unwrap()).is_empty());
    }
}
