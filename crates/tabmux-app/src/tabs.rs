//! Tab multiplexer: the ordered tab list and which tab is active.
//!
//! Each tab is bound to the session with the same id. Closing a tab closes
//! its session through [`SessionCloser`]; opening one records a history entry
//! through [`HistoryRecorder`].

use std::sync::Arc;

use serde::Serialize;
use tabmux_pty::SessionManager;

/// Closes the session bound to a tab.
pub trait SessionCloser: Send + Sync {
    fn close_session(&self, id: &str);
}

impl SessionCloser for SessionManager {
    fn close_session(&self, id: &str) {
        SessionManager::close_session(self, id);
    }
}

/// Where opened tabs are remembered.
pub trait HistoryRecorder: Send + Sync {
    /// Record that `path` was opened. Returns the history entry id.
    fn record(&self, path: &str) -> Option<String>;

    fn update_title(&self, history_id: &str, title: &str);
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Tab {
    /// Also the id of the bound session.
    pub id: String,
    pub name: String,
    pub path: String,
    pub is_active: bool,
    pub history_id: Option<String>,
    /// Reopened from history: continue the previous conversation.
    pub resume: bool,
}

#[derive(Clone, Debug, Default)]
pub struct CreateTabOptions {
    pub name: Option<String>,
    pub resume: bool,
    pub skip_history: bool,
}

pub struct TabMultiplexer {
    tabs: Vec<Tab>,
    active_tab_id: Option<String>,
    sessions: Arc<dyn SessionCloser>,
    history: Arc<dyn HistoryRecorder>,
}

impl TabMultiplexer {
    pub fn new(sessions: Arc<dyn SessionCloser>, history: Arc<dyn HistoryRecorder>) -> Self {
        Self {
            tabs: Vec::new(),
            active_tab_id: None,
            sessions,
            history,
        }
    }

    /// Open a new tab for `path` and make it active.
    ///
    /// The session itself is created by the caller, using the returned tab's id.
    pub fn create_tab(&mut self, path: &str, options: CreateTabOptions) -> Tab {
        let id = uuid::Uuid::new_v4().to_string();
        let name = options
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| tabmux_db::history::display_name(path));
        let history_id = if options.skip_history {
            None
        } else {
            self.history.record(path)
        };

        for tab in &mut self.tabs {
            tab.is_active = false;
        }
        let tab = Tab {
            id: id.clone(),
            name,
            path: path.to_string(),
            is_active: true,
            history_id,
            resume: options.resume,
        };
        self.tabs.push(tab.clone());
        self.active_tab_id = Some(id);
        tab
    }

    /// Close tab `id` and its session. Returns `false` for an unknown id.
    ///
    /// Closing the active tab activates the one that took its place, or the
    /// new last tab.
    pub fn close_tab(&mut self, id: &str) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        self.sessions.close_session(id);
        self.tabs.remove(index);

        if self.active_tab_id.as_deref() == Some(id) {
            if self.tabs.is_empty() {
                self.active_tab_id = None;
            } else {
                let next = index.min(self.tabs.len() - 1);
                let next_id = self.tabs[next].id.clone();
                self.activate(&next_id);
            }
        }
        true
    }

    /// Unknown ids are ignored.
    pub fn set_active_tab(&mut self, id: &str) {
        if self.index_of(id).is_some() {
            self.activate(id);
        }
    }

    pub fn next_tab(&mut self) {
        if self.tabs.len() < 2 {
            return;
        }
        let next = match self.active_index() {
            Some(index) => (index + 1) % self.tabs.len(),
            None => 0,
        };
        let next_id = self.tabs[next].id.clone();
        self.activate(&next_id);
    }

    pub fn prev_tab(&mut self) {
        if self.tabs.len() < 2 {
            return;
        }
        let len = self.tabs.len();
        let prev = match self.active_index() {
            Some(index) => (index + len - 1) % len,
            None => len - 1,
        };
        let prev_id = self.tabs[prev].id.clone();
        self.activate(&prev_id);
    }

    /// Activate the tab at `index`. Out-of-range indexes are ignored.
    pub fn switch_to_tab(&mut self, index: usize) {
        if let Some(tab) = self.tabs.get(index) {
            let id = tab.id.clone();
            self.activate(&id);
        }
    }

    pub fn close_all_tabs(&mut self) {
        for tab in &self.tabs {
            self.sessions.close_session(&tab.id);
        }
        self.tabs.clear();
        self.active_tab_id = None;
    }

    /// Name the history entry behind tab `id`. Returns `false` if the tab is
    /// unknown or has no history entry.
    pub fn update_tab_title(&self, id: &str, title: &str) -> bool {
        let Some(history_id) = self.get(id).and_then(|tab| tab.history_id.as_deref()) else {
            return false;
        };
        self.history.update_title(history_id, title);
        true
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn get(&self, id: &str) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.id == id)
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.active_tab_id().and_then(|id| self.get(id))
    }

    pub fn active_tab_id(&self) -> Option<&str> {
        self.active_tab_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.id == id)
    }

    fn active_index(&self) -> Option<usize> {
        self.active_tab_id.as_deref().and_then(|id| self.index_of(id))
    }

    fn activate(&mut self, id: &str) {
        for tab in &mut self.tabs {
            tab.is_active = tab.id == id;
        }
        self.active_tab_id = Some(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingCloser {
        closed: Mutex<Vec<String>>,
    }

    impl SessionCloser for RecordingCloser {
        fn close_session(&self, id: &str) {
            self.closed.lock().push(id.to_string());
        }
    }

    #[derive(Default)]
    struct MemoryHistory {
        paths: Mutex<Vec<String>>,
        titles: Mutex<Vec<(String, String)>>,
    }

    impl HistoryRecorder for MemoryHistory {
        fn record(&self, path: &str) -> Option<String> {
            let mut paths = self.paths.lock();
            paths.push(path.to_string());
            Some(format!("h{}", paths.len()))
        }

        fn update_title(&self, history_id: &str, title: &str) {
            self.titles
                .lock()
                .push((history_id.to_string(), title.to_string()));
        }
    }

    fn multiplexer() -> (TabMultiplexer, Arc<RecordingCloser>, Arc<MemoryHistory>) {
        let closer = Arc::new(RecordingCloser::default());
        let history = Arc::new(MemoryHistory::default());
        let tabs = TabMultiplexer::new(closer.clone(), history.clone());
        (tabs, closer, history)
    }

    fn open(tabs: &mut TabMultiplexer, path: &str) -> String {
        tabs.create_tab(path, CreateTabOptions::default()).id
    }

    fn assert_single_active(tabs: &TabMultiplexer) {
        let active: Vec<&Tab> = tabs.tabs().iter().filter(|t| t.is_active).collect();
        if tabs.is_empty() {
            assert!(active.is_empty());
            assert_eq!(tabs.active_tab_id(), None);
        } else {
            assert_eq!(active.len(), 1);
            assert_eq!(tabs.active_tab_id(), Some(active[0].id.as_str()));
        }
    }

    #[test]
    fn test_create_tab_activates_and_records_history() {
        let (mut tabs, _, history) = multiplexer();
        let first = open(&mut tabs, "/work/alpha");
        let second = tabs.create_tab(
            "/work/beta",
            CreateTabOptions {
                name: Some("Beta".to_string()),
                ..CreateTabOptions::default()
            },
        );

        assert_eq!(tabs.len(), 2);
        assert_eq!(tabs.get(&first).unwrap().name, "alpha");
        assert_eq!(second.name, "Beta");
        assert_eq!(second.history_id.as_deref(), Some("h2"));
        assert_eq!(tabs.active_tab().unwrap().id, second.id);
        assert_single_active(&tabs);
        assert_eq!(*history.paths.lock(), vec!["/work/alpha", "/work/beta"]);
    }

    #[test]
    fn test_skip_history() {
        let (mut tabs, _, history) = multiplexer();
        let tab = tabs.create_tab(
            "/work/alpha",
            CreateTabOptions {
                resume: true,
                skip_history: true,
                ..CreateTabOptions::default()
            },
        );
        assert_eq!(tab.history_id, None);
        assert!(tab.resume);
        assert!(history.paths.lock().is_empty());
    }

    #[test]
    fn test_tab_ids_are_unique() {
        let (mut tabs, _, _) = multiplexer();
        let a = open(&mut tabs, "/same");
        let b = open(&mut tabs, "/same");
        assert_ne!(a, b);
    }

    #[test]
    fn test_close_active_tab_activates_same_index() {
        let (mut tabs, closer, _) = multiplexer();
        let a = open(&mut tabs, "/a");
        let b = open(&mut tabs, "/b");
        let c = open(&mut tabs, "/c");

        tabs.set_active_tab(&b);
        assert!(tabs.close_tab(&b));

        assert_eq!(tabs.active_tab_id(), Some(c.as_str()));
        assert_eq!(*closer.closed.lock(), vec![b]);
        assert_single_active(&tabs);

        // Closing the last tab falls back to the new last one.
        assert!(tabs.close_tab(&c));
        assert_eq!(tabs.active_tab_id(), Some(a.as_str()));

        assert!(tabs.close_tab(&a));
        assert!(tabs.is_empty());
        assert_single_active(&tabs);
    }

    #[test]
    fn test_close_inactive_tab_keeps_selection() {
        let (mut tabs, _, _) = multiplexer();
        let a = open(&mut tabs, "/a");
        let b = open(&mut tabs, "/b");

        assert!(tabs.close_tab(&a));
        assert_eq!(tabs.active_tab_id(), Some(b.as_str()));
        assert_single_active(&tabs);
    }

    #[test]
    fn test_close_unknown_tab_is_noop() {
        let (mut tabs, closer, _) = multiplexer();
        open(&mut tabs, "/a");
        assert!(!tabs.close_tab("missing"));
        assert_eq!(tabs.len(), 1);
        assert!(closer.closed.lock().is_empty());
    }

    #[test]
    fn test_next_prev_wrap_around() {
        let (mut tabs, _, _) = multiplexer();
        let a = open(&mut tabs, "/a");
        let b = open(&mut tabs, "/b");
        let c = open(&mut tabs, "/c");

        tabs.next_tab();
        assert_eq!(tabs.active_tab_id(), Some(a.as_str()));
        tabs.next_tab();
        assert_eq!(tabs.active_tab_id(), Some(b.as_str()));
        tabs.prev_tab();
        tabs.prev_tab();
        assert_eq!(tabs.active_tab_id(), Some(c.as_str()));
        assert_single_active(&tabs);
    }

    #[test]
    fn test_navigation_with_one_tab_is_noop() {
        let (mut tabs, _, _) = multiplexer();
        tabs.next_tab();
        tabs.prev_tab();
        assert_eq!(tabs.active_tab_id(), None);

        let a = open(&mut tabs, "/a");
        tabs.next_tab();
        tabs.prev_tab();
        assert_eq!(tabs.active_tab_id(), Some(a.as_str()));
    }

    #[test]
    fn test_switch_and_set_active_ignore_bad_targets() {
        let (mut tabs, _, _) = multiplexer();
        let a = open(&mut tabs, "/a");
        let b = open(&mut tabs, "/b");

        tabs.switch_to_tab(0);
        assert_eq!(tabs.active_tab_id(), Some(a.as_str()));
        tabs.switch_to_tab(5);
        assert_eq!(tabs.active_tab_id(), Some(a.as_str()));
        tabs.set_active_tab("missing");
        assert_eq!(tabs.active_tab_id(), Some(a.as_str()));
        tabs.set_active_tab(&b);
        assert_eq!(tabs.active_tab_id(), Some(b.as_str()));
        assert_single_active(&tabs);
    }

    #[test]
    fn test_close_all_tabs() {
        let (mut tabs, closer, _) = multiplexer();
        let a = open(&mut tabs, "/a");
        let b = open(&mut tabs, "/b");

        tabs.close_all_tabs();

        assert!(tabs.is_empty());
        assert_eq!(tabs.active_tab_id(), None);
        assert_eq!(*closer.closed.lock(), vec![a, b]);
    }

    #[test]
    fn test_update_tab_title_uses_history_id() {
        let (mut tabs, _, history) = multiplexer();
        let tab = tabs.create_tab("/a", CreateTabOptions::default());
        let untracked = tabs.create_tab(
            "/b",
            CreateTabOptions {
                skip_history: true,
                ..CreateTabOptions::default()
            },
        );

        assert!(tabs.update_tab_title(&tab.id, "refactor parser"));
        assert!(!tabs.update_tab_title(&untracked.id, "ignored"));
        assert!(!tabs.update_tab_title("missing", "ignored"));
        assert_eq!(
            *history.titles.lock(),
            vec![("h1".to_string(), "refactor parser".to_string())]
        );
    }
}
