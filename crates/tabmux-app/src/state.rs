//! Application state shared between the bridge, commands and background tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tabmux_pty::{DeliveryTarget, SessionManager};
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::ipc::Event;
use crate::tabs::{HistoryRecorder, TabMultiplexer};
use crate::title::TitleCapture;
use crate::window::WindowTarget;

pub type Db = Arc<Mutex<Connection>>;

/// Tab history backed by the settings database.
pub struct DbHistory {
    db: Db,
}

impl DbHistory {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

impl HistoryRecorder for DbHistory {
    fn record(&self, path: &str) -> Option<String> {
        match tabmux_db::history::add(&self.db.lock(), path) {
            Ok(item) => Some(item.id),
            Err(e) => {
                log::warn!("failed to record history for {path}: {e}");
                None
            }
        }
    }

    fn update_title(&self, history_id: &str, title: &str) {
        if let Err(e) = tabmux_db::history::update_title(&self.db.lock(), history_id, title) {
            log::warn!("failed to update history title: {e}");
        }
    }
}

pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub db: Db,
    pub config: AppConfig,
    pub tabs: Mutex<TabMultiplexer>,
    /// Outbound queue drained by the event pump.
    events: mpsc::UnboundedSender<Event>,
    /// The single UI window. `None` after it closed, until a command needs it again.
    window: Mutex<Option<Arc<WindowTarget>>>,
    /// Title capture per tab id.
    titles: Mutex<HashMap<String, TitleCapture>>,
    quitting: AtomicBool,
}

impl AppState {
    pub fn new(
        manager: Arc<SessionManager>,
        conn: Connection,
        config: AppConfig,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let db: Db = Arc::new(Mutex::new(conn));
        let tabs = TabMultiplexer::new(
            manager.clone(),
            Arc::new(DbHistory::new(Arc::clone(&db))),
        );
        Self {
            manager,
            db,
            config,
            tabs: Mutex::new(tabs),
            events,
            window: Mutex::new(None),
            titles: Mutex::new(HashMap::new()),
            quitting: AtomicBool::new(false),
        }
    }

    /// Queue an event for stdout. Dropped silently once the pump is gone.
    pub fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            log::debug!("event pump stopped, dropping event");
        }
    }

    /// The delivery target for new sessions, opening a window if needed.
    pub fn window(&self) -> Arc<dyn DeliveryTarget> {
        let mut window = self.window.lock();
        let target = window.get_or_insert_with(|| {
            log::debug!("window opened");
            WindowTarget::new(self.events.clone())
        });
        target.clone()
    }

    /// Tear down the window. Every session keeps running, but nothing is
    /// delivered to it any more.
    pub fn close_window(&self) {
        if let Some(window) = self.window.lock().take() {
            window.destroy();
        }
        self.manager.invalidate_all_targets();
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting.load(Ordering::SeqCst)
    }

    /// Returns `false` if a quit was already under way.
    pub fn begin_quit(&self) -> bool {
        !self.quitting.swap(true, Ordering::SeqCst)
    }

    pub fn track_title(&self, tab_id: &str, capture: TitleCapture) {
        self.titles.lock().insert(tab_id.to_string(), capture);
    }

    pub fn arm_title(&self, tab_id: &str) {
        if let Some(capture) = self.titles.lock().get_mut(tab_id) {
            capture.arm();
        }
    }

    /// Feed user input for `tab_id` to its title capture.
    pub fn capture_title(&self, tab_id: &str, data: &str) -> Option<String> {
        self.titles.lock().get_mut(tab_id)?.feed(data)
    }

    pub fn forget_title(&self, tab_id: &str) {
        self.titles.lock().remove(tab_id);
    }

    pub fn forget_all_titles(&self) {
        self.titles.lock().clear();
    }
}
