//! Wire types for the JSON-lines protocol on stdin/stdout.
//!
//! Every message is one JSON object per line, tagged by `type`.

use serde::{Deserialize, Serialize};
use tabmux_db::{HistoryItem, Settings, SettingsPatch, WindowBounds};
use tabmux_pty::{SessionEvent, SessionInfo};

use crate::tabs::Tab;

/// Commands read from stdin.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Create {
        id: String,
        cwd: String,
    },
    Input {
        id: String,
        data: String,
    },
    Resize {
        id: String,
        cols: u16,
        rows: u16,
    },
    Close {
        id: String,
    },
    OpenTab {
        path: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        resume: bool,
        #[serde(default)]
        skip_history: bool,
    },
    CloseTab {
        id: String,
    },
    ActivateTab {
        id: String,
    },
    NextTab,
    PrevTab,
    SwitchTab {
        index: usize,
    },
    CloseAllTabs,
    ListTabs,
    HistoryGet,
    HistoryUpdate {
        id: String,
        title: String,
    },
    HistoryClear,
    SettingsGet,
    SettingsSet {
        settings: SettingsPatch,
    },
    IsFirstTime,
    /// The window went away. Sessions keep running but get no target.
    WindowClosed {
        #[serde(default)]
        bounds: Option<WindowBounds>,
    },
    Quit,
}

/// The `result` of a `created` reply.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct CreatedSession {
    pub id: String,
    pub pid: u32,
}

impl From<SessionInfo> for CreatedSession {
    fn from(info: SessionInfo) -> Self {
        Self {
            id: info.id,
            pid: info.pid,
        }
    }
}

/// Events and replies written to stdout.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Reply to `create` and `open_tab`. `result` is null when creation failed.
    Created {
        id: String,
        result: Option<CreatedSession>,
    },
    Output {
        id: String,
        data: String,
    },
    Exit {
        id: String,
        exit_code: u32,
    },
    Tabs {
        tabs: Vec<Tab>,
        active_tab_id: Option<String>,
    },
    History {
        items: Vec<HistoryItem>,
    },
    Settings {
        settings: Settings,
        first_time: bool,
    },
    Error {
        message: String,
    },
}

impl From<SessionEvent> for Event {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Output { id, data } => Event::Output { id, data },
            SessionEvent::Exit { id, exit_code } => Event::Exit { id, exit_code },
        }
    }
}

pub fn parse_command(line: &str) -> Result<Command, serde_json::Error> {
    serde_json::from_str(line)
}
