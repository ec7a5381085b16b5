//! Settings commands.

use tabmux_db::{Settings, SettingsPatch, WindowBounds};

use crate::ipc::Event;
use crate::state::AppState;

fn settings_event(settings: Settings) -> Event {
    let first_time = settings.is_first_time();
    Event::Settings {
        settings,
        first_time,
    }
}

pub fn get(state: &AppState) -> Result<Event, String> {
    let settings = tabmux_db::settings::load(&state.db.lock())
        .map_err(|e| format!("Failed to load settings: {e}"))?;
    Ok(settings_event(settings))
}

/// Merge a partial update into the stored settings.
pub fn set(state: &AppState, patch: &SettingsPatch) -> Result<Event, String> {
    let settings = tabmux_db::settings::save(&state.db.lock(), patch)
        .map_err(|e| format!("Failed to save settings: {e}"))?;
    Ok(settings_event(settings))
}

pub fn save_window_bounds(state: &AppState, bounds: WindowBounds) -> Result<(), String> {
    let patch = SettingsPatch {
        window_bounds: Some(bounds),
        ..SettingsPatch::default()
    };
    tabmux_db::settings::save(&state.db.lock(), &patch)
        .map(|_| ())
        .map_err(|e| format!("Failed to save window bounds: {e}"))
}
