//! Handlers for bridge commands, grouped by area.

pub mod history;
pub mod settings;
pub mod tabs;
pub mod terminal;
