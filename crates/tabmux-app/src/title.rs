//! Names a tab's history entry after the first line the user types.

const MAX_TITLE_CHARS: usize = 50;
const TRUNCATED_CHARS: usize = MAX_TITLE_CHARS - 3;

/// Per-tab input watcher. Does nothing until armed, and stops for good once
/// a title has been produced.
#[derive(Debug, Default)]
pub struct TitleCapture {
    armed: bool,
    done: bool,
    buffer: String,
}

impl TitleCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capture that never produces a title (tabs resumed from history
    /// already have one).
    pub fn finished() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }

    pub fn arm(&mut self) {
        if !self.done {
            self.armed = true;
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed && !self.done
    }

    /// Feed one input chunk. Returns the title when this chunk completes it.
    pub fn feed(&mut self, data: &str) -> Option<String> {
        if !self.is_armed() {
            return None;
        }
        match data {
            "\r" | "\n" => {
                let line = std::mem::take(&mut self.buffer);
                let line = line.trim();
                if line.is_empty() {
                    return None;
                }
                self.done = true;
                Some(make_title(line))
            }
            "\x7f" | "\x08" => {
                self.buffer.pop();
                None
            }
            _ => {
                // Control sequences (arrows, escape codes) start below 0x20.
                if data.chars().next().is_some_and(|c| c >= ' ') {
                    self.buffer.push_str(data);
                }
                None
            }
        }
    }
}

/// Collapse whitespace and cap the length at 50 characters.
pub fn make_title(input: &str) -> String {
    let cleaned = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.chars().count() > MAX_TITLE_CHARS {
        let mut title: String = cleaned.chars().take(TRUNCATED_CHARS).collect();
        title.push_str("...");
        title
    } else {
        cleaned
    }
}
