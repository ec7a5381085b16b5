//! Writes outbound events to stdout, one JSON object per line.
//!
//! Session output arrives from the PTY I/O threads and command replies from
//! the bridge. Both go through one queue, so lines are never interleaved and
//! each session's events keep their order.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::ipc::Event;

/// Most events taken off the queue per write.
const MAX_BATCH: usize = 256;

/// Start the pump. It runs until every sender is dropped or the writer
/// fails, and hands the writer back when done.
///
/// Whatever has piled up since the last write goes out in one batch, with
/// adjacent output chunks of a session merged into one line.
pub fn start_event_pump<W>(mut events: mpsc::UnboundedReceiver<Event>, mut out: W) -> JoinHandle<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(first) = events.recv().await {
            let mut batch = vec![first];
            while batch.len() < MAX_BATCH {
                match events.try_recv() {
                    Ok(event) => batch.push(event),
                    Err(_) => break,
                }
            }

            let mut lines = String::new();
            for event in coalesce(batch) {
                match serde_json::to_string(&event) {
                    Ok(line) => {
                        lines.push_str(&line);
                        lines.push('\n');
                    }
                    Err(e) => log::error!("failed to encode event: {e}"),
                }
            }

            if let Err(e) = out.write_all(lines.as_bytes()).await {
                log::error!("event stream closed: {e}");
                break;
            }
            if let Err(e) = out.flush().await {
                log::error!("event stream closed: {e}");
                break;
            }
        }
        out
    })
}

/// Merge adjacent output chunks of the same session. Order is kept.
fn coalesce(events: Vec<Event>) -> Vec<Event> {
    let mut merged: Vec<Event> = Vec::with_capacity(events.len());
    for event in events {
        if let (Some(Event::Output { id: last_id, data: last_data }), Event::Output { id, data }) =
            (merged.last_mut(), &event)
        {
            if last_id == id {
                last_data.push_str(data);
                continue;
            }
        }
        merged.push(event);
    }
    merged
}
