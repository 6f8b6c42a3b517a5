//! Velocity/time history fan-out and CSV rendering.
//!
//! The estimator appends one row per window; the reporter task drains at the
//! lowest priority and renders delimited text on demand. None of this is on
//! the critical path: the history queue sheds its oldest rows when the
//! reporter is starved.

use crate::channel::{self, Consumer, Mailbox, Producer};

/// Rows retained while the reporter is starved.
pub const HISTORY_CAPACITY: usize = 1000;
/// Rows rendered per report.
pub const CSV_MAX_ROWS: usize = 200;
pub const CSV_HEADER: &str = "Time (s), Velocity R (m/s), Velocity L (m/s)";

/// One velocity history row: window index plus both channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Row {
    pub window: u64,
    pub right: f32,
    pub left: f32,
}

/// Create the history queue at its standard capacity.
pub fn history() -> (Producer<Row>, Consumer<Row>) {
    channel::bounded(HISTORY_CAPACITY)
}

/// Low-priority consumer of the history stream. Renders a CSV report when
/// the `send_data` flag is raised, consuming the rendered rows like the
/// original queue-backed page did.
pub struct Reporter {
    rx: Consumer<Row>,
    send_data: Mailbox<bool>,
    rows: Vec<Row>,
    /// Seconds per window, for the time column.
    window_s: f32,
}

impl Reporter {
    pub fn new(rx: Consumer<Row>, send_data: Mailbox<bool>, window_s: f32) -> Self {
        Self {
            rx,
            send_data,
            rows: Vec::new(),
            window_s,
        }
    }

    /// One reporter cycle: drain the queue, and render if data was requested.
    pub fn poll(&mut self) -> Option<String> {
        self.rows.extend(self.rx.drain());
        // Bound local retention the same way the queue bounds its backlog.
        if self.rows.len() > HISTORY_CAPACITY {
            let excess = self.rows.len() - HISTORY_CAPACITY;
            self.rows.drain(..excess);
        }
        if self.send_data.get() {
            self.send_data.put(false);
            Some(self.render())
        } else {
            None
        }
    }

    /// Render and consume up to [`CSV_MAX_ROWS`] of the oldest retained rows.
    pub fn render(&mut self) -> String {
        let take = self.rows.len().min(CSV_MAX_ROWS);
        let mut out = String::from(CSV_HEADER);
        out.push('\n');
        for row in self.rows.drain(..take) {
            let t = row.window as f32 * self.window_s;
            out.push_str(&format!("{t:.1},{:.3},{:.3}\n", row.right, row.left));
        }
        out
    }

    pub fn pending_rows(&self) -> usize {
        self.rows.len()
    }
}
