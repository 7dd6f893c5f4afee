use tracing::debug;

use crate::tracker::snapshot::{LiveActivity, Snapshot};

/// Live activity shown as lines in the console.
pub struct TerminalActivity {
    print: bool,
}

impl TerminalActivity {
    pub fn new(print: bool) -> Self {
        Self { print }
    }

    fn show(&self, marker: &str, snapshot: &Snapshot) {
        debug!("Live activity {marker} {snapshot:?}");
        if self.print {
            println!("[{marker}] {}", snapshot.formatted());
        }
    }
}

impl LiveActivity for TerminalActivity {
    fn begin(&mut self, snapshot: &Snapshot) {
        self.show("start", snapshot);
    }

    fn update(&mut self, snapshot: &Snapshot) {
        self.show("live", snapshot);
    }

    fn end(&mut self, snapshot: &Snapshot) {
        self.show("done", snapshot);
    }
}
