//! Progress notifications
//!
//! Long-running stages (upload, acquisition, resolution) report progress as
//! explicit `{stage, message}` events pushed into an optional channel; no
//! surrounding event loop is assumed. Every event is also logged, so headless
//! runs see progress without wiring a receiver.

use crossbeam_channel::Sender;
use log::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub stage: u32,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct Reporter {
    tx: Option<Sender<ProgressEvent>>,
}

impl Reporter {
    /// Logging-only reporter.
    #[must_use]
    pub fn new() -> Self {
        Self { tx: None }
    }

    /// Reporter that additionally pushes events into `tx`. A full or
    /// disconnected receiver never blocks or fails the sender.
    #[must_use]
    pub fn with_channel(tx: Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn advance(&self, stage: u32, message: &str) {
        info!("[{stage}] {message}");
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(ProgressEvent { stage, message: message.to_string() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let reporter = Reporter::with_channel(tx);
        reporter.advance(0, "Uploading binary");
        reporter.advance(1, "Collecting samples");
        assert_eq!(rx.recv().unwrap(), ProgressEvent { stage: 0, message: "Uploading binary".into() });
        assert_eq!(rx.recv().unwrap().stage, 1);
    }

    #[test]
    fn dropped_receiver_is_harmless() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        drop(rx);
        Reporter::with_channel(tx).advance(0, "still fine");
    }
}
