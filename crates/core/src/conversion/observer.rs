//! Progress and log delivery to the caller.

use tokio::sync::mpsc;

/// Receives progress and log lines from a conversion.
///
/// Both methods are called from the conversion's own task, in emission
/// order. Implementations must not block.
pub trait ConversionObserver: Send + Sync {
    /// Progress ratio, always within `[0, 1]` but not necessarily increasing.
    fn on_progress(&self, ratio: f64);

    /// One human-readable log line.
    fn on_log(&self, line: &str);
}

/// An event forwarded by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionEvent {
    Progress(f64),
    Log(String),
}

/// Observer that forwards every event into an unbounded channel.
///
/// Events sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ConversionEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConversionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ConversionObserver for ChannelObserver {
    fn on_progress(&self, ratio: f64) {
        let _ = self.tx.send(ConversionEvent::Progress(ratio));
    }

    fn on_log(&self, line: &str) {
        let _ = self.tx.send(ConversionEvent::Log(line.to_string()));
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {
    fn on_progress(&self, _ratio: f64) {}

    fn on_log(&self, _line: &str) {}
}
