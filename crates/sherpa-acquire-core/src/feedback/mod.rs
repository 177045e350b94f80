//! C5 Feedback Bus: a single dispatch path for [`FeedbackEvent`]s that
//! accepts either a plain closure or a typed handler object, so callers
//! aren't forced to implement a trait just to log events to stdout.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::domain::feedback::FeedbackEvent;

/// Anything that can receive feedback events.
///
/// A blanket impl below covers `Fn(FeedbackEvent) + Send + Sync` closures,
/// so most callers never need to name this trait directly.
pub trait FeedbackSink: Send + Sync {
    fn handle(&self, event: FeedbackEvent);
}

impl<F> FeedbackSink for F
where
    F: Fn(FeedbackEvent) + Send + Sync,
{
    fn handle(&self, event: FeedbackEvent) {
        self(event);
    }
}

/// A sink that drops every event. Used as the default when a caller hasn't
/// wired up feedback, so components never need to special-case "no sink".
pub struct NullSink;

impl FeedbackSink for NullSink {
    fn handle(&self, _event: FeedbackEvent) {}
}

/// Fans a single [`FeedbackEvent`] stream out to an unbounded channel,
/// decoupling the (often synchronous, often hot) call site that raises an
/// event from whatever asynchronously drains it (an SSE handler, a GUI
/// event bridge, a log sink).
#[derive(Clone)]
pub struct DeliveryContext {
    tx: mpsc::UnboundedSender<FeedbackEvent>,
}

impl DeliveryContext {
    /// Create a new delivery context and the receiver that drains it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FeedbackEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event. Never blocks; if the receiving end has been dropped
    /// the event is silently discarded, since by then nothing is listening.
    pub fn emit(&self, event: FeedbackEvent) {
        let _ = self.tx.send(event);
    }
}

/// Bridges a [`DeliveryContext`]'s receiver to an arbitrary [`FeedbackSink`],
/// by spawning a task that drains the channel and calls `sink.handle` for
/// each event. Returns the task's `JoinHandle` so callers can await a clean
/// shutdown once they drop the paired `DeliveryContext`.
pub fn spawn_sink_bridge(
    mut rx: mpsc::UnboundedReceiver<FeedbackEvent>,
    sink: Arc<dyn FeedbackSink>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            sink.handle(event);
        }
    })
}
