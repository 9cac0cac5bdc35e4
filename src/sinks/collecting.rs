use crate::engine::events::ExecutionEvent;
use crate::engine::sink::EventSink;

/// In-memory sink holding the events of a single pipeline run.
///
/// Returned to HTTP callers alongside the summary.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Vec<ExecutionEvent>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Borrow all collected events.
    #[allow(dead_code)]
    pub fn events(&self) -> &[ExecutionEvent] {
        &self.events
    }

    /// Consume the sink and return the collected events.
    pub fn into_events(self) -> Vec<ExecutionEvent> {
        self.events
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&mut self, event: ExecutionEvent) {
        self.events.push(event);
    }
}
