use crate::engine::events::ExecutionEvent;
use crate::engine::sink::EventSink;

/// Sink used by the CLI: every event becomes a `tracing` record.
#[derive(Debug, Default)]
pub struct LoggingEventSink {
    emitted: usize,
}

impl LoggingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&mut self, event: ExecutionEvent) {
        self.emitted += 1;
        tracing::debug!(
            execution_id = %event.execution_id,
            kind = ?event.kind,
            at = %event.timestamp.to_rfc3339(),
            "pipeline event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::execution_created;
    use crate::execution_id::ExecutionId;

    #[test]
    fn counts_emitted_events() {
        let mut sink = LoggingEventSink::new();
        let id = ExecutionId::new();
        sink.emit(execution_created(&id));
        sink.emit(execution_created(&id));
        assert_eq!(sink.emitted(), 2);
    }
}
