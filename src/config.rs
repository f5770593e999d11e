//! Client options and host callbacks

use std::sync::Arc;
use std::time::Duration;

use crate::state::{CompletionSummary, ExtractedFact};

/// Invoked for every `discovery:fact_extracted` event, after projection.
pub type FactExtractedCallback = Arc<dyn Fn(ExtractedFact) + Send + Sync>;

/// Invoked once when the run completes.
pub type ProcessingCompleteCallback = Arc<dyn Fn(CompletionSummary) + Send + Sync>;

/// Invoked for every pipeline error, with the bare message string.
pub type ErrorCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Notification callbacks, all optional.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_fact_extracted: Option<FactExtractedCallback>,
    pub on_processing_complete: Option<ProcessingCompleteCallback>,
    pub on_error: Option<ErrorCallback>,
}

/// Options for mounting a [`SyncClient`](crate::client::SyncClient).
#[derive(Clone)]
pub struct SyncOptions {
    /// Case to subscribe to. Without one, events are still decoded but no
    /// room is announced and commands are rejected.
    pub case_id: Option<String>,
    /// Processing run of interest, if known up front.
    pub processing_id: Option<String>,
    /// Delay before re-subscribing after a reconnect, absorbing rapid
    /// connection flapping.
    pub resubscribe_debounce: Duration,
    pub callbacks: Callbacks,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            case_id: None,
            processing_id: None,
            resubscribe_debounce: Duration::from_secs(1),
            callbacks: Callbacks::default(),
        }
    }
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }

    pub fn with_processing(mut self, processing_id: impl Into<String>) -> Self {
        self.processing_id = Some(processing_id.into());
        self
    }

    pub fn with_resubscribe_debounce(mut self, debounce: Duration) -> Self {
        self.resubscribe_debounce = debounce;
        self
    }

    pub fn on_fact_extracted(
        mut self,
        callback: impl Fn(ExtractedFact) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.on_fact_extracted = Some(Arc::new(callback));
        self
    }

    pub fn on_processing_complete(
        mut self,
        callback: impl Fn(CompletionSummary) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.on_processing_complete = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.callbacks.on_error = Some(Arc::new(callback));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let options = SyncOptions::new()
            .with_case("c1")
            .with_processing("p1")
            .with_resubscribe_debounce(Duration::from_millis(200));

        assert_eq!(options.case_id.as_deref(), Some("c1"));
        assert_eq!(options.processing_id.as_deref(), Some("p1"));
        assert_eq!(options.resubscribe_debounce, Duration::from_millis(200));
        assert!(options.callbacks.on_error.is_none());
    }

    #[test]
    fn test_default_debounce() {
        assert_eq!(
            SyncOptions::default().resubscribe_debounce,
            Duration::from_secs(1)
        );
    }
}
