//! Mock Image Generator for testing.
//!
//! Returns queued outcomes after an optional delay, reporting a progress
//! line first, and records every request it receives.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use crate::domain::reconstruct::AssetRequest;
use crate::ports::{AssetError, ImageGenerator, ProgressListener};

/// Mock image generator.
#[derive(Debug, Clone, Default)]
pub struct MockImageGenerator {
    outcomes: Arc<Mutex<VecDeque<Result<String, AssetError>>>>,
    delay: Duration,
    progress_text: Option<String>,
    calls: Arc<Mutex<Vec<AssetRequest>>>,
}

impl MockImageGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful render.
    pub fn with_markup(self, markup: impl Into<String>) -> Self {
        self.push(Ok(markup.into()))
    }

    /// Queues a failed render.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.push(Err(AssetError::generation(message)))
    }

    /// Delays every render.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Reports `text` through the progress listener before rendering.
    pub fn with_progress(mut self, text: impl Into<String>) -> Self {
        self.progress_text = Some(text.into());
        self
    }

    /// Requests received so far.
    pub fn calls(&self) -> Vec<AssetRequest> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push(self, outcome: Result<String, AssetError>) -> Self {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
        self
    }
}

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    async fn generate(
        &self,
        request: &AssetRequest,
        progress: Arc<dyn ProgressListener>,
    ) -> Result<String, AssetError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(text) = &self.progress_text {
            progress.on_progress(text);
        }
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let outcome = self
            .outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        outcome.unwrap_or_else(|| Err(AssetError::generation("no mock outcome configured")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::NoopProgress;

    fn request() -> AssetRequest {
        AssetRequest {
            prompt: "a red fox".to_string(),
            message_id: Some("m1".to_string()),
        }
    }

    #[tokio::test]
    async fn returns_queued_outcomes_in_order() {
        let generator = MockImageGenerator::new()
            .with_markup("![fox](https://img/1)")
            .with_failure("blocked");

        let first = generator.generate(&request(), Arc::new(NoopProgress)).await;
        let second = generator.generate(&request(), Arc::new(NoopProgress)).await;

        assert_eq!(first.unwrap(), "![fox](https://img/1)");
        assert_eq!(second.unwrap_err().to_string(), "blocked");
        assert_eq!(generator.calls().len(), 2);
        assert_eq!(generator.calls()[0].prompt, "a red fox");
    }

    #[tokio::test]
    async fn reports_progress() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Arc<dyn ProgressListener> =
            Arc::new(move |text: &str| sink.lock().unwrap().push(text.to_string()));
        let generator = MockImageGenerator::new()
            .with_progress("rendering")
            .with_markup("done");

        generator.generate(&request(), listener).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["rendering"]);
    }
}
