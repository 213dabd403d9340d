//! Side-channel asset task.
//!
//! Forked from an image placeholder mid-stream and awaited only when the turn
//! resolves. Dropping an unawaited task aborts it.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::domain::reconstruct::{AssetOutcome, AssetRequest};
use crate::ports::{AssetError, ImageGenerator, ProgressListener};

/// Handle to a running image generation.
#[derive(Debug)]
pub struct AssetTask {
    handle: Option<JoinHandle<Result<String, AssetError>>>,
}

impl AssetTask {
    /// Starts rendering `request`. Intermediate markup and any failure text
    /// go to `progress`.
    pub fn spawn(
        generator: Arc<dyn ImageGenerator>,
        request: AssetRequest,
        progress: Arc<dyn ProgressListener>,
    ) -> Self {
        tracing::info!(message_id = request.message_id.as_deref().unwrap_or("-"), "image generation started");
        let handle = tokio::spawn(async move {
            let result = generator.generate(&request, progress.clone()).await;
            if let Err(e) = &result {
                progress.on_progress(&e.to_string());
            }
            result
        });
        Self { handle: Some(handle) }
    }

    /// Waits for the task and converts its result into an outcome.
    pub async fn outcome(mut self) -> AssetOutcome {
        let Some(handle) = self.handle.take() else {
            return AssetOutcome::Failed("image generation did not start".to_string());
        };
        match handle.await {
            Ok(Ok(markup)) => AssetOutcome::Rendered(markup),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "image generation failed");
                AssetOutcome::Failed(e.to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "image generation task did not finish");
                AssetOutcome::Failed(format!("image generation task failed: {}", e))
            }
        }
    }
}

impl Drop for AssetTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
