//! Image generator used when no renderer is configured.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::reconstruct::AssetRequest;
use crate::ports::{AssetError, ImageGenerator, ProgressListener};

/// Refuses every request, so the reply carries the error text inline.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledImageGenerator;

#[async_trait]
impl ImageGenerator for DisabledImageGenerator {
    async fn generate(
        &self,
        request: &AssetRequest,
        _progress: Arc<dyn ProgressListener>,
    ) -> Result<String, AssetError> {
        tracing::debug!(prompt = %request.prompt, "image generation requested but no renderer is configured");
        Err(AssetError::generation("image generation is not available"))
    }
}
