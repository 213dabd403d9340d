//! Image Service Ports - attachment upload and side-channel image generation.
//!
//! Both are best-effort: failures degrade the turn instead of failing it.

use std::sync::Arc;

use async_trait::async_trait;

use super::progress::ProgressListener;
use crate::domain::hub::UploadedImage;
use crate::domain::reconstruct::AssetRequest;

/// Non-fatal asset errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetError {
    #[error("image upload failed: {0}")]
    UploadFailed(String),

    #[error("{0}")]
    GenerationFailed(String),
}

impl AssetError {
    pub fn upload(message: impl Into<String>) -> Self {
        Self::UploadFailed(message.into())
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationFailed(message.into())
    }
}

/// Port for attaching user images to a turn
#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Download an image and return it base64 encoded.
    async fn fetch_base64(&self, url: &str) -> Result<String, AssetError>;

    /// Upload a base64 image and return its blob ids.
    async fn upload(&self, image_base64: &str) -> Result<UploadedImage, AssetError>;
}

/// Port for the external renderer that turns an image placeholder into
/// embeddable markup
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Render the asset, reporting intermediate markup through `progress`.
    async fn generate(
        &self,
        request: &AssetRequest,
        progress: Arc<dyn ProgressListener>,
    ) -> Result<String, AssetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_error_displays_bare_message() {
        let err = AssetError::generation("Your prompt has been blocked");
        assert_eq!(err.to_string(), "Your prompt has been blocked");
    }

    #[test]
    fn upload_error_is_prefixed() {
        let err = AssetError::upload("HTTP 500");
        assert_eq!(err.to_string(), "image upload failed: HTTP 500");
    }
}
