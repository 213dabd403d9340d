//! HTTP Image Uploader - attaches user images to a turn.
//!
//! Images are either fetched from a URL or supplied as base64, then posted to
//! the knowledge-blob endpoint, which answers with the blob ids the turn
//! request references.

use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::Form;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

use crate::config::HubConfig;
use crate::domain::hub::UploadedImage;
use crate::ports::{AssetError, ImageUploader};

const KBLOB_PATH: &str = "/images/kblob";

/// Image uploader over reqwest.
pub struct HttpImageUploader {
    client: Client,
    upload_url: String,
    cookie: Option<Secret<String>>,
}

impl HttpImageUploader {
    /// Creates an uploader posting to `<host>/images/kblob`.
    pub fn new(host: &str, cookie: Option<Secret<String>>, timeout: Duration) -> Result<Self, AssetError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AssetError::upload(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            upload_url: format!("{}{}", host.trim_end_matches('/'), KBLOB_PATH),
            cookie,
        })
    }

    pub fn from_config(config: &HubConfig) -> Result<Self, AssetError> {
        Self::new(&config.host, config.cookie_header(), config.connect_timeout())
    }

    fn knowledge_request() -> serde_json::Value {
        serde_json::json!({
            "imageInfo": {},
            "knowledgeRequest": {
                "invokedSkills": ["ImageById"],
                "subscriptionId": "Bing.Chat.Multimodal",
                // Without face blur the service omits the processed blob id.
                "invokedSkillsRequestData": {"enableFaceBlur": true},
                "convoData": {"convoid": "", "convotone": "Creative"}
            }
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KblobResponse {
    #[serde(default)]
    blob_id: String,
    #[serde(default, alias = "processBlobId")]
    processed_blob_id: String,
}

#[async_trait]
impl ImageUploader for HttpImageUploader {
    async fn fetch_base64(&self, url: &str) -> Result<String, AssetError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AssetError::upload(format!("image download failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::upload(format!("image download failed: HTTP {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AssetError::upload(format!("image download failed: {}", e)))?;

        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    async fn upload(&self, image_base64: &str) -> Result<UploadedImage, AssetError> {
        let form = Form::new()
            .text("knowledgeRequest", Self::knowledge_request().to_string())
            .text("imageBase64", image_base64.to_string());

        let mut request = self
            .client
            .post(&self.upload_url)
            .header("accept", "*/*")
            .header("referer", "https://www.bing.com/search?q=Bing+AI&showconv=1&FORM=hpcodx")
            .header("referrer-policy", "origin-when-cross-origin")
            .multipart(form);
        if let Some(cookie) = &self.cookie {
            request = request.header("cookie", cookie.expose_secret().as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| AssetError::upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::upload(format!("HTTP {}", status)));
        }

        let body: KblobResponse = response
            .json()
            .await
            .map_err(|e| AssetError::upload(format!("unreadable response: {}", e)))?;

        if body.blob_id.is_empty() {
            return Err(AssetError::upload("response carried no blob id"));
        }

        Ok(UploadedImage {
            blob_id: body.blob_id,
            processed_blob_id: body.processed_blob_id,
        })
    }
}
