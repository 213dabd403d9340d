//! File-based Conversation Store Adapter
//!
//! Stores each conversation as a YAML file under `<base>/<namespace>/`.
//! Keys are percent-encoded to form file names, since hub conversation ids
//! may contain path separators.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::domain::conversation::Conversation;
use crate::domain::foundation::ConversationKey;
use crate::ports::{ConversationStore, StoreError};

/// File-based storage for conversations
#[derive(Debug, Clone)]
pub struct FileConversationStore {
    base_path: PathBuf,
}

impl FileConversationStore {
    /// Create a new file store
    ///
    /// # Arguments
    /// * `base_path` - The root directory for conversation data
    /// * `namespace` - Subdirectory separating clients that share a root
    ///
    /// # Example
    /// ```ignore
    /// let store = FileConversationStore::new("./data", "bing");
    /// ```
    pub fn new<P: AsRef<Path>>(base_path: P, namespace: &str) -> Self {
        Self {
            base_path: base_path.as_ref().join(namespace),
        }
    }

    fn file_path(&self, key: &ConversationKey) -> PathBuf {
        let name = urlencoding::encode(key.as_str());
        self.base_path.join(format!("{name}.yaml"))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn get(&self, key: &ConversationKey) -> Result<Option<Conversation>, StoreError> {
        let file_path = self.file_path(key);

        let yaml = match fs::read_to_string(&file_path).await {
            Ok(yaml) => yaml,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::IoError(e.to_string())),
        };

        let conversation = serde_yaml::from_str(&yaml)
            .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;

        Ok(Some(conversation))
    }

    async fn set(&self, key: &ConversationKey, conversation: &Conversation) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| StoreError::IoError(e.to_string()))?;

        let yaml = serde_yaml::to_string(conversation)
            .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;

        fs::write(self.file_path(key), yaml)
            .await
            .map_err(|e| StoreError::IoError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::Message;
    use tempfile::TempDir;

    fn key(value: &str) -> ConversationKey {
        ConversationKey::new(value).unwrap()
    }

    fn thread() -> Conversation {
        let mut conversation = Conversation::new();
        let root = Message::system("be brief", None);
        let user = Message::user("hi", Some(root.id()));
        let reply = Message::assistant("hello", Some(user.id()))
            .with_details(serde_json::json!({"author": "bot", "text": "hello"}));
        conversation.push(root);
        conversation.push(user);
        conversation.push(reply);
        conversation
    }

    #[tokio::test]
    async fn save_and_load_conversation() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConversationStore::new(temp_dir.path(), "bing");
        let conversation = thread();

        store.set(&key("c1"), &conversation).await.unwrap();
        let loaded = store.get(&key("c1")).await.unwrap().unwrap();

        assert_eq!(loaded, conversation);
    }

    #[tokio::test]
    async fn load_missing_conversation_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConversationStore::new(temp_dir.path(), "bing");

        assert!(store.get(&key("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_with_separators_stay_inside_namespace() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConversationStore::new(temp_dir.path(), "bing");
        let awkward = key("51D|BingProd|../../etc/passwd");

        store.set(&awkward, &thread()).await.unwrap();

        assert!(store.get(&awkward).await.unwrap().is_some());
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path().join("bing"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn namespaces_do_not_share_conversations() {
        let temp_dir = TempDir::new().unwrap();
        let bing = FileConversationStore::new(temp_dir.path(), "bing");
        let local = FileConversationStore::new(temp_dir.path(), "localLLM");

        bing.set(&key("c1"), &thread()).await.unwrap();

        assert!(local.get(&key("c1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_reports_deserialization_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConversationStore::new(temp_dir.path(), "bing");
        std::fs::create_dir_all(temp_dir.path().join("bing")).unwrap();
        std::fs::write(temp_dir.path().join("bing").join("c1.yaml"), "messages: [unterminated").unwrap();

        let result = store.get(&key("c1")).await;

        assert!(matches!(result, Err(StoreError::DeserializationFailed(_))));
    }
}
