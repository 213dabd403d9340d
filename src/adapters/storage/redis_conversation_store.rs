//! Redis-backed conversation store for shared deployments.
//!
//! Conversations are stored as JSON strings under `<namespace>:<key>`,
//! optionally with a TTL so abandoned threads age out.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::domain::conversation::Conversation;
use crate::domain::foundation::ConversationKey;
use crate::ports::{ConversationStore, StoreError};

/// Redis conversation store.
#[derive(Clone)]
pub struct RedisConversationStore {
    conn: MultiplexedConnection,
    namespace: String,
    ttl_secs: Option<u64>,
}

impl RedisConversationStore {
    /// Create a store over an existing connection.
    pub fn new(conn: MultiplexedConnection, namespace: impl Into<String>) -> Self {
        Self {
            conn,
            namespace: namespace.into(),
            ttl_secs: None,
        }
    }

    /// Connect to `redis_url` and create a store.
    pub async fn connect(redis_url: &str, namespace: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url).map_err(backend)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)?;
        Ok(Self::new(conn, namespace))
    }

    /// Expire conversations `ttl_secs` after their last write.
    pub fn with_ttl(mut self, ttl_secs: Option<u64>) -> Self {
        self.ttl_secs = ttl_secs.filter(|secs| *secs > 0);
        self
    }

    fn redis_key(&self, key: &ConversationKey) -> String {
        redis_key(&self.namespace, key)
    }
}

fn redis_key(namespace: &str, key: &ConversationKey) -> String {
    format!("{}:{}", namespace, key.as_str())
}

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn get(&self, key: &ConversationKey) -> Result<Option<Conversation>, StoreError> {
        let mut conn = self.conn.clone();

        let raw: Option<String> = conn.get(self.redis_key(key)).await.map_err(backend)?;

        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| StoreError::DeserializationFailed(e.to_string()))
        })
        .transpose()
    }

    async fn set(&self, key: &ConversationKey, conversation: &Conversation) -> Result<(), StoreError> {
        let json = serde_json::to_string(conversation)
            .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;

        let mut conn = self.conn.clone();
        let redis_key = self.redis_key(key);

        let mut cmd = redis::cmd("SET");
        cmd.arg(redis_key).arg(json);
        if let Some(ttl) = self.ttl_secs {
            cmd.arg("EX").arg(ttl);
        }
        cmd.query_async::<_, ()>(&mut conn).await.map_err(backend)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        let key = ConversationKey::new("abc").unwrap();
        assert_eq!(redis_key("bing", &key), "bing:abc");
    }

    #[test]
    fn backend_errors_are_retryable() {
        let err = backend(redis::RedisError::from((redis::ErrorKind::IoError, "refused")));
        assert!(err.is_retryable());
    }
}
