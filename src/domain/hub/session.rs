//! Server-issued session credentials.

use serde::{Deserialize, Serialize};

/// How the service authenticates the duplex channel for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SessionSignature {
    /// Sent inside every turn request as `conversationSignature`.
    Plain(String),
    /// Returned in a response header and sent as the channel's access token.
    Encrypted(String),
}

impl SessionSignature {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain(s) | Self::Encrypted(s) => s,
        }
    }
}

/// Credentials needed to resume a hub session without negotiating again.
///
/// Issued once per fresh session and never renewed by this crate; an
/// `InvalidSession` result means the caller must start over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub conversation_id: String,
    pub client_id: String,
    pub signature: SessionSignature,
}

impl SessionHandle {
    pub fn new(
        conversation_id: impl Into<String>,
        client_id: impl Into<String>,
        signature: SessionSignature,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            client_id: client_id.into(),
            signature,
        }
    }

    /// Signature to embed in the request body, if this session uses one.
    pub fn body_signature(&self) -> Option<&str> {
        match &self.signature {
            SessionSignature::Plain(s) => Some(s),
            SessionSignature::Encrypted(_) => None,
        }
    }

    /// Access token to append to the channel URL, if this session uses one.
    pub fn access_token(&self) -> Option<&str> {
        match &self.signature {
            SessionSignature::Plain(_) => None,
            SessionSignature::Encrypted(s) => Some(s),
        }
    }

    /// Rebuilds a handle from caller-supplied parts; any missing or blank
    /// part means a new session must be negotiated.
    pub fn from_parts(
        conversation_id: Option<&str>,
        client_id: Option<&str>,
        signature: Option<SessionSignature>,
    ) -> Option<Self> {
        let conversation_id = conversation_id.filter(|s| !s.is_empty())?;
        let client_id = client_id.filter(|s| !s.is_empty())?;
        let signature = signature.filter(|s| !s.as_str().is_empty())?;
        Some(Self::new(conversation_id, client_id, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_signature_goes_in_body() {
        let handle = SessionHandle::new("c", "p", SessionSignature::Plain("sig".into()));
        assert_eq!(handle.body_signature(), Some("sig"));
        assert_eq!(handle.access_token(), None);
    }

    #[test]
    fn encrypted_signature_goes_in_url() {
        let handle = SessionHandle::new("c", "p", SessionSignature::Encrypted("tok".into()));
        assert_eq!(handle.body_signature(), None);
        assert_eq!(handle.access_token(), Some("tok"));
    }

    #[test]
    fn from_parts_requires_every_field() {
        let sig = || Some(SessionSignature::Plain("sig".into()));
        assert!(SessionHandle::from_parts(Some("c"), Some("p"), sig()).is_some());
        assert!(SessionHandle::from_parts(None, Some("p"), sig()).is_none());
        assert!(SessionHandle::from_parts(Some("c"), Some(""), sig()).is_none());
        assert!(SessionHandle::from_parts(Some("c"), Some("p"), None).is_none());
        assert!(SessionHandle::from_parts(
            Some("c"),
            Some("p"),
            Some(SessionSignature::Plain(String::new()))
        )
        .is_none());
    }

    #[test]
    fn serializes_with_tagged_signature() {
        let handle = SessionHandle::new("c", "p", SessionSignature::Encrypted("tok".into()));
        let json = serde_json::to_value(&handle).unwrap();
        assert_eq!(json["conversationId"], "c");
        assert_eq!(json["signature"]["kind"], "encrypted");
    }
}
