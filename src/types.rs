use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the user that owns a document. Issued by the external
/// account collaborator; opaque to this crate.
pub type UserId = String;

/// Identity of an uploaded document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identity of a conversation session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of an uploaded document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DocumentStatus {
    Ingesting,
    Ready,
    Failed { reason: String },
}

impl DocumentStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, DocumentStatus::Ready)
    }
}

/// Metadata for an uploaded document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner: UserId,
    /// Number of pages in the source PDF (including pages with no extractable text)
    pub page_count: usize,
    pub status: DocumentStatus,
    /// SHA256 of the uploaded bytes
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Plain text extracted from one PDF page, 1-indexed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    pub page_number: usize,
    pub text: String,
}

impl PageText {
    /// A page with no extractable text is excluded from chunking but still counted
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Back-reference to a passage, the unit returned by index queries and cited by answers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassageRef {
    pub document_id: DocumentId,
    pub passage_index: usize,
    pub page_number: usize,
}

/// A contiguous, possibly overlapping text segment from one page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub document_id: DocumentId,
    /// Position within the document's passage sequence, 0-indexed
    pub passage_index: usize,
    pub page_number: usize,
    pub text: String,
    /// Character offsets into the source page text
    pub char_start: usize,
    pub char_end: usize,
    /// Fixed-dimension embedding vector, normalized at index time
    pub embedding: Vec<f32>,
}

impl Passage {
    pub fn passage_ref(&self) -> PassageRef {
        PassageRef {
            document_id: self.document_id.clone(),
            passage_index: self.passage_index,
            page_number: self.page_number,
        }
    }
}

/// The role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One turn in a session's append-only history
///
/// `seq` is a per-session monotonic sequence number, not wall clock,
/// so ordering is guaranteed even across rapid appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
    /// Passages the answer is grounded in; always empty for user turns
    #[serde(default)]
    pub cited_passages: Vec<PassageRef>,
    pub seq: u64,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>, seq: u64) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
            cited_passages: Vec::new(),
            seq,
        }
    }

    pub fn assistant(text: impl Into<String>, cited_passages: Vec<PassageRef>, seq: u64) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
            cited_passages,
            seq,
        }
    }
}

/// Output of the retrieval planner
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Selected context passages, best match first
    pub passages: Vec<Passage>,
    /// False when no passage cleared the similarity threshold
    pub in_scope: bool,
}

impl RetrievalResult {
    pub fn out_of_scope() -> Self {
        Self {
            passages: Vec::new(),
            in_scope: false,
        }
    }
}

/// Response to a document upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub document_id: DocumentId,
    #[serde(flatten)]
    pub status: DocumentStatus,
}

/// Response to a status query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub document_id: DocumentId,
    #[serde(flatten)]
    pub status: DocumentStatus,
    pub page_count: usize,
}

/// One document in a user's listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: DocumentId,
    #[serde(flatten)]
    pub status: DocumentStatus,
    pub page_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Request body for a chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// Response to session creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: SessionId,
    pub document_id: DocumentId,
}

/// One NDJSON record in a streamed chat response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamRecord {
    Fragment { fragment: String },
    Citations { cited_passages: Vec<PassageRef> },
    Error { kind: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_roundtrip() {
        let id = DocumentId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let back: DocumentId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
        // transparent newtype serializes as a bare string
        assert!(json.starts_with('"'));
    }

    #[test]
    fn test_document_status_serialization() {
        let json = serde_json::to_string(&DocumentStatus::Ready).unwrap();
        assert_eq!(json, r#"{"state":"ready"}"#);

        let failed = DocumentStatus::Failed {
            reason: "encrypted".to_string(),
        };
        let json = serde_json::to_string(&failed).unwrap();
        assert_eq!(json, r#"{"state":"failed","reason":"encrypted"}"#);
    }

    #[test]
    fn test_page_text_empty() {
        let page = PageText {
            page_number: 2,
            text: "  \n\t ".to_string(),
        };
        assert!(page.is_empty());

        let page = PageText {
            page_number: 1,
            text: "refund policy".to_string(),
        };
        assert!(!page.is_empty());
    }

    #[test]
    fn test_passage_ref_back_reference() {
        let passage = Passage {
            document_id: DocumentId::from("doc-1"),
            passage_index: 3,
            page_number: 2,
            text: "some text".to_string(),
            char_start: 0,
            char_end: 9,
            embedding: vec![0.0; 4],
        };
        let r = passage.passage_ref();
        assert_eq!(r.document_id, DocumentId::from("doc-1"));
        assert_eq!(r.passage_index, 3);
        assert_eq!(r.page_number, 2);
    }

    #[test]
    fn test_user_turn_has_no_citations() {
        let turn = ConversationTurn::user("what is the refund policy?", 0);
        assert_eq!(turn.role, TurnRole::User);
        assert!(turn.cited_passages.is_empty());
        assert_eq!(turn.seq, 0);
    }

    #[test]
    fn test_stream_record_serialization() {
        let frag = StreamRecord::Fragment {
            fragment: "Hello".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&frag).unwrap(),
            r#"{"fragment":"Hello"}"#
        );

        let err = StreamRecord::Error {
            kind: "busy".to_string(),
            message: "try again".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"kind":"busy","message":"try again"}"#
        );
    }
}
