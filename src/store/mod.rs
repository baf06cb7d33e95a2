use crate::error::DocChatError;
use crate::index::VectorIndex;
use crate::types::{
    ConversationTurn, Document, DocumentId, DocumentStatus, Passage, SessionId, UserId,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Indexed content of a Ready document, immutable once published
#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentData {
    pub passages: Vec<Passage>,
    pub index: VectorIndex,
}

#[derive(Debug, Clone)]
struct DocumentEntry {
    document: Document,
    /// Present only once the document is Ready
    data: Option<Arc<DocumentData>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedDocument {
    document: Document,
    data: Option<DocumentData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSession {
    session_id: SessionId,
    document_id: DocumentId,
    turns: Vec<ConversationTurn>,
}

/// Registry of documents and session histories, with JSON persistence
///
/// Documents move Ingesting -> Ready/Failed exactly once; Ready content is
/// published as an immutable `Arc<DocumentData>` snapshot so concurrent
/// sessions read it without coordination. When `data_dir` is set, documents
/// and turn histories are persisted so a restart recovers state without
/// re-extracting or re-embedding anything.
pub struct DocumentStore {
    data_dir: Option<PathBuf>,
    documents: RwLock<HashMap<DocumentId, DocumentEntry>>,
    sessions: RwLock<HashMap<SessionId, PersistedSession>>,
}

impl DocumentStore {
    /// Create a store with no persistence (tests, ephemeral deployments)
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            documents: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a persistent store, recovering previously saved state
    ///
    /// Documents that were mid-ingest when the process stopped are marked
    /// Failed; the upload must be retried rather than silently resumed.
    pub fn open(data_dir: PathBuf) -> Result<Self, DocChatError> {
        fs::create_dir_all(data_dir.join("documents"))
            .context("Failed to create documents directory")?;
        fs::create_dir_all(data_dir.join("sessions"))
            .context("Failed to create sessions directory")?;

        let store = Self {
            data_dir: Some(data_dir),
            documents: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        };
        store.recover()?;
        Ok(store)
    }

    fn recover(&self) -> Result<(), DocChatError> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };

        let mut documents = self.documents.write().expect("documents lock poisoned");
        for entry in fs::read_dir(dir.join("documents")).context("Failed to list documents")? {
            let path = entry.context("Failed to read directory entry")?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).context("Failed to read document file")?;
            let mut persisted: PersistedDocument =
                serde_json::from_str(&content).context("Failed to parse document file")?;

            if matches!(persisted.document.status, DocumentStatus::Ingesting) {
                persisted.document.status = DocumentStatus::Failed {
                    reason: "ingestion interrupted by restart".to_string(),
                };
                persisted.data = None;
            }

            documents.insert(
                persisted.document.id.clone(),
                DocumentEntry {
                    document: persisted.document,
                    data: persisted.data.map(Arc::new),
                },
            );
        }
        tracing::info!("Recovered {} documents", documents.len());
        drop(documents);

        let mut sessions = self.sessions.write().expect("sessions lock poisoned");
        for entry in fs::read_dir(dir.join("sessions")).context("Failed to list sessions")? {
            let path = entry.context("Failed to read directory entry")?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).context("Failed to read session file")?;
            let persisted: PersistedSession =
                serde_json::from_str(&content).context("Failed to parse session file")?;
            sessions.insert(persisted.session_id.clone(), persisted);
        }
        tracing::info!("Recovered {} session histories", sessions.len());

        Ok(())
    }

    /// Register a freshly uploaded document in the Ingesting state
    pub fn register_ingesting(&self, document: Document) -> Result<(), DocChatError> {
        {
            let mut documents = self.documents.write().expect("documents lock poisoned");
            documents.insert(
                document.id.clone(),
                DocumentEntry {
                    document: document.clone(),
                    data: None,
                },
            );
        }
        self.persist_document(&document.id)
    }

    /// Record the page count once extraction has established it
    pub fn set_page_count(&self, id: &DocumentId, page_count: usize) -> Result<(), DocChatError> {
        {
            let mut documents = self.documents.write().expect("documents lock poisoned");
            let Some(entry) = documents.get_mut(id) else {
                return Ok(());
            };
            entry.document.page_count = page_count;
        }
        self.persist_document(id)
    }

    /// Publish indexed content and flip the document to Ready
    pub fn mark_ready(
        &self,
        id: &DocumentId,
        passages: Vec<Passage>,
        index: VectorIndex,
    ) -> Result<(), DocChatError> {
        {
            let mut documents = self.documents.write().expect("documents lock poisoned");
            let Some(entry) = documents.get_mut(id) else {
                // Deleted while ingesting; drop the result
                tracing::warn!(document = %id, "document deleted before ingestion finished");
                return Ok(());
            };
            entry.document.status = DocumentStatus::Ready;
            entry.data = Some(Arc::new(DocumentData { passages, index }));
        }
        self.persist_document(id)
    }

    /// Record an unrecoverable ingestion failure
    pub fn mark_failed(&self, id: &DocumentId, reason: String) -> Result<(), DocChatError> {
        {
            let mut documents = self.documents.write().expect("documents lock poisoned");
            let Some(entry) = documents.get_mut(id) else {
                return Ok(());
            };
            tracing::warn!(document = %id, reason = %reason, "ingestion failed");
            entry.document.status = DocumentStatus::Failed { reason };
            entry.data = None;
        }
        self.persist_document(id)
    }

    /// Document metadata, if the document exists
    pub fn document(&self, id: &DocumentId) -> Option<Document> {
        let documents = self.documents.read().expect("documents lock poisoned");
        documents.get(id).map(|entry| entry.document.clone())
    }

    /// Indexed content snapshot; None unless the document is Ready
    pub fn document_data(&self, id: &DocumentId) -> Option<Arc<DocumentData>> {
        let documents = self.documents.read().expect("documents lock poisoned");
        documents.get(id).and_then(|entry| entry.data.clone())
    }

    /// All documents owned by one user, newest first
    pub fn documents_for_owner(&self, owner: &UserId) -> Vec<Document> {
        let documents = self.documents.read().expect("documents lock poisoned");
        let mut owned: Vec<Document> = documents
            .values()
            .filter(|entry| entry.document.owner == *owner)
            .map(|entry| entry.document.clone())
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned
    }

    /// Remove a document, its passages, and its index
    ///
    /// Active sessions re-resolve the document at each pipeline stage, so
    /// in-flight work fails fast with DocumentUnavailable after this.
    pub fn delete_document(&self, id: &DocumentId) -> Result<bool, DocChatError> {
        let removed = {
            let mut documents = self.documents.write().expect("documents lock poisoned");
            documents.remove(id).is_some()
        };

        if removed {
            if let Some(dir) = &self.data_dir {
                let path = dir.join("documents").join(format!("{}.json", id));
                if path.exists() {
                    fs::remove_file(&path).context("Failed to delete document file")?;
                }
            }
            tracing::info!(document = %id, "deleted document");
        }
        Ok(removed)
    }

    /// Persist a session's turn history
    pub fn save_turns(
        &self,
        session_id: &SessionId,
        document_id: &DocumentId,
        turns: Vec<ConversationTurn>,
    ) -> Result<(), DocChatError> {
        let persisted = PersistedSession {
            session_id: session_id.clone(),
            document_id: document_id.clone(),
            turns,
        };

        if let Some(dir) = &self.data_dir {
            let path = dir.join("sessions").join(format!("{}.json", session_id));
            let content =
                serde_json::to_string(&persisted).context("Failed to serialize session")?;
            fs::write(&path, content).context("Failed to write session file")?;
        }

        let mut sessions = self.sessions.write().expect("sessions lock poisoned");
        sessions.insert(session_id.clone(), persisted);
        Ok(())
    }

    /// Replay a recovered session history
    pub fn load_turns(&self, session_id: &SessionId) -> Option<Vec<ConversationTurn>> {
        let sessions = self.sessions.read().expect("sessions lock poisoned");
        sessions.get(session_id).map(|s| s.turns.clone())
    }

    /// Document a recovered session was bound to
    pub fn session_document(&self, session_id: &SessionId) -> Option<DocumentId> {
        let sessions = self.sessions.read().expect("sessions lock poisoned");
        sessions.get(session_id).map(|s| s.document_id.clone())
    }

    fn persist_document(&self, id: &DocumentId) -> Result<(), DocChatError> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };

        let persisted = {
            let documents = self.documents.read().expect("documents lock poisoned");
            let Some(entry) = documents.get(id) else {
                return Ok(());
            };
            PersistedDocument {
                document: entry.document.clone(),
                data: entry.data.as_ref().map(|data| DocumentData {
                    passages: data.passages.clone(),
                    index: data.index.clone(),
                }),
            }
        };

        let path = dir.join("documents").join(format!("{}.json", id));
        let content = serde_json::to_string(&persisted).context("Failed to serialize document")?;
        fs::write(&path, content).context("Failed to write document file")?;
        tracing::debug!(document = %id, "persisted document");
        Ok(())
    }
}
