use crate::types::{DocumentId, UserId};
use std::collections::HashMap;
use std::sync::RwLock;

/// Collaborator boundary to the surrounding file and account system
///
/// The host application owns user accounts and file bookkeeping; this
/// crate only notifies it of upload lifecycle events and asks it to
/// resolve request identity.
pub trait FileRegistry: Send + Sync {
    /// Map a transport-level identity header to a user, if valid
    fn resolve_user(&self, header: Option<&str>) -> Option<UserId>;

    /// A document finished uploading under this owner
    fn record_upload(&self, owner: &UserId, document_id: &DocumentId);

    /// A document was deleted and should be dropped from file listings
    fn remove_upload(&self, document_id: &DocumentId);
}

/// Standalone registry for deployments without a host application
///
/// Trusts the identity header as-is and keeps upload bookkeeping in
/// memory.
#[derive(Default)]
pub struct InMemoryFileRegistry {
    uploads: RwLock<HashMap<DocumentId, UserId>>,
}

impl InMemoryFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked uploads
    pub fn len(&self) -> usize {
        self.uploads.read().expect("uploads lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FileRegistry for InMemoryFileRegistry {
    fn resolve_user(&self, header: Option<&str>) -> Option<UserId> {
        let user = header?.trim();
        if user.is_empty() {
            return None;
        }
        Some(user.to_string())
    }

    fn record_upload(&self, owner: &UserId, document_id: &DocumentId) {
        let mut uploads = self.uploads.write().expect("uploads lock poisoned");
        uploads.insert(document_id.clone(), owner.clone());
    }

    fn remove_upload(&self, document_id: &DocumentId) {
        let mut uploads = self.uploads.write().expect("uploads lock poisoned");
        uploads.remove(document_id);
    }
}
