use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DataStore, StoreError};
use crate::models::{FileRecord, NewPrincipal, Principal};

#[derive(Default)]
struct Tables {
    principals: Vec<Principal>,
    files: Vec<FileRecord>,
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn principal_count(&self) -> usize {
        self.tables.read().await.principals.len()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn find_principal_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.principals.iter().find(|p| p.email == email).cloned())
    }

    async fn insert_principal(&self, new: NewPrincipal) -> Result<Principal, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.principals.iter().any(|p| p.email == new.email) {
            return Err(StoreError::Duplicate);
        }
        let principal = Principal {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            verified: new.verified,
            verification_token: new.verification_token,
        };
        tables.principals.push(principal.clone());
        Ok(principal)
    }

    async fn consume_verification_token(&self, token: &str) -> Result<Option<Principal>, StoreError> {
        let mut tables = self.tables.write().await;
        let found = tables
            .principals
            .iter_mut()
            .find(|p| p.verification_token.as_deref() == Some(token));

        Ok(found.map(|p| {
            p.verified = true;
            p.verification_token = None;
            p.clone()
        }))
    }

    async fn insert_file(&self, record: FileRecord) -> Result<FileRecord, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.files.iter().any(|f| f.id == record.id) {
            return Err(StoreError::Duplicate);
        }
        tables.files.push(record.clone());
        Ok(record)
    }

    async fn find_file(&self, id: Uuid) -> Result<Option<FileRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.files.iter().find(|f| f.id == id).cloned())
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>, StoreError> {
        Ok(self.tables.read().await.files.clone())
    }
}
