//! JSON file backend.
//!
//! The whole store lives in one document on disk and a copy in memory. Every
//! operation takes the same async mutex, so mutations are applied by a single
//! writer per storage instance and a read never sees a half-applied change.
//! Writes go to a sibling temp file which is then renamed over the target.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::document::{Mutation, StoreDocument};
use super::{Storage, StorageBackend};
use crate::error::AppError;
use crate::models::admin::Admin;
use crate::models::card_key::{CardKey, CardKeyStats, NewCardKey};

pub struct JsonFileStorage {
    path: PathBuf,
    document: Mutex<StoreDocument>,
}

impl JsonFileStorage {
    /// Open the document at `path`, creating an empty one if it does not exist.
    ///
    /// # Errors
    ///
    /// - `Io` if the file or its directory cannot be read or created
    /// - `Serialization` if an existing file is not a valid store document
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();

        let document = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let empty = StoreDocument::default();
                write_document(&path, &empty).await?;
                tracing::info!(path = %path.display(), "created empty card key store");
                empty
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    /// Apply `change` to a copy of the document, persist it if it reports a
    /// change, then publish the copy. A failed write leaves memory untouched.
    async fn mutate<T, F>(&self, change: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut StoreDocument) -> Result<Mutation<T>, AppError>,
    {
        let mut current = self.document.lock().await;
        let mut next = current.clone();

        let (value, dirty) = change(&mut next)?;
        if dirty {
            write_document(&self.path, &next).await?;
            *current = next;
        }

        Ok(value)
    }

    async fn read<T>(&self, view: impl FnOnce(&StoreDocument) -> T) -> T {
        let current = self.document.lock().await;
        view(&current)
    }
}

async fn write_document(path: &Path, document: &StoreDocument) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let payload = serde_json::to_vec_pretty(document)?;
    tokio::fs::write(&tmp, payload).await?;
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(())
}

#[async_trait]
impl Storage for JsonFileStorage {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Json
    }

    async fn ping(&self) -> Result<(), AppError> {
        tokio::fs::metadata(&self.path).await?;
        Ok(())
    }

    async fn batch_add_card_keys(&self, news: Vec<NewCardKey>) -> Result<Vec<String>, AppError> {
        self.mutate(|doc| doc.card_keys.insert(news, Utc::now()))
            .await
    }

    async fn get_card_key_by_token(&self, secure_token: &str) -> Result<Option<CardKey>, AppError> {
        Ok(self
            .read(|doc| doc.card_keys.find_by_token(secure_token).cloned())
            .await)
    }

    async fn get_card_key_by_id(&self, id: Uuid) -> Result<Option<CardKey>, AppError> {
        Ok(self.read(|doc| doc.card_keys.find_by_id(id).cloned()).await)
    }

    async fn mark_card_key_as_used(&self, secure_token: &str) -> Result<bool, AppError> {
        self.mutate(|doc| Ok(doc.card_keys.mark_used(secure_token, Utc::now())))
            .await
    }

    async fn restore_card_key(&self, secure_token: &str) -> Result<bool, AppError> {
        self.mutate(|doc| Ok(doc.card_keys.restore(secure_token)))
            .await
    }

    async fn get_all_card_keys(&self) -> Result<Vec<CardKey>, AppError> {
        Ok(self.read(|doc| doc.card_keys.newest_first()).await)
    }

    async fn delete_card_key(&self, id: Uuid) -> Result<bool, AppError> {
        self.mutate(|doc| Ok(doc.card_keys.delete(id))).await
    }

    async fn get_stats(&self) -> Result<CardKeyStats, AppError> {
        Ok(self.read(|doc| doc.card_keys.stats()).await)
    }

    async fn add_admin(&self, username: &str, password_hash: &str) -> Result<Uuid, AppError> {
        self.mutate(|doc| doc.admins.insert(username, password_hash, Utc::now()))
            .await
    }

    async fn get_admin_by_username(&self, username: &str) -> Result<Option<Admin>, AppError> {
        Ok(self.read(|doc| doc.admins.find(username).cloned()).await)
    }

    async fn update_admin_password(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<bool, AppError> {
        self.mutate(|doc| Ok(doc.admins.update_password(username, password_hash)))
            .await
    }
}
