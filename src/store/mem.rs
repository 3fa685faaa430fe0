//! In-memory store.
//!
//! Every map is guarded by its own `RwLock`; writes touch exactly one entity,
//! so the atomicity on offer is per-entity last-write-wins and nothing more.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::store::{EntityId, FileEntity, Folder, Item, Job, JobStatus, Store, User};

#[derive(Default)]
pub struct MemStore {
    users: RwLock<HashMap<EntityId, User>>,
    folders: RwLock<HashMap<EntityId, Folder>>,
    files: RwLock<HashMap<EntityId, FileEntity>>,
    items: RwLock<HashMap<EntityId, Item>>,
    jobs: RwLock<HashMap<EntityId, Job>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn toggle_marker(markers: &mut HashMap<String, bool>, marker: &str, enabled: bool) {
    if enabled {
        markers.insert(marker.to_string(), true);
    } else {
        markers.remove(marker);
    }
}

fn has_marker(markers: &HashMap<String, bool>, marker: &str) -> bool {
    markers.get(marker).copied().unwrap_or(false)
}

#[async_trait]
impl Store for MemStore {
    async fn user(&self, id: EntityId) -> Option<User> {
        self.users.read().await.get(&id).cloned()
    }

    async fn folder(&self, id: EntityId) -> Option<Folder> {
        self.folders.read().await.get(&id).cloned()
    }

    async fn file(&self, id: EntityId) -> Option<FileEntity> {
        self.files.read().await.get(&id).cloned()
    }

    async fn upsert_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    async fn upsert_folder(&self, folder: Folder) {
        self.folders.write().await.insert(folder.id, folder);
    }

    async fn upsert_file(&self, file: FileEntity) {
        self.files.write().await.insert(file.id, file);
    }

    async fn upsert_item(&self, item: Item) {
        self.items.write().await.insert(item.id, item);
    }

    async fn set_folder_marker(
        &self,
        id: EntityId,
        marker: &str,
        enabled: bool,
    ) -> Result<(), ApiError> {
        let mut folders = self.folders.write().await;
        let folder = folders.get_mut(&id).ok_or(ApiError::NotFound {
            kind: "folder",
            id: id.to_string(),
        })?;
        toggle_marker(&mut folder.markers, marker, enabled);
        Ok(())
    }

    async fn set_file_marker(
        &self,
        id: EntityId,
        marker: &str,
        enabled: bool,
    ) -> Result<(), ApiError> {
        let mut files = self.files.write().await;
        let file = files.get_mut(&id).ok_or(ApiError::NotFound {
            kind: "file",
            id: id.to_string(),
        })?;
        toggle_marker(&mut file.markers, marker, enabled);
        Ok(())
    }

    async fn find_marked_folder(&self, marker: &str) -> Option<Folder> {
        self.folders
            .read()
            .await
            .values()
            .find(|f| has_marker(&f.markers, marker))
            .cloned()
    }

    async fn find_marked_file(&self, marker: &str) -> Option<FileEntity> {
        self.files
            .read()
            .await
            .values()
            .find(|f| has_marker(&f.markers, marker))
            .cloned()
    }

    async fn child_items(&self, folder_id: EntityId) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .items
            .read()
            .await
            .values()
            .filter(|i| i.folder_id == folder_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items
    }

    async fn files_of_item(&self, item_id: EntityId) -> Vec<FileEntity> {
        self.files
            .read()
            .await
            .values()
            .filter(|f| f.item_id == Some(item_id))
            .cloned()
            .collect()
    }

    async fn insert_job(&self, job: Job) {
        self.jobs.write().await.insert(job.id, job);
    }

    async fn save_job(&self, job: Job) -> Job {
        self.jobs.write().await.insert(job.id, job.clone());
        job
    }

    async fn job(&self, id: EntityId) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    async fn jobs_by_user(&self, user_id: EntityId) -> Vec<Job> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect()
    }

    async fn set_job_status(&self, id: EntityId, status: JobStatus) {
        if let Some(job) = self.jobs.write().await.get_mut(&id) {
            job.status = status;
        }
    }
}
