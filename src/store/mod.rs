//! Entity model and storage seam.
//!
//! The hierarchy is small: folders contain items, items carry files, users
//! own jobs. Folders and files additionally carry marker fields, string-keyed
//! boolean tags where presence means true; clearing a marker removes the key
//! entirely rather than setting it to false.
//!
//! Updates are last-write-wins per entity. There are no cross-entity
//! transactions, which is why two folders can end up carrying the same
//! "singleton" marker at once (see `markers`).

pub mod access;
mod mem;

pub use mem::MemStore;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// Marker designating the folder whose items are the example screenshots.
pub const EXAMPLE_FOLDER_MARKER: &str = "utmExampleFolder";
/// Marker designating the active demo input folder and params file.
pub const DEMO_DATA_MARKER: &str = "utmDemoData";

pub type EntityId = Uuid;

/// Access level required for an operation. Ordering matters: a grant at
/// `Write` satisfies a `Read` requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub login: String,
    /// Site administrators pass every access check.
    pub admin: bool,
}

/// Access-control list attached to folders and files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Acl {
    /// Publicly readable, anonymous callers included.
    #[serde(default)]
    pub public: bool,
    /// Per-user grants. Levels are cumulative; the grant must be at or
    /// above the required level.
    #[serde(default)]
    pub grants: HashMap<EntityId, AccessLevel>,
}

impl Acl {
    /// An ACL granting full control to a single user.
    pub fn private_to(owner: EntityId) -> Self {
        Self {
            public: false,
            grants: HashMap::from([(owner, AccessLevel::Admin)]),
        }
    }

    /// Same as [`Acl::private_to`] but readable by everyone.
    pub fn public_owned_by(owner: EntityId) -> Self {
        Self {
            public: true,
            grants: HashMap::from([(owner, AccessLevel::Admin)]),
        }
    }

    pub fn permits(&self, user: Option<&User>, level: AccessLevel) -> bool {
        if let Some(u) = user
            && u.admin
        {
            return true;
        }
        if self.public && level == AccessLevel::Read {
            return true;
        }
        match user {
            Some(u) => self.grants.get(&u.id).is_some_and(|g| *g >= level),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub markers: HashMap<String, bool>,
    #[serde(default)]
    pub acl: Acl,
}

/// A named child of a folder. Files hang off items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: EntityId,
    #[serde(rename = "folderId")]
    pub folder_id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntity {
    pub id: EntityId,
    /// Parent item, when the file lives inside the folder hierarchy.
    #[serde(rename = "itemId", skip_serializing_if = "Option::is_none")]
    pub item_id: Option<EntityId>,
    pub name: String,
    #[serde(default)]
    pub markers: HashMap<String, bool>,
    #[serde(default)]
    pub acl: Acl,
    /// Raw bytes. Never serialized into REST responses.
    #[serde(skip)]
    pub content: Vec<u8>,
}

/// Lifecycle states of a job. Owned and transitioned by the runner; the
/// REST layer only stores and returns the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One asynchronous execution request and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: EntityId,
    /// Owning user.
    #[serde(rename = "userId")]
    pub user_id: EntityId,
    pub title: String,
    pub created: DateTime<Utc>,
    pub status: JobStatus,
    /// Source folder the algorithm ran against. Its presence is what
    /// distinguishes these jobs from unrelated job types sharing the store.
    #[serde(rename = "utmFolderId", skip_serializing_if = "Option::is_none")]
    pub utm_folder_id: Option<EntityId>,
    /// Folder the results were uploaded into.
    #[serde(rename = "utmOutputFolderId", skip_serializing_if = "Option::is_none")]
    pub utm_output_folder_id: Option<EntityId>,
}

impl Job {
    /// Whether `user` may read this record: the owner and site admins.
    pub fn readable_by(&self, user: &User) -> bool {
        user.admin || user.id == self.user_id
    }
}

/// Storage seam used by every service operation.
#[async_trait]
pub trait Store: Send + Sync {
    async fn user(&self, id: EntityId) -> Option<User>;
    async fn folder(&self, id: EntityId) -> Option<Folder>;
    async fn file(&self, id: EntityId) -> Option<FileEntity>;

    async fn upsert_user(&self, user: User);
    async fn upsert_folder(&self, folder: Folder);
    async fn upsert_file(&self, file: FileEntity);
    async fn upsert_item(&self, item: Item);

    /// Set (`enabled`) or remove (`!enabled`) a marker on a folder.
    async fn set_folder_marker(
        &self,
        id: EntityId,
        marker: &str,
        enabled: bool,
    ) -> Result<(), ApiError>;
    /// Set (`enabled`) or remove (`!enabled`) a marker on a file.
    async fn set_file_marker(
        &self,
        id: EntityId,
        marker: &str,
        enabled: bool,
    ) -> Result<(), ApiError>;

    /// First folder carrying `marker`, in store-defined order.
    async fn find_marked_folder(&self, marker: &str) -> Option<Folder>;
    /// First file carrying `marker`, in store-defined order.
    async fn find_marked_file(&self, marker: &str) -> Option<FileEntity>;

    /// Child items of a folder, ordered by name.
    async fn child_items(&self, folder_id: EntityId) -> Vec<Item>;
    async fn files_of_item(&self, item_id: EntityId) -> Vec<FileEntity>;

    async fn insert_job(&self, job: Job);
    /// Persist an updated job record, returning the stored copy.
    async fn save_job(&self, job: Job) -> Job;
    async fn job(&self, id: EntityId) -> Option<Job>;
    /// All jobs owned by `user_id`, unsorted.
    async fn jobs_by_user(&self, user_id: EntityId) -> Vec<Job>;
    async fn set_job_status(&self, id: EntityId, status: JobStatus);
}
