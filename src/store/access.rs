//! Entity resolution with access enforcement.
//!
//! Every REST operation resolves its references through these helpers, so
//! the lookup, the permission check, and the error mapping live in one
//! place. A reference that does not resolve is `NotFound`; one the caller
//! cannot use at the required level is `PermissionDenied`.

use crate::error::ApiError;
use crate::store::{AccessLevel, EntityId, FileEntity, Folder, Store, User};

pub async fn resolve_folder(
    store: &dyn Store,
    id: EntityId,
    caller: Option<&User>,
    level: AccessLevel,
) -> Result<Folder, ApiError> {
    let folder = store.folder(id).await.ok_or(ApiError::NotFound {
        kind: "folder",
        id: id.to_string(),
    })?;
    if !folder.acl.permits(caller, level) {
        return Err(ApiError::PermissionDenied(format!(
            "insufficient {} access on folder {}",
            level, id
        )));
    }
    Ok(folder)
}

pub async fn resolve_file(
    store: &dyn Store,
    id: EntityId,
    caller: Option<&User>,
    level: AccessLevel,
) -> Result<FileEntity, ApiError> {
    let file = store.file(id).await.ok_or(ApiError::NotFound {
        kind: "file",
        id: id.to_string(),
    })?;
    if !file.acl.permits(caller, level) {
        return Err(ApiError::PermissionDenied(format!(
            "insufficient {} access on file {}",
            level, id
        )));
    }
    Ok(file)
}

/// Resolve a user reference. User records have no ACL of their own; any
/// logged-in caller may reference one, so this is an existence check.
pub async fn resolve_user(store: &dyn Store, id: EntityId) -> Result<User, ApiError> {
    store.user(id).await.ok_or(ApiError::NotFound {
        kind: "user",
        id: id.to_string(),
    })
}
