//! Demo-data and examples-folder tagging.
//!
//! Both roles are designated by a marker field on the entity itself rather
//! than a dedicated config record, so "which folder is it" is answered by
//! scanning for the first tagged entity. Nothing serializes concurrent
//! re-tagging: setting the marker on a new folder without clearing the old
//! one leaves two folders tagged (covered by a regression test in
//! `store::mem`).

use serde::Serialize;

use crate::error::ApiError;
use crate::store::{
    DEMO_DATA_MARKER, EXAMPLE_FOLDER_MARKER, FileEntity, Folder, Item, Store,
};

/// Demo-data lookup result. Either side may be absent when nothing is
/// tagged; that is a normal answer, not an error.
#[derive(Debug, Serialize)]
pub struct DemoData {
    pub folder: Option<Folder>,
    #[serde(rename = "paramsFile")]
    pub params_file: Option<FileEntity>,
}

/// Tag or untag `folder` as the examples folder. Returns `enabled` as
/// confirmation.
pub async fn set_examples_folder(
    store: &dyn Store,
    folder: &Folder,
    enabled: bool,
) -> Result<bool, ApiError> {
    store
        .set_folder_marker(folder.id, EXAMPLE_FOLDER_MARKER, enabled)
        .await?;
    tracing::info!(folder_id = %folder.id, enabled, "Examples folder updated");
    Ok(enabled)
}

/// List the items of whichever folder currently carries the examples
/// marker. Empty when no folder is tagged.
pub async fn list_examples(store: &dyn Store) -> Vec<Item> {
    match store.find_marked_folder(EXAMPLE_FOLDER_MARKER).await {
        Some(folder) => store.child_items(folder.id).await,
        None => Vec::new(),
    }
}

/// Tag or untag the demo input folder and its params file together.
pub async fn set_demo_data(
    store: &dyn Store,
    folder: &Folder,
    params_file: &FileEntity,
    enabled: bool,
) -> Result<bool, ApiError> {
    store
        .set_folder_marker(folder.id, DEMO_DATA_MARKER, enabled)
        .await?;
    store
        .set_file_marker(params_file.id, DEMO_DATA_MARKER, enabled)
        .await?;
    tracing::info!(
        folder_id = %folder.id,
        params_id = %params_file.id,
        enabled,
        "Demo data updated"
    );
    Ok(enabled)
}

pub async fn get_demo_data(store: &dyn Store) -> DemoData {
    DemoData {
        folder: store.find_marked_folder(DEMO_DATA_MARKER).await,
        params_file: store.find_marked_file(DEMO_DATA_MARKER).await,
    }
}
