//! Job submission and listing.
//!
//! Submission is fire-and-forget: the gateway builds one task descriptor,
//! receives a just-scheduled job record from the dispatcher, attaches the
//! source and output folder ids, and persists the record. Whether the run
//! ultimately succeeds is only ever visible through the record's status
//! field, which the runner updates on its own.

use crate::dispatch::{Arg, Dispatcher, ResultHook, TaskSpec};
use crate::error::ApiError;
use crate::store::{FileEntity, Folder, Job, Store, User};

/// Default page size for job listings.
pub const DEFAULT_JOB_LIMIT: usize = 10;

/// Sort key for job listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobSort {
    #[default]
    Created,
    Title,
    Status,
}

impl JobSort {
    /// Parse the REST `sort` parameter.
    pub fn parse(s: &str) -> Result<Self, ApiError> {
        match s {
            "created" => Ok(Self::Created),
            "title" => Ok(Self::Title),
            "status" => Ok(Self::Status),
            other => Err(ApiError::Validation {
                param: "sort",
                reason: format!("unknown sort field '{}'", other),
            }),
        }
    }
}

/// Pagination and ordering for job listings.
#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
    pub limit: usize,
    pub offset: usize,
    pub sort: JobSort,
    /// Descending is the default: newest first.
    pub descending: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_JOB_LIMIT,
            offset: 0,
            sort: JobSort::Created,
            descending: true,
        }
    }
}

/// Submit one algorithm run against `folder`, writing results into
/// `output_folder`. Returns the persisted job record.
///
/// The caller-facing route has already resolved the three references at the
/// required access levels; by the time this runs, failing is the
/// dispatcher's privilege.
pub async fn submit(
    store: &dyn Store,
    dispatcher: &dyn Dispatcher,
    image: &str,
    folder: &Folder,
    params_file: &FileEntity,
    output_folder: &Folder,
    caller: &User,
) -> Result<Job, ApiError> {
    let spec = TaskSpec {
        image: image.to_string(),
        args: vec![
            Arg::FolderVolume(folder.id),
            Arg::FileVolume(params_file.id),
            Arg::Literal("--workingfolder".to_string()),
            Arg::OutputPath,
        ],
        title: format!("UTM: {}", folder.name),
        hooks: vec![ResultHook::UploadToFolder(output_folder.id)],
    };

    let mut job = dispatcher.submit(spec, caller).await?;
    job.utm_folder_id = Some(folder.id);
    job.utm_output_folder_id = Some(output_folder.id);
    let job = store.save_job(job).await;

    tracing::info!(
        job_id = %job.id,
        folder_id = %folder.id,
        output_folder_id = %output_folder.id,
        "Submitted algorithm run"
    );
    Ok(job)
}

/// List `target`'s algorithm jobs as visible to `caller`.
///
/// Jobs are matched by owner and by presence of the source-folder tag,
/// sorted, filtered to records the caller may read, and only then
/// paginated, so a page is never silently shortened by invisible records.
pub async fn list(
    store: &dyn Store,
    target: &User,
    caller: &User,
    opts: ListOptions,
) -> Vec<Job> {
    let mut jobs: Vec<Job> = store
        .jobs_by_user(target.id)
        .await
        .into_iter()
        .filter(|j| j.utm_folder_id.is_some())
        .collect();

    jobs.sort_by(|a, b| {
        let ord = match opts.sort {
            JobSort::Created => a.created.cmp(&b.created),
            JobSort::Title => a.title.cmp(&b.title),
            JobSort::Status => (a.status as u8).cmp(&(b.status as u8)),
        };
        if opts.descending { ord.reverse() } else { ord }
    });

    jobs.into_iter()
        .filter(|j| j.readable_by(caller))
        .skip(opts.offset)
        .take(opts.limit)
        .collect()
}
