//! Docker-backed runner.
//!
//! Each submitted task becomes one container run: stored inputs are staged
//! into a scratch directory and bind-mounted read-only, a writable results
//! directory stands in for the output-path placeholder, and on a zero exit
//! the upload hook copies every produced artifact back into the output
//! folder as an item + file pair. The runner alone transitions the job
//! record's status; failures surface there, never on the submit call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::config::RunnerConfig;
use crate::dispatch::{Arg, Dispatcher, RESULTS_DIR, ResultHook, TaskSpec};
use crate::error::ApiError;
use crate::store::{EntityId, FileEntity, Item, Job, JobStatus, Store, User};

/// Mount prefix inside the algorithm container.
const MOUNT_ROOT: &str = "/mnt/utm";

#[derive(Clone)]
pub struct DockerRunner {
    config: RunnerConfig,
    store: Arc<dyn Store>,
    /// Cached Docker connection (created on first use).
    docker: Arc<RwLock<Option<bollard::Docker>>>,
}

impl DockerRunner {
    pub fn new(config: RunnerConfig, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            store,
            docker: Arc::new(RwLock::new(None)),
        }
    }

    /// Get or create a Docker connection.
    async fn docker(&self) -> Result<bollard::Docker, ApiError> {
        {
            let guard = self.docker.read().await;
            if let Some(ref d) = *guard {
                return Ok(d.clone());
            }
        }
        let docker = bollard::Docker::connect_with_local_defaults()
            .map_err(|e| ApiError::Dispatch(format!("cannot reach Docker: {}", e)))?;
        *self.docker.write().await = Some(docker.clone());
        Ok(docker)
    }

    /// Make sure the algorithm image is available locally.
    async fn ensure_image(&self, docker: &bollard::Docker) -> Result<(), ApiError> {
        if docker.inspect_image(&self.config.image).await.is_ok() {
            return Ok(());
        }
        if !self.config.auto_pull_image {
            return Err(ApiError::Dispatch(format!(
                "image {} not present locally and auto-pull is disabled",
                self.config.image
            )));
        }

        tracing::info!(image = %self.config.image, "Pulling algorithm image");
        let mut pull = Box::pin(docker.create_image(
            Some(CreateImageOptions {
                from_image: self.config.image.clone(),
                ..Default::default()
            }),
            None,
            None,
        ));
        while let Some(step) = pull.next().await {
            step.map_err(|e| ApiError::Dispatch(format!("image pull failed: {}", e)))?;
        }
        Ok(())
    }

    fn scratch_dir(&self, job_id: EntityId) -> Result<PathBuf, ApiError> {
        let base = self
            .config
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let dir = base.join(format!("utm-{}", job_id));
        std::fs::create_dir_all(&dir).map_err(|e| {
            ApiError::Dispatch(format!("failed to create scratch dir {}: {}", dir.display(), e))
        })?;
        Ok(dir)
    }

    /// Materialize volume references under `scratch` and produce the
    /// concrete argument vector plus the Docker bind strings.
    async fn stage(
        &self,
        scratch: &Path,
        args: &[Arg],
    ) -> Result<(Vec<String>, Vec<String>, PathBuf), ApiError> {
        let results_host = scratch.join(RESULTS_DIR);
        std::fs::create_dir_all(&results_host)
            .map_err(|e| ApiError::Dispatch(format!("failed to create results dir: {}", e)))?;

        let mut resolved = Vec::with_capacity(args.len());
        let mut binds = Vec::new();
        let mut output_bound = false;

        for (idx, arg) in args.iter().enumerate() {
            match arg {
                Arg::Literal(s) => resolved.push(s.clone()),
                Arg::FolderVolume(id) => {
                    let host = scratch.join(format!("in-{}", idx));
                    self.stage_folder(*id, &host).await?;
                    let mount = format!("{}/in-{}", MOUNT_ROOT, idx);
                    binds.push(format!("{}:{}:ro", host.display(), mount));
                    resolved.push(mount);
                }
                Arg::FileVolume(id) => {
                    let file = self.store.file(*id).await.ok_or(ApiError::NotFound {
                        kind: "file",
                        id: id.to_string(),
                    })?;
                    let host = scratch.join(format!("file-{}", idx));
                    std::fs::create_dir_all(&host).map_err(|e| {
                        ApiError::Dispatch(format!("failed to stage file dir: {}", e))
                    })?;
                    std::fs::write(host.join(&file.name), &file.content).map_err(|e| {
                        ApiError::Dispatch(format!("failed to stage file {}: {}", file.name, e))
                    })?;
                    let mount_dir = format!("{}/file-{}", MOUNT_ROOT, idx);
                    binds.push(format!("{}:{}:ro", host.display(), mount_dir));
                    resolved.push(format!("{}/{}", mount_dir, file.name));
                }
                Arg::OutputPath => {
                    let mount = format!("{}/{}", MOUNT_ROOT, RESULTS_DIR);
                    if !output_bound {
                        binds.push(format!("{}:{}:rw", results_host.display(), mount));
                        output_bound = true;
                    }
                    resolved.push(mount);
                }
            }
        }

        Ok((resolved, binds, results_host))
    }

    /// Write a folder's files to `host`, one file per item file.
    async fn stage_folder(&self, folder_id: EntityId, host: &Path) -> Result<(), ApiError> {
        std::fs::create_dir_all(host)
            .map_err(|e| ApiError::Dispatch(format!("failed to stage folder dir: {}", e)))?;
        for item in self.store.child_items(folder_id).await {
            for file in self.store.files_of_item(item.id).await {
                std::fs::write(host.join(&file.name), &file.content).map_err(|e| {
                    ApiError::Dispatch(format!("failed to stage file {}: {}", file.name, e))
                })?;
            }
        }
        Ok(())
    }

    /// Upload hook: one item + file per artifact found under `results`.
    async fn upload_results(
        &self,
        results: &Path,
        folder_id: EntityId,
    ) -> Result<usize, ApiError> {
        let folder = self.store.folder(folder_id).await.ok_or(ApiError::NotFound {
            kind: "folder",
            id: folder_id.to_string(),
        })?;

        let entries = std::fs::read_dir(results)
            .map_err(|e| ApiError::Dispatch(format!("failed to read results dir: {}", e)))?;

        let mut uploaded = 0;
        for entry in entries {
            let entry =
                entry.map_err(|e| ApiError::Dispatch(format!("failed to read results dir: {}", e)))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let content = std::fs::read(entry.path())
                .map_err(|e| ApiError::Dispatch(format!("failed to read artifact {}: {}", name, e)))?;

            let item = Item {
                id: Uuid::new_v4(),
                folder_id,
                name: name.clone(),
            };
            let file = FileEntity {
                id: Uuid::new_v4(),
                item_id: Some(item.id),
                name,
                markers: Default::default(),
                acl: folder.acl.clone(),
                content,
            };
            self.store.upsert_item(item).await;
            self.store.upsert_file(file).await;
            uploaded += 1;
        }

        tracing::info!(folder_id = %folder_id, uploaded, "Uploaded results into output folder");
        Ok(uploaded)
    }

    /// Run the container to completion and fire the result hooks.
    async fn run_container(&self, job_id: EntityId, spec: &TaskSpec) -> Result<(), ApiError> {
        let scratch = self.scratch_dir(job_id)?;
        let (cmd, binds, results_host) = self.stage(&scratch, &spec.args).await?;

        let docker = self.docker().await?;
        self.ensure_image(&docker).await?;

        let host_config = HostConfig {
            binds: if binds.is_empty() { None } else { Some(binds) },
            memory: Some((self.config.memory_limit_mb * 1024 * 1024) as i64),
            cpu_shares: Some(self.config.cpu_shares as i64),
            network_mode: Some("bridge".to_string()),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(cmd),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: format!("utm-{}", job_id),
            ..Default::default()
        };

        let response = docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| ApiError::Dispatch(format!("failed to create container: {}", e)))?;
        let container_id = response.id;

        docker
            .start_container::<String>(&container_id, None)
            .await
            .map_err(|e| ApiError::Dispatch(format!("failed to start container: {}", e)))?;

        tracing::info!(job_id = %job_id, "Started algorithm container");

        let mut wait = Box::pin(docker.wait_container(&container_id, None::<WaitContainerOptions<String>>));
        let status_code = match wait.next().await {
            Some(Ok(resp)) => resp.status_code,
            Some(Err(e)) => {
                return Err(ApiError::Dispatch(format!("container wait failed: {}", e)));
            }
            None => {
                return Err(ApiError::Dispatch(
                    "container wait ended without a status".to_string(),
                ));
            }
        };

        if let Err(e) = docker
            .remove_container(
                &container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to remove container (may require manual cleanup)");
        }

        if status_code != 0 {
            return Err(ApiError::Dispatch(format!(
                "container exited with status {}",
                status_code
            )));
        }

        for hook in &spec.hooks {
            match hook {
                ResultHook::UploadToFolder(folder_id) => {
                    self.upload_results(&results_host, *folder_id).await?;
                }
            }
        }

        if let Err(e) = std::fs::remove_dir_all(&scratch) {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to remove scratch dir");
        }

        Ok(())
    }

    /// Body of the spawned runner task: walk the status machine.
    async fn run_task(&self, job_id: EntityId, spec: TaskSpec) {
        self.store.set_job_status(job_id, JobStatus::Running).await;
        match self.run_container(job_id, &spec).await {
            Ok(()) => {
                self.store.set_job_status(job_id, JobStatus::Succeeded).await;
                tracing::info!(job_id = %job_id, "Algorithm run completed");
            }
            Err(e) => {
                self.store.set_job_status(job_id, JobStatus::Failed).await;
                tracing::error!(job_id = %job_id, error = %e, "Algorithm run failed");
            }
        }
    }
}

#[async_trait]
impl Dispatcher for DockerRunner {
    async fn submit(&self, spec: TaskSpec, owner: &User) -> Result<Job, ApiError> {
        let job = Job {
            id: Uuid::new_v4(),
            user_id: owner.id,
            title: spec.title.clone(),
            created: Utc::now(),
            status: JobStatus::Queued,
            utm_folder_id: None,
            utm_output_folder_id: None,
        };
        self.store.insert_job(job.clone()).await;

        let runner = self.clone();
        let job_id = job.id;
        tokio::spawn(async move {
            runner.run_task(job_id, spec).await;
        });

        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::store::{Acl, Folder, MemStore};

    fn runner_with_store() -> (DockerRunner, Arc<MemStore>) {
        let store = Arc::new(MemStore::new());
        let runner = DockerRunner::new(RunnerConfig::default(), store.clone());
        (runner, store)
    }

    #[tokio::test]
    async fn stage_resolves_args_in_order() {
        let (runner, store) = runner_with_store();
        let scratch = tempfile::tempdir().unwrap();

        let folder_id = Uuid::new_v4();
        store
            .upsert_folder(Folder {
                id: folder_id,
                name: "scans".to_string(),
                markers: HashMap::new(),
                acl: Acl::default(),
            })
            .await;
        let params = FileEntity {
            id: Uuid::new_v4(),
            item_id: None,
            name: "params.csv".to_string(),
            markers: HashMap::new(),
            acl: Acl::default(),
            content: b"a,b\n1,2\n".to_vec(),
        };
        store.upsert_file(params.clone()).await;

        let args = vec![
            Arg::FolderVolume(folder_id),
            Arg::FileVolume(params.id),
            Arg::Literal("--workingfolder".to_string()),
            Arg::OutputPath,
        ];
        let (resolved, binds, results_host) =
            runner.stage(scratch.path(), &args).await.unwrap();

        assert_eq!(
            resolved,
            vec![
                "/mnt/utm/in-0".to_string(),
                "/mnt/utm/file-1/params.csv".to_string(),
                "--workingfolder".to_string(),
                "/mnt/utm/__results__".to_string(),
            ]
        );
        assert_eq!(binds.len(), 3);
        assert!(binds[0].ends_with(":/mnt/utm/in-0:ro"));
        assert!(binds[2].ends_with(":/mnt/utm/__results__:rw"));
        assert!(results_host.is_dir());
        // The params file was materialized on the host side.
        let staged = scratch.path().join("file-1").join("params.csv");
        assert_eq!(std::fs::read(staged).unwrap(), b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn stage_unknown_file_is_not_found() {
        let (runner, _store) = runner_with_store();
        let scratch = tempfile::tempdir().unwrap();

        let err = runner
            .stage(scratch.path(), &[Arg::FileVolume(Uuid::new_v4())])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound { kind: "file", .. }));
    }

    #[tokio::test]
    async fn upload_results_creates_item_and_file_per_artifact() {
        let (runner, store) = runner_with_store();
        let results = tempfile::tempdir().unwrap();
        std::fs::write(results.path().join("embedding.png"), b"png").unwrap();
        std::fs::write(results.path().join("clusters.csv"), b"csv").unwrap();

        let out = Folder {
            id: Uuid::new_v4(),
            name: "out".to_string(),
            markers: HashMap::new(),
            acl: Acl::default(),
        };
        store.upsert_folder(out.clone()).await;

        let uploaded = runner.upload_results(results.path(), out.id).await.unwrap();
        assert_eq!(uploaded, 2);

        let items = store.child_items(out.id).await;
        assert_eq!(items.len(), 2);
        let files = store.files_of_item(items[0].id).await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, items[0].name);
    }

    #[tokio::test]
    async fn submit_returns_queued_record() {
        let (runner, store) = runner_with_store();
        let owner = User {
            id: Uuid::new_v4(),
            login: "alice".to_string(),
            admin: false,
        };

        let spec = TaskSpec {
            image: "samuelgerber/utm".to_string(),
            args: vec![Arg::Literal("--help".to_string())],
            title: "UTM: scans".to_string(),
            hooks: Vec::new(),
        };
        let job = runner.submit(spec, &owner).await.unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.user_id, owner.id);
        assert!(store.job(job.id).await.is_some());
    }
}
