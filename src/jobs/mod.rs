//! Workflow verbs for containerised jobs on the remote host.
//!
//! Each verb is a short sequence of shell commands issued through a
//! [`CommandRunner`]:
//!
//! - `run`: build the image, then run a command in a fresh container with live output
//! - `status`: running containers, fuzzer processes and host resources
//! - `kill_all` / `kill_container`: stop (and for `kill_all`, remove) containers
//! - `logs`: follow the logs of a container, picking the first running one by default

pub mod commands;
pub mod types;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::remote::{CommandRunner, RemoteError};

pub use types::{JobConfig, KillOutcome, ProcessEntry, RemoteStatus, ResourceUsage};

/// Errors produced by the workflow verbs.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// `logs` was asked to pick a container but none is running
    #[error("no running containers found for image {image}")]
    NoRunningContainer { image: String },

    /// `docker build` failed; the build output is on the source error
    #[error("failed to build Docker image {image}")]
    BuildFailed {
        image: String,
        #[source]
        source: RemoteError,
    },

    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),
}

impl JobError {
    /// Remote output captured before the failure, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Remote(e) | Self::BuildFailed { source: e, .. } => e.output(),
            _ => None,
        }
    }
}

/// Workflow verbs bound to one runner and one job configuration.
pub struct Jobs<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    config: JobConfig,
}

impl<'a, R: CommandRunner + ?Sized> Jobs<'a, R> {
    pub fn new(runner: &'a R, config: JobConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Build the image, then run `command` in a new container, streaming its output.
    ///
    /// Returns the generated container name.
    #[instrument(skip(self), fields(image = %self.config.image))]
    pub async fn run(&self, command: &str) -> Result<String, JobError> {
        let remote_path = self
            .config
            .remote_path
            .as_deref()
            .ok_or(JobError::MissingSetting("remote_path"))?;

        info!(dockerfile = %self.config.dockerfile, "building Docker image");
        let build = commands::build_image(remote_path, &self.config.image, &self.config.dockerfile);
        self.runner
            .run_buffered(&build)
            .await
            .map_err(|source| JobError::BuildFailed {
                image: self.config.image.clone(),
                source,
            })?;
        info!("Docker build completed");

        let container_name = commands::container_name(&self.config.container, Utc::now());
        info!(container = %container_name, "running command in container");

        let run = commands::run_in_container(remote_path, &container_name, &self.config.image, command);
        self.runner.run_streamed(&run).await?;

        Ok(container_name)
    }

    /// Collect containers, fuzzer processes and resource usage.
    ///
    /// Resource probes that fail are left out rather than failing the verb.
    #[instrument(skip(self), fields(image = %self.config.image))]
    pub async fn status(&self) -> Result<RemoteStatus, JobError> {
        let containers = self
            .runner
            .run_buffered(&commands::list_containers(&self.config.image))
            .await?
            .lines()
            .map(String::from)
            .collect();

        let processes = self
            .runner
            .run_buffered(commands::FUZZER_PROCESSES)
            .await?
            .lines()
            .map(ProcessEntry::parse)
            .collect();

        let resources = ResourceUsage {
            cpu: self.probe(commands::CPU_USAGE).await,
            memory: self.probe(commands::MEMORY_USAGE).await,
            disk: self.probe(commands::DISK_USAGE).await,
        };

        Ok(RemoteStatus {
            containers,
            processes,
            resources,
        })
    }

    async fn probe(&self, command: &str) -> Option<String> {
        match self.runner.run_buffered(command).await {
            Ok(output) => Some(output.trimmed().to_string()),
            Err(e) => {
                debug!(command = %command, error = %e, "resource probe failed");
                None
            }
        }
    }

    /// Stop, then remove, every container of the image.
    #[instrument(skip(self), fields(image = %self.config.image))]
    pub async fn kill_all(&self) -> Result<(), JobError> {
        self.runner
            .run_buffered(&commands::stop_all(&self.config.image))
            .await?;
        self.runner
            .run_buffered(&commands::remove_all(&self.config.image))
            .await?;
        info!("all containers stopped and removed");
        Ok(())
    }

    /// Stop one container. A container that does not exist is not an error.
    #[instrument(skip(self))]
    pub async fn kill_container(&self, container_id: &str) -> Result<KillOutcome, JobError> {
        match self
            .runner
            .run_buffered(&commands::stop_container(container_id))
            .await
        {
            Ok(_) => Ok(KillOutcome::Stopped),
            Err(e) if e.is_missing_container() => {
                warn!(container = %container_id, "container does not exist");
                Ok(KillOutcome::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Follow a container's logs until the remote side ends the stream.
    ///
    /// Without an ID, the first running container of the image is used.
    /// Returns the ID that was followed.
    #[instrument(skip(self), fields(image = %self.config.image))]
    pub async fn logs(&self, container_id: Option<&str>) -> Result<String, JobError> {
        let container_id = match container_id.filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => self.first_running_container().await?,
        };

        info!(container = %container_id, "following container logs");
        self.runner
            .run_streamed(&commands::follow_logs(&container_id))
            .await?;
        Ok(container_id)
    }

    async fn first_running_container(&self) -> Result<String, JobError> {
        let output = self
            .runner
            .run_buffered(&commands::first_container_id(&self.config.image))
            .await?;

        let id = output.trimmed();
        if id.is_empty() {
            return Err(JobError::NoRunningContainer {
                image: self.config.image.clone(),
            });
        }
        Ok(id.to_string())
    }
}
