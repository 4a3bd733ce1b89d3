//! Data returned by the workflow verbs.

use serde::Serialize;

use crate::remote::Settings;

/// Names and paths the verbs operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    pub image: String,
    /// Prefix for generated container names
    pub container: String,
    /// Dockerfile path, relative to `remote_path`
    pub dockerfile: String,
    /// Project directory on the remote host; required by `run`
    pub remote_path: Option<String>,
}

impl From<&Settings> for JobConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            image: settings.image.clone(),
            container: settings.container.clone(),
            dockerfile: settings.dockerfile.clone(),
            remote_path: settings.remote_path.clone(),
        }
    }
}

/// One line of `pgrep -a` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    /// Executable name; arguments are dropped
    pub command: String,
}

impl ProcessEntry {
    /// Parse `PID COMMAND [ARGS...]`. Lines without a command keep the whole
    /// line as the command.
    pub fn parse(line: &str) -> Self {
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next()) {
            (Some(pid), Some(command)) => Self {
                pid: Some(pid.to_string()),
                command: command.to_string(),
            },
            _ => Self {
                pid: None,
                command: line.trim().to_string(),
            },
        }
    }
}

/// Host resource usage. A probe that failed is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub disk: Option<String>,
}

/// Snapshot of jobs and resources on the remote host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteStatus {
    /// `ID NAME STATUS (AGE)` per running container of the image
    pub containers: Vec<String>,
    pub processes: Vec<ProcessEntry>,
    pub resources: ResourceUsage,
}

impl RemoteStatus {
    /// Render as a box-drawing tree.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("┌─ Docker Containers\n");
        if self.containers.is_empty() {
            out.push_str("│  No active containers\n");
        }
        for container in &self.containers {
            out.push_str(&format!("│  {container}\n"));
        }
        out.push_str("│\n");

        out.push_str("├─ Fuzzer Processes\n");
        if self.processes.is_empty() {
            out.push_str("│  No active processes\n");
        }
        for process in &self.processes {
            match &process.pid {
                Some(pid) => out.push_str(&format!("│  {pid}: {}\n", process.command)),
                None => out.push_str(&format!("│  {}\n", process.command)),
            }
        }
        out.push_str("│\n");

        out.push_str("└─ System Resources\n");
        let resources = [
            ("CPU", &self.resources.cpu),
            ("Memory", &self.resources.memory),
            ("Disk", &self.resources.disk),
        ];
        for (label, value) in resources {
            if let Some(value) = value {
                out.push_str(&format!("   {label}: {value}\n"));
            }
        }

        out
    }
}

/// Result of stopping a single container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    Stopped,
    /// Docker reported that no container has this ID
    NotFound,
}
