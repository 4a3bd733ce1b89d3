//! Settings resolution for osiris-lite.
//!
//! Every setting is resolved with a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided value, usually a CLI flag (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! Empty strings count as unset at every tier.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OSIRIS_REMOTE` | required | SSH host alias to connect to |
//! | `OSIRIS_REMOTE_PASSWORD` | none | Password for password authentication |
//! | `OSIRIS_REMOTE_PATH` | none | Working directory on the remote host |
//! | `OSIRIS_IMAGE` | `osiris-fuzzer` | Docker image name |
//! | `OSIRIS_CONTAINER` | `osiris-runner` | Container name prefix |
//! | `OSIRIS_DOCKERFILE` | `test/enigma-dark-invariants/remote/DOCKERFILE` | Dockerfile path, relative to the remote path |
//! | `OSIRIS_SSH_CONFIG` | `~/.ssh/config` | SSH client config file |
//! | `SSH_CONNECT_TIMEOUT` | 30s | Connection timeout in seconds |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use super::error::RemoteError;
use super::host_config::default_config_path;
use super::types::expand_home;

/// Default SSH connection timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default docker image name
pub const DEFAULT_IMAGE: &str = "osiris-fuzzer";

/// Default container name prefix
pub const DEFAULT_CONTAINER: &str = "osiris-runner";

/// Default Dockerfile, relative to the remote path
pub const DEFAULT_DOCKERFILE: &str = "test/enigma-dark-invariants/remote/DOCKERFILE";

pub(crate) const REMOTE_ENV_VAR: &str = "OSIRIS_REMOTE";
pub(crate) const PASSWORD_ENV_VAR: &str = "OSIRIS_REMOTE_PASSWORD";
pub(crate) const REMOTE_PATH_ENV_VAR: &str = "OSIRIS_REMOTE_PATH";
pub(crate) const IMAGE_ENV_VAR: &str = "OSIRIS_IMAGE";
pub(crate) const CONTAINER_ENV_VAR: &str = "OSIRIS_CONTAINER";
pub(crate) const DOCKERFILE_ENV_VAR: &str = "OSIRIS_DOCKERFILE";
pub(crate) const SSH_CONFIG_ENV_VAR: &str = "OSIRIS_SSH_CONFIG";

/// Environment variable name for SSH connection timeout
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_CONNECT_TIMEOUT";

/// Resolve an optional string with priority: parameter -> env var
pub(crate) fn resolve_optional(param: Option<&str>, env_var: &str) -> Option<String> {
    // Priority 1: Use parameter if provided
    if let Some(value) = param.filter(|v| !v.is_empty()) {
        return Some(value.to_string());
    }

    // Priority 2: Use environment variable if set
    env::var(env_var).ok().filter(|v| !v.is_empty())
}

/// Resolve a string with priority: parameter -> env var -> default
pub(crate) fn resolve_with_default(param: Option<&str>, env_var: &str, default: &str) -> String {
    resolve_optional(param, env_var).unwrap_or_else(|| default.to_string())
}

/// Resolve the connection timeout value with priority: parameter -> env var -> default
///
/// Zero is treated like an invalid value at every tier.
pub(crate) fn resolve_connect_timeout(timeout_param: Option<u64>) -> u64 {
    // Priority 1: Use parameter if provided
    if let Some(timeout) = timeout_param.filter(|t| *t > 0) {
        return timeout;
    }

    // Priority 2: Use environment variable if set
    if let Ok(env_timeout) = env::var(CONNECT_TIMEOUT_ENV_VAR)
        && let Ok(timeout) = env_timeout.parse::<u64>()
        && timeout > 0
    {
        return timeout;
    }

    // Priority 3: Default value
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Resolve the SSH config path with priority: parameter -> env var -> `~/.ssh/config`
pub(crate) fn resolve_ssh_config_path(param: Option<&str>) -> PathBuf {
    if let Some(path) = resolve_optional(param, SSH_CONFIG_ENV_VAR) {
        return expand_home(&path);
    }
    default_config_path().unwrap_or_else(|| PathBuf::from(".ssh/config"))
}

/// Explicit values, typically taken from CLI flags. `None` falls through to
/// the environment and then to the default.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub remote: Option<String>,
    pub password: Option<String>,
    pub remote_path: Option<String>,
    pub image: Option<String>,
    pub container: Option<String>,
    pub dockerfile: Option<String>,
    pub ssh_config: Option<String>,
    pub connect_timeout_secs: Option<u64>,
}

/// Settings resolved once at process entry and passed by reference.
#[derive(Clone)]
pub struct Settings {
    pub remote: String,
    pub password: Option<String>,
    pub remote_path: Option<String>,
    pub image: String,
    pub container: String,
    pub dockerfile: String,
    pub ssh_config_path: PathBuf,
    pub connect_timeout: Duration,
}

impl Settings {
    /// Resolve every setting. Fails only when no remote alias is available.
    pub fn resolve(overrides: &SettingsOverrides) -> Result<Self, RemoteError> {
        let remote = resolve_optional(overrides.remote.as_deref(), REMOTE_ENV_VAR)
            .ok_or(RemoteError::MissingSetting("remote"))?;

        Ok(Self {
            remote,
            password: resolve_optional(overrides.password.as_deref(), PASSWORD_ENV_VAR),
            remote_path: resolve_optional(overrides.remote_path.as_deref(), REMOTE_PATH_ENV_VAR),
            image: resolve_with_default(overrides.image.as_deref(), IMAGE_ENV_VAR, DEFAULT_IMAGE),
            container: resolve_with_default(
                overrides.container.as_deref(),
                CONTAINER_ENV_VAR,
                DEFAULT_CONTAINER,
            ),
            dockerfile: resolve_with_default(
                overrides.dockerfile.as_deref(),
                DOCKERFILE_ENV_VAR,
                DEFAULT_DOCKERFILE,
            ),
            ssh_config_path: resolve_ssh_config_path(overrides.ssh_config.as_deref()),
            connect_timeout: Duration::from_secs(resolve_connect_timeout(
                overrides.connect_timeout_secs,
            )),
        })
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("remote", &self.remote)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("remote_path", &self.remote_path)
            .field("image", &self.image)
            .field("container", &self.container)
            .field("dockerfile", &self.dockerfile)
            .field("ssh_config_path", &self.ssh_config_path)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
