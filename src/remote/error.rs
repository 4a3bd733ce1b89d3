//! Error taxonomy for the remote execution layer.
//!
//! Every failure in this layer is fatal to the step that produced it; nothing
//! here is retried. The variants map onto the stage that failed:
//!
//! 1. **Configuration**: the alias could not be resolved into usable connection
//!    parameters, or a required setting was not supplied. No connection is
//!    attempted.
//! 2. **Authentication setup**: no usable authentication method could be built.
//! 3. **Connection**: dialing, tunneling through a relay, the SSH handshake or
//!    authentication itself failed. Partially opened layers are closed before
//!    the error is returned.
//! 4. **Command**: the remote command exited non-zero, was killed by a signal,
//!    never reported an exit status, or its channel failed. The captured output
//!    travels with the error so callers can recognise benign failures.
//!
//! # Examples
//!
//! ```rust,ignore
//! match session.run_buffered("docker stop --timeout -1 abc").await {
//!     Ok(_) => println!("stopped"),
//!     Err(e) if e.is_missing_container() => println!("already gone"),
//!     Err(e) => return Err(e.into()),
//! }
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Text the docker CLI prints when asked to act on an unknown container.
///
/// Callers match on this substring to tell "target does not exist" apart
/// from a genuine failure.
pub const NO_SUCH_CONTAINER: &str = "No such container";

/// Errors produced while resolving, connecting to, or executing on a remote host.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The host alias could not be resolved into connection parameters
    #[error("ssh config error for host '{alias}': {reason}")]
    Config { alias: String, reason: String },

    /// The SSH config file exists but could not be read
    #[error("cannot read ssh config {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required setting was neither passed explicitly nor found in the environment
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),

    /// No usable authentication method could be built
    #[error("no usable authentication method for host '{alias}': {reason}")]
    Auth { alias: String, reason: String },

    /// Dial, relay, handshake or authentication failure
    #[error("connection to '{alias}' failed: {reason}")]
    Connection { alias: String, reason: String },

    /// The remote command failed; `output` holds whatever was captured
    #[error("command failed ({reason}): {command}")]
    Command {
        command: String,
        reason: String,
        output: String,
    },

    /// A command was issued on a session that is already closed
    #[error("session to '{alias}' is not open")]
    NotConnected { alias: String },
}

impl RemoteError {
    pub(crate) fn config(alias: &str, reason: impl Into<String>) -> Self {
        Self::Config {
            alias: alias.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn auth(alias: &str, reason: impl Into<String>) -> Self {
        Self::Auth {
            alias: alias.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn connection(alias: &str, reason: impl Into<String>) -> Self {
        Self::Connection {
            alias: alias.to_string(),
            reason: reason.into(),
        }
    }

    /// Output captured before a command failed, if this is a command error.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Command { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Whether a failed command reported that its target container does not exist.
    pub fn is_missing_container(&self) -> bool {
        self.output()
            .is_some_and(|output| output.contains(NO_SUCH_CONTAINER))
    }
}
