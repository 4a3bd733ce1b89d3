//! SSH transport and command execution.
//!
//! This module is organized into the following submodules:
//!
//! - `config`: Settings resolution (flag, environment variable, default)
//! - `host_config`: SSH config parsing and host alias resolution
//! - `auth`: Authentication strategies and the ordered method chain
//! - `client`: Transport connector for direct and relayed connections
//! - `forward`: Forwarded `direct-tcpip` channels through a relay host
//! - `exec`: Buffered and streamed command execution on a session channel
//! - `session`: Host key handler and the `RemoteSession` aggregate
//! - `error`: Error taxonomy shared by every layer
//! - `types`: Plain data passed between the layers

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod exec;
pub(crate) mod forward;
pub mod host_config;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod test_server;

pub use client::Connector;
pub use config::{Settings, SettingsOverrides};
pub use error::{NO_SUCH_CONTAINER, RemoteError};
pub use exec::CommandRunner;
pub use host_config::SshConfig;
pub use session::RemoteSession;
pub use types::{CommandOutput, ConnectionParams};
