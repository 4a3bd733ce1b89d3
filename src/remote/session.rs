//! SSH client handler and the remote session aggregate.
//!
//! # Architecture
//!
//! - `SshClientHandler`: A russh client handler that accepts all host keys (similar to
//!   `StrictHostKeyChecking=no` in OpenSSH).
//! - `RemoteSession`: Owns one transport (direct or relayed) for a host alias and runs
//!   commands on it. Closing is idempotent.

use std::fmt;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::{debug, info};

use super::client::{Connector, TransportSession};
use super::error::RemoteError;
use super::exec::{self, CommandRunner};
use super::types::CommandOutput;

/// Client handler for russh that accepts all host keys.
///
/// # Security Note
///
/// Server keys are not checked against `known_hosts`, so a man-in-the-middle
/// on the path to the host or relay goes unnoticed.
pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(algorithm = %server_public_key.algorithm(), "accepting server host key");
        Ok(true)
    }
}

/// An open connection to one host alias.
///
/// # Example
///
/// ```ignore
/// let connector = Connector::new(&ssh_config, Duration::from_secs(30));
/// let mut session = RemoteSession::open(&connector, "gpu-box", None).await?;
/// let output = session.run_buffered("uname -a").await?;
/// session.close().await;
/// ```
pub struct RemoteSession {
    alias: String,
    transport: Option<TransportSession>,
}

impl RemoteSession {
    /// Resolve `alias` and connect to it, directly or through its relay.
    pub async fn open(
        connector: &Connector<'_>,
        alias: &str,
        password: Option<&str>,
    ) -> Result<Self, RemoteError> {
        let transport = connector.connect(alias, password).await?;
        Ok(Self {
            alias: alias.to_string(),
            transport: Some(transport),
        })
    }

    /// A session that never opened a transport.
    #[cfg(test)]
    pub(crate) fn detached(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            transport: None,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    fn transport(&self) -> Result<&TransportSession, RemoteError> {
        self.transport.as_ref().ok_or_else(|| RemoteError::NotConnected {
            alias: self.alias.clone(),
        })
    }

    /// Run a command and capture its combined output.
    pub async fn run_buffered(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let transport = self.transport()?;
        exec::run_buffered(transport.handle(), command).await
    }

    /// Run a command, streaming its output to this process's stdout and stderr.
    pub async fn run_streamed(&self, command: &str) -> Result<(), RemoteError> {
        let transport = self.transport()?;
        exec::run_streamed(transport.handle(), command).await
    }

    /// Close the transport. Calling this again, or on a session that never
    /// connected, does nothing.
    pub async fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.close().await;
            info!(host = %self.alias, "session closed");
        }
    }
}

#[async_trait]
impl CommandRunner for RemoteSession {
    async fn run_buffered(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        RemoteSession::run_buffered(self, command).await
    }

    async fn run_streamed(&self, command: &str) -> Result<(), RemoteError> {
        RemoteSession::run_streamed(self, command).await
    }
}

impl fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSession")
            .field("alias", &self.alias)
            .field("open", &self.is_open())
            .field(
                "relay",
                &self.transport.as_ref().and_then(TransportSession::relay_alias),
            )
            .finish()
    }
}
