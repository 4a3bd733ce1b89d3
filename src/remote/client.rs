//! Transport connector for direct and relayed SSH connections.
//!
//! ## Connection Lifecycle
//!
//! 1. **Resolution**: Resolve the alias through the SSH config. A config error
//!    stops here, before any socket is opened.
//!
//! 2. **Authentication setup**: Build the ordered method list for the target
//!    (and a key-only list for the relay, if any).
//!
//! 3. **Connection Establishment**:
//!    - *Direct*: dial `hostname:port`, handshake and authenticate.
//!    - *Relay*: dial and authenticate the relay, open a `direct-tcpip`
//!      channel to the target, then handshake and authenticate over it.
//!
//! 4. **Teardown**: [`TransportSession::close`] disconnects the target first,
//!    then the relay.
//!
//! ## Timeouts
//!
//! Dial, handshake and authentication of each hop run under one
//! [`tokio::time::timeout`]. When it fires, the pending connection is dropped,
//! which closes its socket.
//!
//! ## Failure cleanup
//!
//! Layers are released in reverse order of opening on every failure path. A
//! relay that connected successfully is disconnected if anything after it fails.
//!
//! There are no retries. Every failure is reported to the caller.

use std::sync::Arc;
use std::time::Duration;

use russh::{Disconnect, client};
use tracing::{debug, error, info, instrument};

use super::auth::{AuthChain, AuthStrategy};
use super::error::RemoteError;
use super::forward::open_tunnel;
use super::host_config::SshConfig;
use super::session::SshClientHandler;
use super::types::ConnectionParams;

/// Keepalive interval for every connection
pub(crate) const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Missed keepalives before the connection is considered dead
pub(crate) const KEEPALIVE_MAX: usize = 3;

/// Build russh client configuration.
///
/// Inactivity timeout is disabled so long-running streamed commands such as
/// `docker logs -f` are not cut off; dead peers are detected by keepalives.
pub(crate) fn build_client_config() -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(KEEPALIVE_INTERVAL),
        keepalive_max: KEEPALIVE_MAX,
        ..Default::default()
    })
}

/// Send a disconnect and ignore the result; the peer may already be gone.
pub(crate) async fn disconnect(handle: &client::Handle<SshClientHandler>) {
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "", "English")
        .await
    {
        debug!(error = %e, "disconnect failed, connection already closed");
    }
}

/// Relay connection kept alive for as long as the target connection uses it.
pub(crate) struct RelayLink {
    alias: String,
    handle: client::Handle<SshClientHandler>,
}

/// An authenticated SSH connection, possibly tunneled through a relay.
///
/// Fields drop in declaration order, so the target handle is released
/// before the relay even when `close` is never called.
pub struct TransportSession {
    handle: client::Handle<SshClientHandler>,
    relay: Option<RelayLink>,
}

impl TransportSession {
    pub(crate) fn handle(&self) -> &client::Handle<SshClientHandler> {
        &self.handle
    }

    /// Relay alias this connection is tunneled through, if any.
    pub fn relay_alias(&self) -> Option<&str> {
        self.relay.as_ref().map(|link| link.alias.as_str())
    }

    /// Disconnect the target, then the relay.
    pub async fn close(self) {
        let Self { handle, relay } = self;

        disconnect(&handle).await;
        drop(handle);

        if let Some(link) = relay {
            debug!(relay = %link.alias, "closing relay connection");
            disconnect(&link.handle).await;
        }
    }
}

/// Opens transport sessions for host aliases.
///
/// Holds the parsed SSH config and the connect timeout; both are resolved
/// once by the caller and borrowed here.
#[derive(Debug, Clone, Copy)]
pub struct Connector<'a> {
    ssh_config: &'a SshConfig,
    timeout: Duration,
}

impl<'a> Connector<'a> {
    pub fn new(ssh_config: &'a SshConfig, timeout: Duration) -> Self {
        Self {
            ssh_config,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve `alias`, then connect directly or through its relay.
    #[instrument(skip(self, password), fields(timeout = ?self.timeout))]
    pub async fn connect(
        &self,
        alias: &str,
        password: Option<&str>,
    ) -> Result<TransportSession, RemoteError> {
        let params = self.ssh_config.resolve(alias)?;
        let methods = AuthChain::for_target(&params, password)?;

        let result = match params.relay.as_deref() {
            None => self.connect_direct(&params, &methods).await,
            Some(relay_alias) => self.connect_via_relay(&params, &methods, relay_alias).await,
        };

        if let Err(e) = &result {
            error!(host = %alias, error = %e, "SSH connection failed");
        }
        result
    }

    async fn connect_direct(
        &self,
        params: &ConnectionParams,
        methods: &AuthChain,
    ) -> Result<TransportSession, RemoteError> {
        let handle = self.dial(params, methods).await?;
        info!(host = %params.alias, address = %params.address(), "connected");

        Ok(TransportSession {
            handle,
            relay: None,
        })
    }

    async fn connect_via_relay(
        &self,
        params: &ConnectionParams,
        methods: &AuthChain,
        relay_alias: &str,
    ) -> Result<TransportSession, RemoteError> {
        let relay_params = self.ssh_config.resolve_relay(relay_alias)?;
        let relay_methods = AuthChain::for_relay(&relay_params)?;

        info!(host = %params.alias, relay = %relay_alias, "connecting via relay");

        let relay = match self.dial(&relay_params, &relay_methods).await {
            Ok(handle) => handle,
            Err(RemoteError::Connection { reason, .. }) => {
                return Err(RemoteError::connection(
                    &params.alias,
                    format!("relay '{relay_alias}': {reason}"),
                ));
            }
            Err(e) => return Err(e),
        };

        debug!(relay = %relay_alias, "relay connected, tunneling to target");

        let tunneled = tokio::time::timeout(self.timeout, async {
            let stream = open_tunnel(&relay, &params.hostname, params.port)
                .await
                .map_err(|e| {
                    RemoteError::connection(
                        &params.alias,
                        format!(
                            "failed to open tunnel to {} through '{relay_alias}': {e}",
                            params.address()
                        ),
                    )
                })?;

            let mut handle = client::connect_stream(build_client_config(), stream, SshClientHandler)
                .await
                .map_err(|e| {
                    RemoteError::connection(
                        &params.alias,
                        format!("SSH handshake through '{relay_alias}' failed: {e}"),
                    )
                })?;

            authenticate(&mut handle, params, methods).await?;
            Ok::<_, RemoteError>(handle)
        })
        .await
        .unwrap_or_else(|_| Err(self.timed_out(params)));

        match tunneled {
            Ok(handle) => {
                info!(host = %params.alias, relay = %relay_alias, "connected via relay");
                Ok(TransportSession {
                    handle,
                    relay: Some(RelayLink {
                        alias: relay_alias.to_string(),
                        handle: relay,
                    }),
                })
            }
            Err(e) => {
                disconnect(&relay).await;
                Err(e)
            }
        }
    }

    /// Dial, handshake and authenticate one hop under the connect timeout.
    async fn dial(
        &self,
        params: &ConnectionParams,
        methods: &AuthChain,
    ) -> Result<client::Handle<SshClientHandler>, RemoteError> {
        debug!(host = %params.alias, address = %params.address(), user = %params.user, "dialing");

        tokio::time::timeout(self.timeout, async {
            let mut handle = client::connect(
                build_client_config(),
                (params.hostname.as_str(), params.port),
                SshClientHandler,
            )
            .await
            .map_err(|e| {
                RemoteError::connection(
                    &params.alias,
                    format!("failed to connect to {}: {e}", params.address()),
                )
            })?;

            authenticate(&mut handle, params, methods).await?;
            Ok::<_, RemoteError>(handle)
        })
        .await
        .unwrap_or_else(|_| Err(self.timed_out(params)))
    }

    fn timed_out(&self, params: &ConnectionParams) -> RemoteError {
        RemoteError::connection(
            &params.alias,
            format!(
                "timed out after {:?} connecting to {}",
                self.timeout,
                params.address()
            ),
        )
    }
}

/// Run the method chain; a rejected chain disconnects the handle.
async fn authenticate(
    handle: &mut client::Handle<SshClientHandler>,
    params: &ConnectionParams,
    methods: &AuthChain,
) -> Result<(), RemoteError> {
    let accepted = methods
        .authenticate(handle, &params.user)
        .await
        .map_err(|e| RemoteError::connection(&params.alias, format!("authentication failed: {e}")))?;

    if !accepted {
        disconnect(handle).await;
        return Err(RemoteError::connection(
            &params.alias,
            format!(
                "authentication rejected for user '{}' (tried: {})",
                params.user,
                methods.method_names().join(", ")
            ),
        ));
    }

    debug!(host = %params.alias, user = %params.user, "authenticated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use crate::remote::test_server::{FIXTURE_KEY, direct_config, serve_once};

    /// A TCP peer that accepts one connection and never speaks SSH.
    /// Resolves to the number of bytes read before the client hung up.
    async fn silent_peer() -> (u16, tokio::task::JoinHandle<Option<usize>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.ok()?;
            let mut received = Vec::new();
            tokio::time::timeout(Duration::from_secs(5), socket.read_to_end(&mut received))
                .await
                .ok()?
                .ok()
        });
        (port, task)
    }

    mod config {
        use super::*;

        #[test]
        fn test_client_config_keepalive() {
            let config = build_client_config();
            assert_eq!(config.inactivity_timeout, None);
            assert_eq!(config.keepalive_interval, Some(Duration::from_secs(30)));
            assert_eq!(config.keepalive_max, 3);
        }

        #[test]
        fn test_connector_keeps_timeout() {
            let ssh_config = SshConfig::default();
            let connector = Connector::new(&ssh_config, Duration::from_secs(7));
            assert_eq!(connector.timeout(), Duration::from_secs(7));
        }
    }

    mod failures {
        use super::*;

        #[tokio::test]
        async fn test_unresolvable_alias_fails_before_dialing() {
            let ssh_config = SshConfig::parse("Host box\n  User me\n");
            let connector = Connector::new(&ssh_config, Duration::from_secs(1));
            let err = connector.connect("box", None).await.err().unwrap();
            assert!(matches!(err, RemoteError::Config { .. }));
        }

        #[tokio::test]
        async fn test_relay_config_error_opens_no_socket() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let ssh_config = SshConfig::parse(&format!(
                "Host target\n  HostName 127.0.0.1\n  Port {port}\n  User me\n  ProxyJump hop\n\
                 Host hop\n  HostName 127.0.0.1\n"
            ));
            let connector = Connector::new(&ssh_config, Duration::from_secs(1));

            let err = connector.connect("target", None).await.err().unwrap();
            assert!(matches!(err, RemoteError::Config { ref alias, .. } if alias == "hop"));

            let accepted =
                tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
            assert!(accepted.is_err(), "no connection should have been attempted");
        }

        #[tokio::test]
        async fn test_relay_without_key_is_auth_error() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let ssh_config = SshConfig::parse(&format!(
                "Host target\n  HostName 10.0.0.2\n  User me\n  ProxyJump hop\n\
                 Host hop\n  HostName 127.0.0.1\n  Port {port}\n  User jump\n"
            ));
            let connector = Connector::new(&ssh_config, Duration::from_secs(1));

            let err = connector.connect("target", Some("pw")).await.err().unwrap();
            assert!(matches!(err, RemoteError::Auth { ref alias, .. } if alias == "hop"));

            let accepted =
                tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
            assert!(accepted.is_err());
        }

        #[tokio::test]
        async fn test_refused_connection_is_connection_error() {
            // Bind then drop to get a port with nothing listening
            let port = {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                listener.local_addr().unwrap().port()
            };
            let ssh_config = SshConfig::parse(&format!(
                "Host box\n  HostName 127.0.0.1\n  Port {port}\n  User me\n"
            ));
            let connector = Connector::new(&ssh_config, Duration::from_secs(2));

            let err = connector.connect("box", None).await.err().unwrap();
            assert!(matches!(err, RemoteError::Connection { ref alias, .. } if alias == "box"));
        }

        #[tokio::test]
        async fn test_direct_timeout_closes_socket() {
            let (port, peer) = silent_peer().await;
            let ssh_config = SshConfig::parse(&format!(
                "Host box\n  HostName 127.0.0.1\n  Port {port}\n  User me\n"
            ));
            let connector = Connector::new(&ssh_config, Duration::from_millis(200));

            let err = connector.connect("box", None).await.err().unwrap();
            assert!(matches!(err, RemoteError::Connection { .. }));
            assert!(err.to_string().contains("timed out"));

            // The peer sees EOF once the abandoned connection is dropped
            let received = peer.await.unwrap();
            assert!(received.is_some(), "socket was left open after timeout");
        }

        #[tokio::test]
        async fn test_relay_dial_timeout_releases_relay_socket() {
            let (relay_port, relay_peer) = silent_peer().await;
            let ssh_config = SshConfig::parse(&format!(
                "Host target\n  HostName 10.0.0.2\n  User me\n  ProxyJump hop\n\
                 Host hop\n  HostName 127.0.0.1\n  Port {relay_port}\n  User jump\n  IdentityFile {FIXTURE_KEY}\n"
            ));
            let connector = Connector::new(&ssh_config, Duration::from_millis(200));

            let err = connector.connect("target", None).await.err().unwrap();
            assert!(matches!(err, RemoteError::Connection { ref alias, .. } if alias == "target"));
            assert!(err.to_string().contains("relay 'hop'"));

            let received = relay_peer.await.unwrap();
            assert!(received.is_some(), "relay socket was left open after failure");
        }

        #[tokio::test]
        async fn test_rejected_tunnel_disconnects_relay() {
            let (relay_port, relay_server) = serve_once(true).await;
            let ssh_config = SshConfig::parse(&format!(
                "Host target\n  HostName 10.9.9.9\n  User me\n  ProxyJump hop\n\
                 Host hop\n  HostName 127.0.0.1\n  Port {relay_port}\n  User jump\n  IdentityFile {FIXTURE_KEY}\n"
            ));
            let connector = Connector::new(&ssh_config, Duration::from_secs(5));

            let err = connector.connect("target", None).await.err().unwrap();
            assert!(matches!(err, RemoteError::Connection { ref alias, .. } if alias == "target"));
            assert!(err.to_string().contains("failed to open tunnel to 10.9.9.9:22 through 'hop'"));

            let ended = tokio::time::timeout(Duration::from_secs(5), relay_server).await;
            assert!(ended.is_ok(), "relay session still running after failure");
        }
    }

    mod established {
        use super::*;

        #[tokio::test]
        async fn test_direct_connection_has_no_relay() {
            let (port, server) = serve_once(false).await;
            let ssh_config = direct_config(port);
            let connector = Connector::new(&ssh_config, Duration::from_secs(5));

            let transport = connector.connect("box", None).await.unwrap();
            assert_eq!(transport.relay_alias(), None);

            transport.close().await;
            let ended = tokio::time::timeout(Duration::from_secs(5), server).await;
            assert!(ended.is_ok(), "server session still running after close");
        }
    }
}
