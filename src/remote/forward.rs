//! Forwarded `direct-tcpip` channels through a relay host.
//!
//! A relay connection opens a `direct-tcpip` channel (RFC 4254 section 7.2)
//! to the target's `hostname:port`. The channel is turned into a byte stream
//! and a second SSH handshake runs over it, so the target sees a connection
//! originating from the relay.
//!
//! The returned stream borrows nothing from the relay handle, but it only
//! carries data while the relay session is alive. The caller keeps the relay
//! handle for at least as long as the target connection.

use russh::client;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::session::SshClientHandler;

/// Originator address reported to the relay. Nothing listens on it.
const ORIGINATOR_ADDRESS: &str = "127.0.0.1";
const ORIGINATOR_PORT: u32 = 0;

/// Open a tunnel from `relay` to `host:port`.
pub(crate) async fn open_tunnel(
    relay: &client::Handle<SshClientHandler>,
    host: &str,
    port: u16,
) -> Result<impl AsyncRead + AsyncWrite + Unpin + Send + 'static, russh::Error> {
    debug!(host = %host, port, "opening direct-tcpip channel through relay");

    let channel = relay
        .channel_open_direct_tcpip(host, u32::from(port), ORIGINATOR_ADDRESS, ORIGINATOR_PORT)
        .await?;

    debug!(channel_id = ?channel.id(), "direct-tcpip channel open");
    Ok(channel.into_stream())
}
