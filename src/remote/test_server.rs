//! In-process SSH server used by the transport and channel tests.
//!
//! Accepts any public key and answers a handful of fixed commands:
//!
//! | Command | Behaviour |
//! |---------|-----------|
//! | `ok` | `out\n` on stdout, `err\n` on stderr, exit 0 |
//! | `missing` | a "No such container" line on stderr, exit 1 |
//! | `slow` | waits [`SLOW_COMMAND_DELAY`], prints `done\n`, exit 0 |
//! | `signal` | exits with the custom signal `X` |
//! | anything else | exit 127 |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Sig, keys};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::host_config::SshConfig;

pub(crate) const FIXTURE_KEY: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/id_ed25519");

/// Delay before the `slow` command produces output and exits.
pub(crate) const SLOW_COMMAND_DELAY: Duration = Duration::from_millis(300);

#[derive(Default)]
struct FixtureServer {
    reject_tunnels: bool,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl server::Handler for FixtureServer {
    type Error = russh::Error;

    async fn auth_publickey(
        &mut self,
        _user: &str,
        _public_key: &keys::PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        _host_to_connect: &str,
        _port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if self.reject_tunnels {
            return Ok(false);
        }
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.channel_success(channel)?;
        let handle = session.handle();
        let command = String::from_utf8_lossy(data).into_owned();
        tokio::spawn(async move { answer(handle, channel, &command).await });
        Ok(())
    }
}

async fn answer(handle: server::Handle, channel: ChannelId, command: &str) {
    let exit_status = match command {
        "ok" => {
            let _ = handle.data(channel, CryptoVec::from("out\n")).await;
            let _ = handle.extended_data(channel, 1, CryptoVec::from("err\n")).await;
            Some(0)
        }
        "missing" => {
            let _ = handle
                .extended_data(channel, 1, CryptoVec::from("Error: No such container: x\n"))
                .await;
            Some(1)
        }
        "slow" => {
            tokio::time::sleep(SLOW_COMMAND_DELAY).await;
            let _ = handle.data(channel, CryptoVec::from("done\n")).await;
            Some(0)
        }
        "signal" => {
            let _ = handle
                .exit_signal_request(channel, Sig::Custom("X".to_string()), false, String::new(), String::new())
                .await;
            None
        }
        _ => Some(127),
    };

    if let Some(code) = exit_status {
        let _ = handle.exit_status_request(channel, code).await;
    }
    let _ = handle.eof(channel).await;
    let _ = handle.close(channel).await;
}

fn server_config() -> Arc<server::Config> {
    let host_key = keys::load_secret_key(FIXTURE_KEY, None).unwrap();
    Arc::new(server::Config {
        keys: vec![host_key],
        auth_rejection_time: Duration::from_millis(10),
        auth_rejection_time_initial: Some(Duration::ZERO),
        inactivity_timeout: Some(Duration::from_secs(10)),
        ..Default::default()
    })
}

/// Serve one SSH connection on a local port.
///
/// The task resolves once that connection's server session has ended.
pub(crate) async fn serve_once(reject_tunnels: bool) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = server_config();

    let task = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let handler = FixtureServer {
            reject_tunnels,
            ..Default::default()
        };
        let running = server::run_stream(config, socket, handler).await.unwrap();
        let _ = running.await;
    });
    (port, task)
}

/// Config with a `box` alias pointing at `port`, authenticating with the fixture key.
pub(crate) fn direct_config(port: u16) -> SshConfig {
    SshConfig::parse(&format!(
        "Host box\n  HostName 127.0.0.1\n  Port {port}\n  User me\n  IdentityFile {FIXTURE_KEY}\n"
    ))
}
