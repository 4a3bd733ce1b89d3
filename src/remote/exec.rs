//! Buffered and streamed command execution on session channels.
//!
//! Every invocation opens its own session channel on the transport, runs one
//! command with `exec`, consumes channel messages until the command has
//! terminated, and closes the channel. One transport hosts any number of
//! sequential invocations.
//!
//! # Termination
//!
//! The message loop stops on:
//! - `Eof`, once an exit status or exit signal has been seen
//! - `Close`, or the channel being dropped by the transport
//!
//! A command that finishes without reporting an exit status is treated as a
//! failure.

use async_trait::async_trait;
use russh::{Channel, ChannelMsg, Sig, client};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::error::RemoteError;
use super::session::SshClientHandler;
use super::types::CommandOutput;

/// SSH extended data type code for stderr
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Runs shell commands on a remote host.
///
/// The workflow verbs are written against this trait; [`super::RemoteSession`]
/// is the production implementation.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` and return its combined stdout and stderr.
    ///
    /// A non-zero exit, an exit signal or a missing exit status is a
    /// [`RemoteError::Command`] carrying whatever output was captured.
    async fn run_buffered(&self, command: &str) -> Result<CommandOutput, RemoteError>;

    /// Run `command`, forwarding its stdout and stderr to the local process
    /// as it arrives. Returns once the command has terminated.
    async fn run_streamed(&self, command: &str) -> Result<(), RemoteError>;
}

/// Channel message relevant to command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChannelEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Exit(u32),
    Signal(String),
    Eof,
    Closed,
}

/// Source of channel events; implemented by russh channels and by test scripts.
#[async_trait]
pub(crate) trait EventSource: Send {
    /// Next event, or `None` once the channel is gone.
    async fn next_event(&mut self) -> Option<ChannelEvent>;
}

#[async_trait]
impl EventSource for Channel<client::Msg> {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            let event = match self.wait().await? {
                ChannelMsg::Data { data } => ChannelEvent::Stdout(data.to_vec()),
                ChannelMsg::ExtendedData { data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                    ChannelEvent::Stderr(data.to_vec())
                }
                ChannelMsg::ExitStatus { exit_status } => ChannelEvent::Exit(exit_status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    ChannelEvent::Signal(signal_label(&signal_name))
                }
                ChannelMsg::Eof => ChannelEvent::Eof,
                ChannelMsg::Close => ChannelEvent::Closed,
                // Window adjustments, request replies, other extended data
                _ => continue,
            };
            return Some(event);
        }
    }
}

/// Bare signal name as sent on the wire, e.g. `KILL`.
fn signal_label(signal: &Sig) -> String {
    match signal {
        Sig::Custom(name) => name.clone(),
        other => format!("{other:?}"),
    }
}

/// How the remote command ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) enum ExitOutcome {
    Status(u32),
    Signal(String),
    #[default]
    Unknown,
}

impl ExitOutcome {
    fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// `None` for exit status 0, otherwise a human-readable reason.
    pub(crate) fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Status(0) => None,
            Self::Status(code) => Some(format!("exit status {code}")),
            Self::Signal(signal) => Some(format!("killed by signal {signal}")),
            Self::Unknown => Some("no exit status reported".to_string()),
        }
    }
}

/// Tracks termination while a loop consumes events.
#[derive(Debug, Default)]
struct Termination {
    outcome: ExitOutcome,
}

impl Termination {
    /// Record `event`; returns `true` when the loop should stop.
    fn observe(&mut self, event: &ChannelEvent) -> bool {
        match event {
            ChannelEvent::Exit(code) => {
                self.outcome = ExitOutcome::Status(*code);
                false
            }
            ChannelEvent::Signal(signal) => {
                self.outcome = ExitOutcome::Signal(signal.clone());
                false
            }
            ChannelEvent::Eof => self.outcome.is_known(),
            ChannelEvent::Closed => true,
            ChannelEvent::Stdout(_) | ChannelEvent::Stderr(_) => false,
        }
    }
}

/// Collect stdout and stderr into one buffer, in arrival order.
pub(crate) async fn collect_combined<S: EventSource + ?Sized>(source: &mut S) -> (Vec<u8>, ExitOutcome) {
    let mut output = Vec::with_capacity(4096);
    let mut termination = Termination::default();

    while let Some(event) = source.next_event().await {
        match &event {
            ChannelEvent::Stdout(data) | ChannelEvent::Stderr(data) => output.extend_from_slice(data),
            _ => {}
        }
        if termination.observe(&event) {
            break;
        }
    }

    (output, termination.outcome)
}

/// Forward stdout and stderr to the given sinks, flushing after each chunk.
pub(crate) async fn forward_live<S, O, E>(
    source: &mut S,
    stdout: &mut O,
    stderr: &mut E,
) -> std::io::Result<ExitOutcome>
where
    S: EventSource + ?Sized,
    O: AsyncWrite + Unpin + Send,
    E: AsyncWrite + Unpin + Send,
{
    let mut termination = Termination::default();

    while let Some(event) = source.next_event().await {
        match &event {
            ChannelEvent::Stdout(data) => {
                stdout.write_all(data).await?;
                stdout.flush().await?;
            }
            ChannelEvent::Stderr(data) => {
                stderr.write_all(data).await?;
                stderr.flush().await?;
            }
            _ => {}
        }
        if termination.observe(&event) {
            break;
        }
    }

    Ok(termination.outcome)
}

async fn open_exec(
    handle: &client::Handle<SshClientHandler>,
    command: &str,
) -> Result<Channel<client::Msg>, RemoteError> {
    let channel = handle
        .channel_open_session()
        .await
        .map_err(|e| command_error(command, format!("failed to open channel: {e}"), String::new()))?;

    channel
        .exec(true, command)
        .await
        .map_err(|e| command_error(command, format!("failed to execute command: {e}"), String::new()))?;

    Ok(channel)
}

fn command_error(command: &str, reason: String, output: String) -> RemoteError {
    RemoteError::Command {
        command: command.to_string(),
        reason,
        output,
    }
}

/// Run `command` on a fresh channel and capture its combined output.
pub(crate) async fn run_buffered(
    handle: &client::Handle<SshClientHandler>,
    command: &str,
) -> Result<CommandOutput, RemoteError> {
    debug!(command = %command, "running buffered command");

    let mut channel = open_exec(handle, command).await?;
    let (output, outcome) = collect_combined(&mut channel).await;

    // Always close the channel; the transport stays up for the next command
    let _ = channel.close().await;

    let text = String::from_utf8_lossy(&output).into_owned();
    match outcome.failure_reason() {
        None => Ok(CommandOutput::new(text)),
        Some(reason) => {
            debug!(command = %command, reason = %reason, bytes = text.len(), "buffered command failed");
            Err(command_error(command, reason, text))
        }
    }
}

/// Run `command` on a fresh channel, forwarding its output to this process.
pub(crate) async fn run_streamed(
    handle: &client::Handle<SshClientHandler>,
    command: &str,
) -> Result<(), RemoteError> {
    debug!(command = %command, "running streamed command");

    let mut channel = open_exec(handle, command).await?;
    let forwarded = forward_live(&mut channel, &mut tokio::io::stdout(), &mut tokio::io::stderr()).await;

    let _ = channel.close().await;

    let outcome = forwarded.map_err(|e| {
        warn!(command = %command, error = %e, "failed to forward remote output");
        command_error(command, format!("failed to forward output: {e}"), String::new())
    })?;

    match outcome.failure_reason() {
        None => Ok(()),
        Some(reason) => Err(command_error(command, reason, String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::{Duration, Instant};

    /// Replays events, sleeping before each one.
    struct ScriptedChannel {
        events: VecDeque<(Duration, ChannelEvent)>,
    }

    impl ScriptedChannel {
        fn new(events: Vec<ChannelEvent>) -> Self {
            Self::timed(events.into_iter().map(|e| (Duration::ZERO, e)).collect())
        }

        fn timed(events: Vec<(Duration, ChannelEvent)>) -> Self {
            Self {
                events: events.into(),
            }
        }

        fn remaining(&self) -> usize {
            self.events.len()
        }
    }

    #[async_trait]
    impl EventSource for ScriptedChannel {
        async fn next_event(&mut self) -> Option<ChannelEvent> {
            let (delay, event) = self.events.pop_front()?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some(event)
        }
    }

    fn out(text: &str) -> ChannelEvent {
        ChannelEvent::Stdout(text.as_bytes().to_vec())
    }

    fn err(text: &str) -> ChannelEvent {
        ChannelEvent::Stderr(text.as_bytes().to_vec())
    }

    mod buffered {
        use super::*;

        #[tokio::test]
        async fn test_combines_streams_in_arrival_order() {
            let mut channel = ScriptedChannel::new(vec![
                out("step 1\n"),
                err("warning\n"),
                out("step 2\n"),
                ChannelEvent::Exit(0),
                ChannelEvent::Eof,
                ChannelEvent::Closed,
            ]);
            let (output, outcome) = collect_combined(&mut channel).await;
            assert_eq!(String::from_utf8(output).unwrap(), "step 1\nwarning\nstep 2\n");
            assert_eq!(outcome, ExitOutcome::Status(0));
            assert_eq!(outcome.failure_reason(), None);
        }

        #[tokio::test]
        async fn test_non_zero_exit_keeps_output() {
            let mut channel = ScriptedChannel::new(vec![
                err("Error response from daemon: No such container: abc\n"),
                ChannelEvent::Exit(1),
                ChannelEvent::Closed,
            ]);
            let (output, outcome) = collect_combined(&mut channel).await;
            assert!(String::from_utf8_lossy(&output).contains("No such container"));
            assert_eq!(outcome.failure_reason().as_deref(), Some("exit status 1"));
        }

        #[tokio::test]
        async fn test_eof_before_exit_status_keeps_waiting() {
            let mut channel = ScriptedChannel::new(vec![
                out("done\n"),
                ChannelEvent::Eof,
                ChannelEvent::Exit(0),
                ChannelEvent::Closed,
            ]);
            let (_, outcome) = collect_combined(&mut channel).await;
            assert_eq!(outcome, ExitOutcome::Status(0));
        }

        #[tokio::test]
        async fn test_eof_after_exit_stops_reading() {
            let mut channel = ScriptedChannel::new(vec![
                ChannelEvent::Exit(0),
                ChannelEvent::Eof,
                out("never read"),
                ChannelEvent::Closed,
            ]);
            let (output, _) = collect_combined(&mut channel).await;
            assert!(output.is_empty());
            assert_eq!(channel.remaining(), 2);
        }

        #[tokio::test]
        async fn test_missing_exit_status_is_failure() {
            let mut channel = ScriptedChannel::new(vec![out("partial"), ChannelEvent::Eof, ChannelEvent::Closed]);
            let (output, outcome) = collect_combined(&mut channel).await;
            assert_eq!(output, b"partial");
            assert_eq!(outcome, ExitOutcome::Unknown);
            assert_eq!(outcome.failure_reason().as_deref(), Some("no exit status reported"));
        }

        #[tokio::test]
        async fn test_channel_dropped_without_close() {
            let mut channel = ScriptedChannel::new(vec![out("x"), ChannelEvent::Exit(3)]);
            let (_, outcome) = collect_combined(&mut channel).await;
            assert_eq!(outcome, ExitOutcome::Status(3));
        }

        #[tokio::test]
        async fn test_signal_is_failure() {
            let mut channel = ScriptedChannel::new(vec![
                ChannelEvent::Signal("KILL".to_string()),
                ChannelEvent::Eof,
                ChannelEvent::Closed,
            ]);
            let (_, outcome) = collect_combined(&mut channel).await;
            assert_eq!(outcome.failure_reason().as_deref(), Some("killed by signal KILL"));
        }
    }

    mod streamed {
        use super::*;

        #[tokio::test]
        async fn test_routes_stdout_and_stderr_separately() {
            let mut channel = ScriptedChannel::new(vec![
                out("a"),
                err("b"),
                out("c"),
                ChannelEvent::Exit(0),
                ChannelEvent::Closed,
            ]);
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let outcome = forward_live(&mut channel, &mut stdout, &mut stderr).await.unwrap();
            assert_eq!(stdout, b"ac");
            assert_eq!(stderr, b"b");
            assert_eq!(outcome, ExitOutcome::Status(0));
        }

        #[tokio::test]
        async fn test_blocks_until_remote_command_terminates() {
            let mut channel = ScriptedChannel::timed(vec![
                (Duration::ZERO, out("starting\n")),
                (Duration::from_millis(150), out("still going\n")),
                (Duration::from_millis(50), ChannelEvent::Exit(0)),
                (Duration::ZERO, ChannelEvent::Eof),
                (Duration::ZERO, ChannelEvent::Closed),
            ]);
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();

            let started = Instant::now();
            let outcome = forward_live(&mut channel, &mut stdout, &mut stderr).await.unwrap();

            assert!(started.elapsed() >= Duration::from_millis(200));
            assert_eq!(stdout, b"starting\nstill going\n");
            assert_eq!(outcome, ExitOutcome::Status(0));
        }

        #[tokio::test]
        async fn test_non_zero_exit_reported() {
            let mut channel = ScriptedChannel::new(vec![err("boom\n"), ChannelEvent::Exit(2), ChannelEvent::Closed]);
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let outcome = forward_live(&mut channel, &mut stdout, &mut stderr).await.unwrap();
            assert_eq!(stderr, b"boom\n");
            assert_eq!(outcome.failure_reason().as_deref(), Some("exit status 2"));
        }
    }

    mod termination {
        use super::*;

        #[test]
        fn test_close_always_stops() {
            assert!(Termination::default().observe(&ChannelEvent::Closed));
        }

        #[test]
        fn test_eof_alone_does_not_stop() {
            assert!(!Termination::default().observe(&ChannelEvent::Eof));
        }

        #[test]
        fn test_eof_after_signal_stops() {
            let mut termination = Termination::default();
            assert!(!termination.observe(&ChannelEvent::Signal("TERM".to_string())));
            assert!(termination.observe(&ChannelEvent::Eof));
        }

        #[test]
        fn test_signal_label() {
            assert_eq!(signal_label(&Sig::KILL), "KILL");
            assert_eq!(signal_label(&Sig::Custom("XCPU".to_string())), "XCPU");
        }
    }

    mod channel {
        use super::*;
        use crate::remote::client::{Connector, TransportSession};
        use crate::remote::test_server::{SLOW_COMMAND_DELAY, direct_config, serve_once};

        async fn connect(port: u16) -> TransportSession {
            let ssh_config = direct_config(port);
            let connector = Connector::new(&ssh_config, Duration::from_secs(5));
            connector.connect("box", None).await.unwrap()
        }

        #[tokio::test]
        async fn test_buffered_collects_stdout_and_stderr() {
            let (port, _server) = serve_once(false).await;
            let transport = connect(port).await;

            let output = run_buffered(transport.handle(), "ok").await.unwrap();
            assert_eq!(output.text, "out\nerr\n");

            transport.close().await;
        }

        #[tokio::test]
        async fn test_buffered_failure_keeps_output() {
            let (port, _server) = serve_once(false).await;
            let transport = connect(port).await;

            let err = run_buffered(transport.handle(), "missing").await.unwrap_err();
            assert!(err.is_missing_container());
            match &err {
                RemoteError::Command { command, reason, output } => {
                    assert_eq!(command, "missing");
                    assert_eq!(reason, "exit status 1");
                    assert!(output.contains("No such container"));
                }
                other => panic!("unexpected error: {other:?}"),
            }

            transport.close().await;
        }

        #[tokio::test]
        async fn test_channels_are_reused_sequentially() {
            let (port, _server) = serve_once(false).await;
            let transport = connect(port).await;

            for _ in 0..3 {
                let output = run_buffered(transport.handle(), "ok").await.unwrap();
                assert_eq!(output.trimmed(), "out\nerr");
            }
            assert!(run_buffered(transport.handle(), "unknown").await.is_err());
            assert!(run_buffered(transport.handle(), "ok").await.is_ok());

            transport.close().await;
        }

        #[tokio::test]
        async fn test_exit_signal_reports_bare_name() {
            let (port, _server) = serve_once(false).await;
            let transport = connect(port).await;

            let err = run_buffered(transport.handle(), "signal").await.unwrap_err();
            assert!(matches!(err, RemoteError::Command { ref reason, .. } if reason == "killed by signal X"));

            transport.close().await;
        }

        #[tokio::test]
        async fn test_streamed_returns_after_remote_exit() {
            let (port, _server) = serve_once(false).await;
            let transport = connect(port).await;

            let started = Instant::now();
            run_streamed(transport.handle(), "slow").await.unwrap();
            assert!(started.elapsed() >= SLOW_COMMAND_DELAY);

            let err = run_streamed(transport.handle(), "missing").await.unwrap_err();
            assert!(matches!(err, RemoteError::Command { ref reason, .. } if reason == "exit status 1"));

            transport.close().await;
        }
    }
}
